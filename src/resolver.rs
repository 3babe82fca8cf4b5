//! Context key resolution.
//!
//! Maps a context id to its path in the state tree by walking parent
//! relations up to the implicit root context.

use std::collections::HashSet;

use tracing::trace;

use crate::error::ResolveError;
use crate::path::{self, Segment};
use crate::registry::{RelationRegistry, ROOT_CONTEXT};

/// Resolves context ids against a relation registry.
#[derive(Clone, Copy)]
pub struct ContextKeyResolver<'a> {
    relations: &'a dyn RelationRegistry,
}

impl<'a> ContextKeyResolver<'a> {
    /// Resolver over `relations`.
    #[must_use]
    pub fn new(relations: &'a dyn RelationRegistry) -> Self {
        Self { relations }
    }

    /// Dotted path of `context_id`, e.g. `root.app.counter`.
    ///
    /// Ids containing path syntax are escaped, so the result parses back to
    /// [`resolve_segments`](Self::resolve_segments).
    pub fn resolve(&self, context_id: &str) -> Result<String, ResolveError> {
        let segments: Vec<Segment> = self
            .resolve_segments(context_id)?
            .into_iter()
            .map(Segment::Key)
            .collect();
        Ok(path::render(&segments))
    }

    /// Path of `context_id` as a list of ids, starting with `root`.
    ///
    /// Unknown contexts, and contexts whose registry is not ready yet, are
    /// placed directly under the root. A parent chain that revisits a context
    /// is reported as [`ResolveError::Cycle`].
    pub fn resolve_segments(&self, context_id: &str) -> Result<Vec<String>, ResolveError> {
        if context_id == ROOT_CONTEXT {
            return Ok(vec![ROOT_CONTEXT.to_string()]);
        }

        let mut chain = vec![context_id.to_string()];
        let mut visited: HashSet<String> = HashSet::new();
        let mut current = context_id.to_string();

        loop {
            if !visited.insert(current.clone()) {
                return Err(ResolveError::Cycle {
                    context_id: context_id.to_string(),
                    chain,
                });
            }

            let parent = match self.relations.relation(&current) {
                Ok(Some(relation)) => relation.non_root_parent().map(str::to_string),
                Ok(None) => None,
                Err(e) => {
                    trace!(context_id = %current, error = %e, "relation lookup failed, treating as top-level");
                    None
                }
            };

            let Some(parent) = parent else {
                break;
            };

            chain.push(parent.clone());
            current = parent;
        }

        chain.push(ROOT_CONTEXT.to_string());
        chain.reverse();
        Ok(chain)
    }
}
