//! Replaying inspector snapshots into live stores.
//!
//! Restores are best-effort: stores that are no longer registered are
//! skipped, and fields are written without schema checks. Each store
//! receives a shallow merge, so fields the snapshot does not mention keep
//! their live value. All writes of one restore go through a single
//! [`Transactor::run_atomically`] call.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::registry::{Store, StoreRegistry, Transactor};
use crate::tree::{COMPONENT_NAME_KEY, STORES_KEY};

/// Why a snapshot entry was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The store id does not resolve to a live store.
    StoreNotFound,
    /// The store registry could not be read.
    RegistryUnavailable,
    /// The snapshot value for the store is not an object of fields.
    NotAnObject,
}

/// A snapshot entry left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedStore {
    /// Id as it appears in the snapshot.
    pub store_id: String,
    /// Why it was skipped.
    pub reason: SkipReason,
}

/// Outcome of a restore.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreReport {
    /// Store ids written, in snapshot order.
    pub applied: Vec<String>,
    /// Entries skipped.
    pub skipped: Vec<SkippedStore>,
}

impl RestoreReport {
    /// Returns true if nothing was written.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Writes snapshots back into live stores.
#[derive(Clone, Copy)]
pub struct StateRestorer<'a> {
    stores: &'a dyn StoreRegistry,
    transactor: &'a dyn Transactor,
}

impl<'a> StateRestorer<'a> {
    /// Restorer writing into `stores` through `transactor`.
    #[must_use]
    pub fn new(stores: &'a dyn StoreRegistry, transactor: &'a dyn Transactor) -> Self {
        Self { stores, transactor }
    }

    /// Apply `snapshot`, shaped like a state tree node.
    ///
    /// `stores` entries at every level are applied; `componentName` is
    /// ignored; every other key holding a non-empty object is treated as a
    /// nested context node.
    pub fn restore(&self, snapshot: &Value) -> RestoreReport {
        let mut report = RestoreReport::default();
        let mut plan: Vec<(Arc<dyn Store>, Map<String, Value>)> = Vec::new();
        self.collect(snapshot, &mut plan, &mut report);

        if plan.is_empty() {
            debug!(skipped = report.skipped.len(), "restore found nothing to apply");
            return report;
        }

        self.transactor.run_atomically(&mut || {
            for (store, fields) in &plan {
                store.assign(fields);
            }
        });

        debug!(
            applied = report.applied.len(),
            skipped = report.skipped.len(),
            "restore applied"
        );
        report
    }

    fn collect(
        &self,
        node: &Value,
        plan: &mut Vec<(Arc<dyn Store>, Map<String, Value>)>,
        report: &mut RestoreReport,
    ) {
        let Value::Object(node) = node else {
            return;
        };

        if let Some(Value::Object(stores)) = node.get(STORES_KEY) {
            for (store_id, state) in stores {
                let Value::Object(fields) = state else {
                    report.skipped.push(SkippedStore {
                        store_id: store_id.clone(),
                        reason: SkipReason::NotAnObject,
                    });
                    continue;
                };

                match self.stores.get(store_id) {
                    Ok(Some(store)) => {
                        plan.push((store, fields.clone()));
                        report.applied.push(store_id.clone());
                    }
                    Ok(None) => {
                        debug!(store_id = %store_id, "restore target not mounted, skipping");
                        report.skipped.push(SkippedStore {
                            store_id: store_id.clone(),
                            reason: SkipReason::StoreNotFound,
                        });
                    }
                    Err(e) => {
                        warn!(store_id = %store_id, error = %e, "store registry unavailable during restore");
                        report.skipped.push(SkippedStore {
                            store_id: store_id.clone(),
                            reason: SkipReason::RegistryUnavailable,
                        });
                    }
                }
            }
        }

        for (key, child) in node {
            if key == STORES_KEY || key == COMPONENT_NAME_KEY {
                continue;
            }
            match child {
                Value::Object(map) if !map.is_empty() => self.collect(child, plan, report),
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use crate::registry::{ContextRelation, InMemoryHost};

    struct CountingTransactor<'a> {
        inner: &'a dyn Transactor,
        calls: AtomicUsize,
    }

    impl Transactor for CountingTransactor<'_> {
        fn run_atomically(&self, f: &mut dyn FnMut()) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.run_atomically(f);
        }
    }

    fn host() -> InMemoryHost {
        let host = InMemoryHost::new();
        host.add_context("c1", ContextRelation::new("Counter").with_parent("root"))
            .unwrap();
        host.add_context("c2", ContextRelation::new("Child").with_parent("c1"))
            .unwrap();
        host.add_store("c1", "s1", json!({"count": 1, "label": "a"})).unwrap();
        host.add_store("c2", "s2", json!({"open": false})).unwrap();
        host
    }

    #[test]
    fn applies_fields_in_one_atomic_call() {
        let host = host();
        let counting = CountingTransactor {
            inner: &*host.bus,
            calls: AtomicUsize::new(0),
        };
        let restorer = StateRestorer::new(&*host.stores, &counting);

        let report = restorer.restore(&json!({"c1": {"stores": {"s1": {"count": 5}}}}));

        assert_eq!(report.applied, vec!["s1"]);
        assert!(report.skipped.is_empty());
        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);

        let s1 = host.stores.get("s1").unwrap().unwrap();
        assert_eq!(s1.observable_fields().get("count"), Some(&json!(5)));
        // Shallow merge leaves other fields alone.
        assert_eq!(s1.observable_fields().get("label"), Some(&json!("a")));
    }

    #[test]
    fn nested_contexts_are_restored_in_the_same_call() {
        let host = host();
        let counting = CountingTransactor {
            inner: &*host.bus,
            calls: AtomicUsize::new(0),
        };
        let restorer = StateRestorer::new(&*host.stores, &counting);

        let report = restorer.restore(&json!({
            "c1": {
                "componentName": "Counter",
                "stores": {"s1": {"count": 2}},
                "c2": {"componentName": "Child", "stores": {"s2": {"open": true}}}
            }
        }));

        assert_eq!(report.applied, vec!["s1", "s2"]);
        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
        let s2 = host.stores.get("s2").unwrap().unwrap();
        assert_eq!(s2.observable_fields().get("open"), Some(&json!(true)));
    }

    #[test]
    fn missing_stores_and_bad_states_are_skipped() {
        let host = host();
        let restorer = StateRestorer::new(&*host.stores, &*host.bus);

        let report = restorer.restore(&json!({
            "c1": {"stores": {"gone": {"x": 1}, "s1": 3}},
            "c3": {},
            "componentName": "ignored"
        }));

        assert!(report.is_noop());
        assert_eq!(
            report.skipped,
            vec![
                SkippedStore { store_id: "gone".to_string(), reason: SkipReason::StoreNotFound },
                SkippedStore { store_id: "s1".to_string(), reason: SkipReason::NotAnObject },
            ]
        );
        assert_eq!(host.bus.transaction_count(), 0);
    }

    #[test]
    fn top_level_stores_key_is_applied() {
        let host = host();
        let restorer = StateRestorer::new(&*host.stores, &*host.bus);
        let report = restorer.restore(&json!({"stores": {"s2": {"open": true}}}));
        assert_eq!(report.applied, vec!["s2"]);
    }

    #[test]
    fn unknown_fields_are_written_anyway() {
        let host = host();
        let restorer = StateRestorer::new(&*host.stores, &*host.bus);
        restorer.restore(&json!({"c1": {"stores": {"s1": {"brandNew": [1, 2]}}}}));
        let s1 = host.stores.get("s1").unwrap().unwrap();
        assert_eq!(s1.observable_fields().get("brandNew"), Some(&json!([1, 2])));
    }

    #[test]
    fn non_object_snapshot_is_a_noop() {
        let host = host();
        let restorer = StateRestorer::new(&*host.stores, &*host.bus);
        assert_eq!(restorer.restore(&json!([1, 2, 3])), RestoreReport::default());
        assert_eq!(restorer.restore(&Value::Null), RestoreReport::default());
    }
}
