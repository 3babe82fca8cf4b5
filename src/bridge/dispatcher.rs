//! Forwarding of host mutations to the inspector.
//!
//! A [`ChangeBridge`] installs one listener on the host's mutation source.
//! For every event that is not excluded it rebuilds the state tree, projects
//! it through each active filter and hands the result to its sink. All
//! listener bookkeeping lives in the bridge instance, so independent bridges
//! on the same source never see each other's subscriptions.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

use crate::config::BridgeConfig;
use crate::error::BridgeResult;
use crate::event::MutationEvent;
use crate::filter::FilterPattern;
use crate::projection::FilteredState;
use crate::registry::{
    InMemoryHost, Listener, ListenerId, MutationSource, RelationRegistry, StoreRegistry, Transactor,
};
use crate::restore::{RestoreReport, StateRestorer};
use crate::tree::StateTreeBuilder;

use super::command::{CommandOutcome, InspectorCommand};
use super::message::{OutboundMessage, SessionId};
use super::sink::InspectorSink;

/// Event counters of one bridge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeStats {
    /// Records accepted by the sink.
    pub emitted: u64,
    /// Events dropped because their kind is excluded.
    pub dropped_by_filter: u64,
    /// Records the sink refused.
    pub dropped_by_sink: u64,
}

#[derive(Debug, Default)]
struct Subscription {
    session: Option<SessionId>,
    filters: Vec<FilterPattern>,
}

/// State shared between the bridge and its installed listener.
struct Shared {
    stores: Arc<dyn StoreRegistry>,
    relations: Arc<dyn RelationRegistry>,
    sink: Arc<dyn InspectorSink>,
    config: BridgeConfig,
    subscription: RwLock<Subscription>,
    emitted: AtomicU64,
    dropped_by_filter: AtomicU64,
    dropped_by_sink: AtomicU64,
}

impl Shared {
    fn handle(&self, event: &MutationEvent) {
        let kind = event.kind();
        if self.config.excludes(kind) {
            self.dropped_by_filter.fetch_add(1, Ordering::Relaxed);
            trace!(kind = %kind, "excluded event dropped");
            return;
        }

        let (session_id, filters) = {
            let sub = self.subscription.read().unwrap_or_else(PoisonError::into_inner);
            let Some(session_id) = sub.session else {
                trace!(kind = %kind, "event after detach ignored");
                return;
            };
            (session_id, sub.filters.clone())
        };

        let message = OutboundMessage {
            event: event.clone(),
            stores_state: self.filtered_state(&filters),
            session_id,
            emitted_at: Utc::now(),
        };

        if self.sink.send(message) {
            self.emitted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.dropped_by_sink.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn filtered_state(&self, filters: &[FilterPattern]) -> Vec<FilteredState> {
        let tree = StateTreeBuilder::new(&*self.stores, &*self.relations).build();
        filters
            .iter()
            .map(|filter| FilteredState::compute(filter, tree.root()))
            .collect()
    }

    fn merged(&self, explicit: &[String]) -> Vec<FilterPattern> {
        merge_filters(explicit, &self.config.default_filters)
    }
}

/// Explicit filters followed by defaults, first occurrence wins.
fn merge_filters(explicit: &[String], defaults: &[String]) -> Vec<FilterPattern> {
    let mut seen = HashSet::new();
    explicit
        .iter()
        .chain(defaults)
        .filter(|raw| seen.insert(raw.as_str()))
        .map(|raw| FilterPattern::parse(raw.as_str()))
        .collect()
}

/// Bridge between a host's reactive stores and an inspector.
pub struct ChangeBridge {
    shared: Arc<Shared>,
    source: Arc<dyn MutationSource>,
    transactor: Arc<dyn Transactor>,
    listener: Mutex<Option<ListenerId>>,
}

impl ChangeBridge {
    /// Wire a bridge to its collaborators. Nothing is forwarded until
    /// [`attach`](Self::attach) is called.
    pub fn new(
        stores: Arc<dyn StoreRegistry>,
        relations: Arc<dyn RelationRegistry>,
        source: Arc<dyn MutationSource>,
        transactor: Arc<dyn Transactor>,
        sink: Arc<dyn InspectorSink>,
        config: BridgeConfig,
    ) -> BridgeResult<Self> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                stores,
                relations,
                sink,
                config,
                subscription: RwLock::new(Subscription::default()),
                emitted: AtomicU64::new(0),
                dropped_by_filter: AtomicU64::new(0),
                dropped_by_sink: AtomicU64::new(0),
            }),
            source,
            transactor,
            listener: Mutex::new(None),
        })
    }

    /// Wire a bridge to the in-memory collaborators of `host`.
    pub fn for_host(host: &InMemoryHost, sink: Arc<dyn InspectorSink>, config: BridgeConfig) -> BridgeResult<Self> {
        Self::new(
            Arc::clone(&host.stores) as Arc<dyn StoreRegistry>,
            Arc::clone(&host.relations) as Arc<dyn RelationRegistry>,
            Arc::clone(&host.bus) as Arc<dyn MutationSource>,
            Arc::clone(&host.bus) as Arc<dyn Transactor>,
            sink,
            config,
        )
    }

    /// Start forwarding mutations.
    ///
    /// Any listener installed by an earlier attach of this bridge is removed
    /// first, so at most one is ever active. The subscription set becomes
    /// `filters` followed by the configured defaults, de-duplicated.
    pub fn attach(&self, filters: Option<Vec<String>>) -> SessionId {
        let mut listener = self.listener.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = listener.take() {
            self.source.unsubscribe(previous);
            debug!(listener_id = %previous, "previous bridge listener removed");
        }

        let session_id = SessionId::new();
        let merged = self.shared.merged(filters.as_deref().unwrap_or_default());
        let active: Vec<String> = merged.iter().map(|f| f.as_str().to_string()).collect();
        {
            let mut sub = self.shared.subscription.write().unwrap_or_else(PoisonError::into_inner);
            sub.session = Some(session_id);
            sub.filters = merged;
        }

        let shared = Arc::clone(&self.shared);
        let callback: Listener = Arc::new(move |event: &MutationEvent| shared.handle(event));
        *listener = Some(self.source.subscribe(callback));

        debug!(session_id = %session_id, filters = ?active, "bridge attached");
        session_id
    }

    /// Replace the subscription set without reinstalling the listener.
    ///
    /// Defaults are merged in as on attach. Returns the new active set.
    pub fn subscribe(&self, filters: &[String]) -> Vec<String> {
        let merged = self.shared.merged(filters);
        let active: Vec<String> = merged.iter().map(|f| f.as_str().to_string()).collect();
        self.shared
            .subscription
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .filters = merged;
        debug!(filters = ?active, "subscription replaced");
        active
    }

    /// Stop forwarding. Returns false if the bridge was not attached.
    pub fn detach(&self) -> bool {
        let mut listener = self.listener.lock().unwrap_or_else(PoisonError::into_inner);
        {
            let mut sub = self.shared.subscription.write().unwrap_or_else(PoisonError::into_inner);
            sub.session = None;
            sub.filters.clear();
        }

        match listener.take() {
            Some(id) => {
                self.source.unsubscribe(id);
                debug!(listener_id = %id, "bridge detached");
                true
            }
            None => false,
        }
    }

    /// Returns true while a listener is installed.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Session of the current attach.
    #[must_use]
    pub fn session_id(&self) -> Option<SessionId> {
        self.shared
            .subscription
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .session
    }

    /// Active filter patterns in subscription order.
    #[must_use]
    pub fn filters(&self) -> Vec<String> {
        self.shared
            .subscription
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .filters
            .iter()
            .map(|f| f.as_str().to_string())
            .collect()
    }

    /// Filtered state right now.
    ///
    /// Uses the active filters while attached and the configured defaults
    /// otherwise.
    #[must_use]
    pub fn current_state(&self) -> Vec<FilteredState> {
        let filters = {
            let sub = self.shared.subscription.read().unwrap_or_else(PoisonError::into_inner);
            if sub.session.is_some() {
                sub.filters.clone()
            } else {
                self.shared.merged(&[])
            }
        };
        self.shared.filtered_state(&filters)
    }

    /// Process one event as the installed listener would.
    pub fn handle_event(&self, event: &MutationEvent) {
        self.shared.handle(event);
    }

    /// Write `snapshot` back into the live stores.
    pub fn restore(&self, snapshot: &Value) -> RestoreReport {
        StateRestorer::new(&*self.shared.stores, &*self.transactor).restore(snapshot)
    }

    /// Dispatch one inspector command.
    pub fn handle_command(&self, command: InspectorCommand) -> CommandOutcome {
        trace!(?command, "inspector command");
        match command {
            InspectorCommand::Attach { filters } => {
                let session_id = self.attach(filters);
                CommandOutcome::Attached {
                    session_id,
                    filters: self.filters(),
                }
            }
            InspectorCommand::Subscribe { filters } => CommandOutcome::Subscribed {
                filters: self.subscribe(&filters),
            },
            InspectorCommand::Restore { snapshot } => CommandOutcome::Restored {
                report: self.restore(&snapshot),
            },
            InspectorCommand::Refresh => CommandOutcome::State {
                stores_state: self.current_state(),
            },
            InspectorCommand::Detach => CommandOutcome::Detached {
                was_attached: self.detach(),
            },
        }
    }

    /// Configuration the bridge was created with.
    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.shared.config
    }

    /// Snapshot of the event counters.
    #[must_use]
    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            emitted: self.shared.emitted.load(Ordering::Relaxed),
            dropped_by_filter: self.shared.dropped_by_filter.load(Ordering::Relaxed),
            dropped_by_sink: self.shared.dropped_by_sink.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for ChangeBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeBridge")
            .field("attached", &self.is_attached())
            .field("filters", &self.filters())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl Drop for ChangeBridge {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::bridge::channel;
    use crate::bridge::InspectorStream;
    use crate::event::MutationKind;
    use crate::registry::ContextRelation;

    fn host() -> InMemoryHost {
        let host = InMemoryHost::new();
        host.add_context("c1", ContextRelation::new("Counter").with_parent("root"))
            .unwrap();
        host.add_store("c1", "s1", json!({"count": 1})).unwrap();
        host
    }

    fn wire(host: &InMemoryHost, config: BridgeConfig) -> (ChangeBridge, InspectorStream) {
        let (sink, stream) = channel(config.sink_capacity);
        let bridge = ChangeBridge::for_host(host, Arc::new(sink), config).unwrap();
        (bridge, stream)
    }

    fn to_strings(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn merge_keeps_explicit_first_and_dedups() {
        let merged = merge_filters(&to_strings(&["a", "*", "a", "b"]), &to_strings(&["*", "c"]));
        let raw: Vec<&str> = merged.iter().map(FilterPattern::as_str).collect();
        assert_eq!(raw, vec!["a", "*", "b", "c"]);
    }

    #[test]
    fn attach_installs_one_listener_and_merges_defaults() {
        let host = host();
        let (bridge, _stream) = wire(&host, BridgeConfig::default());

        bridge.attach(Some(to_strings(&["*.stores.*"])));
        assert_eq!(host.bus.listener_count(), 1);
        assert_eq!(bridge.filters(), vec!["*.stores.*", "*"]);

        let first = bridge.session_id().unwrap();
        let second = bridge.attach(None);
        assert_ne!(first, second);
        assert_eq!(host.bus.listener_count(), 1);
        assert_eq!(bridge.filters(), vec!["*"]);
    }

    #[test]
    fn mutation_emits_one_record_with_each_filter() {
        let host = host();
        let (bridge, stream) = wire(&host, BridgeConfig::default());
        let session = bridge.attach(Some(to_strings(&["*.stores.*"])));

        host.bus.emit(MutationEvent::action("increment"));

        let msg = stream.try_recv().unwrap().unwrap();
        assert_eq!(msg.session_id, session);
        assert_eq!(msg.event, MutationEvent::action("increment"));
        assert_eq!(msg.stores_state.len(), 2);
        assert_eq!(
            msg.state_for("*.stores.*"),
            Some(&json!({"c1": {"stores": {"s1": {"count": 1}}}}))
        );
        assert_eq!(
            msg.state_for("*"),
            Some(&json!({"c1": {"stores": {"s1": {"count": 1}}, "componentName": "Counter"}}))
        );
        assert!(stream.is_empty());
        assert_eq!(bridge.stats().emitted, 1);
    }

    #[test]
    fn excluded_kinds_are_counted_not_sent() {
        let host = host();
        let (bridge, stream) = wire(&host, BridgeConfig::default());
        bridge.attach(None);

        host.bus.emit(MutationEvent::report_end());
        host.bus.emit(MutationEvent::reaction("derived"));

        assert!(stream.is_empty());
        assert_eq!(
            bridge.stats(),
            BridgeStats {
                emitted: 0,
                dropped_by_filter: 2,
                dropped_by_sink: 0
            }
        );
    }

    #[test]
    fn exclusions_follow_config() {
        let host = host();
        let config = BridgeConfig::default().with_excluded_kinds([MutationKind::Action]);
        let (bridge, stream) = wire(&host, config);
        bridge.attach(None);

        host.bus.emit(MutationEvent::action("hidden"));
        host.bus.emit(MutationEvent::report_end());

        let msgs = stream.drain();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].event.kind(), MutationKind::ReportEnd);
    }

    #[test]
    fn detach_is_idempotent_and_stops_forwarding() {
        let host = host();
        let (bridge, stream) = wire(&host, BridgeConfig::default());
        bridge.attach(None);

        assert!(bridge.detach());
        assert!(!bridge.detach());
        assert!(!bridge.is_attached());
        assert!(bridge.filters().is_empty());
        assert_eq!(host.bus.listener_count(), 0);

        host.bus.emit(MutationEvent::action("late"));
        assert!(stream.is_empty());

        // A direct call after detach is ignored too.
        bridge.handle_event(&MutationEvent::action("direct"));
        assert!(stream.is_empty());
    }

    #[test]
    fn dropping_the_bridge_removes_its_listener() {
        let host = host();
        {
            let (bridge, _stream) = wire(&host, BridgeConfig::default());
            bridge.attach(None);
            assert_eq!(host.bus.listener_count(), 1);
        }
        assert_eq!(host.bus.listener_count(), 0);
    }

    #[test]
    fn full_sink_is_counted() {
        let host = host();
        let (bridge, stream) = wire(&host, BridgeConfig::default().with_sink_capacity(1));
        bridge.attach(None);

        host.bus.emit(MutationEvent::action("one"));
        host.bus.emit(MutationEvent::action("two"));

        assert_eq!(stream.len(), 1);
        let stats = bridge.stats();
        assert_eq!(stats.emitted, 1);
        assert_eq!(stats.dropped_by_sink, 1);
    }

    #[test]
    fn subscribe_replaces_filters_in_place() {
        let host = host();
        let (bridge, stream) = wire(&host, BridgeConfig::default().with_default_filters(Vec::<String>::new()));
        bridge.attach(Some(to_strings(&["*"])));

        let active = bridge.subscribe(&to_strings(&["c1.componentName"]));
        assert_eq!(active, vec!["c1.componentName"]);
        assert_eq!(host.bus.listener_count(), 1);

        host.bus.emit(MutationEvent::action("go"));
        let msg = stream.recv().unwrap();
        assert_eq!(msg.stores_state.len(), 1);
        assert_eq!(msg.state_for("c1.componentName"), Some(&json!({"c1": {"componentName": "Counter"}})));
    }

    #[test]
    fn current_state_uses_defaults_when_detached() {
        let host = host();
        let (bridge, _stream) = wire(&host, BridgeConfig::default());
        let state = bridge.current_state();
        assert_eq!(state.len(), 1);
        assert_eq!(state[0].path, "*");
        assert_eq!(
            state[0].value,
            json!({"c1": {"stores": {"s1": {"count": 1}}, "componentName": "Counter"}})
        );
    }

    #[test]
    fn commands_dispatch_to_operations() {
        let host = host();
        let (bridge, stream) = wire(&host, BridgeConfig::default());

        let outcome = bridge.handle_command(InspectorCommand::Attach { filters: None });
        assert!(matches!(outcome, CommandOutcome::Attached { ref filters, .. } if filters == &["*"]));

        let outcome = bridge.handle_command(InspectorCommand::Restore {
            snapshot: json!({"c1": {"stores": {"s1": {"count": 7}}}}),
        });
        match outcome {
            CommandOutcome::Restored { report } => assert_eq!(report.applied, vec!["s1"]),
            other => panic!("unexpected outcome {other:?}"),
        }

        // The restore reaches the inspector as one batch; its report-end is excluded.
        let msgs = stream.drain();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].event.kind(), MutationKind::Batch);
        assert_eq!(
            msgs[0].state_for("*"),
            Some(&json!({"c1": {"stores": {"s1": {"count": 7}}, "componentName": "Counter"}}))
        );

        match bridge.handle_command(InspectorCommand::Refresh) {
            CommandOutcome::State { stores_state } => assert_eq!(stores_state.len(), 1),
            other => panic!("unexpected outcome {other:?}"),
        }

        assert_eq!(
            bridge.handle_command(InspectorCommand::Detach),
            CommandOutcome::Detached { was_attached: true }
        );
    }

    #[test]
    fn invalid_config_is_rejected() {
        let host = host();
        let (sink, _stream) = channel(1);
        let err = ChangeBridge::for_host(&host, Arc::new(sink), BridgeConfig::default().with_sink_capacity(0))
            .unwrap_err();
        assert!(err.is_config());
    }
}
