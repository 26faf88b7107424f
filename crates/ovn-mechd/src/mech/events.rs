//! Entity-database notifications outside the mechanism driver hooks.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use ovn_nb_common::model::{SecurityGroupRule, Segment};

use crate::acl::SecurityGroupEvent;
use crate::error::DriverResult;

use super::driver::{OvnMechDriver, RuleNotification, WorkerKind};

const SOURCE: &str = "EventRegistry";

/// Kinds of notification a handler can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    ProcessStarted,
    SegmentCreated,
    SecurityGroupCreated,
    SecurityGroupUpdated,
    SecurityGroupDeleting,
    SecurityGroupRuleCreated,
    SecurityGroupRuleDeleting,
}

impl EventKind {
    /// Security-group kinds, only subscribed to with security groups on.
    pub const SECURITY_GROUP: [EventKind; 5] = [
        EventKind::SecurityGroupCreated,
        EventKind::SecurityGroupUpdated,
        EventKind::SecurityGroupDeleting,
        EventKind::SecurityGroupRuleCreated,
        EventKind::SecurityGroupRuleDeleting,
    ];
}

/// A notification with its payload.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverEvent {
    ProcessStarted(WorkerKind),
    SegmentCreated(Segment),
    SecurityGroupCreated { id: String, name: String },
    SecurityGroupUpdated { id: String, name: String },
    /// Sent before the group is removed from the entity database.
    SecurityGroupDeleting { id: String, name: String },
    SecurityGroupRuleCreated(SecurityGroupRule),
    /// Sent before the rule is removed; the rule can still be read.
    SecurityGroupRuleDeleting { rule_id: String },
}

impl DriverEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            DriverEvent::ProcessStarted(_) => EventKind::ProcessStarted,
            DriverEvent::SegmentCreated(_) => EventKind::SegmentCreated,
            DriverEvent::SecurityGroupCreated { .. } => EventKind::SecurityGroupCreated,
            DriverEvent::SecurityGroupUpdated { .. } => EventKind::SecurityGroupUpdated,
            DriverEvent::SecurityGroupDeleting { .. } => EventKind::SecurityGroupDeleting,
            DriverEvent::SecurityGroupRuleCreated(_) => EventKind::SecurityGroupRuleCreated,
            DriverEvent::SecurityGroupRuleDeleting { .. } => EventKind::SecurityGroupRuleDeleting,
        }
    }
}

/// Receives the notifications it subscribed to.
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &str;

    /// Kinds to deliver. Read once, at registration.
    fn subscriptions(&self) -> Vec<EventKind>;

    async fn handle(&self, event: &DriverEvent) -> DriverResult<()>;
}

/// Delivers notifications to the handlers subscribed to their kind, in
/// registration order.
#[derive(Default)]
pub struct EventRegistry {
    handlers: BTreeMap<EventKind, Vec<Arc<dyn EventHandler>>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn EventHandler>) {
        let kinds = handler.subscriptions();
        info_log!(
            SOURCE,
            handler = handler.name(),
            kinds = ?kinds,
            "Registering event handler"
        );
        for kind in kinds {
            self.handlers.entry(kind).or_default().push(handler.clone());
        }
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }

    /// Runs every subscribed handler. The first failure stops delivery and
    /// is returned.
    pub async fn publish(&self, event: &DriverEvent) -> DriverResult<()> {
        let Some(handlers) = self.handlers.get(&event.kind()) else {
            debug_log!(SOURCE, kind = ?event.kind(), "No subscribers for event");
            return Ok(());
        };
        for handler in handlers {
            if let Err(e) = handler.handle(event).await {
                error_log!(
                    SOURCE,
                    handler = handler.name(),
                    kind = ?event.kind(),
                    error = %e,
                    "Event handler failed"
                );
                return Err(e);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl EventHandler for OvnMechDriver {
    fn name(&self) -> &str {
        super::driver::DRIVER_NAME
    }

    fn subscriptions(&self) -> Vec<EventKind> {
        let mut kinds = vec![EventKind::ProcessStarted, EventKind::SegmentCreated];
        if self.sg_enabled() {
            kinds.extend(EventKind::SECURITY_GROUP);
        }
        kinds
    }

    async fn handle(&self, event: &DriverEvent) -> DriverResult<()> {
        match event {
            DriverEvent::ProcessStarted(worker) => self.post_fork_initialize(*worker).await,
            DriverEvent::SegmentCreated(segment) => {
                self.add_segment_host_mapping_for_segment(segment)
            }
            DriverEvent::SecurityGroupCreated { id, name } => {
                self.process_security_group(id, name, SecurityGroupEvent::Created)
                    .await
            }
            DriverEvent::SecurityGroupUpdated { id, name } => {
                self.process_security_group(id, name, SecurityGroupEvent::Updated)
                    .await
            }
            DriverEvent::SecurityGroupDeleting { id, name } => {
                self.process_security_group(id, name, SecurityGroupEvent::Deleting)
                    .await
            }
            DriverEvent::SecurityGroupRuleCreated(rule) => {
                self.process_security_group_rule(RuleNotification::Created(rule))
                    .await
            }
            DriverEvent::SecurityGroupRuleDeleting { rule_id } => {
                self.process_security_group_rule(RuleNotification::Deleting(rule_id))
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OvnMechConfig;
    use crate::error::DriverError;
    use crate::mech::Collaborators;
    use crate::standalone::{MemoryPlugin, MemoryProvisioning, MemorySegmentDb, StaticChassisStore};
    use ovn_nb_common::{MemoryNb, NbStore};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    struct Recorder {
        name: String,
        seen: Mutex<Vec<EventKind>>,
        fail: bool,
    }

    impl Recorder {
        fn new(name: &str, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                seen: Mutex::new(Vec::new()),
                fail,
            })
        }

        fn seen(&self) -> Vec<EventKind> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventHandler for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        fn subscriptions(&self) -> Vec<EventKind> {
            vec![EventKind::SegmentCreated]
        }

        async fn handle(&self, event: &DriverEvent) -> DriverResult<()> {
            self.seen.lock().unwrap().push(event.kind());
            if self.fail {
                return Err(DriverError::invalid_input("event", "rejected"));
            }
            Ok(())
        }
    }

    fn driver(sg_enabled: bool) -> (Arc<MemoryNb>, Arc<OvnMechDriver>) {
        let nb = Arc::new(MemoryNb::new());
        let collab = Collaborators::new(
            nb.clone(),
            Arc::new(MemoryPlugin::new()),
            Arc::new(StaticChassisStore::new()),
            Arc::new(MemoryProvisioning::new()),
            Arc::new(MemorySegmentDb::new()),
        );
        let config = OvnMechConfig {
            security_groups_enabled: sg_enabled,
            ..Default::default()
        };
        (nb, Arc::new(OvnMechDriver::new(config, collab)))
    }

    #[test]
    fn test_subscriptions_follow_security_group_setting() {
        let mut registry = EventRegistry::new();
        registry.register(driver(false).1);
        assert_eq!(registry.subscriber_count(EventKind::ProcessStarted), 1);
        assert_eq!(registry.subscriber_count(EventKind::SegmentCreated), 1);
        for kind in EventKind::SECURITY_GROUP {
            assert_eq!(registry.subscriber_count(kind), 0);
        }

        registry.register(driver(true).1);
        assert_eq!(registry.subscriber_count(EventKind::SecurityGroupRuleCreated), 1);
        assert_eq!(registry.subscriber_count(EventKind::ProcessStarted), 2);
    }

    #[tokio::test]
    async fn test_security_group_events_maintain_address_sets() {
        let (nb, driver) = driver(true);
        let mut registry = EventRegistry::new();
        registry.register(driver);

        let created = DriverEvent::SecurityGroupCreated {
            id: "sg1".to_string(),
            name: "web".to_string(),
        };
        registry.publish(&created).await.unwrap();
        assert!(nb.get_address_set("as_ip4_sg1").unwrap().is_some());
        assert!(nb.get_address_set("as_ip6_sg1").unwrap().is_some());

        let deleting = DriverEvent::SecurityGroupDeleting {
            id: "sg1".to_string(),
            name: "web".to_string(),
        };
        registry.publish(&deleting).await.unwrap();
        assert!(nb.get_address_set("as_ip4_sg1").unwrap().is_none());
        assert!(nb.get_address_set("as_ip6_sg1").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_publish_stops_at_first_failure() {
        let first = Recorder::new("first", true);
        let second = Recorder::new("second", false);
        let mut registry = EventRegistry::new();
        registry.register(first.clone());
        registry.register(second.clone());

        let segment = Segment {
            id: "s1".to_string(),
            network_type: ovn_types::NetworkType::Geneve,
            physical_network: None,
            segmentation_id: None,
        };
        let err = registry
            .publish(&DriverEvent::SegmentCreated(segment))
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(first.seen(), vec![EventKind::SegmentCreated]);
        assert!(second.seen().is_empty());

        // Nobody listens for group events here.
        registry
            .publish(&DriverEvent::SecurityGroupRuleDeleting {
                rule_id: "r1".to_string(),
            })
            .await
            .unwrap();
    }
}
