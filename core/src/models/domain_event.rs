//! The EventBus's own event envelope, distinct from any per-entity audit
//! log kept by `Store`. Grounded on the teacher's `models/event.rs` closed
//! `Event` enum and its `.tick()/.event_type()` accessor-match idiom — here
//! `kind()`/`scope()` play that role over the bus's payload union.

use super::ids::{AgentId, CustomerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    AgentCreated,
    AgentUpdated,
    WagerPlaced,
    WagerCancelled,
    WagerSettled,
    PayoutPending,
    PayoutProcessing,
    PayoutCompleted,
    PayoutFailed,
    PayoutCancelled,
    QueueItemMatched,
    QueueItemExpired,
    DashboardUpdate,
    SubscriberLagged,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scope {
    pub department: Option<String>,
    pub agent_id: Option<AgentId>,
    pub customer_id: Option<CustomerId>,
}

/// One published bus event. `sequence` is assigned by the bus at publish
/// time and is dense and unique per bus instance (§3 invariant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub sequence: u64,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub scope: Scope,
    pub payload: Value,
}

impl DomainEvent {
    pub fn new(sequence: u64, event_type: EventType, scope: Scope, payload: Value) -> Self {
        Self { sequence, event_type, timestamp: Utc::now(), scope, payload }
    }
}

/// Conjunctive filter over `{departmentIds, eventTypes, agentScope,
/// customerScope}`, as §4.6 specifies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Filter {
    pub department_ids: Vec<String>,
    pub event_types: Vec<EventType>,
    pub agent_scope: Option<AgentId>,
    pub customer_scope: Option<CustomerId>,
}

impl Filter {
    pub fn matches(&self, event: &DomainEvent) -> bool {
        if !self.event_types.is_empty() && !self.event_types.contains(&event.event_type) {
            return false;
        }
        if !self.department_ids.is_empty() {
            match &event.scope.department {
                Some(d) if self.department_ids.iter().any(|id| id == d) => {}
                _ => return false,
            }
        }
        if let Some(scope_agent) = self.agent_scope {
            if event.scope.agent_id != Some(scope_agent) {
                return false;
            }
        }
        if let Some(scope_customer) = self.customer_scope {
            if event.scope.customer_id != Some(scope_customer) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_conjoins_event_type_and_department() {
        let mut filter = Filter::default();
        filter.event_types = vec![EventType::WagerPlaced];
        filter.department_ids = vec!["risk".to_string()];

        let matching = DomainEvent::new(
            1,
            EventType::WagerPlaced,
            Scope { department: Some("risk".to_string()), ..Default::default() },
            Value::Null,
        );
        let wrong_department = DomainEvent::new(
            2,
            EventType::WagerPlaced,
            Scope { department: Some("ops".to_string()), ..Default::default() },
            Value::Null,
        );
        let wrong_type = DomainEvent::new(
            3,
            EventType::WagerCancelled,
            Scope { department: Some("risk".to_string()), ..Default::default() },
            Value::Null,
        );

        assert!(filter.matches(&matching));
        assert!(!filter.matches(&wrong_department));
        assert!(!filter.matches(&wrong_type));
    }
}
