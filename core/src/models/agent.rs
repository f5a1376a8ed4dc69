//! Agent entity: the sportsbook hierarchy node.
//!
//! Grounded on the teacher's `models/agent.rs` shape: a plain struct with a
//! constructor that panics on true programmer-error invariants, accessor
//! methods, and mutation methods that return a `thiserror` error for
//! recoverable failures.

use super::ids::{AgentId, CommissionStructureId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    User,
    Agent,
    Master,
    Super,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Inactive,
    Suspended,
    Terminated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    id: AgentId,
    login: String,
    parent_id: Option<AgentId>,
    agent_type: AgentType,
    status: AgentStatus,
    office_tag: String,
    commission_structure_id: Option<CommissionStructureId>,
    permissions: u64,
    config: Value,
    children: Vec<AgentId>,
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent {0} is terminated and has active child agents or primary customers")]
    TerminatedWithActiveDependents(AgentId),
}

impl Agent {
    /// # Panics
    /// Panics if `login` is empty — a caller-side programming error, not a
    /// recoverable business condition (uniqueness is AgentGraph's concern).
    pub fn new(login: impl Into<String>, agent_type: AgentType, parent_id: Option<AgentId>) -> Self {
        let login = login.into();
        assert!(!login.trim().is_empty(), "login must not be empty");
        Self {
            id: AgentId::new(),
            login,
            parent_id,
            agent_type,
            status: AgentStatus::Active,
            office_tag: String::new(),
            commission_structure_id: None,
            permissions: 0,
            config: Value::Object(Default::default()),
            children: Vec::new(),
        }
    }

    pub fn with_office_tag(mut self, tag: impl Into<String>) -> Self {
        self.office_tag = tag.into();
        self
    }

    pub fn with_commission_structure(mut self, structure_id: CommissionStructureId) -> Self {
        self.commission_structure_id = Some(structure_id);
        self
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn login(&self) -> &str {
        &self.login
    }

    pub fn parent_id(&self) -> Option<AgentId> {
        self.parent_id
    }

    pub fn set_parent_id(&mut self, parent_id: Option<AgentId>) {
        self.parent_id = parent_id;
    }

    pub fn agent_type(&self) -> AgentType {
        self.agent_type
    }

    pub fn status(&self) -> AgentStatus {
        self.status
    }

    pub fn commission_structure_id(&self) -> Option<CommissionStructureId> {
        self.commission_structure_id
    }

    pub fn children(&self) -> &[AgentId] {
        &self.children
    }

    pub fn add_child(&mut self, child: AgentId) {
        if !self.children.contains(&child) {
            self.children.push(child);
        }
    }

    pub fn remove_child(&mut self, child: AgentId) {
        self.children.retain(|c| *c != child);
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, AgentStatus::Active)
    }

    pub fn suspend(&mut self) {
        self.status = AgentStatus::Suspended;
    }

    pub fn reactivate(&mut self) {
        self.status = AgentStatus::Active;
    }

    /// Only the AgentGraph may decide whether dependents actually block
    /// termination (it needs the full child/customer index); this just
    /// flips the status once the caller has confirmed it's safe.
    pub fn terminate(&mut self) {
        self.status = AgentStatus::Terminated;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "login must not be empty")]
    fn new_rejects_empty_login() {
        Agent::new("", AgentType::Agent, None);
    }

    #[test]
    fn child_list_dedupes() {
        let mut agent = Agent::new("agent1", AgentType::Master, None);
        let child = AgentId::new();
        agent.add_child(child);
        agent.add_child(child);
        assert_eq!(agent.children().len(), 1);
    }
}
