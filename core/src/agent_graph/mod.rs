//! AgentGraph: the agent hierarchy, customer attachment, and tier rules.
//!
//! The cycle-check-by-ancestor-walk is net-new (the teacher has no
//! hierarchy), but the "ordered validation chain returning a typed error at
//! the first violation" shape follows `models/transaction.rs::settle`.

use crate::config::Config;
use crate::error::{CoreResult, ErrorKind, HasErrorKind};
use crate::models::*;
use crate::store::{Store, TxnId};
use std::sync::Arc;
use thiserror::Error;
use tracing::{instrument, warn};

#[derive(Debug, Error)]
pub enum AgentGraphError {
    #[error("login {0:?} is already in use")]
    DuplicateLogin(String),
    #[error("parent agent {0:?} does not exist")]
    ParentNotFound(AgentId),
    #[error("agent {0:?} does not exist")]
    AgentNotFound(AgentId),
    #[error("customer {0:?} does not exist")]
    CustomerNotFound(CustomerId),
    #[error("reparenting {agent:?} under {parent:?} would create a cycle")]
    Cycle { agent: AgentId, parent: AgentId },
    #[error("reparenting {0:?} would exceed the maximum hierarchy depth")]
    TooDeep(AgentId),
    #[error("agent {0:?} is terminated with active child agents or a primary customer")]
    TerminatedWithDependents(AgentId),
    #[error("customer {0:?} already has a primary agent")]
    PrimaryAlreadyAttached(CustomerId),
    #[error("attachment splits would exceed 100% for customer {0:?}")]
    SplitExceeds100(CustomerId),
}

impl HasErrorKind for AgentGraphError {
    fn kind(&self) -> ErrorKind {
        match self {
            AgentGraphError::DuplicateLogin(_) => ErrorKind::Conflict,
            AgentGraphError::ParentNotFound(_) | AgentGraphError::AgentNotFound(_) | AgentGraphError::CustomerNotFound(_) => {
                ErrorKind::NotFound
            }
            AgentGraphError::Cycle { .. } => ErrorKind::Invariant,
            AgentGraphError::TooDeep(_) => ErrorKind::Invariant,
            AgentGraphError::TerminatedWithDependents(_) => ErrorKind::Precondition,
            AgentGraphError::PrimaryAlreadyAttached(_) | AgentGraphError::SplitExceeds100(_) => ErrorKind::Validation,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HierarchyNode {
    pub id: AgentId,
    pub level: u8,
    pub total_sub_agents: u64,
    pub active_sub_agents: u64,
}

pub struct AgentGraph {
    store: Arc<dyn Store>,
    config: Arc<Config>,
}

impl AgentGraph {
    pub fn new(store: Arc<dyn Store>, config: Arc<Config>) -> Self {
        Self { store, config }
    }

    #[instrument(skip(self))]
    pub async fn create_agent(&self, login: &str, agent_type: AgentType, parent_id: Option<AgentId>) -> Result<Agent, AgentGraphError> {
        let txn = self.store.begin().await;
        if self.store.find_agent_by_login(txn, login).await.is_some() {
            self.store.rollback(txn).await;
            warn!(login, "duplicate agent login");
            return Err(AgentGraphError::DuplicateLogin(login.to_string()));
        }
        if let Some(parent) = parent_id {
            if self.store.get_agent(txn, parent).await.is_none() {
                self.store.rollback(txn).await;
                return Err(AgentGraphError::ParentNotFound(parent));
            }
            if self.depth_of(txn, parent).await + 1 > self.config.max_hierarchy_depth {
                self.store.rollback(txn).await;
                return Err(AgentGraphError::TooDeep(parent));
            }
        }
        let agent = Agent::new(login, agent_type, parent_id);
        if let Some(parent) = parent_id {
            let mut parent_agent = self.store.get_agent(txn, parent).await.expect("checked above");
            parent_agent.add_child(agent.id());
            self.store.put_agent(txn, parent_agent).await;
        }
        self.store.put_agent(txn, agent.clone()).await;
        self.store.commit(txn).await.map_err(|_| AgentGraphError::AgentNotFound(agent.id()))?;
        Ok(agent)
    }

    /// Walks ancestors up to `max_hierarchy_depth`, failing fast on revisit.
    async fn would_cycle(&self, txn: TxnId, agent_id: AgentId, new_parent: AgentId) -> bool {
        let mut current = Some(new_parent);
        let mut depth = 0u8;
        while let Some(id) = current {
            if id == agent_id {
                return true;
            }
            depth += 1;
            if depth > self.config.max_hierarchy_depth {
                return true;
            }
            current = match self.store.get_agent(txn, id).await {
                Some(a) => a.parent_id(),
                None => None,
            };
        }
        false
    }

    async fn depth_of(&self, txn: TxnId, agent_id: AgentId) -> u8 {
        let mut depth = 0u8;
        let mut current = Some(agent_id);
        while let Some(id) = current {
            current = match self.store.get_agent(txn, id).await {
                Some(a) => a.parent_id(),
                None => None,
            };
            if current.is_some() {
                depth += 1;
            }
        }
        depth
    }

    #[instrument(skip(self))]
    pub async fn update_agent_parent(&self, agent_id: AgentId, new_parent: Option<AgentId>) -> Result<(), AgentGraphError> {
        let txn = self.store.begin().await;
        let mut agent = match self.store.get_agent(txn, agent_id).await {
            Some(a) => a,
            None => {
                self.store.rollback(txn).await;
                return Err(AgentGraphError::AgentNotFound(agent_id));
            }
        };

        if let Some(parent) = new_parent {
            if self.store.get_agent(txn, parent).await.is_none() {
                self.store.rollback(txn).await;
                return Err(AgentGraphError::ParentNotFound(parent));
            }
            if self.would_cycle(txn, agent_id, parent).await {
                self.store.rollback(txn).await;
                return Err(AgentGraphError::Cycle { agent: agent_id, parent });
            }
            if self.depth_of(txn, parent).await + 1 > self.config.max_hierarchy_depth {
                self.store.rollback(txn).await;
                return Err(AgentGraphError::TooDeep(agent_id));
            }
        }

        if let Some(old_parent_id) = agent.parent_id() {
            if let Some(mut old_parent) = self.store.get_agent(txn, old_parent_id).await {
                old_parent.remove_child(agent_id);
                self.store.put_agent(txn, old_parent).await;
            }
        }
        if let Some(new_parent_id) = new_parent {
            if let Some(mut parent) = self.store.get_agent(txn, new_parent_id).await {
                parent.add_child(agent_id);
                self.store.put_agent(txn, parent).await;
            }
        }
        agent.set_parent_id(new_parent);
        self.store.put_agent(txn, agent).await;
        self.store.commit(txn).await.map_err(|_| AgentGraphError::AgentNotFound(agent_id))
    }

    #[instrument(skip(self))]
    pub async fn attach_customer(
        &self,
        customer_id: CustomerId,
        agent_id: AgentId,
        kind: AttachmentKind,
        split_pct: u8,
    ) -> Result<(), AgentGraphError> {
        let txn = self.store.begin().await;
        let mut customer = match self.store.get_customer(txn, customer_id).await {
            Some(c) => c,
            None => {
                self.store.rollback(txn).await;
                return Err(AgentGraphError::CustomerNotFound(customer_id));
            }
        };
        if self.store.get_agent(txn, agent_id).await.is_none() {
            self.store.rollback(txn).await;
            return Err(AgentGraphError::AgentNotFound(agent_id));
        }
        let result = customer.attach_secondary(agent_id, kind, split_pct);
        match result {
            Ok(()) => {
                self.store.put_customer(txn, customer).await;
                self.store.commit(txn).await.map_err(|_| AgentGraphError::CustomerNotFound(customer_id))
            }
            Err(CustomerError::PrimaryAlreadyAttached) => {
                self.store.rollback(txn).await;
                Err(AgentGraphError::PrimaryAlreadyAttached(customer_id))
            }
            Err(CustomerError::SplitExceeds100 { .. }) => {
                self.store.rollback(txn).await;
                Err(AgentGraphError::SplitExceeds100(customer_id))
            }
            Err(CustomerError::InvalidRiskScore(_)) => unreachable!("attach_secondary never returns this variant"),
        }
    }

    #[instrument(skip(self))]
    pub async fn hierarchy_of(&self, agent_id: AgentId) -> CoreResult<HierarchyNode> {
        let txn = self.store.begin().await;
        let level = self.depth_of(txn, agent_id).await;
        let (total, active) = self.count_subtree(txn, agent_id).await;
        self.store.rollback(txn).await; // read-only
        Ok(HierarchyNode { id: agent_id, level, total_sub_agents: total, active_sub_agents: active })
    }

    async fn count_subtree(&self, txn: TxnId, agent_id: AgentId) -> (u64, u64) {
        let mut queue = vec![agent_id];
        let mut total = 0u64;
        let mut active = 0u64;
        while let Some(id) = queue.pop() {
            let children = self.store.children_of(txn, id).await;
            for child_id in children {
                total += 1;
                if let Some(child) = self.store.get_agent(txn, child_id).await {
                    if child.is_active() {
                        active += 1;
                    }
                }
                queue.push(child_id);
            }
        }
        (total, active)
    }

    #[instrument(skip(self))]
    pub async fn suspend(&self, agent_id: AgentId) -> Result<(), AgentGraphError> {
        self.set_status(agent_id, |a| a.suspend()).await
    }

    #[instrument(skip(self))]
    pub async fn reactivate(&self, agent_id: AgentId) -> Result<(), AgentGraphError> {
        self.set_status(agent_id, |a| a.reactivate()).await
    }

    async fn set_status(&self, agent_id: AgentId, f: impl FnOnce(&mut Agent)) -> Result<(), AgentGraphError> {
        let txn = self.store.begin().await;
        let mut agent = match self.store.get_agent(txn, agent_id).await {
            Some(a) => a,
            None => {
                self.store.rollback(txn).await;
                return Err(AgentGraphError::AgentNotFound(agent_id));
            }
        };
        f(&mut agent);
        self.store.put_agent(txn, agent).await;
        self.store.commit(txn).await.map_err(|_| AgentGraphError::AgentNotFound(agent_id))
    }
}
