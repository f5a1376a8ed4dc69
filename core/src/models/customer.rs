//! Customer entity: tiered accountholder attached to one primary agent plus
//! any number of secondary/temporary attachments.

use super::ids::{AgentId, CustomerId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Bronze,
    Silver,
    Gold,
    Platinum,
    Diamond,
    Vip,
}

impl Tier {
    /// Greatest tier a customer's lifetime volume (minor units) qualifies for.
    pub fn from_lifetime_volume(volume: i64) -> Self {
        match volume {
            v if v >= 10_000_000 => Tier::Vip,
            v if v >= 2_500_000 => Tier::Diamond,
            v if v >= 500_000 => Tier::Platinum,
            v if v >= 100_000 => Tier::Gold,
            v if v >= 10_000 => Tier::Silver,
            _ => Tier::Bronze,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerStatus {
    Active,
    Inactive,
    Suspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KycState {
    Unverified,
    Pending,
    Verified,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Primary,
    Secondary,
    Temporary,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Attachment {
    pub agent_id: AgentId,
    pub kind: AttachmentKind,
    /// Commission split percentage, `0..=100`. Always 100 for `Primary`.
    pub split_pct: u8,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Balances {
    pub main: i64,
    pub casino: i64,
    pub sports: i64,
    pub freeplay: i64,
    pub freeplay_pending: i64,
}

impl Balances {
    pub fn all_non_negative(&self) -> bool {
        self.main >= 0 && self.casino >= 0 && self.sports >= 0 && self.freeplay >= 0 && self.freeplay_pending >= 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    id: CustomerId,
    attachments: Vec<Attachment>,
    tier: Tier,
    status: CustomerStatus,
    balances: Balances,
    lifetime_volume: i64,
    risk_score: u8,
    kyc_state: KycState,
}

#[derive(Debug, Error)]
pub enum CustomerError {
    #[error("customer already has a primary agent attachment")]
    PrimaryAlreadyAttached,
    #[error("secondary/temporary commission splits would exceed 100%: {total}")]
    SplitExceeds100 { total: u16 },
    #[error("risk score must be in 0..=100, got {0}")]
    InvalidRiskScore(u8),
}

impl Customer {
    pub fn new(primary_agent: AgentId) -> Self {
        Self {
            id: CustomerId::new(),
            attachments: vec![Attachment { agent_id: primary_agent, kind: AttachmentKind::Primary, split_pct: 100 }],
            tier: Tier::Bronze,
            status: CustomerStatus::Active,
            balances: Balances::default(),
            lifetime_volume: 0,
            risk_score: 0,
            kyc_state: KycState::Unverified,
        }
    }

    pub fn id(&self) -> CustomerId {
        self.id
    }

    pub fn primary_agent(&self) -> AgentId {
        self.attachments
            .iter()
            .find(|a| matches!(a.kind, AttachmentKind::Primary))
            .map(|a| a.agent_id)
            .expect("invariant: exactly one primary attachment always exists")
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn status(&self) -> CustomerStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, CustomerStatus::Active)
    }

    pub fn balances(&self) -> Balances {
        self.balances
    }

    pub fn risk_score(&self) -> u8 {
        self.risk_score
    }

    pub fn kyc_state(&self) -> KycState {
        self.kyc_state
    }

    pub fn lifetime_volume(&self) -> i64 {
        self.lifetime_volume
    }

    /// Folds new wager volume into the lifetime counter and recomputes tier.
    /// Intended to be called from the same `Store` transaction as the
    /// ledger move it accompanies, per the risk/tier-atomicity decision.
    pub fn record_volume(&mut self, amount: i64) {
        self.lifetime_volume += amount;
        let implied = Tier::from_lifetime_volume(self.lifetime_volume);
        if implied > self.tier {
            self.tier = implied;
        }
    }

    pub fn set_risk_score(&mut self, score: u8) -> Result<(), CustomerError> {
        if score > 100 {
            return Err(CustomerError::InvalidRiskScore(score));
        }
        self.risk_score = score;
        Ok(())
    }

    pub fn attach_secondary(
        &mut self,
        agent_id: AgentId,
        kind: AttachmentKind,
        split_pct: u8,
    ) -> Result<(), CustomerError> {
        if matches!(kind, AttachmentKind::Primary) {
            return Err(CustomerError::PrimaryAlreadyAttached);
        }
        let existing: u16 = self
            .attachments
            .iter()
            .filter(|a| !matches!(a.kind, AttachmentKind::Primary))
            .map(|a| a.split_pct as u16)
            .sum();
        let total = existing + split_pct as u16;
        if total > 100 {
            return Err(CustomerError::SplitExceeds100 { total });
        }
        self.attachments.push(Attachment { agent_id, kind, split_pct });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_tracks_lifetime_volume() {
        let mut c = Customer::new(AgentId::new());
        assert_eq!(c.tier(), Tier::Bronze);
        c.record_volume(600_000);
        assert_eq!(c.tier(), Tier::Platinum);
    }

    #[test]
    fn secondary_split_cannot_exceed_100() {
        let mut c = Customer::new(AgentId::new());
        c.attach_secondary(AgentId::new(), AttachmentKind::Secondary, 60).unwrap();
        let err = c.attach_secondary(AgentId::new(), AttachmentKind::Temporary, 50).unwrap_err();
        assert!(matches!(err, CustomerError::SplitExceeds100 { total: 110 }));
    }
}
