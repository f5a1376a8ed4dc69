//! Wager entity and its settlement state machine.
//!
//! Grounded on the teacher's `models/transaction.rs`: a closed status enum,
//! an explicit ordered-validation `settle` method, and accessors rather than
//! public fields. `TransactionStatus` becomes `WagerStatus`; `settle(amount,
//! tick)` becomes `settle(outcome, now)` with the payout math this domain
//! needs instead of the teacher's RTGS partial-amount semantics.

use super::ids::{AgentId, CustomerId, SportsEventId, WagerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{ErrorKind, HasErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WagerStatus {
    Pending,
    Active,
    Won,
    Lost,
    Cancelled,
    Void,
    Pushed,
}

impl WagerStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, WagerStatus::Pending | WagerStatus::Active)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementOutcome {
    Won,
    Lost,
    Void,
    Pushed,
}

impl From<SettlementOutcome> for WagerStatus {
    fn from(o: SettlementOutcome) -> Self {
        match o {
            SettlementOutcome::Won => WagerStatus::Won,
            SettlementOutcome::Lost => WagerStatus::Lost,
            SettlementOutcome::Void => WagerStatus::Void,
            SettlementOutcome::Pushed => WagerStatus::Pushed,
        }
    }
}

/// Odds as fixed three-decimal precision, stored as thousandths (1.910 ->
/// 1910) so all payout math stays integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OddsMillis(pub i64);

impl OddsMillis {
    pub fn from_decimal(value: f64) -> Self {
        Self((value * 1000.0).round() as i64)
    }

    pub fn as_decimal(self) -> f64 {
        self.0 as f64 / 1000.0
    }
}

#[derive(Debug, Error)]
pub enum WagerError {
    #[error("stake must be > 0, got {0}")]
    InvalidStake(i64),
    #[error("odds must be > 1.000, got {0}")]
    InvalidOdds(i64),
    #[error("wager {0:?} is in state {1:?}, which does not allow this transition")]
    InvalidState(WagerId, WagerStatus),
}

impl HasErrorKind for WagerError {
    fn kind(&self) -> ErrorKind {
        match self {
            WagerError::InvalidStake(_) | WagerError::InvalidOdds(_) => ErrorKind::Validation,
            WagerError::InvalidState(..) => ErrorKind::Precondition,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wager {
    id: WagerId,
    customer_id: CustomerId,
    agent_id: AgentId,
    event_id: SportsEventId,
    bet_type: String,
    selection: String,
    stake: i64,
    odds: OddsMillis,
    potential_payout: i64,
    risk_level: u8,
    vip_tier: String,
    status: WagerStatus,
    placed_at: DateTime<Utc>,
    settled_at: Option<DateTime<Utc>>,
    actual_win: Option<i64>,
    settled_by: Option<String>,
}

impl Wager {
    pub fn new(
        customer_id: CustomerId,
        agent_id: AgentId,
        event_id: SportsEventId,
        bet_type: impl Into<String>,
        selection: impl Into<String>,
        stake: i64,
        odds: OddsMillis,
        vip_tier: impl Into<String>,
    ) -> Result<Self, WagerError> {
        if stake <= 0 {
            return Err(WagerError::InvalidStake(stake));
        }
        if odds.0 <= 1000 {
            return Err(WagerError::InvalidOdds(odds.0));
        }
        let potential_payout = potential_payout(stake, odds);
        Ok(Self {
            id: WagerId::new(),
            customer_id,
            agent_id,
            event_id,
            bet_type: bet_type.into(),
            selection: selection.into(),
            stake,
            odds,
            potential_payout,
            risk_level: 0,
            vip_tier: vip_tier.into(),
            status: WagerStatus::Pending,
            placed_at: Utc::now(),
            settled_at: None,
            actual_win: None,
            settled_by: None,
        })
    }

    pub fn id(&self) -> WagerId {
        self.id
    }
    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }
    pub fn agent_id(&self) -> AgentId {
        self.agent_id
    }
    pub fn event_id(&self) -> SportsEventId {
        self.event_id
    }
    pub fn stake(&self) -> i64 {
        self.stake
    }
    pub fn odds(&self) -> OddsMillis {
        self.odds
    }
    pub fn potential_payout(&self) -> i64 {
        self.potential_payout
    }
    pub fn status(&self) -> WagerStatus {
        self.status
    }
    pub fn placed_at(&self) -> DateTime<Utc> {
        self.placed_at
    }
    pub fn settled_at(&self) -> Option<DateTime<Utc>> {
        self.settled_at
    }
    pub fn actual_win(&self) -> Option<i64> {
        self.actual_win
    }
    pub fn vip_tier(&self) -> &str {
        &self.vip_tier
    }

    pub fn set_risk_level(&mut self, level: u8) {
        self.risk_level = level;
    }

    pub fn set_vip_tier(&mut self, tier: impl Into<String>) {
        self.vip_tier = tier.into();
    }

    /// Moves `pending -> active` when the underlying event goes live. Not
    /// reachable from any other state.
    pub fn activate(&mut self) -> Result<(), WagerError> {
        if self.status != WagerStatus::Pending {
            return Err(WagerError::InvalidState(self.id, self.status));
        }
        self.status = WagerStatus::Active;
        Ok(())
    }

    /// `pending -> cancelled` only.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), WagerError> {
        if self.status != WagerStatus::Pending {
            return Err(WagerError::InvalidState(self.id, self.status));
        }
        self.status = WagerStatus::Cancelled;
        self.settled_at = Some(now);
        Ok(())
    }

    /// `{pending, active} -> {won, lost, void, pushed}`. Returns the actual
    /// win amount credited to the customer for the caller to post to the
    /// ledger (release-reserved-then-credit for `won`, reserved-to-house for
    /// `lost`, release-only for `void`/`pushed`).
    pub fn settle(&mut self, outcome: SettlementOutcome, now: DateTime<Utc>, settled_by: impl Into<String>) -> Result<i64, WagerError> {
        if !matches!(self.status, WagerStatus::Pending | WagerStatus::Active) {
            return Err(WagerError::InvalidState(self.id, self.status));
        }
        let actual_win = match outcome {
            SettlementOutcome::Won => self.potential_payout,
            SettlementOutcome::Lost => 0,
            SettlementOutcome::Void | SettlementOutcome::Pushed => self.stake,
        };
        self.status = outcome.into();
        self.settled_at = Some(now);
        self.actual_win = Some(actual_win);
        self.settled_by = Some(settled_by.into());
        Ok(actual_win)
    }
}

/// `potentialPayout = floor(stake * (odds - 1.000))` with banker's rounding
/// on the integer multiply-then-divide.
pub fn potential_payout(stake: i64, odds: OddsMillis) -> i64 {
    let numerator = stake * (odds.0 - 1000);
    banker_round_div(numerator, 1000)
}

fn banker_round_div(numerator: i64, denom: i64) -> i64 {
    debug_assert!(denom > 0);
    let quotient = numerator.div_euclid(denom);
    let remainder = numerator.rem_euclid(denom);
    let twice = remainder * 2;
    if twice < denom {
        quotient
    } else if twice > denom {
        quotient + 1
    } else if quotient % 2 == 0 {
        quotient
    } else {
        quotient + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_scenario_1_payout_math() {
        let payout = potential_payout(2500, OddsMillis::from_decimal(1.910));
        assert_eq!(payout, 2275);
    }

    #[test]
    fn banker_rounding_rounds_half_to_even() {
        assert_eq!(banker_round_div(5, 2), 2); // 2.5 -> 2
        assert_eq!(banker_round_div(7, 2), 4); // 3.5 -> 4
        assert_eq!(banker_round_div(9, 2), 4); // 4.5 -> 4
    }

    #[test]
    fn odds_boundary_1001_accepted_1000_rejected() {
        assert!(Wager::new(
            CustomerId::new(), AgentId::new(), SportsEventId::new(), "moneyline", "home",
            100, OddsMillis(1001), "bronze",
        ).is_ok());
        assert!(matches!(
            Wager::new(
                CustomerId::new(), AgentId::new(), SportsEventId::new(), "moneyline", "home",
                100, OddsMillis(1000), "bronze",
            ),
            Err(WagerError::InvalidOdds(1000))
        ));
    }

    #[test]
    fn settle_requires_pending_or_active() {
        let mut w = Wager::new(
            CustomerId::new(),
            AgentId::new(),
            SportsEventId::new(),
            "moneyline",
            "home",
            2500,
            OddsMillis::from_decimal(1.910),
            "silver",
        )
        .unwrap();
        w.settle(SettlementOutcome::Won, Utc::now(), "system").unwrap();
        let err = w.settle(SettlementOutcome::Won, Utc::now(), "system").unwrap_err();
        assert!(matches!(err, WagerError::InvalidState(_, WagerStatus::Won)));
    }
}
