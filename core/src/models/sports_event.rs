//! Sports event and its odds cache.
//!
//! The 50-entry FIFO movement history follows the teacher's truncate-oldest
//! idiom used for bounded collections throughout `models/event.rs`'s
//! `EventLog`; here it bounds the odds movement history instead of the
//! simulation event log.

use super::ids::SportsEventId;
use super::wager::OddsMillis;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};

const MAX_ODDS_HISTORY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Scheduled,
    Live,
    Completed,
    Cancelled,
    Postponed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OddsSnapshot {
    pub moneyline_home: OddsMillis,
    pub moneyline_away: OddsMillis,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OddsMovement {
    pub timestamp: DateTime<Utc>,
    pub snapshot: OddsSnapshot,
    pub volume: i64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SportsEvent {
    id: SportsEventId,
    sport: String,
    league: String,
    start_time: DateTime<Utc>,
    status: EventStatus,
    vip_access: BTreeSet<String>,
    odds: OddsSnapshot,
    history: VecDeque<OddsMovement>,
}

#[derive(Debug, thiserror::Error)]
pub enum SportsEventError {
    #[error("odds must be > 1.01, got {0}")]
    InvalidOdds(i64),
    #[error("odds.lastUpdated must be monotonically non-decreasing")]
    OddsWentBackwardsInTime,
}

impl SportsEvent {
    pub fn new(sport: impl Into<String>, league: impl Into<String>, start_time: DateTime<Utc>, initial_odds: OddsSnapshot) -> Self {
        Self {
            id: SportsEventId::new(),
            sport: sport.into(),
            league: league.into(),
            start_time,
            status: EventStatus::Scheduled,
            vip_access: BTreeSet::new(),
            odds: initial_odds,
            history: VecDeque::new(),
        }
    }

    pub fn id(&self) -> SportsEventId {
        self.id
    }
    pub fn status(&self) -> EventStatus {
        self.status
    }
    pub fn odds(&self) -> OddsSnapshot {
        self.odds
    }
    pub fn history(&self) -> &VecDeque<OddsMovement> {
        &self.history
    }
    pub fn vip_access(&self) -> &BTreeSet<String> {
        &self.vip_access
    }

    pub fn grant_vip_access(&mut self, tier: impl Into<String>) {
        self.vip_access.insert(tier.into());
    }

    pub fn go_live(&mut self) {
        self.status = EventStatus::Live;
    }

    pub fn complete(&mut self) {
        self.status = EventStatus::Completed;
    }

    /// Appends a movement record and replaces the current snapshot, FIFO
    /// truncating history at 50 entries.
    pub fn update_odds(&mut self, snapshot: OddsSnapshot, volume: i64, reason: impl Into<String>) -> Result<(), SportsEventError> {
        if snapshot.moneyline_home.0 <= 1010 || snapshot.moneyline_away.0 <= 1010 {
            return Err(SportsEventError::InvalidOdds(snapshot.moneyline_home.0.min(snapshot.moneyline_away.0)));
        }
        if snapshot.last_updated < self.odds.last_updated {
            return Err(SportsEventError::OddsWentBackwardsInTime);
        }
        self.history.push_back(OddsMovement { timestamp: snapshot.last_updated, snapshot, volume, reason: reason.into() });
        while self.history.len() > MAX_ODDS_HISTORY {
            self.history.pop_front();
        }
        self.odds = snapshot;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(at: DateTime<Utc>) -> OddsSnapshot {
        OddsSnapshot { moneyline_home: OddsMillis(1910), moneyline_away: OddsMillis(2050), last_updated: at }
    }

    #[test]
    fn history_is_capped_at_50() {
        let base = Utc::now();
        let mut ev = SportsEvent::new("football", "nfl", base, snapshot(base));
        for i in 1..=60 {
            ev.update_odds(snapshot(base + chrono::Duration::seconds(i)), 100, "move").unwrap();
        }
        assert_eq!(ev.history().len(), 50);
    }

    #[test]
    fn odds_boundary_1001_accepted_1000_rejected() {
        let base = Utc::now();
        let mut ev = SportsEvent::new("football", "nfl", base, snapshot(base));
        let ok = ev.update_odds(
            OddsSnapshot { moneyline_home: OddsMillis(1011), moneyline_away: OddsMillis(2000), last_updated: base },
            10,
            "t",
        );
        assert!(ok.is_ok());
        let bad = ev.update_odds(
            OddsSnapshot { moneyline_home: OddsMillis(1010), moneyline_away: OddsMillis(2000), last_updated: base },
            10,
            "t",
        );
        assert!(bad.is_err());
    }
}
