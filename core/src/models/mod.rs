pub mod agent;
pub mod commission;
pub mod customer;
pub mod domain_event;
pub mod ids;
pub mod ledger;
pub mod payout;
pub mod queue_item;
pub mod sports_event;
pub mod wager;

pub use agent::{Agent, AgentError, AgentStatus, AgentType};
pub use commission::{CalculationState, CommissionBreakdown, CommissionCalculation, CommissionStructure};
pub use customer::{AttachmentKind, Customer, CustomerError, Tier};
pub use domain_event::{DomainEvent, EventType, Filter, Scope};
pub use ids::*;
pub use ledger::{AccountKey, Bucket, LedgerAccount, OwnerKind, Posting};
pub use payout::{Payout, PayoutState, PayoutTransitionError};
pub use queue_item::{Direction, MatchAttempt, MatchAttemptState, QueueItem, QueueItemError, QueueItemState};
pub use sports_event::{EventStatus, OddsSnapshot, SportsEvent, SportsEventError};
pub use wager::{OddsMillis, SettlementOutcome, Wager, WagerError, WagerStatus};
