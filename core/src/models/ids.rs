//! Typed entity identifiers.
//!
//! Arena/id-based references rather than native pointers, per the cyclic
//! reference design note: the agent hierarchy and event/wager/posting links
//! are all stored as these ids, resolved through `Store`.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(u: Uuid) -> Self {
                Self(u)
            }
        }
    };
}

id_type!(AgentId);
id_type!(CustomerId);
id_type!(LedgerAccountId);
id_type!(WagerId);
id_type!(SportsEventId);
id_type!(CommissionStructureId);
id_type!(CommissionCalculationId);
id_type!(PayoutId);
id_type!(QueueItemId);
id_type!(MatchAttemptId);
id_type!(SubscriptionId);
