//! Lead rotation: getting waiting leads in front of on-duty closers.
//!
//! # Components
//!
//! - [`promoter`]: moves `scheduled`/`rescheduled` leads to
//!   `waiting_assignment`, `canceled` or `expired` based on their
//!   appointment time and setter verification
//! - [`matcher`]: pairs the oldest waiting leads with the front of the
//!   on-duty lineup and marks them `in_process`
//! - [`lineup`]: read-only lineup projection and manager reordering
//!
//! # Flow
//!
//! 1. A write lands in the [`Store`](crate::store::Store)
//! 2. The promoter and matcher wake on the store's change feed
//! 3. Their batches land back in the store, waking both again
//! 4. A pass with nothing to do writes nothing, so the loop settles

pub mod lineup;
pub mod matcher;
pub mod promoter;

pub use lineup::{LineupEntry, LineupView};
pub use matcher::{Assignment, Matcher};
pub use promoter::{Promoter, PromotionWindows};
