pub mod closer;
pub mod lead;
pub mod session;

pub use closer::{Closer, DutyStatus, Role, Team};
pub use lead::{DispatchType, Lead, LeadStatus};
pub use session::Session;
