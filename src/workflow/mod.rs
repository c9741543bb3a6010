//! Session-checked operations performed by people rather than the rotation
//! loops: lead intake and disposition, closer registration and duty
//! status, lineup reordering, team setup.
//!
//! Every write goes through a versioned [`WriteBatch`](crate::store::WriteBatch),
//! so a stale read surfaces as a conflict rather than a lost update.

pub mod closers;
pub mod leads;

pub use closers::NewCloser;
pub use leads::NewLead;
