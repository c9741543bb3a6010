pub mod api;
pub mod config;
pub mod error;
pub mod model;
pub mod node;
pub mod notify;
pub mod rotation;
pub mod shutdown;
pub mod store;
pub mod workflow;

pub use error::{LeadflowError, Result};
