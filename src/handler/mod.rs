//! Request handler module
//!
//! Responsible for request dispatch and the bucket proxy logic.

pub mod asset;
pub mod router;

// Re-export main entry point
pub use router::{handle_request, EdgeHandler};
