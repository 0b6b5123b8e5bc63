//! Stack model
//!
//! The data model of a provisioning stack: global settings plus the two
//! optional provisioning units.

mod cache;
mod frontend;
mod stack;

// Re-exports
pub use cache::*;
pub use frontend::*;
pub use stack::*;
