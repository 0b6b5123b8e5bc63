//! skyforge-core
//!
//! Stack definition for skyforge: the data model, the KDL parser, template
//! expansion and validation.
//!
//! ```kdl
//! project "my-project"
//! environment "production"
//!
//! cache {
//!     tier "high-availability"
//!     replica-count 1
//! }
//!
//! frontend {
//!     domains "chatbot.example.com"
//! }
//! ```

pub mod error;
pub mod loader;
pub mod model;
pub mod parser;
pub mod template;
pub mod validate;

pub use error::{Result, StackError};
pub use loader::{load_stack, load_stack_str, parse_unvalidated};
pub use model::*;
pub use parser::parse_stack_str;
pub use template::{TemplateProcessor, Variables};
pub use validate::validate_stack;
