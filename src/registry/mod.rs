//! # Registry Infrastructure
//!
//! The action registry maps the `action_name` carried by every task to the
//! host-supplied unit of work that executes it.
//!
//! ```text
//! Registry Infrastructure
//! └── ActionRegistry    (name -> Arc<dyn Action>, panic and timeout guarded invoke)
//! ```

pub mod action_registry;

pub use action_registry::{Action, ActionContext, ActionError, ActionRegistry, FnAction};
