//! Delegation
//!
//! Resolves delegator ids to leaf specialists. The decisions come from a
//! [`Chooser`] or [`AsyncChooser`]; the resolver only offers options and
//! enforces the depth limit.

pub mod chooser;
pub mod resolver;

pub use chooser::{AsyncChooser, Chooser, FirstOption};
pub use resolver::DelegationResolver;
