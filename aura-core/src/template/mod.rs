//! Template front end: markup tree, expressions and evaluation scopes.

pub mod expr;
pub mod html;
mod scope;

pub use expr::{ExprCache, Expression};
pub use html::{Attr, Element, Node};
pub use scope::Scope;
