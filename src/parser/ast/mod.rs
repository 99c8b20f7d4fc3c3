//! Abstract syntax tree for Zylo programs.
//!
//! The tree is a disjoint union of three node categories: [`Statement`],
//! [`Expression`] and [`Pattern`]. Nodes are strictly tree-shaped (owned
//! downward, no parent pointers) and every node records the span of the
//! token that introduced it.

mod expression;
mod pattern;
mod statement;
mod type_name;

pub use self::expression::*;
pub use self::pattern::*;
pub use self::statement::*;
pub use self::type_name::*;

/// The root of a parse: an ordered sequence of statements.
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Program {
    pub statements: Vec<Statement>,
}
