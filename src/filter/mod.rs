pub mod expr;

pub use expr::{FilterExpr, Op, Predicate};
