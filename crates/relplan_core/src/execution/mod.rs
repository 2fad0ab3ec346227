pub mod cost;
pub mod evaluator;
pub mod operators;
