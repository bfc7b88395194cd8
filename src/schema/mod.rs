//! Plain data: geometry, flag predicates, and the on-disk descriptor DSL.

pub mod conditions;
pub mod descriptor;
pub mod geometry;
