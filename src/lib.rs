//! Scene Engine: data-driven scenes, dialogue and scripted events for
//! top-down 2D narrative adventures.
//!
//! Scenes are declared in JSON descriptors and loaded into a runtime graph
//! of entities, routes, dialogue trees, triggers and dispatch chains. The
//! host supplies input, a frame delta, and implementations of the asset,
//! audio and render seams; the engine does the rest.

pub mod core;
pub mod schema;
