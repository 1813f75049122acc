//! Request resolution

mod engine;

pub use engine::ResolutionEngine;
