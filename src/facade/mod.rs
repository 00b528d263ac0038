pub mod engine;

pub use engine::StagingEngine;
