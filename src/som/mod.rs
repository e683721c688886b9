pub mod engine;

pub use engine::{SomConfig, SomEnsemble, SomMap};
