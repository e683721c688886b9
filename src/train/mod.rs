pub mod trainer;

pub use trainer::{train, TrainerOptions};
