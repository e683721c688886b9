pub mod dist;
pub mod scale;

pub use dist::DistributionStats;
pub use scale::Scaler;
