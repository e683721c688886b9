pub mod record;
pub mod scorer;

pub use record::{IndelContext, SiteScore, VariantType};
pub use scorer::{score, ScorerOptions};
