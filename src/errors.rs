use thiserror::Error;

/// Fatal error kinds surfaced by the pipeline. The core never attempts a
/// partial-result recovery (spec `ERROR HANDLING DESIGN`): every one of these
/// propagates to the CLI layer and ends the process with a non-zero exit
/// code.
#[derive(Debug, Error)]
pub enum Error {
    #[error("header mismatch: expected first five columns CHROM, POS, MASK, REF, ALT, found {found}")]
    HeaderMismatch { found: String },

    #[error("malformed row at line {line}: {detail}")]
    MalformedRow { line: u64, detail: String },

    #[error("unknown annotation requested: {name}")]
    UnknownAnnotation { name: String },

    #[error("degenerate distribution for annotation {name}: scale_lo == scale_hi")]
    DegenerateDistribution { name: String },

    #[error("too many selected slots: {count} exceeds the {limit}-bit pack width")]
    TooManySlots { count: usize, limit: usize },

    #[error("duplicate column name: {name}")]
    DuplicateColumn { name: String },

    #[error("region mismatch at apply time: sites file has {in_sites}, query has {in_query}")]
    RegionMismatch { in_sites: String, in_query: String },

    #[error("invalid filter expression: {0}")]
    FilterParse(String),

    #[error("invalid SOMFILTER_SORT_ARGS value, rejected character(s) in {0:?}")]
    InvalidSortArgs(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
