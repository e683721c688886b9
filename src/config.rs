//! `PipelineContext`: the explicit, passed-by-reference argument bundle that
//! the `run` subcommand threads through `build-stats` -> `train` -> `score`
//! -> `evaluate` instead of mutating a single shared global as the stages
//! run as a single shared global argument container.

use std::path::PathBuf;

use crate::table::goodmask::GoodMask;

/// A `chrom:start-end` region restriction (1-based, inclusive), used to
/// limit which rows of the annotation table are considered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub chrom: String,
    pub start: Option<u64>,
    pub end: Option<u64>,
}

impl Region {
    pub fn parse(s: &str) -> Option<Self> {
        let (chrom, range) = match s.split_once(':') {
            Some((c, r)) => (c, Some(r)),
            None => (s, None),
        };
        if chrom.is_empty() {
            return None;
        }
        let (start, end) = match range {
            None => (None, None),
            Some(r) => {
                let (start_str, end_str) = r.split_once('-')?;
                let start: u64 = start_str.parse().ok()?;
                let end: u64 = end_str.parse().ok()?;
                (Some(start), Some(end))
            }
        };
        Some(Self {
            chrom: chrom.to_owned(),
            start,
            end,
        })
    }

    pub fn contains(&self, chrom: &str, pos: u64) -> bool {
        if chrom != self.chrom {
            return false;
        }
        match (self.start, self.end) {
            (Some(start), Some(end)) => pos >= start && pos <= end,
            _ => true,
        }
    }
}

/// Settings shared across every stage of a `run` pipeline invocation.
/// Individual stages still take only the fields they need as plain
/// parameters (`TableReader::open_selected`, `train::train`, `score::score`,
/// `eval::evaluate`); this struct exists so the CLI layer builds the shared
/// settings exactly once and hands out borrows, rather than re-parsing or
/// re-deriving them at each stage or threading a mutable struct through.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub table_path: PathBuf,
    pub prefix: PathBuf,
    pub annotations: Vec<String>,
    pub good_mask: GoodMask,
    pub seed: u64,
    pub region: Option<Region>,
}

impl PipelineContext {
    pub fn new(
        table_path: PathBuf,
        prefix: PathBuf,
        annotations: Vec<String>,
        good_mask: GoodMask,
        seed: u64,
        region: Option<Region>,
    ) -> Self {
        Self {
            table_path,
            prefix,
            annotations,
            good_mask,
            seed,
            region,
        }
    }

    pub fn sidecar_path(&self) -> PathBuf {
        self.prefix.with_extension("n")
    }

    pub fn sites_path(&self) -> PathBuf {
        path_with_suffix(&self.prefix, ".sites.gz")
    }

    pub fn tab_path(&self) -> PathBuf {
        self.prefix.with_extension("tab")
    }
}

fn path_with_suffix(prefix: &std::path::Path, suffix: &str) -> PathBuf {
    let mut s = prefix.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_region_with_range() {
        let r = Region::parse("chr1:100-200").unwrap();
        assert_eq!(r.chrom, "chr1");
        assert!(r.contains("chr1", 150));
        assert!(!r.contains("chr1", 250));
        assert!(!r.contains("chr2", 150));
    }

    #[test]
    fn parses_whole_chromosome_region() {
        let r = Region::parse("chr2").unwrap();
        assert!(r.contains("chr2", 1));
        assert!(r.contains("chr2", u64::MAX));
    }

    #[test]
    fn derives_output_paths_from_prefix() {
        let ctx = PipelineContext::new(
            PathBuf::from("in.tab"),
            PathBuf::from("/tmp/run1"),
            vec!["QUAL".to_owned()],
            GoodMask::parse("1"),
            42,
            None,
        );
        assert_eq!(ctx.sidecar_path(), PathBuf::from("/tmp/run1.n"));
        assert_eq!(ctx.sites_path(), PathBuf::from("/tmp/run1.sites.gz"));
        assert_eq!(ctx.tab_path(), PathBuf::from("/tmp/run1.tab"));
    }
}
