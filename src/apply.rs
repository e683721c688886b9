//! The `apply` subcommand: an explicitly partial external-collaborator
//! boundary. A full VCF/BCF writer that rewrites FILTER/INFO fields and
//! indexes output with tabix is out of scope; this module only demonstrates
//! the lookup and cutoff-decision logic a real writer would call into,
//! operating on a line-oriented, tab-delimited variant-call passthrough
//! instead of a real VCF parser.

use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::path::Path;

use crate::config::Region;
use crate::errors::{Error, Result};

/// This module does not parse, validate, or rewrite VCF/BCF records; it only
/// demonstrates the score-lookup and FILTER-decision boundary. A real VCF
/// writer (INFO/FILTER header stamping, BCF encoding, tabix indexing) is an
/// external collaborator.
pub const NOT_A_VCF_WRITER: &str = "apply is a line-oriented score/FILTER demonstration, not a VCF/BCF writer";

struct SiteEntry {
    score: f64,
}

type SiteIndex = HashMap<(String, u64), SiteEntry>;

/// Load every row of a `.sites.gz` file into a `(chrom, pos) -> SiteEntry`
/// index. A `HashMap` stands in for a linear/binary search here since the
/// sites file carries no tabix index either way (tabix is itself out of
/// scope).
fn load_sites(sites_path: &Path) -> Result<SiteIndex> {
    let reader = crate::bgzf_io::open_bgzf_reader(sites_path)?;
    let reader = std::io::BufReader::new(reader);
    let mut out = HashMap::new();
    for line in reader.lines() {
        let line = line?;
        if line.starts_with('#') {
            continue;
        }
        let mut fields = line.split('\t');
        let (Some(score_str), Some(_class), Some(_mask), Some(chrom), Some(pos_str)) = (
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
        ) else {
            continue;
        };
        let Ok(score) = score_str.parse::<f64>() else {
            continue;
        };
        let Ok(pos) = pos_str.parse::<u64>() else {
            continue;
        };
        out.insert((chrom.to_owned(), pos), SiteEntry { score });
    }
    Ok(out)
}

/// The two sites files a full apply run consumes: a SNP-typed `.sites.gz`
/// and an INDEL-typed `.sites.gz`, produced by two separate `score` runs
/// with `--variant-type snp`/`--variant-type indel`. Either may be omitted
/// if the operator only cares about one variant type; a query site not
/// found in either is passed through with an empty `FiltScore`.
pub struct ApplyInputs {
    pub snp_sites: Option<SiteIndex>,
    pub indel_sites: Option<SiteIndex>,
}

impl ApplyInputs {
    pub fn load(snp_sites_path: Option<&Path>, indel_sites_path: Option<&Path>) -> Result<Self> {
        Ok(Self {
            snp_sites: snp_sites_path.map(load_sites).transpose()?,
            indel_sites: indel_sites_path.map(load_sites).transpose()?,
        })
    }
}

/// Cutoffs for the PASS/FailSOM decision, one per variant type.
pub struct ApplyCutoffs {
    pub snp_cutoff: f64,
    pub indel_cutoff: f64,
}

/// Stream a tab-delimited `CHROM\tPOS\t...` query through the sites indexes,
/// appending a `FiltScore` column and a `FILTER` column (`PASS`/`FailSOM`) to
/// every data line, and two informational header lines up front. Lines
/// beginning with `#` are passed through unchanged except that the new
/// header lines are inserted immediately before the first non-`#` line.
///
/// `reset_filters`, when set, acknowledges the operator's intent to reset
/// unrecognized FILTERs: since this demonstration never parses or retains
/// an upstream FILTER column (a real VCF writer's job, out of scope here),
/// the flag has nothing of its own to reset here and is only logged; a full
/// VCF writer would use it to decide whether a pre-existing non-PASS FILTER
/// value should be cleared before FailSOM/PASS is stamped.
pub fn run(
    inputs: &ApplyInputs,
    query: impl BufRead,
    mut out: impl Write,
    cutoffs: &ApplyCutoffs,
    reset_filters: bool,
    sites_region: Option<&Region>,
    query_region: Option<&Region>,
) -> Result<()> {
    if let (Some(sites_region), Some(query_region)) = (sites_region, query_region) {
        if sites_region != query_region {
            return Err(Error::RegionMismatch {
                in_sites: format!("{}:{:?}-{:?}", sites_region.chrom, sites_region.start, sites_region.end),
                in_query: format!("{}:{:?}-{:?}", query_region.chrom, query_region.start, query_region.end),
            });
        }
    }

    if reset_filters {
        log::info!("--reset-filters acknowledged; {NOT_A_VCF_WRITER}");
    }

    let mut header_written = false;

    for line in query.lines() {
        let line = line?;
        if line.starts_with('#') {
            writeln!(out, "{line}")?;
            continue;
        }
        if !header_written {
            writeln!(out, "##FILTER=<ID=FailSOM,Description=\"Site score exceeds the SOM quality cutoff\">")?;
            writeln!(out, "##INFO=<ID=FiltScore,Number=1,Type=Float,Description=\"SOM ensemble distance-to-manifold score\">")?;
            header_written = true;
        }
        let mut fields = line.splitn(3, '\t');
        let chrom = fields.next().unwrap_or("");
        let pos_str = fields.next().unwrap_or("");
        let rest = fields.next().unwrap_or("");
        let pos: u64 = pos_str.parse().unwrap_or(0);

        let snp_hit = inputs.snp_sites.as_ref().and_then(|m| m.get(&(chrom.to_owned(), pos)));
        let indel_hit = inputs.indel_sites.as_ref().and_then(|m| m.get(&(chrom.to_owned(), pos)));

        match (snp_hit, indel_hit) {
            (Some(entry), _) => {
                let filter = if entry.score <= cutoffs.snp_cutoff { "PASS" } else { "FailSOM" };
                writeln!(out, "{chrom}\t{pos}\t{rest}\tFiltScore={:.6}\t{filter}", entry.score)?;
            }
            (None, Some(entry)) => {
                let filter = if entry.score <= cutoffs.indel_cutoff { "PASS" } else { "FailSOM" };
                writeln!(out, "{chrom}\t{pos}\t{rest}\tFiltScore={:.6}\t{filter}", entry.score)?;
            }
            (None, None) => {
                writeln!(out, "{chrom}\t{pos}\t{rest}\tFiltScore=.\t.")?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::io::Write as _;

    fn write_sites(rows: &[(f64, &str, u64)]) -> tempfile::NamedTempFile {
        let out = tempfile::NamedTempFile::new().unwrap();
        let mut writer = crate::bgzf_io::create_bgzf_writer(out.path()).unwrap();
        writeln!(writer, "##somfilter_version=test").unwrap();
        writeln!(writer, "##command=test").unwrap();
        writeln!(writer, "#score\tclass\tfilter_mask\tchrom\tpos").unwrap();
        for (score, chrom, pos) in rows {
            writeln!(writer, "{score}\t1\t0\t{chrom}\t{pos}").unwrap();
        }
        writer.finish().unwrap();
        out
    }

    #[test]
    fn applies_cutoff_per_variant_type() {
        let snp_sites = write_sites(&[(0.004, "chr1", 100), (0.006, "chr1", 200)]);
        let indel_sites = write_sites(&[(0.009, "chr1", 300)]);
        let inputs = ApplyInputs::load(Some(snp_sites.path()), Some(indel_sites.path())).unwrap();

        let query = "CHROM\tPOS\tID\nchr1\t100\tvar1\nchr1\t200\tvar2\nchr1\t300\tvar3\n";
        let mut output = Vec::new();
        run(
            &inputs,
            Cursor::new(query.as_bytes()),
            &mut output,
            &ApplyCutoffs { snp_cutoff: 0.005, indel_cutoff: 0.01 },
            false,
            None,
            None,
        )
        .unwrap();
        let text = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[2].ends_with("PASS")); // SNP below cutoff
        assert!(lines[3].ends_with("FailSOM")); // SNP above cutoff
        assert!(lines[4].ends_with("PASS")); // INDEL below its own cutoff
    }

    #[test]
    fn unmatched_site_gets_empty_score() {
        let snp_sites = write_sites(&[(0.004, "chr1", 100)]);
        let inputs = ApplyInputs::load(Some(snp_sites.path()), None).unwrap();
        let query = "CHROM\tPOS\tID\nchr1\t999\tvarX\n";
        let mut output = Vec::new();
        run(
            &inputs,
            Cursor::new(query.as_bytes()),
            &mut output,
            &ApplyCutoffs { snp_cutoff: 0.005, indel_cutoff: 0.005 },
            false,
            None,
            None,
        )
        .unwrap();
        let text = String::from_utf8(output).unwrap();
        assert!(text.lines().nth(2).unwrap().ends_with("FiltScore=.\t."));
    }

    #[test]
    fn region_mismatch_is_fatal() {
        let snp_sites = write_sites(&[(0.004, "chr1", 100)]);
        let inputs = ApplyInputs::load(Some(snp_sites.path()), None).unwrap();
        let sites_region = Region::parse("chr1:1-50").unwrap();
        let query_region = Region::parse("chr2:1-50").unwrap();
        let err = run(
            &inputs,
            Cursor::new("".as_bytes()),
            Vec::new(),
            &ApplyCutoffs { snp_cutoff: 0.005, indel_cutoff: 0.005 },
            false,
            Some(&sites_region),
            Some(&query_region),
        )
        .unwrap_err();
        assert!(matches!(err, Error::RegionMismatch { .. }));
    }
}
