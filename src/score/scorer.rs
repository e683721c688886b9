use std::io::Write;
use std::path::Path;

use log::{info, warn};

use crate::errors::Result;
use crate::filter::expr::FilterExpr;
use crate::genome::IndelContextProvider;
use crate::score::record::{classify_indel, classify_snp, SiteScore, VariantType, CLASS_INDEL_NOT_APPLICABLE};
use crate::som::engine::SomEnsemble;
use crate::stats::scale::Scaler;
use crate::table::goodmask::GoodMask;
use crate::table::reader::TableReader;

/// Options controlling the second streaming pass.
pub struct ScorerOptions<'a> {
    pub variant_type: VariantType,
    /// slot indices, in `SomEnsemble` dimension order, projected out of the
    /// reader's selected-annotation vector before scoring
    pub som_slots: &'a [usize],
    /// optional fixed hard-filter applied at scoring time, packed into the
    /// low bits of `SiteScore::filter_mask` above the good-bit
    pub fixed_filter: &'a FilterExpr,
}

/// Stream every fully-present site in `table_path` through `ensemble`,
/// writing one `score\tclass\tfilter_mask\tchrom\tpos` row per site to a
/// BGZF-compressed `sites_path`. Sites missing any selected annotation are
/// skipped; this is silent by design since the skip rate is exactly what
/// `build-stats`/`train` already warn about.
pub fn score(
    table_path: &Path,
    requested: &[String],
    good_mask: GoodMask,
    scalers: Vec<Scaler>,
    ensemble: &SomEnsemble,
    sites_path: &Path,
    indel_context: Option<&dyn IndelContextProvider>,
    options: ScorerOptions<'_>,
    command_line: &str,
    region: Option<&crate::config::Region>,
) -> Result<()> {
    let mut reader = TableReader::open_selected(table_path, requested, good_mask, scalers)?;
    let n_selected = reader.n_selected();

    let mut writer = crate::bgzf_io::create_bgzf_writer(sites_path)?;
    crate::bgzf_io::write_provenance_header(
        &mut writer,
        env!("CARGO_PKG_VERSION"),
        command_line,
    )?;
    writeln!(writer, "#score\tclass\tfilter_mask\tchrom\tpos")?;

    let mut n_written = 0u64;
    let mut n_skipped_missing = 0u64;
    let mut n_skipped_indel_error = 0u64;

    let spinner = crate::util::get_spinner();
    spinner.set_message("scoring sites");
    while let Some(record) = reader.next()? {
        if let Some(region) = region {
            if !region.contains(record.chrom, record.pos) {
                continue;
            }
        }
        if !record.all_present(n_selected) {
            n_skipped_missing += 1;
            continue;
        }

        let projected: Vec<f64> = options
            .som_slots
            .iter()
            .map(|&slot| record.values[slot])
            .collect();
        let score_value = ensemble.score(&projected);

        let variant_class = match options.variant_type {
            VariantType::Snp => {
                classify_snp(record.ref_allele, record.alt_allele).unwrap_or(CLASS_INDEL_NOT_APPLICABLE)
            }
            VariantType::Indel => match indel_context {
                Some(provider) => match provider.indel_context(
                    record.chrom,
                    record.pos,
                    record.ref_allele,
                    record.alt_allele,
                ) {
                    Ok(ctx) => classify_indel(ctx),
                    Err(e) => {
                        warn!(
                            "indel context lookup failed at {}:{}: {e}; classifying as not-applicable",
                            record.chrom, record.pos
                        );
                        n_skipped_indel_error += 1;
                        CLASS_INDEL_NOT_APPLICABLE
                    }
                },
                None => CLASS_INDEL_NOT_APPLICABLE,
            },
        };

        let fixed_mask = options.fixed_filter.evaluate(&record.values, &record.missing);
        let good_bit = u8::from(record.is_good());
        let filter_mask = (fixed_mask << 1) | good_bit as u64;

        let site = SiteScore {
            score: score_value,
            variant_class,
            filter_mask,
            chrom: record.chrom.to_owned(),
            pos: record.pos,
        };

        writeln!(
            writer,
            "{:.6}\t{}\t{}\t{}\t{}",
            site.score, site.variant_class, site.filter_mask, site.chrom, site.pos
        )?;
        n_written += 1;
        spinner.inc(1);
    }
    spinner.finish_and_clear();

    writer.finish()?;

    info!(
        "scored {n_written} sites ({n_skipped_missing} skipped for missing annotations, {n_skipped_indel_error} indel lookups failed)"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::som::engine::SomConfig;
    use crate::table::catalog::AnnotationCatalog;
    use std::io::Read;

    fn write_table() -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "#[1]CHROM\t[2]POS\t[3]MASK\t[4]REF\t[5]ALT\t[6]QUAL").unwrap();
        writeln!(f, "chr1\t100\t1\tA\tG\t30.0").unwrap();
        writeln!(f, "chr1\t200\t0\tA\tC\t.").unwrap();
        f
    }

    #[test]
    fn writes_one_row_per_fully_present_site() {
        let table = write_table();
        let header: Vec<String> = vec!["CHROM", "POS", "MASK", "REF", "ALT", "QUAL"]
            .into_iter()
            .map(String::from)
            .collect();
        let mut catalog = AnnotationCatalog::build(&header, &["QUAL".to_owned()]).unwrap();
        let fixed_filter =
            FilterExpr::parse("", &mut catalog, &header, true, |_| None).unwrap();

        let config = SomConfig {
            dims: 1,
            total_updates: 10,
            ..SomConfig::default()
        };
        let mut ensemble = SomEnsemble::new(config);
        for _ in 0..10 {
            ensemble.train_one(&[0.5]);
        }
        ensemble.normalize();

        let out = tempfile::NamedTempFile::new().unwrap();
        score(
            table.path(),
            &["QUAL".to_owned()],
            GoodMask::parse("1"),
            vec![Scaler::new(0.0, 40.0)],
            &ensemble,
            out.path(),
            None,
            ScorerOptions {
                variant_type: VariantType::Snp,
                som_slots: &[0],
                fixed_filter: &fixed_filter,
            },
            "score --table t.tab",
            None,
        )
        .unwrap();

        let mut reader = crate::bgzf_io::open_bgzf_reader(out.path()).unwrap();
        let mut contents = String::new();
        reader.read_to_string(&mut contents).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 4); // 2 provenance lines + 1 column-comment line + 1 scored site
        assert!(lines[3].ends_with("chr1\t100"));
    }
}
