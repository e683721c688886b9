use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use log::info;

use crate::errors::Result;
use crate::external_sort;
use crate::score::record::{CLASS_TRANSITION_OR_CONSISTENT, CLASS_TRANSVERSION_OR_INCONSISTENT};
use crate::score::VariantType;

/// Minimum fraction of rows consumed before the sweep begins emitting
/// metric-vs-sensitivity rows.
const WARMUP_FRACTION: f64 = 0.10;
/// Minimum metric drift since the last emitted row before a new row is
/// written.
const METRIC_DRIFT_THRESHOLD: f64 = 0.005;

struct ScoredRow {
    score: f64,
    class: u8,
    good_bit: u8,
}

fn parse_row(line: &str) -> Option<ScoredRow> {
    let mut fields = line.split('\t');
    let score: f64 = fields.next()?.parse().ok()?;
    let class: u8 = fields.next()?.parse().ok()?;
    let filter_mask: u64 = fields.next()?.parse().ok()?;
    Some(ScoredRow {
        score,
        class,
        good_bit: (filter_mask & 1) as u8,
    })
}

/// Decompress `sites_path` (a BGZF `.sites.gz`, per `score::scorer::score`)
/// into a plain tab-separated temp file with its two provenance lines and
/// column-comment line stripped, ready for external sort by score.
fn extract_rows_to_plain_file(sites_path: &Path, tmp_path: &Path) -> Result<u64> {
    let reader = crate::bgzf_io::open_bgzf_reader(sites_path)?;
    let reader = BufReader::new(reader);
    let mut writer = BufWriter::new(File::create(tmp_path)?);
    let mut n_good_total = 0u64;
    for line in reader.lines() {
        let line = line?;
        if line.starts_with('#') {
            continue;
        }
        if let Some(row) = parse_row(&line) {
            if row.good_bit == 1 {
                n_good_total += 1;
            }
        }
        writeln!(writer, "{line}")?;
    }
    writer.flush()?;
    Ok(n_good_total)
}

/// Sweep the sorted sites file and write the `<prefix>.tab` metric-vs-
/// sensitivity table.
pub fn evaluate(
    sites_path: &Path,
    variant_type: VariantType,
    out_path: &Path,
    command_line: &str,
) -> Result<()> {
    let tmp_dir = std::env::temp_dir();
    let unsorted = tmp_dir.join(format!(
        "somfilter.eval.{}.unsorted",
        std::process::id()
    ));
    let sorted = tmp_dir.join(format!("somfilter.eval.{}.sorted", std::process::id()));

    let n_good_total = extract_rows_to_plain_file(sites_path, &unsorted)?;
    external_sort::sort_file_by_key(&unsorted, &sorted, 1)?;
    let _ = std::fs::remove_file(&unsorted);

    let mut writer = BufWriter::new(File::create(out_path)?);
    crate::bgzf_io::write_provenance_header(&mut writer, env!("CARGO_PKG_VERSION"), command_line)?;
    writeln!(writer, "#metric_all\tn_all\tsensitivity\tmetric_novel\tthreshold")?;

    let file = File::open(&sorted)?;
    let reader = BufReader::new(file);

    let mut n_all = 0u64;
    let mut n_good_seen = 0u64;
    let mut n = [0u64; 3];
    let mut n_novel = [0u64; 3];
    let mut last_emitted_metric: Option<f64> = None;
    let mut n_emitted = 0u64;

    // total row count needed for the warm-up threshold
    let total_rows = BufReader::new(File::open(&sorted)?).lines().count() as u64;

    let metric_of = |n: &[u64; 3]| -> f64 {
        match variant_type {
            VariantType::Snp => {
                let tv = n[CLASS_TRANSVERSION_OR_INCONSISTENT as usize] as f64;
                if tv == 0.0 {
                    0.0
                } else {
                    n[CLASS_TRANSITION_OR_CONSISTENT as usize] as f64 / tv
                }
            }
            VariantType::Indel => {
                let consistent = n[CLASS_TRANSITION_OR_CONSISTENT as usize] as f64;
                let inconsistent = n[CLASS_TRANSVERSION_OR_INCONSISTENT as usize] as f64;
                let denom = consistent + inconsistent;
                if denom == 0.0 {
                    0.0
                } else {
                    consistent / denom
                }
            }
        }
    };

    let bar = crate::util::get_bar(total_rows);
    bar.set_message("sweeping threshold");
    for line in reader.lines() {
        let line = line?;
        bar.inc(1);
        let Some(row) = parse_row(&line) else {
            continue;
        };
        n_all += 1;
        if row.good_bit == 1 {
            n_good_seen += 1;
        }
        if (row.class as usize) < 3 {
            n[row.class as usize] += 1;
            if row.good_bit == 0 {
                n_novel[row.class as usize] += 1;
            }
        }

        if n_all < (total_rows as f64 * WARMUP_FRACTION) as u64 {
            continue;
        }

        let metric_all = metric_of(&n);
        let drifted = match last_emitted_metric {
            None => true,
            Some(last) => (metric_all - last).abs() > METRIC_DRIFT_THRESHOLD,
        };
        if !drifted {
            continue;
        }

        let metric_novel = metric_of(&n_novel);
        let sensitivity = if n_good_total == 0 {
            0.0
        } else {
            100.0 * n_good_seen as f64 / n_good_total as f64
        };

        writeln!(
            writer,
            "{metric_all:.6}\t{n_all}\t{sensitivity:.4}\t{metric_novel:.6}\t{:.6}",
            row.score
        )?;
        last_emitted_metric = Some(metric_all);
        n_emitted += 1;
    }
    bar.finish_and_clear();

    let _ = std::fs::remove_file(&sorted);
    info!("evaluation swept {n_all} sites, emitted {n_emitted} rows");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_sites(rows: &[(f64, u8, u64, &str, u64)]) -> tempfile::NamedTempFile {
        let out = tempfile::NamedTempFile::new().unwrap();
        let mut writer = crate::bgzf_io::create_bgzf_writer(out.path()).unwrap();
        crate::bgzf_io::write_provenance_header(&mut writer, "test", "cmd").unwrap();
        writeln!(writer, "#score\tclass\tfilter_mask\tchrom\tpos").unwrap();
        for (score, class, mask, chrom, pos) in rows {
            writeln!(writer, "{score}\t{class}\t{mask}\t{chrom}\t{pos}").unwrap();
        }
        writer.finish().unwrap();
        out
    }

    #[test]
    fn emits_sensitivity_monotonically() {
        let mut rows = Vec::new();
        for i in 0..200 {
            let score = i as f64 / 200.0;
            let class = if i % 3 == 0 { 1 } else { 0 };
            let good_bit = if i % 2 == 0 { 1 } else { 0 };
            rows.push((score, class, good_bit as u64, "chr1", i as u64));
        }
        let sites = write_sites(&rows);
        let out = tempfile::NamedTempFile::new().unwrap();
        evaluate(sites.path(), VariantType::Snp, out.path(), "evaluate --sites x").unwrap();

        let contents = std::fs::read_to_string(out.path()).unwrap();
        let mut last_sensitivity = 0.0;
        for line in contents.lines().skip(3) {
            let fields: Vec<&str> = line.split('\t').collect();
            let sensitivity: f64 = fields[2].parse().unwrap();
            assert!(sensitivity >= last_sensitivity - 1e-9);
            last_sensitivity = sensitivity;
        }
    }
}
