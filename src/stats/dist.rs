use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::{info, warn};

use crate::errors::{Error, Result};
use crate::external_sort;
use crate::table::catalog::FIXED_COLUMNS;
use crate::table::goodmask::GoodMask;
use crate::table::reader::TableReader;

/// Per-column header comment documenting the sidecar `.n` file's 10-column
/// schema.
const SIDECAR_HEADER: &str =
    "# name\tnall\tngood\tnmissing\tall_min\tall_max\tgood_min\tgood_max\tscale_lo\tscale_hi\n";

/// Default low/high percentile endpoints used for `scale_lo`/`scale_hi`.
pub const DEFAULT_LO_PCTL: f64 = 0.1;
pub const DEFAULT_HI_PCTL: f64 = 99.9;

/// Minimum number of finite values below which a degenerate scale range is
/// not flagged as an error (an annotation needs more than a handful of
/// finite values before equality of its low/high percentile is meaningful).
const DEGENERATE_CHECK_MIN_N: u64 = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct DistributionStats {
    pub name: String,
    pub nall: u64,
    pub ngood: u64,
    pub nmissing: u64,
    pub all_min: f64,
    pub all_max: f64,
    pub good_min: f64,
    pub good_max: f64,
    pub scale_lo: f64,
    pub scale_hi: f64,
}

struct ColumnAccumulator {
    name: String,
    nall: u64,
    ngood: u64,
    nmissing: u64,
    all_min: f64,
    all_max: f64,
    good_min: f64,
    good_max: f64,
    tmp_path: PathBuf,
    tmp_writer: BufWriter<File>,
}

impl ColumnAccumulator {
    fn new(name: String, tmp_dir: &Path, index: usize) -> Result<Self> {
        let tmp_path = tmp_dir.join(format!("somfilter.dist.col{index}.tmp"));
        let tmp_writer = BufWriter::new(File::create(&tmp_path)?);
        Ok(Self {
            name,
            nall: 0,
            ngood: 0,
            nmissing: 0,
            all_min: f64::INFINITY,
            all_max: f64::NEG_INFINITY,
            good_min: f64::INFINITY,
            good_max: f64::NEG_INFINITY,
            tmp_path,
            tmp_writer,
        })
    }

    fn observe(&mut self, value: Option<f64>, is_good: bool) -> Result<()> {
        match value {
            None => self.nmissing += 1,
            Some(v) => {
                self.nall += 1;
                self.all_min = self.all_min.min(v);
                self.all_max = self.all_max.max(v);
                if is_good {
                    self.ngood += 1;
                    self.good_min = self.good_min.min(v);
                    self.good_max = self.good_max.max(v);
                }
                writeln!(self.tmp_writer, "{v}\t{}", is_good as u8)?;
            }
        }
        Ok(())
    }
}

/// Build distribution statistics for every column in the table with a full
/// streaming pass, computing exact percentiles via an external sort per
/// column (approximate sketches are rejected because operators reuse the
/// sidecar file as ground truth).
pub fn build(
    table_path: &Path,
    good_mask: GoodMask,
    lo_pctl: f64,
    hi_pctl: f64,
    tmp_dir: &Path,
    region: Option<&crate::config::Region>,
) -> Result<IndexMap<String, DistributionStats>> {
    let mut reader = TableReader::open_all_columns(table_path, good_mask)?;
    let names: Vec<String> = reader.catalog().names().map(str::to_owned).collect();
    let mut accumulators: Vec<ColumnAccumulator> = names
        .iter()
        .enumerate()
        .map(|(i, name)| ColumnAccumulator::new(name.clone(), tmp_dir, i))
        .collect::<Result<Vec<_>>>()?;

    let spinner = crate::util::get_spinner();
    spinner.set_message("building distribution statistics");
    let mut n_rows = 0u64;
    while let Some(record) = reader.next()? {
        if let Some(region) = region {
            if !region.contains(record.chrom, record.pos) {
                continue;
            }
        }
        let is_good = record.is_good();
        for slot in 0..accumulators.len() {
            accumulators[slot].observe(record.value(slot), is_good)?;
        }
        n_rows += 1;
        spinner.inc(1);
    }
    spinner.finish_and_clear();
    info!("distribution build: scanned {n_rows} rows over {} columns", accumulators.len());

    let mut out = IndexMap::new();
    for mut acc in accumulators.drain(..) {
        acc.tmp_writer.flush()?;
        drop(acc.tmp_writer);

        let (scale_lo, scale_hi) = if acc.nall == 0 {
            (0.0, 0.0)
        } else {
            compute_percentile_endpoints(&acc.tmp_path, acc.nall, lo_pctl, hi_pctl)?
        };
        let _ = std::fs::remove_file(&acc.tmp_path);

        if acc.nall >= DEGENERATE_CHECK_MIN_N && scale_lo == scale_hi {
            return Err(Error::DegenerateDistribution { name: acc.name });
        }

        let stats = DistributionStats {
            name: acc.name.clone(),
            nall: acc.nall,
            ngood: acc.ngood,
            nmissing: acc.nmissing,
            all_min: finite_or(acc.all_min, 0.0),
            all_max: finite_or(acc.all_max, 0.0),
            good_min: finite_or(acc.good_min, 0.0),
            good_max: finite_or(acc.good_max, 0.0),
            scale_lo,
            scale_hi,
        };
        out.insert(acc.name, stats);
    }
    let _ = FIXED_COLUMNS; // fixed columns never appear in `names`/`out`
    Ok(out)
}

fn finite_or(v: f64, default: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        default
    }
}

fn compute_percentile_endpoints(
    tmp_path: &Path,
    nall: u64,
    lo_pctl: f64,
    hi_pctl: f64,
) -> Result<(f64, f64)> {
    let sorted_path = tmp_path.with_extension("sorted");
    external_sort::sort_file_by_key(tmp_path, &sorted_path, 1)?;

    let file = File::open(&sorted_path)?;
    let reader = BufReader::new(file);
    let mut scale_lo = None;
    let mut scale_hi = None;
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let Some((value_str, _is_good)) = line.split_once('\t') else {
            continue;
        };
        let value: f64 = value_str.parse().unwrap_or(0.0);
        let rank = (i + 1) as f64;
        let rank_pctl = 100.0 * rank / nall as f64;
        if scale_lo.is_none() && rank_pctl > lo_pctl {
            scale_lo = Some(value);
        }
        if scale_hi.is_none() && rank_pctl > hi_pctl {
            scale_hi = Some(value);
        }
    }
    let _ = std::fs::remove_file(&sorted_path);
    // If the scan never exceeded the percentile (e.g. hi_pctl == 100), fall
    // back to the last observed value via a second cheap pass is avoided:
    // the common case (hi_pctl < 100) always finds a crossing row.
    Ok((scale_lo.unwrap_or(0.0), scale_hi.unwrap_or(scale_lo.unwrap_or(0.0))))
}

/// Write the sidecar `<prefix>.n` distribution summary.
pub fn save(path: &Path, stats: &IndexMap<String, DistributionStats>) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(SIDECAR_HEADER.as_bytes())?;
    for s in stats.values() {
        writeln!(
            writer,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            s.name,
            s.nall,
            s.ngood,
            s.nmissing,
            s.all_min,
            s.all_max,
            s.good_min,
            s.good_max,
            s.scale_lo,
            s.scale_hi
        )?;
    }
    Ok(())
}

/// Load a previously-written sidecar file, bypassing recomputation. Applies
/// the same degenerate-distribution check as `build`, since a reused or
/// externally-supplied sidecar is just as capable of carrying a
/// `scale_lo == scale_hi` column as a freshly-built one.
pub fn load(path: &Path) -> Result<IndexMap<String, DistributionStats>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut out = IndexMap::new();
    for line in reader.lines() {
        let line = line?;
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 10 {
            return Err(Error::MalformedRow {
                line: 0,
                detail: format!("sidecar row has {} fields, expected 10", fields.len()),
            });
        }
        let parse_f64 = |s: &str| -> Result<f64> {
            s.parse().map_err(|_| Error::MalformedRow {
                line: 0,
                detail: format!("non-numeric sidecar field {s:?}"),
            })
        };
        let parse_u64 = |s: &str| -> Result<u64> {
            s.parse().map_err(|_| Error::MalformedRow {
                line: 0,
                detail: format!("non-numeric sidecar field {s:?}"),
            })
        };
        let stats = DistributionStats {
            name: fields[0].to_owned(),
            nall: parse_u64(fields[1])?,
            ngood: parse_u64(fields[2])?,
            nmissing: parse_u64(fields[3])?,
            all_min: parse_f64(fields[4])?,
            all_max: parse_f64(fields[5])?,
            good_min: parse_f64(fields[6])?,
            good_max: parse_f64(fields[7])?,
            scale_lo: parse_f64(fields[8])?,
            scale_hi: parse_f64(fields[9])?,
        };
        if stats.nall >= DEGENERATE_CHECK_MIN_N && stats.scale_lo == stats.scale_hi {
            return Err(Error::DegenerateDistribution { name: stats.name });
        }
        out.insert(stats.name.clone(), stats);
    }
    Ok(out)
}

/// Build-or-load: if `sidecar_path` already exists, load it (with a
/// warning); otherwise build it from scratch and persist.
pub fn build_or_load(
    table_path: &Path,
    sidecar_path: &Path,
    good_mask: GoodMask,
    lo_pctl: f64,
    hi_pctl: f64,
    tmp_dir: &Path,
    region: Option<&crate::config::Region>,
) -> Result<IndexMap<String, DistributionStats>> {
    if sidecar_path.exists() {
        warn!("reusing existing distribution summary at {}", sidecar_path.display());
        load(sidecar_path)
    } else {
        let stats = build(table_path, good_mask, lo_pctl, hi_pctl, tmp_dir, region)?;
        save(sidecar_path, &stats)?;
        Ok(stats)
    }
}

/// Build a `HashMap` of per-annotation `Scaler`s from distribution stats, in
/// the order requested.
pub fn scalers_for(
    stats: &IndexMap<String, DistributionStats>,
    requested: &[String],
) -> Result<Vec<crate::stats::scale::Scaler>> {
    let mut out = Vec::with_capacity(requested.len());
    let by_name: HashMap<&str, &DistributionStats> =
        stats.iter().map(|(k, v)| (k.as_str(), v)).collect();
    for name in requested {
        let s = by_name
            .get(name.as_str())
            .ok_or_else(|| Error::UnknownAnnotation { name: name.clone() })?;
        out.push(crate::stats::scale::Scaler::new(s.scale_lo, s.scale_hi));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_table(dir: &Path, contents: &str) -> PathBuf {
        let path = dir.join("table.tsv");
        let mut f = File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn detects_constant_annotation() {
        let dir = tempfile::tempdir().unwrap();
        let mut body = String::from("#[1]CHROM\t[2]POS\t[3]MASK\t[4]REF\t[5]ALT\t[6]FLAT\n");
        for i in 0..20 {
            body.push_str(&format!("chr1\t{i}\t1\tA\tG\t1.0\n"));
        }
        let table_path = write_table(dir.path(), &body);
        let err = build(&table_path, GoodMask::parse("1"), DEFAULT_LO_PCTL, DEFAULT_HI_PCTL, dir.path(), None)
            .unwrap_err();
        match err {
            Error::DegenerateDistribution { name } => assert_eq!(name, "FLAT"),
            other => panic!("expected degenerate distribution error, got {other:?}"),
        }
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut stats = IndexMap::new();
        stats.insert(
            "QUAL".to_owned(),
            DistributionStats {
                name: "QUAL".to_owned(),
                nall: 100,
                ngood: 50,
                nmissing: 2,
                all_min: 0.0,
                all_max: 99.0,
                good_min: 1.0,
                good_max: 98.0,
                scale_lo: 0.1,
                scale_hi: 98.9,
            },
        );
        let path = dir.path().join("prefix.n");
        save(&path, &stats).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded.get("QUAL"), stats.get("QUAL"));
    }
}
