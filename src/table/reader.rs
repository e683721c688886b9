use std::io::BufRead;
use std::path::Path;

use log::debug;

use crate::errors::{Error, Result};
use crate::stats::scale::Scaler;
use crate::table::catalog::{AnnotationCatalog, FIXED_COLUMNS};
use crate::table::goodmask::{parse_row_mask, GoodMask};
use crate::table::record::{SiteRecord, ROW_GOOD_BIT, ROW_PRESENT_BIT};

/// Streams an annotation table one record at a time. Owns the line buffer
/// that `SiteRecord`'s borrowed fields point into; calling `next` again
/// invalidates the previous record.
pub struct TableReader {
    source: Box<dyn BufRead>,
    pub columns: Vec<String>,
    catalog: AnnotationCatalog,
    good_mask: GoodMask,
    scalers: Option<Vec<Scaler>>,
    line_no: u64,
    line_buf: String,
    values: Vec<f64>,
    raw_values: Vec<f64>,
    missing: Vec<bool>,
}

/// Parse the header line into the table's column catalog, stripping the
/// `[N]` decoration from each field.
pub fn parse_header_line(line: &str) -> Result<Vec<String>> {
    let line = line
        .strip_prefix('#')
        .ok_or_else(|| Error::HeaderMismatch { found: line.to_owned() })?;
    let mut columns = Vec::new();
    for field in line.trim_end().split('\t') {
        let stripped = strip_index_prefix(field);
        columns.push(stripped.to_owned());
    }
    Ok(columns)
}

fn strip_index_prefix(field: &str) -> &str {
    if let Some(rest) = field.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            if rest[..end].chars().all(|c| c.is_ascii_digit()) {
                return &rest[end + 1..];
            }
        }
    }
    field
}

impl TableReader {
    fn open_common(
        path: &Path,
        requested: &[String],
        good_mask: GoodMask,
        scalers: Option<Vec<Scaler>>,
    ) -> Result<Self> {
        let mut source = crate::table::source::open_table(path)?;
        let mut header_line = String::new();
        source.read_line(&mut header_line)?;
        if header_line.is_empty() {
            return Err(Error::HeaderMismatch { found: String::new() });
        }
        let columns = parse_header_line(&header_line)?;
        let catalog = AnnotationCatalog::build(&columns, requested)?;
        let n = catalog.n_selected();
        Ok(Self {
            source,
            columns,
            catalog,
            good_mask,
            scalers,
            line_no: 1,
            line_buf: String::new(),
            values: vec![0.0; n],
            raw_values: vec![0.0; n],
            missing: vec![true; n],
        })
    }

    /// Open selecting only the operator-requested annotation names, scaling
    /// each selected value using the provided per-slot scalers (in selection
    /// order). Used by Trainer and Scorer.
    pub fn open_selected(
        path: &Path,
        requested: &[String],
        good_mask: GoodMask,
        scalers: Vec<Scaler>,
    ) -> Result<Self> {
        Self::open_common(path, requested, good_mask, Some(scalers))
    }

    /// Open selecting every non-fixed column in the table header, with no
    /// scaling applied (raw values only). Used by `DistributionStats`'s
    /// full-column build pass.
    pub fn open_all_columns(path: &Path, good_mask: GoodMask) -> Result<Self> {
        let mut source = crate::table::source::open_table(path)?;
        let mut header_line = String::new();
        source.read_line(&mut header_line)?;
        if header_line.is_empty() {
            return Err(Error::HeaderMismatch { found: String::new() });
        }
        let columns = parse_header_line(&header_line)?;
        let requested: Vec<String> = columns[FIXED_COLUMNS.len()..].to_vec();
        let catalog = AnnotationCatalog::build(&columns, &requested)?;
        let n = catalog.n_selected();
        Ok(Self {
            source,
            columns,
            catalog,
            good_mask,
            scalers: None,
            line_no: 1,
            line_buf: String::new(),
            values: vec![0.0; n],
            raw_values: vec![0.0; n],
            missing: vec![true; n],
        })
    }

    pub fn catalog(&self) -> &AnnotationCatalog {
        &self.catalog
    }

    pub fn n_selected(&self) -> usize {
        self.catalog.n_selected()
    }

    /// Parse and return the next record, or `None` at end-of-stream.
    pub fn next(&mut self) -> Result<Option<SiteRecord<'_>>> {
        self.line_buf.clear();
        let bytes_read = self.source.read_line(&mut self.line_buf)?;
        if bytes_read == 0 {
            return Ok(None);
        }
        self.line_no += 1;
        if self.line_buf.ends_with('\n') {
            self.line_buf.pop();
            if self.line_buf.ends_with('\r') {
                self.line_buf.pop();
            }
        }

        for m in self.missing.iter_mut() {
            *m = true;
        }

        let mut fields = self.line_buf.split('\t');
        let chrom = fields.next().ok_or_else(|| Error::MalformedRow {
            line: self.line_no,
            detail: "missing CHROM".to_owned(),
        })?;
        let pos_str = fields.next().ok_or_else(|| Error::MalformedRow {
            line: self.line_no,
            detail: "missing POS".to_owned(),
        })?;
        let pos: u64 = pos_str.parse().map_err(|_| Error::MalformedRow {
            line: self.line_no,
            detail: format!("non-numeric POS {pos_str:?}"),
        })?;
        let mask_str = fields.next().ok_or_else(|| Error::MalformedRow {
            line: self.line_no,
            detail: "missing MASK".to_owned(),
        })?;
        let row_mask = parse_row_mask(mask_str);
        let mask_tag = ROW_PRESENT_BIT
            | if self.good_mask.intersects(row_mask) {
                ROW_GOOD_BIT
            } else {
                0
            };
        let ref_allele = fields.next().ok_or_else(|| Error::MalformedRow {
            line: self.line_no,
            detail: "missing REF".to_owned(),
        })?;
        let alt_allele = fields.next().ok_or_else(|| Error::MalformedRow {
            line: self.line_no,
            detail: "missing ALT".to_owned(),
        })?;

        let mut n_present = 0u32;
        let mut present_mask = 0u64;
        for (column_index, field) in fields.enumerate() {
            let column_index = column_index + FIXED_COLUMNS.len();
            let Some(slot) = self.catalog.slot_for_column(column_index) else {
                continue;
            };
            if field == "." {
                continue;
            }
            let parsed: f64 = match field.parse() {
                Ok(v) => v,
                Err(_) => {
                    return Err(Error::MalformedRow {
                        line: self.line_no,
                        detail: format!("non-numeric value {field:?} in column {column_index}"),
                    })
                }
            };
            if !parsed.is_finite() {
                debug!("line {}: non-finite value treated as missing", self.line_no);
                continue;
            }
            self.raw_values[slot] = parsed;
            self.values[slot] = match &self.scalers {
                Some(scalers) => scalers[slot].scale(parsed),
                None => parsed,
            };
            self.missing[slot] = false;
            n_present += 1;
            present_mask |= 1u64 << slot;
        }

        Ok(Some(SiteRecord {
            chrom,
            pos,
            mask_tag,
            ref_allele,
            alt_allele,
            values: self.values.clone(),
            raw_values: self.raw_values.clone(),
            missing: self.missing.clone(),
            n_present,
            present_mask,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_table(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn parses_header_prefix() {
        let cols = parse_header_line("#[1]CHROM\t[2]POS\t[3]MASK\t[4]REF\t[5]ALT\t[6]QUAL\n").unwrap();
        assert_eq!(cols, vec!["CHROM", "POS", "MASK", "REF", "ALT", "QUAL"]);
    }

    #[test]
    fn reads_rows_and_flags_missing() {
        let f = write_table(
            "#[1]CHROM\t[2]POS\t[3]MASK\t[4]REF\t[5]ALT\t[6]QUAL\t[7]DP\n\
             chr1\t100\t010\tA\tG\t30.0\t.\n",
        );
        let good_mask = GoodMask::parse("010");
        let mut reader = TableReader::open_selected(
            f.path(),
            &["QUAL".to_owned(), "DP".to_owned()],
            good_mask,
            vec![Scaler::identity(), Scaler::identity()],
        )
        .unwrap();
        let record = reader.next().unwrap().unwrap();
        assert_eq!(record.chrom, "chr1");
        assert_eq!(record.pos, 100);
        assert!(record.is_good());
        assert_eq!(record.value(0), Some(30.0));
        assert_eq!(record.value(1), None);
        assert_eq!(record.n_present, 1);
        assert!(reader.next().unwrap().is_none());
    }
}
