/// Bit set in `SiteRecord::mask_tag` unconditionally, i.e. the `1 | (...)`
/// construction that tags every parsed row as present.
pub const ROW_PRESENT_BIT: u8 = 0b01;
/// Bit set in `SiteRecord::mask_tag` when the row's MASK column intersects
/// the operator's good-mask.
pub const ROW_GOOD_BIT: u8 = 0b10;

/// One parsed row of the annotation table. String fields borrow out of the
/// reader's internal line buffer and are only valid until the next call to
/// `TableReader::next`.
#[derive(Debug, Clone)]
pub struct SiteRecord<'a> {
    pub chrom: &'a str,
    pub pos: u64,
    pub mask_tag: u8,
    pub ref_allele: &'a str,
    pub alt_allele: &'a str,
    /// scaled to `[0,1]` if scaling is active, else equal to `raw_values`
    pub values: Vec<f64>,
    pub raw_values: Vec<f64>,
    pub missing: Vec<bool>,
    pub n_present: u32,
    pub present_mask: u64,
}

impl<'a> SiteRecord<'a> {
    pub fn is_good(&self) -> bool {
        self.mask_tag & ROW_GOOD_BIT != 0
    }

    /// True iff every selected slot carries a non-missing value.
    pub fn all_present(&self, n_slots: usize) -> bool {
        self.n_present as usize == n_slots
    }

    pub fn value(&self, slot: usize) -> Option<f64> {
        if self.missing[slot] {
            None
        } else {
            Some(self.values[slot])
        }
    }

    pub fn raw_value(&self, slot: usize) -> Option<f64> {
        if self.missing[slot] {
            None
        } else {
            Some(self.raw_values[slot])
        }
    }
}
