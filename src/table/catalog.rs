use indexmap::IndexMap;

use crate::errors::{Error, Result};

/// The five columns every annotation table must begin with, in order.
pub const FIXED_COLUMNS: [&str; 5] = ["CHROM", "POS", "MASK", "REF", "ALT"];

/// User-selected annotations occupy slots `>= FIRST_ANNOTATION_SLOT`; slots
/// `0..FIRST_ANNOTATION_SLOT` are reserved for the fixed prefix columns.
pub const FIRST_ANNOTATION_SLOT: usize = FIXED_COLUMNS.len();

/// Bit-pack width: at most this many annotation slots can be selected, since
/// presence/missing tracking lives in a single `u64` bitmask.
pub const MAX_SLOTS: usize = 62;

/// Maps table column index to selected-slot index, and back. Built once from
/// the table header and the operator's requested annotation list.
#[derive(Debug, Clone)]
pub struct AnnotationCatalog {
    /// table column index -> selected slot index (`None` means "skip this column")
    column_to_slot: Vec<Option<usize>>,
    /// selected slot index (0-based within annotations, i.e. slot - FIRST_ANNOTATION_SLOT) -> table column index
    slot_to_column: Vec<usize>,
    /// annotation name -> slot index (>= FIRST_ANNOTATION_SLOT)
    name_to_slot: IndexMap<String, usize>,
}

impl AnnotationCatalog {
    /// Build a catalog from the table's header column names (including the
    /// fixed 5-column prefix) and the operator's requested annotation names.
    /// Any name in `requested` that is also referenced implicitly (e.g. by a
    /// filter expression) should already have been folded into `requested`
    /// by the caller before this is invoked.
    pub fn build(header_columns: &[String], requested: &[String]) -> Result<Self> {
        if header_columns.len() < FIXED_COLUMNS.len()
            || header_columns[..FIXED_COLUMNS.len()] != FIXED_COLUMNS
        {
            return Err(Error::HeaderMismatch {
                found: header_columns
                    .iter()
                    .take(FIXED_COLUMNS.len())
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }

        let mut seen = std::collections::HashSet::new();
        for name in header_columns {
            if !seen.insert(name.as_str()) {
                return Err(Error::DuplicateColumn { name: name.clone() });
            }
        }

        if requested.len() > MAX_SLOTS {
            return Err(Error::TooManySlots {
                count: requested.len(),
                limit: MAX_SLOTS,
            });
        }

        let mut name_to_slot = IndexMap::new();
        let mut slot_to_column = Vec::with_capacity(requested.len());
        let mut column_to_slot = vec![None; header_columns.len()];

        for name in requested {
            let column_index = header_columns
                .iter()
                .position(|c| c == name)
                .ok_or_else(|| Error::UnknownAnnotation { name: name.clone() })?;
            if column_index < FIXED_COLUMNS.len() {
                // Selecting a fixed column explicitly is a no-op; it is
                // always present in the record regardless.
                continue;
            }
            let slot = FIRST_ANNOTATION_SLOT + slot_to_column.len();
            column_to_slot[column_index] = Some(slot_to_column.len());
            slot_to_column.push(column_index);
            name_to_slot.insert(name.clone(), slot);
        }

        Ok(Self {
            column_to_slot,
            slot_to_column,
            name_to_slot,
        })
    }

    /// Number of selected (non-fixed) annotation slots.
    pub fn n_selected(&self) -> usize {
        self.slot_to_column.len()
    }

    /// Given a table column index, return the dense-vector index it should
    /// be written to, if selected.
    pub fn slot_for_column(&self, column_index: usize) -> Option<usize> {
        self.column_to_slot.get(column_index).copied().flatten()
    }

    /// Table column index for a given dense-vector slot (0-based, i.e. not
    /// offset by `FIRST_ANNOTATION_SLOT`).
    pub fn column_for_slot(&self, slot: usize) -> Option<usize> {
        self.slot_to_column.get(slot).copied()
    }

    /// Look up the dense-vector slot (0-based) for an annotation name,
    /// adding it as a new trailing slot if it is not already selected. Used
    /// by `FilterExpr` parsing, which may reference an annotation that was
    /// not part of the SOM's own annotation selection.
    pub fn slot_for_name_or_insert(&mut self, name: &str, header_columns: &[String]) -> Result<usize> {
        if let Some(&global_slot) = self.name_to_slot.get(name) {
            return Ok(global_slot - FIRST_ANNOTATION_SLOT);
        }
        let column_index = header_columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| Error::UnknownAnnotation { name: name.to_owned() })?;
        if self.slot_to_column.len() >= MAX_SLOTS {
            return Err(Error::TooManySlots {
                count: self.slot_to_column.len() + 1,
                limit: MAX_SLOTS,
            });
        }
        let dense_slot = self.slot_to_column.len();
        self.column_to_slot[column_index] = Some(dense_slot);
        self.slot_to_column.push(column_index);
        self.name_to_slot
            .insert(name.to_owned(), FIRST_ANNOTATION_SLOT + dense_slot);
        Ok(dense_slot)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.name_to_slot.keys().map(|s| s.as_str())
    }

    pub fn slot_by_name(&self, name: &str) -> Option<usize> {
        self.name_to_slot.get(name).map(|s| s - FIRST_ANNOTATION_SLOT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Vec<String> {
        vec!["CHROM", "POS", "MASK", "REF", "ALT", "QUAL", "DP", "FLAT"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    #[test]
    fn builds_selection_in_request_order() {
        let h = header();
        let requested = vec!["QUAL".to_owned(), "DP".to_owned()];
        let catalog = AnnotationCatalog::build(&h, &requested).unwrap();
        assert_eq!(catalog.n_selected(), 2);
        assert_eq!(catalog.slot_by_name("QUAL"), Some(0));
        assert_eq!(catalog.slot_by_name("DP"), Some(1));
        assert_eq!(catalog.column_for_slot(0), Some(5));
    }

    #[test]
    fn rejects_bad_header() {
        let h: Vec<String> = vec!["CHROM", "POS", "MASK", "REF", "WRONG"]
            .into_iter()
            .map(String::from)
            .collect();
        let err = AnnotationCatalog::build(&h, &[]).unwrap_err();
        assert!(matches!(err, Error::HeaderMismatch { .. }));
    }

    #[test]
    fn rejects_unknown_annotation() {
        let h = header();
        let err = AnnotationCatalog::build(&h, &["NOPE".to_owned()]).unwrap_err();
        assert!(matches!(err, Error::UnknownAnnotation { .. }));
    }

    #[test]
    fn implicit_insert_grows_selection() {
        let h = header();
        let mut catalog = AnnotationCatalog::build(&h, &["QUAL".to_owned()]).unwrap();
        let slot = catalog.slot_for_name_or_insert("FLAT", &h).unwrap();
        assert_eq!(slot, 1);
        assert_eq!(catalog.n_selected(), 2);
    }
}
