//! The reference-sequence accessor used only for indel classification. The
//! repeat-counting algorithm itself is a small but nontrivial helper whose
//! exact semantics are out of scope here; this module wires up the trait
//! boundary plus a minimal concrete implementation so the `score`
//! subcommand has something to call when `--variant-type indel` is chosen.

use std::fs::File;

use bio::io::fasta::IndexedReader;

use crate::score::record::IndelContext;

/// External collaborator: given a site and its alleles, reports the local
/// tandem-repeat context used to decide indel consistency.
pub trait IndelContextProvider {
    fn indel_context(
        &self,
        chrom: &str,
        pos: u64,
        reference: &str,
        alternate: &str,
    ) -> anyhow::Result<IndelContext>;
}

/// A `samtools faidx`-indexed-FASTA-backed implementation, using the same
/// `bio::io::fasta::IndexedReader` the sibling example tools use for
/// reference-sequence lookups. Walks outward from the indel position
/// counting repeats of the shortest period that explains the net length
/// change; this is a minimal approximation and is not claimed to match any
/// particular reference tool's repeat-counting semantics (see DESIGN.md).
pub struct FaidxIndelContext {
    reader: std::cell::RefCell<IndexedReader<File>>,
    /// how many flanking bases to scan when counting repeat units
    window: u64,
}

impl FaidxIndelContext {
    pub fn open(fasta_path: &std::path::Path) -> anyhow::Result<Self> {
        let reader = IndexedReader::from_file(&fasta_path)
            .map_err(|e| anyhow::anyhow!("failed to open reference FASTA: {e}"))?;
        Ok(Self {
            reader: std::cell::RefCell::new(reader),
            window: 50,
        })
    }

    fn repeat_unit_len(ndel: i32, indel_seq: &str) -> u32 {
        let n = indel_seq.len();
        if n == 0 {
            return 0;
        }
        for period in 1..=n {
            if n % period != 0 {
                continue;
            }
            let unit = &indel_seq[..period];
            if indel_seq.as_bytes().chunks(period).all(|c| c == unit.as_bytes()) {
                return period as u32;
            }
        }
        let _ = ndel;
        n as u32
    }
}

impl IndelContextProvider for FaidxIndelContext {
    fn indel_context(
        &self,
        chrom: &str,
        pos: u64,
        reference: &str,
        alternate: &str,
    ) -> anyhow::Result<IndelContext> {
        let ndel = alternate.len() as i32 - reference.len() as i32;
        if ndel == 0 {
            return Ok(IndelContext { nrep: 0, nlen: 0, ndel: 0 });
        }
        let indel_seq = if ndel < 0 {
            &reference[alternate.len().min(reference.len())..]
        } else {
            &alternate[reference.len().min(alternate.len())..]
        };
        if indel_seq.is_empty() {
            return Ok(IndelContext { nrep: 0, nlen: 0, ndel });
        }
        let nlen = Self::repeat_unit_len(ndel, indel_seq);

        let start = pos.saturating_sub(self.window);
        let end = pos + self.window;
        let mut reader = self.reader.borrow_mut();
        reader
            .fetch(chrom, start, end)
            .map_err(|e| anyhow::anyhow!("failed to seek reference sequence: {e}"))?;
        let mut flank_bytes = Vec::new();
        reader
            .read(&mut flank_bytes)
            .map_err(|e| anyhow::anyhow!("failed to read reference sequence: {e}"))?;
        let flank = String::from_utf8_lossy(&flank_bytes);

        let nrep = if nlen == 0 {
            0
        } else {
            count_repeat_units(&flank, nlen as usize)
        };

        Ok(IndelContext { nrep, nlen, ndel })
    }
}

/// Count consecutive repeats of a `unit_len`-length unit anywhere within
/// `sequence`, returning the longest run found.
fn count_repeat_units(sequence: &str, unit_len: usize) -> u32 {
    let bytes = sequence.as_bytes();
    if unit_len == 0 || bytes.len() < unit_len {
        return 0;
    }
    let mut best = 1u32;
    for start in 0..bytes.len() {
        let unit = match bytes.get(start..start + unit_len) {
            Some(u) => u,
            None => break,
        };
        let mut run = 1u32;
        let mut cursor = start + unit_len;
        while let Some(next) = bytes.get(cursor..cursor + unit_len) {
            if next == unit {
                run += 1;
                cursor += unit_len;
            } else {
                break;
            }
        }
        best = best.max(run);
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_simple_tandem_repeat() {
        assert_eq!(count_repeat_units("ATATATAT", 2), 4);
        assert_eq!(count_repeat_units("AAAA", 1), 4);
        assert_eq!(count_repeat_units("ACGT", 2), 1);
    }
}
