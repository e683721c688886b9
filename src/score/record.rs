/// Variant-class encoding:
/// SNP: 0 = transversion, 1 = transition.
/// INDEL: 0 = repeat-inconsistent, 1 = repeat-consistent, 2 = not applicable.
pub const CLASS_TRANSVERSION_OR_INCONSISTENT: u8 = 0;
pub const CLASS_TRANSITION_OR_CONSISTENT: u8 = 1;
pub const CLASS_INDEL_NOT_APPLICABLE: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantType {
    Snp,
    Indel,
}

/// A single row of the `.sites.gz` score table.
#[derive(Debug, Clone)]
pub struct SiteScore {
    pub score: f64,
    pub variant_class: u8,
    /// Combined fixed-filter failure mask with the good-bit in the LSB:
    /// `(fixed_filter_mask << 1) | good_bit`.
    pub filter_mask: u64,
    pub chrom: String,
    pub pos: u64,
}

impl SiteScore {
    pub fn good_bit(&self) -> u8 {
        (self.filter_mask & 1) as u8
    }
}

/// Standard A/C/G/T -> {0,1,2,3} encoding used for transition/transversion
/// classification (A and G are purines, 0 and 2; C and T are pyrimidines, 1
/// and 3, so `|enc(x) - enc(y)| == 2` iff both bases are the same type).
pub fn encode_base(base: u8) -> Option<u8> {
    match base.to_ascii_uppercase() {
        b'A' => Some(0),
        b'C' => Some(1),
        b'G' => Some(2),
        b'T' => Some(3),
        _ => None,
    }
}

/// Classify a SNP from its single-base REF/ALT alleles.
pub fn classify_snp(reference: &str, alternate: &str) -> Option<u8> {
    let r = encode_base(*reference.as_bytes().first()?)?;
    let a = encode_base(*alternate.as_bytes().first()?)?;
    let diff = (r as i8 - a as i8).abs();
    Some(if diff == 2 {
        CLASS_TRANSITION_OR_CONSISTENT
    } else {
        CLASS_TRANSVERSION_OR_INCONSISTENT
    })
}

/// The (nrep, nlen, ndel) context an indel classifier reports. `nrep` =
/// number of repeat units found, `nlen` = repeat unit length, `ndel` = net
/// length change (negative = deletion).
#[derive(Debug, Clone, Copy)]
pub struct IndelContext {
    pub nrep: u32,
    pub nlen: u32,
    pub ndel: i32,
}

/// Classify an indel from its repeat context.
pub fn classify_indel(ctx: IndelContext) -> u8 {
    if ctx.nlen <= 1 || ctx.nrep <= 1 {
        return CLASS_INDEL_NOT_APPLICABLE;
    }
    if ctx.ndel.unsigned_abs() % ctx.nlen == 0 {
        CLASS_TRANSITION_OR_CONSISTENT
    } else {
        CLASS_TRANSVERSION_OR_INCONSISTENT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_examples() {
        assert_eq!(classify_snp("A", "G"), Some(CLASS_TRANSITION_OR_CONSISTENT));
        assert_eq!(classify_snp("C", "T"), Some(CLASS_TRANSITION_OR_CONSISTENT));
    }

    #[test]
    fn transversion_examples() {
        assert_eq!(classify_snp("A", "C"), Some(CLASS_TRANSVERSION_OR_INCONSISTENT));
        assert_eq!(classify_snp("G", "T"), Some(CLASS_TRANSVERSION_OR_INCONSISTENT));
    }

    #[test]
    fn indel_context_examples() {
        // REF=ATAT, ALT=AT, nlen=2, nrep=2, ndel=-2 -> consistent
        let ctx = IndelContext { nrep: 2, nlen: 2, ndel: -2 };
        assert_eq!(classify_indel(ctx), CLASS_TRANSITION_OR_CONSISTENT);
        // REF=A, ALT=AT, nlen=1 -> not applicable
        let ctx = IndelContext { nrep: 1, nlen: 1, ndel: 1 };
        assert_eq!(classify_indel(ctx), CLASS_INDEL_NOT_APPLICABLE);
    }
}
