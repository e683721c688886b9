use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::combinator::map;
use nom::sequence::tuple;
use nom::IResult;

use crate::errors::{Error, Result};
use crate::parsing::{consume_float, consume_ident};
use crate::stats::scale::Scaler;
use crate::table::catalog::AnnotationCatalog;

/// Maximum number of predicates a single `FilterExpr` may hold, since
/// evaluation packs one failure bit per predicate into a `u64`.
pub const MAX_PREDICATES: usize = 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
}

impl Op {
    /// Mirror the operator when the number appears on the left of the
    /// comparison, e.g. `30 <= QUAL` is equivalent to `QUAL >= 30`.
    fn mirrored(self) -> Self {
        match self {
            Op::Lt => Op::Gt,
            Op::Gt => Op::Lt,
            Op::Le => Op::Ge,
            Op::Ge => Op::Le,
            Op::Eq => Op::Eq,
        }
    }

    /// True iff `value OP threshold` is violated, i.e. does *not* hold.
    fn violated(self, value: f64, threshold: f64) -> bool {
        match self {
            Op::Lt => !(value < threshold),
            Op::Le => !(value <= threshold),
            Op::Eq => value != threshold,
            Op::Ge => !(value >= threshold),
            Op::Gt => !(value > threshold),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Predicate {
    pub slot: usize,
    pub op: Op,
    pub threshold: f64,
}

/// A flat conjunction of comparison predicates over named annotations.
/// `evaluate` returns a failure bitmask; bit `k` set means predicate `k` was
/// violated.
#[derive(Debug, Clone, Default)]
pub struct FilterExpr {
    predicates: Vec<Predicate>,
}

fn parse_op(input: &str) -> IResult<&str, Op> {
    alt((
        map(tag("<="), |_| Op::Le),
        map(tag(">="), |_| Op::Ge),
        map(tag("=="), |_| Op::Eq),
        map(tag("<"), |_| Op::Lt),
        map(tag(">"), |_| Op::Gt),
        map(tag("="), |_| Op::Eq),
    ))(input)
}

enum RawPredicate<'a> {
    NameOpNumber(&'a str, Op, f64),
    NumberOpName(f64, Op, &'a str),
}

fn parse_name_op_number(input: &str) -> IResult<&str, RawPredicate<'_>> {
    map(
        tuple((consume_ident, parse_op, consume_float)),
        |(name, op, number)| RawPredicate::NameOpNumber(name, op, number),
    )(input)
}

fn parse_number_op_name(input: &str) -> IResult<&str, RawPredicate<'_>> {
    map(
        tuple((consume_float, parse_op, consume_ident)),
        |(number, op, name)| RawPredicate::NumberOpName(number, op, name),
    )(input)
}

fn parse_predicate(input: &str) -> IResult<&str, RawPredicate<'_>> {
    alt((parse_name_op_number, parse_number_op_name))(input)
}

impl FilterExpr {
    /// Parse a conjunction-of-predicates expression. Any annotation name
    /// referenced that is not already selected is implicitly added as a
    /// non-SOM filtering slot. `scaled` controls whether the
    /// literal threshold in the expression is itself already expressed in
    /// post-scaling units, or is a raw-value threshold to be scaled through
    /// `scalers_lookup` (keyed by annotation name, since the catalog itself
    /// is mutably borrowed for the duration of this call to register any
    /// implicitly-referenced annotation).
    pub fn parse(
        expr: &str,
        catalog: &mut AnnotationCatalog,
        header_columns: &[String],
        scaled: bool,
        scalers_lookup: impl Fn(&str) -> Option<Scaler>,
    ) -> Result<Self> {
        let stripped: String = expr.chars().filter(|c| !c.is_whitespace()).collect();
        if stripped.is_empty() {
            return Ok(Self::default());
        }

        let mut predicates = Vec::new();
        for clause in stripped.split('&') {
            if clause.is_empty() {
                continue;
            }
            let (rest, raw) = parse_predicate(clause)
                .map_err(|e| Error::FilterParse(format!("{clause:?}: {e}")))?;
            if !rest.is_empty() {
                return Err(Error::FilterParse(format!(
                    "trailing input {rest:?} in predicate {clause:?}"
                )));
            }
            let (name, op, mut threshold) = match raw {
                RawPredicate::NameOpNumber(name, op, number) => (name, op, number),
                RawPredicate::NumberOpName(number, op, name) => (name, op.mirrored(), number),
            };
            let slot = catalog.slot_for_name_or_insert(name, header_columns)?;
            if !scaled {
                if let Some(scaler) = scalers_lookup(name) {
                    threshold = scaler.scale(threshold);
                }
            }
            predicates.push(Predicate { slot, op, threshold });
            if predicates.len() > MAX_PREDICATES {
                return Err(Error::FilterParse(format!(
                    "too many predicates: exceeds the {MAX_PREDICATES}-bit pack width"
                )));
            }
        }
        Ok(Self { predicates })
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Evaluate every predicate against `values` (indexed by slot),
    /// returning a bitmask with bit `k` set iff predicate `k` is violated.
    /// A predicate whose slot is missing in `missing` counts as violated,
    /// since a site with a missing filtering annotation cannot be asserted
    /// to pass the filter.
    pub fn evaluate(&self, values: &[f64], missing: &[bool]) -> u64 {
        let mut mask = 0u64;
        for (k, p) in self.predicates.iter().enumerate() {
            let violated = missing[p.slot] || p.op.violated(values[p.slot], p.threshold);
            if violated {
                mask |= 1u64 << k;
            }
        }
        mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::catalog::AnnotationCatalog;

    fn header() -> Vec<String> {
        vec!["CHROM", "POS", "MASK", "REF", "ALT", "QUAL", "DP"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    #[test]
    fn ge_fails_iff_strictly_less() {
        let h = header();
        let mut catalog = AnnotationCatalog::build(&h, &["QUAL".to_owned()]).unwrap();
        let expr = FilterExpr::parse("QUAL>=30", &mut catalog, &h, true, |_| None).unwrap();
        assert_eq!(expr.evaluate(&[29.999], &[false]), 1);
        assert_eq!(expr.evaluate(&[30.0], &[false]), 0);
        assert_eq!(expr.evaluate(&[30.1], &[false]), 0);
    }

    #[test]
    fn mirrors_number_on_left() {
        let h = header();
        let mut catalog = AnnotationCatalog::build(&h, &["QUAL".to_owned()]).unwrap();
        let expr = FilterExpr::parse("30<=QUAL", &mut catalog, &h, true, |_| None).unwrap();
        assert_eq!(expr.evaluate(&[29.999], &[false]), 1);
        assert_eq!(expr.evaluate(&[30.0], &[false]), 0);
    }

    #[test]
    fn conjunction_packs_one_bit_per_predicate() {
        let h = header();
        let mut catalog = AnnotationCatalog::build(&h, &["QUAL".to_owned(), "DP".to_owned()]).unwrap();
        let expr = FilterExpr::parse("QUAL>=30&DP>10", &mut catalog, &h, true, |_| None).unwrap();
        let mask = expr.evaluate(&[10.0, 5.0], &[false, false]);
        assert_eq!(mask, 0b11);
        let mask = expr.evaluate(&[30.0, 20.0], &[false, false]);
        assert_eq!(mask, 0);
    }

    #[test]
    fn implicit_annotation_is_added() {
        let h = header();
        let mut catalog = AnnotationCatalog::build(&h, &["QUAL".to_owned()]).unwrap();
        assert_eq!(catalog.n_selected(), 1);
        let _expr = FilterExpr::parse("DP>5", &mut catalog, &h, true, |_| None).unwrap();
        assert_eq!(catalog.n_selected(), 2);
    }
}
