//! Small nom combinators shared by the table reader and filter-expression
//! parser. Named and shaped after the teacher's own `parsing_utils` helpers
//! (see e.g. `dmr::parse_bedmethyl_line`'s use of `consume_digit`/
//! `consume_float`/`consume_string`).

use nom::branch::alt;
use nom::bytes::complete::{tag, take_till, take_while1};
use nom::character::complete::{char, digit1, multispace0};
use nom::combinator::{map_res, opt, recognize};
use nom::sequence::{pair, preceded};
use nom::IResult;

/// Consume a run of non-whitespace characters as a `&str` token.
pub fn consume_string(input: &str) -> IResult<&str, String> {
    let (rest, _) = multispace0(input)?;
    let (rest, tok) = take_till(|c: char| c.is_whitespace())(rest)?;
    Ok((rest, tok.to_owned()))
}

/// Consume a run of non-whitespace, non-tab characters allowing internal
/// spaces to remain (used for free-text fields like BED `name`).
pub fn consume_string_spaces(input: &str) -> IResult<&str, String> {
    let (rest, _) = multispace0(input)?;
    let tok = rest.trim_end();
    Ok(("", tok.to_owned()))
}

/// Consume an unsigned decimal integer.
pub fn consume_digit(input: &str) -> IResult<&str, u64> {
    let (rest, _) = multispace0(input)?;
    map_res(digit1, |s: &str| s.parse::<u64>())(rest)
}

/// Consume a single non-whitespace character.
pub fn consume_char(input: &str) -> IResult<&str, char> {
    let (rest, _) = multispace0(input)?;
    nom::character::complete::anychar(rest)
}

/// Consume a character if it is a member of `list`.
pub fn consume_char_from_list<'a>(
    input: &'a str,
    list: &str,
) -> IResult<&'a str, char> {
    let (rest, _) = multispace0(input)?;
    let list = list.to_owned();
    nom::character::complete::satisfy(move |c| list.contains(c))(rest)
}

/// Consume a floating point literal, including optional sign and exponent.
pub fn consume_float(input: &str) -> IResult<&str, f64> {
    let (rest, _) = multispace0(input)?;
    let float_str = recognize(pair(
        opt(alt((char('+'), char('-')))),
        alt((
            recognize(pair(digit1, opt(pair(char('.'), opt(digit1))))),
            recognize(pair(char('.'), digit1)),
        )),
    ));
    map_res(float_str, |s: &str| s.parse::<f64>())(rest)
}

/// Consume an identifier: letters, digits, `_`, `.`, `-`.
pub fn consume_ident(input: &str) -> IResult<&str, &str> {
    let (rest, _) = multispace0(input)?;
    take_while1(|c: char| c.is_alphanumeric() || c == '_' || c == '.' || c == '-')(rest)
}

/// Consume a literal tag, skipping leading whitespace.
pub fn consume_tag<'a>(input: &'a str, literal: &'static str) -> IResult<&'a str, &'a str> {
    preceded(multispace0, tag(literal))(input)
}
