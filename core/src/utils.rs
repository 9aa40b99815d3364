//! Small numeric and text helpers shared by the document models.

use std::borrow::Cow;

use nom::bytes::complete::take_while_m_n;
use nom::character::complete::{char, digit1, one_of};
use nom::combinator::{map_res, opt, recognize};
use nom::sequence::{pair, preceded, separated_pair};
use nom::{IResult, Parser};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

/// Rounds `value` to `scale` decimal places, midpoints away from zero.
///
/// Values that cannot be represented as a [`Decimal`] (NaN, infinities, or
/// magnitudes beyond ~7.9e28) are returned unchanged.
pub fn round(value: f64, scale: u32) -> f64 {
    Decimal::from_f64(value)
        .map(|d| d.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|d| d.to_f64())
        .unwrap_or(value)
}

/// 32-bit rolling string hash (`h = h * 31 + c` over UTF-16 code units).
///
/// Not collision resistant. Used only to derive short identifiers.
pub fn string_hash(value: &str) -> i32 {
    value.encode_utf16().fold(0i32, |hash, unit| {
        hash.wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(i32::from(unit))
    })
}

pub fn escape_text(value: &str) -> Cow<'_, str> {
    xml::escape::escape_str_pcdata(value)
}

pub fn escape_attribute(value: &str) -> Cow<'_, str> {
    xml::escape::escape_str_attribute(value)
}

fn signed_integer(input: &str) -> IResult<&str, i64> {
    map_res(recognize(pair(opt(one_of("+-")), digit1)), |v: &str| {
        v.parse::<i64>()
    })
    .parse(input)
}

fn minutes_seconds(input: &str) -> IResult<&str, i64> {
    let seconds = map_res(
        take_while_m_n(1, 2, |c: char| c.is_ascii_digit()),
        |v: &str| v.parse::<i64>(),
    );
    separated_pair(signed_integer, char(':'), seconds)
        .map(|(minutes, seconds)| minutes * 60 + seconds)
        .parse(input)
}

fn decimal_number(input: &str) -> IResult<&str, f64> {
    map_res(
        recognize((
            opt(char('-')),
            digit1,
            opt(preceded(char('.'), digit1)),
        )),
        |v: &str| v.parse::<f64>(),
    )
    .parse(input)
}

/// Converts a duration/offset value such as `"45:30 min"` to seconds.
///
/// Anything that does not start with `<minutes>:<seconds>` yields 0.
pub fn time_to_seconds(value: &str) -> i64 {
    minutes_seconds(value.trim_start())
        .map(|(_, seconds)| seconds)
        .unwrap_or(0)
}

/// Reads the leading number of a value carrying a unit, e.g. `"12.5 m"`.
///
/// A leading `-` is kept so sub-zero water temperatures read correctly.
/// Anything without a numeric prefix yields 0.
pub fn to_number(value: &str) -> f64 {
    decimal_number(value.trim_start())
        .map(|(_, n)| n)
        .unwrap_or(0.0)
}
