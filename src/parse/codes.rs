use crate::{ParseError, ParseResult};

/// Coerces an upstream identifier into the integer used for ordering
pub fn parse_numeric_id(code: &str) -> ParseResult<i64> {
    code.trim()
        .parse()
        .map_err(|_| ParseError::NonNumericId(code.to_string()))
}

/// Splits a model-year code such as `"2014-1"` into `(year, fuel_type)`
///
/// Upstream uses the year `32000` for brand-new ("zero km") vehicles, so the
/// year is not range-checked here.
pub fn parse_model_year_code(code: &str) -> ParseResult<(i32, i32)> {
    let (year, fuel) = code
        .trim()
        .split_once('-')
        .ok_or_else(|| ParseError::ModelYearCode(code.to_string()))?;

    let year = year
        .trim()
        .parse()
        .map_err(|_| ParseError::ModelYearCode(code.to_string()))?;
    let fuel = fuel
        .trim()
        .parse()
        .map_err(|_| ParseError::ModelYearCode(code.to_string()))?;

    Ok((year, fuel))
}

/// Orders model-years by year first, then by fuel code
pub fn model_year_sort_key(year: i32, fuel_type: i32) -> i64 {
    i64::from(year) * 100 + i64::from(fuel_type)
}
