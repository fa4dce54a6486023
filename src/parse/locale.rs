use crate::{ParseError, ParseResult};
use bigdecimal::BigDecimal;
use std::str::FromStr;

/// Portuguese month names in calendar order
const MONTHS: [&str; 12] = [
    "janeiro",
    "fevereiro",
    "março",
    "abril",
    "maio",
    "junho",
    "julho",
    "agosto",
    "setembro",
    "outubro",
    "novembro",
    "dezembro",
];

/// Converts a Portuguese month name into its 1-based number
///
/// Matching ignores case and surrounding whitespace. `"marco"` is accepted
/// as well, since the cedilla is sometimes lost in transit.
///
/// # Example
///
/// ```
/// use fipe_crawler::parse::parse_month_name;
///
/// assert_eq!(parse_month_name("junho").unwrap(), 6);
/// assert_eq!(parse_month_name(" Março ").unwrap(), 3);
/// ```
pub fn parse_month_name(name: &str) -> ParseResult<u32> {
    let normalized = name.trim().to_lowercase();

    if normalized == "marco" {
        return Ok(3);
    }

    MONTHS
        .iter()
        .position(|month| *month == normalized)
        .map(|index| index as u32 + 1)
        .ok_or_else(|| ParseError::UnknownMonth(name.to_string()))
}

/// Splits a reference period label such as `"junho/2024 "` into `(month, year)`
pub fn parse_reference_label(label: &str) -> ParseResult<(u32, i32)> {
    let (month_part, year_part) = label
        .trim()
        .split_once('/')
        .ok_or_else(|| ParseError::ReferenceLabel(label.to_string()))?;

    let month = parse_month_name(month_part)?;
    let year: i32 = year_part
        .trim()
        .parse()
        .map_err(|_| ParseError::ReferenceLabel(label.to_string()))?;

    if !(1000..=9999).contains(&year) {
        return Err(ParseError::ReferenceLabel(label.to_string()));
    }

    Ok((month, year))
}

/// Parses a BRL currency string into an exact decimal
///
/// `.` is the thousands separator and `,` the decimal mark, so
/// `"R$ 1.000,50"` becomes `1000.50`. A dangling decimal mark
/// (`"R$ 1.000,"`) is tolerated.
pub fn parse_brl(value: &str) -> ParseResult<BigDecimal> {
    let stripped = value.trim().trim_start_matches("R$");

    let canonical: String = stripped
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '.')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    let canonical = canonical.strip_suffix('.').unwrap_or(&canonical);

    let well_formed = !canonical.is_empty()
        && canonical.chars().all(|c| c.is_ascii_digit() || c == '.')
        && canonical.matches('.').count() <= 1
        && !canonical.starts_with('.');

    if !well_formed {
        return Err(ParseError::Currency(value.to_string()));
    }

    BigDecimal::from_str(canonical).map_err(|_| ParseError::Currency(value.to_string()))
}
