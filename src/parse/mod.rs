//! Localized value parsing
//!
//! Upstream speaks Brazilian Portuguese: reference periods are labelled
//! `"junho/2024"`, prices arrive as `"R$ 1.000,50"` and model-years are keyed
//! by `"<year>-<fuel>"` codes. Everything here is a pure function so the
//! rest of the crate only ever sees canonical numbers.

mod codes;
mod locale;

pub use codes::{model_year_sort_key, parse_model_year_code, parse_numeric_id};
pub use locale::{parse_brl, parse_month_name, parse_reference_label};
