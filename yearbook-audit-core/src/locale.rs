// Locale-aware number parsing: comma decimal separator, dot (or space)
// thousands separator, as printed in the yearbook tables.
use crate::error::LocaleNumberError;

const SIGN_MINUS: [char; 2] = ['-', '\u{2212}'];
const GROUP_SPACES: [char; 3] = [' ', '\u{a0}', '\u{202f}'];

/// Parses a cell or text token such as `1.769.277`, `15,84`, `-3,5%` or `1 200`.
///
/// Dot is only accepted as a thousands separator: every group after the first
/// must have exactly three digits. `15.84` is therefore rejected with
/// `InvalidGrouping`, which is what the decimal separator rule relies on.
pub fn parse_locale_number(token: &str) -> Result<f64, LocaleNumberError> {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return Err(LocaleNumberError::Empty);
    }

    let mut body = trimmed;
    let mut negative = false;
    if let Some(rest) = body.strip_prefix(SIGN_MINUS) {
        negative = true;
        body = rest;
    } else if let Some(rest) = body.strip_prefix('+') {
        body = rest;
    }
    let body = body.strip_suffix('%').unwrap_or(body).trim();
    if body.is_empty() {
        return Err(LocaleNumberError::NotANumber(trimmed.to_string()));
    }

    let (integer, fraction) = match body.split_once(',') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (body, None),
    };

    if let Some(fraction) = fraction {
        if fraction.is_empty() || !fraction.chars().all(|c| c.is_ascii_digit()) {
            return Err(LocaleNumberError::NotANumber(trimmed.to_string()));
        }
    }

    // Spaces group thousands exactly like dots do
    let integer: String = integer
        .chars()
        .map(|c| if GROUP_SPACES.contains(&c) { '.' } else { c })
        .collect();

    if integer.is_empty() || !integer.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return Err(LocaleNumberError::NotANumber(trimmed.to_string()));
    }

    let digits = if integer.contains('.') {
        let groups: Vec<&str> = integer.split('.').collect();
        let (first, rest) = groups.split_first().ok_or_else(|| {
            LocaleNumberError::NotANumber(trimmed.to_string())
        })?;
        let valid = (1..=3).contains(&first.len()) && rest.iter().all(|group| group.len() == 3);
        if !valid {
            return Err(LocaleNumberError::InvalidGrouping(trimmed.to_string()));
        }
        groups.concat()
    } else {
        integer
    };

    let literal = match fraction {
        Some(fraction) => format!("{digits}.{fraction}"),
        None => digits,
    };
    let value: f64 = literal
        .parse()
        .map_err(|_| LocaleNumberError::NotANumber(trimmed.to_string()))?;

    Ok(if negative { -value } else { value })
}

/// Lenient variant for table cells: footnote markers such as `*` or `(a)` are
/// not stripped, so those cells simply do not count as numbers.
pub fn cell_number(cell: &str) -> Option<f64> {
    parse_locale_number(cell).ok()
}
