use std::sync::LazyLock;

use regex::Regex;

use crate::{Error, Result, checksum::body_digits};

static ISSN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{4}-[0-9]{3}[0-9X]$").expect("valid ISSN pattern"));

/// Computes the ISSN check character.
///
/// The 7 body digits are weighted 8 down to 2; the check value is
/// `(11 - sum % 11) % 11`, written as `'X'` when it is 10. Hyphens in `body`
/// are ignored.
///
/// # Example
///
/// ```
/// use idrange::compute_issn_check_digit;
///
/// assert_eq!(compute_issn_check_digit("0378-595"), Ok('5'));
/// ```
///
/// # Errors
///
/// Returns [`Error::InvalidFormat`] unless `body` holds exactly 7 digits.
pub fn compute_issn_check_digit(body: &str) -> Result<char> {
    let digits = body_digits::<7>(body)?;
    let sum: u32 = digits
        .iter()
        .zip((2..=8).rev())
        .map(|(&d, w)| u32::from(d) * w)
        .sum();
    Ok(match (11 - sum % 11) % 11 {
        10 => 'X',
        n => char::from(b'0' + n as u8),
    })
}

/// Validates a hyphenated ISSN (`NNNN-NNNC`).
///
/// # Errors
///
/// [`Error::InvalidFormat`] for structural problems, [`Error::InvalidChecksum`]
/// for a wrong check character.
pub fn validate_issn(identifier: &str) -> Result<()> {
    if !ISSN_PATTERN.is_match(identifier) {
        return Err(Error::InvalidFormat {
            value: identifier.to_owned(),
            reason: "expected NNNN-NNNC",
        });
    }
    let expected = compute_issn_check_digit(&identifier[..8])?;
    if identifier.as_bytes()[8] != expected as u8 {
        return Err(Error::InvalidChecksum {
            value: identifier.to_owned(),
            expected,
        });
    }
    Ok(())
}
