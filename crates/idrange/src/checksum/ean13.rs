use std::sync::LazyLock;

use regex::Regex;

use crate::{Error, ISBN_BODY_WIDTH, ISMN_BODY_WIDTH, Result, checksum::body_digits};

/// `978-951|952`, publisher (1-5), item (1-5), check digit.
static ISBN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^978-95[12]-([0-9]{1,5})-([0-9]{1,5})-([0-9])$").expect("valid ISBN pattern")
});

/// `979-0`, publisher (3-7), item (1-5), check digit.
static ISMN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^979-0-([0-9]{3,7})-([0-9]{1,5})-([0-9])$").expect("valid ISMN pattern")
});

/// Computes the EAN-13 check digit shared by ISBN-13 and ISMN.
///
/// The 12 body digits are weighted 1, 3, 1, 3, ... and the check digit is
/// `(10 - sum % 10) % 10`. Hyphens in `body` are ignored.
///
/// # Example
///
/// ```
/// use idrange::compute_isbn_check_digit;
///
/// assert_eq!(compute_isbn_check_digit("978-0-306-40615"), Ok(7));
/// ```
///
/// # Errors
///
/// Returns [`Error::InvalidFormat`] unless `body` holds exactly 12 digits.
pub fn compute_isbn_check_digit(body: &str) -> Result<u8> {
    let digits = body_digits::<12>(body)?;
    let sum: u32 = digits
        .iter()
        .enumerate()
        .map(|(i, &d)| u32::from(d) * if i % 2 == 0 { 1 } else { 3 })
        .sum();
    Ok(((10 - sum % 10) % 10) as u8)
}

/// Validates an ISBN (Finnish groups `978-951`/`978-952`) or an ISMN
/// (`979-0`), picking the family from the prefix.
///
/// # Errors
///
/// [`Error::InvalidFormat`] for structural problems, [`Error::InvalidChecksum`]
/// for a wrong trailing digit.
pub fn validate_isbn_or_ismn(identifier: &str) -> Result<()> {
    if identifier.starts_with("979-") {
        validate_ismn(identifier)
    } else {
        validate_isbn(identifier)
    }
}

/// Validates a hyphenated ISBN-13 from the `978-951`/`978-952` groups.
///
/// # Errors
///
/// See [`validate_isbn_or_ismn`].
pub fn validate_isbn(identifier: &str) -> Result<()> {
    validate_ean13(identifier, &ISBN_PATTERN, ISBN_BODY_WIDTH)
}

/// Validates a hyphenated ISMN (`979-0-…`).
///
/// # Errors
///
/// See [`validate_isbn_or_ismn`].
pub fn validate_ismn(identifier: &str) -> Result<()> {
    validate_ean13(identifier, &ISMN_PATTERN, ISMN_BODY_WIDTH)
}

fn validate_ean13(identifier: &str, pattern: &Regex, body_width: u8) -> Result<()> {
    let caps = pattern
        .captures(identifier)
        .ok_or_else(|| Error::InvalidFormat {
            value: identifier.to_owned(),
            reason: "does not match the namespace structure",
        })?;

    let publisher = &caps[1];
    let item = &caps[2];
    if publisher.len() + item.len() != usize::from(body_width) {
        return Err(Error::InvalidFormat {
            value: identifier.to_owned(),
            reason: "publisher and item segments have the wrong combined length",
        });
    }

    // Everything up to the final "-C".
    let body = &identifier[..identifier.len() - 2];
    let expected = compute_isbn_check_digit(body)?;
    let actual = caps[3].as_bytes()[0] - b'0';
    if actual != expected {
        return Err(Error::InvalidChecksum {
            value: identifier.to_owned(),
            expected: char::from(b'0' + expected),
        });
    }
    Ok(())
}
