mod ean13;
mod issn;

pub use ean13::*;
pub use issn::*;

use crate::{Error, Namespace, Result};

/// Validates `identifier` as a member of `namespace`: structure first, then
/// the check digit.
///
/// # Errors
///
/// - [`Error::InvalidFormat`] if the string does not have the namespace's
///   structure.
/// - [`Error::InvalidChecksum`] if the trailing digit is wrong.
pub fn validate_identifier(identifier: &str, namespace: Namespace) -> Result<()> {
    match namespace {
        Namespace::Isbn => validate_isbn(identifier),
        Namespace::Ismn => validate_ismn(identifier),
        Namespace::Issn => validate_issn(identifier),
    }
}

/// Appends the namespace's check digit to a hyphenated body, e.g.
/// `"978-951-12-0000"` becomes `"978-951-12-0000-0"` and `"1234-000"` becomes
/// `"1234-0006"`.
///
/// # Errors
///
/// Returns [`Error::InvalidFormat`] if the body has the wrong digit count.
pub fn append_check_digit(body: &str, namespace: Namespace) -> Result<String> {
    match namespace {
        Namespace::Isbn | Namespace::Ismn => {
            let digit = compute_isbn_check_digit(body)?;
            Ok(format!("{body}-{digit}"))
        }
        Namespace::Issn => {
            let digit = compute_issn_check_digit(body)?;
            Ok(format!("{body}{digit}"))
        }
    }
}

/// Collects exactly `N` decimal digits from `body`, skipping hyphens.
pub(crate) fn body_digits<const N: usize>(body: &str) -> Result<[u8; N]> {
    let mut digits = [0_u8; N];
    let mut len = 0;
    for b in body.bytes() {
        match b {
            b'-' => continue,
            b'0'..=b'9' => {
                if len == N {
                    return Err(Error::InvalidFormat {
                        value: body.to_owned(),
                        reason: "too many digits",
                    });
                }
                digits[len] = b - b'0';
                len += 1;
            }
            _ => {
                return Err(Error::InvalidFormat {
                    value: body.to_owned(),
                    reason: "unexpected character",
                });
            }
        }
    }
    if len != N {
        return Err(Error::InvalidFormat {
            value: body.to_owned(),
            reason: "too few digits",
        });
    }
    Ok(digits)
}
