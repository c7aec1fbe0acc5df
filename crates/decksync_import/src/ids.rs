//! Id and guid probing.

use crate::error::{MergeError, MergeResult};

/// Digits of the base-91 alphabet guids are written in, lowest first.
pub const BASE91_DIGITS: &[u8; 91] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!#$%&()*+,-./:;<=>?@[]^_`{|}~";

/// Increments a guid read as a base-91 number whose last character is the
/// least significant digit.
///
/// A character outside the alphabet counts as the highest digit, so it
/// rolls over. Carrying past the first character prepends a digit.
///
/// ```
/// use decksync_import::increment_guid;
///
/// assert_eq!(increment_guid("abc"), "abd");
/// assert_eq!(increment_guid("a~"), "ba");
/// ```
pub fn increment_guid(guid: &str) -> String {
    let mut digits: Vec<char> = guid.chars().collect();
    for digit in digits.iter_mut().rev() {
        let index = BASE91_DIGITS.iter().position(|&b| char::from(b) == *digit);
        match index {
            Some(i) if i + 1 < BASE91_DIGITS.len() => {
                *digit = char::from(BASE91_DIGITS[i + 1]);
                return digits.into_iter().collect();
            }
            _ => *digit = char::from(BASE91_DIGITS[0]),
        }
    }
    let mut grown = String::with_capacity(digits.len() + 1);
    grown.push(char::from(BASE91_DIGITS[1]));
    grown.extend(digits);
    grown
}

/// Finds the first id in `start, start + step, ...` for which `taken`
/// returns false, trying at most `max_probes` ids.
pub fn probe_id<F>(kind: &'static str, start: i64, step: i64, max_probes: u32, mut taken: F) -> MergeResult<i64>
where
    F: FnMut(i64) -> MergeResult<bool>,
{
    let mut id = start;
    for _ in 0..max_probes {
        if !taken(id)? {
            return Ok(id);
        }
        id = id.checked_add(step).ok_or(MergeError::IdSpaceExhausted {
            kind,
            start,
            probes: max_probes,
        })?;
    }
    Err(MergeError::IdSpaceExhausted {
        kind,
        start,
        probes: max_probes,
    })
}
