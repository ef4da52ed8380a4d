use chrono::{SecondsFormat, Utc};
use rand::RngCore;

/// Current time as an RFC3339 string.
pub fn utc_date_string() -> String {
  Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Opaque identifier: 12 random bytes, hex encoded.
pub fn make_identifier() -> String {
  let mut bytes = [0u8; 12];
  rand::rng().fill_bytes(&mut bytes);
  hex::encode(bytes)
}

/// Short random suffix appended to container names.
pub fn short_suffix() -> String {
  let mut bytes = [0u8; 3];
  rand::rng().fill_bytes(&mut bytes);
  hex::encode(bytes)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn identifiers_are_hex_and_unique() {
    let first = make_identifier();
    let second = make_identifier();
    assert_eq!(first.len(), 24);
    assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
    assert_ne!(first, second);
  }

  #[test]
  fn suffix_is_short_lowercase_hex() {
    let suffix = short_suffix();
    assert_eq!(suffix.len(), 6);
    assert!(
      suffix
        .chars()
        .all(|c| c.is_ascii_hexdigit() && !c.is_uppercase())
    );
  }
}
