//! Decoding of `ssh-rsa` public keys from the OpenSSH wire format.
//!
//! A key line is the standard `ssh-rsa <base64> [comment]` triple.
//! The decoded blob is a sequence of 32-bit big-endian
//! length-prefixed chunks: the format string, the public exponent
//! `e`, and the modulus `n`.

use base64::{Engine, engine::general_purpose::STANDARD};

pub const KEY_TYPE: &str = "ssh-rsa";

#[derive(Debug, thiserror::Error)]
pub enum SshKeyError {
  #[error(
    "invalid key; must contain at least two fields (keytype data [comment])"
  )]
  MalformedLine,
  #[error("failed to base64 decode key data | {0}")]
  Base64(#[from] base64::DecodeError),
  #[error("key blob truncated")]
  Truncated,
  #[error(
    "key type said {key_type}, but encoded format said {format}; these should match"
  )]
  FormatMismatch { key_type: String, format: String },
  #[error("unsupported key type {0}; only ssh-rsa keys work")]
  UnsupportedKeyType(String),
}

/// Raw big-endian components of an RSA public key, exactly as they
/// appear in the key blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaPublicKey {
  pub e: Vec<u8>,
  pub n: Vec<u8>,
}

impl RsaPublicKey {
  /// The modulus with the leading zero of the mpint encoding
  /// removed, as signature verifiers expect it.
  pub fn modulus(&self) -> &[u8] {
    strip_leading_zeros(&self.n)
  }

  pub fn exponent(&self) -> &[u8] {
    strip_leading_zeros(&self.e)
  }
}

pub fn decode_public_key(
  key: &str,
) -> Result<RsaPublicKey, SshKeyError> {
  let mut fields = key.split_whitespace();
  let key_type =
    fields.next().ok_or(SshKeyError::MalformedLine)?;
  let data = fields.next().ok_or(SshKeyError::MalformedLine)?;
  if key_type != KEY_TYPE {
    return Err(SshKeyError::UnsupportedKeyType(
      key_type.to_string(),
    ));
  }

  let blob = STANDARD.decode(data)?;
  let (format, rest) = read_chunk(&blob)?;
  let format = String::from_utf8_lossy(format);
  if format != key_type {
    return Err(SshKeyError::FormatMismatch {
      key_type: key_type.to_string(),
      format: format.into_owned(),
    });
  }
  let (e, rest) = read_chunk(rest)?;
  let (n, _) = read_chunk(rest)?;
  Ok(RsaPublicKey {
    e: e.to_vec(),
    n: n.to_vec(),
  })
}

/// Split one length-prefixed chunk off the front of `data`.
fn read_chunk(
  data: &[u8],
) -> Result<(&[u8], &[u8]), SshKeyError> {
  if data.len() < 4 {
    return Err(SshKeyError::Truncated);
  }
  let length =
    u32::from_be_bytes([data[0], data[1], data[2], data[3]])
      as usize;
  let rest = &data[4..];
  if rest.len() < length {
    return Err(SshKeyError::Truncated);
  }
  Ok(rest.split_at(length))
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
  let start = bytes
    .iter()
    .position(|byte| *byte != 0)
    .unwrap_or(bytes.len());
  &bytes[start..]
}

/// Inverse of [`decode_public_key`], producing the two-field form
/// without a comment.
#[cfg(test)]
pub fn encode_public_key(key: &RsaPublicKey) -> String {
  let mut blob = Vec::new();
  for chunk in
    [KEY_TYPE.as_bytes(), key.e.as_slice(), key.n.as_slice()]
  {
    blob.extend_from_slice(&(chunk.len() as u32).to_be_bytes());
    blob.extend_from_slice(chunk);
  }
  format!("{KEY_TYPE} {}", STANDARD.encode(blob))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::auth::fixtures;

  #[test]
  fn decodes_a_real_public_key() {
    let key = decode_public_key(fixtures::PUBLIC_KEY).unwrap();
    // 2048-bit modulus, mpint encoded with a leading zero.
    assert_eq!(key.modulus().len(), 256);
    assert_eq!(key.exponent(), &[0x01, 0x00, 0x01]);
  }

  #[test]
  fn encode_then_decode_roundtrips() {
    let key = decode_public_key(fixtures::PUBLIC_KEY).unwrap();
    let encoded = encode_public_key(&key);
    assert_eq!(decode_public_key(&encoded).unwrap(), key);
    // The comment is the only thing the encoder drops.
    let mut fields = fixtures::PUBLIC_KEY.split_whitespace();
    let expected = format!(
      "{} {}",
      fields.next().unwrap(),
      fields.next().unwrap()
    );
    assert_eq!(encoded, expected);
  }

  #[test]
  fn synthetic_components_roundtrip() {
    let key = RsaPublicKey {
      e: vec![0x01, 0x00, 0x01],
      n: vec![0x00, 0xde, 0xad, 0xbe, 0xef],
    };
    let decoded =
      decode_public_key(&encode_public_key(&key)).unwrap();
    assert_eq!(decoded, key);
    assert_eq!(decoded.modulus(), &[0xde, 0xad, 0xbe, 0xef]);
  }

  #[test]
  fn rejects_line_with_one_field() {
    assert!(matches!(
      decode_public_key("ssh-rsa"),
      Err(SshKeyError::MalformedLine)
    ));
  }

  #[test]
  fn rejects_bad_base64() {
    assert!(matches!(
      decode_public_key("ssh-rsa not-base64!!!"),
      Err(SshKeyError::Base64(_))
    ));
  }

  #[test]
  fn rejects_non_rsa_key_types() {
    let data = fixtures::PUBLIC_KEY
      .split_whitespace()
      .nth(1)
      .unwrap();
    let line = format!("ssh-ed25519 {data}");
    assert!(matches!(
      decode_public_key(&line),
      Err(SshKeyError::UnsupportedKeyType(_))
    ));
  }

  #[test]
  fn rejects_mismatched_embedded_format() {
    // Blob whose embedded format string disagrees with the line.
    let mut blob = Vec::new();
    for chunk in
      [b"ssh-dss".as_slice(), &[0x01, 0x00, 0x01], &[0xab]]
    {
      blob
        .extend_from_slice(&(chunk.len() as u32).to_be_bytes());
      blob.extend_from_slice(chunk);
    }
    let line = format!("ssh-rsa {}", STANDARD.encode(blob));
    assert!(matches!(
      decode_public_key(&line),
      Err(SshKeyError::FormatMismatch { .. })
    ));
  }

  #[test]
  fn rejects_truncated_blob() {
    let line =
      format!("ssh-rsa {}", STANDARD.encode(b"\x00\x00\x00\x07ssh-rsa\x00\x00\x00\x09"));
    assert!(matches!(
      decode_public_key(&line),
      Err(SshKeyError::Truncated)
    ));
  }
}
