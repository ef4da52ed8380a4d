use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use jsonwebtoken::{
  DecodingKey, EncodingKey, Header, Validation, decode, encode,
};
use serde::{Deserialize, Serialize};

/// Issuer stamped on every session token.
pub const ISSUER: &str = "Krane";

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
  /// The session id.
  pub jti: String,
  pub iss: String,
  /// The authenticated ssh identity label.
  pub user: String,
  pub iat: i64,
  pub exp: i64,
}

/// Signs and verifies session tokens with the server secret
/// (HS256).
pub struct JwtClient {
  header: Header,
  validation: Validation,
  encoding_key: EncodingKey,
  decoding_key: DecodingKey,
}

impl JwtClient {
  pub fn new(signing_key: &str) -> anyhow::Result<JwtClient> {
    if signing_key.is_empty() {
      return Err(anyhow!(
        "cannot create token client - signing key not provided"
      ));
    }
    let mut validation = Validation::new(Default::default());
    validation.set_issuer(&[ISSUER]);
    Ok(JwtClient {
      header: Header::default(),
      validation,
      encoding_key: EncodingKey::from_secret(
        signing_key.as_bytes(),
      ),
      decoding_key: DecodingKey::from_secret(
        signing_key.as_bytes(),
      ),
    })
  }

  pub fn encode(
    &self,
    session_id: &str,
    user: &str,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
  ) -> anyhow::Result<String> {
    let claims = SessionClaims {
      jti: session_id.to_string(),
      iss: ISSUER.to_string(),
      user: user.to_string(),
      iat: issued_at.timestamp(),
      exp: expires_at.timestamp(),
    };
    encode(&self.header, &claims, &self.encoding_key)
      .context("failed at signing claims")
  }

  pub fn decode(
    &self,
    token: &str,
  ) -> anyhow::Result<SessionClaims> {
    decode::<SessionClaims>(
      token,
      &self.decoding_key,
      &self.validation,
    )
    .map(|data| data.claims)
    .context("failed to decode token claims")
  }
}
