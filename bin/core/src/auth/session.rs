use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use store::{Store, collections};

use crate::error::{Error, Result};

/// An authenticated user session.
#[derive(
  Debug, Clone, Default, PartialEq, Serialize, Deserialize,
)]
pub struct Session {
  pub id: String,
  /// The registered ssh identity label.
  pub user: String,
  /// The signed session token handed to the client.
  pub token: String,
  pub expires_at: String,
}

impl Session {
  /// A session is valid when fully populated and not yet expired.
  pub fn is_valid(&self) -> bool {
    if self.id.is_empty()
      || self.user.is_empty()
      || self.token.is_empty()
    {
      return false;
    }
    match DateTime::parse_from_rfc3339(&self.expires_at) {
      Ok(expires_at) => {
        expires_at.with_timezone(&Utc) > Utc::now()
      }
      Err(_) => false,
    }
  }
}

pub fn save(store: &Store, session: &Session) -> Result<()> {
  if session.id.is_empty() {
    return Err(Error::InvalidInput(String::from(
      "session: missing id",
    )));
  }
  let bytes = store::serialize(session)?;
  store.put(collections::SESSIONS, &session.id, &bytes)?;
  Ok(())
}

pub fn get(store: &Store, id: &str) -> Result<Session> {
  match store.get(collections::SESSIONS, id) {
    Ok(bytes) => Ok(store::deserialize(&bytes)?),
    Err(store::StoreError::NotFound) => {
      Err(Error::NotFound(format!("session {id}")))
    }
    Err(e) => Err(e.into()),
  }
}

pub fn list(store: &Store) -> Result<Vec<Session>> {
  store
    .get_all(collections::SESSIONS)?
    .iter()
    .map(|bytes| Ok(store::deserialize(bytes)?))
    .collect()
}

pub fn delete(store: &Store, id: &str) -> Result<()> {
  store.remove(collections::SESSIONS, id)?;
  Ok(())
}
