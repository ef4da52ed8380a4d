//! Embedded key/value store backing all Krane state.
//!
//! A thin wrapper around [sled]: one database on disk, with a named
//! collection (a sled tree) per kind of record. Writes are
//! single-key atomic, and [`Store::get_all`] scans one collection in
//! key order.

use std::path::Path;

use serde::{Serialize, de::DeserializeOwned};

/// The collections Krane persists.
pub mod collections {
  pub const DEPLOYMENTS: &str = "deployments";
  pub const SESSIONS: &str = "sessions";
  pub const AUTH: &str = "auth";
  pub const TOKENS: &str = "tokens";

  pub const ALL: [&str; 4] =
    [DEPLOYMENTS, SESSIONS, AUTH, TOKENS];
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  #[error("key not found")]
  NotFound,
  #[error("failed to decode stored value | {0}")]
  Corrupt(#[from] serde_json::Error),
  #[error("store unavailable | {0}")]
  Unavailable(#[from] sled::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Clone)]
pub struct Store {
  db: sled::Db,
}

impl Store {
  /// Open the database at `path`, creating it if it does not exist.
  pub fn open(path: impl AsRef<Path>) -> Result<Store> {
    let db = sled::Config::new()
      .path(path)
      .mode(sled::Mode::HighThroughput)
      .flush_every_ms(Some(1000))
      .open()?;
    Ok(Store { db })
  }

  /// A throwaway database which is deleted on drop. For tests.
  pub fn temporary() -> Result<Store> {
    let db = sled::Config::new().temporary(true).open()?;
    Ok(Store { db })
  }

  /// Make sure the named collection exists.
  pub fn create_collection(&self, name: &str) -> Result<()> {
    self.db.open_tree(name)?;
    Ok(())
  }

  pub fn put(
    &self,
    collection: &str,
    key: &str,
    value: &[u8],
  ) -> Result<()> {
    self.tree(collection)?.insert(key, value)?;
    Ok(())
  }

  pub fn get(&self, collection: &str, key: &str) -> Result<Vec<u8>> {
    self
      .tree(collection)?
      .get(key)?
      .map(|value| value.to_vec())
      .ok_or(StoreError::NotFound)
  }

  pub fn remove(&self, collection: &str, key: &str) -> Result<()> {
    self.tree(collection)?.remove(key)?;
    Ok(())
  }

  /// Every value in the collection, in key order.
  pub fn get_all(&self, collection: &str) -> Result<Vec<Vec<u8>>> {
    self
      .tree(collection)?
      .iter()
      .values()
      .map(|value| Ok(value?.to_vec()))
      .collect()
  }

  pub fn flush(&self) -> Result<()> {
    self.db.flush()?;
    Ok(())
  }

  fn tree(&self, collection: &str) -> Result<sled::Tree> {
    Ok(self.db.open_tree(collection)?)
  }
}

pub fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>> {
  Ok(serde_json::to_vec(value)?)
}

pub fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
  Ok(serde_json::from_slice(bytes)?)
}
