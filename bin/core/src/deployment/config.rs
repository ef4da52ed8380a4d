use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use store::{Store, collections};

use crate::error::{Error, Result};

/// Declarative description of one deployment: which image to run,
/// at what scale, and how it is wired into the host.
#[derive(
  Debug, Clone, Default, PartialEq, Serialize, Deserialize,
)]
#[serde(default)]
pub struct DeploymentConfig {
  /// Unique deployment name; a DNS label.
  pub name: String,
  pub image: String,
  pub registry: String,
  pub tag: String,
  /// Number of containers to run.
  pub scale: u32,
  /// DNS names routed to this deployment.
  pub aliases: Vec<String>,
  /// host port -> container port
  pub ports: HashMap<String, String>,
  /// host path -> container path
  pub volumes: HashMap<String, String>,
  pub env: HashMap<String, String>,
  pub command: Vec<String>,
  pub entrypoint: Vec<String>,
  /// Whether external traffic is tls-terminated by the proxy.
  pub secured: bool,
}

impl DeploymentConfig {
  pub fn validate(&self) -> Result<()> {
    validate_name(&self.name)?;
    if self.image.is_empty() {
      return Err(invalid("image", "must not be empty"));
    }
    for (host, container) in &self.ports {
      validate_port("ports", host)?;
      validate_port("ports", container)?;
    }
    for (host, container) in &self.volumes {
      validate_path("volumes", host)?;
      validate_path("volumes", container)?;
    }
    for name in self.env.keys() {
      if name.is_empty() || name.contains('=') {
        return Err(invalid(
          "env",
          &format!("invalid variable name {name:?}"),
        ));
      }
    }
    Ok(())
  }

  /// Fill the documented defaults and normalize the name. A scale
  /// of zero means unset.
  pub fn apply_defaults(&mut self) {
    self.name = self.name.to_lowercase();
    if self.tag.is_empty() {
      self.tag = String::from("latest");
    }
    if self.registry.is_empty() {
      self.registry = String::from("docker.io");
    }
    if self.scale == 0 {
      self.scale = 1;
    }
  }

  /// Fully qualified image reference.
  pub fn image_ref(&self) -> String {
    format!("{}/{}:{}", self.registry, self.image, self.tag)
  }
}

fn invalid(field: &str, reason: &str) -> Error {
  Error::InvalidInput(format!("{field}: {reason}"))
}

fn validate_name(name: &str) -> Result<()> {
  if name.is_empty() || name.len() > 63 {
    return Err(invalid(
      "name",
      "must be between 1 and 63 characters",
    ));
  }
  if !name
    .chars()
    .all(|c| c.is_ascii_alphanumeric() || c == '-')
  {
    return Err(invalid("name", "must be a dns label"));
  }
  if name.starts_with('-') || name.ends_with('-') {
    return Err(invalid(
      "name",
      "must not start or end with a dash",
    ));
  }
  Ok(())
}

fn validate_port(field: &str, port: &str) -> Result<()> {
  match port.parse::<u16>() {
    Ok(port) if port >= 1 => Ok(()),
    _ => {
      Err(invalid(field, &format!("invalid port {port:?}")))
    }
  }
}

fn validate_path(field: &str, path: &str) -> Result<()> {
  if path.starts_with('/') {
    Ok(())
  } else {
    Err(invalid(
      field,
      &format!("path {path:?} must be absolute"),
    ))
  }
}

/// Validate, normalize, and persist a config, keyed by name.
/// Returns the config as stored.
pub fn save(
  store: &Store,
  mut config: DeploymentConfig,
) -> Result<DeploymentConfig> {
  config.validate()?;
  config.apply_defaults();
  let bytes = store::serialize(&config)?;
  store.put(collections::DEPLOYMENTS, &config.name, &bytes)?;
  Ok(config)
}

pub fn load(
  store: &Store,
  name: &str,
) -> Result<DeploymentConfig> {
  match store.get(collections::DEPLOYMENTS, name) {
    Ok(bytes) => Ok(store::deserialize(&bytes)?),
    Err(store::StoreError::NotFound) => {
      Err(Error::NotFound(format!("deployment {name}")))
    }
    Err(e) => Err(e.into()),
  }
}

pub fn delete(store: &Store, name: &str) -> Result<()> {
  store.remove(collections::DEPLOYMENTS, name)?;
  Ok(())
}

pub fn list(store: &Store) -> Result<Vec<DeploymentConfig>> {
  store
    .get_all(collections::DEPLOYMENTS)?
    .iter()
    .map(|bytes| Ok(store::deserialize(bytes)?))
    .collect()
}

/// Whether a deployment namespace exists, independent of any
/// containers being up. A linear scan over the collection; fine at
/// the fleet sizes a single host handles.
pub fn exists(store: &Store, name: &str) -> Result<bool> {
  Ok(
    list(store)?
      .into_iter()
      .any(|deployment| deployment.name == name),
  )
}
