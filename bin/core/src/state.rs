use std::sync::Arc;

use store::Store;

use crate::{
  auth::jwt::JwtClient, config::CoreConfig,
  docker::ContainerEngine, job::JobEngine,
};

/// Everything the request handlers and job procedures share.
/// Constructed once at boot and passed around explicitly; tests
/// build isolated instances.
pub struct App {
  pub config: CoreConfig,
  pub store: Store,
  pub engine: Arc<dyn ContainerEngine>,
  pub jobs: JobEngine,
  pub jwt: JwtClient,
}

pub type AppState = Arc<App>;

impl App {
  pub fn new(
    config: CoreConfig,
    store: Store,
    engine: Arc<dyn ContainerEngine>,
  ) -> anyhow::Result<App> {
    for collection in store::collections::ALL {
      store.create_collection(collection)?;
    }
    let jwt = JwtClient::new(&config.signing_key)?;
    let jobs =
      JobEngine::new(config.job_workers, config.job_queue_size);
    Ok(App {
      config,
      store,
      engine,
      jobs,
      jwt,
    })
  }
}
