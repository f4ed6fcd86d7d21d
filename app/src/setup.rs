use std::sync::Arc;

use log::info;
use modeldock_transport::HttpTransport;

use crate::config::AppConfig;
use crate::error::Error;
use crate::models::{Catalog, ModelLayout, ModelManager};

/// Load the catalog named by `config` (or the built-in one)
pub fn load_catalog(config: &AppConfig) -> Result<Catalog, Error> {
    match &config.catalog_path {
        Some(path) => {
            info!("Loading catalog from {:?}", path);
            Ok(Catalog::from_json_file(path)?)
        }
        None => Ok(Catalog::builtin()),
    }
}

/// Wire the HTTP transport, catalog and models directory into a running
/// [`ModelManager`].
pub async fn setup_manager(config: &AppConfig) -> Result<ModelManager, Error> {
    info!("Modeldock v{}", env!("CARGO_PKG_VERSION"));

    let models_dir = config.resolve_models_dir()?;
    let catalog = load_catalog(config)?;
    let transport = HttpTransport::new(config.transport.to_transport_config())?;

    let manager = ModelManager::start(
        catalog,
        ModelLayout::new(models_dir),
        Arc::new(transport),
        config.download.to_transfer_settings(),
    )
    .await?;
    Ok(manager)
}
