use log::{error, info};
use regolith_displayd::backend::sway::SwayBackend;
use regolith_displayd::store::{ConfigPaths, ConfigStore};
use regolith_displayd::{DisplayManager, DisplayServer};
use std::{error::Error, future::pending, sync::Arc};
use tokio::{sync::Mutex, try_join};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    pretty_env_logger::init();
    let backend = SwayBackend::connect().await.map_err(|e| {
        error!("Unable to connect to sway ipc interface. Make sure sway is running and SWAYSOCK is set");
        e
    })?;
    let store = ConfigStore::new(ConfigPaths::user()?);
    let mut manager = DisplayManager::new(Box::new(backend), store);

    match manager.apply_stored() {
        Ok(()) => info!("applied stored configuration"),
        Err(e) if e.is_no_match() => info!("keeping current layout: {e}"),
        Err(e) => error!("failed to apply stored configuration: {e}"),
    }

    // New pointer to Display Manager Object
    let manager_ref = Arc::new(Mutex::new(manager));
    let connection = DisplayServer::new(Arc::clone(&manager_ref)).run_server().await?;

    let watch_connection = connection.clone();
    let watch_handle = tokio::spawn(async move {
        if let Err(e) = DisplayManager::watch_changes(manager_ref, &watch_connection).await {
            error!("{e}");
        }
    });

    if let Err(e) = try_join!(watch_handle) {
        error!("{}", e);
    }
    pending::<()>().await;
    Ok(())
}
