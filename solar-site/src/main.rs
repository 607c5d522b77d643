//! Solar installation site, hosted in the terminal.

mod pages;
mod routes;
mod terminal;

use solar_nexus::{App, FileStorage, Host, ReqwestTransport};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::runtime::Runtime;

fn main() -> anyhow::Result<()> {
    let config = solar_nexus::config::load_config()?;
    setup_tracing(config.debug);

    let storage_path = config.storage.path.clone().unwrap_or_else(FileStorage::default_path);
    tracing::info!(storage = %storage_path.display(), "starting solar-site");
    let host = Host {
        document: pages::layout(),
        storage: Arc::new(FileStorage::open(storage_path)),
        modules: Arc::new(pages::modules()),
        transport: Arc::new(ReqwestTransport::default()),
    };

    let rt = Runtime::new().map_err(|e| anyhow::anyhow!("Failed to start tokio: {}", e))?;
    rt.block_on(async move {
        let app = App::new(config, host);
        routes::register(app.router())?;
        // A failed start leaves the failure panel in the document; show it.
        if let Err(error) = app.start().await {
            tracing::error!(%error, "startup failed");
        }
        terminal::run(&app).await
    })
}

/// Log to a file; the terminal owns stdout.
fn setup_tracing(debug: bool) {
    use std::fs::OpenOptions;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug {
            EnvFilter::new("solar_nexus=debug,solar_site=debug,info")
        } else {
            EnvFilter::new("info")
        }
    });

    let log_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("solar-site");
    let log_path = log_dir.join("solar-site.log");
    let file = std::fs::create_dir_all(&log_dir)
        .and_then(|()| OpenOptions::new().create(true).append(true).open(&log_path));

    match file {
        Ok(file) => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .init();
            tracing::info!(path = %log_path.display(), "tracing initialized");
        }
        Err(_) => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::sink)
                .init();
        }
    }
}
