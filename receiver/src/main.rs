use std::path::{Path, PathBuf};
use std::sync::Arc;

use imgseq_common::config::Config;
use imgseq_receiver::{router, AppState, ImageStore};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // An explicit path must load; the implicit one may be absent.
    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => Config::load(&path).map_err(|e| (path, e)),
        None => {
            let path = Path::new("config.toml");
            Config::load_or_default(path).map_err(|e| (path.to_path_buf(), e))
        }
    };
    let config = match config {
        Ok(c) => c,
        Err((path, e)) => {
            eprintln!("Failed to load config from {}: {e}", path.display());
            std::process::exit(1);
        }
    };

    imgseq_common::logging::init(&config.logging.level);

    let store = match ImageStore::open(&config.receiver.save_folder).await {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to open image store");
            std::process::exit(1);
        }
    };

    let state = Arc::new(AppState {
        store,
        max_upload_bytes: config.receiver.max_upload_bytes,
    });
    let app = router(state);

    let addr = config.receiver.bind_addr();
    info!(addr, "image receiver starting");

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap_or_else(|e| {
        eprintln!("Failed to bind to {addr}: {e}");
        std::process::exit(1);
    });

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "server error");
        std::process::exit(1);
    }
    info!("image receiver stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
