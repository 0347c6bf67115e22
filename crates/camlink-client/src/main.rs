//! CamLink client entry point (headless).
//!
//! Wires the file-backed endpoint store and the WebSocket connector into a
//! [`SessionManager`], connects to the stored (or default) device, and logs
//! every state change until Ctrl-C.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ TomlFileStore::open_default()   -- endpoint + settings on disk
//!  └─ SessionManager::new()           -- state machine, WsConnector injected
//!       ├─ initialize()               -- load endpoint, both states Disconnected
//!       ├─ connect()                  -- open the control channel
//!       └─ run(events)                -- spawned; applies transport events
//!  └─ snapshot loop                   -- logs SessionSnapshot changes
//! ```
//!
//! A UI host does the same wiring and, instead of logging snapshots, renders
//! them and calls `send_command` / `set_endpoint` from its buttons.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use camlink_client::infrastructure::network::{WsConnector, WsConnectorConfig};
use camlink_client::infrastructure::storage::TomlFileStore;
use camlink_client::{EndpointStore, SessionManager};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let store = TomlFileStore::open_default().context("failed to locate the CamLink state file")?;

    // RUST_LOG wins; otherwise the settings file; otherwise "info".
    let log_level = match store.load_settings() {
        Ok(settings) => settings.log_level,
        Err(e) => {
            eprintln!("ignoring unreadable settings in {}: {e}", store.path().display());
            "info".to_string()
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level)),
        )
        .init();

    info!("CamLink client starting (state file {})", store.path().display());

    let connector = WsConnector::from_current(WsConnectorConfig::default())
        .context("the connector needs a Tokio runtime")?;
    let (manager, events) =
        SessionManager::new(EndpointStore::new(Arc::new(store)), Arc::new(connector));
    let manager = Arc::new(manager);

    let init = manager.initialize();
    if let Some(e) = &init.persist_error {
        warn!("default endpoint not saved: {e}");
    }
    info!(
        "device endpoint {} (stream at {})",
        init.endpoint,
        init.endpoint.stream_url()
    );

    let runner = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.run(events).await })
    };

    let mut snapshots = manager.subscribe();
    manager.connect();

    // ── Main loop ─────────────────────────────────────────────────────────────
    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                info!(
                    "control: {}, camera: {}",
                    snapshot.control, snapshot.camera
                );
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for Ctrl-C")?;
                info!("shutdown signal received");
                break;
            }
        }
    }

    manager.shutdown();
    runner.abort();
    info!("CamLink client stopped");
    Ok(())
}
