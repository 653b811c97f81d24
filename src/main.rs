use std::{
    sync::Arc,
    time::Duration,
};

use log::{
    error,
    info,
    warn,
};
use vocab_bridge::{
    anki::{
        wait_awake,
        AnkiApi,
        AnkiClient,
    },
    downloads::{
        DownloadQueue,
        DownloadScheduler,
        StateStore,
    },
    notify::{
        FanoutNotifier,
        LogNotifier,
        Notifier,
    },
    persistence::get_state_dir,
    settings::BridgeSettings,
    sync::SyncService,
    websocket::{
        ClientHub,
        WebSocketServer,
    },
    BridgeError,
};

const STARTUP_WAIT: Duration = Duration::from_secs(2);
const STARTUP_ATTEMPTS: u32 = 5;

#[tokio::main]
async fn main() -> Result<(), BridgeError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = BridgeSettings::load();
    info!("Using AnkiConnect at {}", settings.anki_connect_url);

    let api: Arc<dyn AnkiApi> =
        Arc::new(AnkiClient::new(settings.anki_connect_url.clone(), settings.request_timeout())?);

    let hub = ClientHub::new();
    let notifier: Arc<dyn Notifier> =
        Arc::new(FanoutNotifier::new().with(Arc::new(LogNotifier)).with(Arc::new(hub.clone())));

    let queue = DownloadQueue::new(StateStore::open(get_state_dir())?);
    let downloads =
        DownloadScheduler::new(api.clone(), queue, notifier.clone(), settings.downloads.clone());

    if !wait_awake(api.as_ref(), STARTUP_WAIT, STARTUP_ATTEMPTS).await {
        warn!("AnkiConnect is not reachable yet; pending downloads will retry on their own");
    }
    match downloads.on_process_restart() {
        Ok(0) => {}
        Ok(pending) => info!("Resuming {} pending download chunks", pending),
        Err(e) => error!("Failed to read pending downloads: {}", e),
    }

    let websocket_addr = settings.websocket_addr.clone();
    let sync = SyncService::new(api, downloads, notifier, settings);
    let server = WebSocketServer::new(hub, sync);
    let listener = WebSocketServer::bind(&websocket_addr).await?;

    tokio::select! {
        result = server.run(listener) => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }

    Ok(())
}
