use log::{error, info, warn};

use tg_doc_store::logging::init_logging;
use tg_doc_store::store::DEFAULT_SESSION_KEY;
use tg_doc_store::{AppConfig, DocClientStore, Storages, TelegramConfig, UpdateStateStore};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let dotenv = dotenvy::dotenv();
    if let Err(err) = init_logging() {
        eprintln!("failed to initialise logging: {err}");
    }
    if dotenv.is_err() {
        warn!(".env file not found");
    }

    if let Err(err) = run().await {
        error!("{err:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    let storages = Storages::open(&config.storage)?;
    let store = DocClientStore::new(&storages, DEFAULT_SESSION_KEY);

    let state = store.get_state().await?;
    info!(
        "update state pts={} qts={} date={} seq={}",
        state.pts, state.qts, state.date, state.seq
    );

    run_client(&config.telegram, &store).await
}

#[cfg(feature = "telegram")]
async fn run_client(config: &TelegramConfig, store: &DocClientStore) -> anyhow::Result<()> {
    tg_doc_store::telegram::run_member_export(config, store).await
}

#[cfg(not(feature = "telegram"))]
async fn run_client(_config: &TelegramConfig, _store: &DocClientStore) -> anyhow::Result<()> {
    anyhow::bail!("built without the `telegram` feature, rebuild with `--features telegram` to export members")
}
