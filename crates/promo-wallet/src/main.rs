//! promo-wallet: background signing host. Speaks line-delimited JSON over stdin/stdout.

use std::sync::Arc;

use eyre::WrapErr;
use promo_wallet_adapters::{
    DevChain, Eip1193Signer, HeadlessSurface, JsonRpcChain, RpcTransport, RuntimeProfile,
    WalletConfig,
};
use promo_wallet_core::domain::ScreenBounds;
use promo_wallet_core::{
    BackgroundActor, BackgroundHandle, ChainReader, ForegroundClient, SubmissionEngine,
    TransactionSigner,
};
use tokio::io::BufReader;
use tokio::sync::mpsc;

mod bridge;
mod surface;

use bridge::Bridge;

const DEV_ACCOUNT: &str = "0x00000000000000000000000000000000000d0e01";

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // Initialize logging; stdout carries the protocol.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!(
        git_hash = env!("GIT_HASH"),
        build_time = env!("BUILD_TIME"),
        "Starting promo-wallet"
    );

    let config = WalletConfig::from_env();
    config.validate().wrap_err("invalid configuration")?;

    let (out, out_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(bridge::write_messages(out_rx, tokio::io::stdout()));
    let surface = surface::relayed_surface(
        ScreenBounds {
            width: 1920,
            height: 1080,
        },
        out.clone(),
    );

    let (handle, dev_chain) = match config.runtime_profile {
        RuntimeProfile::Development if config.signer_proxy_url.is_none() => {
            let account = DEV_ACCOUNT.parse().wrap_err("dev account")?;
            let chain = Arc::new(DevChain::new(account));
            tracing::warn!(%account, "no signer proxy configured, using in-memory dev chain");
            let handle = spawn_actor(&config, Arc::clone(&chain), Arc::clone(&chain), &surface);
            (handle, Some(chain))
        }
        _ => {
            let signer = Eip1193Signer::connect(&config)
                .await
                .wrap_err("connect signer")?;
            let rpc_url = config
                .rpc_url
                .clone()
                .or_else(|| config.signer_proxy_url.clone())
                .ok_or_else(|| eyre::eyre!("no rpc url configured"))?;
            let chain = JsonRpcChain::new(RpcTransport::new(rpc_url, config.request_timeout())?);
            let handle = spawn_actor(&config, Arc::new(signer), Arc::new(chain), &surface);
            (handle, None)
        }
    };

    let client = ForegroundClient::with_timeout(handle, config.approval_timeout());
    let bridge = Bridge::new(client, surface, dev_chain, out);
    bridge
        .serve(BufReader::new(tokio::io::stdin()))
        .await
        .wrap_err("host bridge")?;

    drop(bridge);
    writer.abort();
    tracing::info!("promo-wallet stopped");
    Ok(())
}

fn spawn_actor<S, C>(
    config: &WalletConfig,
    signer: Arc<S>,
    chain: Arc<C>,
    surface: &HeadlessSurface,
) -> BackgroundHandle
where
    S: TransactionSigner + 'static,
    C: ChainReader + 'static,
{
    let engine = Arc::new(SubmissionEngine::new(signer, chain, config.engine_config()));
    let actor = BackgroundActor::new(engine, Arc::new(surface.clone()), config.actor_config());
    let (handle, _task) = actor.spawn();
    handle
}
