/*
[INPUT]:  CLI arguments, YAML configuration file, wallet key from the environment, OS shutdown signals
[OUTPUT]: One verification run; widget payload on stdout; exit status from the outcome
[POS]:    Binary entry point
[UPDATE]: When changing CLI flags, startup flow, or shutdown handling
*/

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use kyc_handoff_adapter::{EvmWalletSigner, HandoffContext, SessionInitiator, VerificationLevel};
use kyc_handoff_runner::{Outcome, TerminalWidgetRuntime, drive, load_config};

#[derive(Parser, Debug)]
#[command(name = "kyc-handoff-runner", version, about = "Wallet sign-in to KYC verification runner")]
struct Cli {
    #[arg(long = "config", value_name = "PATH")]
    config_path: PathBuf,
    /// Verification level 1-3; defaults to the configured level
    #[arg(long = "level", value_name = "N", value_parser = clap::value_parser!(u8).range(1..=3))]
    level: Option<u8>,
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    log_level: String,
    /// Environment variable holding the wallet's hex private key
    #[arg(long = "private-key-env", value_name = "VAR", default_value = "KYC_HANDOFF_PRIVATE_KEY")]
    private_key_env: String,
    /// Talk to the vendor directly instead of the backend proxy
    #[arg(long = "direct")]
    direct: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Cli::parse();
    init_tracing(&args.log_level)?;

    info!(
        config_path = %args.config_path.display(),
        direct = args.direct,
        "starting kyc-handoff-runner"
    );

    let config = load_config(Some(&args.config_path)).context("load config")?;
    let level = match args.level {
        Some(level) => VerificationLevel::try_from(level).context("parse --level")?,
        None => config.default_level,
    };
    let container_id = config.widget.container_id.clone();

    let context = HandoffContext::new(config).context("build handoff context")?;
    setup_signal_handlers(context.shutdown_token());

    let private_key = std::env::var(&args.private_key_env)
        .with_context(|| format!("read wallet key from {}", args.private_key_env))?;
    let wallet = EvmWalletSigner::new(&private_key, context.config().chain_id)
        .context("load wallet key")?;

    let initiator: Arc<dyn SessionInitiator> = if args.direct {
        Arc::new(context.vendor_initiator().context("build vendor initiator")?)
    } else {
        Arc::new(context.proxy_initiator().context("build proxy initiator")?)
    };

    let runtime = Arc::new(TerminalWidgetRuntime::new(std::io::stdout()));
    let controller = context
        .flow_controller(initiator, runtime.clone())
        .context("build flow controller")?;

    let outcome = drive(
        controller,
        runtime,
        &container_id,
        Arc::new(wallet),
        level,
        BufReader::new(tokio::io::stdin()),
        context.shutdown_token(),
    )
    .await?;

    context.shutdown();
    match &outcome {
        Outcome::Completed => info!(level = level.as_u8(), "verification completed"),
        Outcome::Failed(reason) => warn!(reason = %reason, "verification failed"),
        Outcome::Aborted(reason) => warn!(reason = %reason, "verification aborted"),
        Outcome::Interrupted => info!("shutdown complete"),
    }
    Ok(outcome.exit_code())
}

fn init_tracing(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(log_level).context("invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow!(err))
        .context("initialize tracing subscriber")?;
    Ok(())
}

fn setup_signal_handlers(shutdown: CancellationToken) {
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install SIGINT handler");
            return;
        }
        info!("received SIGINT");
        shutdown_clone.cancel();
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let shutdown_clone = shutdown.clone();
        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                    info!("received SIGTERM");
                    shutdown_clone.cancel();
                }
                Err(err) => {
                    warn!(error = %err, "failed to install SIGTERM handler");
                }
            }
        });
    }
}
