/*
[INPUT]:  FlowController, connected wallet, requested level, widget event lines
[OUTPUT]: Terminal outcome of one verification attempt
[POS]:    Runner orchestration - drives the flow until it settles or is interrupted
[UPDATE]: When outcome mapping or input handling changes
*/

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use kyc_handoff_adapter::{
    FlowController, FlowEvent, FlowState, VerificationLevel, WalletSigner,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::terminal::TerminalWidgetRuntime;

const ATTEMPT_ENDED: &str = "verification attempt ended";

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    /// The widget reported a verification error
    Failed(String),
    /// The attempt ended before the widget was reached (signature or backend failure)
    Aborted(String),
    Interrupted,
}

impl Outcome {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Outcome::Completed => ExitCode::SUCCESS,
            Outcome::Failed(_) | Outcome::Aborted(_) => ExitCode::FAILURE,
            Outcome::Interrupted => ExitCode::from(130),
        }
    }
}

/// Run one verification for `wallet` at `level`.
///
/// Widget events are read from `input` only while the widget is on screen.
pub async fn drive<W, R>(
    mut controller: FlowController,
    runtime: Arc<TerminalWidgetRuntime<W>>,
    container_id: &str,
    wallet: Arc<dyn WalletSigner>,
    level: VerificationLevel,
    input: R,
    shutdown: CancellationToken,
) -> Result<Outcome>
where
    W: Write + Send + 'static,
    R: AsyncBufRead + Unpin,
{
    controller
        .handle_event(FlowEvent::WalletConnected(wallet))
        .context("connect wallet")?;
    controller
        .handle_event(FlowEvent::StartRequested(level))
        .context("start verification")?;

    let mut lines = input.lines();
    let mut input_open = true;

    loop {
        let accept_input = input_open
            && controller.state() == &FlowState::Verifying
            && runtime.is_displayed();

        tokio::select! {
            _ = shutdown.cancelled() => {
                info!(state = %controller.state(), "interrupted");
                return Ok(Outcome::Interrupted);
            }
            step = controller.step() => {
                if step.is_none() {
                    bail!("flow event channel closed");
                }
            }
            line = lines.next_line(), if accept_input => match line {
                Ok(Some(line)) => {
                    runtime.feed_line(container_id, &line);
                }
                Ok(None) => {
                    info!("widget event input closed, waiting for the widget");
                    input_open = false;
                }
                Err(err) => {
                    warn!(error = %err, "reading widget events failed");
                    input_open = false;
                }
            },
        }

        match controller.state() {
            FlowState::Completed => return Ok(Outcome::Completed),
            FlowState::Failed(reason) => return Ok(Outcome::Failed(reason.clone())),
            FlowState::ReadyToStart => {
                let reason = controller.last_error().unwrap_or(ATTEMPT_ENDED);
                return Ok(Outcome::Aborted(reason.to_string()));
            }
            _ => {}
        }
    }
}
