/*
[INPUT]:  Collaborator callbacks (wallet, signature, session, widget) and user actions
[OUTPUT]: FlowState values and the FlowEvent vocabulary driving transitions
[POS]:    Flow layer - state machine vocabulary
[UPDATE]: When adding states or events
*/

use std::fmt;
use std::sync::Arc;

use crate::auth::WalletSigner;
use crate::http::Result;
use crate::types::{SignedChallenge, VerificationLevel, VerificationSession};
use crate::widget::{InitOutcome, WidgetEvent};

/// Client-visible verification state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowState {
    Disconnected,
    ReadyToStart,
    AwaitingSignature,
    RequestingSession,
    Verifying,
    Completed,
    Failed(String),
}

impl FlowState {
    /// An asynchronous step is outstanding
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            FlowState::AwaitingSignature | FlowState::RequestingSession | FlowState::Verifying
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowState::Completed | FlowState::Failed(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            FlowState::Disconnected => "disconnected",
            FlowState::ReadyToStart => "ready_to_start",
            FlowState::AwaitingSignature => "awaiting_signature",
            FlowState::RequestingSession => "requesting_session",
            FlowState::Verifying => "verifying",
            FlowState::Completed => "completed",
            FlowState::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowState::Failed(reason) => write!(f, "failed: {reason}"),
            other => f.write_str(other.name()),
        }
    }
}

/// Input to the flow controller, in delivery order
pub enum FlowEvent {
    WalletConnected(Arc<dyn WalletSigner>),
    WalletDisconnected,
    StartRequested(VerificationLevel),
    /// User dismissed the signing prompt
    CancelRequested,
    RestartRequested,
    SignatureResolved {
        attempt: u64,
        result: Result<SignedChallenge>,
    },
    SessionResolved {
        attempt: u64,
        result: Result<VerificationSession>,
    },
    WidgetInitialized {
        attempt: u64,
        result: Result<InitOutcome>,
    },
    Widget {
        attempt: u64,
        event: WidgetEvent,
    },
}

impl FlowEvent {
    pub fn name(&self) -> &'static str {
        match self {
            FlowEvent::WalletConnected(_) => "wallet_connected",
            FlowEvent::WalletDisconnected => "wallet_disconnected",
            FlowEvent::StartRequested(_) => "start_requested",
            FlowEvent::CancelRequested => "cancel_requested",
            FlowEvent::RestartRequested => "restart_requested",
            FlowEvent::SignatureResolved { .. } => "signature_resolved",
            FlowEvent::SessionResolved { .. } => "session_resolved",
            FlowEvent::WidgetInitialized { .. } => "widget_initialized",
            FlowEvent::Widget { .. } => "widget_event",
        }
    }
}

impl fmt::Debug for FlowEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowEvent::WalletConnected(wallet) => f
                .debug_struct("WalletConnected")
                .field("address", &wallet.address())
                .field("chain_id", &wallet.chain_id())
                .finish(),
            FlowEvent::StartRequested(level) => {
                f.debug_tuple("StartRequested").field(level).finish()
            }
            FlowEvent::SignatureResolved { attempt, result } => f
                .debug_struct("SignatureResolved")
                .field("attempt", attempt)
                .field("ok", &result.is_ok())
                .finish(),
            FlowEvent::SessionResolved { attempt, result } => f
                .debug_struct("SessionResolved")
                .field("attempt", attempt)
                .field("ok", &result.is_ok())
                .finish(),
            FlowEvent::WidgetInitialized { attempt, result } => f
                .debug_struct("WidgetInitialized")
                .field("attempt", attempt)
                .field("result", result)
                .finish(),
            FlowEvent::Widget { attempt, event } => f
                .debug_struct("Widget")
                .field("attempt", attempt)
                .field("event", event)
                .finish(),
            other => f.write_str(other.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_progress_states() {
        let in_progress: Vec<FlowState> = [
            FlowState::Disconnected,
            FlowState::ReadyToStart,
            FlowState::AwaitingSignature,
            FlowState::RequestingSession,
            FlowState::Verifying,
            FlowState::Completed,
            FlowState::Failed("x".to_string()),
        ]
        .into_iter()
        .filter(FlowState::is_in_progress)
        .collect();

        assert_eq!(
            in_progress,
            vec![
                FlowState::AwaitingSignature,
                FlowState::RequestingSession,
                FlowState::Verifying
            ]
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(FlowState::Verifying.to_string(), "verifying");
        assert_eq!(
            FlowState::Failed("document expired".to_string()).to_string(),
            "failed: document expired"
        );
    }
}
