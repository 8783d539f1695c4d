/*
[INPUT]:  FlowEvents from the wallet connector, the user and completed async steps
[OUTPUT]: FlowState transitions, spawned signing/session/widget tasks, completion callbacks
[POS]:    Flow layer - the single owner of FlowState for one user session
[UPDATE]: When transitions, stale-result handling or callbacks change
*/

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::{ChallengeBuilder, SignatureRequester, SignatureSlot, WalletSigner};
use crate::context::HandoffContext;
use crate::flow::{FlowEvent, FlowState};
use crate::http::{KycError, Result, SessionInitiator, SessionRequest};
use crate::types::{
    SiweChallenge, SignedChallenge, VerificationLevel, VerificationSession, WalletIdentity,
};
use crate::widget::{InitOutcome, WidgetEvent, WidgetEventBridge, WidgetRuntime};

type CompleteCallback = Box<dyn Fn(&VerificationSession) + Send + Sync>;
type FailureCallback = Box<dyn Fn(&str) + Send + Sync>;

const DEFAULT_FAILURE_REASON: &str = "Verification failed";

/// Everything belonging to one verification attempt
struct Attempt {
    id: u64,
    level: VerificationLevel,
    cancel: CancellationToken,
    /// Held while the wallet prompt is open; released with the attempt
    signing: Option<SignatureSlot>,
    challenge: Option<SiweChallenge>,
    signed: Option<SignedChallenge>,
    session: Option<VerificationSession>,
}

impl Drop for Attempt {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Cloneable sender for feeding user actions and wallet notifications
#[derive(Clone)]
pub struct FlowHandle {
    tx: mpsc::UnboundedSender<FlowEvent>,
}

impl FlowHandle {
    pub fn send(&self, event: FlowEvent) -> Result<()> {
        self.tx
            .send(event)
            .map_err(|_| KycError::Config("flow controller has stopped".to_string()))
    }

    pub fn connect(&self, wallet: Arc<dyn WalletSigner>) -> Result<()> {
        self.send(FlowEvent::WalletConnected(wallet))
    }

    pub fn disconnect(&self) -> Result<()> {
        self.send(FlowEvent::WalletDisconnected)
    }

    pub fn start(&self, level: VerificationLevel) -> Result<()> {
        self.send(FlowEvent::StartRequested(level))
    }

    pub fn cancel(&self) -> Result<()> {
        self.send(FlowEvent::CancelRequested)
    }

    pub fn restart(&self) -> Result<()> {
        self.send(FlowEvent::RestartRequested)
    }
}

impl std::fmt::Debug for FlowHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowHandle")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

/// Verification flow state machine.
///
/// Owns `FlowState` exclusively. Every mutation happens in [`FlowController::handle`],
/// one event at a time; async steps run as tasks that report back through the
/// controller's own event queue, tagged with the attempt they belong to so
/// results from abandoned attempts are dropped.
pub struct FlowController {
    builder: ChallengeBuilder,
    statement: String,
    verify_signatures: bool,
    requester: SignatureRequester,
    initiator: Arc<dyn SessionInitiator>,
    bridge: WidgetEventBridge,
    wallet: Option<Arc<dyn WalletSigner>>,
    identity: Option<WalletIdentity>,
    state: FlowState,
    state_tx: watch::Sender<FlowState>,
    events_tx: mpsc::UnboundedSender<FlowEvent>,
    events_rx: mpsc::UnboundedReceiver<FlowEvent>,
    next_attempt: u64,
    current: Option<Attempt>,
    consumed_nonces: HashSet<String>,
    last_error: Option<String>,
    on_complete: Vec<CompleteCallback>,
    on_failure: Vec<FailureCallback>,
    shutdown: CancellationToken,
}

impl FlowController {
    /// Build a controller from the application context
    pub fn new(
        context: &HandoffContext,
        initiator: Arc<dyn SessionInitiator>,
        runtime: Arc<dyn WidgetRuntime>,
    ) -> Result<Self> {
        let config = context.config();
        Ok(Self::from_parts(
            ChallengeBuilder::from_config(config)?,
            config.statement.clone(),
            initiator,
            WidgetEventBridge::new(runtime, &config.widget),
            config.verify_signatures,
            context.shutdown_token().child_token(),
        ))
    }

    pub fn from_parts(
        builder: ChallengeBuilder,
        statement: String,
        initiator: Arc<dyn SessionInitiator>,
        bridge: WidgetEventBridge,
        verify_signatures: bool,
        shutdown: CancellationToken,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(FlowState::Disconnected);
        Self {
            builder,
            statement,
            verify_signatures,
            requester: SignatureRequester::new(),
            initiator,
            bridge,
            wallet: None,
            identity: None,
            state: FlowState::Disconnected,
            state_tx,
            events_tx,
            events_rx,
            next_attempt: 0,
            current: None,
            consumed_nonces: HashSet::new(),
            last_error: None,
            on_complete: Vec::new(),
            on_failure: Vec::new(),
            shutdown,
        }
    }

    pub fn handle(&self) -> FlowHandle {
        FlowHandle {
            tx: self.events_tx.clone(),
        }
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    /// Receiver observing every transition
    pub fn subscribe(&self) -> watch::Receiver<FlowState> {
        self.state_tx.subscribe()
    }

    /// Last user-visible error message
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn identity(&self) -> Option<&WalletIdentity> {
        self.identity.as_ref()
    }

    pub fn pending_challenge(&self) -> Option<&SiweChallenge> {
        self.current.as_ref().and_then(|a| a.challenge.as_ref())
    }

    pub fn signed_challenge(&self) -> Option<&SignedChallenge> {
        self.current.as_ref().and_then(|a| a.signed.as_ref())
    }

    pub fn session(&self) -> Option<&VerificationSession> {
        self.current.as_ref().and_then(|a| a.session.as_ref())
    }

    pub fn current_level(&self) -> Option<VerificationLevel> {
        self.current.as_ref().map(|a| a.level)
    }

    /// Whether an attempt (and its data) is held
    pub fn has_attempt(&self) -> bool {
        self.current.is_some()
    }

    pub fn is_nonce_consumed(&self, nonce: &str) -> bool {
        self.consumed_nonces.contains(nonce)
    }

    pub fn widget_listener_registered(&self) -> bool {
        self.bridge.is_registered()
    }

    pub fn on_complete<F>(&mut self, callback: F)
    where
        F: Fn(&VerificationSession) + Send + Sync + 'static,
    {
        self.on_complete.push(Box::new(callback));
    }

    pub fn on_failure<F>(&mut self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_failure.push(Box::new(callback));
    }

    /// Process events until shutdown or every handle is dropped
    pub async fn run(mut self) {
        loop {
            let event = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                event = self.events_rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            if let Err(err) = self.handle_event(event) {
                warn!(error = %err, state = %self.state, "flow event rejected");
            }
        }
        self.teardown();
        info!("flow controller stopped");
    }

    /// Wait for the next internally produced event and process it
    pub async fn step(&mut self) -> Option<Result<()>> {
        let event = self.events_rx.recv().await?;
        Some(self.handle_event(event))
    }

    /// Apply one event. Errors describe why an action was refused; the
    /// state is left consistent either way.
    pub fn handle_event(&mut self, event: FlowEvent) -> Result<()> {
        debug!(event = ?event, state = %self.state, "flow event");
        match event {
            FlowEvent::WalletConnected(wallet) => self.on_wallet_connected(wallet),
            FlowEvent::WalletDisconnected => {
                self.on_wallet_disconnected();
                Ok(())
            }
            FlowEvent::StartRequested(level) => self.start(level),
            FlowEvent::CancelRequested => {
                self.cancel_signing();
                Ok(())
            }
            FlowEvent::RestartRequested => self.restart(),
            FlowEvent::SignatureResolved { attempt, result } => {
                self.on_signature(attempt, result);
                Ok(())
            }
            FlowEvent::SessionResolved { attempt, result } => {
                self.on_session(attempt, result);
                Ok(())
            }
            FlowEvent::WidgetInitialized { attempt, result } => {
                self.on_widget_initialized(attempt, result);
                Ok(())
            }
            FlowEvent::Widget { attempt, event } => {
                self.on_widget_event(attempt, event);
                Ok(())
            }
        }
    }

    fn on_wallet_connected(&mut self, wallet: Arc<dyn WalletSigner>) -> Result<()> {
        let identity = WalletIdentity::new(wallet.address(), wallet.chain_id())?;
        let changed = self.identity.as_ref() != Some(&identity);
        if changed {
            // different account or chain: whatever was in flight is void
            self.discard_attempt();
        }
        info!(address = %identity.address, chain_id = identity.chain_id, "wallet connected");
        self.wallet = Some(wallet);
        self.identity = Some(identity);
        if changed || self.state == FlowState::Disconnected {
            self.last_error = None;
            self.transition(FlowState::ReadyToStart);
        }
        Ok(())
    }

    fn on_wallet_disconnected(&mut self) {
        if let Some(identity) = &self.identity {
            info!(address = %identity.address, "wallet disconnected");
        }
        self.discard_attempt();
        self.wallet = None;
        self.identity = None;
        self.last_error = None;
        self.transition(FlowState::Disconnected);
    }

    fn start(&mut self, level: VerificationLevel) -> Result<()> {
        match &self.state {
            FlowState::ReadyToStart => {}
            FlowState::Disconnected => return Err(KycError::NotConnected),
            other => {
                return Err(KycError::FlowBusy {
                    state: other.name().to_string(),
                });
            }
        }

        let (wallet, identity) = match (&self.wallet, &self.identity) {
            (Some(wallet), Some(identity)) => (wallet.clone(), identity.clone()),
            _ => return Err(KycError::NotConnected),
        };

        if identity.chain_id != self.builder.chain_id() {
            let err = KycError::InvalidInput(format!(
                "wallet is connected to chain {}, expected chain {}",
                identity.chain_id,
                self.builder.chain_id()
            ));
            self.last_error = Some(err.user_message());
            return Err(err);
        }

        let challenge = match self.builder.build(&identity.address, &self.statement) {
            Ok(challenge) if !self.consumed_nonces.contains(challenge.nonce()) => challenge,
            Ok(_) => {
                let err = KycError::InvalidInput("nonce collision".to_string());
                self.last_error = Some(err.user_message());
                return Err(err);
            }
            Err(err) => {
                self.last_error = Some(err.user_message());
                return Err(err);
            }
        };

        let slot = match self.requester.reserve() {
            Ok(slot) => slot,
            Err(err) => {
                self.last_error = Some(err.user_message());
                return Err(err);
            }
        };

        self.next_attempt += 1;
        let attempt = Attempt {
            id: self.next_attempt,
            level,
            cancel: self.shutdown.child_token(),
            signing: Some(slot),
            challenge: Some(challenge.clone()),
            signed: None,
            session: None,
        };
        info!(
            attempt = attempt.id,
            address = %identity.address,
            level = level.as_u8(),
            "verification started"
        );

        let tx = self.events_tx.clone();
        let requester = self.requester.clone();
        let cancel = attempt.cancel.clone();
        let id = attempt.id;
        tokio::spawn(async move {
            let result = tokio::select! {
                // dropping the request future withdraws it from the wallet
                _ = cancel.cancelled() => return,
                result = requester.request_reserved(Some(wallet.as_ref()), challenge) => result,
            };
            let _ = tx.send(FlowEvent::SignatureResolved { attempt: id, result });
        });

        self.current = Some(attempt);
        self.last_error = None;
        self.transition(FlowState::AwaitingSignature);
        Ok(())
    }

    fn cancel_signing(&mut self) {
        if self.state != FlowState::AwaitingSignature {
            debug!(state = %self.state, "no signing prompt to cancel");
            return;
        }
        info!("signing cancelled by user");
        self.discard_attempt();
        self.transition(FlowState::ReadyToStart);
    }

    fn restart(&mut self) -> Result<()> {
        match &self.state {
            FlowState::Completed | FlowState::Failed(_) | FlowState::ReadyToStart => {
                self.discard_attempt();
                self.last_error = None;
                self.transition(FlowState::ReadyToStart);
                Ok(())
            }
            FlowState::Disconnected => Err(KycError::NotConnected),
            other => Err(KycError::FlowBusy {
                state: other.name().to_string(),
            }),
        }
    }

    fn on_signature(&mut self, attempt: u64, result: Result<SignedChallenge>) {
        if !self.is_current(attempt, &FlowState::AwaitingSignature) {
            debug!(attempt, "discarding stale signature result");
            return;
        }

        let signed = match result.and_then(|signed| self.check_signed(signed)) {
            Ok(signed) => signed,
            Err(err) => {
                warn!(attempt, error = %err, "signature step failed");
                self.reset_with_error(&err);
                return;
            }
        };

        self.consumed_nonces.insert(signed.nonce().to_string());

        let Some(current) = self.current.as_mut() else {
            return;
        };
        current.signing = None;
        current.challenge = None;
        current.signed = Some(signed.clone());
        let request = SessionRequest::signed(signed, current.level);

        let tx = self.events_tx.clone();
        let initiator = self.initiator.clone();
        tokio::spawn(async move {
            // runs to completion; a result for an abandoned attempt is dropped on arrival
            let result = initiator.initiate(request).await;
            let _ = tx.send(FlowEvent::SessionResolved { attempt, result });
        });

        self.transition(FlowState::RequestingSession);
    }

    fn check_signed(&self, signed: SignedChallenge) -> Result<SignedChallenge> {
        if self.consumed_nonces.contains(signed.nonce()) {
            return Err(KycError::SignatureDenied(
                "challenge nonce was already used".to_string(),
            ));
        }
        let expected = self.current.as_ref().and_then(|a| a.challenge.as_ref());
        if expected.map(|c| c.nonce()) != Some(signed.nonce()) {
            return Err(KycError::SignatureDenied(
                "signature does not answer the pending challenge".to_string(),
            ));
        }
        if self.verify_signatures {
            signed.verify()?;
        }
        Ok(signed)
    }

    fn on_session(&mut self, attempt: u64, result: Result<VerificationSession>) {
        if !self.is_current(attempt, &FlowState::RequestingSession) {
            debug!(attempt, "discarding stale session result");
            return;
        }

        let session = match result {
            Ok(session) => session,
            Err(err) => {
                warn!(attempt, error = %err, "session request failed");
                self.reset_with_error(&err);
                return;
            }
        };

        let tx = self.events_tx.clone();
        self.bridge.register(move |event| {
            let _ = tx.send(FlowEvent::Widget { attempt, event });
        });

        let initializer = self.bridge.initializer(&session);
        let Some(current) = self.current.as_mut() else {
            return;
        };
        current.signed = None;
        current.session = Some(session);

        let tx = self.events_tx.clone();
        let cancel = current.cancel.clone();
        tokio::spawn(async move {
            let result = initializer.run(cancel).await;
            let _ = tx.send(FlowEvent::WidgetInitialized { attempt, result });
        });

        self.transition(FlowState::Verifying);
    }

    fn on_widget_initialized(&mut self, attempt: u64, result: Result<InitOutcome>) {
        if !self.is_current(attempt, &FlowState::Verifying) {
            debug!(attempt, "discarding stale widget initialization");
            return;
        }
        match result {
            Ok(InitOutcome::Initialized { attempts }) => {
                debug!(attempt, attempts, "widget ready");
            }
            Ok(InitOutcome::Abandoned) => {}
            Err(err) => self.fail(err.user_message()),
        }
    }

    fn on_widget_event(&mut self, attempt: u64, event: WidgetEvent) {
        if !self.is_current(attempt, &FlowState::Verifying) {
            debug!(attempt, event = ?event, "discarding widget event for inactive session");
            return;
        }
        match event {
            WidgetEvent::Complete => self.complete(),
            WidgetEvent::Error { message } => {
                self.fail(message.unwrap_or_else(|| DEFAULT_FAILURE_REASON.to_string()))
            }
            WidgetEvent::Unknown { kind } => {
                info!(kind = %kind, "ignoring unrecognized widget event");
            }
        }
    }

    fn complete(&mut self) {
        self.bridge.unregister();
        let session = self.current.take().and_then(|mut a| a.session.take());
        self.transition(FlowState::Completed);
        if let Some(session) = session {
            info!(address = %session.wallet_address, level = session.level.as_u8(), "verification completed");
            for callback in &self.on_complete {
                callback(&session);
            }
        }
    }

    fn fail(&mut self, reason: String) {
        warn!(reason = %reason, "verification failed");
        self.discard_attempt();
        self.last_error = Some(reason.clone());
        self.transition(FlowState::Failed(reason.clone()));
        for callback in &self.on_failure {
            callback(&reason);
        }
    }

    fn reset_with_error(&mut self, err: &KycError) {
        self.discard_attempt();
        self.last_error = Some(err.user_message());
        self.transition(FlowState::ReadyToStart);
    }

    fn is_current(&self, attempt: u64, state: &FlowState) -> bool {
        &self.state == state && self.current.as_ref().is_some_and(|a| a.id == attempt)
    }

    /// Drop the in-flight attempt: cancels its tasks and clears its data
    fn discard_attempt(&mut self) {
        self.bridge.unregister();
        if let Some(attempt) = self.current.take() {
            debug!(attempt = attempt.id, "attempt discarded");
        }
    }

    fn transition(&mut self, next: FlowState) {
        if self.state != next {
            info!(from = %self.state, to = %next, "flow transition");
        }
        self.state = next.clone();
        self.state_tx.send_replace(next);
    }

    fn teardown(&mut self) {
        self.discard_attempt();
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for FlowController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowController")
            .field("state", &self.state)
            .field("identity", &self.identity)
            .field("attempt", &self.current.as_ref().map(|a| a.id))
            .field("last_error", &self.last_error)
            .finish()
    }
}
