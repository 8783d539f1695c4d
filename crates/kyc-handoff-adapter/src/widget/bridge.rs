/*
[INPUT]:  Active VerificationSession, widget runtime, cancellation token of the Verifying state
[OUTPUT]: Parsed widget events delivered to one callback; widget initialization status
[POS]:    Widget layer - single listener per session plus bounded readiness polling
[UPDATE]: When event dispatch or the initialization retry policy changes
*/

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::WidgetConfig;
use crate::http::{KycError, Result};
use crate::types::VerificationSession;
use crate::widget::{
    InitStatus, ListenerId, RawWidgetEvent, WidgetEvent, WidgetInitOptions, WidgetListener,
    WidgetRuntime,
};

/// How an initialization run ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    Initialized { attempts: u32 },
    /// The owning state ended first
    Abandoned,
}

/// Connects one widget container to the flow
pub struct WidgetEventBridge {
    runtime: Arc<dyn WidgetRuntime>,
    container_id: String,
    retry_delay: Duration,
    max_attempts: u32,
    active: Option<ListenerId>,
}

impl WidgetEventBridge {
    pub fn new(runtime: Arc<dyn WidgetRuntime>, config: &WidgetConfig) -> Self {
        Self {
            runtime,
            container_id: config.container_id.clone(),
            retry_delay: config.init_retry_delay(),
            max_attempts: config.init_max_attempts.max(1),
            active: None,
        }
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    pub fn is_registered(&self) -> bool {
        self.active.is_some()
    }

    /// Register the single listener, replacing any previous one
    pub fn register<F>(&mut self, on_event: F)
    where
        F: Fn(WidgetEvent) + Send + Sync + 'static,
    {
        self.unregister();

        let container_id = self.container_id.clone();
        let listener: WidgetListener = Arc::new(move |raw: RawWidgetEvent| {
            match WidgetEvent::from(raw) {
                WidgetEvent::Unknown { kind } => {
                    info!(container = %container_id, kind = %kind, "widget event kind unrecognized");
                }
                event => on_event(event),
            }
        });

        let id = self.runtime.add_listener(&self.container_id, listener);
        debug!(container = %self.container_id, "widget listener registered");
        self.active = Some(id);
    }

    pub fn unregister(&mut self) {
        if let Some(id) = self.active.take() {
            self.runtime.remove_listener(id);
            debug!(container = %self.container_id, "widget listener removed");
        }
    }

    /// Build the readiness poller for `session`
    pub fn initializer(&self, session: &VerificationSession) -> WidgetInitializer {
        WidgetInitializer {
            runtime: self.runtime.clone(),
            options: WidgetInitOptions {
                container_id: self.container_id.clone(),
                data: session.widget_payload.clone(),
            },
            retry_delay: self.retry_delay,
            max_attempts: self.max_attempts,
        }
    }
}

impl Drop for WidgetEventBridge {
    fn drop(&mut self) {
        self.unregister();
    }
}

impl std::fmt::Debug for WidgetEventBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WidgetEventBridge")
            .field("container_id", &self.container_id)
            .field("retry_delay", &self.retry_delay)
            .field("max_attempts", &self.max_attempts)
            .field("registered", &self.active.is_some())
            .finish()
    }
}

/// Cancelable fixed-delay retry around the widget entry point
pub struct WidgetInitializer {
    runtime: Arc<dyn WidgetRuntime>,
    options: WidgetInitOptions,
    retry_delay: Duration,
    max_attempts: u32,
}

impl WidgetInitializer {
    pub async fn run(self, cancel: CancellationToken) -> Result<InitOutcome> {
        for attempt in 1..=self.max_attempts {
            if cancel.is_cancelled() {
                return Ok(InitOutcome::Abandoned);
            }

            match self.runtime.initialize(&self.options)? {
                InitStatus::Ready => {
                    info!(
                        container = %self.options.container_id,
                        attempts = attempt,
                        "widget initialized"
                    );
                    return Ok(InitOutcome::Initialized { attempts: attempt });
                }
                InitStatus::NotReady => {
                    debug!(attempt, "widget runtime not ready, retrying");
                }
            }

            if attempt < self.max_attempts {
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(InitOutcome::Abandoned),
                    _ = tokio::time::sleep(self.retry_delay) => {}
                }
            }
        }

        warn!(
            container = %self.options.container_id,
            attempts = self.max_attempts,
            "widget runtime never became ready"
        );
        Err(KycError::WidgetInit(format!(
            "widget runtime not ready after {} attempts",
            self.max_attempts
        )))
    }
}
