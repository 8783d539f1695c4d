/*
[INPUT]:  Widget init options from the flow, JSON-line widget events from a reader
[OUTPUT]: Widget payload written as one JSON line; events delivered to listeners
[POS]:    Runner widget runtime - headless stand-in for the embedded widget
[UPDATE]: When the payload line format or event input format changes
*/

use std::io::Write;
use std::sync::{Arc, Mutex};

use kyc_handoff_adapter::widget::{
    InMemoryWidgetRuntime, InitStatus, ListenerId, WidgetInitOptions, WidgetListener,
};
use kyc_handoff_adapter::{KycError, RawWidgetEvent, Result, WidgetRuntime};
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Serialize)]
struct PayloadLine<'a> {
    container_id: &'a str,
    widget_data: &'a serde_json::Value,
}

/// Prints the widget payload and relays externally supplied events
pub struct TerminalWidgetRuntime<W> {
    inner: InMemoryWidgetRuntime,
    out: Arc<Mutex<W>>,
}

impl<W> Clone for TerminalWidgetRuntime<W> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            out: self.out.clone(),
        }
    }
}

impl<W: Write + Send> TerminalWidgetRuntime<W> {
    pub fn new(out: W) -> Self {
        Self {
            inner: InMemoryWidgetRuntime::new(),
            out: Arc::new(Mutex::new(out)),
        }
    }

    /// Parse one input line and deliver it to `container_id`.
    ///
    /// Returns the number of listeners reached; blank lines reach none.
    pub fn feed_line(&self, container_id: &str, line: &str) -> usize {
        let line = line.trim();
        if line.is_empty() {
            return 0;
        }
        match serde_json::from_str::<RawWidgetEvent>(line) {
            Ok(event) => {
                debug!(kind = %event.kind, "widget event from input");
                self.inner.emit(container_id, event)
            }
            Err(err) => {
                warn!(error = %err, "ignoring malformed widget event line");
                0
            }
        }
    }

    /// The payload has been handed out, so the widget can produce events
    pub fn is_displayed(&self) -> bool {
        !self.inner.initialized().is_empty()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listener_count()
    }

    /// Run `f` against the output sink
    pub fn with_output<T>(&self, f: impl FnOnce(&W) -> T) -> Option<T> {
        self.out.lock().ok().map(|guard| f(&guard))
    }
}

impl<W: Write + Send> WidgetRuntime for TerminalWidgetRuntime<W> {
    fn initialize(&self, options: &WidgetInitOptions) -> Result<InitStatus> {
        let status = self.inner.initialize(options)?;
        if status == InitStatus::Ready {
            let line = serde_json::to_string(&PayloadLine {
                container_id: &options.container_id,
                widget_data: &options.data,
            })?;
            let mut out = self
                .out
                .lock()
                .map_err(|_| KycError::WidgetInit("output sink poisoned".to_string()))?;
            writeln!(out, "{line}")
                .and_then(|_| out.flush())
                .map_err(|e| KycError::WidgetInit(format!("write widget payload: {e}")))?;
        }
        Ok(status)
    }

    fn add_listener(&self, container_id: &str, listener: WidgetListener) -> ListenerId {
        self.inner.add_listener(container_id, listener)
    }

    fn remove_listener(&self, id: ListenerId) {
        self.inner.remove_listener(id)
    }
}
