/*
[INPUT]:  Widget container id, vendor payload, listener callbacks
[OUTPUT]: Initialization status and delivery of widget custom events
[POS]:    Widget layer - boundary to the embedded verification widget
[UPDATE]: When the widget runtime entry points change
*/

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::http::Result;
use crate::widget::RawWidgetEvent;

/// Callback receiving raw widget events
pub type WidgetListener = Arc<dyn Fn(RawWidgetEvent) + Send + Sync>;

/// Handle for removing a registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

/// Arguments to the widget's initialization entry point
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetInitOptions {
    pub container_id: String,
    pub data: serde_json::Value,
}

/// Result of one initialization call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStatus {
    Ready,
    /// Entry point not loaded yet; try again later
    NotReady,
}

/// The embedded widget library
pub trait WidgetRuntime: Send + Sync {
    fn initialize(&self, options: &WidgetInitOptions) -> Result<InitStatus>;

    fn add_listener(&self, container_id: &str, listener: WidgetListener) -> ListenerId;

    fn remove_listener(&self, id: ListenerId);
}

/// Headless runtime keeping listeners in memory
///
/// Events are injected with [`InMemoryWidgetRuntime::emit`].
#[derive(Clone, Default)]
pub struct InMemoryWidgetRuntime {
    listeners: Arc<Mutex<HashMap<ListenerId, (String, WidgetListener)>>>,
    not_ready_for: Arc<AtomicU32>,
    init_calls: Arc<AtomicU32>,
    initialized: Arc<Mutex<Vec<WidgetInitOptions>>>,
}

impl InMemoryWidgetRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `NotReady` for the first `attempts` initialization calls
    pub fn not_ready_for(attempts: u32) -> Self {
        let runtime = Self::default();
        runtime.not_ready_for.store(attempts, Ordering::SeqCst);
        runtime
    }

    /// Deliver an event to every listener on `container_id`
    pub fn emit(&self, container_id: &str, event: RawWidgetEvent) -> usize {
        let targets: Vec<WidgetListener> = match self.listeners.lock() {
            Ok(guard) => guard
                .values()
                .filter(|(container, _)| container == container_id)
                .map(|(_, listener)| listener.clone())
                .collect(),
            Err(_) => return 0,
        };
        for listener in &targets {
            listener(event.clone());
        }
        targets.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn init_calls(&self) -> u32 {
        self.init_calls.load(Ordering::SeqCst)
    }

    /// Payloads the widget was successfully initialized with
    pub fn initialized(&self) -> Vec<WidgetInitOptions> {
        self.initialized
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl fmt::Debug for InMemoryWidgetRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryWidgetRuntime")
            .field("listeners", &self.listener_count())
            .field("init_calls", &self.init_calls())
            .finish()
    }
}

impl WidgetRuntime for InMemoryWidgetRuntime {
    fn initialize(&self, options: &WidgetInitOptions) -> Result<InitStatus> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        let still_loading = self
            .not_ready_for
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if still_loading {
            return Ok(InitStatus::NotReady);
        }
        if let Ok(mut guard) = self.initialized.lock() {
            guard.push(options.clone());
        }
        Ok(InitStatus::Ready)
    }

    fn add_listener(&self, container_id: &str, listener: WidgetListener) -> ListenerId {
        let id = ListenerId::new();
        if let Ok(mut guard) = self.listeners.lock() {
            guard.insert(id, (container_id.to_string(), listener));
        }
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        if let Ok(mut guard) = self.listeners.lock() {
            guard.remove(&id);
        }
    }
}
