/*
[INPUT]:  Vendor widget payloads and widget-emitted custom events
[OUTPUT]: Initialized widget and typed events for the flow controller
[POS]:    Widget layer - embedded verification UI boundary
[UPDATE]: When adding event kinds or changing the runtime contract
*/

pub mod bridge;
pub mod event;
pub mod runtime;

pub use bridge::{InitOutcome, WidgetEventBridge, WidgetInitializer};
pub use event::{RawWidgetEvent, WidgetEvent};
pub use runtime::{
    InMemoryWidgetRuntime, InitStatus, ListenerId, WidgetInitOptions, WidgetListener,
    WidgetRuntime,
};
