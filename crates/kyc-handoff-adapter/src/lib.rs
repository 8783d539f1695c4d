/*
[INPUT]:  Crate modules and public type definitions
[OUTPUT]: Public wallet-auth to KYC handoff crate surface
[POS]:    Crate root - module wiring
[UPDATE]: When public modules or exports change
*/

pub mod auth;
pub mod config;
pub mod context;
pub mod flow;
pub mod http;
pub mod types;
pub mod widget;

// Re-export commonly used types from auth
pub use auth::{
    ChallengeBuilder,
    EvmWalletSigner,
    MockWalletSigner,
    SignatureRequester,
    SignatureSlot,
    WalletSigner,
};

pub use config::{HandoffConfig, HttpConfig, VendorConfig, WidgetConfig};
pub use context::HandoffContext;
pub use flow::{FlowController, FlowEvent, FlowHandle, FlowState};

// Re-export commonly used types from http
pub use http::{
    ClientConfig,
    InFlightAddresses,
    KycClient,
    KycError,
    ProxySessionInitiator,
    Result,
    SessionInitiator,
    SessionRequest,
    VendorSessionInitiator,
};

// Re-export all types
pub use types::*;

pub use widget::{
    InMemoryWidgetRuntime,
    RawWidgetEvent,
    WidgetEvent,
    WidgetEventBridge,
    WidgetRuntime,
};
