/*
[INPUT]:  Wallet connection changes, user actions, async step results
[OUTPUT]: Single-owner verification state machine and its handle
[POS]:    Flow layer - orchestrates auth, session and widget layers
[UPDATE]: When adding states, events or transitions
*/

pub mod controller;
pub mod state;

pub use controller::{FlowController, FlowHandle};
pub use state::{FlowEvent, FlowState};
