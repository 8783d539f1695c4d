/*
[INPUT]:  Public API exports for the kyc-handoff-runner crate
[OUTPUT]: Module declarations and public re-exports
[POS]:    Crate root - library entry point
[UPDATE]: When adding new modules or public exports
*/

pub mod config;
pub mod driver;
pub mod terminal;

// Re-export main types for convenience
pub use config::load_config;
pub use driver::{Outcome, drive};
pub use terminal::TerminalWidgetRuntime;
