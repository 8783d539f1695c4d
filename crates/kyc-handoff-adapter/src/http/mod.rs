/*
[INPUT]:  HTTP client configuration and backend/vendor endpoints
[OUTPUT]: VerificationSession results and typed errors
[POS]:    HTTP layer - session initiation over REST
[UPDATE]: When adding new endpoints or changing client behavior
*/

pub mod client;
pub mod error;
pub mod proxy;
pub mod session;
pub mod vendor;

pub use error::{KycError, Result};

pub use client::{ClientConfig, KycClient};
pub use proxy::ProxySessionInitiator;
pub use session::{InFlightAddresses, InFlightGuard, SessionInitiator, SessionRequest};
pub use vendor::VendorSessionInitiator;
