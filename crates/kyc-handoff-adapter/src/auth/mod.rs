/*
[INPUT]:  Wallet connection, origin and chain configuration
[OUTPUT]: SIWE challenges and wallet signatures over them
[POS]:    Auth layer - proves wallet ownership before verification
[UPDATE]: When auth flow or signature methods change
*/

pub mod evm_wallet;
pub mod requester;
pub mod siwe;
pub mod wallet;

pub use evm_wallet::EvmWalletSigner;
pub use requester::{SignatureRequester, SignatureSlot};
pub use siwe::{ChallengeBuilder, generate_nonce};
pub use wallet::{MockWalletSigner, WalletSigner};
