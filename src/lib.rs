//! Tweet-backed wallet verification on Flare.
//!
//! A wallet owner tweets their address, asks the `XVerification` contract to verify the tweet,
//! waits for the FDC oracle network to attest it (Web2Json) and submits the resulting Merkle
//! proof. The contract then records `wallet -> twitter user id`.
//!
//! [`registry::VerificationRegistry`] holds the contract's rules, [`chain`] talks to the
//! deployed contract or an in-process one, [`da_layer`] and [`poll`] fetch attestation proofs
//! and [`flow`] ties them together as a wizard.

pub mod abi;
pub mod attestation;
pub mod chain;
pub mod config;
pub mod da_layer;
pub mod error;
pub mod flow;
pub mod merkle;
pub mod oracle;
pub mod poll;
pub mod registry;
pub mod social;

pub use chain::{LocalContract, RpcContract, VerificationContract};
pub use config::AppConfig;
pub use error::{ClientError, ConfigError, FlowError, MerkleError, RegistryError, SocialError};
pub use flow::{run_verification, RunOptions, Session};
pub use oracle::LocalOracle;
pub use registry::VerificationRegistry;
