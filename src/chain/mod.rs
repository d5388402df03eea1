//! Clients for the verification contract.
//!
//! [`VerificationContract`] mirrors the contract ABI. [`RpcContract`] talks to a deployed
//! contract through an alloy provider; [`LocalContract`] runs the in-process registry together with a
//! local oracle so the whole protocol can run offline.

mod local;
mod rpc;

pub use local::LocalContract;
pub use rpc::{request_id_from_logs, rpc_error, RpcContract, TxSettings};

use crate::attestation::Proof;
use crate::error::ClientError;
use crate::social::{TweetId, TwitterUserId};
use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;

/// Result of a mined state-changing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutcome {
    pub tx_hash: B256,
    pub block_number: u64,
    pub gas_used: u64,
    /// Block timestamp (unix seconds), used to derive the attestation voting round.
    pub block_timestamp: u64,
}

/// `requestVerification` outcome with the id parsed from the `VerificationRequested` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestReceipt {
    pub request_id: B256,
    pub tx: TxOutcome,
}

#[async_trait]
pub trait VerificationContract: Send + Sync {
    /// Account that signs state-changing calls.
    fn sender(&self) -> Address;

    async fn balance(&self, account: Address) -> Result<U256, ClientError>;

    async fn attestation_type(&self) -> Result<B256, ClientError>;
    async fn fdc_hub(&self) -> Result<Address, ClientError>;
    async fn fdc_verification(&self) -> Result<Address, ClientError>;

    async fn is_user_verified(&self, user: Address) -> Result<bool, ClientError>;
    async fn get_user_twitter_id(&self, user: Address) -> Result<String, ClientError>;
    async fn request_id_to_user(&self, request_id: B256) -> Result<Address, ClientError>;
    async fn request_id_to_tweet_id(&self, request_id: B256) -> Result<String, ClientError>;
    /// Called as the sender; reverts with "User not verified" otherwise.
    async fn restricted_function(&self) -> Result<String, ClientError>;

    async fn request_verification(
        &self,
        tweet_id: &TweetId,
        expected_twitter_id: &TwitterUserId,
        fee: U256,
    ) -> Result<RequestReceipt, ClientError>;
    async fn submit_verification(
        &self,
        request_id: B256,
        proof: Proof,
    ) -> Result<TxOutcome, ClientError>;
    async fn revoke_verification(&self) -> Result<TxOutcome, ClientError>;
}
