//! Client for a deployed `XVerification` contract over an alloy HTTP provider.
//!
//! Calls go through the `#[sol(rpc)]` instance generated in [`crate::abi`]. With a signer the
//! provider's fillers take care of nonce, gas and chain id; without one the connection is
//! read-only and transactions fail with [`ClientError::ReadOnly`].

use super::{RequestReceipt, TxOutcome, VerificationContract};
use crate::abi::IXVerification::{self, IXVerificationInstance};
use crate::attestation::Proof;
use crate::error::ClientError;
use crate::social::{TweetId, TwitterUserId};
use alloy_network::{Ethereum, EthereumWallet};
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_provider::{
    DynProvider, PendingTransactionBuilder, PendingTransactionError, Provider, ProviderBuilder,
    WatchTxError,
};
use alloy_rpc_types_eth::{BlockNumberOrTag, Log, TransactionReceipt};
use alloy_signer_local::PrivateKeySigner;
use alloy_transport::TransportError;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Clone, Copy)]
pub struct TxSettings {
    pub confirmations: u64,
    pub receipt_timeout: Duration,
}

impl Default for TxSettings {
    fn default() -> Self {
        Self {
            confirmations: 1,
            receipt_timeout: Duration::from_secs(120),
        }
    }
}

/// Maps a JSON-RPC error response, preferring the decoded revert reason.
pub fn rpc_error(code: i64, message: &str, revert_data: Option<Bytes>) -> ClientError {
    if let Some(reason) = revert_data
        .as_deref()
        .and_then(|data| alloy_sol_types::decode_revert_reason(data))
    {
        return ClientError::Reverted(reason);
    }
    if message.contains("execution reverted") || message.contains("reverted with") {
        return ClientError::Reverted(message.to_string());
    }
    ClientError::Rpc {
        code,
        message: message.to_string(),
    }
}

fn transport_error(err: TransportError) -> ClientError {
    match err.as_error_resp() {
        Some(resp) => rpc_error(resp.code, &resp.message, resp.as_revert_data()),
        None => ClientError::Transport(err.to_string()),
    }
}

fn contract_error(err: alloy_contract::Error) -> ClientError {
    match err {
        alloy_contract::Error::TransportError(e) => transport_error(e),
        other => ClientError::Transport(other.to_string()),
    }
}

fn pending_error(hash: B256, err: PendingTransactionError) -> ClientError {
    match err {
        PendingTransactionError::TxWatcher(WatchTxError::Timeout) => ClientError::TxNotMined(hash),
        PendingTransactionError::TransportError(e) => transport_error(e),
        other => ClientError::Transport(other.to_string()),
    }
}

/// Request id from the contract's `VerificationRequested` log.
pub fn request_id_from_logs(contract: Address, logs: &[Log]) -> Option<B256> {
    logs.iter()
        .filter(|log| log.address() == contract)
        .find_map(|log| log.log_decode::<IXVerification::VerificationRequested>().ok())
        .map(|event| event.inner.data.requestId)
}

/// Client for a deployed `XVerification` contract.
#[derive(Clone)]
pub struct RpcContract {
    provider: DynProvider,
    contract: IXVerificationInstance<DynProvider>,
    sender: Address,
    signing: bool,
    settings: TxSettings,
}

impl fmt::Debug for RpcContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcContract")
            .field("address", &self.address())
            .field("sender", &self.sender)
            .field("signing", &self.signing)
            .field("settings", &self.settings)
            .finish()
    }
}

impl RpcContract {
    /// Connection that signs transactions with `signer`.
    pub fn with_signer(
        rpc_url: &Url,
        address: Address,
        signer: PrivateKeySigner,
        settings: TxSettings,
    ) -> Self {
        let sender = signer.address();
        let provider = DynProvider::new(
            ProviderBuilder::new()
                .wallet(EthereumWallet::from(signer))
                .connect_http(rpc_url.clone()),
        );
        Self::from_provider(provider, address, sender, true, settings)
    }

    /// Connection for views only; `viewer` is the `from` address of calls.
    pub fn read_only(rpc_url: &Url, address: Address, viewer: Address, settings: TxSettings) -> Self {
        let provider = DynProvider::new(ProviderBuilder::new().connect_http(rpc_url.clone()));
        Self::from_provider(provider, address, viewer, false, settings)
    }

    fn from_provider(
        provider: DynProvider,
        address: Address,
        sender: Address,
        signing: bool,
        settings: TxSettings,
    ) -> Self {
        let contract = IXVerification::new(address, provider.clone());
        Self {
            provider,
            contract,
            sender,
            signing,
            settings,
        }
    }

    pub fn address(&self) -> Address {
        *self.contract.address()
    }

    pub fn can_sign(&self) -> bool {
        self.signing
    }

    pub async fn chain_id(&self) -> Result<u64, ClientError> {
        self.provider.get_chain_id().await.map_err(transport_error)
    }

    fn ensure_signer(&self) -> Result<(), ClientError> {
        if self.signing {
            Ok(())
        } else {
            Err(ClientError::ReadOnly)
        }
    }

    async fn confirm(
        &self,
        method: &'static str,
        pending: PendingTransactionBuilder<Ethereum>,
    ) -> Result<(TxOutcome, TransactionReceipt), ClientError> {
        let hash = *pending.tx_hash();
        info!(tx_hash = %hash, method, "transaction sent");

        let receipt = pending
            .with_required_confirmations(self.settings.confirmations)
            .with_timeout(Some(self.settings.receipt_timeout))
            .get_receipt()
            .await
            .map_err(|e| pending_error(hash, e))?;
        if !receipt.status() {
            return Err(ClientError::TxFailed(hash));
        }
        let block_number = receipt
            .block_number
            .ok_or_else(|| ClientError::Decode(format!("receipt for {hash} has no block number")))?;
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(block_number))
            .await
            .map_err(transport_error)?
            .ok_or_else(|| ClientError::Decode(format!("block {block_number} not found")))?;

        let outcome = TxOutcome {
            tx_hash: hash,
            block_number,
            gas_used: receipt.gas_used,
            block_timestamp: block.header.timestamp,
        };
        info!(
            tx_hash = %hash,
            block = outcome.block_number,
            gas_used = outcome.gas_used,
            "transaction confirmed"
        );
        Ok((outcome, receipt))
    }
}

#[async_trait]
impl VerificationContract for RpcContract {
    fn sender(&self) -> Address {
        self.sender
    }

    async fn balance(&self, account: Address) -> Result<U256, ClientError> {
        self.provider
            .get_balance(account)
            .await
            .map_err(transport_error)
    }

    async fn attestation_type(&self) -> Result<B256, ClientError> {
        self.contract
            .WEB2JSON_ATTESTATION_TYPE()
            .call()
            .await
            .map_err(contract_error)
    }

    async fn fdc_hub(&self) -> Result<Address, ClientError> {
        self.contract.fdcHub().call().await.map_err(contract_error)
    }

    async fn fdc_verification(&self) -> Result<Address, ClientError> {
        self.contract
            .fdcVerification()
            .call()
            .await
            .map_err(contract_error)
    }

    async fn is_user_verified(&self, user: Address) -> Result<bool, ClientError> {
        self.contract
            .isUserVerified(user)
            .call()
            .await
            .map_err(contract_error)
    }

    async fn get_user_twitter_id(&self, user: Address) -> Result<String, ClientError> {
        self.contract
            .getUserTwitterId(user)
            .call()
            .await
            .map_err(contract_error)
    }

    async fn request_id_to_user(&self, request_id: B256) -> Result<Address, ClientError> {
        self.contract
            .requestIdToUser(request_id)
            .call()
            .await
            .map_err(contract_error)
    }

    async fn request_id_to_tweet_id(&self, request_id: B256) -> Result<String, ClientError> {
        self.contract
            .requestIdToTweetId(request_id)
            .call()
            .await
            .map_err(contract_error)
    }

    async fn restricted_function(&self) -> Result<String, ClientError> {
        // msg.sender decides the outcome
        self.contract
            .restrictedFunction()
            .from(self.sender)
            .call()
            .await
            .map_err(contract_error)
    }

    async fn request_verification(
        &self,
        tweet_id: &TweetId,
        expected_twitter_id: &TwitterUserId,
        fee: U256,
    ) -> Result<RequestReceipt, ClientError> {
        self.ensure_signer()?;
        let balance = self.balance(self.sender).await?;
        if balance < fee {
            return Err(ClientError::InsufficientFunds {
                balance,
                needed: fee,
            });
        }
        debug!(tweet_id = %tweet_id, %fee, "requesting verification");
        let pending = self
            .contract
            .requestVerification(tweet_id.to_string(), expected_twitter_id.to_string())
            .value(fee)
            .send()
            .await
            .map_err(contract_error)?;
        let (tx, receipt) = self.confirm("requestVerification", pending).await?;
        let request_id = request_id_from_logs(self.address(), receipt.inner.logs()).ok_or_else(|| {
            ClientError::Decode("VerificationRequested event missing from receipt".to_string())
        })?;
        Ok(RequestReceipt { request_id, tx })
    }

    async fn submit_verification(
        &self,
        request_id: B256,
        proof: Proof,
    ) -> Result<TxOutcome, ClientError> {
        self.ensure_signer()?;
        let pending = self
            .contract
            .submitVerification(request_id, proof)
            .send()
            .await
            .map_err(contract_error)?;
        Ok(self.confirm("submitVerification", pending).await?.0)
    }

    async fn revoke_verification(&self) -> Result<TxOutcome, ClientError> {
        self.ensure_signer()?;
        let pending = self
            .contract
            .revokeVerification()
            .send()
            .await
            .map_err(contract_error)?;
        Ok(self.confirm("revokeVerification", pending).await?.0)
    }
}
