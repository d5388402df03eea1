use super::{RequestReceipt, TxOutcome, VerificationContract};
use crate::attestation::{Proof, TweetAttestation};
use crate::error::ClientError;
use crate::oracle::LocalOracle;
use crate::poll::{ProofQuery, ProofSource};
use crate::registry::{RegistryEvent, VerificationRegistry};
use crate::social::{TweetId, TwitterUserId};
use alloy_primitives::{keccak256, Address, B256, U256};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

struct LocalChain {
    registry: VerificationRegistry,
    oracle: LocalOracle,
    balances: HashMap<Address, U256>,
    block_number: u64,
    tx_count: u64,
}

impl LocalChain {
    fn mine(&mut self, sender: Address) -> TxOutcome {
        self.block_number += 1;
        self.tx_count += 1;
        let mut seed = sender.to_vec();
        seed.extend_from_slice(&self.tx_count.to_be_bytes());
        TxOutcome {
            tx_hash: keccak256(seed),
            block_number: self.block_number,
            gas_used: 0,
            block_timestamp: u64::try_from(Utc::now().timestamp()).unwrap_or_default(),
        }
    }
}

/// The registry, a local oracle and a balance ledger behind one lock, seen from one account.
///
/// Clones share the same chain; use [`LocalContract::as_account`] to act as another sender.
#[derive(Clone)]
pub struct LocalContract {
    chain: Arc<Mutex<LocalChain>>,
    sender: Address,
}

impl LocalContract {
    pub fn new(registry: VerificationRegistry, oracle: LocalOracle, sender: Address) -> Self {
        let chain = LocalChain {
            registry,
            oracle,
            balances: HashMap::new(),
            block_number: 0,
            tx_count: 0,
        };
        Self {
            chain: Arc::new(Mutex::new(chain)),
            sender,
        }
    }

    pub fn as_account(&self, sender: Address) -> Self {
        Self {
            chain: Arc::clone(&self.chain),
            sender,
        }
    }

    pub async fn fund(&self, account: Address, amount: U256) {
        let mut chain = self.chain.lock().await;
        *chain.balances.entry(account).or_default() += amount;
    }

    /// Publishes a tweet to the feed the local oracle reads from.
    pub async fn publish_tweet(&self, tweet: TweetAttestation) {
        self.chain.lock().await.oracle.publish_tweet(tweet);
    }

    pub async fn collected_fees(&self) -> U256 {
        self.chain.lock().await.registry.collected_fees()
    }
}

#[async_trait]
impl VerificationContract for LocalContract {
    fn sender(&self) -> Address {
        self.sender
    }

    async fn balance(&self, account: Address) -> Result<U256, ClientError> {
        let chain = self.chain.lock().await;
        Ok(chain.balances.get(&account).copied().unwrap_or_default())
    }

    async fn attestation_type(&self) -> Result<B256, ClientError> {
        Ok(self.chain.lock().await.registry.attestation_type())
    }

    async fn fdc_hub(&self) -> Result<Address, ClientError> {
        Ok(self.chain.lock().await.registry.fdc_hub())
    }

    async fn fdc_verification(&self) -> Result<Address, ClientError> {
        Ok(self.chain.lock().await.registry.fdc_verification())
    }

    async fn is_user_verified(&self, user: Address) -> Result<bool, ClientError> {
        Ok(self.chain.lock().await.registry.is_user_verified(&user))
    }

    async fn get_user_twitter_id(&self, user: Address) -> Result<String, ClientError> {
        Ok(self.chain.lock().await.registry.get_user_twitter_id(&user)?)
    }

    async fn request_id_to_user(&self, request_id: B256) -> Result<Address, ClientError> {
        Ok(self.chain.lock().await.registry.request_id_to_user(&request_id))
    }

    async fn request_id_to_tweet_id(&self, request_id: B256) -> Result<String, ClientError> {
        Ok(self
            .chain
            .lock()
            .await
            .registry
            .request_id_to_tweet_id(&request_id))
    }

    async fn restricted_function(&self) -> Result<String, ClientError> {
        let chain = self.chain.lock().await;
        Ok(chain.registry.restricted_function(&self.sender)?.to_string())
    }

    async fn request_verification(
        &self,
        tweet_id: &TweetId,
        expected_twitter_id: &TwitterUserId,
        fee: U256,
    ) -> Result<RequestReceipt, ClientError> {
        let mut guard = self.chain.lock().await;
        let chain = &mut *guard;

        let balance = chain.balances.get(&self.sender).copied().unwrap_or_default();
        if balance < fee {
            return Err(ClientError::InsufficientFunds {
                balance,
                needed: fee,
            });
        }
        let request_id = chain.registry.request_verification(
            self.sender,
            fee,
            tweet_id.as_str(),
            expected_twitter_id.as_str(),
        )?;
        chain.balances.insert(self.sender, balance - fee);

        for event in chain.registry.take_events() {
            if let RegistryEvent::AttestationRequested {
                request_id,
                request,
                ..
            } = event
            {
                chain.oracle.enqueue(request_id, &request);
            }
        }

        let tx = chain.mine(self.sender);
        debug!(request_id = %request_id, block = tx.block_number, "local request mined");
        Ok(RequestReceipt { request_id, tx })
    }

    async fn submit_verification(
        &self,
        request_id: B256,
        proof: Proof,
    ) -> Result<TxOutcome, ClientError> {
        let mut guard = self.chain.lock().await;
        let chain = &mut *guard;
        chain.registry.submit_verification(
            self.sender,
            request_id,
            &proof,
            &chain.oracle,
            Utc::now(),
        )?;
        chain.registry.take_events();
        Ok(chain.mine(self.sender))
    }

    async fn revoke_verification(&self) -> Result<TxOutcome, ClientError> {
        let mut chain = self.chain.lock().await;
        chain.registry.revoke_verification(self.sender)?;
        chain.registry.take_events();
        Ok(chain.mine(self.sender))
    }
}

#[async_trait]
impl ProofSource for LocalContract {
    async fn fetch_proof(&self, query: &ProofQuery) -> Result<Option<Proof>, ClientError> {
        self.chain.lock().await.oracle.poll(&query.request_id)
    }
}
