//! In-process model of the `XVerification` contract.
//!
//! A user pays the attestation fee to request verification of a tweet, the contract forwards a
//! Web2Json request to the FDC hub, and later the user submits the attested response together
//! with its Merkle proof. The contract trusts a root only if the FDC verification contract
//! reports it as confirmed ([`ConfirmedRoots`]).

use crate::attestation::{
    decode_tweet_attestation, response_leaf, web2json_attestation_type, Proof, Web2JsonRequest,
};
use crate::error::RegistryError;
use crate::merkle::compute_root;
use crate::social::{text_mentions_wallet, TweetId, TwitterUserId};
use alloy_primitives::{keccak256, Address, B256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Fee charged by the deployed contract: 0.001 native token.
pub const DEFAULT_VERIFICATION_FEE: u128 = 1_000_000_000_000_000;

pub const RESTRICTED_FUNCTION_RESULT: &str = "Access granted: verified Twitter account";

/// Answers whether an attestation round root has been confirmed by the oracle network.
pub trait ConfirmedRoots {
    fn is_confirmed(&self, root: &B256) -> bool;
}

impl<T: ConfirmedRoots + ?Sized> ConfirmedRoots for &T {
    fn is_confirmed(&self, root: &B256) -> bool {
        (**self).is_confirmed(root)
    }
}

/// Contract events, in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    VerificationRequested {
        user: Address,
        tweet_id: String,
        request_id: B256,
    },
    /// Forwarded to the FDC hub together with the fee.
    AttestationRequested {
        request_id: B256,
        request: Web2JsonRequest,
        fee: U256,
    },
    UserVerified {
        user: Address,
        twitter_id: String,
        tweet_id: String,
    },
    VerificationRevoked {
        user: Address,
        twitter_id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRequest {
    pub user: Address,
    pub tweet_id: String,
    pub expected_twitter_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub twitter_id: String,
    pub tweet_id: String,
    pub verified_at: DateTime<Utc>,
}

pub struct VerificationRegistry {
    owner: Address,
    fdc_hub: Address,
    fdc_verification: Address,
    fee: U256,
    nonce: u64,
    collected_fees: U256,
    pending: HashMap<B256, PendingRequest>,
    verified: HashMap<Address, VerificationRecord>,
    /// Reverse index so one Twitter account backs at most one wallet.
    twitter_owner: HashMap<String, Address>,
    events: Vec<RegistryEvent>,
}

impl VerificationRegistry {
    pub fn new(owner: Address, fdc_hub: Address, fdc_verification: Address, fee: U256) -> Self {
        Self {
            owner,
            fdc_hub,
            fdc_verification,
            fee,
            nonce: 0,
            collected_fees: U256::ZERO,
            pending: HashMap::new(),
            verified: HashMap::new(),
            twitter_owner: HashMap::new(),
            events: Vec::new(),
        }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn fdc_hub(&self) -> Address {
        self.fdc_hub
    }

    pub fn fdc_verification(&self) -> Address {
        self.fdc_verification
    }

    pub fn attestation_type(&self) -> B256 {
        web2json_attestation_type()
    }

    pub fn verification_fee(&self) -> U256 {
        self.fee
    }

    pub fn collected_fees(&self) -> U256 {
        self.collected_fees
    }

    pub fn request_verification(
        &mut self,
        caller: Address,
        value: U256,
        tweet_id: &str,
        expected_twitter_id: &str,
    ) -> Result<B256, RegistryError> {
        if value < self.fee {
            return Err(RegistryError::InsufficientFee {
                required: self.fee,
                provided: value,
            });
        }
        if tweet_id.is_empty() {
            return Err(RegistryError::EmptyTweetId);
        }
        if expected_twitter_id.is_empty() {
            return Err(RegistryError::EmptyTwitterId);
        }
        // Typed ids keep malformed strings out of the attestation request.
        let typed_tweet: TweetId = tweet_id
            .parse()
            .map_err(|_| RegistryError::InvalidTweetId(tweet_id.to_string()))?;
        expected_twitter_id
            .parse::<TwitterUserId>()
            .map_err(|_| RegistryError::InvalidTwitterId(expected_twitter_id.to_string()))?;

        let request_id = self.next_request_id(caller, tweet_id, expected_twitter_id);
        self.pending.insert(
            request_id,
            PendingRequest {
                user: caller,
                tweet_id: tweet_id.to_string(),
                expected_twitter_id: expected_twitter_id.to_string(),
            },
        );
        self.collected_fees += value;

        info!(
            user = %caller,
            tweet_id,
            request_id = %request_id,
            "verification requested"
        );
        self.events.push(RegistryEvent::VerificationRequested {
            user: caller,
            tweet_id: tweet_id.to_string(),
            request_id,
        });
        self.events.push(RegistryEvent::AttestationRequested {
            request_id,
            request: Web2JsonRequest::for_tweet(&typed_tweet),
            fee: value,
        });
        Ok(request_id)
    }

    /// keccak256(abi.encodePacked(user, tweetId, expectedTwitterId, nonce))
    fn next_request_id(&mut self, user: Address, tweet_id: &str, twitter_id: &str) -> B256 {
        let mut packed = Vec::with_capacity(20 + tweet_id.len() + twitter_id.len() + 32);
        packed.extend_from_slice(user.as_slice());
        packed.extend_from_slice(tweet_id.as_bytes());
        packed.extend_from_slice(twitter_id.as_bytes());
        packed.extend_from_slice(&U256::from(self.nonce).to_be_bytes::<32>());
        self.nonce += 1;
        keccak256(packed)
    }

    pub fn submit_verification(
        &mut self,
        caller: Address,
        request_id: B256,
        proof: &Proof,
        roots: &impl ConfirmedRoots,
        now: DateTime<Utc>,
    ) -> Result<(), RegistryError> {
        let pending = self
            .pending
            .get(&request_id)
            .ok_or(RegistryError::UnknownRequest(request_id))?;
        if pending.user != caller {
            return Err(RegistryError::NotRequester);
        }
        if proof.data.attestationType != web2json_attestation_type() {
            return Err(RegistryError::InvalidAttestationType);
        }

        let leaf = response_leaf(&proof.data);
        let root = compute_root(leaf, &proof.merkleProof);
        if !roots.is_confirmed(&root) {
            debug!(root = %root, "attestation root not confirmed");
            return Err(RegistryError::InvalidProof);
        }

        let tweet = decode_tweet_attestation(&proof.data)?;
        if tweet.tweetId != pending.tweet_id {
            return Err(RegistryError::TweetMismatch {
                expected: pending.tweet_id.clone(),
                attested: tweet.tweetId,
            });
        }
        if tweet.authorId != pending.expected_twitter_id {
            return Err(RegistryError::AuthorMismatch {
                expected: pending.expected_twitter_id.clone(),
                attested: tweet.authorId,
            });
        }
        if !text_mentions_wallet(&tweet.text, &caller) {
            return Err(RegistryError::WalletNotMentioned(caller));
        }
        if let Some(holder) = self.twitter_owner.get(&tweet.authorId) {
            if *holder != caller {
                return Err(RegistryError::TwitterIdTaken(*holder));
            }
        }

        // Re-verifying under a different account releases the old binding.
        if let Some(previous) = self.verified.get(&caller) {
            if previous.twitter_id != tweet.authorId {
                self.twitter_owner.remove(&previous.twitter_id);
            }
        }

        self.pending.remove(&request_id);
        self.twitter_owner.insert(tweet.authorId.clone(), caller);
        self.verified.insert(
            caller,
            VerificationRecord {
                twitter_id: tweet.authorId.clone(),
                tweet_id: tweet.tweetId.clone(),
                verified_at: now,
            },
        );

        info!(user = %caller, twitter_id = %tweet.authorId, "user verified");
        self.events.push(RegistryEvent::UserVerified {
            user: caller,
            twitter_id: tweet.authorId,
            tweet_id: tweet.tweetId,
        });
        Ok(())
    }

    pub fn is_user_verified(&self, user: &Address) -> bool {
        self.verified.contains_key(user)
    }

    pub fn get_user_twitter_id(&self, user: &Address) -> Result<String, RegistryError> {
        self.verified
            .get(user)
            .map(|r| r.twitter_id.clone())
            .ok_or(RegistryError::UserNotVerified)
    }

    pub fn verification_record(&self, user: &Address) -> Option<&VerificationRecord> {
        self.verified.get(user)
    }

    pub fn restricted_function(&self, caller: &Address) -> Result<&'static str, RegistryError> {
        if self.is_user_verified(caller) {
            Ok(RESTRICTED_FUNCTION_RESULT)
        } else {
            Err(RegistryError::UserNotVerified)
        }
    }

    pub fn revoke_verification(&mut self, caller: Address) -> Result<(), RegistryError> {
        let record = self
            .verified
            .remove(&caller)
            .ok_or(RegistryError::UserNotVerified)?;
        self.twitter_owner.remove(&record.twitter_id);
        info!(user = %caller, "verification revoked");
        self.events.push(RegistryEvent::VerificationRevoked {
            user: caller,
            twitter_id: record.twitter_id,
        });
        Ok(())
    }

    // Public mapping getters. Missing keys read as Solidity zero values.

    pub fn request_id_to_user(&self, request_id: &B256) -> Address {
        self.pending
            .get(request_id)
            .map(|p| p.user)
            .unwrap_or(Address::ZERO)
    }

    pub fn request_id_to_tweet_id(&self, request_id: &B256) -> String {
        self.pending
            .get(request_id)
            .map(|p| p.tweet_id.clone())
            .unwrap_or_default()
    }

    pub fn user_twitter_ids(&self, user: &Address) -> String {
        self.verified
            .get(user)
            .map(|r| r.twitter_id.clone())
            .unwrap_or_default()
    }

    pub fn verified_users(&self, user: &Address) -> bool {
        self.is_user_verified(user)
    }

    pub fn pending_request(&self, request_id: &B256) -> Option<&PendingRequest> {
        self.pending.get(request_id)
    }

    pub fn take_events(&mut self) -> Vec<RegistryEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attestation::{tweet_response, TweetAttestation};
    use crate::merkle::MerkleTree;
    use crate::social::verification_tweet_text;
    use std::collections::HashSet;

    struct Roots(HashSet<B256>);

    impl ConfirmedRoots for Roots {
        fn is_confirmed(&self, root: &B256) -> bool {
            self.0.contains(root)
        }
    }

    fn alice() -> Address {
        Address::repeat_byte(0xa1)
    }

    fn bob() -> Address {
        Address::repeat_byte(0xb0)
    }

    fn fee() -> U256 {
        U256::from(DEFAULT_VERIFICATION_FEE)
    }

    fn registry() -> VerificationRegistry {
        VerificationRegistry::new(
            Address::repeat_byte(0x01),
            Address::repeat_byte(0x02),
            Address::repeat_byte(0x03),
            fee(),
        )
    }

    /// Attests `payload` in a fresh round alongside some filler leaves.
    fn attest(payload: TweetAttestation) -> (Proof, Roots) {
        let response = tweet_response(&payload, B256::repeat_byte(9));
        let leaf = response_leaf(&response);
        let filler = (0u8..4).map(|i| keccak256([i]));
        let tree = MerkleTree::from_leaves(filler.chain([leaf])).unwrap();
        let proof = Proof {
            data: response,
            merkleProof: tree.proof(&leaf).unwrap(),
        };
        (proof, Roots(HashSet::from([tree.root()])))
    }

    fn tweet_by(author: &str, wallet: Address, tweet_id: &str) -> TweetAttestation {
        TweetAttestation {
            tweetId: tweet_id.to_string(),
            authorId: author.to_string(),
            text: verification_tweet_text(&wallet),
        }
    }

    #[test]
    fn request_requires_fee_and_ids() {
        let mut reg = registry();
        let low = reg.request_verification(alice(), U256::from(1u64), "1", "2");
        assert!(matches!(low, Err(RegistryError::InsufficientFee { .. })));
        assert_eq!(
            reg.request_verification(alice(), fee(), "", "2"),
            Err(RegistryError::EmptyTweetId)
        );
        assert_eq!(
            reg.request_verification(alice(), fee(), "1", ""),
            Err(RegistryError::EmptyTwitterId)
        );
        assert!(reg.take_events().is_empty());
    }

    #[test]
    fn request_emits_events_and_records_mappings() {
        let mut reg = registry();
        let id = reg
            .request_verification(alice(), fee(), "1234567890123456789", "987654321")
            .unwrap();
        assert_eq!(reg.request_id_to_user(&id), alice());
        assert_eq!(reg.request_id_to_tweet_id(&id), "1234567890123456789");
        assert_eq!(reg.collected_fees(), fee());

        let events = reg.take_events();
        assert_eq!(
            events[0],
            RegistryEvent::VerificationRequested {
                user: alice(),
                tweet_id: "1234567890123456789".into(),
                request_id: id,
            }
        );
        assert!(matches!(events[1], RegistryEvent::AttestationRequested { .. }));
    }

    #[test]
    fn identical_requests_get_distinct_ids() {
        let mut reg = registry();
        let a = reg.request_verification(alice(), fee(), "1", "2").unwrap();
        let b = reg.request_verification(alice(), fee(), "1", "2").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn full_verification_then_revoke() {
        let mut reg = registry();
        let id = reg.request_verification(alice(), fee(), "55", "777").unwrap();
        let (proof, roots) = attest(tweet_by("777", alice(), "55"));

        assert_eq!(
            reg.get_user_twitter_id(&alice()),
            Err(RegistryError::UserNotVerified)
        );
        reg.submit_verification(alice(), id, &proof, &roots, Utc::now())
            .unwrap();

        assert!(reg.is_user_verified(&alice()));
        assert_eq!(reg.get_user_twitter_id(&alice()).unwrap(), "777");
        assert_eq!(reg.user_twitter_ids(&alice()), "777");
        assert_eq!(
            reg.restricted_function(&alice()).unwrap(),
            RESTRICTED_FUNCTION_RESULT
        );
        assert_eq!(reg.request_id_to_user(&id), Address::ZERO);

        reg.revoke_verification(alice()).unwrap();
        assert!(!reg.verified_users(&alice()));
        assert_eq!(
            reg.restricted_function(&alice()),
            Err(RegistryError::UserNotVerified)
        );
        assert_eq!(
            reg.revoke_verification(alice()),
            Err(RegistryError::UserNotVerified)
        );
    }

    #[test]
    fn only_requester_may_submit() {
        let mut reg = registry();
        let id = reg.request_verification(alice(), fee(), "55", "777").unwrap();
        let (proof, roots) = attest(tweet_by("777", alice(), "55"));
        assert_eq!(
            reg.submit_verification(bob(), id, &proof, &roots, Utc::now()),
            Err(RegistryError::NotRequester)
        );
        assert_eq!(
            reg.submit_verification(alice(), B256::ZERO, &proof, &roots, Utc::now()),
            Err(RegistryError::UnknownRequest(B256::ZERO))
        );
    }

    #[test]
    fn unconfirmed_root_is_rejected() {
        let mut reg = registry();
        let id = reg.request_verification(alice(), fee(), "55", "777").unwrap();
        let (proof, _) = attest(tweet_by("777", alice(), "55"));
        let empty = Roots(HashSet::new());
        assert_eq!(
            reg.submit_verification(alice(), id, &proof, &empty, Utc::now()),
            Err(RegistryError::InvalidProof)
        );
    }

    #[test]
    fn attested_content_must_match_request() {
        let mut reg = registry();
        let id = reg.request_verification(alice(), fee(), "55", "777").unwrap();

        let (proof, roots) = attest(tweet_by("777", alice(), "56"));
        assert!(matches!(
            reg.submit_verification(alice(), id, &proof, &roots, Utc::now()),
            Err(RegistryError::TweetMismatch { .. })
        ));

        let (proof, roots) = attest(tweet_by("778", alice(), "55"));
        assert!(matches!(
            reg.submit_verification(alice(), id, &proof, &roots, Utc::now()),
            Err(RegistryError::AuthorMismatch { .. })
        ));

        let (proof, roots) = attest(tweet_by("777", bob(), "55"));
        assert_eq!(
            reg.submit_verification(alice(), id, &proof, &roots, Utc::now()),
            Err(RegistryError::WalletNotMentioned(alice()))
        );
        assert!(reg.pending_request(&id).is_some());
    }

    #[test]
    fn wrong_attestation_type_is_rejected() {
        let mut reg = registry();
        let id = reg.request_verification(alice(), fee(), "55", "777").unwrap();
        let (mut proof, roots) = attest(tweet_by("777", alice(), "55"));
        proof.data.attestationType = B256::ZERO;
        assert_eq!(
            reg.submit_verification(alice(), id, &proof, &roots, Utc::now()),
            Err(RegistryError::InvalidAttestationType)
        );
    }

    #[test]
    fn twitter_account_backs_one_wallet() {
        let mut reg = registry();
        let a = reg.request_verification(alice(), fee(), "55", "777").unwrap();
        let (proof, roots) = attest(tweet_by("777", alice(), "55"));
        reg.submit_verification(alice(), a, &proof, &roots, Utc::now())
            .unwrap();

        let b = reg.request_verification(bob(), fee(), "56", "777").unwrap();
        let (proof, roots) = attest(tweet_by("777", bob(), "56"));
        assert_eq!(
            reg.submit_verification(bob(), b, &proof, &roots, Utc::now()),
            Err(RegistryError::TwitterIdTaken(alice()))
        );

        reg.revoke_verification(alice()).unwrap();
        reg.submit_verification(bob(), b, &proof, &roots, Utc::now())
            .unwrap();
        assert_eq!(reg.get_user_twitter_id(&bob()).unwrap(), "777");
    }

    #[test]
    fn reverification_refreshes_record() {
        let mut reg = registry();
        assert_eq!(reg.verification_fee(), fee());
        assert!(reg.verification_record(&alice()).is_none());

        let first_at = Utc::now() - chrono::Duration::days(30);
        let id = reg
            .request_verification(alice(), fee(), "100", "555")
            .unwrap();
        let (proof, roots) = attest(tweet_by("555", alice(), "100"));
        reg.submit_verification(alice(), id, &proof, &roots, first_at)
            .unwrap();
        assert_eq!(reg.verification_record(&alice()).unwrap().verified_at, first_at);

        let later = Utc::now();
        let id = reg
            .request_verification(alice(), fee(), "101", "555")
            .unwrap();
        let (proof, roots) = attest(tweet_by("555", alice(), "101"));
        reg.submit_verification(alice(), id, &proof, &roots, later)
            .unwrap();
        let record = reg.verification_record(&alice()).unwrap();
        assert_eq!(record.tweet_id, "101");
        assert_eq!(record.verified_at, later);
        assert_eq!(reg.collected_fees(), fee() * U256::from(2u64));
    }

    #[test]
    fn switching_accounts_releases_old_id() {
        let mut reg = registry();
        let id = reg.request_verification(alice(), fee(), "200", "777").unwrap();
        let (proof, roots) = attest(tweet_by("777", alice(), "200"));
        reg.submit_verification(alice(), id, &proof, &roots, Utc::now())
            .unwrap();

        let id = reg.request_verification(alice(), fee(), "201", "888").unwrap();
        let (proof, roots) = attest(tweet_by("888", alice(), "201"));
        reg.submit_verification(alice(), id, &proof, &roots, Utc::now())
            .unwrap();
        assert_eq!(reg.verification_record(&alice()).unwrap().twitter_id, "888");

        // 777 is free again; 888 stays with alice.
        let id = reg.request_verification(bob(), fee(), "300", "777").unwrap();
        let (proof, roots) = attest(tweet_by("777", bob(), "300"));
        reg.submit_verification(bob(), id, &proof, &roots, Utc::now())
            .unwrap();
        assert_eq!(reg.verification_record(&bob()).unwrap().twitter_id, "777");

        let id = reg.request_verification(bob(), fee(), "301", "888").unwrap();
        let (proof, roots) = attest(tweet_by("888", bob(), "301"));
        assert_eq!(
            reg.submit_verification(bob(), id, &proof, &roots, Utc::now()),
            Err(RegistryError::TwitterIdTaken(alice()))
        );
    }
}
