//! A local stand-in for the FDC oracle network.
//!
//! Requests are collected into the open voting round. Closing the round builds the Merkle
//! tree over its responses and marks the root confirmed, after which proofs can be served.
//! Tweets are looked up in a fixed feed instead of the Twitter API.

use crate::attestation::{
    response_leaf, tweet_response, Proof, Response, TweetAttestation, Web2JsonRequest,
};
use crate::error::ClientError;
use crate::merkle::MerkleTree;
use crate::registry::ConfirmedRoots;
use alloy_primitives::{keccak256, B256};
use alloy_sol_types::SolValue;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
struct Attested {
    round: u64,
    response: Response,
}

#[derive(Debug, Default)]
pub struct LocalOracle {
    tweets: HashMap<String, TweetAttestation>,
    round: u64,
    open: Vec<(B256, Response)>,
    attested: HashMap<B256, Attested>,
    failed: HashMap<B256, String>,
    trees: HashMap<u64, MerkleTree>,
    roots: HashSet<B256>,
    /// Polls answered with "not ready" before the open round is closed.
    finalize_delay: u32,
    polls_left: u32,
}

impl LocalOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_finalize_delay(mut self, polls: u32) -> Self {
        self.finalize_delay = polls;
        self.polls_left = polls;
        self
    }

    /// Makes a tweet visible to the oracle's web fetches.
    pub fn publish_tweet(&mut self, tweet: TweetAttestation) {
        self.tweets.insert(tweet.tweetId.clone(), tweet);
    }

    pub fn current_round(&self) -> u64 {
        self.round
    }

    pub fn enqueue(&mut self, request_id: B256, request: &Web2JsonRequest) {
        let Some(tweet_id) = request.tweet_id() else {
            warn!(url = %request.url, "unsupported attestation url");
            self.failed
                .insert(request_id, format!("unsupported url {}", request.url));
            return;
        };
        match self.tweets.get(tweet_id) {
            Some(tweet) => {
                let mic = keccak256(tweet.abi_encode());
                self.open.push((request_id, tweet_response(tweet, mic)));
                debug!(request_id = %request_id, round = self.round, "attestation queued");
            }
            None => {
                warn!(tweet_id, "tweet not found; attestation fails");
                self.failed
                    .insert(request_id, format!("tweet {tweet_id} not found"));
            }
        }
    }

    /// Finalizes the open round. Returns its root, or `None` when nothing was queued.
    pub fn close_round(&mut self) -> Option<B256> {
        if self.open.is_empty() {
            return None;
        }
        let round = self.round;
        let queued = std::mem::take(&mut self.open);
        let tree = MerkleTree::from_leaves(queued.iter().map(|(_, r)| response_leaf(r))).ok()?;
        let root = tree.root();

        for (request_id, response) in queued {
            self.attested.insert(request_id, Attested { round, response });
        }
        self.roots.insert(root);
        self.trees.insert(round, tree);
        self.round += 1;
        self.polls_left = self.finalize_delay;
        info!(round, root = %root, "voting round finalized");
        Some(root)
    }

    pub fn proof(&self, request_id: &B256) -> Result<Option<Proof>, ClientError> {
        if let Some(reason) = self.failed.get(request_id) {
            return Err(ClientError::Verifier(reason.clone()));
        }
        let Some(attested) = self.attested.get(request_id) else {
            return Ok(None);
        };
        let tree = self
            .trees
            .get(&attested.round)
            .ok_or_else(|| ClientError::Decode(format!("round {} missing", attested.round)))?;
        let merkle_proof = tree
            .proof(&response_leaf(&attested.response))
            .map_err(|e| ClientError::Decode(e.to_string()))?;
        Ok(Some(Proof {
            data: attested.response.clone(),
            merkleProof: merkle_proof,
        }))
    }

    /// One poll from a client: counts down the finalize delay, then closes the round.
    pub fn poll(&mut self, request_id: &B256) -> Result<Option<Proof>, ClientError> {
        let waiting = self.open.iter().any(|(id, _)| id == request_id);
        if waiting {
            if self.polls_left > 0 {
                self.polls_left -= 1;
                return Ok(None);
            }
            self.close_round();
        }
        self.proof(request_id)
    }
}

impl ConfirmedRoots for LocalOracle {
    fn is_confirmed(&self, root: &B256) -> bool {
        self.roots.contains(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merkle::verify_proof;
    use crate::social::TweetId;

    fn tweet(id: &str) -> TweetAttestation {
        TweetAttestation {
            tweetId: id.to_string(),
            authorId: "99".to_string(),
            text: "gm".to_string(),
        }
    }

    fn request(id: &str) -> Web2JsonRequest {
        Web2JsonRequest::for_tweet(&id.parse::<TweetId>().unwrap())
    }

    #[test]
    fn proofs_verify_against_confirmed_root() {
        let mut oracle = LocalOracle::new();
        oracle.publish_tweet(tweet("1"));
        oracle.publish_tweet(tweet("2"));
        oracle.enqueue(B256::repeat_byte(1), &request("1"));
        oracle.enqueue(B256::repeat_byte(2), &request("2"));

        assert_eq!(oracle.proof(&B256::repeat_byte(1)).unwrap(), None);
        let root = oracle.close_round().unwrap();
        assert!(oracle.is_confirmed(&root));
        assert_eq!(oracle.current_round(), 1);

        let proof = oracle.proof(&B256::repeat_byte(2)).unwrap().unwrap();
        assert!(verify_proof(
            response_leaf(&proof.data),
            &proof.merkleProof,
            root
        ));
    }

    #[test]
    fn missing_tweets_fail_the_request() {
        let mut oracle = LocalOracle::new();
        oracle.enqueue(B256::repeat_byte(1), &request("404"));
        assert!(oracle.close_round().is_none());
        assert!(matches!(
            oracle.proof(&B256::repeat_byte(1)),
            Err(ClientError::Verifier(_))
        ));
    }

    #[test]
    fn poll_honours_finalize_delay() {
        let mut oracle = LocalOracle::new().with_finalize_delay(2);
        oracle.publish_tweet(tweet("1"));
        let id = B256::repeat_byte(1);
        oracle.enqueue(id, &request("1"));
        assert!(oracle.poll(&id).unwrap().is_none());
        assert!(oracle.poll(&id).unwrap().is_none());
        assert!(oracle.poll(&id).unwrap().is_some());
    }
}
