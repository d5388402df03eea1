//! Web2Json attestation types as the verification contract sees them.
//!
//! The oracle network fetches a URL, reduces the JSON with a jq filter and ABI-encodes the
//! result into `ResponseBody.abiEncodedData`. For tweets the payload is
//! [`TweetAttestation`]. Each response is a leaf of the round's Merkle tree; the leaf hash is
//! `keccak256(abi.encode(response))`.

pub use crate::abi::{Proof, Response, ResponseBody, TweetAttestation};
use crate::error::RegistryError;
use crate::social::TweetId;
use alloy_primitives::{keccak256, B256};
use alloy_sol_types::SolValue;
use serde::{Deserialize, Serialize};

/// ABI signature handed to the verifier so it encodes [`TweetAttestation`].
pub const TWEET_ABI_SIGNATURE: &str = r#"{"components":[{"internalType":"string","name":"tweetId","type":"string"},{"internalType":"string","name":"authorId","type":"string"},{"internalType":"string","name":"text","type":"string"}],"name":"task","type":"tuple"}"#;

pub const TWEET_JQ_FILTER: &str = "{tweetId: .data.id, authorId: .data.author_id, text: .data.text}";

pub const TWITTER_API_BASE: &str = "https://api.twitter.com/2/tweets";

/// Solidity's `bytes32("...")` for short ASCII names: left-aligned, zero padded.
pub fn encode_bytes32_string(name: &str) -> B256 {
    let mut out = [0u8; 32];
    let bytes = name.as_bytes();
    let len = bytes.len().min(32);
    out[..len].copy_from_slice(&bytes[..len]);
    B256::from(out)
}

pub fn web2json_attestation_type() -> B256 {
    encode_bytes32_string("Web2Json")
}

pub fn public_web2_source_id() -> B256 {
    encode_bytes32_string("PublicWeb2")
}

/// Request body understood by the Web2Json verifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Web2JsonRequest {
    pub url: String,
    pub http_method: String,
    pub headers: String,
    pub query_params: String,
    pub body: String,
    pub post_process_jq: String,
    pub abi_signature: String,
}

impl Web2JsonRequest {
    pub fn for_tweet(tweet_id: &TweetId) -> Self {
        Self {
            url: format!("{TWITTER_API_BASE}/{tweet_id}"),
            http_method: "GET".to_string(),
            headers: "{}".to_string(),
            query_params: r#"{"tweet.fields":"author_id"}"#.to_string(),
            body: "{}".to_string(),
            post_process_jq: TWEET_JQ_FILTER.to_string(),
            abi_signature: TWEET_ABI_SIGNATURE.to_string(),
        }
    }

    /// Tweet id this request targets, if it is a tweet lookup.
    pub fn tweet_id(&self) -> Option<&str> {
        self.url
            .strip_prefix(TWITTER_API_BASE)
            .and_then(|rest| rest.strip_prefix('/'))
    }
}

/// Envelope posted to the verifier's `prepareRequest` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationRequest {
    pub attestation_type: String,
    pub source_id: String,
    pub request_body: Web2JsonRequest,
}

impl AttestationRequest {
    pub fn for_tweet(tweet_id: &TweetId) -> Self {
        Self {
            attestation_type: format!("{:#x}", web2json_attestation_type()),
            source_id: format!("{:#x}", public_web2_source_id()),
            request_body: Web2JsonRequest::for_tweet(tweet_id),
        }
    }
}

/// Builds the response the oracle network would attest for a tweet.
pub fn tweet_response(payload: &TweetAttestation, message_integrity_code: B256) -> Response {
    Response {
        attestationType: web2json_attestation_type(),
        sourceId: public_web2_source_id(),
        messageIntegrityCode: message_integrity_code,
        responseBody: ResponseBody {
            abiEncodedData: payload.abi_encode().into(),
        },
    }
}

pub fn response_leaf(response: &Response) -> B256 {
    keccak256(response.abi_encode())
}

pub fn decode_tweet_attestation(response: &Response) -> Result<TweetAttestation, RegistryError> {
    TweetAttestation::abi_decode(&response.responseBody.abiEncodedData)
        .map_err(|e| RegistryError::MalformedAttestation(e.to_string()))
}

pub fn decode_response(bytes: &[u8]) -> Result<Response, RegistryError> {
    Response::abi_decode(bytes).map_err(|e| RegistryError::MalformedAttestation(e.to_string()))
}
