//! HTTP clients for the Web2Json verifier and the FDC data-availability layer.

use crate::attestation::{decode_response, AttestationRequest, Proof};
use crate::error::ClientError;
use crate::poll::{ProofQuery, ProofSource};
use alloy_primitives::{Bytes, B256};
use alloy_sol_types::SolValue;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Start of voting round 0 on Coston2 (unix seconds).
pub const COSTON2_FIRST_VOTING_ROUND_START_TS: u64 = 1_658_430_000;
pub const VOTING_EPOCH_DURATION_SECS: u64 = 90;

/// Voting round containing `timestamp`. Timestamps before round 0 map to round 0.
pub fn voting_round_at(timestamp: u64, first_round_start: u64, epoch_secs: u64) -> u64 {
    timestamp.saturating_sub(first_round_start) / epoch_secs.max(1)
}

fn endpoint_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(20))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrepareResponse {
    status: String,
    #[serde(default)]
    abi_encoded_request: Option<String>,
}

fn parse_prepare_response(body: &str) -> Result<Bytes, ClientError> {
    let parsed: PrepareResponse =
        serde_json::from_str(body).map_err(|e| ClientError::Decode(e.to_string()))?;
    if parsed.status != "VALID" {
        return Err(ClientError::Verifier(parsed.status));
    }
    let encoded = parsed
        .abi_encoded_request
        .ok_or_else(|| ClientError::Decode("missing abiEncodedRequest".to_string()))?;
    Bytes::from_str(&encoded).map_err(|e| ClientError::Decode(e.to_string()))
}

/// Turns a Web2Json request into the ABI-encoded bytes the FDC hub accepts.
#[derive(Debug, Clone)]
pub struct VerifierClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl VerifierClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.to_string(),
            api_key,
            client: http_client(),
        }
    }

    pub async fn prepare_request(&self, request: &AttestationRequest) -> Result<Bytes, ClientError> {
        let url = endpoint_url(&self.base_url, "/Web2Json/prepareRequest");
        let mut req = self.client.post(&url).json(request);
        if let Some(key) = self.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            req = req.header("X-API-KEY", key);
        }
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                url,
            });
        }
        let body = resp.text().await?;
        parse_prepare_response(&body)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProofRequest<'a> {
    voting_round_id: u64,
    request_bytes: &'a str,
}

#[derive(Debug, Deserialize)]
struct RawProofResponse {
    response_hex: String,
    #[serde(default)]
    proof: Vec<String>,
}

/// Parses a proof in the DA layer's `{response_hex, proof}` shape.
pub fn parse_proof_json(body: &str) -> Result<Proof, ClientError> {
    let raw: RawProofResponse =
        serde_json::from_str(body).map_err(|e| ClientError::Decode(e.to_string()))?;
    let response_bytes =
        Bytes::from_str(&raw.response_hex).map_err(|e| ClientError::Decode(e.to_string()))?;
    let data = decode_response(&response_bytes)?;
    let merkle_proof = raw
        .proof
        .iter()
        .map(|p| B256::from_str(p).map_err(|e| ClientError::Decode(e.to_string())))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Proof {
        data,
        merkleProof: merkle_proof,
    })
}

/// Renders a proof in the shape [`parse_proof_json`] reads.
pub fn proof_json(proof: &Proof) -> serde_json::Value {
    serde_json::json!({
        "response_hex": format!("0x{}", hex::encode(proof.data.abi_encode())),
        "proof": proof
            .merkleProof
            .iter()
            .map(|p| format!("{p:#x}"))
            .collect::<Vec<_>>(),
    })
}

/// Reads finalized attestation responses and their Merkle proofs.
#[derive(Debug, Clone)]
pub struct DaLayerClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl DaLayerClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.to_string(),
            api_key,
            client: http_client(),
        }
    }

    pub async fn proof_by_request_round(
        &self,
        voting_round: u64,
        request_bytes: &Bytes,
    ) -> Result<Option<Proof>, ClientError> {
        let url = endpoint_url(&self.base_url, "/api/v1/fdc/proof-by-request-round-raw");
        let request_hex = format!("0x{}", hex::encode(request_bytes));
        let body = ProofRequest {
            voting_round_id: voting_round,
            request_bytes: &request_hex,
        };
        let mut req = self.client.post(&url).json(&body);
        if let Some(key) = self.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            req = req.header("X-API-KEY", key);
        }
        let resp = req.send().await?;
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            debug!(voting_round, %status, "proof not yet available");
            return Ok(None);
        }
        if status == reqwest::StatusCode::BAD_REQUEST {
            let body = resp.text().await?;
            debug!(voting_round, %status, body = %body, "data availability layer answered 400");
            if reports_not_ready(&body) {
                return Ok(None);
            }
            return Err(ClientError::DaLayer(body));
        }
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                url,
            });
        }
        let text = resp.text().await?;
        parse_proof_json(&text).map(Some)
    }
}

/// Whether a 400 body from the DA layer means the round is not finalized yet, as opposed to a
/// request it will never serve.
pub fn reports_not_ready(body: &str) -> bool {
    const NOT_READY: [&str; 4] = ["not found", "not finalized", "not yet", "not available"];
    let body = body.to_ascii_lowercase();
    NOT_READY.iter().any(|phrase| body.contains(phrase))
}

#[async_trait]
impl ProofSource for DaLayerClient {
    async fn fetch_proof(&self, query: &ProofQuery) -> Result<Option<Proof>, ClientError> {
        self.proof_by_request_round(query.voting_round, &query.request_bytes)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attestation::{tweet_response, TweetAttestation};

    #[test]
    fn voting_round_arithmetic() {
        let start = COSTON2_FIRST_VOTING_ROUND_START_TS;
        assert_eq!(voting_round_at(start, start, 90), 0);
        assert_eq!(voting_round_at(start + 89, start, 90), 0);
        assert_eq!(voting_round_at(start + 90, start, 90), 1);
        assert_eq!(voting_round_at(0, start, 90), 0);
    }

    #[test]
    fn bad_request_bodies_are_classified() {
        assert!(reports_not_ready(r#"{"error":"attestation request not found"}"#));
        assert!(reports_not_ready("Voting round 1023 NOT FINALIZED"));
        assert!(!reports_not_ready(r#"{"error":"invalid requestBytes: odd length hex"}"#));
        assert!(!reports_not_ready(""));
        assert!(!ClientError::DaLayer("invalid requestBytes".into()).is_transient());
    }

    #[test]
    fn prepare_response_parsing() {
        let ok = parse_prepare_response(r#"{"status":"VALID","abiEncodedRequest":"0x0102"}"#);
        assert_eq!(ok.unwrap(), Bytes::from(vec![1u8, 2]));

        let invalid = parse_prepare_response(r#"{"status":"INVALID: url not allowed"}"#);
        assert!(matches!(invalid, Err(ClientError::Verifier(s)) if s.starts_with("INVALID")));
    }

    #[test]
    fn proof_response_parsing() {
        let payload = TweetAttestation {
            tweetId: "10".into(),
            authorId: "20".into(),
            text: "hello".into(),
        };
        let response = tweet_response(&payload, B256::repeat_byte(3));
        let sibling = B256::repeat_byte(0xee);
        let body = serde_json::json!({
            "response_hex": format!("0x{}", hex::encode(response.abi_encode())),
            "attestation_type": format!("{:#x}", response.attestationType),
            "proof": [format!("{sibling:#x}")],
        })
        .to_string();

        let proof = parse_proof_json(&body).unwrap();
        assert_eq!(proof.data, response);
        assert_eq!(proof.merkleProof, vec![sibling]);
    }

    #[test]
    fn saved_proofs_read_back() {
        let payload = TweetAttestation {
            tweetId: "11".into(),
            authorId: "22".into(),
            text: "saved".into(),
        };
        let proof = Proof {
            data: tweet_response(&payload, B256::ZERO),
            merkleProof: vec![B256::repeat_byte(1), B256::repeat_byte(2)],
        };
        let text = proof_json(&proof).to_string();
        assert_eq!(parse_proof_json(&text).unwrap(), proof);
    }

    #[test]
    fn proof_response_with_bad_hex_is_a_decode_error() {
        let err = parse_proof_json(r#"{"response_hex":"0xzz","proof":[]}"#).unwrap_err();
        assert!(matches!(err, ClientError::Decode(_)));
    }

    #[test]
    fn endpoint_joining() {
        assert_eq!(endpoint_url("http://x/", "/a/b"), "http://x/a/b");
    }
}
