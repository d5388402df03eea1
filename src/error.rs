use crate::flow::{Method, Stage};
use alloy_primitives::{Address, B256, U256};
use thiserror::Error;

/// Input validation failures for tweet/account identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SocialError {
    #[error("invalid wallet address: {0}")]
    InvalidWallet(String),

    #[error("invalid tweet id: {0}")]
    InvalidTweetId(String),

    #[error("invalid twitter user id: {0}")]
    InvalidTwitterId(String),

    #[error("invalid twitter handle: {0}")]
    InvalidHandle(String),

    #[error("not a tweet status url: {0}")]
    NotATweetUrl(String),

    #[error("could not find twitter user id for @{0}")]
    UnknownHandle(String),

    #[error("handle lookup failed: {0}")]
    Lookup(String),
}

/// Revert reasons of the verification contract.
///
/// The `Display` strings are the on-chain `require` messages so that errors coming back from a
/// node and errors raised by the in-process registry read the same.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Insufficient fee: required {required}, provided {provided}")]
    InsufficientFee { required: U256, provided: U256 },

    #[error("Tweet ID required")]
    EmptyTweetId,

    #[error("Twitter ID required")]
    EmptyTwitterId,

    #[error("Invalid tweet ID: {0}")]
    InvalidTweetId(String),

    #[error("Invalid Twitter ID: {0}")]
    InvalidTwitterId(String),

    #[error("Unknown request {0}")]
    UnknownRequest(B256),

    #[error("Only requester can submit")]
    NotRequester,

    #[error("Invalid attestation type")]
    InvalidAttestationType,

    #[error("Invalid proof")]
    InvalidProof,

    #[error("Tweet ID mismatch: expected {expected}, attested {attested}")]
    TweetMismatch { expected: String, attested: String },

    #[error("Twitter ID mismatch: expected {expected}, attested {attested}")]
    AuthorMismatch { expected: String, attested: String },

    #[error("Tweet does not mention wallet {0}")]
    WalletNotMentioned(Address),

    #[error("Twitter ID already linked to {0}")]
    TwitterIdTaken(Address),

    #[error("User not verified")]
    UserNotVerified,

    #[error("Malformed attestation data: {0}")]
    MalformedAttestation(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MerkleError {
    #[error("cannot build a merkle tree without leaves")]
    Empty,

    #[error("leaf {0} is not part of the tree")]
    UnknownLeaf(B256),
}

/// Errors talking to the chain, the verifier or the DA layer.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("http status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("connection has no signer; transactions are unavailable")]
    ReadOnly,

    #[error("execution reverted: {0}")]
    Reverted(String),

    #[error("transaction {0} failed")]
    TxFailed(B256),

    #[error("transaction {0} was not mined in time")]
    TxNotMined(B256),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("signer error: {0}")]
    Signer(String),

    #[error("insufficient funds: balance {balance}, needed {needed}")]
    InsufficientFunds { balance: U256, needed: U256 },

    #[error("timed out after {0:?} waiting for attestation proof")]
    Timeout(std::time::Duration),

    #[error("verifier rejected request: {0}")]
    Verifier(String),

    #[error("data availability layer rejected request: {0}")]
    DaLayer(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Social(#[from] SocialError),
}

impl ClientError {
    /// Transient errors are worth retrying while polling.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ClientError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed reading config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed parsing config toml: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unknown network profile: {0}")]
    UnknownNetwork(String),

    #[error("invalid env ref: {0}")]
    InvalidEnvRef(String),

    #[error("missing env var {var} for {value}")]
    MissingEnv { var: String, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("no valid private key configured for network {0}")]
    MissingPrivateKey(String),
}

/// Failures driving a verification session.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("cannot {action} while at stage {stage:?}")]
    InvalidTransition { stage: Stage, action: &'static str },

    #[error("verification method {0:?} is not supported")]
    UnsupportedMethod(Method),

    #[error("session wallet {session} does not match signing account {signer}")]
    WalletMismatch { session: Address, signer: Address },

    #[error("no twitter user id: pass one explicitly or supply a handle")]
    MissingTwitterId,

    #[error(transparent)]
    Social(#[from] SocialError),

    #[error(transparent)]
    Client(#[from] ClientError),
}
