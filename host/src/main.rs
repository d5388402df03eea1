// x-verify: link a wallet to a Twitter/X account through the XVerification contract.
// Talks to the contract through an alloy provider and to the FDC verifier and DA layer over HTTP.

use alloy_primitives::utils::format_ether;
use alloy_primitives::{Address, B256, U256};
use alloy_signer_local::PrivateKeySigner;
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use x_verification::attestation::TweetAttestation;
use url::Url;
use x_verification::chain::TxSettings;
use x_verification::config::{
    AppConfig, COSTON2_FDC_HUB, COSTON2_FDC_VERIFICATION, HARDHAT_DEV_KEY,
};
use x_verification::da_layer::{
    parse_proof_json, proof_json, voting_round_at, DaLayerClient, VerifierClient,
};
use x_verification::flow::{
    attestation_request_bytes, resolve_twitter_id, run_verification, Method, RunOptions, Session,
    Step,
};
use x_verification::poll::{await_proof, PollPolicy, ProofQuery};
use x_verification::registry::DEFAULT_VERIFICATION_FEE;
use x_verification::social::{
    parse_wallet_address, verification_tweet_text, HandleResolver, StaticResolver, TweetRef,
    TwitterApiResolver, TwitterHandle, TwitterUserId,
};
use x_verification::{
    LocalContract, LocalOracle, RpcContract, VerificationContract, VerificationRegistry,
};

#[derive(Parser)]
#[command(name = "x-verify", version, about = "Verify a Twitter/X account for a wallet on Flare")]
struct Cli {
    /// TOML config file
    #[arg(long, global = true, env = "X_VERIFY_CONFIG")]
    config: Option<PathBuf>,

    /// Network profile: hardhat, coston or coston2
    #[arg(long, global = true, env = "NETWORK")]
    network: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show contract wiring and a wallet's verification status
    Status {
        #[arg(long)]
        wallet: Option<String>,
    },
    /// Print the tweet to post for a wallet
    Tweet {
        #[arg(long)]
        wallet: Option<String>,
    },
    /// Send requestVerification and pay the fee
    Request(TweetArgs),
    /// Wait for the attestation proof of a request and save it
    AwaitProof {
        #[arg(long)]
        request_id: B256,
        /// Tweet URL or id the request was made for
        #[arg(long)]
        tweet: String,
        /// Voting round of the request transaction
        #[arg(long)]
        round: u64,
        #[arg(long, default_value = "proof.json")]
        out: PathBuf,
    },
    /// Submit a saved proof with submitVerification
    Submit {
        #[arg(long)]
        request_id: B256,
        #[arg(long, default_value = "proof.json")]
        proof: PathBuf,
    },
    /// Remove the signer's verification
    Revoke,
    /// Request, await the attestation and submit the proof in one go
    Verify(TweetArgs),
    /// Run the whole protocol offline against an in-process contract and oracle
    Demo {
        #[arg(long, default_value = "1790000000000000001")]
        tweet_id: String,
        #[arg(long, default_value = "1234567890")]
        twitter_id: String,
        /// Post a tweet that omits the wallet, to watch verification fail
        #[arg(long)]
        omit_wallet: bool,
    },
    /// Print the resolved configuration with secrets masked
    Config,
}

#[derive(Args)]
struct TweetArgs {
    /// Tweet URL (https://x.com/<handle>/status/<id>) or bare tweet id
    #[arg(long)]
    tweet: String,

    /// Numeric Twitter user id of the tweet's author
    #[arg(long)]
    twitter_id: Option<TwitterUserId>,

    /// Author handle, resolved through the Twitter API when no id is given
    #[arg(long)]
    handle: Option<TwitterHandle>,

    /// Verification method; only `tweet` is supported
    #[arg(long, default_value = "tweet")]
    method: Method,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let cfg = AppConfig::load(cli.config.as_deref(), cli.network.as_deref())
        .context("loading configuration")?;

    match cli.command {
        Command::Status { wallet } => status(&cfg, wallet.as_deref()).await,
        Command::Tweet { wallet } => tweet(&cfg, wallet.as_deref()),
        Command::Request(args) => request(&cfg, &args).await,
        Command::AwaitProof {
            request_id,
            tweet,
            round,
            out,
        } => await_proof_cmd(&cfg, request_id, &tweet, round, &out).await,
        Command::Submit { request_id, proof } => submit(&cfg, request_id, &proof).await,
        Command::Revoke => revoke(&cfg).await,
        Command::Verify(args) => verify(&cfg, &args).await,
        Command::Demo {
            tweet_id,
            twitter_id,
            omit_wallet,
        } => demo(&tweet_id, &twitter_id, omit_wallet).await,
        Command::Config => {
            println!("=== Configuration ===");
            for (key, value) in cfg.describe() {
                println!("{key:<22} {value}");
            }
            Ok(())
        }
    }
}

fn signer(cfg: &AppConfig) -> Result<PrivateKeySigner> {
    let key = cfg.signing_key()?;
    PrivateKeySigner::from_str(&key).context("parsing private key")
}

fn rpc_url(cfg: &AppConfig) -> Result<Url> {
    Url::parse(&cfg.network.rpc_url).with_context(|| format!("invalid rpc url {}", cfg.network.rpc_url))
}

async fn check_chain(cfg: &AppConfig, contract: &RpcContract) -> Result<()> {
    let chain_id = contract
        .chain_id()
        .await
        .with_context(|| format!("connecting to {}", cfg.network.rpc_url))?;
    if chain_id != cfg.network.chain_id {
        bail!(
            "node at {} reports chain id {chain_id}, expected {} ({})",
            cfg.network.rpc_url,
            cfg.network.chain_id,
            cfg.network.name
        );
    }
    info!(
        network = %cfg.network.name,
        contract = %contract.address(),
        sender = %contract.sender(),
        signing = contract.can_sign(),
        "connected"
    );
    Ok(())
}

async fn connect(cfg: &AppConfig) -> Result<RpcContract> {
    let contract = RpcContract::with_signer(
        &rpc_url(cfg)?,
        cfg.contract_address()?,
        signer(cfg)?,
        TxSettings::default(),
    );
    check_chain(cfg, &contract).await?;
    Ok(contract)
}

/// Connection for views; needs no private key.
async fn connect_read_only(cfg: &AppConfig, viewer: Address) -> Result<RpcContract> {
    let contract = RpcContract::read_only(
        &rpc_url(cfg)?,
        cfg.contract_address()?,
        viewer,
        TxSettings::default(),
    );
    check_chain(cfg, &contract).await?;
    Ok(contract)
}

fn wallet_or_signer(cfg: &AppConfig, wallet: Option<&str>) -> Result<Address> {
    match wallet {
        Some(w) => Ok(parse_wallet_address(w)?),
        None => Ok(signer(cfg)?.address()),
    }
}

fn resolver(cfg: &AppConfig) -> Box<dyn HandleResolver> {
    match &cfg.twitter.bearer_token {
        Some(token) => Box::new(TwitterApiResolver::new(&cfg.twitter.api_url, token)),
        None => Box::new(StaticResolver::new()),
    }
}

fn ether(amount: U256, cfg: &AppConfig) -> String {
    format!("{} {}", format_ether(amount), cfg.network.currency)
}

fn print_tx(cfg: &AppConfig, label: &str, hash: B256) {
    let hash = format!("{hash:#x}");
    match cfg.network.tx_url(&hash) {
        Some(link) => println!("{label}: {hash}\n  {link}"),
        None => println!("{label}: {hash}"),
    }
}

fn run_options(cfg: &AppConfig) -> RunOptions {
    RunOptions {
        fee: cfg.contract.fee,
        poll: cfg.attestation.poll,
        first_round_start: cfg.attestation.first_voting_round_start,
        epoch_secs: cfg.attestation.voting_epoch_secs,
    }
}

/// Session advanced to the submit stage with the tweet and account id filled in.
async fn prepared_session(cfg: &AppConfig, wallet: Address, args: &TweetArgs) -> Result<Session> {
    let mut session = Session::new();
    session.connect_wallet(&wallet.to_string())?;
    session.choose_method(args.method)?;

    let tweet = TweetRef::parse(&args.tweet)?;
    let handle = args.handle.as_ref().or(tweet.author.as_ref());
    let resolver = resolver(cfg);
    let twitter_id = resolve_twitter_id(resolver.as_ref(), args.twitter_id.clone(), handle)
        .await
        .context("determining the tweet author's user id")?;
    session.prepare(tweet, twitter_id)?;
    Ok(session)
}

async fn status(cfg: &AppConfig, wallet: Option<&str>) -> Result<()> {
    let wallet = wallet_or_signer(cfg, wallet)?;
    let contract = connect_read_only(cfg, wallet).await?;

    println!("=== Contract ===");
    println!("Network:          {} (chain {})", cfg.network.name, cfg.network.chain_id);
    println!("Address:          {}", contract.address());
    if let Some(link) = cfg.network.address_url(&contract.address()) {
        println!("                  {link}");
    }
    println!("Attestation type: {:#x}", contract.attestation_type().await?);
    println!("FDC hub:          {}", contract.fdc_hub().await?);
    println!("FDC verification: {}", contract.fdc_verification().await?);

    println!("\n=== Wallet ===");
    println!("Address:  {wallet}");
    println!("Balance:  {}", ether(contract.balance(wallet).await?, cfg));
    let verified = contract.is_user_verified(wallet).await?;
    println!("Verified: {verified}");
    if verified {
        println!("Twitter:  {}", contract.get_user_twitter_id(wallet).await?);
    }
    match contract.restricted_function().await {
        Ok(msg) => println!("Restricted function: {msg}"),
        Err(e) => println!("Restricted function: {e}"),
    }
    Ok(())
}

fn tweet(cfg: &AppConfig, wallet: Option<&str>) -> Result<()> {
    let wallet = wallet_or_signer(cfg, wallet)?;
    let mut session = Session::new();
    session.connect_wallet(&wallet.to_string())?;

    println!("Post this tweet from the account you want to link:\n");
    println!("  {}\n", session.tweet_text().unwrap_or_default());
    println!("Compose link: {}", session.tweet_intent().unwrap_or_default());
    println!("Then run: x-verify verify --tweet <tweet url> [--twitter-id <id>]");
    Ok(())
}

async fn request(cfg: &AppConfig, args: &TweetArgs) -> Result<()> {
    let contract = connect(cfg).await?;
    let mut session = prepared_session(cfg, contract.sender(), args).await?;
    let prepared = session.begin_submit()?.clone();

    let before = contract.balance(contract.sender()).await?;
    println!("Balance before: {}", ether(before, cfg));
    println!("Fee:            {}", ether(cfg.contract.fee, cfg));

    let receipt = contract
        .request_verification(
            &prepared.tweet.tweet_id,
            &prepared.twitter_id,
            cfg.contract.fee,
        )
        .await?;
    session.record_submission(receipt.request_id, receipt.tx.tx_hash)?;

    let after = contract.balance(contract.sender()).await?;
    println!("Balance after:  {}", ether(after, cfg));
    println!(
        "Spent:          {} (fee + gas, {} gas used)",
        ether(before.saturating_sub(after), cfg),
        receipt.tx.gas_used
    );
    print_tx(cfg, "Transaction", receipt.tx.tx_hash);
    let round = voting_round_at(
        receipt.tx.block_timestamp,
        cfg.attestation.first_voting_round_start,
        cfg.attestation.voting_epoch_secs,
    );
    println!("Request id:     {:#x}", receipt.request_id);
    println!("Voting round:   {round}");
    println!(
        "\nNext: x-verify await-proof --request-id {:#x} --tweet {} --round {round}",
        receipt.request_id, prepared.tweet.tweet_id
    );
    Ok(())
}

async fn await_proof_cmd(
    cfg: &AppConfig,
    request_id: B256,
    tweet: &str,
    round: u64,
    out: &Path,
) -> Result<()> {
    let tweet = TweetRef::parse(tweet)?;
    let verifier = VerifierClient::new(
        &cfg.attestation.verifier_url,
        cfg.attestation.verifier_api_key.clone(),
    );
    let request_bytes = attestation_request_bytes(Some(&verifier), &tweet.tweet_id).await?;
    let da = DaLayerClient::new(
        &cfg.attestation.da_layer_url,
        cfg.attestation.da_layer_api_key.clone(),
    );
    let query = ProofQuery {
        request_id,
        voting_round: round,
        request_bytes,
    };
    println!("Waiting for round {round} to be finalized...");
    let proof = await_proof(&da, &query, cfg.attestation.poll).await?;

    let json = serde_json::to_string_pretty(&proof_json(&proof))?;
    std::fs::write(out, json).with_context(|| format!("writing {}", out.display()))?;
    println!(
        "Proof with {} siblings saved to {}",
        proof.merkleProof.len(),
        out.display()
    );
    Ok(())
}

async fn submit(cfg: &AppConfig, request_id: B256, path: &Path) -> Result<()> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let proof = parse_proof_json(&text)?;
    let contract = connect(cfg).await?;

    let owner = contract.request_id_to_user(request_id).await?;
    if owner != contract.sender() {
        warn!(%owner, sender = %contract.sender(), "request belongs to another account");
    }
    let tx = contract.submit_verification(request_id, proof).await?;
    print_tx(cfg, "Transaction", tx.tx_hash);
    println!(
        "Verified as twitter id {}",
        contract.get_user_twitter_id(contract.sender()).await?
    );
    Ok(())
}

async fn revoke(cfg: &AppConfig) -> Result<()> {
    let contract = connect(cfg).await?;
    let tx = contract.revoke_verification().await?;
    print_tx(cfg, "Transaction", tx.tx_hash);
    println!("Verification for {} revoked", contract.sender());
    Ok(())
}

fn print_progress(session: &Session) {
    for (step, status) in session.progress().iter() {
        println!("  [{status:<10}] {}", step.label());
    }
    if let Some((step, reason)) = session.failure() {
        println!("  {} failed: {reason}", step.label());
    }
}

async fn verify(cfg: &AppConfig, args: &TweetArgs) -> Result<()> {
    let contract = connect(cfg).await?;
    let mut session = prepared_session(cfg, contract.sender(), args).await?;
    let verifier = VerifierClient::new(
        &cfg.attestation.verifier_url,
        cfg.attestation.verifier_api_key.clone(),
    );
    let da = DaLayerClient::new(
        &cfg.attestation.da_layer_url,
        cfg.attestation.da_layer_api_key.clone(),
    );

    let result = run_verification(
        &contract,
        &da,
        Some(&verifier),
        &mut session,
        &run_options(cfg),
    )
    .await;

    println!("=== Verification ===");
    print_progress(&session);
    let outcome = result?;
    print_tx(cfg, "Request tx", outcome.request_tx);
    print_tx(cfg, "Submit tx", outcome.submit_tx);
    println!("Wallet:     {}", contract.sender());
    println!("Twitter id: {}", outcome.twitter_id);
    if let Some(done) = session.completion() {
        println!("Verified:   {}", done.verified_at.to_rfc3339());
    }
    Ok(())
}

async fn demo(tweet_id: &str, twitter_id: &str, omit_wallet: bool) -> Result<()> {
    let wallet = PrivateKeySigner::from_str(HARDHAT_DEV_KEY)
        .context("parsing development key")?
        .address();
    let registry = VerificationRegistry::new(
        wallet,
        parse_wallet_address(COSTON2_FDC_HUB)?,
        parse_wallet_address(COSTON2_FDC_VERIFICATION)?,
        U256::from(DEFAULT_VERIFICATION_FEE),
    );
    let contract = LocalContract::new(registry, LocalOracle::new().with_finalize_delay(2), wallet);
    contract
        .fund(wallet, U256::from(10u64).pow(U256::from(18)))
        .await;

    let text = if omit_wallet {
        "gm from a wallet I will not name".to_string()
    } else {
        verification_tweet_text(&wallet)
    };
    println!("Tweet {tweet_id} by {twitter_id}: {text}\n");
    contract
        .publish_tweet(TweetAttestation {
            tweetId: tweet_id.to_string(),
            authorId: twitter_id.to_string(),
            text,
        })
        .await;

    let mut session = Session::new();
    session.connect_wallet(&wallet.to_string())?;
    session.choose_method(Method::Tweet)?;
    session.prepare(TweetRef::parse(tweet_id)?, twitter_id.parse()?)?;

    let options = RunOptions {
        poll: PollPolicy {
            interval: Duration::from_millis(200),
            max_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(30),
        },
        ..RunOptions::default()
    };
    let result = run_verification(&contract, &contract, None, &mut session, &options).await;

    println!("=== Demo ===");
    print_progress(&session);
    match result {
        Ok(outcome) => {
            println!("Request id:  {:#x}", outcome.request_id);
            println!("Twitter id:  {}", outcome.twitter_id);
            println!("Restricted:  {}", contract.restricted_function().await?);
            println!("Fees held:   {}", format_ether(contract.collected_fees().await));
            contract.revoke_verification().await?;
            println!(
                "After revoke, verified = {}",
                contract.is_user_verified(wallet).await?
            );
        }
        Err(e) => {
            if session.failure().map(|(s, _)| s) != Some(Step::Proof) {
                return Err(e.into());
            }
            println!("Contract rejected the proof: {e}");
        }
    }
    Ok(())
}
