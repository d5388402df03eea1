// End-to-end verification scenarios against the in-process contract and oracle
use alloy_primitives::{Address, B256, U256};
use std::time::Duration;
use x_verification::attestation::{Proof, TweetAttestation};
use x_verification::chain::{LocalContract, VerificationContract};
use x_verification::error::{ClientError, FlowError, RegistryError};
use x_verification::flow::{run_verification, Method, RunOptions, Session, Stage, Step, StepStatus};
use x_verification::poll::{await_proof, PollPolicy, ProofQuery};
use x_verification::registry::{DEFAULT_VERIFICATION_FEE, RESTRICTED_FUNCTION_RESULT};
use x_verification::social::{
    verification_tweet_text, HandleResolver, StaticResolver, TweetId, TweetRef, TwitterHandle,
};
use x_verification::{LocalOracle, VerificationRegistry};

#[cfg(test)]
mod verification_flow_tests {
    use super::*;

    const ALICE_ID: &str = "12345";

    struct Actor {
        wallet: Address,
        contract: LocalContract,
    }

    struct World {
        alice: Actor,
        bob: Actor,
    }

    fn fee() -> U256 {
        U256::from(DEFAULT_VERIFICATION_FEE)
    }

    fn one_ether() -> U256 {
        U256::from(10u64).pow(U256::from(18))
    }

    fn fast() -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(5),
            timeout: Duration::from_secs(5),
        }
    }

    async fn world() -> World {
        let alice = Address::repeat_byte(0xa1);
        let bob = Address::repeat_byte(0xb0);
        let registry = VerificationRegistry::new(
            Address::repeat_byte(0x01),
            Address::repeat_byte(0x02),
            Address::repeat_byte(0x03),
            fee(),
        );
        let contract = LocalContract::new(registry, LocalOracle::new().with_finalize_delay(1), alice);
        contract.fund(alice, one_ether()).await;
        contract.fund(bob, one_ether()).await;
        World {
            alice: Actor {
                wallet: alice,
                contract: contract.clone(),
            },
            bob: Actor {
                wallet: bob,
                contract: contract.as_account(bob),
            },
        }
    }

    async fn post(actor: &Actor, tweet_id: &str, author: &str, text: String) {
        actor
            .contract
            .publish_tweet(TweetAttestation {
                tweetId: tweet_id.into(),
                authorId: author.into(),
                text,
            })
            .await;
    }

    /// Requests verification and waits for the local oracle to finalize the round.
    async fn request_and_attest(actor: &Actor, tweet_id: &str, twitter_id: &str) -> (B256, Proof) {
        let receipt = actor
            .contract
            .request_verification(&tweet_id.parse().unwrap(), &twitter_id.parse().unwrap(), fee())
            .await
            .unwrap();
        let query = ProofQuery {
            request_id: receipt.request_id,
            voting_round: 0,
            request_bytes: Default::default(),
        };
        let proof = await_proof(&actor.contract, &query, fast()).await.unwrap();
        (receipt.request_id, proof)
    }

    #[tokio::test]
    async fn test_wizard_session_verifies_wallet() {
        let w = world().await;
        post(&w.alice, "1001", ALICE_ID, verification_tweet_text(&w.alice.wallet)).await;

        let mut session = Session::new();
        session.connect_wallet(&w.alice.wallet.to_string()).unwrap();
        session.choose_method(Method::Tweet).unwrap();
        session
            .prepare(
                TweetRef::parse("https://twitter.com/alice/status/1001").unwrap(),
                ALICE_ID.parse().unwrap(),
            )
            .unwrap();

        let options = RunOptions {
            poll: fast(),
            ..RunOptions::default()
        };
        let outcome = run_verification(&w.alice.contract, &w.alice.contract, None, &mut session, &options)
            .await
            .unwrap();
        println!("✅ verified {} as {}", w.alice.wallet, outcome.twitter_id);

        assert_eq!(session.stage(), Stage::Complete);
        assert_eq!(outcome.twitter_id, ALICE_ID);
        assert_ne!(outcome.request_tx, outcome.submit_tx);
        assert_eq!(
            w.alice.contract.request_id_to_user(outcome.request_id).await.unwrap(),
            w.alice.wallet
        );
        assert_eq!(
            w.alice.contract.request_id_to_tweet_id(outcome.request_id).await.unwrap(),
            "1001"
        );
        assert_eq!(
            w.alice.contract.restricted_function().await.unwrap(),
            RESTRICTED_FUNCTION_RESULT
        );
        assert_eq!(
            w.alice.contract.balance(w.alice.wallet).await.unwrap(),
            one_ether() - fee()
        );
        assert_eq!(w.alice.contract.collected_fees().await, fee());
    }

    #[tokio::test]
    async fn test_unverified_wallet_is_locked_out() {
        let w = world().await;
        assert!(!w.bob.contract.is_user_verified(w.bob.wallet).await.unwrap());

        let err = w.bob.contract.restricted_function().await.unwrap_err();
        assert!(matches!(err, ClientError::Registry(RegistryError::UserNotVerified)));
        assert_eq!(err.to_string(), "User not verified");

        let err = w.bob.contract.get_user_twitter_id(w.bob.wallet).await.unwrap_err();
        assert_eq!(err.to_string(), "User not verified");
    }

    #[tokio::test]
    async fn test_twitter_id_cannot_be_claimed_twice() {
        let w = world().await;
        post(&w.alice, "2001", ALICE_ID, verification_tweet_text(&w.alice.wallet)).await;
        let (request_id, proof) = request_and_attest(&w.alice, "2001", ALICE_ID).await;
        w.alice.contract.submit_verification(request_id, proof).await.unwrap();

        // Same author id, but the tweet names bob's wallet.
        post(&w.bob, "2002", ALICE_ID, verification_tweet_text(&w.bob.wallet)).await;
        let (request_id, proof) = request_and_attest(&w.bob, "2002", ALICE_ID).await;
        let err = w.bob.contract.submit_verification(request_id, proof).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Registry(RegistryError::TwitterIdTaken(holder)) if holder == w.alice.wallet
        ));

        // Once alice revokes, bob can take the id.
        w.alice.contract.revoke_verification().await.unwrap();
        assert!(!w.alice.contract.is_user_verified(w.alice.wallet).await.unwrap());
        let (request_id, proof) = request_and_attest(&w.bob, "2002", ALICE_ID).await;
        w.bob.contract.submit_verification(request_id, proof).await.unwrap();
        assert_eq!(
            w.bob.contract.get_user_twitter_id(w.bob.wallet).await.unwrap(),
            ALICE_ID
        );
    }

    #[tokio::test]
    async fn test_only_requester_can_submit() {
        let w = world().await;
        post(&w.alice, "3001", ALICE_ID, verification_tweet_text(&w.alice.wallet)).await;
        let (request_id, proof) = request_and_attest(&w.alice, "3001", ALICE_ID).await;

        let err = w.bob.contract.submit_verification(request_id, proof.clone()).await.unwrap_err();
        assert!(matches!(err, ClientError::Registry(RegistryError::NotRequester)));

        w.alice.contract.submit_verification(request_id, proof).await.unwrap();
    }

    #[tokio::test]
    async fn test_tampered_attestation_is_rejected() {
        let w = world().await;
        post(&w.alice, "4001", ALICE_ID, verification_tweet_text(&w.alice.wallet)).await;
        let (request_id, mut proof) = request_and_attest(&w.alice, "4001", ALICE_ID).await;

        proof.data.messageIntegrityCode = B256::repeat_byte(0xff);
        let err = w.alice.contract.submit_verification(request_id, proof).await.unwrap_err();
        assert!(matches!(err, ClientError::Registry(RegistryError::InvalidProof)));
        assert!(!w.alice.contract.is_user_verified(w.alice.wallet).await.unwrap());
    }

    #[tokio::test]
    async fn test_tweet_without_wallet_fails_at_proof_step() {
        let w = world().await;
        post(&w.alice, "5001", ALICE_ID, "just vibes #Web3Verification".to_string()).await;

        let mut session = Session::new();
        session.connect_wallet(&w.alice.wallet.to_string()).unwrap();
        session.choose_method(Method::Tweet).unwrap();
        session
            .prepare(TweetRef::parse("5001").unwrap(), ALICE_ID.parse().unwrap())
            .unwrap();
        let options = RunOptions {
            poll: fast(),
            ..RunOptions::default()
        };
        let err = run_verification(&w.alice.contract, &w.alice.contract, None, &mut session, &options)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FlowError::Client(ClientError::Registry(RegistryError::WalletNotMentioned(_)))
        ));
        assert_eq!(session.progress().get(Step::Submit), StepStatus::Completed);
        assert_eq!(session.progress().get(Step::Fdc), StepStatus::Completed);
        assert_eq!(session.progress().get(Step::Proof), StepStatus::Failed);
        assert_eq!(session.stage(), Stage::AwaitCompletion);
    }

    #[tokio::test]
    async fn test_missing_tweet_fails_attestation() {
        let w = world().await;
        let mut session = Session::new();
        session.connect_wallet(&w.alice.wallet.to_string()).unwrap();
        session.choose_method(Method::Tweet).unwrap();
        session
            .prepare(TweetRef::parse("6001").unwrap(), ALICE_ID.parse().unwrap())
            .unwrap();
        let options = RunOptions {
            poll: fast(),
            ..RunOptions::default()
        };
        let err = run_verification(&w.alice.contract, &w.alice.contract, None, &mut session, &options)
            .await
            .unwrap_err();

        assert!(matches!(err, FlowError::Client(ClientError::Verifier(_))));
        assert_eq!(session.failure().map(|(s, _)| s), Some(Step::Fdc));

        session.restart();
        assert_eq!(session.stage(), Stage::ConnectWallet);
        assert_eq!(session.wallet(), Some(w.alice.wallet));
    }

    #[tokio::test]
    async fn test_underpaid_request_is_rejected() {
        let w = world().await;
        let tweet: TweetId = "7001".parse().unwrap();
        let err = w
            .alice
            .contract
            .request_verification(&tweet, &ALICE_ID.parse().unwrap(), fee() - U256::from(1u64))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::Registry(RegistryError::InsufficientFee { .. })
        ));
        assert_eq!(w.alice.contract.balance(w.alice.wallet).await.unwrap(), one_ether());
    }

    #[test]
    fn test_static_resolver_blocking() {
        let handle: TwitterHandle = "@Alice_Crypto".parse().unwrap();
        let resolver = StaticResolver::new().with(&handle, ALICE_ID.parse().unwrap());
        let lower: TwitterHandle = "alice_crypto".parse().unwrap();
        let id = tokio_test::block_on(resolver.resolve(&lower)).unwrap();
        assert_eq!(id.as_str(), ALICE_ID);
    }
}
