// Loading configuration files from disk
use std::io::Write;
use x_verification::config::{AppConfig, HARDHAT_DEV_KEY};
use x_verification::error::ConfigError;

#[cfg(test)]
mod config_tests {
    use super::*;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_shipped_coston2_config_parses() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/configs/coston2.toml");
        let text = std::fs::read_to_string(path).unwrap();
        let cfg = AppConfig::from_toml_str(&text, None, |var| match var {
            "PRIVATE_KEY" => Some("your_wallet_private_key".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(cfg.network.name, "coston2");
        assert_eq!(cfg.network.chain_id, 114);
        assert!(cfg.contract.address.is_some());
        assert!(cfg.signing_key().is_err());
    }

    #[test]
    fn test_hardhat_file_with_local_contract() {
        let file = write_config(
            r#"
            [network]
            name = "hardhat"

            [contract]
            address = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
            fee = "0.01"

            [attestation]
            poll_interval_secs = 2
            timeout_secs = 30
            "#,
        );
        let cfg = AppConfig::load(Some(file.path()), None).unwrap();
        assert_eq!(cfg.network.chain_id, 31337);
        assert_eq!(cfg.contract.fee.to_string(), "10000000000000000");
        assert_eq!(cfg.attestation.poll.interval.as_secs(), 2);
        assert_eq!(cfg.attestation.poll.timeout.as_secs(), 30);
        if std::env::var("PRIVATE_KEY").is_err() {
            assert_eq!(cfg.signing_key().unwrap(), HARDHAT_DEV_KEY);
        }
    }

    #[test]
    fn test_missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = AppConfig::load(Some(&missing), Some("hardhat")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains("nope.toml"));
    }

    #[test]
    fn test_malformed_toml_is_a_parse_error() {
        let file = write_config("[network\nname = ");
        let err = AppConfig::load(Some(file.path()), None).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
