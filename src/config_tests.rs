//! Tests for configuration

#[cfg(test)]
mod tests {
    use super::super::config::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.polymarket.clob_url, "https://clob.polymarket.com");
        assert_eq!(config.polymarket.gamma_url, "https://gamma-api.polymarket.com");
        assert_eq!(config.polymarket.chain_id, 137);
        assert!(config.polymarket.private_key.is_none());
        assert!(config.llm.is_none());
        assert_eq!(config.database.path, "data/polyclaw.db");
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_polymarket_config() {
        let toml_str = r#"
clob_url = "https://clob.polymarket.com"
gamma_url = "https://gamma-api.polymarket.com"
private_key = "abc123"
chain_id = 137
signature_type = 0
"#;
        let config: PolymarketConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.private_key, Some("abc123".to_string()));
        assert_eq!(config.signature_type, 0);
        assert!(config.funder_address.is_none());
        assert_eq!(config.data_url, "https://data-api.polymarket.com");
    }

    #[test]
    fn test_polymarket_config_with_credentials() {
        let toml_str = r#"
private_key = "abc123"
funder_address = "0x123456"
signature_type = 1
api_key = "key"
api_secret = "c2VjcmV0"
api_passphrase = "pass"
"#;
        let config: PolymarketConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.funder_address, Some("0x123456".to_string()));
        assert_eq!(config.signature_type, 1);
        assert_eq!(config.api_key.as_deref(), Some("key"));
        assert_eq!(config.api_passphrase.as_deref(), Some("pass"));
    }

    #[test]
    fn test_llm_config_defaults_to_anthropic() {
        let toml_str = r#"
api_key = "sk-ant-xxx"
"#;
        let config: LlmConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.provider, "anthropic");
        assert_eq!(config.max_tokens, 4000);
        assert!(config.model.is_none());
    }

    #[test]
    fn test_llm_config_ollama() {
        let toml_str = r#"
provider = "ollama"
"#;
        let config: LlmConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.provider, "ollama");
        assert_eq!(config.api_key, "");
    }

    #[test]
    fn test_execution_config_defaults() {
        let config: ExecutionConfig = toml::from_str("").unwrap();
        assert_eq!(config.transports, vec!["relay", "proxy", "direct"]);
        assert!(config.relay_url.is_none());
    }

    #[test]
    fn test_execution_config_custom_order() {
        let toml_str = r#"
transports = ["direct", "relay"]
relay_url = "https://relay.example.com"
relay_secret = "s3cret"
"#;
        let config: ExecutionConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.transports, vec!["direct", "relay"]);
        assert_eq!(config.relay_secret.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_ideation_config_defaults() {
        let config = IdeationConfig::default();
        assert_eq!(config.min_liquidity, dec!(15000));
        assert_eq!(config.market_limit, 15);
        assert_eq!(config.default_bankroll, dec!(100));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[database]
path = "/tmp/bets.db"

[server]
port = 9090
"#
        )
        .unwrap();

        let config = Config::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.database.path, "/tmp/bets.db");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
    }
}
