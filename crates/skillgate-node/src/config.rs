//! Node configuration, sourced from flags or environment.

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "SkillGate license & reputation gateway")]
pub struct Settings {
    #[arg(long, env = "SERVER_PORT", default_value_t = 8080)]
    pub server_port: u16,
    #[arg(long, env = "CHAIN_ID", default_value_t = 11155111)]
    pub chain_id: u64,
    #[arg(long, env = "LICENSE_NFT_ADDRESS", default_value = "")]
    pub license_nft_address: String,
    #[arg(long, env = "SIGNER_PRIVATE_KEY", default_value = "")]
    pub signer_private_key: String,
    /// Opaque value mixed into free-tier provenance digests.
    #[arg(long, env = "SIGNATURE_NONCE", default_value = "default-nonce")]
    pub signature_nonce: String,
    /// Requests per minute per client.
    #[arg(long, env = "RATE_LIMIT", default_value_t = 100)]
    pub rate_limit: i64,
    /// KV store sweep interval; 0 disables the sweeper.
    #[arg(long, env = "CLEANUP_INTERVAL_SECS", default_value_t = 300)]
    pub cleanup_interval_secs: u64,
    #[arg(long, env = "BATCH_INTERVAL_SECS", default_value_t = 300)]
    pub batch_interval_secs: u64,
    /// Reputation cache TTL in seconds.
    #[arg(long, env = "CACHE_TTL", default_value_t = 60)]
    pub cache_ttl_secs: u64,
    #[arg(long, env = "ENABLE_BLOCKCHAIN", default_value_t = false)]
    pub enable_blockchain: bool,
    #[arg(long, env = "ETH_NODE_URL", default_value = "")]
    pub eth_node_url: String,
}
