use std::time::Duration;

/// Engine configuration
///
/// # Environment variables
///
/// All fields can be overridden through environment variables:
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | NODE_URL | http://localhost:9009 | Node JSON-RPC endpoint |
/// | NODE_API_KEY | (none) | Node api key sent with every RPC call |
/// | FLIP_MAX_SIZE | 1048576 | Per-payload hex size limit in bytes (1 MiB) |
/// | RECONCILE_INTERVAL_MS | 10000 | Delay between pending-tx lookups |
/// | EPOCH_CHECK_INTERVAL_MS | 60000 | Delay between epoch observer polls |
///
/// # Example
///
/// ```ignore
/// NODE_URL=http://10.0.0.2:9009 RECONCILE_INTERVAL_MS=5000 cargo run
/// ```
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Node JSON-RPC endpoint
    pub node_url: String,
    /// Node api key, if the node requires one
    pub node_api_key: Option<String>,
    /// Per-payload size limit; submit rejects flips whose combined
    /// public + private hex exceeds twice this value
    pub flip_max_size: usize,
    /// How often the reconcile worker re-checks pending transactions
    pub reconcile_interval: Duration,
    /// How often the epoch watcher polls the epoch observer
    pub epoch_check_interval: Duration,
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        Self {
            node_url: std::env::var("NODE_URL")
                .unwrap_or_else(|_| "http://localhost:9009".into()),
            node_api_key: std::env::var("NODE_API_KEY").ok(),
            flip_max_size: std::env::var("FLIP_MAX_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1024 * 1024),
            reconcile_interval: Duration::from_millis(
                std::env::var("RECONCILE_INTERVAL_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10_000),
            ),
            epoch_check_interval: Duration::from_millis(
                std::env::var("EPOCH_CHECK_INTERVAL_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(60_000),
            ),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
