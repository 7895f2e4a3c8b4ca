use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the db-service gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Hostname or IP address of the OpenSearch node.
    pub opensearch_address: String,
    /// REST port of the OpenSearch node.
    pub opensearch_port: u16,
    /// URL scheme used to reach OpenSearch (`https` for the security plugin).
    pub opensearch_scheme: String,
    /// Basic-auth user sent with every OpenSearch request.
    pub opensearch_username: String,
    /// Basic-auth password; requests are unauthenticated when absent.
    pub opensearch_password: Option<String>,
    /// Whether TLS certificates presented by OpenSearch are verified.
    pub opensearch_verify_certs: bool,
    /// Directory holding `cluster-settings.json` and `knn-index.json`.
    pub opensearch_config_dir: PathBuf,
    /// Name of the pretrained model registered with ML Commons.
    pub model_url: String,
    /// Version string submitted when registering the model.
    pub model_version: String,
    /// Model group that owns the registered model.
    pub model_group_name: String,
    /// Identifier of the text-embedding ingest pipeline.
    pub pipeline_name: String,
    /// Delay between two status polls while a model registers.
    pub provision_poll_interval_secs: u64,
    /// Upper bound on the time spent waiting for a registration to finish.
    pub provision_timeout_secs: u64,
    /// Delay applied after a failed status poll.
    pub provision_retry_backoff_secs: u64,
    /// Number of neighbours requested by neural searches.
    pub search_top_k: usize,
    /// Interface the HTTP listener binds to.
    pub server_host: String,
    /// Port the HTTP listener binds to.
    pub server_port: u16,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            opensearch_address: load_env("OPENSEARCH_ADDRESS")?,
            opensearch_port: parse_env_or("OPENSEARCH_PORT", 9200)?,
            opensearch_scheme: load_env_or("OPENSEARCH_SCHEME", "https"),
            opensearch_username: load_env_or("OPENSEARCH_USERNAME", "admin"),
            opensearch_password: load_env_optional("OPENSEARCH_INITIAL_ADMIN_PASSWORD"),
            opensearch_verify_certs: parse_env_or("OPENSEARCH_VERIFY_CERTS", false)?,
            opensearch_config_dir: PathBuf::from(load_env_or(
                "OPENSEARCH_CONFIG_DIR",
                "opensearch-config",
            )),
            model_url: load_env_or(
                "MODEL_URL",
                "huggingface/sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2",
            ),
            model_version: load_env_or("MODEL_VERSION", "1.0.1"),
            model_group_name: load_env_or("MODEL_GROUP_NAME", "Model group"),
            pipeline_name: load_env_or("PIPELINE_NAME", "ingest-pipeline"),
            provision_poll_interval_secs: parse_env_or("PROVISION_POLL_INTERVAL_SECS", 5)?,
            provision_timeout_secs: parse_env_or("PROVISION_TIMEOUT_SECS", 60_000)?,
            provision_retry_backoff_secs: parse_env_or("PROVISION_RETRY_BACKOFF_SECS", 10)?,
            search_top_k: parse_env_or("SEARCH_TOP_K", 3)?,
            server_host: load_env_or("SERVER_HOST", "0.0.0.0"),
            server_port: parse_env_or("SERVER_PORT", 5700)?,
        })
    }

    /// Base URL of the OpenSearch REST API.
    pub fn opensearch_url(&self) -> String {
        format!(
            "{}://{}:{}",
            self.opensearch_scheme, self.opensearch_address, self.opensearch_port
        )
    }

    /// Path of the cluster settings template applied during provisioning.
    pub fn cluster_settings_path(&self) -> PathBuf {
        self.opensearch_config_dir.join("cluster-settings.json")
    }

    /// Path of the k-NN index template used for per-user indices.
    pub fn knn_index_path(&self) -> PathBuf {
        self.opensearch_config_dir.join("knn-index.json")
    }

    /// Interval between provisioning status polls.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.provision_poll_interval_secs)
    }

    /// Overall bound on provisioning status polling.
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.provision_timeout_secs)
    }

    /// Backoff applied after a failed provisioning poll.
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.provision_retry_backoff_secs)
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    load_env_optional(key).ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn load_env_or(key: &str, default: &str) -> String {
    load_env_optional(key).unwrap_or_else(|| default.to_string())
}

fn parse_env_or<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match load_env_optional(key) {
        Some(value) => parse_value(key, &value),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(key.to_string()))
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        opensearch_url = %config.opensearch_url(),
        verify_certs = config.opensearch_verify_certs,
        config_dir = %config.opensearch_config_dir.display(),
        model = %config.model_url,
        server_port = config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}
