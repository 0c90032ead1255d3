//! Configuration for bucketkv
//!
//! Centralized configuration with sensible defaults.

mod parser;

pub use parser::{ConfigMap, CONFIG_FILE_KEY, MAX_CONFIG_FILE_DEPTH};

use crate::error::Result;

/// Environment variable holding the config used for auto-created default buckets
pub const DEFAULT_BUCKET_CONFIG_ENV: &str = "BUCKETKV_DEFAULT_BUCKET_CONFIG";

/// Main configuration for a bucket supervisor
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Bucket Configuration
    // -------------------------------------------------------------------------
    /// Engine used for auto-created buckets and the unnamed default bucket
    pub engine_path: String,

    /// Identity allowed to run admin commands (none means nobody may)
    pub admin_user: Option<String>,

    /// Load a single unnamed default bucket at startup
    pub default_bucket: bool,

    /// Bind new connections to this named bucket
    pub default_bucket_name: Option<String>,

    /// Create missing buckets on connect/auth
    pub auto_create: bool,

    /// Engine config for buckets created on connect
    pub default_bucket_config: String,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// Connection read timeout (milliseconds, 0 disables)
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds, 0 disables)
    pub write_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine_path: "memory".to_string(),
            admin_user: None,
            default_bucket: false,
            default_bucket_name: None,
            auto_create: true,
            default_bucket_config: std::env::var(DEFAULT_BUCKET_CONFIG_ENV).unwrap_or_default(),
            listen_addr: "127.0.0.1:11211".to_string(),
            max_connections: 1024,
            read_timeout_ms: 0,
            write_timeout_ms: 5000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Build a config from a supervisor config string
    ///
    /// Recognized keys: `engine`, `admin`, `default`, `default_bucket_name`,
    /// `auto_create`, `config_file`. Everything else keeps its default.
    pub fn from_config_str(text: &str) -> Result<Self> {
        let mut config = Config::default();
        config.apply(&ConfigMap::parse_with_files(text)?)?;
        Ok(config)
    }

    /// Overlay recognized keys from a parsed config map
    pub fn apply(&mut self, map: &ConfigMap) -> Result<()> {
        if let Some(engine) = map.string("engine") {
            self.engine_path = engine.to_string();
        }
        if let Some(admin) = map.string("admin") {
            self.admin_user = Some(admin.to_string());
        }
        if let Some(default) = map.bool("default")? {
            self.default_bucket = default;
        }
        if let Some(name) = map.string("default_bucket_name") {
            self.default_bucket_name = Some(name.to_string());
        }
        if let Some(auto_create) = map.bool("auto_create")? {
            self.auto_create = auto_create;
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the engine used for auto-created and default buckets
    pub fn engine_path(mut self, path: impl Into<String>) -> Self {
        self.config.engine_path = path.into();
        self
    }

    /// Set the admin identity
    pub fn admin_user(mut self, user: impl Into<String>) -> Self {
        self.config.admin_user = Some(user.into());
        self
    }

    /// Enable or disable the unnamed default bucket
    pub fn default_bucket(mut self, enabled: bool) -> Self {
        self.config.default_bucket = enabled;
        self
    }

    /// Set the named bucket new connections bind to
    pub fn default_bucket_name(mut self, name: impl Into<String>) -> Self {
        self.config.default_bucket_name = Some(name.into());
        self
    }

    /// Enable or disable auto-creation of buckets
    pub fn auto_create(mut self, enabled: bool) -> Self {
        self.config.auto_create = enabled;
        self
    }

    /// Set the engine config for buckets created on connect
    pub fn default_bucket_config(mut self, config: impl Into<String>) -> Self {
        self.config.default_bucket_config = config.into();
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
