//! 配置管理模块
//! 支持从环境变量和配置文件加载配置

use std::{path::Path, str::FromStr};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// 适配层配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub token_list: TokenListConfig,
    #[serde(default)]
    pub swap: SwapConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub nft: NftConfig,
}

/// 部署环境，决定后端 API 地址
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Development,
    #[serde(alias = "test")]
    Local,
    Main,
}

impl Environment {
    /// 静态资源 API（价格、网络列表）
    pub fn static_api_url(&self) -> &'static str {
        match self {
            Environment::Production | Environment::Development | Environment::Main => {
                "https://d1fh2pwo7kzely.cloudfront.net"
            }
            Environment::Local => "http://localhost:3000/local",
        }
    }

    /// 业务 API
    pub fn api_url(&self) -> &'static str {
        match self {
            Environment::Production => "https://surtbtej2d.execute-api.us-east-1.amazonaws.com/prod",
            Environment::Development => "https://d1ms6b491qeh6d.cloudfront.net",
            Environment::Local => "http://localhost:3000/local",
            Environment::Main => "https://bo0q5g7ie1.execute-api.us-east-1.amazonaws.com/main",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Development => "development",
            Environment::Local => "local",
            Environment::Main => "main",
        }
    }
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "development" | "dev" => Ok(Environment::Development),
            "local" | "test" => Ok(Environment::Local),
            "main" => Ok(Environment::Main),
            other => anyhow::bail!("Unknown environment: {}", other),
        }
    }
}

/// 后端 API 地址（为空时按环境推导）
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ApiConfig {
    pub api_url: Option<String>,
    pub static_api_url: Option<String>,
}

/// HTTP 客户端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub timeout_ms: u64,
    pub retries: usize,
}

/// 缓存配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub ttl_secs: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "text"
}

/// 代币列表来源（按顺序回退）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenListConfig {
    pub aggregator_url: String,
    pub catalog_url: String,
    pub metadata_batch_size: usize,
}

/// 兑换配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapConfig {
    /// 报价有效期（秒）
    pub quote_validity_secs: u64,
}

/// 跨链桥配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub pending_expiry_hours: i64,
    pub supported_ttl_secs: u64,
}

/// NFT 分页配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NftConfig {
    pub default_page_limit: usize,
    pub max_page_limit: usize,
    pub das_fetch_limit: usize,
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: env_parse("UPSTREAM_TIMEOUT_MS").unwrap_or(10_000),
            retries: env_parse("UPSTREAM_RETRIES").unwrap_or(2),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: env_parse("CACHE_TTL_SECS").unwrap_or(60),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".into()),
        }
    }
}

impl Default for TokenListConfig {
    fn default() -> Self {
        Self {
            aggregator_url: std::env::var("TOKEN_LIST_AGGREGATOR_URL")
                .unwrap_or_else(|_| "https://cache.jup.ag/tokens".into()),
            catalog_url: std::env::var("TOKEN_LIST_CATALOG_URL").unwrap_or_else(|_| {
                "https://cdn.jsdelivr.net/gh/solana-labs/token-list@latest/src/tokens/solana.tokenlist.json"
                    .into()
            }),
            metadata_batch_size: env_parse("TOKEN_METADATA_BATCH_SIZE").unwrap_or(100),
        }
    }
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            quote_validity_secs: env_parse("SWAP_QUOTE_VALIDITY_SECS").unwrap_or(10),
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            pending_expiry_hours: env_parse("BRIDGE_PENDING_EXPIRY_HOURS").unwrap_or(24),
            supported_ttl_secs: env_parse("BRIDGE_SUPPORTED_TTL_SECS").unwrap_or(300),
        }
    }
}

impl Default for NftConfig {
    fn default() -> Self {
        Self {
            default_page_limit: 50,
            max_page_limit: 100,
            das_fetch_limit: 1000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            api: ApiConfig::default(),
            http: HttpConfig::default(),
            cache: CacheConfig::default(),
            logging: LoggingConfig::default(),
            token_list: TokenListConfig::default(),
            swap: SwapConfig::default(),
            bridge: BridgeConfig::default(),
            nft: NftConfig::default(),
        }
    }
}

impl Config {
    /// 从配置文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;

        Ok(config)
    }

    /// 文件打底，环境变量覆盖
    pub fn from_env_and_file<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let mut config = match path {
            Some(path) if path.as_ref().exists() => Self::from_file(path)?,
            _ => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(env) = std::env::var("IRONCORE_ENV") {
            self.environment = env.parse().context("Invalid IRONCORE_ENV")?;
        }
        if let Ok(url) = std::env::var("IRONCORE_API_URL") {
            self.api.api_url = Some(url);
        }
        if let Ok(url) = std::env::var("IRONCORE_STATIC_API_URL") {
            self.api.static_api_url = Some(url);
        }
        Ok(())
    }

    pub fn api_url(&self) -> String {
        self.api
            .api_url
            .clone()
            .unwrap_or_else(|| self.environment.api_url().to_string())
            .trim_end_matches('/')
            .to_string()
    }

    pub fn static_api_url(&self) -> String {
        self.api
            .static_api_url
            .clone()
            .unwrap_or_else(|| self.environment.static_api_url().to_string())
            .trim_end_matches('/')
            .to_string()
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("LOG_LEVEL must be one of: {:?}", valid_levels);
        }

        if self.logging.format != "json" && self.logging.format != "text" {
            anyhow::bail!("LOG_FORMAT must be 'json' or 'text'");
        }

        if self.swap.quote_validity_secs == 0 {
            anyhow::bail!("swap.quote_validity_secs must be greater than zero");
        }

        if self.token_list.metadata_batch_size == 0 {
            anyhow::bail!("token_list.metadata_batch_size must be greater than zero");
        }

        if self.nft.max_page_limit == 0 || self.nft.default_page_limit > self.nft.max_page_limit {
            anyhow::bail!("nft page limits are inconsistent");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn test_environment_urls() {
        assert_eq!(
            Environment::Local.api_url(),
            "http://localhost:3000/local"
        );
        assert_eq!(
            Environment::Development.static_api_url(),
            "https://d1fh2pwo7kzely.cloudfront.net"
        );
        assert_eq!("test".parse::<Environment>().unwrap(), Environment::Local);
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn test_explicit_api_url_wins() {
        let mut config = Config::default();
        config.environment = Environment::Main;
        config.api.api_url = Some("http://127.0.0.1:9000/".to_string());
        assert_eq!(config.api_url(), "http://127.0.0.1:9000");
        assert_eq!(
            config.static_api_url(),
            "https://d1fh2pwo7kzely.cloudfront.net"
        );
    }

    #[test]
    fn test_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
environment = "development"

[swap]
quote_validity_secs = 15

[logging]
level = "debug"
format = "json"
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.swap.quote_validity_secs, 15);
        assert_eq!(config.logging.format, "json");
        // 未出现的段落使用默认值
        assert_eq!(config.nft.max_page_limit, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_quote_window() {
        let mut config = Config::default();
        config.logging.level = "info".into();
        config.logging.format = "text".into();
        config.swap.quote_validity_secs = 0;
        assert!(config.validate().is_err());
    }
}
