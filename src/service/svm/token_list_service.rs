//! 代币列表
//!
//! 按顺序尝试：运营方接口 → 聚合器缓存 → 静态目录镜像，第一个成功的结果
//! 规范化后常驻内存，直到 `invalidate`。

use std::{collections::HashMap, sync::Arc};

use serde::Deserialize;
use tokio::sync::Mutex;

use crate::{
    config::TokenListConfig,
    domain::token::TokenInfo,
    error::{AppError, AppResult},
    infrastructure::upstream::UpstreamClient,
    utils::url_utils::normalize_opt,
};

pub const SOLANA_MAINNET_CHAIN_ID: u64 = 101;

/// (symbol, name)
const FEATURED: &[(&str, &str)] = &[
    ("SOL", "Wrapped SOL"),
    ("USDC", "USD Coin"),
    ("SRM", "Serum"),
    ("FIDA", "Bonfida"),
    ("RAY", "Raydium"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenListSource {
    Operator,
    Aggregator,
    Catalog,
}

impl TokenListSource {
    pub fn name(&self) -> &'static str {
        match self {
            TokenListSource::Operator => "operator",
            TokenListSource::Aggregator => "aggregator",
            TokenListSource::Catalog => "catalog",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawToken {
    address: String,
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    name: String,
    decimals: u8,
    #[serde(default, alias = "logoURI", alias = "logoUri")]
    logo: Option<String>,
    #[serde(default)]
    chain_id: Option<u64>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    coingecko_id: Option<String>,
    #[serde(default)]
    extensions: Option<serde_json::Value>,
}

/// 聚合器返回裸数组，目录镜像包在 `tokens` 字段里
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTokenList {
    Bare(Vec<RawToken>),
    Wrapped { tokens: Vec<RawToken> },
}

impl RawTokenList {
    fn into_tokens(self) -> Vec<RawToken> {
        match self {
            RawTokenList::Bare(tokens) | RawTokenList::Wrapped { tokens } => tokens,
        }
    }
}

fn priority(token: &TokenInfo) -> u8 {
    if token.is_verified() {
        2
    } else if token.is_community() {
        1
    } else {
        0
    }
}

/// 修正 logo、提取 coingecko id，并按 symbol 去重（verified > community > 其它）
fn normalize(raw: Vec<RawToken>) -> Vec<TokenInfo> {
    let mut out: Vec<TokenInfo> = Vec::with_capacity(raw.len());
    let mut by_symbol: HashMap<String, usize> = HashMap::new();

    for token in raw {
        let coingecko_id = token.coingecko_id.or_else(|| {
            token
                .extensions
                .as_ref()
                .and_then(|e| e.get("coingeckoId"))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        });
        let info = TokenInfo {
            address: token.address,
            symbol: token.symbol,
            name: token.name,
            decimals: token.decimals,
            logo: normalize_opt(token.logo.as_deref()),
            chain_id: token.chain_id,
            coingecko_id,
            tags: token.tags,
        };

        match by_symbol.get(&info.symbol) {
            Some(&idx) => {
                if priority(&info) > priority(&out[idx]) {
                    out[idx] = info;
                }
            }
            None => {
                by_symbol.insert(info.symbol.clone(), out.len());
                out.push(info);
            }
        }
    }
    out
}

pub struct TokenListService {
    upstream: UpstreamClient,
    api_url: String,
    config: TokenListConfig,
    sources: Vec<TokenListSource>,
    // 持锁加载：并发的首次调用只触发一次拉取
    lists: Mutex<HashMap<String, Arc<Vec<TokenInfo>>>>,
}

impl TokenListService {
    pub fn new(upstream: UpstreamClient, api_url: &str, config: TokenListConfig) -> Self {
        Self {
            upstream,
            api_url: api_url.trim_end_matches('/').to_string(),
            config,
            sources: vec![
                TokenListSource::Operator,
                TokenListSource::Aggregator,
                TokenListSource::Catalog,
            ],
            lists: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_sources(mut self, sources: Vec<TokenListSource>) -> Self {
        self.sources = sources;
        self
    }

    fn url_for(&self, source: TokenListSource, network_id: &str) -> String {
        match source {
            TokenListSource::Operator => format!("{}/v1/{}/ft/tokens", self.api_url, network_id),
            TokenListSource::Aggregator => self.config.aggregator_url.clone(),
            TokenListSource::Catalog => self.config.catalog_url.clone(),
        }
    }

    async fn fetch(&self, network_id: &str) -> AppResult<Vec<TokenInfo>> {
        let mut last_err = AppError::transient("No token list source configured");
        for source in &self.sources {
            let url = self.url_for(*source, network_id);
            match self.upstream.get_json::<RawTokenList>(&url, &[]).await {
                Ok(list) => {
                    let tokens = normalize(list.into_tokens());
                    tracing::info!(source = source.name(), network = network_id, count = tokens.len(), "token list loaded");
                    return Ok(tokens);
                }
                Err(e) => {
                    tracing::warn!(source = source.name(), network = network_id, error = %e, "token list source failed, trying next");
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    pub async fn get_tokens(&self, network_id: &str) -> AppResult<Arc<Vec<TokenInfo>>> {
        let mut lists = self.lists.lock().await;
        if let Some(list) = lists.get(network_id) {
            return Ok(Arc::clone(list));
        }
        let list = Arc::new(self.fetch(network_id).await?);
        lists.insert(network_id.to_string(), Arc::clone(&list));
        Ok(list)
    }

    /// 直接替换内存中的列表（内置列表或测试数据）
    pub async fn set_tokens(&self, network_id: &str, tokens: Vec<TokenInfo>) {
        self.lists
            .lock()
            .await
            .insert(network_id.to_string(), Arc::new(tokens));
    }

    pub async fn find(&self, network_id: &str, address: &str) -> AppResult<Option<TokenInfo>> {
        Ok(self
            .get_tokens(network_id)
            .await?
            .iter()
            .find(|t| t.address == address)
            .cloned())
    }

    /// 主网上的 SOL / USDC / SRM / FIDA / RAY，按固定顺序
    pub async fn get_featured_tokens(&self, network_id: &str) -> AppResult<Vec<TokenInfo>> {
        let tokens = self.get_tokens(network_id).await?;
        Ok(featured(&tokens))
    }

    pub async fn invalidate(&self) {
        self.lists.lock().await.clear();
        tracing::info!("token list invalidated");
    }
}

fn featured(tokens: &[TokenInfo]) -> Vec<TokenInfo> {
    FEATURED
        .iter()
        .filter_map(|(symbol, name)| {
            tokens
                .iter()
                .find(|t| {
                    t.symbol == *symbol
                        && t.name == *name
                        && t.chain_id == Some(SOLANA_MAINNET_CHAIN_ID)
                })
                .cloned()
        })
        .collect()
}
