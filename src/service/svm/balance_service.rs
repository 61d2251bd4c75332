//! SVM 余额聚合
//!
//! 原生币 + 两个代币程序下的代币账户 → 元数据 → 价格 → 排序与 24h 变化。
//! 元数据来源是一个有序列表，每个 mint 取第一个非空结果；全部落空的 mint 保留空元数据。

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;

use crate::{
    domain::{
        network::Network,
        token::{last_24h_change, sort_balances, Balance, TokenBalance, TokenMetadata},
    },
    error::AppResult,
    infrastructure::{
        cache::{CacheType, ResilienceCache},
        solana_rpc::{SolanaRpc, TOKEN_2022_PROGRAM_ID, TOKEN_PROGRAM_ID},
        upstream::UpstreamClient,
    },
    service::{
        price_service::{PriceFeed, PriceIndex},
        svm::{token_list_service::TokenListService, token_program::Mint},
    },
    utils::url_utils::normalize_opt,
};

/// 元数据解析时可用的链上上下文
pub struct MetadataContext<'a> {
    pub rpc: &'a dyn SolanaRpc,
    pub network: &'a Network,
}

#[async_trait]
pub trait MetadataSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// 返回能解析的那部分 mint；解析不了的直接缺席，不算错误
    async fn resolve(
        &self,
        ctx: &MetadataContext<'_>,
        mints: &[String],
    ) -> AppResult<HashMap<String, TokenMetadata>>;
}

fn is_meaningful(meta: &TokenMetadata) -> bool {
    meta.symbol.as_deref().is_some_and(|s| !s.is_empty())
        || meta.name.as_deref().is_some_and(|s| !s.is_empty())
        || meta.logo.is_some()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 后端批量接口
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 后端既可能返回数组，也可能返回以 mint 为键的对象
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MetadataPayload {
    List(Vec<TokenMetadata>),
    Map(HashMap<String, TokenMetadata>),
}

impl MetadataPayload {
    fn into_map(self) -> HashMap<String, TokenMetadata> {
        match self {
            MetadataPayload::List(items) => items
                .into_iter()
                .map(|m| (m.address.clone(), m))
                .collect(),
            MetadataPayload::Map(map) => map
                .into_iter()
                .map(|(mint, mut m)| {
                    if m.address.is_empty() {
                        m.address = mint.clone();
                    }
                    (mint, m)
                })
                .collect(),
        }
    }
}

pub struct BackendMetadataSource {
    upstream: UpstreamClient,
    api_url: String,
    batch_size: usize,
    cache: Arc<ResilienceCache>,
}

impl BackendMetadataSource {
    pub fn new(
        upstream: UpstreamClient,
        api_url: &str,
        batch_size: usize,
        cache: Arc<ResilienceCache>,
    ) -> Self {
        Self {
            upstream,
            api_url: api_url.trim_end_matches('/').to_string(),
            batch_size: batch_size.max(1),
            cache,
        }
    }

    async fn fetch_chunk(
        &self,
        network_id: &str,
        chunk: &[String],
    ) -> AppResult<HashMap<String, TokenMetadata>> {
        let mints = chunk.join(",");
        let key = format!("{}:{}", network_id, mints);
        let url = format!("{}/v1/{}/ft/metadata", self.api_url, network_id);
        let upstream = self.upstream.clone();

        self.cache
            .get(&key, CacheType::TokenMetadata, move || async move {
                let payload: MetadataPayload = upstream.get_json(&url, &[("mints", mints)]).await?;
                Ok(payload.into_map())
            })
            .await
    }
}

#[async_trait]
impl MetadataSource for BackendMetadataSource {
    fn name(&self) -> &'static str {
        "backend"
    }

    async fn resolve(
        &self,
        ctx: &MetadataContext<'_>,
        mints: &[String],
    ) -> AppResult<HashMap<String, TokenMetadata>> {
        let results = join_all(
            mints
                .chunks(self.batch_size)
                .map(|chunk| self.fetch_chunk(&ctx.network.id, chunk)),
        )
        .await;

        let mut out = HashMap::new();
        let mut last_err = None;
        for result in results {
            match result {
                Ok(map) => out.extend(map),
                Err(e) => {
                    tracing::warn!(network = %ctx.network.id, error = %e, "metadata batch failed");
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(e) if out.is_empty() => Err(e),
            _ => Ok(out),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 代币列表
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct TokenListMetadataSource {
    token_list: Arc<TokenListService>,
}

impl TokenListMetadataSource {
    pub fn new(token_list: Arc<TokenListService>) -> Self {
        Self { token_list }
    }
}

#[async_trait]
impl MetadataSource for TokenListMetadataSource {
    fn name(&self) -> &'static str {
        "token_list"
    }

    async fn resolve(
        &self,
        ctx: &MetadataContext<'_>,
        mints: &[String],
    ) -> AppResult<HashMap<String, TokenMetadata>> {
        let tokens = self.token_list.get_tokens(&ctx.network.id).await?;
        let wanted: HashSet<&str> = mints.iter().map(String::as_str).collect();

        Ok(tokens
            .iter()
            .filter(|t| wanted.contains(t.address.as_str()))
            .map(|t| (t.address.clone(), TokenMetadata::from(t)))
            .collect())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 链上 mint 账户（Token-2022 元数据扩展）
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
struct UriJson {
    #[serde(default)]
    image: Option<String>,
}

pub struct OnChainMetadataSource {
    upstream: UpstreamClient,
}

impl OnChainMetadataSource {
    pub fn new(upstream: UpstreamClient) -> Self {
        Self { upstream }
    }

    async fn resolve_one(
        &self,
        rpc: &dyn SolanaRpc,
        address: &str,
    ) -> AppResult<Option<TokenMetadata>> {
        let Some(account) = rpc.get_account_info(address).await? else {
            return Ok(None);
        };
        let mint = Mint::unpack(&account.data)?;

        // 供应量为 1 的是 NFT，不进余额列表的元数据
        if mint.supply == 1 {
            return Ok(None);
        }

        let mut meta = TokenMetadata {
            address: address.to_string(),
            decimals: Some(mint.decimals),
            ..Default::default()
        };

        if account.owner != TOKEN_2022_PROGRAM_ID {
            return Ok(Some(meta));
        }
        let Some(pointer) = mint.extensions.metadata_pointer else {
            return Ok(Some(meta));
        };

        let token_metadata = if pointer.to_string() == address {
            mint.extensions.token_metadata
        } else {
            match rpc.get_account_info(&pointer.to_string()).await? {
                Some(holder) => Mint::unpack(&holder.data)?.extensions.token_metadata,
                None => None,
            }
        };

        if let Some(ext) = token_metadata {
            meta.name = Some(ext.name);
            meta.symbol = Some(ext.symbol);
            if let Some(uri) = normalize_opt(Some(&ext.uri)) {
                match self.upstream.get_json::<UriJson>(&uri, &[]).await {
                    Ok(json) => meta.logo = normalize_opt(json.image.as_deref()),
                    Err(e) => tracing::debug!(mint = address, uri = %uri, error = %e, "metadata uri unreadable"),
                }
            }
        }

        Ok(Some(meta))
    }
}

#[async_trait]
impl MetadataSource for OnChainMetadataSource {
    fn name(&self) -> &'static str {
        "on_chain"
    }

    async fn resolve(
        &self,
        ctx: &MetadataContext<'_>,
        mints: &[String],
    ) -> AppResult<HashMap<String, TokenMetadata>> {
        let results = join_all(mints.iter().map(|m| self.resolve_one(ctx.rpc, m))).await;

        let mut out = HashMap::new();
        for (mint, result) in mints.iter().zip(results) {
            match result {
                Ok(Some(meta)) => {
                    out.insert(mint.clone(), meta);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(mint = %mint, error = %e, "on-chain metadata failed"),
            }
        }
        Ok(out)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 余额服务
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SvmBalanceService {
    rpc: Arc<dyn SolanaRpc>,
    network: Network,
    owner: String,
    sources: Vec<Arc<dyn MetadataSource>>,
    prices: Arc<dyn PriceFeed>,
}

impl SvmBalanceService {
    pub fn new(
        rpc: Arc<dyn SolanaRpc>,
        network: Network,
        owner: String,
        sources: Vec<Arc<dyn MetadataSource>>,
        prices: Arc<dyn PriceFeed>,
    ) -> Self {
        Self {
            rpc,
            network,
            owner,
            sources,
            prices,
        }
    }

    pub async fn get_credit(&self) -> AppResult<u64> {
        self.rpc.get_balance(&self.owner).await
    }

    /// 两个代币程序并行查询，只保留正余额
    pub async fn get_tokens(&self) -> AppResult<Vec<TokenBalance>> {
        let (legacy, token_2022) = tokio::try_join!(
            self.rpc.get_token_accounts_by_owner(&self.owner, TOKEN_PROGRAM_ID),
            self.rpc.get_token_accounts_by_owner(&self.owner, TOKEN_2022_PROGRAM_ID),
        )?;

        let mut items: Vec<TokenBalance> = legacy
            .into_iter()
            .chain(token_2022)
            .filter(|a| a.amount > 0)
            .map(|a| {
                let mut item = TokenBalance::new(&a.mint, &a.owner, a.amount, a.decimals);
                item.program_id = Some(a.program_id);
                item
            })
            .collect();

        let mut mints: Vec<String> = items.iter().map(|t| t.mint.clone()).collect();
        mints.sort();
        mints.dedup();

        let metadata = self.resolve_metadata(&mints).await;
        for item in &mut items {
            if let Some(meta) = metadata.get(&item.mint) {
                item.apply_metadata(meta);
            }
        }
        Ok(items)
    }

    /// 按顺序询问各来源；每个 mint 只接受第一个有内容的答案
    pub async fn resolve_metadata(&self, mints: &[String]) -> HashMap<String, TokenMetadata> {
        let ctx = MetadataContext {
            rpc: self.rpc.as_ref(),
            network: &self.network,
        };
        let mut resolved: HashMap<String, TokenMetadata> = HashMap::new();
        let mut remaining: Vec<String> = mints.to_vec();

        for source in &self.sources {
            if remaining.is_empty() {
                break;
            }
            match source.resolve(&ctx, &remaining).await {
                Ok(found) => {
                    for (mint, meta) in found {
                        if is_meaningful(&meta) && remaining.contains(&mint) {
                            resolved.insert(mint, meta);
                        }
                    }
                    remaining.retain(|m| !resolved.contains_key(m));
                    tracing::debug!(source = source.name(), unresolved = remaining.len(), "metadata source applied");
                }
                Err(e) => {
                    tracing::warn!(source = source.name(), error = %e, "metadata source failed, trying next");
                }
            }
        }
        resolved
    }

    fn native_item(&self, lamports: u64) -> TokenBalance {
        let currency = &self.network.currency;
        let mut item = TokenBalance::new(&currency.address, &self.owner, lamports, currency.decimals);
        item.symbol = currency.symbol.clone();
        item.name = currency.name.clone();
        item.logo = currency.logo.clone();
        item.coingecko_id = currency.coingecko_id.clone();
        item.is_native = true;
        item
    }

    /// 价格源失败不影响余额本身，只是不带价格字段
    pub async fn get_balance(&self) -> AppResult<Balance> {
        let (lamports, tokens) = tokio::try_join!(self.get_credit(), self.get_tokens())?;

        let mut items = Vec::with_capacity(tokens.len() + 1);
        items.push(self.native_item(lamports));
        items.extend(tokens);

        let platform = self.network.blockchain.price_platform();
        let index = match self.prices.prices(platform).await {
            Ok(prices) => Some(PriceIndex::new(prices)),
            Err(e) => {
                tracing::warn!(platform, error = %e, "could not get prices");
                None
            }
        };

        let Some(index) = index else {
            sort_balances(&mut items);
            return Ok(Balance {
                usd_total: None,
                last_24h_change: None,
                items,
            });
        };

        for item in &mut items {
            if let Some(price) = index.lookup(&item.address, item.coingecko_id.as_deref()) {
                item.apply_price(price.usd_price, price.perc_24h_change);
            }
        }
        sort_balances(&mut items);

        let usd_total: f64 = items.iter().filter_map(|t| t.usd_balance).sum();
        let change = last_24h_change(&items, usd_total);

        Ok(Balance {
            usd_total: Some(usd_total),
            last_24h_change: Some(change),
            items,
        })
    }
}
