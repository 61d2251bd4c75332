//! SVM NFT 数据访问
//!
//! 完整列表走有序来源链（DAS 索引器 → 后端聚合），结果进缓存；
//! 分页、分组都在完整列表上本地完成。单个 NFT、销毁、市场与集合查询走后端。

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use base64::Engine;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    config::NftConfig,
    domain::{
        network::Network,
        nft::{
            group_by_collection, paginate, Nft, NftCollectionRef, NftEdition, NftListing, NftMint, NftPage,
            PageRequest,
        },
    },
    error::{AppError, AppErrorCode, AppResult},
    infrastructure::{
        cache::{CacheType, ResilienceCache},
        solana_rpc::{ParsedTokenAccount, SolanaRpc, TOKEN_2022_PROGRAM_ID},
        upstream::UpstreamClient,
    },
    service::svm::{
        pubkey::Pubkey,
        transaction::{AccountMeta, Instruction, Message},
    },
    utils::url_utils::normalize_opt,
};

/// Magic Eden 市场程序：购买交易由后端完整构造，只需补签
pub const ME_PROGRAM_ID: &str = "M2mx93ekt1fmXSVkTrUL9xVFHkmME8HTUi5Cyc5aF7K";

/// 一次完整列表查询
pub struct NftQuery<'a> {
    pub rpc: &'a dyn SolanaRpc,
    pub network: &'a Network,
    pub owner: &'a str,
    pub no_cache: bool,
}

#[async_trait]
pub trait NftSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_all(&self, query: &NftQuery<'_>) -> AppResult<Vec<Nft>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DAS 索引器
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct DasIndexerSource {
    limit: usize,
}

impl DasIndexerSource {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }
}

fn str_at<'v>(value: &'v Value, pointer: &str) -> Option<&'v str> {
    value.pointer(pointer).and_then(Value::as_str)
}

/// DAS asset → `Nft`
pub fn transform_das_asset(asset: &Value, owner: &str) -> Option<Nft> {
    let id = asset.get("id")?.as_str()?;
    let metadata = asset
        .pointer("/content/metadata")
        .cloned()
        .unwrap_or_else(|| json!({}));

    let collection = asset
        .get("grouping")
        .and_then(Value::as_array)
        .and_then(|groups| {
            groups
                .iter()
                .find(|g| g.get("group_key").and_then(Value::as_str) == Some("collection"))
        })
        .and_then(|g| g.get("group_value").and_then(Value::as_str))
        .map(|key| NftCollectionRef {
            key: Some(key.to_string()),
            name: None,
            verified: true,
        });

    let update_authority = asset
        .get("authorities")
        .and_then(Value::as_array)
        .and_then(|auths| {
            auths.iter().find(|a| {
                a.get("scopes")
                    .and_then(Value::as_array)
                    .is_some_and(|s| s.iter().any(|v| v.as_str() == Some("full")))
            })
        })
        .and_then(|a| a.get("address").and_then(Value::as_str))
        .map(str::to_string);

    let media = normalize_opt(str_at(&metadata, "/image"))
        .or_else(|| normalize_opt(str_at(asset, "/content/links/image")))
        .or_else(|| normalize_opt(str_at(asset, "/content/files/0/uri")));

    Some(Nft {
        mint: NftMint {
            address: id.to_string(),
        },
        owner: Some(owner.to_string()),
        name: str_at(&metadata, "/name").unwrap_or_default().to_string(),
        symbol: str_at(&metadata, "/symbol").unwrap_or_default().to_string(),
        uri: normalize_opt(str_at(asset, "/content/json_uri")).unwrap_or_default(),
        media,
        description: str_at(&metadata, "/description").unwrap_or_default().to_string(),
        collection,
        seller_fee_basis_points: asset
            .pointer("/royalty/basis_points")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32,
        token_standard: str_at(asset, "/interface").map(str::to_string),
        compressed: asset
            .pointer("/compression/compressed")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        update_authority_address: update_authority,
        edition: asset
            .pointer("/supply/edition_nonce")
            .and_then(Value::as_u64)
            .map(|nonce| NftEdition { is_original: nonce == 0 }),
        extensions: Vec::new(),
        extras: json!({
            "attributes": metadata.get("attributes").cloned().unwrap_or_else(|| json!([])),
            "properties": metadata.get("properties").cloned().unwrap_or_else(|| json!({})),
            "creators": asset.get("creators").cloned().unwrap_or_else(|| json!([])),
        }),
        json: metadata,
    })
}

#[async_trait]
impl NftSource for DasIndexerSource {
    fn name(&self) -> &'static str {
        "das"
    }

    async fn fetch_all(&self, query: &NftQuery<'_>) -> AppResult<Vec<Nft>> {
        let assets = query.rpc.get_assets_by_owner(query.owner, self.limit).await?;
        let total = assets.len();

        let mut nfts: Vec<Nft> = assets
            .iter()
            .filter(|a| !a.get("burnt").and_then(Value::as_bool).unwrap_or(false))
            .filter_map(|a| transform_das_asset(a, query.owner))
            .collect();

        // Token-2022 扩展查不到时 NFT 照常返回
        match query
            .rpc
            .get_token_accounts_by_owner(query.owner, TOKEN_2022_PROGRAM_ID)
            .await
        {
            Ok(accounts) => attach_extensions(&mut nfts, accounts),
            Err(e) => {
                tracing::warn!(owner = query.owner, error = %e, "token-2022 extensions unavailable");
            }
        }

        tracing::debug!(owner = query.owner, total, kept = nfts.len(), "das assets fetched");
        Ok(nfts)
    }
}

/// mint → 扩展列表，挂到对应的 NFT 上
fn attach_extensions(nfts: &mut [Nft], accounts: Vec<ParsedTokenAccount>) {
    let by_mint: HashMap<String, Vec<Value>> = accounts
        .into_iter()
        .filter(|a| !a.extensions.is_empty())
        .map(|a| (a.mint, a.extensions))
        .collect();
    if by_mint.is_empty() {
        return;
    }
    for nft in nfts.iter_mut() {
        if let Some(extensions) = by_mint.get(&nft.mint.address) {
            nft.extensions = extensions.clone();
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 后端聚合
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct BackendNftSource {
    upstream: UpstreamClient,
    api_url: String,
}

impl BackendNftSource {
    pub fn new(upstream: UpstreamClient, api_url: &str) -> Self {
        Self {
            upstream,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl NftSource for BackendNftSource {
    fn name(&self) -> &'static str {
        "backend"
    }

    async fn fetch_all(&self, query: &NftQuery<'_>) -> AppResult<Vec<Nft>> {
        let url = format!("{}/v1/{}/nft", self.api_url, query.network.id);
        self.upstream
            .get_json(
                &url,
                &[
                    ("publicKey", query.owner.to_string()),
                    ("noCache", query.no_cache.to_string()),
                ],
            )
            .await
    }
}

/// 依次尝试各来源，失败记录后换下一个；全部失败时返回最后一个错误
pub async fn fetch_with_fallback(
    sources: &[Arc<dyn NftSource>],
    query: &NftQuery<'_>,
) -> AppResult<Vec<Nft>> {
    let mut last_err = AppError::transient("No NFT source configured");
    for source in sources {
        match source.fetch_all(query).await {
            Ok(nfts) => {
                tracing::info!(source = source.name(), owner = query.owner, count = nfts.len(), "nfts loaded");
                return Ok(nfts);
            }
            Err(e) => {
                tracing::warn!(source = source.name(), owner = query.owner, error = %e, "nft source failed, trying next");
                last_err = e;
            }
        }
    }
    Err(last_err)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 后端交易载荷
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 后端序列化字节：数组、Node Buffer 的 JSON 形式或 base64 字符串
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ByteData {
    Raw(Vec<u8>),
    Buffer { data: Vec<u8> },
    Base64(String),
}

impl ByteData {
    pub fn into_bytes(self) -> AppResult<Vec<u8>> {
        match self {
            ByteData::Raw(bytes) | ByteData::Buffer { data: bytes } => Ok(bytes),
            ByteData::Base64(s) => base64::engine::general_purpose::STANDARD
                .decode(s.trim())
                .map_err(|e| AppError::transient(format!("Malformed transaction payload: {}", e))),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonAccountMeta {
    pubkey: String,
    #[serde(default)]
    is_signer: bool,
    #[serde(default)]
    is_writable: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonInstruction {
    program_id: String,
    keys: Vec<JsonAccountMeta>,
    data: ByteData,
}

/// 销毁接口返回的 JSON 交易：只有 blockhash 与指令，需要本地重建
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BurnTxPayload {
    recent_blockhash: String,
    instructions: Vec<JsonInstruction>,
}

impl BurnTxPayload {
    fn into_message(self, payer: &Pubkey) -> AppResult<Message> {
        let instructions = self
            .instructions
            .into_iter()
            .map(|ix| {
                let accounts = ix
                    .keys
                    .into_iter()
                    .map(|k| {
                        Ok(AccountMeta {
                            pubkey: k.pubkey.parse()?,
                            is_signer: k.is_signer,
                            is_writable: k.is_writable,
                        })
                    })
                    .collect::<AppResult<Vec<_>>>()?;
                Ok(Instruction {
                    program_id: ix.program_id.parse()?,
                    accounts,
                    data: ix.data.into_bytes()?,
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        if instructions.is_empty() {
            return Err(AppError::transient("Burn transaction has no instructions"));
        }
        Message::compile(payer, &instructions, &self.recent_blockhash)
    }
}

/// 市场操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketplaceAction {
    List,
    Unlist,
    Buy,
    Bid,
    CancelBid,
}

impl MarketplaceAction {
    fn path(&self) -> &'static str {
        match self {
            MarketplaceAction::List => "list-tx",
            MarketplaceAction::Unlist => "unlist-tx",
            MarketplaceAction::Buy => "buy-tx",
            MarketplaceAction::Bid => "bid-tx",
            MarketplaceAction::CancelBid => "cancel-bid-tx",
        }
    }

    fn payload_field(&self) -> &'static str {
        match self {
            MarketplaceAction::List => "createListTx",
            MarketplaceAction::Unlist => "createDelistTx",
            MarketplaceAction::Buy => "createBuyTx",
            MarketplaceAction::Bid => "createBidTx",
            MarketplaceAction::CancelBid => "createCancelBidTx",
        }
    }

    fn actor_param(&self) -> &'static str {
        match self {
            MarketplaceAction::List | MarketplaceAction::Unlist => "sellerAddress",
            _ => "buyerAddress",
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 服务
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SvmNftService {
    rpc: Arc<dyn SolanaRpc>,
    network: Network,
    owner: String,
    sources: Vec<Arc<dyn NftSource>>,
    upstream: UpstreamClient,
    api_url: String,
    cache: Arc<ResilienceCache>,
    config: NftConfig,
}

impl SvmNftService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rpc: Arc<dyn SolanaRpc>,
        network: Network,
        owner: String,
        sources: Vec<Arc<dyn NftSource>>,
        upstream: UpstreamClient,
        api_url: &str,
        cache: Arc<ResilienceCache>,
        config: NftConfig,
    ) -> Self {
        Self {
            rpc,
            network,
            owner,
            sources,
            upstream,
            api_url: api_url.trim_end_matches('/').to_string(),
            cache,
            config,
        }
    }

    fn nft_url(&self, suffix: &str) -> String {
        format!("{}/v1/{}/nft{}", self.api_url, self.network.id, suffix)
    }

    /// `no_cache` 先丢弃本账户的缓存项，再走一次来源链
    pub async fn get_all(&self, no_cache: bool) -> AppResult<Vec<Nft>> {
        let key = format!("{}:{}", self.network.id, self.owner);
        if no_cache {
            self.cache.invalidate_key(CacheType::Nfts, &key);
        }

        let rpc = Arc::clone(&self.rpc);
        let network = self.network.clone();
        let owner = self.owner.clone();
        let sources = self.sources.clone();

        self.cache
            .get(&key, CacheType::Nfts, move || async move {
                let query = NftQuery {
                    rpc: rpc.as_ref(),
                    network: &network,
                    owner: &owner,
                    no_cache,
                };
                fetch_with_fallback(&sources, &query).await
            })
            .await
    }

    pub async fn get_page(&self, request: PageRequest) -> AppResult<NftPage> {
        let nfts = self.get_all(false).await?;
        Ok(paginate(
            nfts,
            request,
            self.config.default_page_limit,
            self.config.max_page_limit,
        ))
    }

    pub async fn get_grouped(&self) -> AppResult<Vec<NftListing>> {
        Ok(group_by_collection(self.get_all(false).await?))
    }

    /// 后端没有集合信息的 NFT 视为不存在
    pub async fn get_nft(&self, mint: &str) -> AppResult<Option<Nft>> {
        let url = self.nft_url(&format!("/{}", mint));
        let upstream = self.upstream.clone();
        let key = format!("{}:{}", self.network.id, mint);

        let fetched = self
            .cache
            .get(&key, CacheType::SingleNft, move || async move {
                upstream.get_json::<Nft>(&url, &[]).await
            })
            .await;

        match fetched {
            Ok(nft) if nft.collection.is_some() => Ok(Some(nft)),
            Ok(_) => Ok(None),
            Err(e) if e.code == AppErrorCode::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// 后端给出 JSON 指令，本地以账户为 payer 重新编译
    pub async fn burn_message(&self, mint: &str) -> AppResult<Message> {
        let owner: Pubkey = self.owner.parse()?;
        let url = format!("{}?owner={}", self.nft_url(&format!("/{}", mint)), self.owner);
        let payload: BurnTxPayload = self.upstream.post_json(&url, &Value::Null).await?;
        payload.into_message(&owner)
    }

    /// 市场操作的待签名字节（消息或完整交易，由调用方决定签名方式）
    pub async fn marketplace_payload(
        &self,
        action: MarketplaceAction,
        mint: &str,
        price: Option<Decimal>,
    ) -> AppResult<Vec<u8>> {
        let url = self.nft_url(&format!("/{}", action.path()));
        let mut query = vec![
            (action.actor_param(), self.owner.clone()),
            ("tokenAddress", mint.to_string()),
        ];
        if let Some(price) = price {
            query.push(("price", price.normalize().to_string()));
        }

        let response: Value = self.upstream.get_json(&url, &query).await?;
        let data = response
            .get(action.payload_field())
            .and_then(|tx| tx.get("data"))
            .cloned()
            .ok_or_else(|| {
                AppError::transient(format!("{} missing from {} response", action.payload_field(), action.path()))
            })?;
        serde_json::from_value::<ByteData>(data)?.into_bytes()
    }

    pub async fn get_listed(&self) -> AppResult<Vec<Value>> {
        let url = self.nft_url(&format!("/listed/{}", self.owner));
        self.upstream.get_json(&url, &[]).await
    }

    pub async fn get_bids(&self) -> AppResult<Vec<Value>> {
        let url = self.nft_url(&format!("/bids/{}", self.owner));
        self.upstream.get_json(&url, &[]).await
    }

    pub async fn get_collection_group(&self, filter: &str) -> AppResult<Value> {
        let url = self.nft_url(&format!("/hyperspace/collections/{}", filter));
        self.upstream.get_json(&url, &[]).await
    }

    pub async fn get_collection(&self, id: &str) -> AppResult<Value> {
        let url = self.nft_url(&format!("/hyperspace/collection/{}", id));
        self.upstream.get_json(&url, &[]).await
    }

    pub async fn get_collection_items(&self, id: &str, page: u32) -> AppResult<Value> {
        let url = self.nft_url(&format!("/hyperspace/collection/{}/items/{}", id, page.max(1)));
        self.upstream.get_json(&url, &[]).await
    }
}
