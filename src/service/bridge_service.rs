//! 跨链桥编排
//!
//! 流程：向桥服务创建兑换 → 本链转账到兑换的充值地址 → 本地记录待完成兑换，之后轮询。
//! 兑换创建失败时什么都不记录；转账已提交但未确认时仍然记录，交给轮询跟进。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    config::BridgeConfig,
    error::{AppError, AppResult},
    infrastructure::{
        cache::{CacheType, ResilienceCache},
        upstream::UpstreamClient,
    },
    service::{
        account::{BlockchainAccount, TransferOptions},
        bridge_state_machine::{BridgeState, BridgeStateMachine},
    },
};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 桥服务数据
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeToken {
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub blockchain: Option<String>,
    #[serde(default)]
    pub network: Option<String>,
    /// 本链合约/mint 地址，原生币为空
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub decimals: Option<u8>,
    #[serde(default, alias = "image")]
    pub logo: Option<String>,
    /// 收款地址的正则
    #[serde(default)]
    pub validation_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeExchange {
    pub id: String,
    /// 充值地址：源链转账的目的地
    pub address_from: String,
    pub expected_amount: Decimal,
    #[serde(default)]
    pub address_to: Option<String>,
    #[serde(default)]
    pub amount_to: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeTransaction {
    #[serde(default)]
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub amount_to: Option<Decimal>,
    #[serde(default, alias = "payout_hash")]
    pub tx_to: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EstimateResponse {
    #[serde(default)]
    estimated_amount: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct MinimalResponse {
    #[serde(default)]
    min_amount: Option<Decimal>,
}

#[async_trait]
pub trait BridgeApi: Send + Sync {
    async fn supported(&self) -> AppResult<Vec<BridgeToken>>;

    async fn available(&self, symbol: &str) -> AppResult<Vec<BridgeToken>>;

    async fn featured(&self, symbol: &str) -> AppResult<Vec<BridgeToken>>;

    async fn estimate(&self, symbol_in: &str, symbol_out: &str, amount: Decimal) -> AppResult<Option<Decimal>>;

    async fn minimal(&self, symbol_in: &str, symbol_out: &str) -> AppResult<Option<Decimal>>;

    async fn create_exchange(
        &self,
        symbol_in: &str,
        symbol_out: &str,
        amount: Decimal,
        address_to: &str,
    ) -> AppResult<BridgeExchange>;

    async fn transaction(&self, id: &str) -> AppResult<BridgeTransaction>;
}

/// `{api}/v1/bridge/*`
pub struct HttpBridgeApi {
    upstream: UpstreamClient,
    api_url: String,
}

impl HttpBridgeApi {
    pub fn new(upstream: UpstreamClient, api_url: &str) -> Self {
        Self {
            upstream,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/bridge/{}", self.api_url, path)
    }
}

#[async_trait]
impl BridgeApi for HttpBridgeApi {
    async fn supported(&self) -> AppResult<Vec<BridgeToken>> {
        self.upstream.get_json(&self.url("supported"), &[]).await
    }

    async fn available(&self, symbol: &str) -> AppResult<Vec<BridgeToken>> {
        self.upstream
            .get_json(&self.url("available"), &[("symbol", symbol.to_string())])
            .await
    }

    async fn featured(&self, symbol: &str) -> AppResult<Vec<BridgeToken>> {
        self.upstream
            .get_json(&self.url("featured"), &[("symbol", symbol.to_string())])
            .await
    }

    async fn estimate(&self, symbol_in: &str, symbol_out: &str, amount: Decimal) -> AppResult<Option<Decimal>> {
        let response: EstimateResponse = self
            .upstream
            .get_json(
                &self.url("estimate"),
                &[
                    ("symbolIn", symbol_in.to_string()),
                    ("symbolOut", symbol_out.to_string()),
                    ("amount", amount.to_string()),
                ],
            )
            .await?;
        Ok(response.estimated_amount)
    }

    async fn minimal(&self, symbol_in: &str, symbol_out: &str) -> AppResult<Option<Decimal>> {
        let response: MinimalResponse = self
            .upstream
            .get_json(
                &self.url("minimal"),
                &[
                    ("symbolIn", symbol_in.to_string()),
                    ("symbolOut", symbol_out.to_string()),
                ],
            )
            .await?;
        Ok(response.min_amount)
    }

    async fn create_exchange(
        &self,
        symbol_in: &str,
        symbol_out: &str,
        amount: Decimal,
        address_to: &str,
    ) -> AppResult<BridgeExchange> {
        self.upstream
            .get_json(
                &self.url("exchange"),
                &[
                    ("symbolIn", symbol_in.to_string()),
                    ("symbolOut", symbol_out.to_string()),
                    ("amount", amount.to_string()),
                    ("addressTo", address_to.to_string()),
                ],
            )
            .await
    }

    async fn transaction(&self, id: &str) -> AppResult<BridgeTransaction> {
        self.upstream
            .get_json(&self.url("transaction"), &[("id", id.to_string())])
            .await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 待完成记录
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingBridge {
    pub id: Uuid,
    pub exchange_id: String,
    /// 发起账户的公钥
    pub account: String,
    pub network_id: String,
    pub address_from: String,
    pub address_to: String,
    pub expected_amount: Decimal,
    pub symbol_in: String,
    pub symbol_out: String,
    pub tx_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_status_at: DateTime<Utc>,
    pub status: BridgeState,
}

impl PendingBridge {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[async_trait]
pub trait PendingBridgeStore: Send + Sync {
    /// 按 id 插入或覆盖
    async fn save(&self, record: PendingBridge) -> AppResult<()>;

    async fn get(&self, id: Uuid) -> AppResult<Option<PendingBridge>>;

    async fn list(&self) -> AppResult<Vec<PendingBridge>>;
}

#[derive(Default)]
pub struct InMemoryPendingBridgeStore {
    records: RwLock<Vec<PendingBridge>>,
}

impl InMemoryPendingBridgeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PendingBridgeStore for InMemoryPendingBridgeStore {
    async fn save(&self, record: PendingBridge) -> AppResult<()> {
        let mut records = self.records.write().await;
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<PendingBridge>> {
        Ok(self.records.read().await.iter().find(|r| r.id == id).cloned())
    }

    async fn list(&self) -> AppResult<Vec<PendingBridge>> {
        Ok(self.records.read().await.clone())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 编排
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq)]
pub struct BridgeEstimate {
    pub estimated_amount: Option<Decimal>,
    pub minimal_amount: Option<Decimal>,
}

impl BridgeEstimate {
    pub fn meets_minimum(&self, amount: Decimal) -> bool {
        self.minimal_amount.map_or(true, |min| amount >= min)
    }
}

pub struct BridgeOrchestrator {
    api: Arc<dyn BridgeApi>,
    store: Arc<dyn PendingBridgeStore>,
    /// 共享缓存；代币列表的 TTL 由 `CacheType::BridgeSupported` 的类型 TTL 决定
    cache: Arc<ResilienceCache>,
    pending_expiry: chrono::Duration,
}

impl BridgeOrchestrator {
    pub fn new(
        api: Arc<dyn BridgeApi>,
        store: Arc<dyn PendingBridgeStore>,
        cache: Arc<ResilienceCache>,
        config: &BridgeConfig,
    ) -> Self {
        Self {
            api,
            store,
            cache,
            pending_expiry: chrono::Duration::hours(config.pending_expiry_hours),
        }
    }

    pub async fn supported_tokens(&self) -> AppResult<Vec<BridgeToken>> {
        let api = Arc::clone(&self.api);
        self.cache
            .get("supported", CacheType::BridgeSupported, move || async move {
                api.supported().await
            })
            .await
    }

    pub async fn available_tokens(&self, symbol: &str) -> AppResult<Vec<BridgeToken>> {
        let api = Arc::clone(&self.api);
        let symbol = symbol.to_lowercase();
        self.cache
            .get(&format!("available:{}", symbol), CacheType::BridgeSupported, move || async move {
                api.available(&symbol).await
            })
            .await
    }

    pub async fn featured_tokens(&self, symbol: &str) -> AppResult<Vec<BridgeToken>> {
        let api = Arc::clone(&self.api);
        let symbol = symbol.to_lowercase();
        self.cache
            .get(&format!("featured:{}", symbol), CacheType::BridgeSupported, move || async move {
                api.featured(&symbol).await
            })
            .await
    }

    /// 预估到账数量与最小兑换量（并发请求）
    pub async fn estimate(&self, symbol_in: &str, symbol_out: &str, amount: Decimal) -> AppResult<BridgeEstimate> {
        let symbol_in = symbol_in.to_lowercase();
        let (estimated_amount, minimal_amount) = tokio::try_join!(
            self.api.estimate(&symbol_in, symbol_out, amount),
            self.api.minimal(&symbol_in, symbol_out),
        )?;
        Ok(BridgeEstimate {
            estimated_amount,
            minimal_amount,
        })
    }

    pub async fn execute(
        &self,
        account: &dyn BlockchainAccount,
        token_in: &BridgeToken,
        token_out: &BridgeToken,
        amount: Decimal,
        address_to: &str,
    ) -> AppResult<PendingBridge> {
        if !account.network().environment.is_mainnet() {
            return Err(AppError::unsupported("bridge"));
        }
        if amount <= Decimal::ZERO {
            return Err(AppError::invalid_amount(format!("Amount must be positive: {}", amount)));
        }
        let symbol_in = token_in.symbol.to_lowercase();
        let symbol_out = token_out.symbol.clone();

        if let Some(min) = self.api.minimal(&symbol_in, &symbol_out).await? {
            if amount < min {
                return Err(AppError::invalid_amount(format!(
                    "Amount {} is below the bridge minimum {}",
                    amount, min
                )));
            }
        }

        let mut state = BridgeState::Created;
        let exchange = self
            .api
            .create_exchange(&symbol_in, &symbol_out, amount, address_to)
            .await?;
        BridgeStateMachine::transition(&mut state, BridgeState::ExchangeCreated)?;
        tracing::info!(exchange_id = %exchange.id, address_from = %exchange.address_from, expected = %exchange.expected_amount, "bridge exchange created");

        let token = token_in.address.clone().unwrap_or_default();
        let transfer = account
            .create_transfer(
                &exchange.address_from,
                &token,
                exchange.expected_amount,
                &TransferOptions::default(),
            )
            .await?;
        BridgeStateMachine::transition(&mut state, BridgeState::SourceSubmitted)?;

        let now = Utc::now();
        let mut record = PendingBridge {
            id: Uuid::new_v4(),
            exchange_id: exchange.id.clone(),
            account: account.public_key(),
            network_id: account.network().id.clone(),
            address_from: exchange.address_from.clone(),
            address_to: address_to.to_string(),
            expected_amount: exchange.expected_amount,
            symbol_in,
            symbol_out,
            tx_id: Some(transfer.tx_id.clone()),
            created_at: now,
            expires_at: now + self.pending_expiry,
            last_status_at: now,
            status: state,
        };

        if let Err(e) = account.confirm_transfer(&transfer.tx_id).await {
            tracing::warn!(exchange_id = %exchange.id, tx_id = %transfer.tx_id, error = %e, "bridge deposit unconfirmed, tracking anyway");
            self.store.save(record).await?;
            return Err(e);
        }

        BridgeStateMachine::transition(&mut record.status, BridgeState::InProgress)?;
        self.store.save(record.clone()).await?;
        tracing::info!(id = %record.id, exchange_id = %record.exchange_id, "bridge pending");
        Ok(record)
    }

    /// 轮询未结束的记录，返回状态发生变化的记录
    pub async fn refresh_pending(&self) -> AppResult<Vec<PendingBridge>> {
        let mut changed = Vec::new();
        for mut record in self.store.list().await? {
            if record.status.is_terminal() {
                continue;
            }

            let now = Utc::now();
            if record.is_expired(now) {
                BridgeStateMachine::transition(&mut record.status, BridgeState::Expired)?;
                record.last_status_at = now;
                tracing::warn!(id = %record.id, exchange_id = %record.exchange_id, "bridge expired");
                self.store.save(record.clone()).await?;
                changed.push(record);
                continue;
            }

            let remote = match self.api.transaction(&record.exchange_id).await {
                Ok(tx) => tx,
                Err(e) => {
                    tracing::warn!(exchange_id = %record.exchange_id, error = %e, "bridge status unavailable");
                    continue;
                }
            };
            record.last_status_at = now;

            let Some(target) = BridgeState::from_provider_status(&remote.status) else {
                if record.status == BridgeState::SourceSubmitted {
                    BridgeStateMachine::transition(&mut record.status, BridgeState::InProgress)?;
                    self.store.save(record.clone()).await?;
                    changed.push(record);
                }
                continue;
            };

            if target == BridgeState::Completed && record.status == BridgeState::SourceSubmitted {
                BridgeStateMachine::transition(&mut record.status, BridgeState::InProgress)?;
            }
            BridgeStateMachine::transition(&mut record.status, target)?;
            tracing::info!(id = %record.id, exchange_id = %record.exchange_id, status = %record.status, "bridge settled");
            self.store.save(record.clone()).await?;
            changed.push(record);
        }
        Ok(changed)
    }

    /// 某个账户的记录（含已结束的）
    pub async fn pending_for(&self, account: &str) -> AppResult<Vec<PendingBridge>> {
        Ok(self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|r| r.account == account)
            .collect())
    }
}
