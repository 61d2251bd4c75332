//! SVM 节点 JSON-RPC 客户端
//!
//! Solana 与 Eclipse 共用同一套接口，账户只依赖 `SolanaRpc` trait，测试里换成脚本化实现。

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;

use crate::{
    domain::network::Network,
    error::{AppError, AppResult},
    infrastructure::upstream::UpstreamClient,
};

pub const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
pub const TOKEN_2022_PROGRAM_ID: &str = "TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb";

/// `getAccountInfo` 的结果（base64 数据已解码）
#[derive(Debug, Clone, PartialEq)]
pub struct AccountInfo {
    pub lamports: u64,
    pub owner: String,
    pub data: Vec<u8>,
    pub executable: bool,
}

/// `getTokenAccountsByOwner`（jsonParsed）里的一个代币账户
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTokenAccount {
    pub pubkey: String,
    pub mint: String,
    pub owner: String,
    pub amount: u64,
    pub decimals: u8,
    pub program_id: String,
    /// Token-2022 扩展（jsonParsed 原样保留）；旧代币程序为空
    pub extensions: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureStatus {
    #[serde(default)]
    pub confirmation_status: Option<String>,
    #[serde(default)]
    pub err: Option<serde_json::Value>,
}

impl SignatureStatus {
    pub fn is_confirmed(&self) -> bool {
        matches!(
            self.confirmation_status.as_deref(),
            Some("confirmed") | Some("finalized")
        )
    }
}

#[async_trait]
pub trait SolanaRpc: Send + Sync {
    fn endpoint(&self) -> &str;

    async fn get_balance(&self, address: &str) -> AppResult<u64>;

    async fn get_token_accounts_by_owner(
        &self,
        owner: &str,
        program_id: &str,
    ) -> AppResult<Vec<ParsedTokenAccount>>;

    /// 账户不存在返回 `None`
    async fn get_account_info(&self, address: &str) -> AppResult<Option<AccountInfo>>;

    async fn get_latest_blockhash(&self) -> AppResult<String>;

    /// 节点拒绝（预检失败等）返回 `TransactionRejected`
    async fn send_transaction(&self, tx_base64: &str) -> AppResult<String>;

    async fn get_signature_status(&self, signature: &str) -> AppResult<Option<SignatureStatus>>;

    /// 区块哈希已过期时节点返回 `null`
    async fn get_fee_for_message(&self, message_base64: &str) -> AppResult<Option<u64>>;

    async fn get_epoch(&self) -> AppResult<u64>;

    async fn request_airdrop(&self, address: &str, lamports: u64) -> AppResult<String>;

    /// DAS 扩展：`getAssetsByOwner`，返回原始 items
    async fn get_assets_by_owner(
        &self,
        owner: &str,
        limit: usize,
    ) -> AppResult<Vec<serde_json::Value>>;
}

/// 按网络创建 RPC 句柄
pub trait RpcConnector: Send + Sync {
    fn connect(&self, network: &Network) -> Arc<dyn SolanaRpc>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HTTP 实现
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Deserialize)]
struct Contextual<T> {
    value: T,
}

#[derive(Deserialize)]
struct RawAccountInfo {
    lamports: u64,
    owner: String,
    data: (String, String),
    #[serde(default)]
    executable: bool,
}

#[derive(Deserialize)]
struct RawKeyedAccount {
    pubkey: String,
    account: RawParsedAccount,
}

#[derive(Deserialize)]
struct RawParsedAccount {
    owner: String,
    data: RawParsedData,
}

#[derive(Deserialize)]
struct RawParsedData {
    parsed: RawParsed,
}

#[derive(Deserialize)]
struct RawParsed {
    info: RawTokenInfo,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTokenInfo {
    mint: String,
    owner: String,
    token_amount: RawTokenAmount,
    #[serde(default)]
    extensions: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct RawTokenAmount {
    amount: String,
    decimals: u8,
}

#[derive(Deserialize)]
struct RawBlockhash {
    blockhash: String,
}

#[derive(Deserialize)]
struct RawEpochInfo {
    epoch: u64,
}

#[derive(Deserialize)]
struct RawAssetPage {
    #[serde(default)]
    items: Vec<serde_json::Value>,
}

pub struct HttpSolanaRpc {
    url: String,
    upstream: UpstreamClient,
}

impl HttpSolanaRpc {
    pub fn new(url: impl Into<String>, upstream: UpstreamClient) -> Self {
        Self {
            url: url.into(),
            upstream,
        }
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> AppResult<T> {
        self.upstream.json_rpc(&self.url, method, params).await
    }
}

#[async_trait]
impl SolanaRpc for HttpSolanaRpc {
    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn get_balance(&self, address: &str) -> AppResult<u64> {
        let res: Contextual<u64> = self
            .call("getBalance", json!([address, { "commitment": "confirmed" }]))
            .await?;
        Ok(res.value)
    }

    async fn get_token_accounts_by_owner(
        &self,
        owner: &str,
        program_id: &str,
    ) -> AppResult<Vec<ParsedTokenAccount>> {
        let res: Contextual<Vec<RawKeyedAccount>> = self
            .call(
                "getTokenAccountsByOwner",
                json!([
                    owner,
                    { "programId": program_id },
                    { "encoding": "jsonParsed", "commitment": "confirmed" }
                ]),
            )
            .await?;

        res.value
            .into_iter()
            .map(|keyed| {
                let info = keyed.account.data.parsed.info;
                let amount = info.token_amount.amount.parse::<u64>().map_err(|e| {
                    AppError::transient(format!(
                        "Invalid token amount for {}: {}",
                        keyed.pubkey, e
                    ))
                })?;
                Ok(ParsedTokenAccount {
                    pubkey: keyed.pubkey,
                    mint: info.mint,
                    owner: info.owner,
                    amount,
                    decimals: info.token_amount.decimals,
                    program_id: keyed.account.owner,
                    extensions: info.extensions,
                })
            })
            .collect()
    }

    async fn get_account_info(&self, address: &str) -> AppResult<Option<AccountInfo>> {
        let res: Contextual<Option<RawAccountInfo>> = self
            .call(
                "getAccountInfo",
                json!([address, { "encoding": "base64", "commitment": "confirmed" }]),
            )
            .await?;

        res.value
            .map(|raw| {
                let data = base64::engine::general_purpose::STANDARD
                    .decode(&raw.data.0)
                    .map_err(|e| {
                        AppError::transient(format!("Invalid account data for {}: {}", address, e))
                    })?;
                Ok(AccountInfo {
                    lamports: raw.lamports,
                    owner: raw.owner,
                    data,
                    executable: raw.executable,
                })
            })
            .transpose()
    }

    async fn get_latest_blockhash(&self) -> AppResult<String> {
        let res: Contextual<RawBlockhash> = self
            .call("getLatestBlockhash", json!([{ "commitment": "confirmed" }]))
            .await?;
        Ok(res.value.blockhash)
    }

    async fn send_transaction(&self, tx_base64: &str) -> AppResult<String> {
        let outcome = self
            .upstream
            .json_rpc_checked::<String>(
                &self.url,
                "sendTransaction",
                json!([tx_base64, { "encoding": "base64", "preflightCommitment": "confirmed" }]),
            )
            .await?;

        match outcome {
            Ok(signature) => {
                tracing::info!(signature = %signature, endpoint = %self.url, "transaction submitted");
                Ok(signature)
            }
            Err(err) => Err(AppError::rejected(
                format!("Transaction rejected by node: {}", err),
                None,
            )),
        }
    }

    async fn get_signature_status(&self, signature: &str) -> AppResult<Option<SignatureStatus>> {
        let res: Contextual<Vec<Option<SignatureStatus>>> = self
            .call(
                "getSignatureStatuses",
                json!([[signature], { "searchTransactionHistory": true }]),
            )
            .await?;
        Ok(res.value.into_iter().next().flatten())
    }

    async fn get_fee_for_message(&self, message_base64: &str) -> AppResult<Option<u64>> {
        let res: Contextual<Option<u64>> = self
            .call(
                "getFeeForMessage",
                json!([message_base64, { "commitment": "processed" }]),
            )
            .await?;
        Ok(res.value)
    }

    async fn get_epoch(&self) -> AppResult<u64> {
        let res: RawEpochInfo = self.call("getEpochInfo", json!([])).await?;
        Ok(res.epoch)
    }

    async fn request_airdrop(&self, address: &str, lamports: u64) -> AppResult<String> {
        self.call("requestAirdrop", json!([address, lamports])).await
    }

    async fn get_assets_by_owner(
        &self,
        owner: &str,
        limit: usize,
    ) -> AppResult<Vec<serde_json::Value>> {
        let res: RawAssetPage = self
            .call(
                "getAssetsByOwner",
                json!({
                    "ownerAddress": owner,
                    "page": 1,
                    "limit": limit,
                    "displayOptions": { "showFungible": false }
                }),
            )
            .await?;
        Ok(res.items)
    }
}

/// 默认连接器：每个账户一个 `HttpSolanaRpc`，共享底层连接池
#[derive(Clone, Default)]
pub struct HttpRpcConnector {
    upstream: UpstreamClient,
}

impl HttpRpcConnector {
    pub fn new(upstream: UpstreamClient) -> Self {
        Self { upstream }
    }
}

impl RpcConnector for HttpRpcConnector {
    fn connect(&self, network: &Network) -> Arc<dyn SolanaRpc> {
        tracing::debug!(network = %network.id, url = %network.config.node_url, "opening rpc connection");
        Arc::new(HttpSolanaRpc::new(
            network.config.node_url.clone(),
            self.upstream.clone(),
        ))
    }
}
