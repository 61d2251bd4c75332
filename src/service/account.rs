//! 区块链账户接口
//!
//! 一个账户 = 网络 + 派生索引 + 密钥对。各链族只实现自己声明的能力，
//! 其余方法走默认实现，返回 `UnsupportedCapability`，而不是空结果。

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    domain::{
        capability::Capability,
        derivation::DerivationPath,
        network::Network,
        nft::{Nft, NftListing, NftPage, PageRequest},
        quote::{Quote, SwapStep},
        token::{Balance, TokenBalance, TokenInfo},
    },
    error::{AppError, AppResult},
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransferOptions {
    #[serde(default)]
    pub memo: Option<String>,
}

impl TransferOptions {
    pub fn with_memo(memo: impl Into<String>) -> Self {
        Self {
            memo: Some(memo.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResult {
    pub tx_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationLevel {
    Error,
    Warning,
    Success,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
    InvalidAddress,
    EmptyAccount,
    NoFunds,
    ValidAccount,
}

/// 目标账户检查结果，序列化为 `{"type": "WARNING", "code": "NO_FUNDS"}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationValidation {
    #[serde(rename = "type")]
    pub level: ValidationLevel,
    pub code: ValidationCode,
}

impl DestinationValidation {
    pub const INVALID_ADDRESS: Self = Self {
        level: ValidationLevel::Error,
        code: ValidationCode::InvalidAddress,
    };
    pub const EMPTY_ACCOUNT: Self = Self {
        level: ValidationLevel::Warning,
        code: ValidationCode::EmptyAccount,
    };
    pub const NO_FUNDS: Self = Self {
        level: ValidationLevel::Warning,
        code: ValidationCode::NoFunds,
    };
    pub const VALID_ACCOUNT: Self = Self {
        level: ValidationLevel::Success,
        code: ValidationCode::ValidAccount,
    };

    /// 按链上余额分类：账户不存在 / 余额为零 / 正常
    pub fn from_lamports(lamports: Option<u64>) -> Self {
        match lamports {
            None => Self::EMPTY_ACCOUNT,
            Some(0) => Self::NO_FUNDS,
            Some(_) => Self::VALID_ACCOUNT,
        }
    }
}

/// 确认轮询参数
#[derive(Debug, Clone, Copy)]
pub struct ConfirmPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for ConfirmPolicy {
    fn default() -> Self {
        Self {
            attempts: 30,
            interval: Duration::from_secs(1),
        }
    }
}

#[async_trait]
pub trait BlockchainAccount: Send + Sync {
    fn network(&self) -> &Network;

    fn index(&self) -> u32;

    fn path(&self) -> &DerivationPath;

    /// 链上编码的公钥（SVM base58，Bitcoin 为压缩公钥 hex）
    fn public_key(&self) -> String;

    fn receive_address(&self) -> String;

    fn capabilities(&self) -> &'static [Capability];

    fn supports(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// 聚合余额在共享缓存里的键：`network_id:public_key`
    fn balance_cache_key(&self) -> String {
        format!("{}:{}", self.network().id, self.public_key())
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 余额
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// 原生币余额，最小单位
    async fn get_credit(&self) -> AppResult<u64> {
        Err(AppError::unsupported(Capability::Balance))
    }

    async fn get_tokens(&self) -> AppResult<Vec<TokenBalance>> {
        Err(AppError::unsupported(Capability::Tokens))
    }

    async fn get_balance(&self) -> AppResult<Balance> {
        Err(AppError::unsupported(Capability::Balance))
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 转账
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// 网络费（最小单位）；远端暂时不可用时为 `None`
    async fn estimate_transfer_fee(
        &self,
        _destination: &str,
        _token: &str,
        _amount: Decimal,
        _opts: &TransferOptions,
    ) -> AppResult<Option<u64>> {
        Err(AppError::unsupported(Capability::Transfer))
    }

    async fn create_transfer(
        &self,
        _destination: &str,
        _token: &str,
        _amount: Decimal,
        _opts: &TransferOptions,
    ) -> AppResult<TransferResult> {
        Err(AppError::unsupported(Capability::Transfer))
    }

    async fn confirm_transfer(&self, _tx_id: &str) -> AppResult<()> {
        Err(AppError::unsupported(Capability::Transfer))
    }

    async fn requires_memo(&self, _destination: &str, _token: &str) -> AppResult<bool> {
        Err(AppError::unsupported(Capability::Memo))
    }

    /// 代币扩展层面扣除的手续费（最小单位）；mint 没有手续费扩展时为 `None`
    async fn calculate_transfer_fee(&self, _token: &str, _amount: Decimal) -> AppResult<Option<u64>> {
        Err(AppError::unsupported(Capability::TransferFee))
    }

    async fn estimate_transactions_fee(&self, _messages: &[String]) -> AppResult<u64> {
        Err(AppError::unsupported(Capability::MultiMessageFee))
    }

    async fn airdrop(&self, _lamports: u64) -> AppResult<String> {
        Err(AppError::unsupported(Capability::Airdrop))
    }

    /// 地址格式错误不算失败，返回 `INVALID_ADDRESS`
    async fn validate_destination_account(&self, _address: &str) -> AppResult<DestinationValidation> {
        Err(AppError::unsupported(Capability::ValidateDestination))
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 域名
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// 本账户的收藏域名；没有设置时为 `None`
    async fn get_domain(&self) -> AppResult<Option<String>> {
        Err(AppError::unsupported(Capability::DomainNames))
    }

    async fn get_domain_from_public_key(&self, _public_key: &str) -> AppResult<Option<String>> {
        Err(AppError::unsupported(Capability::DomainNames))
    }

    /// 域名未注册时为 `None`
    async fn get_public_key_from_domain(&self, _domain: &str) -> AppResult<Option<String>> {
        Err(AppError::unsupported(Capability::DomainNames))
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // NFT
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    async fn get_all_nfts(&self, _no_cache: bool) -> AppResult<Vec<Nft>> {
        Err(AppError::unsupported(Capability::Nfts))
    }

    async fn get_all_nfts_page(&self, _request: PageRequest) -> AppResult<NftPage> {
        Err(AppError::unsupported(Capability::Nfts))
    }

    async fn get_all_nfts_grouped(&self) -> AppResult<Vec<NftListing>> {
        Err(AppError::unsupported(Capability::Nfts))
    }

    async fn get_nft(&self, _mint: &str) -> AppResult<Option<Nft>> {
        Err(AppError::unsupported(Capability::Nfts))
    }

    async fn create_nft_burn_transaction(&self, _mint: &str) -> AppResult<TransferResult> {
        Err(AppError::unsupported(Capability::NftBurn))
    }

    async fn confirm_nft_burn(&self, _tx_id: &str) -> AppResult<()> {
        Err(AppError::unsupported(Capability::NftBurn))
    }

    async fn list_nft(&self, _mint: &str, _price: Decimal) -> AppResult<TransferResult> {
        Err(AppError::unsupported(Capability::NftMarketplace))
    }

    async fn unlist_nft(&self, _mint: &str) -> AppResult<TransferResult> {
        Err(AppError::unsupported(Capability::NftMarketplace))
    }

    /// `marketplace_id` 决定签名方式（部分市场返回完整交易，只需补签）
    async fn buy_nft(
        &self,
        _mint: &str,
        _price: Decimal,
        _marketplace_id: Option<&str>,
    ) -> AppResult<TransferResult> {
        Err(AppError::unsupported(Capability::NftMarketplace))
    }

    async fn bid_nft(&self, _mint: &str, _price: Decimal) -> AppResult<TransferResult> {
        Err(AppError::unsupported(Capability::NftMarketplace))
    }

    async fn cancel_bid_nft(&self, _mint: &str) -> AppResult<TransferResult> {
        Err(AppError::unsupported(Capability::NftMarketplace))
    }

    async fn get_listed_nfts(&self) -> AppResult<Vec<serde_json::Value>> {
        Err(AppError::unsupported(Capability::NftMarketplace))
    }

    async fn get_nft_bids(&self) -> AppResult<Vec<serde_json::Value>> {
        Err(AppError::unsupported(Capability::NftMarketplace))
    }

    async fn get_collection_group(&self, _filter: &str) -> AppResult<serde_json::Value> {
        Err(AppError::unsupported(Capability::NftCollections))
    }

    async fn get_collection(&self, _id: &str) -> AppResult<serde_json::Value> {
        Err(AppError::unsupported(Capability::NftCollections))
    }

    async fn get_collection_items(&self, _id: &str, _page: u32) -> AppResult<serde_json::Value> {
        Err(AppError::unsupported(Capability::NftCollections))
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 兑换与代币列表
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    async fn get_best_swap_quote(
        &self,
        _input_mint: &str,
        _output_mint: &str,
        _amount: Decimal,
        _slippage_bps: u16,
    ) -> AppResult<Quote> {
        Err(AppError::unsupported(Capability::Swap))
    }

    async fn create_swap_transaction(&self, _quote: &Quote) -> AppResult<Vec<SwapStep>> {
        Err(AppError::unsupported(Capability::Swap))
    }

    async fn get_available_tokens(&self) -> AppResult<Vec<TokenInfo>> {
        Err(AppError::unsupported(Capability::AvailableTokens))
    }

    async fn get_featured_tokens(&self) -> AppResult<Vec<TokenInfo>> {
        Err(AppError::unsupported(Capability::FeaturedTokens))
    }
}
