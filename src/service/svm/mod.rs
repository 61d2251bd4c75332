//! SVM 账户（Solana / Eclipse）
//!
//! 两条链共用交易格式、转账与余额逻辑，差别只在元数据来源、NFT 来源与能力集合。

pub mod balance_service;
pub mod name_service;
pub mod nft_service;
pub mod pubkey;
pub mod swap_service;
pub mod token_list_service;
pub mod token_program;
pub mod transaction;
pub mod transfer_service;

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use rust_decimal::Decimal;

use crate::{
    config::Config,
    domain::{
        capability::{capabilities_of, Capability},
        derivation::{DerivationPath, Keypair},
        network::{BlockchainFamily, Network},
        nft::{Nft, NftListing, NftPage, PageRequest},
        quote::{Quote, SwapStep},
        token::{Balance, TokenBalance, TokenInfo},
    },
    error::{AppError, AppResult},
    infrastructure::{
        cache::{CacheType, ResilienceCache},
        solana_rpc::{RpcConnector, SolanaRpc},
        upstream::UpstreamClient,
    },
    service::{
        account::{
            BlockchainAccount, ConfirmPolicy, DestinationValidation, TransferOptions, TransferResult,
        },
        price_service::PriceFeed,
    },
};

use balance_service::{
    BackendMetadataSource, MetadataSource, OnChainMetadataSource, SvmBalanceService,
    TokenListMetadataSource,
};
use name_service::SvmNameService;
use nft_service::{BackendNftSource, DasIndexerSource, MarketplaceAction, NftSource, SvmNftService, ME_PROGRAM_ID};
use pubkey::Pubkey;
use swap_service::SvmSwapService;
use token_list_service::TokenListService;
use transaction::Transaction;
use transfer_service::SvmTransferService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SvmFlavor {
    Solana,
    Eclipse,
}

impl SvmFlavor {
    pub fn from_family(family: BlockchainFamily) -> AppResult<Self> {
        match family {
            BlockchainFamily::Solana => Ok(SvmFlavor::Solana),
            BlockchainFamily::Eclipse => Ok(SvmFlavor::Eclipse),
            other => Err(AppError::internal(format!("{} is not an SVM chain", other))),
        }
    }

    pub fn family(&self) -> BlockchainFamily {
        match self {
            SvmFlavor::Solana => BlockchainFamily::Solana,
            SvmFlavor::Eclipse => BlockchainFamily::Eclipse,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 共享服务
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 同一 SVM 链族的所有账户共享
pub struct SvmServices {
    pub config: Arc<Config>,
    pub cache: Arc<ResilienceCache>,
    pub upstream: UpstreamClient,
    pub connector: Arc<dyn RpcConnector>,
    pub token_list: Arc<TokenListService>,
    pub prices: Arc<dyn PriceFeed>,
    solana_metadata: Vec<Arc<dyn MetadataSource>>,
    eclipse_metadata: Vec<Arc<dyn MetadataSource>>,
    solana_nfts: Vec<Arc<dyn NftSource>>,
    eclipse_nfts: Vec<Arc<dyn NftSource>>,
    confirm: ConfirmPolicy,
}

impl SvmServices {
    pub fn new(
        config: Arc<Config>,
        cache: Arc<ResilienceCache>,
        upstream: UpstreamClient,
        connector: Arc<dyn RpcConnector>,
        prices: Arc<dyn PriceFeed>,
    ) -> Self {
        let api_url = config.api_url();
        let token_list = Arc::new(TokenListService::new(
            upstream.clone(),
            &api_url,
            config.token_list.clone(),
        ));

        let backend_metadata: Arc<dyn MetadataSource> = Arc::new(BackendMetadataSource::new(
            upstream.clone(),
            &api_url,
            config.token_list.metadata_batch_size,
            Arc::clone(&cache),
        ));
        let list_metadata: Arc<dyn MetadataSource> =
            Arc::new(TokenListMetadataSource::new(Arc::clone(&token_list)));
        let on_chain_metadata: Arc<dyn MetadataSource> =
            Arc::new(OnChainMetadataSource::new(upstream.clone()));

        let das: Arc<dyn NftSource> = Arc::new(DasIndexerSource::new(config.nft.das_fetch_limit));
        let backend_nfts: Arc<dyn NftSource> = Arc::new(BackendNftSource::new(upstream.clone(), &api_url));

        Self {
            solana_metadata: vec![Arc::clone(&backend_metadata), list_metadata],
            eclipse_metadata: vec![on_chain_metadata, backend_metadata],
            solana_nfts: vec![das, Arc::clone(&backend_nfts)],
            eclipse_nfts: vec![backend_nfts],
            config,
            cache,
            upstream,
            connector,
            token_list,
            prices,
            confirm: ConfirmPolicy::default(),
        }
    }

    pub fn with_metadata_sources(mut self, flavor: SvmFlavor, sources: Vec<Arc<dyn MetadataSource>>) -> Self {
        match flavor {
            SvmFlavor::Solana => self.solana_metadata = sources,
            SvmFlavor::Eclipse => self.eclipse_metadata = sources,
        }
        self
    }

    pub fn with_nft_sources(mut self, flavor: SvmFlavor, sources: Vec<Arc<dyn NftSource>>) -> Self {
        match flavor {
            SvmFlavor::Solana => self.solana_nfts = sources,
            SvmFlavor::Eclipse => self.eclipse_nfts = sources,
        }
        self
    }

    pub fn with_confirm_policy(mut self, confirm: ConfirmPolicy) -> Self {
        self.confirm = confirm;
        self
    }

    fn metadata_sources(&self, flavor: SvmFlavor) -> Vec<Arc<dyn MetadataSource>> {
        match flavor {
            SvmFlavor::Solana => self.solana_metadata.clone(),
            SvmFlavor::Eclipse => self.eclipse_metadata.clone(),
        }
    }

    fn nft_sources(&self, flavor: SvmFlavor) -> Vec<Arc<dyn NftSource>> {
        match flavor {
            SvmFlavor::Solana => self.solana_nfts.clone(),
            SvmFlavor::Eclipse => self.eclipse_nfts.clone(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 账户
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SvmAccount {
    flavor: SvmFlavor,
    network: Network,
    index: u32,
    path: DerivationPath,
    keypair: Keypair,
    pubkey: Pubkey,
    services: Arc<SvmServices>,
    rpc: OnceCell<Arc<dyn SolanaRpc>>,
}

impl SvmAccount {
    pub fn new(
        network: Network,
        index: u32,
        path: DerivationPath,
        keypair: Keypair,
        services: Arc<SvmServices>,
    ) -> AppResult<Self> {
        let flavor = SvmFlavor::from_family(network.blockchain)?;
        if !matches!(keypair, Keypair::Ed25519(_)) {
            return Err(AppError::internal("SVM accounts require an ed25519 keypair"));
        }
        let pubkey = Pubkey::from_slice(&keypair.public_key_bytes())?;

        Ok(Self {
            flavor,
            network,
            index,
            path,
            keypair,
            pubkey,
            services,
            rpc: OnceCell::new(),
        })
    }

    pub fn flavor(&self) -> SvmFlavor {
        self.flavor
    }

    pub fn pubkey(&self) -> &Pubkey {
        &self.pubkey
    }

    /// 首次使用时连接，之后复用
    pub fn rpc(&self) -> Arc<dyn SolanaRpc> {
        Arc::clone(
            self.rpc
                .get_or_init(|| self.services.connector.connect(&self.network)),
        )
    }

    fn require(&self, capability: Capability) -> AppResult<()> {
        if self.supports(capability) {
            Ok(())
        } else {
            Err(AppError::unsupported(capability))
        }
    }

    fn transfers(&self) -> SvmTransferService {
        SvmTransferService::new(self.rpc(), self.pubkey, self.network.currency.clone())
            .with_confirm_policy(self.services.confirm)
    }

    fn balances(&self) -> SvmBalanceService {
        SvmBalanceService::new(
            self.rpc(),
            self.network.clone(),
            self.pubkey.to_string(),
            self.services.metadata_sources(self.flavor),
            Arc::clone(&self.services.prices),
        )
    }

    fn nfts(&self) -> SvmNftService {
        SvmNftService::new(
            self.rpc(),
            self.network.clone(),
            self.pubkey.to_string(),
            self.services.nft_sources(self.flavor),
            self.services.upstream.clone(),
            &self.services.config.api_url(),
            Arc::clone(&self.services.cache),
            self.services.config.nft.clone(),
        )
    }

    fn swaps(&self) -> SvmSwapService {
        SvmSwapService::new(
            self.services.upstream.clone(),
            &self.services.config.api_url(),
            self.network.clone(),
            self.pubkey.to_string(),
            Arc::clone(&self.services.token_list),
        )
    }

    /// 后端序列化的消息（legacy 或 v0）→ 本账户签名 → 发送
    pub async fn sign_serialized_message(&self, message: Vec<u8>) -> AppResult<String> {
        let mut tx = Transaction::from_message_bytes(message)?;
        tx.sign(&self.keypair)?;
        self.transfers().send(&tx).await
    }

    /// 后端构造好的完整交易 → 只补本账户的签名位 → 发送
    pub async fn partial_sign_transaction(&self, bytes: &[u8]) -> AppResult<String> {
        let mut tx = Transaction::deserialize(bytes)?;
        tx.sign(&self.keypair)?;
        self.transfers().send(&tx).await
    }

    async fn marketplace(
        &self,
        action: MarketplaceAction,
        mint: &str,
        price: Option<Decimal>,
    ) -> AppResult<TransferResult> {
        self.require(Capability::NftMarketplace)?;
        let payload = self.nfts().marketplace_payload(action, mint, price).await?;
        let tx_id = self.sign_serialized_message(payload).await?;
        tracing::info!(action = ?action, mint, tx_id = %tx_id, "marketplace transaction submitted");
        Ok(TransferResult { tx_id })
    }

    fn nft_cache_key(&self) -> String {
        format!("{}:{}", self.network.id, self.pubkey)
    }
}

#[async_trait]
impl BlockchainAccount for SvmAccount {
    fn network(&self) -> &Network {
        &self.network
    }

    fn index(&self) -> u32 {
        self.index
    }

    fn path(&self) -> &DerivationPath {
        &self.path
    }

    fn public_key(&self) -> String {
        self.pubkey.to_string()
    }

    fn receive_address(&self) -> String {
        self.pubkey.to_string()
    }

    fn capabilities(&self) -> &'static [Capability] {
        capabilities_of(self.flavor.family())
    }

    async fn get_credit(&self) -> AppResult<u64> {
        self.balances().get_credit().await
    }

    async fn get_tokens(&self) -> AppResult<Vec<TokenBalance>> {
        self.balances().get_tokens().await
    }

    async fn get_balance(&self) -> AppResult<Balance> {
        let balances = self.balances();
        self.services
            .cache
            .get(&self.balance_cache_key(), CacheType::Balance, move || async move {
                balances.get_balance().await
            })
            .await
    }

    async fn estimate_transfer_fee(
        &self,
        destination: &str,
        token: &str,
        amount: Decimal,
        opts: &TransferOptions,
    ) -> AppResult<Option<u64>> {
        self.transfers()
            .estimate_transfer_fee(destination, token, amount, opts)
            .await
    }

    async fn create_transfer(
        &self,
        destination: &str,
        token: &str,
        amount: Decimal,
        opts: &TransferOptions,
    ) -> AppResult<TransferResult> {
        let result = self
            .transfers()
            .create_transfer(&self.keypair, destination, token, amount, opts)
            .await?;
        self.services
            .cache
            .invalidate_key(CacheType::Balance, &self.balance_cache_key());
        Ok(result)
    }

    async fn confirm_transfer(&self, tx_id: &str) -> AppResult<()> {
        self.transfers().confirm_transfer(tx_id).await
    }

    async fn requires_memo(&self, destination: &str, token: &str) -> AppResult<bool> {
        self.transfers().requires_memo(destination, token).await
    }

    async fn calculate_transfer_fee(&self, token: &str, amount: Decimal) -> AppResult<Option<u64>> {
        self.transfers().calculate_transfer_fee(token, amount).await
    }

    async fn estimate_transactions_fee(&self, messages: &[String]) -> AppResult<u64> {
        self.transfers().estimate_transactions_fee(messages).await
    }

    async fn airdrop(&self, lamports: u64) -> AppResult<String> {
        if self.network.environment.is_mainnet() {
            return Err(AppError::unsupported(Capability::Airdrop));
        }
        let signature = self
            .rpc()
            .request_airdrop(&self.pubkey.to_string(), lamports)
            .await?;
        tracing::info!(network = %self.network.id, lamports, tx_id = %signature, "airdrop requested");
        Ok(signature)
    }

    async fn validate_destination_account(&self, address: &str) -> AppResult<DestinationValidation> {
        self.require(Capability::ValidateDestination)?;
        let pubkey: Pubkey = match address.trim().parse() {
            Ok(pubkey) => pubkey,
            Err(_) => return Ok(DestinationValidation::INVALID_ADDRESS),
        };
        let info = self.rpc().get_account_info(&pubkey.to_string()).await?;
        Ok(DestinationValidation::from_lamports(info.map(|i| i.lamports)))
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 域名
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    async fn get_domain(&self) -> AppResult<Option<String>> {
        self.require(Capability::DomainNames)?;
        let rpc = self.rpc();
        SvmNameService::new(rpc.as_ref()).favourite_domain(&self.pubkey).await
    }

    async fn get_domain_from_public_key(&self, public_key: &str) -> AppResult<Option<String>> {
        self.require(Capability::DomainNames)?;
        let owner: Pubkey = public_key.trim().parse()?;
        let rpc = self.rpc();
        SvmNameService::new(rpc.as_ref()).favourite_domain(&owner).await
    }

    async fn get_public_key_from_domain(&self, domain: &str) -> AppResult<Option<String>> {
        self.require(Capability::DomainNames)?;
        let rpc = self.rpc();
        let owner = SvmNameService::new(rpc.as_ref()).resolve(domain).await?;
        Ok(owner.map(|o| o.to_string()))
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // NFT
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    async fn get_all_nfts(&self, no_cache: bool) -> AppResult<Vec<Nft>> {
        self.nfts().get_all(no_cache).await
    }

    async fn get_all_nfts_page(&self, request: PageRequest) -> AppResult<NftPage> {
        self.nfts().get_page(request).await
    }

    async fn get_all_nfts_grouped(&self) -> AppResult<Vec<NftListing>> {
        self.nfts().get_grouped().await
    }

    async fn get_nft(&self, mint: &str) -> AppResult<Option<Nft>> {
        self.nfts().get_nft(mint).await
    }

    async fn create_nft_burn_transaction(&self, mint: &str) -> AppResult<TransferResult> {
        let message = self.nfts().burn_message(mint).await?;
        let mut tx = Transaction::new(&message)?;
        tx.sign(&self.keypair)?;
        let tx_id = self.transfers().send(&tx).await?;
        tracing::info!(mint, tx_id = %tx_id, "nft burn submitted");
        Ok(TransferResult { tx_id })
    }

    async fn confirm_nft_burn(&self, tx_id: &str) -> AppResult<()> {
        self.transfers().confirm_transfer(tx_id).await?;
        self.services
            .cache
            .invalidate_key(CacheType::Nfts, &self.nft_cache_key());
        Ok(())
    }

    async fn list_nft(&self, mint: &str, price: Decimal) -> AppResult<TransferResult> {
        self.marketplace(MarketplaceAction::List, mint, Some(price)).await
    }

    async fn unlist_nft(&self, mint: &str) -> AppResult<TransferResult> {
        self.marketplace(MarketplaceAction::Unlist, mint, None).await
    }

    async fn buy_nft(
        &self,
        mint: &str,
        price: Decimal,
        marketplace_id: Option<&str>,
    ) -> AppResult<TransferResult> {
        if marketplace_id != Some(ME_PROGRAM_ID) {
            return self.marketplace(MarketplaceAction::Buy, mint, Some(price)).await;
        }

        self.require(Capability::NftMarketplace)?;
        let payload = self
            .nfts()
            .marketplace_payload(MarketplaceAction::Buy, mint, Some(price))
            .await?;
        let tx_id = self.partial_sign_transaction(&payload).await?;
        tracing::info!(mint, tx_id = %tx_id, "marketplace buy submitted");
        Ok(TransferResult { tx_id })
    }

    async fn bid_nft(&self, mint: &str, price: Decimal) -> AppResult<TransferResult> {
        self.marketplace(MarketplaceAction::Bid, mint, Some(price)).await
    }

    async fn cancel_bid_nft(&self, mint: &str) -> AppResult<TransferResult> {
        self.marketplace(MarketplaceAction::CancelBid, mint, None).await
    }

    async fn get_listed_nfts(&self) -> AppResult<Vec<serde_json::Value>> {
        self.require(Capability::NftMarketplace)?;
        self.nfts().get_listed().await
    }

    async fn get_nft_bids(&self) -> AppResult<Vec<serde_json::Value>> {
        self.require(Capability::NftMarketplace)?;
        self.nfts().get_bids().await
    }

    async fn get_collection_group(&self, filter: &str) -> AppResult<serde_json::Value> {
        self.require(Capability::NftCollections)?;
        self.nfts().get_collection_group(filter).await
    }

    async fn get_collection(&self, id: &str) -> AppResult<serde_json::Value> {
        self.require(Capability::NftCollections)?;
        self.nfts().get_collection(id).await
    }

    async fn get_collection_items(&self, id: &str, page: u32) -> AppResult<serde_json::Value> {
        self.require(Capability::NftCollections)?;
        self.nfts().get_collection_items(id, page).await
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 兑换与代币列表
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    async fn get_best_swap_quote(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount: Decimal,
        slippage_bps: u16,
    ) -> AppResult<Quote> {
        self.require(Capability::Swap)?;
        self.swaps()
            .quote(input_mint, output_mint, amount, slippage_bps)
            .await
    }

    async fn create_swap_transaction(&self, quote: &Quote) -> AppResult<Vec<SwapStep>> {
        self.require(Capability::Swap)?;
        self.swaps()
            .execute(&self.keypair, &self.transfers(), quote)
            .await
    }

    async fn get_available_tokens(&self) -> AppResult<Vec<TokenInfo>> {
        self.require(Capability::AvailableTokens)?;
        let token_list = Arc::clone(&self.services.token_list);
        let network_id = self.network.id.clone();
        self.services
            .cache
            .get(&self.network.id, CacheType::AvailableTokens, move || async move {
                Ok(token_list.get_tokens(&network_id).await?.as_ref().clone())
            })
            .await
    }

    async fn get_featured_tokens(&self) -> AppResult<Vec<TokenInfo>> {
        self.require(Capability::FeaturedTokens)?;
        let token_list = Arc::clone(&self.services.token_list);
        let network_id = self.network.id.clone();
        self.services
            .cache
            .get(&self.network.id, CacheType::FeaturedTokens, move || async move {
                token_list.get_featured_tokens(&network_id).await
            })
            .await
    }
}
