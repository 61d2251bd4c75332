//! Bitcoin 账户（P2WPKH）
//!
//! 只有余额与原生币转账；其余操作走接口默认实现，返回 `UnsupportedCapability`。

pub mod transfer;

use std::sync::Arc;

use async_trait::async_trait;
use bitcoin::secp256k1::{All, Secp256k1};
use once_cell::sync::OnceCell;
use rust_decimal::Decimal;

use crate::{
    domain::{
        capability::{capabilities_of, Capability},
        derivation::{DerivationPath, Keypair},
        network::{BlockchainFamily, NativeCurrency, Network},
        token::{last_24h_change, Balance, TokenBalance},
    },
    error::{AppError, AppResult},
    infrastructure::{
        cache::{CacheType, ResilienceCache},
        esplora::{EsploraApi, EsploraConnector},
    },
    service::{
        account::{BlockchainAccount, ConfirmPolicy, TransferOptions, TransferResult},
        price_service::{PriceFeed, PriceIndex},
    },
};

use transfer::{bitcoin_network, p2wpkh_address, BitcoinTransferService};

/// 所有 Bitcoin 账户共享：签名上下文、Esplora 连接器、价格源、缓存
pub struct BitcoinServices {
    pub connector: Arc<dyn EsploraConnector>,
    pub prices: Arc<dyn PriceFeed>,
    pub cache: Arc<ResilienceCache>,
    secp: Arc<Secp256k1<All>>,
    confirm: ConfirmPolicy,
}

impl BitcoinServices {
    pub fn new(
        connector: Arc<dyn EsploraConnector>,
        prices: Arc<dyn PriceFeed>,
        cache: Arc<ResilienceCache>,
    ) -> Self {
        Self {
            connector,
            prices,
            cache,
            secp: Arc::new(Secp256k1::new()),
            confirm: ConfirmPolicy::default(),
        }
    }

    pub fn with_confirm_policy(mut self, confirm: ConfirmPolicy) -> Self {
        self.confirm = confirm;
        self
    }
}

pub struct BitcoinAccount {
    network: Network,
    index: u32,
    path: DerivationPath,
    keypair: Keypair,
    btc_network: bitcoin::Network,
    address: bitcoin::Address,
    services: Arc<BitcoinServices>,
    esplora: OnceCell<Arc<dyn EsploraApi>>,
}

impl BitcoinAccount {
    pub fn new(
        network: Network,
        index: u32,
        path: DerivationPath,
        keypair: Keypair,
        services: Arc<BitcoinServices>,
    ) -> AppResult<Self> {
        if network.blockchain != BlockchainFamily::Bitcoin {
            return Err(AppError::internal(format!("{} is not a bitcoin network", network.id)));
        }
        if !matches!(keypair, Keypair::Secp256k1(_)) {
            return Err(AppError::internal("Bitcoin accounts require a secp256k1 keypair"));
        }
        let btc_network = bitcoin_network(network.environment);
        let address = p2wpkh_address(&keypair.public_key_bytes(), btc_network)?;

        Ok(Self {
            network,
            index,
            path,
            keypair,
            btc_network,
            address,
            services,
            esplora: OnceCell::new(),
        })
    }

    pub fn address(&self) -> &bitcoin::Address {
        &self.address
    }

    pub fn esplora(&self) -> Arc<dyn EsploraApi> {
        Arc::clone(
            self.esplora
                .get_or_init(|| self.services.connector.connect(&self.network)),
        )
    }

    fn transfers(&self) -> BitcoinTransferService {
        BitcoinTransferService::new(
            self.esplora(),
            Arc::clone(&self.services.secp),
            self.btc_network,
            self.address.clone(),
            self.network.currency.clone(),
        )
        .with_confirm_policy(self.services.confirm)
    }

}

fn native_item(currency: &NativeCurrency, owner: &str, sats: u64) -> TokenBalance {
    let mut item = TokenBalance::new(&currency.address, owner, sats, currency.decimals);
    item.symbol = currency.symbol.clone();
    item.name = currency.name.clone();
    item.logo = currency.logo.clone();
    item.coingecko_id = currency.coingecko_id.clone();
    item.is_native = true;
    item
}

/// 价格源整体失败时仍返回余额，只是没有美元字段
async fn priced_balance(mut items: Vec<TokenBalance>, prices: &dyn PriceFeed, platform: &str) -> Balance {
    let prices = match prices.prices(platform).await {
        Ok(prices) => prices,
        Err(e) => {
            tracing::warn!(platform, error = %e, "could not get prices");
            return Balance {
                usd_total: None,
                last_24h_change: None,
                items,
            };
        }
    };

    let index = PriceIndex::new(prices);
    for item in &mut items {
        if let Some(price) = index.lookup(&item.address, item.coingecko_id.as_deref()) {
            item.apply_price(price.usd_price, price.perc_24h_change);
        }
    }
    let usd_total: f64 = items.iter().filter_map(|t| t.usd_balance).sum();
    let change = last_24h_change(&items, usd_total);

    Balance {
        usd_total: Some(usd_total),
        last_24h_change: Some(change),
        items,
    }
}

#[async_trait]
impl BlockchainAccount for BitcoinAccount {
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
        hex::encode(self.keypair.public_key_bytes())
    }

    fn receive_address(&self) -> String {
        self.address.to_string()
    }

    fn capabilities(&self) -> &'static [Capability] {
        capabilities_of(BlockchainFamily::Bitcoin)
    }

    async fn get_credit(&self) -> AppResult<u64> {
        let stats = self.esplora().address_stats(&self.address.to_string()).await?;
        Ok(stats.balance())
    }

    async fn get_tokens(&self) -> AppResult<Vec<TokenBalance>> {
        let sats = self.get_credit().await?;
        Ok(vec![native_item(&self.network.currency, &self.address.to_string(), sats)])
    }

    async fn get_balance(&self) -> AppResult<Balance> {
        let esplora = self.esplora();
        let prices = Arc::clone(&self.services.prices);
        let currency = self.network.currency.clone();
        let address = self.address.to_string();
        let platform = self.network.blockchain.price_platform();

        self.services
            .cache
            .get(&self.balance_cache_key(), CacheType::Balance, move || async move {
                let stats = esplora.address_stats(&address).await?;
                let items = vec![native_item(&currency, &address, stats.balance())];
                Ok(priced_balance(items, prices.as_ref(), platform).await)
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
}
