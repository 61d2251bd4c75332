//! 账户工厂
//!
//! 按链族分派的唯一入口。各链族共享的服务在第一次用到时才创建。

use std::{collections::BTreeMap, sync::Arc};

use futures::future::join_all;
use once_cell::sync::OnceCell;
use zeroize::Zeroizing;

use crate::{
    config::Config,
    domain::{
        derivation::{derive_keypair, DerivationPath},
        network::{BlockchainFamily, Network},
    },
    error::{AppError, AppResult},
    infrastructure::{
        cache::ResilienceCache, esplora::EsploraConnector, solana_rpc::RpcConnector,
        upstream::UpstreamClient,
    },
    service::{
        account::{BlockchainAccount, ConfirmPolicy},
        bitcoin::{BitcoinAccount, BitcoinServices},
        price_service::PriceFeed,
        svm::{SvmAccount, SvmServices},
    },
};

pub struct AccountFactory {
    config: Arc<Config>,
    cache: Arc<ResilienceCache>,
    upstream: UpstreamClient,
    rpc_connector: Arc<dyn RpcConnector>,
    esplora_connector: Arc<dyn EsploraConnector>,
    prices: Arc<dyn PriceFeed>,
    confirm: ConfirmPolicy,
    svm: OnceCell<Arc<SvmServices>>,
    bitcoin: OnceCell<Arc<BitcoinServices>>,
}

impl AccountFactory {
    pub fn new(
        config: Arc<Config>,
        cache: Arc<ResilienceCache>,
        upstream: UpstreamClient,
        rpc_connector: Arc<dyn RpcConnector>,
        esplora_connector: Arc<dyn EsploraConnector>,
        prices: Arc<dyn PriceFeed>,
    ) -> Self {
        Self {
            config,
            cache,
            upstream,
            rpc_connector,
            esplora_connector,
            prices,
            confirm: ConfirmPolicy::default(),
            svm: OnceCell::new(),
            bitcoin: OnceCell::new(),
        }
    }

    pub fn with_confirm_policy(mut self, confirm: ConfirmPolicy) -> Self {
        self.confirm = confirm;
        self
    }

    /// 预置 SVM 共享服务（替换默认的数据源组合）
    pub fn with_svm_services(mut self, services: Arc<SvmServices>) -> Self {
        self.svm = OnceCell::with_value(services);
        self
    }

    pub fn with_bitcoin_services(mut self, services: Arc<BitcoinServices>) -> Self {
        self.bitcoin = OnceCell::with_value(services);
        self
    }

    pub fn svm_services(&self) -> Arc<SvmServices> {
        Arc::clone(self.svm.get_or_init(|| {
            tracing::debug!("initializing svm services");
            Arc::new(
                SvmServices::new(
                    Arc::clone(&self.config),
                    Arc::clone(&self.cache),
                    self.upstream.clone(),
                    Arc::clone(&self.rpc_connector),
                    Arc::clone(&self.prices),
                )
                .with_confirm_policy(self.confirm),
            )
        }))
    }

    pub fn bitcoin_services(&self) -> Arc<BitcoinServices> {
        Arc::clone(self.bitcoin.get_or_init(|| {
            tracing::debug!("initializing bitcoin services");
            Arc::new(
                BitcoinServices::new(
                    Arc::clone(&self.esplora_connector),
                    Arc::clone(&self.prices),
                    Arc::clone(&self.cache),
                )
                .with_confirm_policy(self.confirm),
            )
        }))
    }

    pub fn is_initialized(&self, family: BlockchainFamily) -> bool {
        match family {
            BlockchainFamily::Solana | BlockchainFamily::Eclipse => self.svm.get().is_some(),
            BlockchainFamily::Bitcoin => self.bitcoin.get().is_some(),
        }
    }

    /// 助记词 + 网络 + 索引 → 账户
    pub async fn create_account(
        &self,
        network: &Network,
        mnemonic: &str,
        index: u32,
    ) -> AppResult<Arc<dyn BlockchainAccount>> {
        let path = DerivationPath::for_account(network.coin_type(), index);

        // 派生是纯 CPU 计算
        let phrase = Zeroizing::new(mnemonic.to_string());
        let derive_path = path.clone();
        let keypair = tokio::task::spawn_blocking(move || derive_keypair(&phrase, &derive_path))
            .await
            .map_err(|e| AppError::internal(format!("Derivation task failed: {}", e)))??;

        let account: Arc<dyn BlockchainAccount> = match network.blockchain {
            BlockchainFamily::Solana | BlockchainFamily::Eclipse => Arc::new(SvmAccount::new(
                network.clone(),
                index,
                path,
                keypair,
                self.svm_services(),
            )?),
            BlockchainFamily::Bitcoin => Arc::new(BitcoinAccount::new(
                network.clone(),
                index,
                path,
                keypair,
                self.bitcoin_services(),
            )?),
        };

        tracing::info!(
            network = %network.id,
            index,
            path = %account.path(),
            address = %account.receive_address(),
            "account created"
        );
        Ok(account)
    }

    /// 并行派生；失败的索引记录日志后跳过
    pub async fn create_many_accounts(
        &self,
        network: &Network,
        mnemonic: &str,
        indexes: &[u32],
    ) -> BTreeMap<u32, Arc<dyn BlockchainAccount>> {
        let results = join_all(
            indexes
                .iter()
                .map(|&index| async move { (index, self.create_account(network, mnemonic, index).await) }),
        )
        .await;

        results
            .into_iter()
            .filter_map(|(index, result)| match result {
                Ok(account) => Some((index, account)),
                Err(e) => {
                    tracing::warn!(network = %network.id, index, error = %e, "account derivation failed");
                    None
                }
            })
            .collect()
    }
}
