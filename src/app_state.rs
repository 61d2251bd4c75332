use std::{sync::Arc, time::Duration};

use crate::{
    config::Config,
    infrastructure::{
        cache::{CacheType, ResilienceCache},
        esplora::HttpEsploraConnector, solana_rpc::HttpRpcConnector,
        upstream::UpstreamClient,
    },
    service::{
        account_factory::AccountFactory,
        bridge_service::{BridgeOrchestrator, HttpBridgeApi, InMemoryPendingBridgeStore},
        network_service::NetworkService,
        price_service::{HttpPriceFeed, PriceFeed},
        swap_orchestrator::SwapOrchestrator,
    },
};

/// 适配层状态
/// 包含所有共享资源，由调用方持有；缓存只有这一份
#[derive(Clone)]
pub struct AdapterState {
    pub config: Arc<Config>,
    pub cache: Arc<ResilienceCache>,
    pub upstream: UpstreamClient,
    pub prices: Arc<dyn PriceFeed>,
    pub networks: Arc<NetworkService>,
    pub accounts: Arc<AccountFactory>,
    pub swaps: Arc<SwapOrchestrator>,
    pub bridge: Arc<BridgeOrchestrator>,
}

impl AdapterState {
    /// 创建新的适配层状态（全部使用 HTTP 实现）
    pub fn new(config: Config) -> anyhow::Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let cache = Arc::new(
            ResilienceCache::with_ttl(Duration::from_secs(config.cache.ttl_secs)).with_type_ttl(
                CacheType::BridgeSupported,
                Duration::from_secs(config.bridge.supported_ttl_secs),
            ),
        );
        let upstream = UpstreamClient::new(&config.http);
        let api_url = config.api_url();

        let prices: Arc<dyn PriceFeed> = Arc::new(HttpPriceFeed::new(
            upstream.clone(),
            &config.static_api_url(),
            Arc::clone(&cache),
        ));

        let networks = Arc::new(NetworkService::new(
            &config,
            upstream.clone(),
            Arc::clone(&cache),
        ));

        let accounts = Arc::new(AccountFactory::new(
            Arc::clone(&config),
            Arc::clone(&cache),
            upstream.clone(),
            Arc::new(HttpRpcConnector::new(upstream.clone())),
            Arc::new(HttpEsploraConnector::new(upstream.clone())),
            Arc::clone(&prices),
        ));

        let swaps = Arc::new(SwapOrchestrator::new(Arc::clone(&cache), &config.swap));

        let bridge = Arc::new(BridgeOrchestrator::new(
            Arc::new(HttpBridgeApi::new(upstream.clone(), &api_url)),
            Arc::new(InMemoryPendingBridgeStore::new()),
            Arc::clone(&cache),
            &config.bridge,
        ));

        tracing::info!(
            environment = config.environment.as_str(),
            api_url = %api_url,
            cache_ttl_secs = config.cache.ttl_secs,
            "adapter state initialized"
        );

        Ok(Self {
            config,
            cache,
            upstream,
            prices,
            networks,
            accounts,
            swaps,
            bridge,
        })
    }
}
