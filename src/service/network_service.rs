//! 网络列表
//!
//! 本地开发时走业务 API（需要后端注入的节点密钥），其余环境走静态 API。

use std::sync::Arc;

use crate::{
    config::Config,
    domain::network::{BlockchainFamily, Network},
    error::AppResult,
    infrastructure::{
        cache::{CacheType, ResilienceCache},
        upstream::UpstreamClient,
    },
};

const CACHE_KEY: &str = "all";

pub struct NetworkService {
    upstream: UpstreamClient,
    url: String,
    cache: Arc<ResilienceCache>,
}

impl NetworkService {
    pub fn new(config: &Config, upstream: UpstreamClient, cache: Arc<ResilienceCache>) -> Self {
        Self {
            upstream,
            url: networks_url(&config.api_url(), &config.static_api_url()),
            cache,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// 并发调用共享同一个请求
    pub async fn get_networks(&self) -> AppResult<Vec<Network>> {
        let upstream = self.upstream.clone();
        let url = self.url.clone();
        self.cache
            .get(CACHE_KEY, CacheType::Networks, move || async move {
                let networks: Vec<Network> = upstream.get_json(&url, &[]).await?;
                tracing::info!(count = networks.len(), "networks loaded");
                Ok(networks)
            })
            .await
    }

    pub async fn get_network(&self, id: &str) -> AppResult<Option<Network>> {
        Ok(self.get_networks().await?.into_iter().find(|n| n.id == id))
    }

    pub async fn get_networks_by_family(&self, family: BlockchainFamily) -> AppResult<Vec<Network>> {
        Ok(self
            .get_networks()
            .await?
            .into_iter()
            .filter(|n| n.blockchain == family)
            .collect())
    }
}

fn networks_url(api_url: &str, static_api_url: &str) -> String {
    if api_url.contains("localhost") {
        format!("{}/v1/networks", api_url)
    } else {
        format!("{}/v1/networks", static_api_url)
    }
}
