//! 平台价格源
//!
//! `{static}/v1/coins/{platform}` 返回整个平台的价格表，按 mint 地址匹配，
//! 其次按 coingecko id 匹配。

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    error::AppResult,
    infrastructure::{
        cache::{CacheType, ResilienceCache},
        upstream::UpstreamClient,
    },
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinPrice {
    /// coingecko id
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, alias = "mint")]
    pub address: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(alias = "usdPrice", alias = "price")]
    pub usd_price: f64,
    #[serde(
        default,
        alias = "perc24HChange",
        alias = "perc24hChange",
        alias = "priceChangePercentage24h"
    )]
    pub perc_24h_change: Option<f64>,
}

#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn prices(&self, platform: &str) -> AppResult<Vec<CoinPrice>>;
}

pub struct HttpPriceFeed {
    upstream: UpstreamClient,
    static_api_url: String,
    cache: Arc<ResilienceCache>,
}

impl HttpPriceFeed {
    pub fn new(upstream: UpstreamClient, static_api_url: &str, cache: Arc<ResilienceCache>) -> Self {
        Self {
            upstream,
            static_api_url: static_api_url.trim_end_matches('/').to_string(),
            cache,
        }
    }
}

#[async_trait]
impl PriceFeed for HttpPriceFeed {
    async fn prices(&self, platform: &str) -> AppResult<Vec<CoinPrice>> {
        let url = format!("{}/v1/coins/{}", self.static_api_url, platform);
        let upstream = self.upstream.clone();
        self.cache
            .get(platform, CacheType::Prices, move || async move {
                upstream.get_json::<Vec<CoinPrice>>(&url, &[]).await
            })
            .await
    }
}

/// 一次价格表的查找索引
#[derive(Debug, Default)]
pub struct PriceIndex {
    by_address: HashMap<String, CoinPrice>,
    by_id: HashMap<String, CoinPrice>,
}

impl PriceIndex {
    pub fn new(prices: Vec<CoinPrice>) -> Self {
        let mut index = Self::default();
        for price in prices {
            if let Some(address) = &price.address {
                index.by_address.insert(address.clone(), price.clone());
            }
            if let Some(id) = &price.id {
                index.by_id.insert(id.clone(), price.clone());
            }
        }
        index
    }

    pub fn lookup(&self, address: &str, coingecko_id: Option<&str>) -> Option<&CoinPrice> {
        self.by_address
            .get(address)
            .or_else(|| coingecko_id.and_then(|id| self.by_id.get(id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_address_then_id() {
        let prices: Vec<CoinPrice> = serde_json::from_str(
            r#"[
                {"id":"solana","symbol":"sol","usdPrice":150.0,"perc24HChange":2.5},
                {"id":"usd-coin","address":"EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v","usdPrice":1.0}
            ]"#,
        )
        .unwrap();
        let index = PriceIndex::new(prices);

        let usdc = index
            .lookup("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v", None)
            .unwrap();
        assert_eq!(usdc.usd_price, 1.0);

        let sol = index.lookup("So11111111111111111111111111111111111111112", Some("solana")).unwrap();
        assert_eq!(sol.perc_24h_change, Some(2.5));

        assert!(index.lookup("unknown", Some("nope")).is_none());
    }
}
