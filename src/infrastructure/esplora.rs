//! Esplora REST 客户端（Bitcoin 账户的数据源）

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::Deserialize;

use crate::{
    domain::network::Network,
    error::{AppError, AppResult},
    infrastructure::upstream::UpstreamClient,
};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TxoStats {
    #[serde(default)]
    pub funded_txo_sum: u64,
    #[serde(default)]
    pub spent_txo_sum: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AddressStats {
    #[serde(default)]
    pub chain_stats: TxoStats,
    #[serde(default)]
    pub mempool_stats: TxoStats,
}

impl AddressStats {
    /// 已确认 + 内存池，单位 satoshi
    pub fn balance(&self) -> u64 {
        let confirmed = self
            .chain_stats
            .funded_txo_sum
            .saturating_sub(self.chain_stats.spent_txo_sum);
        (confirmed + self.mempool_stats.funded_txo_sum)
            .saturating_sub(self.mempool_stats.spent_txo_sum)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TxStatus {
    #[serde(default)]
    pub confirmed: bool,
    #[serde(default)]
    pub block_height: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Utxo {
    pub txid: String,
    pub vout: u32,
    pub value: u64,
    #[serde(default)]
    pub status: TxStatus,
}

#[async_trait]
pub trait EsploraApi: Send + Sync {
    async fn address_stats(&self, address: &str) -> AppResult<AddressStats>;

    async fn utxos(&self, address: &str) -> AppResult<Vec<Utxo>>;

    /// 目标确认块数 → sat/vB
    async fn fee_estimates(&self) -> AppResult<HashMap<String, f64>>;

    async fn broadcast(&self, tx_hex: &str) -> AppResult<String>;

    async fn tx_status(&self, txid: &str) -> AppResult<TxStatus>;
}

pub trait EsploraConnector: Send + Sync {
    fn connect(&self, network: &Network) -> Arc<dyn EsploraApi>;
}

pub struct HttpEsplora {
    base_url: String,
    upstream: UpstreamClient,
}

impl HttpEsplora {
    pub fn new(base_url: &str, upstream: UpstreamClient) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            upstream,
        }
    }
}

#[async_trait]
impl EsploraApi for HttpEsplora {
    async fn address_stats(&self, address: &str) -> AppResult<AddressStats> {
        let url = format!("{}/address/{}", self.base_url, address);
        self.upstream.get_json(&url, &[]).await
    }

    async fn utxos(&self, address: &str) -> AppResult<Vec<Utxo>> {
        let url = format!("{}/address/{}/utxo", self.base_url, address);
        self.upstream.get_json(&url, &[]).await
    }

    async fn fee_estimates(&self) -> AppResult<HashMap<String, f64>> {
        let url = format!("{}/fee-estimates", self.base_url);
        self.upstream.get_json(&url, &[]).await
    }

    async fn broadcast(&self, tx_hex: &str) -> AppResult<String> {
        let url = format!("{}/tx", self.base_url);
        let txid = self.upstream.post_text(&url, tx_hex.to_string()).await?;
        let txid = txid.trim().to_string();
        if txid.is_empty() {
            return Err(AppError::transient("Empty broadcast response"));
        }
        tracing::info!(txid = %txid, "bitcoin transaction broadcast");
        Ok(txid)
    }

    async fn tx_status(&self, txid: &str) -> AppResult<TxStatus> {
        let url = format!("{}/tx/{}/status", self.base_url, txid);
        self.upstream.get_json(&url, &[]).await
    }
}

#[derive(Clone, Default)]
pub struct HttpEsploraConnector {
    upstream: UpstreamClient,
}

impl HttpEsploraConnector {
    pub fn new(upstream: UpstreamClient) -> Self {
        Self { upstream }
    }
}

impl EsploraConnector for HttpEsploraConnector {
    fn connect(&self, network: &Network) -> Arc<dyn EsploraApi> {
        Arc::new(HttpEsplora::new(
            &network.config.node_url,
            self.upstream.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_includes_mempool() {
        let stats: AddressStats = serde_json::from_str(
            r#"{
                "address": "bc1q...",
                "chain_stats": { "funded_txo_sum": 150000, "spent_txo_sum": 50000, "tx_count": 3 },
                "mempool_stats": { "funded_txo_sum": 2000, "spent_txo_sum": 1000, "tx_count": 1 }
            }"#,
        )
        .unwrap();
        assert_eq!(stats.balance(), 101_000);
    }

    #[test]
    fn test_utxo_shape() {
        let utxos: Vec<Utxo> = serde_json::from_str(
            r#"[{"txid":"ab","vout":1,"value":5000,"status":{"confirmed":true,"block_height":800000}}]"#,
        )
        .unwrap();
        assert_eq!(utxos[0].value, 5000);
        assert!(utxos[0].status.confirmed);
    }
}
