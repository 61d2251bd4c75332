//! 跨链桥集成测试
//!
//! 测试覆盖：最小量校验、兑换创建与存款转账、待处理记录、状态轮询与过期

mod common;

use std::{
    sync::{atomic::Ordering, Arc},
    time::Duration as StdDuration,
};

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use common::*;
use ironcore_adapter::{
    config::BridgeConfig,
    infrastructure::cache::{CacheType, ResilienceCache},
    service::{
        bridge_service::{
            BridgeApi, BridgeOrchestrator, BridgeToken, InMemoryPendingBridgeStore, PendingBridge,
            PendingBridgeStore,
        },
        bridge_state_machine::BridgeState,
    },
};

const BTC_ADDRESS: &str = "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq";

struct Fixture {
    api: Arc<FakeBridgeApi>,
    store: Arc<InMemoryPendingBridgeStore>,
    cache: Arc<ResilienceCache>,
    bridge: BridgeOrchestrator,
}

fn fixture(api: FakeBridgeApi) -> Fixture {
    let config = BridgeConfig::default();
    let api = Arc::new(api);
    let store = Arc::new(InMemoryPendingBridgeStore::new());
    let cache = Arc::new(ResilienceCache::with_ttl(StdDuration::from_secs(60)).with_type_ttl(
        CacheType::BridgeSupported,
        StdDuration::from_secs(config.supported_ttl_secs),
    ));
    let bridge = BridgeOrchestrator::new(
        Arc::clone(&api) as Arc<dyn BridgeApi>,
        Arc::clone(&store) as Arc<dyn PendingBridgeStore>,
        Arc::clone(&cache),
        &config,
    );
    Fixture { api, store, cache, bridge }
}

fn usdc() -> BridgeToken {
    bridge_token("USDC", Some("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"))
}

fn record(exchange_id: &str, status: BridgeState, expires_in: Duration) -> PendingBridge {
    let now = Utc::now();
    PendingBridge {
        id: Uuid::new_v4(),
        exchange_id: exchange_id.to_string(),
        account: "FakeOwner1111111111111111111111111111111111".to_string(),
        network_id: "solana-mainnet".to_string(),
        address_from: "DepositAddr111111111111111111111111111111111".to_string(),
        address_to: BTC_ADDRESS.to_string(),
        expected_amount: Decimal::from(10),
        symbol_in: "usdc".to_string(),
        symbol_out: "btc".to_string(),
        tx_id: Some("deposit-1".to_string()),
        created_at: now,
        expires_at: now + expires_in,
        last_status_at: now,
        status,
    }
}

#[cfg(test)]
mod execute_tests {
    use super::*;
    use ironcore_adapter::service::BlockchainAccount;

    #[tokio::test]
    async fn test_happy_path_tracks_pending() {
        let f = fixture(FakeBridgeApi::new(Some(Decimal::from(5))));
        let account = FakeAccount::new(solana_mainnet());

        let pending = f
            .bridge
            .execute(&account, &usdc(), &bridge_token("btc", None), Decimal::from(10), BTC_ADDRESS)
            .await
            .unwrap();

        assert_eq!(pending.status, BridgeState::InProgress);
        assert_eq!(pending.exchange_id, "ex-1");
        assert_eq!(pending.symbol_in, "usdc");
        assert_eq!(pending.tx_id.as_deref(), Some("deposit-1"));

        // 存款打到桥服务给的地址，代币用输入代币的 mint
        let transfers = account.transfers.lock().unwrap().clone();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].0, pending.address_from);
        assert_eq!(transfers[0].1, "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v");
        assert_eq!(transfers[0].2, Decimal::from(10));

        let mine = f.bridge.pending_for(&account.public_key()).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, pending.id);
        assert!(f.bridge.pending_for("someone-else").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_below_minimum_is_rejected_before_exchange() {
        let f = fixture(FakeBridgeApi::new(Some(Decimal::from(50))));
        let account = FakeAccount::new(solana_mainnet());

        let err = f
            .bridge
            .execute(&account, &usdc(), &bridge_token("btc", None), Decimal::from(10), BTC_ADDRESS)
            .await
            .unwrap_err();

        assert!(err.is_invalid_input());
        assert_eq!(f.api.exchanges.load(Ordering::SeqCst), 0);
        assert!(account.transfers.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exchange_failure_persists_nothing() {
        let mut api = FakeBridgeApi::new(None);
        api.exchange_fail = true;
        let f = fixture(api);
        let account = FakeAccount::new(solana_mainnet());

        let err = f
            .bridge
            .execute(&account, &usdc(), &bridge_token("btc", None), Decimal::from(10), BTC_ADDRESS)
            .await
            .unwrap_err();

        assert!(err.is_transient());
        assert!(f.store.list().await.unwrap().is_empty());
        assert!(account.transfers.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_devnet_is_unsupported() {
        let f = fixture(FakeBridgeApi::new(None));
        let account = FakeAccount::new(solana_devnet());

        let err = f
            .bridge
            .execute(&account, &usdc(), &bridge_token("btc", None), Decimal::from(10), BTC_ADDRESS)
            .await
            .unwrap_err();
        assert!(err.is_unsupported());
    }

    #[tokio::test]
    async fn test_unconfirmed_deposit_is_still_tracked() {
        let f = fixture(FakeBridgeApi::new(None));
        let mut account = FakeAccount::new(solana_mainnet());
        account.confirm_ok = false;

        let err = f
            .bridge
            .execute(&account, &usdc(), &bridge_token("btc", None), Decimal::from(10), BTC_ADDRESS)
            .await
            .unwrap_err();
        assert_eq!(err.tx_id.as_deref(), Some("deposit-1"));

        let stored = f.store.list().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, BridgeState::SourceSubmitted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_supported_tokens_cached_in_shared_store() {
        let f = fixture(FakeBridgeApi::new(None));

        let first = f.bridge.supported_tokens().await.unwrap();
        let second = f.bridge.supported_tokens().await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
        assert_eq!(f.api.supported_calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.cache.len(), 1);

        // 类型 TTL（300s）长于默认 TTL（60s）
        tokio::time::advance(StdDuration::from_secs(120)).await;
        f.bridge.supported_tokens().await.unwrap();
        assert_eq!(f.api.supported_calls.load(Ordering::SeqCst), 1);

        f.cache.invalidate(CacheType::BridgeSupported);
        f.bridge.supported_tokens().await.unwrap();
        assert_eq!(f.api.supported_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_estimate_reports_minimum() {
        let f = fixture(FakeBridgeApi::new(Some(Decimal::from(5))));

        let estimate = f.bridge.estimate("USDC", "btc", Decimal::from(10)).await.unwrap();
        assert_eq!(estimate.estimated_amount, Some(Decimal::from(5)));
        assert!(estimate.meets_minimum(Decimal::from(10)));
        assert!(!estimate.meets_minimum(Decimal::from(4)));
    }
}

#[cfg(test)]
mod refresh_tests {
    use super::*;

    #[tokio::test]
    async fn test_provider_statuses_settle_records() {
        let f = fixture(FakeBridgeApi::new(None));
        let done = record("ex-done", BridgeState::InProgress, Duration::hours(24));
        let failed = record("ex-failed", BridgeState::InProgress, Duration::hours(24));
        let waiting = record("ex-waiting", BridgeState::SourceSubmitted, Duration::hours(24));
        for r in [&done, &failed, &waiting] {
            f.store.save(r.clone()).await.unwrap();
        }
        f.api.set_status("ex-done", "finished");
        f.api.set_status("ex-failed", "failed");
        f.api.set_status("ex-waiting", "waiting");

        let changed = f.bridge.refresh_pending().await.unwrap();
        assert_eq!(changed.len(), 3);

        let status_of = |id: Uuid| changed.iter().find(|r| r.id == id).unwrap().status;
        assert_eq!(status_of(done.id), BridgeState::Completed);
        assert_eq!(status_of(failed.id), BridgeState::Failed);
        assert_eq!(status_of(waiting.id), BridgeState::InProgress);

        // 终态不再轮询
        let again = f.bridge.refresh_pending().await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_expired_record() {
        let f = fixture(FakeBridgeApi::new(None));
        let stale = record("ex-stale", BridgeState::InProgress, Duration::hours(-1));
        f.store.save(stale.clone()).await.unwrap();

        let changed = f.bridge.refresh_pending().await.unwrap();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].status, BridgeState::Expired);

        let stored = f.store.get(stale.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BridgeState::Expired);
    }

    #[tokio::test]
    async fn test_unknown_exchange_is_skipped() {
        let f = fixture(FakeBridgeApi::new(None));
        let r = record("ex-missing", BridgeState::InProgress, Duration::hours(24));
        f.store.save(r.clone()).await.unwrap();

        let changed = f.bridge.refresh_pending().await.unwrap();
        assert!(changed.is_empty());
        assert_eq!(
            f.store.get(r.id).await.unwrap().unwrap().status,
            BridgeState::InProgress
        );
    }
}
