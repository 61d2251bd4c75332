//! 弹性缓存：TTL + 在途请求去重 + 按类型失效
//!
//! 生命周期：进程启动时创建 → 首次未命中时填充 → TTL 过期或显式 `invalidate` 时清空。
//! 每次写入时顺带清掉所有已过期的值，不再读取的键也不会常驻。
//! 由 `AdapterState` 显式持有并注入各服务，不存在全局实例。

use std::{
    any::Any,
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::time::Instant;

use crate::error::{AppError, AppResult};

type CachedValue = Arc<dyn Any + Send + Sync>;
type SharedFetch = Shared<BoxFuture<'static, AppResult<CachedValue>>>;
type Slot = (CacheType, String);

pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// 缓存类型，`invalidate` 的粒度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheType {
    Balance,
    Nfts,
    SingleNft,
    AvailableTokens,
    FeaturedTokens,
    BridgeSupported,
    Prices,
    TokenMetadata,
    Networks,
}

struct Entry {
    value: CachedValue,
    expires_at: Instant,
}

struct Pending {
    id: u64,
    fetch: SharedFetch,
}

#[derive(Default)]
struct State {
    values: HashMap<Slot, Entry>,
    pending: HashMap<Slot, Pending>,
    next_id: u64,
}

impl State {
    /// 只移除属于 `id` 的在途句柄；被 invalidate 替换过的句柄不受影响
    fn settle(&mut self, slot: &Slot, id: u64) -> bool {
        match self.pending.get(slot) {
            Some(p) if p.id == id => {
                self.pending.remove(slot);
                true
            }
            _ => false,
        }
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// 生产者任务结束时（包括 panic）清理在途句柄
struct PendingGuard {
    state: Arc<Mutex<State>>,
    slot: Slot,
    id: u64,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        lock(&self.state).settle(&self.slot, self.id);
    }
}

pub struct ResilienceCache {
    ttl: Duration,
    type_ttls: HashMap<CacheType, Duration>,
    state: Arc<Mutex<State>>,
}

impl Default for ResilienceCache {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }
}

impl ResilienceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            type_ttls: HashMap::new(),
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// 为某一类型单独设置 TTL，其余类型仍用默认值
    pub fn with_type_ttl(mut self, cache_type: CacheType, ttl: Duration) -> Self {
        self.type_ttls.insert(cache_type, ttl);
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn ttl_for(&self, cache_type: CacheType) -> Duration {
        self.type_ttls.get(&cache_type).copied().unwrap_or(self.ttl)
    }

    /// 读取或填充
    ///
    /// 1. 同一 `(type, key)` 已有在途请求：复用同一个 future
    /// 2. 存在未过期的值：直接返回
    /// 3. 否则启动 producer；成功后写入缓存，无论成败都清除在途句柄
    ///
    /// producer 在独立任务中运行，调用方放弃等待不会取消它。
    pub async fn get<T, F, Fut>(&self, key: &str, cache_type: CacheType, producer: F) -> AppResult<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<T>> + Send + 'static,
    {
        let slot: Slot = (cache_type, key.to_string());

        let fetch = {
            let mut state = lock(&self.state);

            let joined = state.pending.get(&slot).map(|pending| pending.fetch.clone());
            if let Some(fetch) = joined {
                tracing::debug!(cache_type = ?cache_type, key, "joining in-flight fetch");
                fetch
            } else {
                let fresh = state
                    .values
                    .get(&slot)
                    .filter(|entry| entry.expires_at > Instant::now())
                    .map(|entry| Arc::clone(&entry.value));
                if let Some(value) = fresh {
                    return downcast(&value);
                }
                state.values.remove(&slot);

                let id = state.next_id;
                state.next_id += 1;
                let fetch = self.spawn_producer(slot.clone(), id, producer());
                state.pending.insert(
                    slot,
                    Pending {
                        id,
                        fetch: fetch.clone(),
                    },
                );
                fetch
            }
        };

        let value = fetch.await?;
        downcast(&value)
    }

    fn spawn_producer<T, Fut>(&self, slot: Slot, id: u64, fut: Fut) -> SharedFetch
    where
        T: Send + Sync + 'static,
        Fut: Future<Output = AppResult<T>> + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        let ttl = self.ttl_for(slot.0);

        let handle = tokio::spawn(async move {
            let guard = PendingGuard {
                state: Arc::clone(&state),
                slot: slot.clone(),
                id,
            };

            let result = fut.await.map(|v| Arc::new(v) as CachedValue);

            {
                let mut s = lock(&state);
                // 句柄仍属于本次请求才写入；期间被 invalidate 的结果直接丢弃
                let still_current = s.settle(&slot, id);
                match &result {
                    Ok(value) if still_current => {
                        let now = Instant::now();
                        let before = s.values.len();
                        s.values.retain(|_, entry| entry.expires_at > now);
                        let swept = before - s.values.len();
                        if swept > 0 {
                            tracing::debug!(swept, "expired cache values removed");
                        }
                        s.values.insert(
                            slot.clone(),
                            Entry {
                                value: Arc::clone(value),
                                expires_at: now + ttl,
                            },
                        );
                    }
                    Ok(_) => {
                        tracing::debug!(cache_type = ?slot.0, key = %slot.1, "discarding result invalidated while in flight");
                    }
                    Err(e) => {
                        tracing::debug!(cache_type = ?slot.0, key = %slot.1, error = %e, "fetch failed, slot left retryable");
                    }
                }
            }

            drop(guard);
            result
        });

        async move {
            handle
                .await
                .map_err(|e| AppError::internal(format!("cache producer aborted: {}", e)))?
        }
        .boxed()
        .shared()
    }

    /// 清空某一类型的缓存值并丢弃其在途句柄
    pub fn invalidate(&self, cache_type: CacheType) {
        let mut state = lock(&self.state);
        state.values.retain(|(t, _), _| *t != cache_type);
        let before = state.pending.len();
        state.pending.retain(|(t, _), _| *t != cache_type);
        tracing::info!(
            cache_type = ?cache_type,
            dropped_in_flight = before - state.pending.len(),
            "cache invalidated"
        );
    }

    pub fn invalidate_key(&self, cache_type: CacheType, key: &str) {
        let slot: Slot = (cache_type, key.to_string());
        let mut state = lock(&self.state);
        state.values.remove(&slot);
        state.pending.remove(&slot);
    }

    /// 已缓存的值数量（含上次写入之后才过期的）
    pub fn len(&self) -> usize {
        lock(&self.state).values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn in_flight(&self) -> usize {
        lock(&self.state).pending.len()
    }
}

fn downcast<T: Clone + 'static>(value: &CachedValue) -> AppResult<T> {
    value
        .downcast_ref::<T>()
        .cloned()
        .ok_or_else(|| AppError::internal("cached value type mismatch"))
}
