//! 兑换会话
//!
//! `Quoting → Quoted → Confirming → Settled(success|fail)`。
//! 报价有固定的有效窗口；窗口内 `confirm` 提交报价，过期后同一个 `confirm` 改为重新报价。
//! 报价自带服务端过期时间时，窗口取两者中较早的一个。

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::{
    config::SwapConfig,
    domain::quote::{Quote, SwapStatus, SwapStep},
    error::{AppError, AppResult},
    infrastructure::cache::{CacheType, ResilienceCache},
    service::account::BlockchainAccount,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapState {
    Quoting,
    Quoted,
    Confirming,
    Settled(SwapStatus),
}

impl SwapState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SwapState::Settled(_))
    }

    pub fn can_transition(from: SwapState, to: SwapState) -> bool {
        use SwapState::*;
        matches!(
            (from, to),
            (Quoting, Quoted)
                | (Quoted, Quoting)
                | (Quoted, Confirming)
                | (Confirming, Settled(_))
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwapRequest {
    pub input_mint: String,
    pub output_mint: String,
    pub amount: Decimal,
    pub slippage_bps: u16,
}

/// `confirm` 的结果
#[derive(Debug, Clone, PartialEq)]
pub enum SwapAction {
    Submitted(Vec<SwapStep>),
    Requoted(Quote),
}

pub struct SwapOrchestrator {
    cache: Arc<ResilienceCache>,
    validity: Duration,
}

impl SwapOrchestrator {
    pub fn new(cache: Arc<ResilienceCache>, config: &SwapConfig) -> Self {
        Self {
            cache,
            validity: Duration::from_secs(config.quote_validity_secs),
        }
    }

    /// 新建会话并取第一份报价
    pub async fn start(
        &self,
        account: Arc<dyn BlockchainAccount>,
        request: SwapRequest,
    ) -> AppResult<SwapSession> {
        let mut session = SwapSession {
            account,
            request,
            cache: Arc::clone(&self.cache),
            validity: self.validity,
            state: SwapState::Quoting,
            quote: None,
            deadline: Instant::now(),
        };
        session.quote().await?;
        Ok(session)
    }
}

pub struct SwapSession {
    account: Arc<dyn BlockchainAccount>,
    request: SwapRequest,
    cache: Arc<ResilienceCache>,
    validity: Duration,
    state: SwapState,
    quote: Option<Quote>,
    deadline: Instant,
}

impl SwapSession {
    pub fn state(&self) -> SwapState {
        self.state
    }

    pub fn current_quote(&self) -> Option<&Quote> {
        self.quote.as_ref()
    }

    fn transition(&mut self, to: SwapState) -> AppResult<()> {
        if !SwapState::can_transition(self.state, to) {
            return Err(AppError::invalid_input(format!(
                "Invalid swap state transition: {:?} -> {:?}",
                self.state, to
            )));
        }
        tracing::debug!(from = ?self.state, to = ?to, "swap state transition");
        self.state = to;
        Ok(())
    }

    /// 客户端窗口，服务端过期时间更早时以它为准
    fn window_for(&self, quote: &Quote) -> Duration {
        match quote.expires_at {
            Some(expires_at) => {
                let remaining_ms = expires_at - Utc::now().timestamp_millis();
                let server = Duration::from_millis(remaining_ms.max(0) as u64);
                self.validity.min(server)
            }
            None => self.validity,
        }
    }

    /// 取（或重取）报价，并重置倒计时
    pub async fn quote(&mut self) -> AppResult<Quote> {
        if self.state == SwapState::Quoted {
            self.transition(SwapState::Quoting)?;
        }
        if self.state != SwapState::Quoting {
            return Err(AppError::invalid_input(format!(
                "Cannot quote in state {:?}",
                self.state
            )));
        }

        let quote = self
            .account
            .get_best_swap_quote(
                &self.request.input_mint,
                &self.request.output_mint,
                self.request.amount,
                self.request.slippage_bps,
            )
            .await?;

        self.deadline = Instant::now() + self.window_for(&quote);
        self.quote = Some(quote.clone());
        self.transition(SwapState::Quoted)?;
        tracing::info!(
            input = %self.request.input_mint,
            output = %self.request.output_mint,
            seconds = self.seconds_remaining(),
            "swap quoted"
        );
        Ok(quote)
    }

    /// 倒计时（整秒，向上取整）；过期或未报价时为 0
    pub fn seconds_remaining(&self) -> u64 {
        if self.state != SwapState::Quoted {
            return 0;
        }
        let left = self.deadline.saturating_duration_since(Instant::now());
        left.as_secs() + u64::from(left.subsec_nanos() > 0)
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// 窗口内提交当前报价；过期则重新报价
    pub async fn confirm(&mut self) -> AppResult<SwapAction> {
        if self.state != SwapState::Quoted {
            return Err(AppError::invalid_input(format!(
                "Cannot confirm in state {:?}",
                self.state
            )));
        }

        if self.is_expired() {
            tracing::info!("swap quote expired, requoting");
            let quote = self.quote().await?;
            return Ok(SwapAction::Requoted(quote));
        }

        let quote = self
            .quote
            .clone()
            .ok_or_else(|| AppError::internal("Quoted state without a quote"))?;
        self.transition(SwapState::Confirming)?;

        match self.account.create_swap_transaction(&quote).await {
            Ok(steps) => {
                let status = if SwapStep::succeeded(&steps) {
                    SwapStatus::Success
                } else {
                    SwapStatus::Fail
                };
                self.transition(SwapState::Settled(status))?;
                if status == SwapStatus::Success {
                    self.cache.invalidate(CacheType::Balance);
                }
                tracing::info!(status = ?status, steps = steps.len(), "swap settled");
                Ok(SwapAction::Submitted(steps))
            }
            Err(e) => {
                self.transition(SwapState::Settled(SwapStatus::Fail))?;
                tracing::warn!(error = %e, "swap failed");
                Err(e)
            }
        }
    }
}
