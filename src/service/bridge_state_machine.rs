//! 跨链桥状态机
//!
//! 本地转账完成后，兑换在桥服务方异步进行，本地只能轮询。
//! 状态只能沿合法边前进，终态不可再变。

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// 跨链桥状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeState {
    Created,
    ExchangeCreated,
    SourceSubmitted,
    InProgress,
    Completed,
    Failed,
    Expired,
}

impl BridgeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::ExchangeCreated => "exchange_created",
            Self::SourceSubmitted => "source_submitted",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Expired)
    }

    /// 桥服务方的交易状态 → 本地状态；未知或进行中的状态返回 `None`
    pub fn from_provider_status(status: &str) -> Option<Self> {
        match status.to_ascii_lowercase().as_str() {
            "finished" | "completed" => Some(Self::Completed),
            "failed" | "refunded" => Some(Self::Failed),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

impl std::fmt::Display for BridgeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 状态转换规则
pub struct BridgeStateMachine;

impl BridgeStateMachine {
    /// 验证状态转换是否合法
    pub fn can_transition(from: BridgeState, to: BridgeState) -> bool {
        use BridgeState::*;

        matches!(
            (from, to),
            // 正常流程
            (Created, ExchangeCreated)
            | (ExchangeCreated, SourceSubmitted)
            | (SourceSubmitted, InProgress)
            | (InProgress, Completed)

            // 失败分支
            | (Created, Failed)
            | (ExchangeCreated, Failed)
            | (SourceSubmitted, Failed)
            | (InProgress, Failed)

            // 超时分支
            | (SourceSubmitted, Expired)
            | (InProgress, Expired)
        )
    }

    /// 执行状态转换，非法转换返回内部错误
    pub fn transition(current: &mut BridgeState, to: BridgeState) -> AppResult<()> {
        if !Self::can_transition(*current, to) {
            return Err(AppError::internal(format!(
                "Invalid bridge state transition: {} -> {}",
                current, to
            )));
        }
        tracing::debug!(from = %current, to = %to, "bridge state transition");
        *current = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        assert!(BridgeStateMachine::can_transition(
            BridgeState::Created,
            BridgeState::ExchangeCreated
        ));

        assert!(BridgeStateMachine::can_transition(
            BridgeState::InProgress,
            BridgeState::Completed
        ));

        assert!(BridgeStateMachine::can_transition(
            BridgeState::InProgress,
            BridgeState::Expired
        ));
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!BridgeStateMachine::can_transition(
            BridgeState::Created,
            BridgeState::Completed
        ));

        assert!(!BridgeStateMachine::can_transition(
            BridgeState::Completed,
            BridgeState::InProgress
        ));

        assert!(!BridgeStateMachine::can_transition(
            BridgeState::Expired,
            BridgeState::Completed
        ));
    }

    #[test]
    fn test_transition_mutates_only_when_allowed() {
        let mut state = BridgeState::SourceSubmitted;
        BridgeStateMachine::transition(&mut state, BridgeState::InProgress).unwrap();
        assert_eq!(state, BridgeState::InProgress);

        assert!(BridgeStateMachine::transition(&mut state, BridgeState::Created).is_err());
        assert_eq!(state, BridgeState::InProgress);
    }

    #[test]
    fn test_provider_status_mapping() {
        assert_eq!(BridgeState::from_provider_status("finished"), Some(BridgeState::Completed));
        assert_eq!(BridgeState::from_provider_status("refunded"), Some(BridgeState::Failed));
        assert_eq!(BridgeState::from_provider_status("FAILED"), Some(BridgeState::Failed));
        assert_eq!(BridgeState::from_provider_status("exchanging"), None);
    }
}
