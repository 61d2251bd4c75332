//! 统一错误类型
//!
//! 适配层对外只暴露一种错误：`AppError`。调用方依据 `AppErrorCode` 区分
//! 输入错误、能力不支持、远端瞬时故障与链上拒绝。

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AppErrorCode {
    /// 调用方输入错误（地址格式、金额、未知代币）
    InvalidInput,
    /// 助记词校验失败（属于输入错误）
    InvalidMnemonic,
    /// 当前链不提供该能力
    UnsupportedCapability,
    /// RPC / 索引器 / 价格源超时或 5xx
    TransientRemoteFailure,
    /// 签名、模拟或确认失败
    TransactionRejected,
    NotFound,
    Internal,
}

impl AppErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppErrorCode::InvalidInput => "invalid_input",
            AppErrorCode::InvalidMnemonic => "invalid_mnemonic",
            AppErrorCode::UnsupportedCapability => "unsupported_capability",
            AppErrorCode::TransientRemoteFailure => "transient_remote_failure",
            AppErrorCode::TransactionRejected => "transaction_rejected",
            AppErrorCode::NotFound => "not_found",
            AppErrorCode::Internal => "internal",
        }
    }
}

impl fmt::Display for AppErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 适配层错误
///
/// 必须可 `Clone`：缓存中的同一个在途请求会把结果分发给所有等待者。
#[derive(Debug, Clone, thiserror::Error, Serialize)]
#[error("{code}: {message}")]
pub struct AppError {
    pub code: AppErrorCode,
    pub message: String,
    /// 已分配的交易 ID（提交后未确认的交易也会携带）
    pub tx_id: Option<String>,
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    fn with_code(code: AppErrorCode, msg: impl Into<String>) -> Self {
        Self {
            code,
            message: msg.into(),
            tx_id: None,
        }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::with_code(AppErrorCode::InvalidInput, msg)
    }

    pub fn invalid_mnemonic(msg: impl Into<String>) -> Self {
        Self::with_code(AppErrorCode::InvalidMnemonic, msg)
    }

    pub fn invalid_address(address: &str) -> Self {
        Self::invalid_input(format!("Invalid address: {}", address))
    }

    pub fn invalid_amount(msg: impl Into<String>) -> Self {
        Self::invalid_input(msg)
    }

    /// 能力不支持：携带能力名，方便 UI 渲染“此链不可用”
    pub fn unsupported(capability: impl fmt::Display) -> Self {
        Self::with_code(
            AppErrorCode::UnsupportedCapability,
            format!("Operation not supported on this blockchain: {}", capability),
        )
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::with_code(AppErrorCode::TransientRemoteFailure, msg)
    }

    pub fn rejected(msg: impl Into<String>, tx_id: Option<String>) -> Self {
        Self {
            code: AppErrorCode::TransactionRejected,
            message: msg.into(),
            tx_id,
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::with_code(AppErrorCode::NotFound, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::with_code(AppErrorCode::Internal, msg)
    }

    /// 交易签名后才知道 ID，拒绝错误在这里补上
    pub fn with_tx_id(mut self, tx_id: impl Into<String>) -> Self {
        if self.tx_id.is_none() {
            self.tx_id = Some(tx_id.into());
        }
        self
    }

    pub fn is_transient(&self) -> bool {
        self.code == AppErrorCode::TransientRemoteFailure
    }

    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self.code,
            AppErrorCode::InvalidInput | AppErrorCode::InvalidMnemonic
        )
    }

    pub fn is_unsupported(&self) -> bool {
        self.code == AppErrorCode::UnsupportedCapability
    }
}

// 从 reqwest 错误转换：网络层错误一律视为瞬时故障
impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::transient(format!("HTTP request failed: {}", err))
    }
}

// 上游返回体无法解析，同样按瞬时故障处理
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::transient(format!("Malformed upstream payload: {}", err))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(format!("{}", err))
    }
}
