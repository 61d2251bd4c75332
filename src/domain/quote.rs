//! 兑换报价与执行步骤

use serde::{Deserialize, Deserializer, Serialize};

/// 上游数量字段可能是数字也可能是字符串
fn number_or_string<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(f64),
        Str(String),
    }
    match Raw::deserialize(d)? {
        Raw::Num(n) => Ok(n),
        Raw::Str(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteAmount {
    #[serde(deserialize_with = "number_or_string")]
    pub amount: f64,
    pub decimals: u8,
    #[serde(default)]
    pub symbol: String,
}

/// 有时效的兑换报价
///
/// `custom` 是提供方的原始数据（待签名交易、requestId 等），适配层只透传。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub input: QuoteAmount,
    pub output: QuoteAmount,
    #[serde(default)]
    pub fee: Option<serde_json::Value>,
    #[serde(default)]
    pub custom: serde_json::Value,
    /// 服务端声明的过期时间（Unix 毫秒），没有则只按客户端窗口计算
    #[serde(default, alias = "expireAt")]
    pub expires_at: Option<i64>,
}

impl Quote {
    pub fn transaction(&self) -> Option<&str> {
        self.custom.get("transaction").and_then(|v| v.as_str())
    }

    pub fn request_id(&self) -> Option<&str> {
        self.custom.get("requestId").and_then(|v| v.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapStatus {
    Success,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapStep {
    pub id: Option<String>,
    pub name: String,
    pub status: SwapStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SwapStep {
    pub fn succeeded(steps: &[SwapStep]) -> bool {
        !steps.is_empty() && steps.iter().all(|s| s.status == SwapStatus::Success)
    }
}
