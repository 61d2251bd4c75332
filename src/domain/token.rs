//! 代币余额与元数据模型

use std::cmp::Ordering;

use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// 单个资产的余额
///
/// `usd_balance` 没有价格时为 `None`（不是 0），UI 需要区分“无报价”和“价值为零”。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    pub mint: String,
    pub address: String,
    pub owner: String,
    /// 最小单位整数
    pub amount: u64,
    pub decimals: u8,
    pub ui_amount: f64,
    pub symbol: String,
    pub name: String,
    pub logo: Option<String>,
    #[serde(default)]
    pub is_native: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coingecko_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usd_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usd_balance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perc_24h_change: Option<f64>,
}

impl TokenBalance {
    pub fn new(mint: &str, owner: &str, amount: u64, decimals: u8) -> Self {
        Self {
            mint: mint.to_string(),
            address: mint.to_string(),
            owner: owner.to_string(),
            amount,
            decimals,
            ui_amount: to_ui_amount(amount, decimals),
            symbol: String::new(),
            name: String::new(),
            logo: None,
            is_native: false,
            program_id: None,
            coingecko_id: None,
            usd_price: None,
            usd_balance: None,
            perc_24h_change: None,
        }
    }

    /// 附加价格；`usd_balance = ui_amount * usd_price`
    pub fn apply_price(&mut self, usd_price: f64, perc_24h_change: Option<f64>) {
        self.usd_price = Some(usd_price);
        self.usd_balance = Some(self.ui_amount * usd_price);
        self.perc_24h_change = perc_24h_change;
    }

    pub fn apply_metadata(&mut self, meta: &TokenMetadata) {
        if let Some(symbol) = &meta.symbol {
            self.symbol = symbol.clone();
        }
        if let Some(name) = &meta.name {
            self.name = name.clone();
        }
        if meta.logo.is_some() {
            self.logo = meta.logo.clone();
        }
        if meta.coingecko_id.is_some() {
            self.coingecko_id = meta.coingecko_id.clone();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Last24hChange {
    pub usd: f64,
    pub percent: f64,
}

/// 聚合余额；价格源不可用时 `usd_total` 与 `last_24h_change` 均为 `None`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usd_total: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_24h_change: Option<Last24hChange>,
    pub items: Vec<TokenBalance>,
}

/// 代币列表条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub address: String,
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
    pub logo: Option<String>,
    #[serde(default)]
    pub chain_id: Option<u64>,
    #[serde(default)]
    pub coingecko_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl TokenInfo {
    pub fn is_verified(&self) -> bool {
        self.tags.iter().any(|t| t == "verified" || t == "strict")
    }

    pub fn is_community(&self) -> bool {
        self.tags.iter().any(|t| t == "community")
    }
}

/// 单个 mint 的描述性元数据，任一字段都可能缺失
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenMetadata {
    pub address: String,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub decimals: Option<u8>,
    #[serde(default, alias = "logoURI", alias = "logoUri")]
    pub logo: Option<String>,
    #[serde(default)]
    pub coingecko_id: Option<String>,
}

impl From<&TokenInfo> for TokenMetadata {
    fn from(t: &TokenInfo) -> Self {
        Self {
            address: t.address.clone(),
            symbol: Some(t.symbol.clone()),
            name: Some(t.name.clone()),
            decimals: Some(t.decimals),
            logo: t.logo.clone(),
            coingecko_id: t.coingecko_id.clone(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 数量换算
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const MAX_DECIMAL_SCALE: u8 = 28;

/// `amount / 10^decimals`，先用十进制精确计算再转换为 f64
pub fn to_ui_amount(amount: u64, decimals: u8) -> f64 {
    if decimals <= MAX_DECIMAL_SCALE {
        if let Some(v) = Decimal::from_i128_with_scale(amount as i128, decimals as u32).to_f64() {
            return v;
        }
    }
    amount as f64 / 10f64.powi(decimals as i32)
}

/// 调用方的十进制金额 → 最小单位整数（四舍五入，远离零）
pub fn to_base_units(amount: Decimal, decimals: u8) -> AppResult<u64> {
    if amount <= Decimal::ZERO {
        return Err(AppError::invalid_amount(format!(
            "Amount must be positive: {}",
            amount
        )));
    }
    if decimals > MAX_DECIMAL_SCALE {
        return Err(AppError::invalid_amount(format!(
            "Unsupported decimals: {}",
            decimals
        )));
    }

    let factor = Decimal::from_i128_with_scale(10i128.pow(decimals as u32), 0);
    let units = amount
        .checked_mul(factor)
        .map(|v| v.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|v| v.to_u64())
        .ok_or_else(|| AppError::invalid_amount(format!("Amount out of range: {}", amount)))?;

    if units == 0 {
        return Err(AppError::invalid_amount(format!(
            "Amount {} is below the smallest unit",
            amount
        )));
    }
    Ok(units)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 排序与 24h 变化
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 原生币置顶，其余按 USD 价值降序，无价格的排在最后
pub fn sort_balances(items: &mut [TokenBalance]) {
    items.sort_by(|a, b| match (a.is_native, b.is_native) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => match (a.usd_balance, b.usd_balance) {
            (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
    });
}

/// 基于各资产 24h 百分比变化推算组合的绝对与相对变化
pub fn last_24h_change(items: &[TokenBalance], usd_total: f64) -> Last24hChange {
    let usd: f64 = items
        .iter()
        .filter_map(|t| match (t.usd_balance, t.perc_24h_change) {
            (Some(balance), Some(p)) if (100.0 + p).abs() > f64::EPSILON => {
                Some(balance * p / (100.0 + p))
            }
            _ => None,
        })
        .sum();

    let previous = usd_total - usd;
    let percent = if previous.abs() > f64::EPSILON {
        usd / previous * 100.0
    } else {
        0.0
    };

    Last24hChange { usd, percent }
}
