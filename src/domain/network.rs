//! 网络描述符
//!
//! 由外部（后端网络列表或调用方）提供，适配层只读。

use serde::{Deserialize, Serialize};

pub const SOL_ADDRESS: &str = "So11111111111111111111111111111111111111112";
pub const SOL_LOGO: &str =
    "https://raw.githubusercontent.com/trustwallet/assets/master/blockchains/solana/info/logo.png";
pub const BTC_LOGO: &str =
    "https://raw.githubusercontent.com/trustwallet/assets/master/blockchains/bitcoin/info/logo.png";

/// SLIP-0044 注册的 coin type
pub mod coin_types {
    pub const BTC: u32 = 0;
    pub const TESTNET: u32 = 1;
    pub const SOL: u32 = 501;
}

/// 链族：工厂在这里做唯一一次分派
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockchainFamily {
    Solana,
    Eclipse,
    Bitcoin,
}

impl BlockchainFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockchainFamily::Solana => "solana",
            BlockchainFamily::Eclipse => "eclipse",
            BlockchainFamily::Bitcoin => "bitcoin",
        }
    }

    /// 价格源使用的平台标识
    pub fn price_platform(&self) -> &'static str {
        self.as_str()
    }

    /// 账户派生使用的 coin type；Eclipse 复用 Solana 的 501
    pub fn coin_type(&self, environment: NetworkEnvironment) -> u32 {
        match self {
            BlockchainFamily::Solana | BlockchainFamily::Eclipse => coin_types::SOL,
            BlockchainFamily::Bitcoin if environment.is_mainnet() => coin_types::BTC,
            BlockchainFamily::Bitcoin => coin_types::TESTNET,
        }
    }
}

impl std::fmt::Display for BlockchainFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkEnvironment {
    #[serde(alias = "main")]
    Mainnet,
    #[serde(alias = "test")]
    Testnet,
    #[serde(alias = "dev")]
    Devnet,
}

impl NetworkEnvironment {
    pub fn is_mainnet(&self) -> bool {
        matches!(self, NetworkEnvironment::Mainnet)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    #[serde(alias = "node_url")]
    pub node_url: String,
    #[serde(default)]
    pub chain_id: Option<u64>,
}

/// 原生币元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
    #[serde(default)]
    pub logo: Option<String>,
    /// 原生币在代币列表中的地址（Solana 为 wrapped SOL mint）
    #[serde(default)]
    pub address: String,
    #[serde(default, alias = "coingeckoId")]
    pub coingecko_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub blockchain: BlockchainFamily,
    pub environment: NetworkEnvironment,
    pub config: NetworkConfig,
    pub currency: NativeCurrency,
}

impl Network {
    pub fn solana(id: &str, environment: NetworkEnvironment, node_url: &str) -> Self {
        Self {
            id: id.to_string(),
            name: "Solana".to_string(),
            blockchain: BlockchainFamily::Solana,
            environment,
            config: NetworkConfig {
                node_url: node_url.to_string(),
                chain_id: Some(101),
            },
            currency: NativeCurrency {
                symbol: "SOL".to_string(),
                name: "Solana".to_string(),
                decimals: 9,
                logo: Some(SOL_LOGO.to_string()),
                address: SOL_ADDRESS.to_string(),
                coingecko_id: Some("solana".to_string()),
            },
        }
    }

    pub fn eclipse(id: &str, environment: NetworkEnvironment, node_url: &str) -> Self {
        Self {
            id: id.to_string(),
            name: "Eclipse".to_string(),
            blockchain: BlockchainFamily::Eclipse,
            environment,
            config: NetworkConfig {
                node_url: node_url.to_string(),
                chain_id: None,
            },
            currency: NativeCurrency {
                symbol: "ETH".to_string(),
                name: "Ether".to_string(),
                decimals: 9,
                logo: Some(
                    "https://assets-cdn.trustwallet.com/blockchains/ethereum/info/logo.png"
                        .to_string(),
                ),
                address: "eth".to_string(),
                coingecko_id: Some("ethereum".to_string()),
            },
        }
    }

    pub fn bitcoin(id: &str, environment: NetworkEnvironment, node_url: &str) -> Self {
        Self {
            id: id.to_string(),
            name: "Bitcoin".to_string(),
            blockchain: BlockchainFamily::Bitcoin,
            environment,
            config: NetworkConfig {
                node_url: node_url.to_string(),
                chain_id: None,
            },
            currency: NativeCurrency {
                symbol: "BTC".to_string(),
                name: "Bitcoin".to_string(),
                decimals: 8,
                logo: Some(BTC_LOGO.to_string()),
                address: "btc".to_string(),
                coingecko_id: Some("bitcoin".to_string()),
            },
        }
    }

    pub fn coin_type(&self) -> u32 {
        self.blockchain.coin_type(self.environment)
    }
}
