//! Domain 模块
//!
//! 网络描述符、密钥派生与各服务共享的数据模型

pub mod capability;
pub mod derivation;
pub mod network;
pub mod nft;
pub mod quote;
pub mod token;

// 重新导出常用类型
pub use capability::{capabilities_of, Capability};
pub use derivation::{
    derive_keypair, generate_mnemonic, validate_mnemonic, DerivationPath, DerivationScheme,
    DerivationStrategy, DerivationStrategyFactory, Keypair,
};
pub use network::{BlockchainFamily, NativeCurrency, Network, NetworkConfig, NetworkEnvironment};
pub use nft::{Nft, NftCollectionGroup, NftListing, NftPage, Page, PageRequest, Pagination};
pub use quote::{Quote, QuoteAmount, SwapStatus, SwapStep};
pub use token::{Balance, Last24hChange, TokenBalance, TokenInfo, TokenMetadata};
