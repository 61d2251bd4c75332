//! IronCore Adapter - 多链钱包账户适配层
//!
//! 助记词 → 密钥对 → 按链族分派的账户对象；余额、转账、NFT、兑换与跨链桥
//! 都通过同一个账户接口访问，远端数据经由共享的弹性缓存去重。

pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod service;
pub mod utils;

// 重新导出常用类型
pub use app_state::AdapterState;
pub use error::{AppError, AppErrorCode, AppResult};

// 统一模块导出
pub mod prelude {
    pub use crate::{
        app_state::AdapterState,
        config::Config,
        domain::{BlockchainFamily, Capability, DerivationPath, Network, NetworkEnvironment},
        error::{AppError, AppErrorCode, AppResult},
        infrastructure::{CacheType, ResilienceCache},
        service::{AccountFactory, BlockchainAccount, TransferOptions, TransferResult},
    };
}
