//! 服务层
//!
//! 账户接口与各链族实现、账户工厂、价格、网络列表、兑换与跨链桥编排。

pub mod account;
pub mod account_factory;
pub mod bitcoin;
pub mod bridge_service;
pub mod bridge_state_machine;
pub mod network_service;
pub mod price_service;
pub mod svm;
pub mod swap_orchestrator;

pub use account::{BlockchainAccount, ConfirmPolicy, TransferOptions, TransferResult};
pub use account_factory::AccountFactory;
pub use bridge_service::{BridgeApi, BridgeOrchestrator, PendingBridge, PendingBridgeStore};
pub use network_service::NetworkService;
pub use price_service::PriceFeed;
pub use swap_orchestrator::{SwapAction, SwapOrchestrator, SwapSession};
