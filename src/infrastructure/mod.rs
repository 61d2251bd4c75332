pub mod cache;
pub mod esplora;
pub mod logging;
pub mod solana_rpc;
pub mod upstream;

pub use cache::{CacheType, ResilienceCache};
pub use upstream::UpstreamClient;
