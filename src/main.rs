//! IronCore Adapter 诊断入口
//!
//! 拉取网络列表，用环境变量中的助记词派生 0 号账户，打印地址与聚合余额。

use anyhow::{Context, Result};
use ironcore_adapter::{config::Config, infrastructure::logging::init_logging, AdapterState};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 加载环境变量
    dotenvy::dotenv().ok();

    // 2. 配置：文件打底，环境变量覆盖
    let config_path = std::env::var("CONFIG_PATH").ok();
    let config = Config::from_env_and_file(config_path.as_deref())?;

    // 3. 初始化日志
    if let Err(e) = init_logging(&config.logging) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let state = AdapterState::new(config)?;

    let network_id = std::env::var("ADAPTER_NETWORK_ID").unwrap_or_else(|_| "solana-mainnet".to_string());
    let mnemonic = std::env::var("ADAPTER_MNEMONIC").context("ADAPTER_MNEMONIC must be set")?;

    let network = state
        .networks
        .get_network(&network_id)
        .await?
        .with_context(|| format!("Unknown network: {}", network_id))?;

    let account = state.accounts.create_account(&network, &mnemonic, 0).await?;
    println!("network:  {}", network.id);
    println!("path:     {}", account.path());
    println!("address:  {}", account.receive_address());

    let balance = account.get_balance().await?;
    println!("{}", serde_json::to_string_pretty(&balance)?);

    Ok(())
}
