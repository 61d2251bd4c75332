//! 地址验证
//!
//! 转账前的同步校验，不访问网络。

use crate::{
    domain::network::{BlockchainFamily, Network, NetworkEnvironment},
    service::bitcoin::transfer::{bitcoin_network, parse_address},
};

/// 地址验证器
pub struct AddressValidator;

impl AddressValidator {
    /// 按网络的链族与环境验证地址
    pub fn validate(network: &Network, address: &str) -> bool {
        Self::validate_for(network.blockchain, network.environment, address)
    }

    pub fn validate_for(family: BlockchainFamily, environment: NetworkEnvironment, address: &str) -> bool {
        match family {
            BlockchainFamily::Solana | BlockchainFamily::Eclipse => Self::validate_svm_address(address),
            BlockchainFamily::Bitcoin => Self::validate_bitcoin_address(address, environment),
        }
    }

    /// 验证SVM地址（Base58编码，32字节）
    pub fn validate_svm_address(address: &str) -> bool {
        // 典型长度：32-44个字符
        if address.len() < 32 || address.len() > 44 {
            return false;
        }

        match bs58::decode(address).into_vec() {
            Ok(decoded) => decoded.len() == 32,
            Err(_) => false,
        }
    }

    /// 验证Bitcoin地址，网络必须匹配（主网地址不能用于测试网）
    pub fn validate_bitcoin_address(address: &str, environment: NetworkEnvironment) -> bool {
        parse_address(address, bitcoin_network(environment)).is_ok()
    }
}
