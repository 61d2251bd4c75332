//! 账户能力声明
//!
//! 调用方可以先查询 `supports`，再决定是否渲染某个入口。

use serde::{Deserialize, Serialize};

use crate::domain::network::BlockchainFamily;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Balance,
    Tokens,
    Transfer,
    TransferFee,
    Memo,
    Nfts,
    NftBurn,
    NftMarketplace,
    NftCollections,
    Swap,
    AvailableTokens,
    FeaturedTokens,
    Airdrop,
    MultiMessageFee,
    ValidateDestination,
    DomainNames,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Balance => "balance",
            Capability::Tokens => "tokens",
            Capability::Transfer => "transfer",
            Capability::TransferFee => "transfer_fee",
            Capability::Memo => "memo",
            Capability::Nfts => "nfts",
            Capability::NftBurn => "nft_burn",
            Capability::NftMarketplace => "nft_marketplace",
            Capability::NftCollections => "nft_collections",
            Capability::Swap => "swap",
            Capability::AvailableTokens => "available_tokens",
            Capability::FeaturedTokens => "featured_tokens",
            Capability::Airdrop => "airdrop",
            Capability::MultiMessageFee => "multi_message_fee",
            Capability::ValidateDestination => "validate_destination",
            Capability::DomainNames => "domain_names",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const SOLANA: &[Capability] = &[
    Capability::Balance,
    Capability::Tokens,
    Capability::Transfer,
    Capability::TransferFee,
    Capability::Memo,
    Capability::Nfts,
    Capability::NftBurn,
    Capability::NftMarketplace,
    Capability::NftCollections,
    Capability::Swap,
    Capability::AvailableTokens,
    Capability::FeaturedTokens,
    Capability::Airdrop,
    Capability::MultiMessageFee,
    Capability::ValidateDestination,
    Capability::DomainNames,
];

const ECLIPSE: &[Capability] = &[
    Capability::Balance,
    Capability::Tokens,
    Capability::Transfer,
    Capability::TransferFee,
    Capability::Memo,
    Capability::Nfts,
    Capability::NftBurn,
    Capability::Airdrop,
    Capability::MultiMessageFee,
    Capability::ValidateDestination,
];

const BITCOIN: &[Capability] = &[Capability::Balance, Capability::Tokens, Capability::Transfer];

/// 各链族声明的能力集合
pub fn capabilities_of(family: BlockchainFamily) -> &'static [Capability] {
    match family {
        BlockchainFamily::Solana => SOLANA,
        BlockchainFamily::Eclipse => ECLIPSE,
        BlockchainFamily::Bitcoin => BITCOIN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eclipse_has_no_marketplace_or_swap() {
        let caps = capabilities_of(BlockchainFamily::Eclipse);
        assert!(caps.contains(&Capability::Nfts));
        assert!(!caps.contains(&Capability::NftMarketplace));
        assert!(!caps.contains(&Capability::Swap));
        assert!(caps.contains(&Capability::ValidateDestination));
        assert!(!caps.contains(&Capability::DomainNames));
    }

    #[test]
    fn test_solana_resolves_domains() {
        let caps = capabilities_of(BlockchainFamily::Solana);
        assert!(caps.contains(&Capability::DomainNames));
        assert!(caps.contains(&Capability::ValidateDestination));
    }

    #[test]
    fn test_bitcoin_is_minimal() {
        let caps = capabilities_of(BlockchainFamily::Bitcoin);
        assert_eq!(caps.len(), 3);
        assert!(!caps.contains(&Capability::Nfts));
    }
}
