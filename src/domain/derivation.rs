//! 密钥派生
//!
//! 助记词 → 种子 → 按路径派生密钥对。曲线由路径中的 coin type 决定，
//! 调用方无法为某条链选错曲线：
//! - 501 (Solana / Eclipse)：SLIP-0010 ed25519，仅硬化派生
//! - 0 / 1 (Bitcoin 主网 / 测试网)：BIP32 secp256k1
//!
//! 纯同步 CPU 计算，无缓存、无 I/O。

use std::{fmt, str::FromStr};

use bip39::{Language, Mnemonic};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha512;
use zeroize::Zeroizing;

use crate::{
    domain::network::coin_types,
    error::{AppError, AppResult},
};

const HARDENED: u32 = 0x8000_0000;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 派生路径
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildIndex {
    pub index: u32,
    pub hardened: bool,
}

/// `m/purpose'/coin'/account'/change[/index]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivationPath {
    segments: Vec<ChildIndex>,
}

impl DerivationPath {
    /// 各链族的默认账户路径
    pub fn for_account(coin_type: u32, index: u32) -> Self {
        let raw = match coin_type {
            coin_types::SOL => format!("m/44'/501'/{}'/0'", index),
            coin_types::BTC | coin_types::TESTNET => format!("m/84'/{}'/{}'/0/0", coin_type, index),
            other => format!("m/44'/{}'/{}'/0/0", other, index),
        };
        // 上面的格式总是合法的
        Self::parse_segments(&raw).unwrap_or_else(|_| Self { segments: vec![] })
    }

    pub fn segments(&self) -> &[ChildIndex] {
        &self.segments
    }

    pub fn coin_type(&self) -> Option<u32> {
        self.segments.get(1).map(|s| s.index)
    }

    fn parse_segments(s: &str) -> AppResult<Self> {
        let mut parts = s.trim().split('/');
        if parts.next() != Some("m") {
            return Err(AppError::invalid_input(format!(
                "Derivation path must start with 'm': {}",
                s
            )));
        }

        let segments = parts
            .map(|part| {
                let (digits, hardened) = match part
                    .strip_suffix('\'')
                    .or_else(|| part.strip_suffix('h'))
                {
                    Some(d) => (d, true),
                    None => (part, false),
                };
                let index: u32 = digits.parse().map_err(|_| {
                    AppError::invalid_input(format!("Invalid path segment '{}' in {}", part, s))
                })?;
                if index >= HARDENED {
                    return Err(AppError::invalid_input(format!(
                        "Path segment out of range: {}",
                        part
                    )));
                }
                Ok(ChildIndex { index, hardened })
            })
            .collect::<AppResult<Vec<_>>>()?;

        if segments.len() < 2 {
            return Err(AppError::invalid_input(format!(
                "Derivation path has no coin type: {}",
                s
            )));
        }

        Ok(Self { segments })
    }
}

impl FromStr for DerivationPath {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<Self> {
        Self::parse_segments(s)
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("m")?;
        for seg in &self.segments {
            write!(f, "/{}", seg.index)?;
            if seg.hardened {
                f.write_str("'")?;
            }
        }
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 密钥对
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 账户独占的密钥对；私钥只在签名时离开账户
pub enum Keypair {
    Ed25519(ed25519_dalek::SigningKey),
    Secp256k1(k256::ecdsa::SigningKey),
}

impl Keypair {
    /// ed25519: 32 字节；secp256k1: 33 字节压缩公钥
    pub fn public_key_bytes(&self) -> Vec<u8> {
        match self {
            Keypair::Ed25519(key) => key.verifying_key().to_bytes().to_vec(),
            Keypair::Secp256k1(key) => key
                .verifying_key()
                .to_encoded_point(true)
                .as_bytes()
                .to_vec(),
        }
    }

    pub fn scheme(&self) -> DerivationScheme {
        match self {
            Keypair::Ed25519(_) => DerivationScheme::Slip10Ed25519,
            Keypair::Secp256k1(_) => DerivationScheme::Bip32Secp256k1,
        }
    }

    pub(crate) fn secret_bytes(&self) -> Zeroizing<[u8; 32]> {
        match self {
            Keypair::Ed25519(key) => Zeroizing::new(key.to_bytes()),
            Keypair::Secp256k1(key) => {
                let mut out = Zeroizing::new([0u8; 32]);
                out.copy_from_slice(key.to_bytes().as_slice());
                out
            }
        }
    }

    /// ed25519 签名（SVM 交易）
    pub(crate) fn sign_ed25519(&self, message: &[u8]) -> AppResult<[u8; 64]> {
        use ed25519_dalek::Signer;
        match self {
            Keypair::Ed25519(key) => Ok(key.sign(message).to_bytes()),
            Keypair::Secp256k1(_) => Err(AppError::internal(
                "ed25519 signature requested from a secp256k1 keypair",
            )),
        }
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("scheme", &self.scheme())
            .field("public_key", &hex::encode(self.public_key_bytes()))
            .finish()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 派生策略
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivationScheme {
    Slip10Ed25519,
    Bip32Secp256k1,
}

impl DerivationScheme {
    pub fn for_coin_type(coin_type: u32) -> AppResult<Self> {
        match coin_type {
            coin_types::SOL => Ok(DerivationScheme::Slip10Ed25519),
            coin_types::BTC | coin_types::TESTNET => Ok(DerivationScheme::Bip32Secp256k1),
            other => Err(AppError::unsupported(format!(
                "key derivation for coin type {}",
                other
            ))),
        }
    }
}

/// 钱包派生策略 trait
pub trait DerivationStrategy: Send + Sync {
    fn derive(&self, seed: &[u8], path: &DerivationPath) -> AppResult<Keypair>;
}

/// SLIP-0010 ed25519
pub struct Ed25519Strategy;

impl DerivationStrategy for Ed25519Strategy {
    fn derive(&self, seed: &[u8], path: &DerivationPath) -> AppResult<Keypair> {
        let secret = slip10_ed25519(seed, path)?;
        Ok(Keypair::Ed25519(ed25519_dalek::SigningKey::from_bytes(
            &secret,
        )))
    }
}

/// BIP32 secp256k1
pub struct Secp256k1Strategy;

impl DerivationStrategy for Secp256k1Strategy {
    fn derive(&self, seed: &[u8], path: &DerivationPath) -> AppResult<Keypair> {
        use coins_bip32::prelude::*;
        use k256::ecdsa::SigningKey;

        let derivation_path = path
            .to_string()
            .parse::<coins_bip32::path::DerivationPath>()
            .map_err(|e| AppError::invalid_input(format!("Invalid derivation path: {}", e)))?;

        let master_key = XPriv::root_from_seed(seed, None)
            .map_err(|e| AppError::internal(format!("Failed to derive master key: {}", e)))?;

        let derived_key = master_key
            .derive_path(&derivation_path)
            .map_err(|e| AppError::internal(format!("Failed to derive key: {}", e)))?;

        // XPriv 实现 AsRef<SigningKey>
        let signing_key: &SigningKey = derived_key.as_ref();
        Ok(Keypair::Secp256k1(signing_key.clone()))
    }
}

/// 策略工厂
pub struct DerivationStrategyFactory;

impl DerivationStrategyFactory {
    pub fn create_strategy(scheme: DerivationScheme) -> Box<dyn DerivationStrategy> {
        match scheme {
            DerivationScheme::Slip10Ed25519 => Box::new(Ed25519Strategy),
            DerivationScheme::Bip32Secp256k1 => Box::new(Secp256k1Strategy),
        }
    }
}

type HmacSha512 = Hmac<Sha512>;

fn hmac_sha512(key: &[u8], parts: &[&[u8]]) -> AppResult<Zeroizing<[u8; 64]>> {
    let mut mac = HmacSha512::new_from_slice(key)
        .map_err(|e| AppError::internal(format!("HMAC init failed: {}", e)))?;
    for part in parts {
        mac.update(part);
    }
    let mut out = Zeroizing::new([0u8; 64]);
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

/// SLIP-0010 ed25519 私钥派生，非硬化段视为输入错误
pub(crate) fn slip10_ed25519(seed: &[u8], path: &DerivationPath) -> AppResult<Zeroizing<[u8; 32]>> {
    let i = hmac_sha512(b"ed25519 seed", &[seed])?;
    let mut key = Zeroizing::new([0u8; 32]);
    let mut chain_code = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(&i[..32]);
    chain_code.copy_from_slice(&i[32..]);

    for seg in path.segments() {
        if !seg.hardened {
            return Err(AppError::invalid_input(format!(
                "ed25519 derivation only supports hardened segments: {}",
                path
            )));
        }
        let index = (seg.index | HARDENED).to_be_bytes();
        let i = hmac_sha512(&chain_code[..], &[&[0u8][..], &key[..], &index[..]])?;
        key.copy_from_slice(&i[..32]);
        chain_code.copy_from_slice(&i[32..]);
    }

    Ok(key)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 对外入口
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 助记词 + 路径 → 密钥对（确定性）
pub fn derive_keypair(mnemonic: &str, path: &DerivationPath) -> AppResult<Keypair> {
    let mnemonic = Mnemonic::parse_in(Language::English, mnemonic)
        .map_err(|e| AppError::invalid_mnemonic(format!("Invalid mnemonic: {}", e)))?;
    let seed = Zeroizing::new(mnemonic.to_seed(""));

    let coin_type = path
        .coin_type()
        .ok_or_else(|| AppError::invalid_input(format!("Path has no coin type: {}", path)))?;
    let scheme = DerivationScheme::for_coin_type(coin_type)?;

    DerivationStrategyFactory::create_strategy(scheme).derive(&seed[..], path)
}

pub fn validate_mnemonic(phrase: &str) -> bool {
    Mnemonic::parse_in(Language::English, phrase).is_ok()
}

/// 生成 12 或 24 词助记词
pub fn generate_mnemonic(word_count: usize) -> AppResult<String> {
    let entropy_bytes = match word_count {
        12 => 16, // 128 bits = 12 words
        24 => 32, // 256 bits = 24 words
        _ => {
            return Err(AppError::invalid_input(
                "Invalid word count, must be 12 or 24",
            ))
        }
    };

    let mut entropy = Zeroizing::new(vec![0u8; entropy_bytes]);
    rand::thread_rng().fill_bytes(&mut entropy);

    let mnemonic = Mnemonic::from_entropy_in(Language::English, &entropy)
        .map_err(|e| AppError::internal(format!("Failed to generate mnemonic: {}", e)))?;
    Ok(mnemonic.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_path_roundtrip() {
        let path: DerivationPath = "m/44'/501'/3'/0'".parse().unwrap();
        assert_eq!(path.coin_type(), Some(501));
        assert_eq!(path.to_string(), "m/44'/501'/3'/0'");
        assert_eq!(path, DerivationPath::for_account(501, 3));

        let btc = DerivationPath::for_account(0, 2);
        assert_eq!(btc.to_string(), "m/84'/0'/2'/0/0");
    }

    #[test]
    fn test_malformed_paths() {
        assert!("44'/501'".parse::<DerivationPath>().is_err());
        assert!("m/44'/abc'".parse::<DerivationPath>().is_err());
        assert!("m/44'".parse::<DerivationPath>().is_err());
        assert!("m/44'/2147483648".parse::<DerivationPath>().is_err());
    }

    #[test]
    fn test_slip10_vector_1() {
        // SLIP-0010 test vector 1, seed 000102030405060708090a0b0c0d0e0f
        let seed = hex::decode("000102030405060708090a0b0c0d0e0f").unwrap();

        let master = slip10_ed25519(&seed, &DerivationPath { segments: vec![] }).unwrap();
        assert_eq!(
            hex::encode(&master[..]),
            "2b4be7f19ee27bbf30c667b642d5f4aa69fd169872f8fc3059c08ebae2eb19e7"
        );

        let child = slip10_ed25519(
            &seed,
            &DerivationPath {
                segments: vec![ChildIndex {
                    index: 0,
                    hardened: true,
                }],
            },
        )
        .unwrap();
        assert_eq!(
            hex::encode(&child[..]),
            "68e0fe46dfb67e368c75379acec591dad19df3cde26e63b93a8e704f1dade7a3"
        );
    }

    #[test]
    fn test_ed25519_rejects_soft_segments() {
        let path: DerivationPath = "m/44'/501'/0'/0".parse().unwrap();
        let err = derive_keypair(MNEMONIC, &path).unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn test_scheme_follows_coin_type() {
        let sol = derive_keypair(MNEMONIC, &DerivationPath::for_account(501, 0)).unwrap();
        let btc = derive_keypair(MNEMONIC, &DerivationPath::for_account(0, 0)).unwrap();
        assert_eq!(sol.scheme(), DerivationScheme::Slip10Ed25519);
        assert_eq!(sol.public_key_bytes().len(), 32);
        assert_eq!(btc.scheme(), DerivationScheme::Bip32Secp256k1);
        assert_eq!(btc.public_key_bytes().len(), 33);

        let unknown: DerivationPath = "m/44'/60'/0'/0/0".parse().unwrap();
        assert!(derive_keypair(MNEMONIC, &unknown).unwrap_err().is_unsupported());
    }

    #[test]
    fn test_invalid_mnemonic() {
        let bad = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon";
        let err = derive_keypair(bad, &DerivationPath::for_account(501, 0)).unwrap_err();
        assert_eq!(err.code, crate::error::AppErrorCode::InvalidMnemonic);
        assert!(!validate_mnemonic(bad));
        assert!(validate_mnemonic(MNEMONIC));
    }

    #[test]
    fn test_generate_mnemonic() {
        let phrase = generate_mnemonic(24).unwrap();
        assert_eq!(phrase.split_whitespace().count(), 24);
        assert!(validate_mnemonic(&phrase));
        assert!(generate_mnemonic(13).is_err());
    }

    #[test]
    fn test_debug_hides_secret() {
        let kp = derive_keypair(MNEMONIC, &DerivationPath::for_account(501, 0)).unwrap();
        let secret_hex = hex::encode(&kp.secret_bytes()[..]);
        let debug = format!("{:?}", kp);
        assert!(!debug.contains(&secret_hex));
        assert!(debug.contains("public_key"));
    }
}
