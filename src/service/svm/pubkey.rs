//! SVM 公钥与程序派生地址

use std::{fmt, str::FromStr};

use sha2::{Digest, Sha256};

use crate::error::{AppError, AppResult};

pub const SYSTEM_PROGRAM_ID: &str = "11111111111111111111111111111111";
pub const ASSOCIATED_TOKEN_PROGRAM_ID: &str = "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL";
pub const MEMO_PROGRAM_ID: &str = "MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr";

const MAX_SEEDS: usize = 16;
const MAX_SEED_LEN: usize = 32;
const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pubkey([u8; 32]);

impl Pubkey {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> AppResult<Self> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| {
            AppError::invalid_input(format!("Public key must be 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(arr))
    }

    pub fn to_bytes(self) -> [u8; 32] {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_on_curve(&self) -> bool {
        ed25519_dalek::VerifyingKey::from_bytes(&self.0).is_ok()
    }

    pub fn create_program_address(seeds: &[&[u8]], program_id: &Pubkey) -> AppResult<Pubkey> {
        if seeds.len() > MAX_SEEDS || seeds.iter().any(|s| s.len() > MAX_SEED_LEN) {
            return Err(AppError::invalid_input("Program address seeds exceed limits"));
        }

        let mut hasher = Sha256::new();
        for seed in seeds {
            hasher.update(seed);
        }
        hasher.update(program_id.as_bytes());
        hasher.update(PDA_MARKER);
        let candidate = Pubkey(hasher.finalize().into());

        if candidate.is_on_curve() {
            return Err(AppError::invalid_input("Program address lies on the curve"));
        }
        Ok(candidate)
    }

    /// 从 bump 255 往下找第一个落在曲线外的地址
    pub fn find_program_address(seeds: &[&[u8]], program_id: &Pubkey) -> AppResult<(Pubkey, u8)> {
        for bump in (0..=u8::MAX).rev() {
            let bump_seed = [bump];
            let mut with_bump: Vec<&[u8]> = seeds.to_vec();
            with_bump.push(&bump_seed);
            if let Ok(address) = Self::create_program_address(&with_bump, program_id) {
                return Ok((address, bump));
            }
        }
        Err(AppError::internal("No viable program address bump found"))
    }

    pub fn system_program() -> Pubkey {
        Pubkey([0u8; 32])
    }
}

impl FromStr for Pubkey {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|_| AppError::invalid_address(s))?;
        Pubkey::from_slice(&bytes).map_err(|_| AppError::invalid_address(s))
    }
}

impl fmt::Display for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pubkey({})", self)
    }
}

impl AsRef<[u8]> for Pubkey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// 关联代币账户地址：`[wallet, token_program, mint]` 在 ATA 程序下的 PDA
pub fn associated_token_address(
    wallet: &Pubkey,
    mint: &Pubkey,
    token_program: &Pubkey,
) -> AppResult<Pubkey> {
    let ata_program: Pubkey = ASSOCIATED_TOKEN_PROGRAM_ID.parse()?;
    let (address, _) = Pubkey::find_program_address(
        &[wallet.as_ref(), token_program.as_ref(), mint.as_ref()],
        &ata_program,
    )?;
    Ok(address)
}
