//! SPL Token / Token-2022 指令构造与账户数据解析

use crate::{
    error::{AppError, AppResult},
    infrastructure::solana_rpc::TOKEN_2022_PROGRAM_ID,
    service::svm::{
        pubkey::{Pubkey, ASSOCIATED_TOKEN_PROGRAM_ID, MEMO_PROGRAM_ID},
        transaction::{AccountMeta, Instruction},
    },
};

pub const MINT_BASE_LEN: usize = 82;
pub const TOKEN_ACCOUNT_BASE_LEN: usize = 165;

/// Token-2022：账户类型字节位于 165，TLV 从 166 开始（mint 在 82..165 之间补零）
const ACCOUNT_TYPE_OFFSET: usize = TOKEN_ACCOUNT_BASE_LEN;

const EXT_TRANSFER_FEE_CONFIG: u16 = 1;
const EXT_MEMO_TRANSFER: u16 = 8;
const EXT_METADATA_POINTER: u16 = 18;
const EXT_TOKEN_METADATA: u16 = 19;

const IX_TRANSFER_CHECKED: u8 = 12;
const IX_TRANSFER_FEE_EXTENSION: u8 = 26;
const IX_TRANSFER_CHECKED_WITH_FEE: u8 = 1;
const IX_ATA_CREATE_IDEMPOTENT: u8 = 1;
const IX_SYSTEM_TRANSFER: u32 = 2;

const MAX_FEE_BASIS_POINTS: u128 = 10_000;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 指令
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn system_transfer(from: &Pubkey, to: &Pubkey, lamports: u64) -> Instruction {
    let mut data = IX_SYSTEM_TRANSFER.to_le_bytes().to_vec();
    data.extend_from_slice(&lamports.to_le_bytes());
    Instruction {
        program_id: Pubkey::system_program(),
        accounts: vec![AccountMeta::new(*from, true), AccountMeta::new(*to, false)],
        data,
    }
}

pub struct TransferAccounts<'a> {
    pub token_program: &'a Pubkey,
    pub source: &'a Pubkey,
    pub mint: &'a Pubkey,
    pub destination: &'a Pubkey,
    pub owner: &'a Pubkey,
}

impl TransferAccounts<'_> {
    fn metas(&self) -> Vec<AccountMeta> {
        vec![
            AccountMeta::new(*self.source, false),
            AccountMeta::new_readonly(*self.mint, false),
            AccountMeta::new(*self.destination, false),
            AccountMeta::new_readonly(*self.owner, true),
        ]
    }
}

pub fn transfer_checked(accounts: &TransferAccounts<'_>, amount: u64, decimals: u8) -> Instruction {
    let mut data = vec![IX_TRANSFER_CHECKED];
    data.extend_from_slice(&amount.to_le_bytes());
    data.push(decimals);
    Instruction {
        program_id: *accounts.token_program,
        accounts: accounts.metas(),
        data,
    }
}

/// Token-2022 TransferFeeExtension::TransferCheckedWithFee；`fee` 必须与链上计算一致
pub fn transfer_checked_with_fee(
    accounts: &TransferAccounts<'_>,
    amount: u64,
    decimals: u8,
    fee: u64,
) -> Instruction {
    let mut data = vec![IX_TRANSFER_FEE_EXTENSION, IX_TRANSFER_CHECKED_WITH_FEE];
    data.extend_from_slice(&amount.to_le_bytes());
    data.push(decimals);
    data.extend_from_slice(&fee.to_le_bytes());
    Instruction {
        program_id: *accounts.token_program,
        accounts: accounts.metas(),
        data,
    }
}

pub fn create_associated_token_account_idempotent(
    payer: &Pubkey,
    associated: &Pubkey,
    wallet: &Pubkey,
    mint: &Pubkey,
    token_program: &Pubkey,
) -> AppResult<Instruction> {
    Ok(Instruction {
        program_id: ASSOCIATED_TOKEN_PROGRAM_ID.parse()?,
        accounts: vec![
            AccountMeta::new(*payer, true),
            AccountMeta::new(*associated, false),
            AccountMeta::new_readonly(*wallet, false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new_readonly(Pubkey::system_program(), false),
            AccountMeta::new_readonly(*token_program, false),
        ],
        data: vec![IX_ATA_CREATE_IDEMPOTENT],
    })
}

pub fn memo(text: &str, signer: &Pubkey) -> AppResult<Instruction> {
    Ok(Instruction {
        program_id: MEMO_PROGRAM_ID.parse()?,
        accounts: vec![AccountMeta::new_readonly(*signer, true)],
        data: text.as_bytes().to_vec(),
    })
}

pub fn is_token_2022(program_id: &str) -> bool {
    program_id == TOKEN_2022_PROGRAM_ID
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 转账手续费扩展
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferFee {
    pub epoch: u64,
    pub maximum_fee: u64,
    pub transfer_fee_basis_points: u16,
}

impl TransferFee {
    /// `min(ceil(amount * bps / 10_000), maximum_fee)`
    pub fn calculate(&self, amount: u64) -> u64 {
        let bps = self.transfer_fee_basis_points as u128;
        if bps == 0 || amount == 0 {
            return 0;
        }
        let raw = (amount as u128 * bps).div_ceil(MAX_FEE_BASIS_POINTS);
        raw.min(self.maximum_fee as u128) as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferFeeConfig {
    pub withheld_amount: u64,
    pub older_transfer_fee: TransferFee,
    pub newer_transfer_fee: TransferFee,
}

impl TransferFeeConfig {
    /// 当前 epoch 达到 newer 的生效 epoch 后使用 newer
    pub fn fee_for_epoch(&self, epoch: u64) -> &TransferFee {
        if epoch >= self.newer_transfer_fee.epoch {
            &self.newer_transfer_fee
        } else {
            &self.older_transfer_fee
        }
    }

    pub fn calculate_fee(&self, epoch: u64, amount: u64) -> u64 {
        self.fee_for_epoch(epoch).calculate(amount)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadataExt {
    pub update_authority: Option<Pubkey>,
    pub mint: Pubkey,
    pub name: String,
    pub symbol: String,
    pub uri: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MintExtensions {
    pub transfer_fee_config: Option<TransferFeeConfig>,
    pub metadata_pointer: Option<Pubkey>,
    pub token_metadata: Option<TokenMetadataExt>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 账户数据解析
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mint {
    pub supply: u64,
    pub decimals: u8,
    pub is_initialized: bool,
    pub extensions: MintExtensions,
}

impl Mint {
    pub fn unpack(data: &[u8]) -> AppResult<Self> {
        if data.len() < MINT_BASE_LEN {
            return Err(AppError::invalid_input(format!(
                "Mint account data too short: {} bytes",
                data.len()
            )));
        }
        let mut extensions = MintExtensions::default();
        for (ty, value) in tlv_entries(data) {
            match ty {
                EXT_TRANSFER_FEE_CONFIG => {
                    extensions.transfer_fee_config = Some(parse_transfer_fee_config(value)?)
                }
                EXT_METADATA_POINTER => extensions.metadata_pointer = parse_metadata_pointer(value)?,
                EXT_TOKEN_METADATA => {
                    extensions.token_metadata = Some(parse_token_metadata(value)?)
                }
                _ => {}
            }
        }

        Ok(Self {
            supply: read_u64(data, 36)?,
            decimals: data[44],
            is_initialized: data[45] != 0,
            extensions,
        })
    }

    /// 供应量为 1 且无小数位的视为 NFT
    pub fn is_nft(&self) -> bool {
        self.supply == 1 && self.decimals == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenAccount {
    pub mint: Pubkey,
    pub owner: Pubkey,
    pub amount: u64,
    pub require_incoming_memo: bool,
}

impl TokenAccount {
    pub fn unpack(data: &[u8]) -> AppResult<Self> {
        if data.len() < TOKEN_ACCOUNT_BASE_LEN {
            return Err(AppError::invalid_input(format!(
                "Token account data too short: {} bytes",
                data.len()
            )));
        }
        let require_incoming_memo = tlv_entries(data)
            .find(|(ty, _)| *ty == EXT_MEMO_TRANSFER)
            .map(|(_, value)| value.first().copied().unwrap_or(0) != 0)
            .unwrap_or(false);

        Ok(Self {
            mint: Pubkey::from_slice(&data[0..32])?,
            owner: Pubkey::from_slice(&data[32..64])?,
            amount: read_u64(data, 64)?,
            require_incoming_memo,
        })
    }
}

/// 遍历 Token-2022 扩展；legacy 账户（长度不超过 165）没有扩展
fn tlv_entries(data: &[u8]) -> impl Iterator<Item = (u16, &[u8])> {
    let mut offset = ACCOUNT_TYPE_OFFSET + 1;
    let has_tlv = data.len() > ACCOUNT_TYPE_OFFSET;
    std::iter::from_fn(move || {
        if !has_tlv || offset + 4 > data.len() {
            return None;
        }
        let ty = u16::from_le_bytes([data[offset], data[offset + 1]]);
        let len = u16::from_le_bytes([data[offset + 2], data[offset + 3]]) as usize;
        let start = offset + 4;
        // 类型 0 表示未初始化的尾部空间
        if ty == 0 || start + len > data.len() {
            return None;
        }
        offset = start + len;
        Some((ty, &data[start..start + len]))
    })
}

fn read_u64(data: &[u8], at: usize) -> AppResult<u64> {
    data.get(at..at + 8)
        .and_then(|s| s.try_into().ok())
        .map(u64::from_le_bytes)
        .ok_or_else(|| AppError::invalid_input("Truncated u64 field"))
}

fn read_u16(data: &[u8], at: usize) -> AppResult<u16> {
    data.get(at..at + 2)
        .and_then(|s| s.try_into().ok())
        .map(u16::from_le_bytes)
        .ok_or_else(|| AppError::invalid_input("Truncated u16 field"))
}

/// 全零公钥表示未设置
fn optional_pubkey(bytes: &[u8]) -> AppResult<Option<Pubkey>> {
    let key = Pubkey::from_slice(bytes)?;
    Ok((key != Pubkey::default()).then_some(key))
}

fn parse_transfer_fee(data: &[u8], at: usize) -> AppResult<TransferFee> {
    Ok(TransferFee {
        epoch: read_u64(data, at)?,
        maximum_fee: read_u64(data, at + 8)?,
        transfer_fee_basis_points: read_u16(data, at + 16)?,
    })
}

fn parse_transfer_fee_config(value: &[u8]) -> AppResult<TransferFeeConfig> {
    // 两个 authority 各 32 字节，withheld u64，然后是 older / newer 各 18 字节
    Ok(TransferFeeConfig {
        withheld_amount: read_u64(value, 64)?,
        older_transfer_fee: parse_transfer_fee(value, 72)?,
        newer_transfer_fee: parse_transfer_fee(value, 90)?,
    })
}

fn parse_metadata_pointer(value: &[u8]) -> AppResult<Option<Pubkey>> {
    if value.len() < 64 {
        return Err(AppError::invalid_input("Truncated metadata pointer"));
    }
    optional_pubkey(&value[32..64])
}

fn read_borsh_string(value: &[u8], offset: &mut usize) -> AppResult<String> {
    let len_bytes: [u8; 4] = value
        .get(*offset..*offset + 4)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| AppError::invalid_input("Truncated metadata string"))?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    let start = *offset + 4;
    let bytes = value
        .get(start..start + len)
        .ok_or_else(|| AppError::invalid_input("Truncated metadata string"))?;
    *offset = start + len;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

fn parse_token_metadata(value: &[u8]) -> AppResult<TokenMetadataExt> {
    if value.len() < 64 {
        return Err(AppError::invalid_input("Truncated token metadata"));
    }
    let mut offset = 64;
    let name = read_borsh_string(value, &mut offset)?;
    let symbol = read_borsh_string(value, &mut offset)?;
    let uri = read_borsh_string(value, &mut offset)?;
    Ok(TokenMetadataExt {
        update_authority: optional_pubkey(&value[0..32])?,
        mint: Pubkey::from_slice(&value[32..64])?,
        name: name.trim_end_matches('\0').to_string(),
        symbol: symbol.trim_end_matches('\0').to_string(),
        uri: uri.trim_end_matches('\0').to_string(),
    })
}

// 集成测试构造账户数据时复用
#[doc(hidden)]
pub mod fixtures {
    use super::*;

    pub fn mint_data(supply: u64, decimals: u8, extensions: &[(u16, Vec<u8>)]) -> Vec<u8> {
        let mut data = vec![0u8; MINT_BASE_LEN];
        data[36..44].copy_from_slice(&supply.to_le_bytes());
        data[44] = decimals;
        data[45] = 1;
        if !extensions.is_empty() {
            data.resize(ACCOUNT_TYPE_OFFSET, 0);
            data.push(1); // AccountType::Mint
            push_tlv(&mut data, extensions);
        }
        data
    }

    pub fn token_account_data(
        mint: &Pubkey,
        owner: &Pubkey,
        amount: u64,
        extensions: &[(u16, Vec<u8>)],
    ) -> Vec<u8> {
        let mut data = vec![0u8; TOKEN_ACCOUNT_BASE_LEN];
        data[0..32].copy_from_slice(mint.as_bytes());
        data[32..64].copy_from_slice(owner.as_bytes());
        data[64..72].copy_from_slice(&amount.to_le_bytes());
        data[108] = 1; // initialized
        if !extensions.is_empty() {
            data.push(2); // AccountType::Account
            push_tlv(&mut data, extensions);
        }
        data
    }

    fn push_tlv(data: &mut Vec<u8>, extensions: &[(u16, Vec<u8>)]) {
        for (ty, value) in extensions {
            data.extend_from_slice(&ty.to_le_bytes());
            data.extend_from_slice(&(value.len() as u16).to_le_bytes());
            data.extend_from_slice(value);
        }
    }

    pub fn transfer_fee_config(older: TransferFee, newer: TransferFee) -> (u16, Vec<u8>) {
        let mut value = vec![0u8; 64];
        value.extend_from_slice(&0u64.to_le_bytes());
        for fee in [older, newer] {
            value.extend_from_slice(&fee.epoch.to_le_bytes());
            value.extend_from_slice(&fee.maximum_fee.to_le_bytes());
            value.extend_from_slice(&fee.transfer_fee_basis_points.to_le_bytes());
        }
        (EXT_TRANSFER_FEE_CONFIG, value)
    }

    pub fn memo_transfer(required: bool) -> (u16, Vec<u8>) {
        (EXT_MEMO_TRANSFER, vec![required as u8])
    }

    pub fn metadata_pointer(address: &Pubkey) -> (u16, Vec<u8>) {
        let mut value = vec![0u8; 32];
        value.extend_from_slice(address.as_bytes());
        (EXT_METADATA_POINTER, value)
    }

    pub fn token_metadata(mint: &Pubkey, name: &str, symbol: &str, uri: &str) -> (u16, Vec<u8>) {
        let mut value = vec![0u8; 32];
        value.extend_from_slice(mint.as_bytes());
        for s in [name, symbol, uri] {
            value.extend_from_slice(&(s.len() as u32).to_le_bytes());
            value.extend_from_slice(s.as_bytes());
        }
        value.extend_from_slice(&0u32.to_le_bytes());
        (EXT_TOKEN_METADATA, value)
    }
}
