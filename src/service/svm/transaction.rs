//! SVM 交易线格式
//!
//! 只实现钱包需要的部分：legacy 消息编译、签名、序列化，
//! 以及对后端下发的 legacy / v0 消息按签名位填入本账户签名。

use base64::Engine;

use crate::{
    domain::derivation::Keypair,
    error::{AppError, AppResult},
    service::svm::pubkey::Pubkey,
};

const SIGNATURE_LEN: usize = 64;
const VERSION_PREFIX_MASK: u8 = 0x80;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// compact-u16
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn encode_compact_u16(value: u16, out: &mut Vec<u8>) {
    let mut rem = value;
    loop {
        let mut byte = (rem & 0x7f) as u8;
        rem >>= 7;
        if rem == 0 {
            out.push(byte);
            break;
        }
        byte |= 0x80;
        out.push(byte);
    }
}

/// 返回 (值, 消耗的字节数)
pub fn decode_compact_u16(bytes: &[u8]) -> AppResult<(u16, usize)> {
    let mut value: u32 = 0;
    for (i, byte) in bytes.iter().take(3).enumerate() {
        value |= ((byte & 0x7f) as u32) << (7 * i);
        if byte & 0x80 == 0 {
            return u16::try_from(value)
                .map(|v| (v, i + 1))
                .map_err(|_| AppError::invalid_input("compact-u16 overflow"));
        }
    }
    Err(AppError::invalid_input("Truncated compact-u16"))
}

fn compact_len(len: usize, out: &mut Vec<u8>) -> AppResult<()> {
    let len = u16::try_from(len).map_err(|_| AppError::invalid_input("Array too long"))?;
    encode_compact_u16(len, out);
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 指令与消息
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountMeta {
    pub pubkey: Pubkey,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountMeta {
    pub fn new(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: true,
        }
    }

    pub fn new_readonly(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub program_id: Pubkey,
    pub accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub num_required_signatures: u8,
    pub num_readonly_signed_accounts: u8,
    pub num_readonly_unsigned_accounts: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
    pub program_id_index: u8,
    pub accounts: Vec<u8>,
    pub data: Vec<u8>,
}

/// legacy 消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: MessageHeader,
    pub account_keys: Vec<Pubkey>,
    pub recent_blockhash: [u8; 32],
    pub instructions: Vec<CompiledInstruction>,
}

impl Message {
    /// 账户去重并合并权限，排序：可写签名者（payer 第一）、只读签名者、可写非签名者、只读非签名者
    pub fn compile(
        payer: &Pubkey,
        instructions: &[Instruction],
        recent_blockhash: &str,
    ) -> AppResult<Self> {
        let blockhash = bs58::decode(recent_blockhash)
            .into_vec()
            .map_err(|e| AppError::transient(format!("Invalid blockhash: {}", e)))?;
        let recent_blockhash: [u8; 32] = blockhash
            .try_into()
            .map_err(|_| AppError::transient("Blockhash must be 32 bytes"))?;

        let mut metas: Vec<AccountMeta> = vec![AccountMeta::new(*payer, true)];
        let mut merge = |meta: &AccountMeta| match metas.iter_mut().find(|m| m.pubkey == meta.pubkey) {
            Some(existing) => {
                existing.is_signer |= meta.is_signer;
                existing.is_writable |= meta.is_writable;
            }
            None => metas.push(meta.clone()),
        };
        for ix in instructions {
            for meta in &ix.accounts {
                merge(meta);
            }
            merge(&AccountMeta::new_readonly(ix.program_id, false));
        }

        // 稳定排序，payer 保持在首位
        metas.sort_by_key(|m| match (m.is_signer, m.is_writable) {
            (true, true) => 0,
            (true, false) => 1,
            (false, true) => 2,
            (false, false) => 3,
        });

        let count = |signer: bool, writable: bool| {
            metas
                .iter()
                .filter(|m| m.is_signer == signer && m.is_writable == writable)
                .count()
        };
        let header = MessageHeader {
            num_required_signatures: to_u8(metas.iter().filter(|m| m.is_signer).count())?,
            num_readonly_signed_accounts: to_u8(count(true, false))?,
            num_readonly_unsigned_accounts: to_u8(count(false, false))?,
        };

        let account_keys: Vec<Pubkey> = metas.iter().map(|m| m.pubkey).collect();
        let index_of = |key: &Pubkey| -> AppResult<u8> {
            account_keys
                .iter()
                .position(|k| k == key)
                .ok_or_else(|| AppError::internal("Account missing from compiled keys"))
                .and_then(to_u8)
        };

        let instructions = instructions
            .iter()
            .map(|ix| {
                Ok(CompiledInstruction {
                    program_id_index: index_of(&ix.program_id)?,
                    accounts: ix
                        .accounts
                        .iter()
                        .map(|m| index_of(&m.pubkey))
                        .collect::<AppResult<Vec<u8>>>()?,
                    data: ix.data.clone(),
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(Self {
            header,
            account_keys,
            recent_blockhash,
            instructions,
        })
    }

    pub fn serialize(&self) -> AppResult<Vec<u8>> {
        let mut out = vec![
            self.header.num_required_signatures,
            self.header.num_readonly_signed_accounts,
            self.header.num_readonly_unsigned_accounts,
        ];
        compact_len(self.account_keys.len(), &mut out)?;
        for key in &self.account_keys {
            out.extend_from_slice(key.as_bytes());
        }
        out.extend_from_slice(&self.recent_blockhash);
        compact_len(self.instructions.len(), &mut out)?;
        for ix in &self.instructions {
            out.push(ix.program_id_index);
            compact_len(ix.accounts.len(), &mut out)?;
            out.extend_from_slice(&ix.accounts);
            compact_len(ix.data.len(), &mut out)?;
            out.extend_from_slice(&ix.data);
        }
        Ok(out)
    }
}

fn to_u8(n: usize) -> AppResult<u8> {
    u8::try_from(n).map_err(|_| AppError::invalid_input("Too many accounts in message"))
}

/// 读取已序列化消息（legacy 或 v0）的头部与需要签名的公钥
pub fn required_signers(message: &[u8]) -> AppResult<Vec<Pubkey>> {
    let body = match message.first() {
        Some(prefix) if prefix & VERSION_PREFIX_MASK != 0 => &message[1..],
        Some(_) => message,
        None => return Err(AppError::invalid_input("Empty message")),
    };
    if body.len() < 3 {
        return Err(AppError::invalid_input("Truncated message header"));
    }
    let num_required = body[0] as usize;
    let (key_count, used) = decode_compact_u16(&body[3..])?;
    let keys_start = 3 + used;
    let keys_end = keys_start + key_count as usize * 32;
    if body.len() < keys_end || num_required > key_count as usize {
        return Err(AppError::invalid_input("Truncated message account keys"));
    }

    body[keys_start..keys_start + num_required * 32]
        .chunks_exact(32)
        .map(Pubkey::from_slice)
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 交易
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 签名列表 + 已序列化消息；消息版本对签名流程透明
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub signatures: Vec<[u8; SIGNATURE_LEN]>,
    pub message: Vec<u8>,
}

impl Transaction {
    pub fn new(message: &Message) -> AppResult<Self> {
        Self::from_message_bytes(message.serialize()?)
    }

    /// 签名位全部置零
    pub fn from_message_bytes(message: Vec<u8>) -> AppResult<Self> {
        let signers = required_signers(&message)?;
        Ok(Self {
            signatures: vec![[0u8; SIGNATURE_LEN]; signers.len()],
            message,
        })
    }

    pub fn deserialize(bytes: &[u8]) -> AppResult<Self> {
        let (count, used) = decode_compact_u16(bytes)?;
        let sigs_end = used + count as usize * SIGNATURE_LEN;
        if bytes.len() < sigs_end {
            return Err(AppError::invalid_input("Truncated transaction signatures"));
        }
        let signatures = bytes[used..sigs_end]
            .chunks_exact(SIGNATURE_LEN)
            .map(|chunk| {
                let mut sig = [0u8; SIGNATURE_LEN];
                sig.copy_from_slice(chunk);
                sig
            })
            .collect();
        let tx = Self {
            signatures,
            message: bytes[sigs_end..].to_vec(),
        };
        if required_signers(&tx.message)?.len() != tx.signatures.len() {
            return Err(AppError::invalid_input(
                "Signature count does not match message header",
            ));
        }
        Ok(tx)
    }

    /// 在本账户对应的签名位写入签名，其他签名位保持不变
    pub fn sign(&mut self, keypair: &Keypair) -> AppResult<()> {
        let me = Pubkey::from_slice(&keypair.public_key_bytes())?;
        let position = required_signers(&self.message)?
            .iter()
            .position(|k| *k == me)
            .ok_or_else(|| {
                AppError::invalid_input(format!("{} is not a required signer of this message", me))
            })?;
        self.signatures[position] = keypair.sign_ed25519(&self.message)?;
        Ok(())
    }

    pub fn serialize(&self) -> AppResult<Vec<u8>> {
        let mut out = Vec::with_capacity(3 + self.signatures.len() * SIGNATURE_LEN + self.message.len());
        compact_len(self.signatures.len(), &mut out)?;
        for sig in &self.signatures {
            out.extend_from_slice(sig);
        }
        out.extend_from_slice(&self.message);
        Ok(out)
    }

    pub fn to_base64(&self) -> AppResult<String> {
        Ok(base64::engine::general_purpose::STANDARD.encode(self.serialize()?))
    }

    pub fn message_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.message)
    }

    /// 交易 id：首个签名的 base58
    pub fn signature(&self) -> Option<String> {
        self.signatures
            .first()
            .filter(|sig| sig.iter().any(|b| *b != 0))
            .map(|sig| bs58::encode(sig).into_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::derivation::{derive_keypair, DerivationPath};

    const MNEMONIC: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
    const BLOCKHASH: &str = "EkSnNWid2cvwEVnVx9aBqawnmiCNiDgp3gUdkDPTKN1N";

    fn keypair(index: u32) -> Keypair {
        derive_keypair(MNEMONIC, &DerivationPath::for_account(501, index)).unwrap()
    }

    fn pubkey_of(kp: &Keypair) -> Pubkey {
        Pubkey::from_slice(&kp.public_key_bytes()).unwrap()
    }

    #[test]
    fn test_compact_u16() {
        for (value, encoded) in [
            (0u16, vec![0x00]),
            (0x7f, vec![0x7f]),
            (0x80, vec![0x80, 0x01]),
            (0x3fff, vec![0xff, 0x7f]),
            (0x4000, vec![0x80, 0x80, 0x01]),
            (0xffff, vec![0xff, 0xff, 0x03]),
        ] {
            let mut out = Vec::new();
            encode_compact_u16(value, &mut out);
            assert_eq!(out, encoded);
            assert_eq!(decode_compact_u16(&out).unwrap(), (value, encoded.len()));
        }
        assert!(decode_compact_u16(&[0x80]).is_err());
    }

    #[test]
    fn test_compile_orders_and_dedupes_accounts() {
        let payer = Pubkey::new([1; 32]);
        let other_signer = Pubkey::new([2; 32]);
        let writable = Pubkey::new([3; 32]);
        let readonly = Pubkey::new([4; 32]);
        let program = Pubkey::new([5; 32]);

        let ix = Instruction {
            program_id: program,
            accounts: vec![
                AccountMeta::new_readonly(readonly, false),
                AccountMeta::new(writable, false),
                AccountMeta::new_readonly(other_signer, true),
                AccountMeta::new(payer, true),
                // 同一账户第二次出现时权限合并
                AccountMeta::new(readonly, false),
            ],
            data: vec![9],
        };

        let msg = Message::compile(&payer, &[ix], BLOCKHASH).unwrap();
        assert_eq!(
            msg.account_keys,
            vec![payer, other_signer, readonly, writable, program]
        );
        assert_eq!(msg.header.num_required_signatures, 2);
        assert_eq!(msg.header.num_readonly_signed_accounts, 1);
        assert_eq!(msg.header.num_readonly_unsigned_accounts, 1);
        assert_eq!(msg.instructions[0].program_id_index, 4);
        assert_eq!(msg.instructions[0].accounts, vec![2, 3, 1, 0, 2]);
    }

    #[test]
    fn test_sign_and_deserialize() {
        let kp = keypair(0);
        let payer = pubkey_of(&kp);
        let ix = Instruction {
            program_id: Pubkey::system_program(),
            accounts: vec![
                AccountMeta::new(payer, true),
                AccountMeta::new(Pubkey::new([8; 32]), false),
            ],
            data: vec![2, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0],
        };
        let msg = Message::compile(&payer, &[ix], BLOCKHASH).unwrap();
        let mut tx = Transaction::new(&msg).unwrap();
        assert!(tx.signature().is_none());

        tx.sign(&kp).unwrap();
        let sig = tx.signatures[0];
        let verifying = ed25519_dalek::VerifyingKey::from_bytes(payer.as_bytes()).unwrap();
        verifying
            .verify_strict(&tx.message, &ed25519_dalek::Signature::from_bytes(&sig))
            .unwrap();

        let bytes = tx.serialize().unwrap();
        assert_eq!(bytes[0], 1);
        assert_eq!(Transaction::deserialize(&bytes).unwrap(), tx);
        assert!(tx.signature().is_some());
    }

    #[test]
    fn test_partial_sign_fills_own_slot_only() {
        let fee_payer = keypair(0);
        let me = keypair(1);
        let ix = Instruction {
            program_id: Pubkey::new([6; 32]),
            accounts: vec![AccountMeta::new_readonly(pubkey_of(&me), true)],
            data: vec![],
        };
        let msg = Message::compile(&pubkey_of(&fee_payer), &[ix], BLOCKHASH).unwrap();

        // v0 前缀不影响签名位定位
        let mut v0 = vec![0x80];
        v0.extend(msg.serialize().unwrap());
        let mut tx = Transaction::from_message_bytes(v0).unwrap();
        assert_eq!(tx.signatures.len(), 2);

        tx.sign(&me).unwrap();
        assert_eq!(tx.signatures[0], [0u8; 64]);
        assert_ne!(tx.signatures[1], [0u8; 64]);

        let stranger = keypair(2);
        assert!(tx.sign(&stranger).unwrap_err().is_invalid_input());
    }
}
