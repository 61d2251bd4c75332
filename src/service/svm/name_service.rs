//! SNS（`.sol` 域名）解析
//!
//! 正向：域名 → 名称账户 PDA → 注册表头里的 owner。
//! 反向：owner 的收藏域名 PDA → 名称账户 → 反查账户里的域名字符串。
//! 没有注册、没有设置收藏域名都返回 `None`，RPC 故障照常向上传。

use sha2::{Digest, Sha256};

use crate::{
    error::{AppError, AppResult},
    infrastructure::solana_rpc::SolanaRpc,
    service::svm::pubkey::Pubkey,
};

pub const NAME_PROGRAM_ID: &str = "namesLPneVptA9Z5rqUDD9tMTWEJwofgaYwp8cawRkX";
/// `.sol` 顶级域的名称账户
pub const SOL_TLD_ROOT: &str = "58PwtjSDuFHuUkYjH9BYnnQKHfwo9reZhC2zMJv9JPkx";
pub const REVERSE_LOOKUP_CLASS: &str = "33m47vH6Eav6jJL7mtJGHTo8C9UbSBbXX2UHtP4WHoKP";
/// 收藏域名存放在 name-offers 程序的 PDA 下
pub const NAME_OFFERS_PROGRAM_ID: &str = "85iDfUvr3HJyLM2zcq5BXSwXvAdmUAxbP8V4q3H95ZsW";

const HASH_PREFIX: &str = "SPL Name Service";
const FAVOURITE_SEED: &[u8] = b"favourite_domain";
const SOL_SUFFIX: &str = ".sol";
/// parent(32) + owner(32) + class(32)
pub const HEADER_LEN: usize = 96;

pub fn hashed_name(name: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(HASH_PREFIX.as_bytes());
    hasher.update(name.as_bytes());
    hasher.finalize().into()
}

/// 名称账户地址；`class` / `parent` 缺省时用 32 个零字节占位
pub fn name_account_key(
    hashed: &[u8; 32],
    class: Option<&Pubkey>,
    parent: Option<&Pubkey>,
) -> AppResult<Pubkey> {
    let program: Pubkey = NAME_PROGRAM_ID.parse()?;
    let zero = [0u8; 32];
    let class = class.map_or(&zero, Pubkey::as_bytes);
    let parent = parent.map_or(&zero, Pubkey::as_bytes);
    let (key, _) = Pubkey::find_program_address(
        &[hashed.as_slice(), class.as_slice(), parent.as_slice()],
        &program,
    )?;
    Ok(key)
}

/// `bonfida.sol` / `bonfida` / `dex.bonfida.sol` → 名称账户；其它顶级域报 `InvalidInput`
///
/// 子域名的哈希前面多一个 `\0`，父级是二级域的名称账户。
pub fn domain_key(domain: &str) -> AppResult<Pubkey> {
    let trimmed = domain.trim().to_lowercase();
    let (name, suffixed) = match trimmed.strip_suffix(SOL_SUFFIX) {
        Some(name) => (name, true),
        None => (trimmed.as_str(), false),
    };
    if name.is_empty() {
        return Err(AppError::invalid_input(format!("Invalid domain: {}", domain)));
    }

    let root: Pubkey = SOL_TLD_ROOT.parse()?;
    let labels: Vec<&str> = name.split('.').collect();
    match labels.as_slice() {
        [second] if !second.is_empty() => name_account_key(&hashed_name(second), None, Some(&root)),
        // 不带 `.sol` 的两段名视为其它顶级域
        [sub, second] if suffixed && !sub.is_empty() && !second.is_empty() => {
            let parent = name_account_key(&hashed_name(second), None, Some(&root))?;
            name_account_key(&hashed_name(&format!("\0{}", sub)), None, Some(&parent))
        }
        _ => Err(AppError::invalid_input(format!(
            "Only .sol domains are supported: {}",
            domain
        ))),
    }
}

/// 名称账户对应的反查账户
pub fn reverse_key(name_account: &Pubkey) -> AppResult<Pubkey> {
    let class: Pubkey = REVERSE_LOOKUP_CLASS.parse()?;
    name_account_key(&hashed_name(&name_account.to_string()), Some(&class), None)
}

pub fn favourite_domain_key(owner: &Pubkey) -> AppResult<Pubkey> {
    let program: Pubkey = NAME_OFFERS_PROGRAM_ID.parse()?;
    let (key, _) = Pubkey::find_program_address(&[FAVOURITE_SEED, owner.as_ref()], &program)?;
    Ok(key)
}

/// 名称账户的定长头部
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameRegistry {
    pub parent: Pubkey,
    pub owner: Pubkey,
    pub class: Pubkey,
}

impl NameRegistry {
    pub fn parse(data: &[u8]) -> AppResult<Self> {
        if data.len() < HEADER_LEN {
            return Err(AppError::internal(format!(
                "Name registry too short: {} bytes",
                data.len()
            )));
        }
        Ok(Self {
            parent: Pubkey::from_slice(&data[0..32])?,
            owner: Pubkey::from_slice(&data[32..64])?,
            class: Pubkey::from_slice(&data[64..96])?,
        })
    }
}

/// 反查账户头部之后是 borsh 字符串：u32 小端长度 + utf8
pub fn parse_reverse(data: &[u8]) -> AppResult<String> {
    let body = data.get(HEADER_LEN..).unwrap_or_default();
    let malformed = || AppError::internal("Malformed reverse lookup record");
    let len_bytes: [u8; 4] = body.get(..4).ok_or_else(malformed)?.try_into().map_err(|_| malformed())?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    let raw = body.get(4..4 + len).ok_or_else(malformed)?;
    String::from_utf8(raw.to_vec()).map_err(|_| malformed())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 链上查询
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SvmNameService<'a> {
    rpc: &'a dyn SolanaRpc,
}

impl<'a> SvmNameService<'a> {
    pub fn new(rpc: &'a dyn SolanaRpc) -> Self {
        Self { rpc }
    }

    async fn registry(&self, key: &Pubkey) -> AppResult<Option<(NameRegistry, Vec<u8>)>> {
        match self.rpc.get_account_info(&key.to_string()).await? {
            Some(info) => Ok(Some((NameRegistry::parse(&info.data)?, info.data))),
            None => Ok(None),
        }
    }

    /// 域名 → 持有者公钥
    pub async fn resolve(&self, domain: &str) -> AppResult<Option<Pubkey>> {
        let key = domain_key(domain)?;
        let owner = self.registry(&key).await?.map(|(registry, _)| registry.owner);
        tracing::debug!(domain, resolved = owner.is_some(), "sns domain resolved");
        Ok(owner)
    }

    async fn reverse_name(&self, name_account: &Pubkey) -> AppResult<Option<String>> {
        match self.registry(&reverse_key(name_account)?).await? {
            Some((_, data)) => parse_reverse(&data).map(Some),
            None => Ok(None),
        }
    }

    /// owner 设置的收藏域名（带 `.sol`）；收藏已转手视为没有
    pub async fn favourite_domain(&self, owner: &Pubkey) -> AppResult<Option<String>> {
        let favourite_key = favourite_domain_key(owner)?;
        let favourite = match self.rpc.get_account_info(&favourite_key.to_string()).await? {
            Some(info) => info,
            None => return Ok(None),
        };
        // tag(1) + name_account(32)
        let name_account = match favourite.data.get(1..33) {
            Some(bytes) => Pubkey::from_slice(bytes)?,
            None => return Err(AppError::internal("Malformed favourite domain record")),
        };

        let registry = match self.registry(&name_account).await? {
            Some((registry, _)) => registry,
            None => return Ok(None),
        };
        if registry.owner != *owner {
            tracing::debug!(owner = %owner, "stale favourite domain ignored");
            return Ok(None);
        }

        let name = match self.reverse_name(&name_account).await? {
            Some(name) => name,
            None => return Ok(None),
        };

        let root: Pubkey = SOL_TLD_ROOT.parse()?;
        if registry.parent == root {
            return Ok(Some(format!("{}{}", name, SOL_SUFFIX)));
        }
        // 子域名：反查记录里只有子标签，父级再反查一次
        let label = name.trim_start_matches('\0');
        Ok(self
            .reverse_name(&registry.parent)
            .await?
            .map(|parent| format!("{}.{}{}", label, parent, SOL_SUFFIX)))
    }
}
