//! NFT 模型、本地分页与按集合分组

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NftMint {
    pub address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NftCollectionRef {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub verified: bool,
}

/// `isOriginal` 为真表示母版（edition nonce 为 0）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NftEdition {
    pub is_original: bool,
}

/// 两个数据源（DAS 索引器 / 后端聚合）统一返回这个形状
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Nft {
    pub mint: NftMint,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub media: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub collection: Option<NftCollectionRef>,
    #[serde(default)]
    pub seller_fee_basis_points: u32,
    #[serde(default)]
    pub token_standard: Option<String>,
    #[serde(default)]
    pub compressed: bool,
    #[serde(default)]
    pub update_authority_address: Option<String>,
    #[serde(default)]
    pub edition: Option<NftEdition>,
    /// Token-2022 mint 的扩展列表
    #[serde(default)]
    pub extensions: Vec<serde_json::Value>,
    #[serde(default)]
    pub json: serde_json::Value,
    #[serde(default)]
    pub extras: serde_json::Value,
}

impl Nft {
    /// 集合标识：优先名称，其次集合地址
    pub fn collection_id(&self) -> Option<&str> {
        let c = self.collection.as_ref()?;
        c.name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or_else(|| c.key.as_deref().filter(|k| !k.is_empty()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NftCollectionGroup {
    pub collection: String,
    pub length: usize,
    pub items: Vec<Nft>,
    pub thumb: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NftListing {
    Group(NftCollectionGroup),
    Single(Nft),
}

/// 有集合的按集合聚合（数量降序），无集合的原样跟在后面
pub fn group_by_collection(nfts: Vec<Nft>) -> Vec<NftListing> {
    let mut groups: Vec<NftCollectionGroup> = Vec::new();
    let mut singles = Vec::new();

    for nft in nfts {
        match nft.collection_id().map(str::to_string) {
            Some(id) => match groups.iter_mut().find(|g| g.collection == id) {
                Some(group) => {
                    group.items.push(nft);
                    group.length += 1;
                }
                None => groups.push(NftCollectionGroup {
                    collection: id,
                    length: 1,
                    thumb: nft.media.clone(),
                    items: vec![nft],
                }),
            },
            None => singles.push(nft),
        }
    }

    // 稳定排序：同样数量的集合保持首次出现的顺序
    groups.sort_by(|a, b| b.length.cmp(&a.length));

    groups
        .into_iter()
        .map(NftListing::Group)
        .chain(singles.into_iter().map(NftListing::Single))
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 本地分页
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    pub has_more: bool,
    pub next_offset: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
}

pub type NftPage = Page<Nft>;

/// 在完整结果集上做 offset/limit 切片，limit 限制在 `1..=max_limit`
pub fn paginate<T>(items: Vec<T>, req: PageRequest, default_limit: usize, max_limit: usize) -> Page<T> {
    let limit = req.limit.unwrap_or(default_limit).clamp(1, max_limit.max(1));
    let offset = req.offset.unwrap_or(0);
    let total = items.len();

    let data: Vec<T> = items.into_iter().skip(offset).take(limit).collect();
    let has_more = offset + limit < total;

    Page {
        data,
        pagination: Pagination {
            total,
            limit,
            offset,
            has_more,
            next_offset: has_more.then_some(offset + limit),
        },
    }
}
