//! 去中心化存储链接规范化（IPFS / Arweave）

use std::sync::LazyLock;

use regex::Regex;

/// 已知失效的域名，命中后直接丢弃链接
pub const DEAD_DOMAINS: &[&str] = &[
    "shdw-drive.genesysgo.net",
    "chexbacca.com",
    "cdn.bridgesplit.com",
];

const IPFS_GATEWAY: &str = "https://ipfs.io/ipfs/";

static PINATA_PRIVATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://[^/]+\.mypinata\.cloud/ipfs/(.+)$").unwrap());

static BROKEN_GATEWAYS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^https?://(?:www\.)?cf-ipfs\.com/ipfs/(.+)$",
        r"^https?://(?:www\.)?cloudflare-ipfs\.com/ipfs/(.+)$",
        r"^https?://(?:www\.)?ipfs\.infura\.io/ipfs/(.+)$",
        r"^https?://gateway\.pinata\.cloud/ipfs/(.+)$",
        r"^https?://(?:www\.)?nftstorage\.link/ipfs/(.+)$",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static SUBDOMAIN_IPFS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://([a-zA-Z0-9]+)\.ipfs\.[^/]+/?(.*)$").unwrap());

fn strip_query(s: &str) -> &str {
    let s = s.split('?').next().unwrap_or(s);
    s.split('#').next().unwrap_or(s)
}

/// 把 IPFS/Arweave 链接改写为可用的 HTTP 网关
///
/// 空链接或失效域名返回 `None`，其它无需改写的链接原样返回。
pub fn normalize_ipfs_url(url: &str) -> Option<String> {
    let url = url.trim();
    if url.is_empty() {
        return None;
    }

    if DEAD_DOMAINS.iter().any(|d| url.contains(d)) {
        return None;
    }

    if let Some(rest) = url.strip_prefix("ipfs://") {
        return Some(format!("{}{}", IPFS_GATEWAY, rest));
    }

    if let Some(rest) = url.strip_prefix("ar://") {
        return Some(format!("https://arweave.net/{}", rest));
    }

    if url.contains("arweeve.net") {
        return Some(url.replace("arweeve.net", "arweave.net"));
    }

    if let Some(caps) = PINATA_PRIVATE.captures(url) {
        return Some(format!("{}{}", IPFS_GATEWAY, strip_query(&caps[1])));
    }

    for pattern in BROKEN_GATEWAYS.iter() {
        if let Some(caps) = pattern.captures(url) {
            return Some(format!("{}{}", IPFS_GATEWAY, strip_query(&caps[1])));
        }
    }

    if let Some(caps) = SUBDOMAIN_IPFS.captures(url) {
        let path = strip_query(&caps[2]);
        let path = if path.is_empty() {
            String::new()
        } else {
            format!("/{}", path)
        };
        return Some(format!("{}{}{}", IPFS_GATEWAY, &caps[1], path));
    }

    Some(url.to_string())
}

/// `Option` 版本，便于处理上游可能缺失的字段
pub fn normalize_opt(url: Option<&str>) -> Option<String> {
    url.and_then(normalize_ipfs_url)
}
