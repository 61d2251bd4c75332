//! 测试辅助模块
//! 脚本化的 RPC / Esplora / 价格源 / 跨链桥实现，以及组装账户的工具函数

#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use base64::Engine;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use ironcore_adapter::{
    config::Config,
    domain::{
        capability::{capabilities_of, Capability},
        derivation::DerivationPath,
        network::{BlockchainFamily, Network, NetworkEnvironment},
        nft::{Nft, NftMint},
        quote::{Quote, QuoteAmount, SwapStatus, SwapStep},
        token::TokenMetadata,
    },
    error::{AppError, AppResult},
    infrastructure::{
        cache::ResilienceCache,
        esplora::{AddressStats, EsploraApi, EsploraConnector, TxStatus, TxoStats, Utxo},
        solana_rpc::{AccountInfo, ParsedTokenAccount, RpcConnector, SignatureStatus, SolanaRpc},
        upstream::UpstreamClient,
    },
    service::{
        account::{BlockchainAccount, ConfirmPolicy, TransferOptions, TransferResult},
        account_factory::AccountFactory,
        bitcoin::BitcoinServices,
        bridge_service::{BridgeApi, BridgeExchange, BridgeToken, BridgeTransaction},
        price_service::{CoinPrice, PriceFeed},
        svm::{
            balance_service::{MetadataContext, MetadataSource},
            nft_service::{NftQuery, NftSource},
            transaction::Transaction,
            SvmFlavor, SvmServices,
        },
    },
};

pub const MNEMONIC: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

/// 全零 32 字节的 base58，作为固定的 blockhash
pub const BLOCKHASH: &str = "11111111111111111111111111111111";

pub const RECIPIENT: &str = "DYw8jCTfwHNRJhhmFcbXvVDTqWMEVFBX6ZKUmG5CNSKK";

pub fn fast_confirm() -> ConfirmPolicy {
    ConfirmPolicy {
        attempts: 3,
        interval: Duration::from_millis(1),
    }
}

pub fn solana_mainnet() -> Network {
    Network::solana("solana-mainnet", NetworkEnvironment::Mainnet, "http://rpc.test")
}

pub fn solana_devnet() -> Network {
    Network::solana("solana-devnet", NetworkEnvironment::Devnet, "http://rpc.test")
}

pub fn eclipse_mainnet() -> Network {
    Network::eclipse("eclipse-mainnet", NetworkEnvironment::Mainnet, "http://rpc.test")
}

pub fn bitcoin_mainnet() -> Network {
    Network::bitcoin("bitcoin-mainnet", NetworkEnvironment::Mainnet, "http://esplora.test")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SVM RPC
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct MockRpc {
    pub balance: Mutex<u64>,
    /// program id → 代币账户
    pub token_accounts: Mutex<HashMap<String, Vec<ParsedTokenAccount>>>,
    pub accounts: Mutex<HashMap<String, AccountInfo>>,
    pub statuses: Mutex<HashMap<String, SignatureStatus>>,
    pub assets: Mutex<Vec<Value>>,
    pub assets_fail: AtomicBool,
    pub balance_fail: AtomicBool,
    pub token_accounts_fail: AtomicBool,
    pub fee: Mutex<Option<u64>>,
    pub epoch: Mutex<u64>,
    pub sent: Mutex<Vec<String>>,
    pub fee_requests: Mutex<Vec<String>>,
    pub balance_calls: AtomicUsize,
    pub asset_calls: AtomicUsize,
    pub reject_send: AtomicBool,
}

impl MockRpc {
    pub fn new() -> Arc<Self> {
        let rpc = Self::default();
        *rpc.fee.lock().unwrap() = Some(5000);
        Arc::new(rpc)
    }

    pub fn set_balance(&self, lamports: u64) {
        *self.balance.lock().unwrap() = lamports;
    }

    pub fn add_token_account(&self, program_id: &str, account: ParsedTokenAccount) {
        self.token_accounts
            .lock()
            .unwrap()
            .entry(program_id.to_string())
            .or_default()
            .push(account);
    }

    pub fn set_account(&self, address: &str, owner: &str, data: Vec<u8>) {
        self.accounts.lock().unwrap().insert(
            address.to_string(),
            AccountInfo {
                lamports: 2_039_280,
                owner: owner.to_string(),
                data,
                executable: false,
            },
        );
    }

    pub fn set_status(&self, signature: &str, status: Option<&str>, err: Option<Value>) {
        self.statuses.lock().unwrap().insert(
            signature.to_string(),
            SignatureStatus {
                confirmation_status: status.map(str::to_string),
                err,
            },
        );
    }

    pub fn sent_transactions(&self) -> Vec<Transaction> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|b64| {
                let bytes = base64::engine::general_purpose::STANDARD.decode(b64).unwrap();
                Transaction::deserialize(&bytes).unwrap()
            })
            .collect()
    }
}

#[async_trait]
impl SolanaRpc for MockRpc {
    fn endpoint(&self) -> &str {
        "http://rpc.test"
    }

    async fn get_balance(&self, _address: &str) -> AppResult<u64> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        if self.balance_fail.load(Ordering::SeqCst) {
            return Err(AppError::transient("rpc timeout"));
        }
        Ok(*self.balance.lock().unwrap())
    }

    async fn get_token_accounts_by_owner(
        &self,
        _owner: &str,
        program_id: &str,
    ) -> AppResult<Vec<ParsedTokenAccount>> {
        if self.token_accounts_fail.load(Ordering::SeqCst) {
            return Err(AppError::transient("getTokenAccountsByOwner timed out"));
        }
        Ok(self
            .token_accounts
            .lock()
            .unwrap()
            .get(program_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_account_info(&self, address: &str) -> AppResult<Option<AccountInfo>> {
        Ok(self.accounts.lock().unwrap().get(address).cloned())
    }

    async fn get_latest_blockhash(&self) -> AppResult<String> {
        Ok(BLOCKHASH.to_string())
    }

    async fn send_transaction(&self, tx_base64: &str) -> AppResult<String> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(tx_base64)
            .map_err(|e| AppError::invalid_input(e.to_string()))?;
        let tx = Transaction::deserialize(&bytes)?;
        if self.reject_send.load(Ordering::SeqCst) {
            return Err(AppError::rejected(
                "Transaction simulation failed: insufficient funds for rent",
                None,
            ));
        }
        self.sent.lock().unwrap().push(tx_base64.to_string());
        tx.signature()
            .ok_or_else(|| AppError::rejected("unsigned transaction", None))
    }

    async fn get_signature_status(&self, signature: &str) -> AppResult<Option<SignatureStatus>> {
        Ok(self.statuses.lock().unwrap().get(signature).cloned())
    }

    async fn get_fee_for_message(&self, message_base64: &str) -> AppResult<Option<u64>> {
        self.fee_requests
            .lock()
            .unwrap()
            .push(message_base64.to_string());
        Ok(*self.fee.lock().unwrap())
    }

    async fn get_epoch(&self) -> AppResult<u64> {
        Ok(*self.epoch.lock().unwrap())
    }

    async fn request_airdrop(&self, _address: &str, _lamports: u64) -> AppResult<String> {
        Ok("airdrop-signature".to_string())
    }

    async fn get_assets_by_owner(&self, _owner: &str, _limit: usize) -> AppResult<Vec<Value>> {
        self.asset_calls.fetch_add(1, Ordering::SeqCst);
        if self.assets_fail.load(Ordering::SeqCst) {
            return Err(AppError::transient("indexer unavailable"));
        }
        Ok(self.assets.lock().unwrap().clone())
    }
}

pub struct MockConnector {
    pub rpc: Arc<MockRpc>,
    pub connects: AtomicUsize,
}

impl MockConnector {
    pub fn new(rpc: Arc<MockRpc>) -> Arc<Self> {
        Arc::new(Self {
            rpc,
            connects: AtomicUsize::new(0),
        })
    }
}

impl RpcConnector for MockConnector {
    fn connect(&self, _network: &Network) -> Arc<dyn SolanaRpc> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Arc::clone(&self.rpc) as Arc<dyn SolanaRpc>
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Esplora
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct FakeEsplora {
    pub funded: Mutex<u64>,
    pub spent: Mutex<u64>,
    pub mempool_funded: Mutex<u64>,
    pub utxos: Mutex<Vec<Utxo>>,
    pub fees: Mutex<HashMap<String, f64>>,
    pub fees_fail: AtomicBool,
    pub confirmed: AtomicBool,
    pub broadcasts: Mutex<Vec<String>>,
    /// 置位后节点拒绝广播，原始交易记到 `rejected`
    pub reject_broadcast: AtomicBool,
    pub rejected: Mutex<Vec<String>>,
}

impl FakeEsplora {
    pub fn new() -> Arc<Self> {
        let esplora = Self::default();
        esplora.fees.lock().unwrap().insert("3".to_string(), 2.0);
        esplora.confirmed.store(true, Ordering::SeqCst);
        Arc::new(esplora)
    }

    pub fn add_utxo(&self, byte: u8, vout: u32, value: u64) {
        self.utxos.lock().unwrap().push(Utxo {
            txid: hex::encode([byte; 32]),
            vout,
            value,
            status: TxStatus {
                confirmed: true,
                block_height: Some(800_000),
            },
        });
    }

    pub fn broadcasts(&self) -> Vec<bitcoin::Transaction> {
        decode_all(&self.broadcasts.lock().unwrap())
    }

    pub fn rejected(&self) -> Vec<bitcoin::Transaction> {
        decode_all(&self.rejected.lock().unwrap())
    }
}

fn decode_all(raws: &[String]) -> Vec<bitcoin::Transaction> {
    raws.iter()
        .map(|raw| bitcoin::consensus::deserialize(&hex::decode(raw).unwrap()).unwrap())
        .collect()
}

#[async_trait]
impl EsploraApi for FakeEsplora {
    async fn address_stats(&self, _address: &str) -> AppResult<AddressStats> {
        Ok(AddressStats {
            chain_stats: TxoStats {
                funded_txo_sum: *self.funded.lock().unwrap(),
                spent_txo_sum: *self.spent.lock().unwrap(),
            },
            mempool_stats: TxoStats {
                funded_txo_sum: *self.mempool_funded.lock().unwrap(),
                spent_txo_sum: 0,
            },
        })
    }

    async fn utxos(&self, _address: &str) -> AppResult<Vec<Utxo>> {
        Ok(self.utxos.lock().unwrap().clone())
    }

    async fn fee_estimates(&self) -> AppResult<HashMap<String, f64>> {
        if self.fees_fail.load(Ordering::SeqCst) {
            return Err(AppError::transient("esplora 503"));
        }
        Ok(self.fees.lock().unwrap().clone())
    }

    async fn broadcast(&self, tx_hex: &str) -> AppResult<String> {
        let bytes = hex::decode(tx_hex).map_err(|e| AppError::invalid_input(e.to_string()))?;
        let tx: bitcoin::Transaction = bitcoin::consensus::deserialize(&bytes)
            .map_err(|e| AppError::rejected(e.to_string(), None))?;
        if self.reject_broadcast.load(Ordering::SeqCst) {
            self.rejected.lock().unwrap().push(tx_hex.to_string());
            return Err(AppError::rejected(
                "sendrawtransaction RPC error: min relay fee not met",
                None,
            ));
        }
        self.broadcasts.lock().unwrap().push(tx_hex.to_string());
        Ok(tx.txid().to_string())
    }

    async fn tx_status(&self, _txid: &str) -> AppResult<TxStatus> {
        Ok(TxStatus {
            confirmed: self.confirmed.load(Ordering::SeqCst),
            block_height: None,
        })
    }
}

pub struct FakeEsploraConnector {
    pub esplora: Arc<FakeEsplora>,
}

impl EsploraConnector for FakeEsploraConnector {
    fn connect(&self, _network: &Network) -> Arc<dyn EsploraApi> {
        Arc::clone(&self.esplora) as Arc<dyn EsploraApi>
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 价格 / 元数据 / NFT 来源
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct FakePrices {
    pub prices: Vec<CoinPrice>,
    pub fail: bool,
}

impl FakePrices {
    pub fn with(prices: Vec<CoinPrice>) -> Arc<Self> {
        Arc::new(Self { prices, fail: false })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            prices: vec![],
            fail: true,
        })
    }
}

pub fn price(address: &str, usd: f64, change: Option<f64>) -> CoinPrice {
    CoinPrice {
        id: None,
        address: Some(address.to_string()),
        symbol: None,
        usd_price: usd,
        perc_24h_change: change,
    }
}

#[async_trait]
impl PriceFeed for FakePrices {
    async fn prices(&self, _platform: &str) -> AppResult<Vec<CoinPrice>> {
        if self.fail {
            return Err(AppError::transient("price feed 502"));
        }
        Ok(self.prices.clone())
    }
}

pub struct StaticMetadata {
    pub label: &'static str,
    pub entries: HashMap<String, TokenMetadata>,
    pub fail: bool,
    pub calls: AtomicUsize,
    pub asked: Mutex<Vec<Vec<String>>>,
}

impl StaticMetadata {
    pub fn new(label: &'static str, entries: Vec<(&str, &str, &str)>) -> Arc<Self> {
        Arc::new(Self {
            label,
            entries: entries
                .into_iter()
                .map(|(mint, symbol, name)| {
                    (
                        mint.to_string(),
                        TokenMetadata {
                            address: mint.to_string(),
                            symbol: Some(symbol.to_string()),
                            name: Some(name.to_string()),
                            ..Default::default()
                        },
                    )
                })
                .collect(),
            fail: false,
            calls: AtomicUsize::new(0),
            asked: Mutex::new(vec![]),
        })
    }

    pub fn failing(label: &'static str) -> Arc<Self> {
        Arc::new(Self {
            label,
            entries: HashMap::new(),
            fail: true,
            calls: AtomicUsize::new(0),
            asked: Mutex::new(vec![]),
        })
    }
}

#[async_trait]
impl MetadataSource for StaticMetadata {
    fn name(&self) -> &'static str {
        self.label
    }

    async fn resolve(
        &self,
        _ctx: &MetadataContext<'_>,
        mints: &[String],
    ) -> AppResult<HashMap<String, TokenMetadata>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.asked.lock().unwrap().push(mints.to_vec());
        if self.fail {
            return Err(AppError::transient("metadata backend down"));
        }
        Ok(mints
            .iter()
            .filter_map(|m| self.entries.get(m).map(|meta| (m.clone(), meta.clone())))
            .collect())
    }
}

pub fn nft(mint: &str, collection: Option<&str>) -> Nft {
    Nft {
        mint: NftMint {
            address: mint.to_string(),
        },
        owner: None,
        name: format!("NFT {}", mint),
        symbol: String::new(),
        uri: String::new(),
        media: None,
        description: String::new(),
        collection: collection.map(|name| ironcore_adapter::domain::nft::NftCollectionRef {
            key: None,
            name: Some(name.to_string()),
            verified: true,
        }),
        seller_fee_basis_points: 0,
        token_standard: None,
        compressed: false,
        update_authority_address: None,
        edition: None,
        extensions: Vec::new(),
        json: json!({}),
        extras: json!({}),
    }
}

pub struct StaticNfts {
    pub label: &'static str,
    pub nfts: Vec<Nft>,
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl StaticNfts {
    pub fn ok(label: &'static str, nfts: Vec<Nft>) -> Arc<Self> {
        Arc::new(Self {
            label,
            nfts,
            fail: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(label: &'static str) -> Arc<Self> {
        Arc::new(Self {
            label,
            nfts: vec![],
            fail: true,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NftSource for StaticNfts {
    fn name(&self) -> &'static str {
        self.label
    }

    async fn fetch_all(&self, _query: &NftQuery<'_>) -> AppResult<Vec<Nft>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AppError::transient(format!("{} unavailable", self.label)));
        }
        Ok(self.nfts.clone())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 账户组装
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SvmHarness {
    pub rpc: Arc<MockRpc>,
    pub connector: Arc<MockConnector>,
    pub cache: Arc<ResilienceCache>,
    pub factory: AccountFactory,
}

impl SvmHarness {
    /// `configure` 用来替换元数据 / NFT 来源
    pub fn new(
        prices: Arc<dyn PriceFeed>,
        configure: impl FnOnce(SvmServices) -> SvmServices,
    ) -> Self {
        let rpc = MockRpc::new();
        let connector = MockConnector::new(Arc::clone(&rpc));
        let cache = Arc::new(ResilienceCache::new());
        let config = Arc::new(Config::default());

        let services = SvmServices::new(
            Arc::clone(&config),
            Arc::clone(&cache),
            UpstreamClient::default(),
            Arc::clone(&connector) as Arc<dyn RpcConnector>,
            Arc::clone(&prices),
        )
        .with_metadata_sources(SvmFlavor::Solana, vec![])
        .with_metadata_sources(SvmFlavor::Eclipse, vec![])
        .with_nft_sources(SvmFlavor::Solana, vec![])
        .with_nft_sources(SvmFlavor::Eclipse, vec![])
        .with_confirm_policy(fast_confirm());

        let factory = AccountFactory::new(
            config,
            Arc::clone(&cache),
            UpstreamClient::default(),
            Arc::clone(&connector) as Arc<dyn RpcConnector>,
            Arc::new(FakeEsploraConnector {
                esplora: FakeEsplora::new(),
            }),
            prices,
        )
        .with_svm_services(Arc::new(configure(services)));

        Self {
            rpc,
            connector,
            cache,
            factory,
        }
    }

    pub fn plain() -> Self {
        Self::new(FakePrices::with(vec![]), |s| s)
    }

    pub async fn account(&self, network: &Network) -> Arc<dyn BlockchainAccount> {
        self.factory.create_account(network, MNEMONIC, 0).await.unwrap()
    }
}

pub struct BitcoinHarness {
    pub esplora: Arc<FakeEsplora>,
    pub cache: Arc<ResilienceCache>,
    pub factory: AccountFactory,
}

impl BitcoinHarness {
    pub fn new(prices: Arc<dyn PriceFeed>) -> Self {
        let esplora = FakeEsplora::new();
        let cache = Arc::new(ResilienceCache::new());
        let connector: Arc<dyn EsploraConnector> = Arc::new(FakeEsploraConnector {
            esplora: Arc::clone(&esplora),
        });
        let services = BitcoinServices::new(Arc::clone(&connector), Arc::clone(&prices), Arc::clone(&cache))
            .with_confirm_policy(fast_confirm());

        let factory = AccountFactory::new(
            Arc::new(Config::default()),
            Arc::clone(&cache),
            UpstreamClient::default(),
            MockConnector::new(MockRpc::new()),
            connector,
            prices,
        )
        .with_bitcoin_services(Arc::new(services));

        Self { esplora, cache, factory }
    }

    pub async fn account(&self) -> Arc<dyn BlockchainAccount> {
        self.factory
            .create_account(&bitcoin_mainnet(), MNEMONIC, 0)
            .await
            .unwrap()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 兑换 / 跨链桥用的账户替身
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn quote(out_amount: f64, expires_at: Option<i64>) -> Quote {
    Quote {
        input: QuoteAmount {
            amount: 1.0,
            decimals: 9,
            symbol: "SOL".to_string(),
        },
        output: QuoteAmount {
            amount: out_amount,
            decimals: 6,
            symbol: "USDC".to_string(),
        },
        fee: None,
        custom: json!({ "transaction": "AQID", "requestId": "req-1" }),
        expires_at,
    }
}

pub struct FakeAccount {
    pub network: Network,
    pub path: DerivationPath,
    pub quotes: Mutex<VecDeque<Quote>>,
    pub quote_calls: AtomicUsize,
    pub swap_status: SwapStatus,
    pub swap_fail: bool,
    pub submitted: Mutex<Vec<Quote>>,
    pub transfers: Mutex<Vec<(String, String, Decimal)>>,
    pub confirm_ok: bool,
}

impl FakeAccount {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            path: DerivationPath::for_account(501, 0),
            quotes: Mutex::new(VecDeque::new()),
            quote_calls: AtomicUsize::new(0),
            swap_status: SwapStatus::Success,
            swap_fail: false,
            submitted: Mutex::new(vec![]),
            transfers: Mutex::new(vec![]),
            confirm_ok: true,
        }
    }

    pub fn with_quotes(self, quotes: Vec<Quote>) -> Self {
        *self.quotes.lock().unwrap() = quotes.into();
        self
    }

    pub fn quote_calls(&self) -> usize {
        self.quote_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlockchainAccount for FakeAccount {
    fn network(&self) -> &Network {
        &self.network
    }

    fn index(&self) -> u32 {
        0
    }

    fn path(&self) -> &DerivationPath {
        &self.path
    }

    fn public_key(&self) -> String {
        "FakeOwner1111111111111111111111111111111111".to_string()
    }

    fn receive_address(&self) -> String {
        self.public_key()
    }

    fn capabilities(&self) -> &'static [Capability] {
        capabilities_of(BlockchainFamily::Solana)
    }

    async fn create_transfer(
        &self,
        destination: &str,
        token: &str,
        amount: Decimal,
        _opts: &TransferOptions,
    ) -> AppResult<TransferResult> {
        let mut transfers = self.transfers.lock().unwrap();
        transfers.push((destination.to_string(), token.to_string(), amount));
        Ok(TransferResult {
            tx_id: format!("deposit-{}", transfers.len()),
        })
    }

    async fn confirm_transfer(&self, tx_id: &str) -> AppResult<()> {
        if self.confirm_ok {
            Ok(())
        } else {
            Err(AppError::rejected(
                "Transaction submitted but not confirmed",
                Some(tx_id.to_string()),
            ))
        }
    }

    async fn get_best_swap_quote(
        &self,
        _input_mint: &str,
        _output_mint: &str,
        _amount: Decimal,
        _slippage_bps: u16,
    ) -> AppResult<Quote> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        self.quotes
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AppError::transient("no route"))
    }

    async fn create_swap_transaction(&self, quote: &Quote) -> AppResult<Vec<SwapStep>> {
        if self.swap_fail {
            return Err(AppError::rejected("simulation failed", None));
        }
        self.submitted.lock().unwrap().push(quote.clone());
        Ok(vec![SwapStep {
            id: Some("swap-signature".to_string()),
            name: "swap".to_string(),
            status: self.swap_status,
            error: None,
        }])
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 跨链桥
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn bridge_token(symbol: &str, address: Option<&str>) -> BridgeToken {
    BridgeToken {
        symbol: symbol.to_string(),
        name: symbol.to_uppercase(),
        blockchain: None,
        network: None,
        address: address.map(str::to_string),
        decimals: None,
        logo: None,
        validation_address: None,
    }
}

pub struct FakeBridgeApi {
    pub minimal: Option<Decimal>,
    pub exchange_fail: bool,
    pub exchanges: AtomicUsize,
    pub supported_calls: AtomicUsize,
    /// exchange id → 提供方状态
    pub statuses: Mutex<HashMap<String, String>>,
}

impl FakeBridgeApi {
    pub fn new(minimal: Option<Decimal>) -> Self {
        Self {
            minimal,
            exchange_fail: false,
            exchanges: AtomicUsize::new(0),
            supported_calls: AtomicUsize::new(0),
            statuses: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_status(&self, exchange_id: &str, status: &str) {
        self.statuses
            .lock()
            .unwrap()
            .insert(exchange_id.to_string(), status.to_string());
    }
}

#[async_trait]
impl BridgeApi for FakeBridgeApi {
    async fn supported(&self) -> AppResult<Vec<BridgeToken>> {
        self.supported_calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![bridge_token("sol", None), bridge_token("btc", None)])
    }

    async fn available(&self, _symbol: &str) -> AppResult<Vec<BridgeToken>> {
        Ok(vec![bridge_token("btc", None)])
    }

    async fn featured(&self, _symbol: &str) -> AppResult<Vec<BridgeToken>> {
        Ok(vec![])
    }

    async fn estimate(&self, _symbol_in: &str, _symbol_out: &str, amount: Decimal) -> AppResult<Option<Decimal>> {
        Ok(Some(amount / Decimal::from(2)))
    }

    async fn minimal(&self, _symbol_in: &str, _symbol_out: &str) -> AppResult<Option<Decimal>> {
        Ok(self.minimal)
    }

    async fn create_exchange(
        &self,
        _symbol_in: &str,
        _symbol_out: &str,
        amount: Decimal,
        address_to: &str,
    ) -> AppResult<BridgeExchange> {
        if self.exchange_fail {
            return Err(AppError::transient("bridge provider 500"));
        }
        let n = self.exchanges.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(BridgeExchange {
            id: format!("ex-{}", n),
            address_from: "DepositAddr111111111111111111111111111111111".to_string(),
            expected_amount: amount,
            address_to: Some(address_to.to_string()),
            amount_to: None,
        })
    }

    async fn transaction(&self, id: &str) -> AppResult<BridgeTransaction> {
        let status = self
            .statuses
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("exchange {}", id)))?;
        Ok(BridgeTransaction {
            id: id.to_string(),
            status,
            amount_to: None,
            tx_to: None,
        })
    }
}
