//! Bitcoin P2WPKH 转账
//!
//! 选币（大额优先）→ 按 vsize 计费 → 找零高于粉尘线才保留 → BIP143 签名 → Esplora 广播。
//! 估费与建交易走同一个选币函数，两者给出的费用一致。

use std::{collections::HashMap, str::FromStr, sync::Arc};

use bitcoin::{
    absolute,
    address::NetworkUnchecked,
    consensus::encode::serialize_hex,
    hashes::Hash,
    secp256k1::{All, Message, Secp256k1, SecretKey},
    sighash::{EcdsaSighashType, SighashCache},
    transaction, Address, Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid,
    Witness,
};
use rust_decimal::Decimal;

use crate::{
    domain::{derivation::Keypair, network::NativeCurrency, token::to_base_units},
    error::{AppError, AppErrorCode, AppResult},
    infrastructure::esplora::{EsploraApi, Utxo},
    service::account::{ConfirmPolicy, TransferOptions, TransferResult},
};

/// P2WPKH 输出的粉尘线（satoshi）
pub const DUST_LIMIT: u64 = 546;

const TX_OVERHEAD_VBYTES: u64 = 11;
const INPUT_VBYTES: u64 = 68;
const OUTPUT_VBYTES: u64 = 31;

/// 默认按 3 块确认目标取费率
const FEE_TARGET: &str = "3";
const FALLBACK_FEE_RATE: f64 = 1.0;

pub fn estimate_vsize(inputs: usize, outputs: usize) -> u64 {
    TX_OVERHEAD_VBYTES + INPUT_VBYTES * inputs as u64 + OUTPUT_VBYTES * outputs as u64
}

/// 从 `/fee-estimates` 选费率：优先 3 块目标，否则取最快的目标，都没有时 1 sat/vB
pub fn pick_fee_rate(estimates: &HashMap<String, f64>) -> f64 {
    if let Some(rate) = estimates.get(FEE_TARGET) {
        return *rate;
    }
    estimates
        .iter()
        .filter_map(|(target, rate)| target.parse::<u32>().ok().map(|t| (t, *rate)))
        .min_by_key(|(target, _)| *target)
        .map(|(_, rate)| rate)
        .unwrap_or(FALLBACK_FEE_RATE)
}

fn fee_for(inputs: usize, outputs: usize, fee_rate: f64) -> u64 {
    (estimate_vsize(inputs, outputs) as f64 * fee_rate).ceil() as u64
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoinSelection {
    pub inputs: Vec<Utxo>,
    pub fee: u64,
    /// 0 表示没有找零输出
    pub change: u64,
}

impl CoinSelection {
    pub fn total_in(&self) -> u64 {
        self.inputs.iter().map(|u| u.value).sum()
    }
}

/// 大额优先选币
///
/// 每加入一个输入就检查一次：够付金额 + 两输出手续费且找零不低于粉尘线时保留找零；
/// 否则只要够付单输出手续费，就把余数全部并入手续费。
pub fn select_coins(utxos: &[Utxo], amount: u64, fee_rate: f64) -> AppResult<CoinSelection> {
    if amount < DUST_LIMIT {
        return Err(AppError::invalid_amount(format!(
            "Amount {} sat is below the dust limit",
            amount
        )));
    }

    let mut sorted: Vec<Utxo> = utxos.to_vec();
    sorted.sort_by(|a, b| b.value.cmp(&a.value));

    let overflow = || AppError::invalid_amount(format!("Amount {} sat is out of range", amount));

    let mut total: u64 = 0;
    for (i, utxo) in sorted.iter().enumerate() {
        total = total.saturating_add(utxo.value);
        let count = i + 1;

        let fee_with_change = fee_for(count, 2, fee_rate);
        let needed = amount.checked_add(fee_with_change).ok_or_else(overflow)?;
        if let Some(change) = total.checked_sub(needed) {
            if change >= DUST_LIMIT {
                return Ok(CoinSelection {
                    inputs: sorted[..count].to_vec(),
                    fee: fee_with_change,
                    change,
                });
            }
        }

        let fee_no_change = fee_for(count, 1, fee_rate);
        if total >= amount.checked_add(fee_no_change).ok_or_else(overflow)? {
            return Ok(CoinSelection {
                inputs: sorted[..count].to_vec(),
                fee: total - amount,
                change: 0,
            });
        }
    }

    Err(AppError::invalid_input("Insufficient funds"))
}

pub fn bitcoin_network(environment: crate::domain::network::NetworkEnvironment) -> bitcoin::Network {
    use crate::domain::network::NetworkEnvironment;
    match environment {
        NetworkEnvironment::Mainnet => bitcoin::Network::Bitcoin,
        NetworkEnvironment::Testnet => bitcoin::Network::Testnet,
        NetworkEnvironment::Devnet => bitcoin::Network::Regtest,
    }
}

/// 解析地址并要求与账户网络一致
pub fn parse_address(address: &str, network: bitcoin::Network) -> AppResult<Address> {
    Address::<NetworkUnchecked>::from_str(address)
        .map_err(|_| AppError::invalid_address(address))?
        .require_network(network)
        .map_err(|_| AppError::invalid_address(address))
}

/// 压缩公钥 → bech32 P2WPKH 地址
pub fn p2wpkh_address(public_key: &[u8], network: bitcoin::Network) -> AppResult<Address> {
    let pk = bitcoin::PublicKey::from_slice(public_key)
        .map_err(|e| AppError::internal(format!("Invalid secp256k1 public key: {}", e)))?;
    Address::p2wpkh(&pk, network)
        .map_err(|e| AppError::internal(format!("Cannot build P2WPKH address: {}", e)))
}

/// 组装并签名；返回 (txid, 原始交易 hex)
pub fn build_signed_transaction(
    secp: &Secp256k1<All>,
    keypair: &Keypair,
    from: &Address,
    to: &Address,
    amount: u64,
    selection: &CoinSelection,
) -> AppResult<(String, String)> {
    let secret = keypair.secret_bytes();
    let secret_key = SecretKey::from_slice(&secret[..])
        .map_err(|e| AppError::internal(format!("Invalid secp256k1 secret: {}", e)))?;
    let public_key = secret_key.public_key(secp);

    let input = selection
        .inputs
        .iter()
        .map(|utxo| {
            let txid = Txid::from_str(&utxo.txid)
                .map_err(|e| AppError::transient(format!("Malformed utxo txid {}: {}", utxo.txid, e)))?;
            Ok(TxIn {
                previous_output: OutPoint { txid, vout: utxo.vout },
                script_sig: ScriptBuf::new(),
                sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
                witness: Witness::default(),
            })
        })
        .collect::<AppResult<Vec<_>>>()?;

    let mut output = vec![TxOut {
        value: Amount::from_sat(amount),
        script_pubkey: to.script_pubkey(),
    }];
    if selection.change > 0 {
        output.push(TxOut {
            value: Amount::from_sat(selection.change),
            script_pubkey: from.script_pubkey(),
        });
    }

    let mut tx = Transaction {
        version: transaction::Version::TWO,
        lock_time: absolute::LockTime::ZERO,
        input,
        output,
    };

    let own_script = from.script_pubkey();
    let mut witnesses = Vec::with_capacity(selection.inputs.len());
    {
        let mut cache = SighashCache::new(&tx);
        for (i, utxo) in selection.inputs.iter().enumerate() {
            let sighash = cache
                .p2wpkh_signature_hash(
                    i,
                    &own_script,
                    Amount::from_sat(utxo.value),
                    EcdsaSighashType::All,
                )
                .map_err(|e| AppError::internal(format!("Sighash failed: {}", e)))?;
            let message = Message::from_digest(sighash.to_byte_array());
            let signature = bitcoin::ecdsa::Signature::sighash_all(secp.sign_ecdsa(&message, &secret_key));
            witnesses.push(Witness::p2wpkh(&signature, &public_key));
        }
    }
    for (txin, witness) in tx.input.iter_mut().zip(witnesses) {
        txin.witness = witness;
    }

    Ok((tx.txid().to_string(), serialize_hex(&tx)))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 转账服务
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct BitcoinTransferService {
    esplora: Arc<dyn EsploraApi>,
    secp: Arc<Secp256k1<All>>,
    network: bitcoin::Network,
    address: Address,
    currency: NativeCurrency,
    confirm: ConfirmPolicy,
}

impl BitcoinTransferService {
    pub fn new(
        esplora: Arc<dyn EsploraApi>,
        secp: Arc<Secp256k1<All>>,
        network: bitcoin::Network,
        address: Address,
        currency: NativeCurrency,
    ) -> Self {
        Self {
            esplora,
            secp,
            network,
            address,
            currency,
            confirm: ConfirmPolicy::default(),
        }
    }

    pub fn with_confirm_policy(mut self, confirm: ConfirmPolicy) -> Self {
        self.confirm = confirm;
        self
    }

    /// 只有原生币：空串、币种符号、列表地址或本账户地址
    fn check_token(&self, token: &str) -> AppResult<()> {
        let own = self.address.to_string();
        if token.is_empty()
            || token.eq_ignore_ascii_case(&self.currency.symbol)
            || token == self.currency.address
            || token == own
        {
            Ok(())
        } else {
            Err(AppError::invalid_input(format!("Unsupported token: {}", token)))
        }
    }

    async fn select(&self, destination: &str, token: &str, amount: Decimal) -> AppResult<(Address, u64, CoinSelection)> {
        let to = parse_address(destination, self.network)?;
        self.check_token(token)?;
        let sats = to_base_units(amount, self.currency.decimals)?;

        let own = self.address.to_string();
        let (utxos, estimates) = tokio::try_join!(self.esplora.utxos(&own), self.esplora.fee_estimates())?;
        let fee_rate = pick_fee_rate(&estimates);
        let selection = select_coins(&utxos, sats, fee_rate)?;
        tracing::debug!(
            inputs = selection.inputs.len(),
            fee = selection.fee,
            change = selection.change,
            fee_rate,
            "coins selected"
        );
        Ok((to, sats, selection))
    }

    pub async fn estimate_transfer_fee(
        &self,
        destination: &str,
        token: &str,
        amount: Decimal,
        _opts: &TransferOptions,
    ) -> AppResult<Option<u64>> {
        match self.select(destination, token, amount).await {
            Ok((_, _, selection)) => Ok(Some(selection.fee)),
            Err(e) if e.is_transient() => {
                tracing::warn!(error = %e, "fee estimate unavailable");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn create_transfer(
        &self,
        keypair: &Keypair,
        destination: &str,
        token: &str,
        amount: Decimal,
        opts: &TransferOptions,
    ) -> AppResult<TransferResult> {
        if opts.memo.is_some() {
            tracing::debug!("memo ignored on bitcoin transfer");
        }
        let (to, sats, selection) = self.select(destination, token, amount).await?;
        let (txid, raw) = build_signed_transaction(&self.secp, keypair, &self.address, &to, sats, &selection)?;

        // 广播被拒时也带上本地算出的 txid
        let broadcast = self.esplora.broadcast(&raw).await.map_err(|e| {
            if e.code == AppErrorCode::TransactionRejected {
                e.with_tx_id(txid.clone())
            } else {
                e
            }
        })?;
        if broadcast != txid {
            tracing::warn!(expected = %txid, returned = %broadcast, "broadcast returned a different txid");
        }
        tracing::info!(tx_id = %broadcast, amount = sats, fee = selection.fee, "bitcoin transfer submitted");
        Ok(TransferResult { tx_id: broadcast })
    }

    pub async fn confirm_transfer(&self, tx_id: &str) -> AppResult<()> {
        for attempt in 0..self.confirm.attempts {
            match self.esplora.tx_status(tx_id).await {
                Ok(status) if status.confirmed => {
                    tracing::info!(tx_id, attempt, block_height = ?status.block_height, "transaction confirmed");
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(tx_id, attempt, error = %e, "transaction status unavailable");
                }
            }
            tokio::time::sleep(self.confirm.interval).await;
        }

        Err(AppError::rejected(
            "Transaction submitted but not confirmed",
            Some(tx_id.to_string()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utxo(value: u64) -> Utxo {
        Utxo {
            txid: format!("{:064x}", value),
            vout: 0,
            value,
            status: Default::default(),
        }
    }

    #[test]
    fn test_vsize_formula() {
        assert_eq!(estimate_vsize(1, 2), 141);
        assert_eq!(estimate_vsize(2, 1), 178);
    }

    #[test]
    fn test_fee_rate_preference() {
        let mut estimates = HashMap::new();
        estimates.insert("1".to_string(), 20.0);
        estimates.insert("6".to_string(), 5.0);
        assert_eq!(pick_fee_rate(&estimates), 20.0);

        estimates.insert("3".to_string(), 12.5);
        assert_eq!(pick_fee_rate(&estimates), 12.5);

        assert_eq!(pick_fee_rate(&HashMap::new()), FALLBACK_FEE_RATE);
    }

    #[test]
    fn test_largest_first_with_change() {
        let utxos = vec![utxo(10_000), utxo(50_000), utxo(20_000)];
        let selection = select_coins(&utxos, 30_000, 2.0).unwrap();
        assert_eq!(selection.inputs.len(), 1);
        assert_eq!(selection.inputs[0].value, 50_000);
        assert_eq!(selection.fee, 282);
        assert_eq!(selection.change, 50_000 - 30_000 - 282);
    }

    #[test]
    fn test_dust_change_folds_into_fee() {
        // 1 输入 2 输出 = 141 vB；找零 10_300 - 10_000 - 141 = 159 < 546
        let selection = select_coins(&[utxo(10_300)], 10_000, 1.0).unwrap();
        assert_eq!(selection.change, 0);
        assert_eq!(selection.fee, 300);
    }

    #[test]
    fn test_adds_inputs_until_covered() {
        let utxos = vec![utxo(6_000), utxo(5_000), utxo(4_000)];
        let selection = select_coins(&utxos, 10_000, 1.0).unwrap();
        assert_eq!(selection.inputs.len(), 2);
        assert_eq!(selection.total_in(), 11_000);
        assert_eq!(selection.change, 11_000 - 10_000 - estimate_vsize(2, 2));
    }

    #[test]
    fn test_insufficient_and_dust_amount() {
        let err = select_coins(&[utxo(1_000)], 5_000, 1.0).unwrap_err();
        assert!(err.is_invalid_input());
        assert!(err.message.contains("Insufficient"));

        let err = select_coins(&[utxo(100_000)], 100, 1.0).unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn test_huge_amount_is_invalid_not_overflow() {
        let err = select_coins(&[utxo(100_000)], u64::MAX - 10, 2.0).unwrap_err();
        assert!(err.is_invalid_input());
        assert!(err.message.contains("out of range"));
    }

    #[test]
    fn test_parse_address_requires_network() {
        let mainnet = "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu";
        assert!(parse_address(mainnet, bitcoin::Network::Bitcoin).is_ok());
        assert!(parse_address(mainnet, bitcoin::Network::Testnet).is_err());
        assert!(parse_address("not-an-address", bitcoin::Network::Bitcoin).is_err());
    }
}
