//! SVM 转账构造、手续费与确认
//!
//! 执行与估算走同一个 `build_instructions`，估算出的费用即实际上链的费用。

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::{
    domain::{derivation::Keypair, network::NativeCurrency, token::to_base_units},
    error::{AppError, AppErrorCode, AppResult},
    infrastructure::solana_rpc::{SolanaRpc, TOKEN_2022_PROGRAM_ID, TOKEN_PROGRAM_ID},
    service::{
        account::{ConfirmPolicy, TransferOptions, TransferResult},
        svm::{
            pubkey::{associated_token_address, Pubkey},
            token_program::{self, Mint, TokenAccount, TransferAccounts},
            transaction::{Instruction, Message, Transaction},
        },
    },
};

/// 已解析的 mint：所属程序 + 账户数据
#[derive(Debug, Clone)]
pub struct MintInfo {
    pub address: Pubkey,
    pub program_id: Pubkey,
    pub mint: Mint,
}

impl MintInfo {
    pub fn is_token_2022(&self) -> bool {
        self.program_id.to_string() == TOKEN_2022_PROGRAM_ID
    }
}

pub struct SvmTransferService {
    rpc: Arc<dyn SolanaRpc>,
    owner: Pubkey,
    native: NativeCurrency,
    confirm: ConfirmPolicy,
}

impl SvmTransferService {
    pub fn new(rpc: Arc<dyn SolanaRpc>, owner: Pubkey, native: NativeCurrency) -> Self {
        Self {
            rpc,
            owner,
            native,
            confirm: ConfirmPolicy::default(),
        }
    }

    pub fn with_confirm_policy(mut self, confirm: ConfirmPolicy) -> Self {
        self.confirm = confirm;
        self
    }

    /// 原生币：网络币地址、wrapped SOL mint 或账户自身地址
    pub fn is_native(&self, token: &str) -> bool {
        token.is_empty()
            || token == self.native.address
            || token == self.owner.to_string()
            || token.eq_ignore_ascii_case(&self.native.symbol)
    }

    pub async fn load_mint(&self, mint: &str) -> AppResult<MintInfo> {
        let address: Pubkey = mint.parse()?;
        let account = self
            .rpc
            .get_account_info(mint)
            .await?
            .ok_or_else(|| AppError::invalid_input(format!("Unknown token mint: {}", mint)))?;

        if account.owner != TOKEN_PROGRAM_ID && account.owner != TOKEN_2022_PROGRAM_ID {
            return Err(AppError::invalid_input(format!(
                "{} is not owned by a token program",
                mint
            )));
        }

        Ok(MintInfo {
            address,
            program_id: account.owner.parse()?,
            mint: Mint::unpack(&account.data)?,
        })
    }

    /// 扩展手续费；mint 没有 TransferFeeConfig 时为 `None`
    pub async fn extension_fee(&self, info: &MintInfo, amount: u64) -> AppResult<Option<u64>> {
        match &info.mint.extensions.transfer_fee_config {
            Some(config) => {
                let epoch = self.rpc.get_epoch().await?;
                Ok(Some(config.calculate_fee(epoch, amount)))
            }
            None => Ok(None),
        }
    }

    pub async fn calculate_transfer_fee(&self, mint: &str, amount: Decimal) -> AppResult<Option<u64>> {
        if self.is_native(mint) {
            return Ok(None);
        }
        let info = self.load_mint(mint).await?;
        let units = to_base_units(amount, info.mint.decimals)?;
        self.extension_fee(&info, units).await
    }

    pub async fn build_instructions(
        &self,
        destination: &str,
        token: &str,
        amount: Decimal,
        opts: &TransferOptions,
    ) -> AppResult<Vec<Instruction>> {
        let recipient: Pubkey = destination.parse()?;
        if amount <= Decimal::ZERO {
            return Err(AppError::invalid_amount(format!(
                "Amount must be positive: {}",
                amount
            )));
        }

        let mut instructions = Vec::new();

        if self.is_native(token) {
            if let Some(text) = opts.memo.as_deref() {
                instructions.push(token_program::memo(text, &self.owner)?);
            }
            let lamports = to_base_units(amount, self.native.decimals)?;
            instructions.push(token_program::system_transfer(&self.owner, &recipient, lamports));
            return Ok(instructions);
        }

        let info = self.load_mint(token).await?;
        let units = to_base_units(amount, info.mint.decimals)?;
        let source = associated_token_address(&self.owner, &info.address, &info.program_id)?;
        let target = associated_token_address(&recipient, &info.address, &info.program_id)?;

        if self.rpc.get_account_info(&target.to_string()).await?.is_none() {
            tracing::debug!(recipient = %recipient, ata = %target, "recipient token account missing, creating");
            instructions.push(token_program::create_associated_token_account_idempotent(
                &self.owner,
                &target,
                &recipient,
                &info.address,
                &info.program_id,
            )?);
        }

        if let Some(text) = opts.memo.as_deref() {
            instructions.push(token_program::memo(text, &self.owner)?);
        }

        let accounts = TransferAccounts {
            token_program: &info.program_id,
            source: &source,
            mint: &info.address,
            destination: &target,
            owner: &self.owner,
        };
        let transfer = match self.extension_fee(&info, units).await? {
            Some(fee) => token_program::transfer_checked_with_fee(&accounts, units, info.mint.decimals, fee),
            None => token_program::transfer_checked(&accounts, units, info.mint.decimals),
        };
        instructions.push(transfer);

        Ok(instructions)
    }

    pub async fn compile(&self, instructions: &[Instruction]) -> AppResult<Message> {
        let blockhash = self.rpc.get_latest_blockhash().await?;
        Message::compile(&self.owner, instructions, &blockhash)
    }

    pub async fn estimate_transfer_fee(
        &self,
        destination: &str,
        token: &str,
        amount: Decimal,
        opts: &TransferOptions,
    ) -> AppResult<Option<u64>> {
        let outcome = async {
            let instructions = self.build_instructions(destination, token, amount, opts).await?;
            let message = self.compile(&instructions).await?;
            let encoded = Transaction::new(&message)?.message_base64();
            self.rpc.get_fee_for_message(&encoded).await
        }
        .await;

        match outcome {
            Ok(fee) => Ok(fee),
            Err(e) if e.is_transient() => {
                tracing::warn!(error = %e, "transfer fee estimate unavailable");
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
        let instructions = self.build_instructions(destination, token, amount, opts).await?;
        let tx_id = self.submit(keypair, &instructions).await?;
        tracing::info!(tx_id = %tx_id, destination, token, "transfer submitted");
        Ok(TransferResult { tx_id })
    }

    /// 编译、签名并发送；拒绝错误带上本地已知的交易 ID
    pub async fn submit(&self, keypair: &Keypair, instructions: &[Instruction]) -> AppResult<String> {
        let message = self.compile(instructions).await?;
        let mut tx = Transaction::new(&message)?;
        tx.sign(keypair)?;
        self.send(&tx).await
    }

    pub async fn send(&self, tx: &Transaction) -> AppResult<String> {
        let local_id = tx.signature();
        match self.rpc.send_transaction(&tx.to_base64()?).await {
            Ok(signature) => Ok(signature),
            Err(e) if e.code == AppErrorCode::TransactionRejected => match local_id {
                Some(id) => Err(e.with_tx_id(id)),
                None => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    /// 轮询直到 confirmed / finalized；超时视为“已提交未确认”
    pub async fn confirm_transfer(&self, tx_id: &str) -> AppResult<()> {
        for attempt in 0..self.confirm.attempts {
            match self.rpc.get_signature_status(tx_id).await {
                Ok(Some(status)) if status.err.is_some() => {
                    return Err(AppError::rejected(
                        format!(
                            "Transaction failed on chain: {}",
                            status.err.unwrap_or_default()
                        ),
                        Some(tx_id.to_string()),
                    ));
                }
                Ok(Some(status)) if status.is_confirmed() => {
                    tracing::info!(tx_id, attempt, "transaction confirmed");
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(tx_id, attempt, error = %e, "signature status unavailable");
                }
            }
            tokio::time::sleep(self.confirm.interval).await;
        }

        Err(AppError::rejected(
            "Transaction submitted but not confirmed",
            Some(tx_id.to_string()),
        ))
    }

    /// 收款方是否要求附带 memo：只看 Token-2022 账户的 MemoTransfer 扩展
    pub async fn requires_memo(&self, destination: &str, token: &str) -> AppResult<bool> {
        let recipient: Pubkey = destination.parse()?;
        if self.is_native(token) {
            return Ok(false);
        }
        let info = self.load_mint(token).await?;
        if !info.is_token_2022() {
            return Ok(false);
        }

        let ata = associated_token_address(&recipient, &info.address, &info.program_id)?;
        match self.rpc.get_account_info(&ata.to_string()).await? {
            Some(account) => Ok(TokenAccount::unpack(&account.data)?.require_incoming_memo),
            None => Ok(false),
        }
    }

    pub async fn estimate_transactions_fee(&self, messages: &[String]) -> AppResult<u64> {
        let fees = futures::future::try_join_all(
            messages
                .iter()
                .map(|m| self.rpc.get_fee_for_message(m)),
        )
        .await?;

        fees.into_iter().try_fold(0u64, |total, fee| {
            fee.map(|f| total.saturating_add(f))
                .ok_or_else(|| AppError::transient("Fee unavailable for an expired message"))
        })
    }
}
