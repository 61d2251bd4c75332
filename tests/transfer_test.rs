//! 转账与手续费集成测试
//!
//! 测试覆盖：估算与执行一致、memo 顺序、代币账户创建、Token-2022 扩展、确认轮询

mod common;

use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::json;

use common::*;
use ironcore_adapter::{
    domain::derivation::{derive_keypair, DerivationPath},
    error::AppErrorCode,
    infrastructure::solana_rpc::{SolanaRpc, TOKEN_2022_PROGRAM_ID, TOKEN_PROGRAM_ID},
    service::{
        account::TransferOptions,
        svm::{
            pubkey::{associated_token_address, Pubkey, ASSOCIATED_TOKEN_PROGRAM_ID, MEMO_PROGRAM_ID, SYSTEM_PROGRAM_ID},
            token_program::{fixtures, TransferFee},
            transfer_service::SvmTransferService,
        },
    },
};

const MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

fn owner() -> Pubkey {
    let keypair = derive_keypair(MNEMONIC, &DerivationPath::for_account(501, 0)).unwrap();
    Pubkey::from_slice(&keypair.public_key_bytes()).unwrap()
}

fn transfer_service(rpc: &Arc<MockRpc>) -> SvmTransferService {
    SvmTransferService::new(
        Arc::clone(rpc) as Arc<dyn SolanaRpc>,
        owner(),
        solana_mainnet().currency,
    )
    .with_confirm_policy(fast_confirm())
}

fn fee_mint(rpc: &MockRpc) {
    let fee = TransferFee {
        epoch: 0,
        maximum_fee: 1_000,
        transfer_fee_basis_points: 100,
    };
    let data = fixtures::mint_data(1_000_000_000, 6, &[fixtures::transfer_fee_config(fee, fee)]);
    rpc.set_account(MINT, TOKEN_2022_PROGRAM_ID, data);
}

#[cfg(test)]
mod native_tests {
    use super::*;

    #[tokio::test]
    async fn test_estimate_matches_submitted_message() {
        let harness = SvmHarness::plain();
        let account = harness.account(&solana_mainnet()).await;
        let amount = Decimal::new(15, 1);

        let fee = account
            .estimate_transfer_fee(RECIPIENT, "", amount, &TransferOptions::default())
            .await
            .unwrap();
        assert_eq!(fee, Some(5000));

        let result = account
            .create_transfer(RECIPIENT, "", amount, &TransferOptions::default())
            .await
            .unwrap();

        let sent = harness.rpc.sent_transactions();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].signature(), Some(result.tx_id));

        // 估算用的消息与上链的消息逐字节相同
        let estimated = harness.rpc.fee_requests.lock().unwrap()[0].clone();
        assert_eq!(estimated, sent[0].message_base64());
    }

    #[tokio::test]
    async fn test_rejected_send_carries_local_signature() {
        let harness = SvmHarness::plain();
        harness.rpc.reject_send.store(true, std::sync::atomic::Ordering::SeqCst);
        let account = harness.account(&solana_mainnet()).await;

        let err = account
            .create_transfer(RECIPIENT, "", Decimal::ONE, &TransferOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, AppErrorCode::TransactionRejected);

        // 签名在本地已确定：64 字节 ed25519 签名的 base58
        let tx_id = err.tx_id.expect("rejected transfer must carry its signature");
        assert_eq!(bs58::decode(&tx_id).into_vec().unwrap().len(), 64);
        assert!(harness.rpc.sent_transactions().is_empty());
    }

    #[tokio::test]
    async fn test_memo_precedes_transfer() {
        let rpc = MockRpc::new();
        let service = transfer_service(&rpc);

        let instructions = service
            .build_instructions(RECIPIENT, "SOL", Decimal::ONE, &TransferOptions::with_memo("invoice-42"))
            .await
            .unwrap();

        assert_eq!(instructions.len(), 2);
        assert_eq!(instructions[0].program_id.to_string(), MEMO_PROGRAM_ID);
        assert_eq!(instructions[0].data, b"invoice-42".to_vec());
        assert_eq!(instructions[1].program_id.to_string(), SYSTEM_PROGRAM_ID);
    }

    #[tokio::test]
    async fn test_invalid_destination_and_amount() {
        let harness = SvmHarness::plain();
        let account = harness.account(&solana_mainnet()).await;

        let err = account
            .create_transfer("not-an-address", "", Decimal::ONE, &TransferOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_invalid_input());

        let err = account
            .estimate_transfer_fee(RECIPIENT, "", Decimal::ZERO, &TransferOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_invalid_input());

        assert!(harness.rpc.sent_transactions().is_empty());
    }

    #[tokio::test]
    async fn test_expired_blockhash_fee_is_none() {
        let harness = SvmHarness::plain();
        *harness.rpc.fee.lock().unwrap() = None;
        let account = harness.account(&solana_mainnet()).await;

        let fee = account
            .estimate_transfer_fee(RECIPIENT, "", Decimal::ONE, &TransferOptions::default())
            .await
            .unwrap();
        assert_eq!(fee, None);

        let err = account
            .estimate_transactions_fee(&["AQID".to_string()])
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_multi_message_fee_sums() {
        let harness = SvmHarness::plain();
        let account = harness.account(&solana_mainnet()).await;

        let total = account
            .estimate_transactions_fee(&["AQID".to_string(), "BAUG".to_string(), "BwgJ".to_string()])
            .await
            .unwrap();
        assert_eq!(total, 15_000);
    }
}

#[cfg(test)]
mod token_tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_recipient_account_is_created() {
        let rpc = MockRpc::new();
        rpc.set_account(MINT, TOKEN_PROGRAM_ID, fixtures::mint_data(1_000_000, 6, &[]));
        let service = transfer_service(&rpc);

        let instructions = service
            .build_instructions(RECIPIENT, MINT, Decimal::new(25, 1), &TransferOptions::default())
            .await
            .unwrap();

        assert_eq!(instructions.len(), 2);
        assert_eq!(instructions[0].program_id.to_string(), ASSOCIATED_TOKEN_PROGRAM_ID);
        assert_eq!(instructions[1].program_id.to_string(), TOKEN_PROGRAM_ID);
        // TransferChecked: tag 12 + amount 2_500_000 + decimals
        assert_eq!(instructions[1].data[0], 12);
        assert_eq!(&instructions[1].data[1..9], &2_500_000u64.to_le_bytes());
        assert_eq!(instructions[1].data[9], 6);
    }

    #[tokio::test]
    async fn test_existing_recipient_account_not_recreated() {
        let rpc = MockRpc::new();
        rpc.set_account(MINT, TOKEN_PROGRAM_ID, fixtures::mint_data(1_000_000, 6, &[]));

        let mint: Pubkey = MINT.parse().unwrap();
        let recipient: Pubkey = RECIPIENT.parse().unwrap();
        let program: Pubkey = TOKEN_PROGRAM_ID.parse().unwrap();
        let ata = associated_token_address(&recipient, &mint, &program).unwrap();
        rpc.set_account(
            &ata.to_string(),
            TOKEN_PROGRAM_ID,
            fixtures::token_account_data(&mint, &recipient, 0, &[]),
        );

        let instructions = transfer_service(&rpc)
            .build_instructions(RECIPIENT, MINT, Decimal::ONE, &TransferOptions::with_memo("hi"))
            .await
            .unwrap();
        assert_eq!(instructions.len(), 2);
        assert_eq!(instructions[0].program_id.to_string(), MEMO_PROGRAM_ID);
        assert_eq!(instructions[1].program_id.to_string(), TOKEN_PROGRAM_ID);
    }

    #[tokio::test]
    async fn test_transfer_fee_extension() {
        let rpc = MockRpc::new();
        fee_mint(&rpc);
        let service = transfer_service(&rpc);

        // 1% 手续费，上限 1000
        let fee = service.calculate_transfer_fee(MINT, Decimal::new(5, 2)).await.unwrap();
        assert_eq!(fee, Some(500));
        let capped = service.calculate_transfer_fee(MINT, Decimal::from(10)).await.unwrap();
        assert_eq!(capped, Some(1_000));
        assert_eq!(service.calculate_transfer_fee("SOL", Decimal::ONE).await.unwrap(), None);

        let instructions = service
            .build_instructions(RECIPIENT, MINT, Decimal::new(5, 2), &TransferOptions::default())
            .await
            .unwrap();
        let transfer = instructions.last().unwrap();
        assert_eq!(transfer.program_id.to_string(), TOKEN_2022_PROGRAM_ID);
        // TransferCheckedWithFee：扩展指令 26 / 子指令 1
        assert_eq!(&transfer.data[..2], &[26, 1]);
    }

    #[tokio::test]
    async fn test_requires_memo_reads_recipient_extension() {
        let rpc = MockRpc::new();
        fee_mint(&rpc);

        let mint: Pubkey = MINT.parse().unwrap();
        let recipient: Pubkey = RECIPIENT.parse().unwrap();
        let program: Pubkey = TOKEN_2022_PROGRAM_ID.parse().unwrap();
        let ata = associated_token_address(&recipient, &mint, &program).unwrap();
        let service = transfer_service(&rpc);

        assert!(!service.requires_memo(RECIPIENT, MINT).await.unwrap());

        rpc.set_account(
            &ata.to_string(),
            TOKEN_2022_PROGRAM_ID,
            fixtures::token_account_data(&mint, &recipient, 0, &[fixtures::memo_transfer(true)]),
        );
        assert!(service.requires_memo(RECIPIENT, MINT).await.unwrap());
        assert!(!service.requires_memo(RECIPIENT, "").await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_mint_is_invalid_input() {
        let rpc = MockRpc::new();
        let err = transfer_service(&rpc)
            .build_instructions(RECIPIENT, MINT, Decimal::ONE, &TransferOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_invalid_input());
    }
}

#[cfg(test)]
mod confirm_tests {
    use super::*;

    #[tokio::test]
    async fn test_confirmed_status() {
        let harness = SvmHarness::plain();
        let account = harness.account(&solana_mainnet()).await;
        harness.rpc.set_status("sig-ok", Some("finalized"), None);

        account.confirm_transfer("sig-ok").await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_on_chain_carries_tx_id() {
        let harness = SvmHarness::plain();
        let account = harness.account(&solana_mainnet()).await;
        harness
            .rpc
            .set_status("sig-bad", Some("confirmed"), Some(json!({"InstructionError": [0, "Custom"]})));

        let err = account.confirm_transfer("sig-bad").await.unwrap_err();
        assert_eq!(err.code, AppErrorCode::TransactionRejected);
        assert_eq!(err.tx_id.as_deref(), Some("sig-bad"));
    }

    #[tokio::test]
    async fn test_unconfirmed_times_out() {
        let harness = SvmHarness::plain();
        let account = harness.account(&solana_mainnet()).await;
        harness.rpc.set_status("sig-slow", Some("processed"), None);

        let err = account.confirm_transfer("sig-slow").await.unwrap_err();
        assert_eq!(err.code, AppErrorCode::TransactionRejected);
        assert_eq!(err.tx_id.as_deref(), Some("sig-slow"));
    }

    #[tokio::test]
    async fn test_devnet_transfer_roundtrip() {
        let harness = SvmHarness::plain();
        let account = harness.account(&solana_devnet()).await;

        let result = account
            .create_transfer(RECIPIENT, "", Decimal::new(1, 3), &TransferOptions::default())
            .await
            .unwrap();
        harness.rpc.set_status(&result.tx_id, Some("confirmed"), None);
        account.confirm_transfer(&result.tx_id).await.unwrap();
    }
}
