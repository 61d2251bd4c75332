//! SVM 兑换：后端下单 + 本地签名 + 后端执行

use std::sync::Arc;

use base64::Engine;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    domain::{
        derivation::Keypair,
        network::{Network, SOL_ADDRESS},
        quote::{Quote, SwapStatus, SwapStep},
        token::to_base_units,
    },
    error::{AppError, AppResult},
    infrastructure::upstream::UpstreamClient,
    service::svm::{
        token_list_service::TokenListService, transaction::Transaction,
        transfer_service::SvmTransferService,
    },
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteRequest<'a> {
    signed_transaction: String,
    request_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ExecuteResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    signature: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

pub struct SvmSwapService {
    upstream: UpstreamClient,
    api_url: String,
    network: Network,
    owner: String,
    token_list: Arc<TokenListService>,
}

impl SvmSwapService {
    pub fn new(
        upstream: UpstreamClient,
        api_url: &str,
        network: Network,
        owner: String,
        token_list: Arc<TokenListService>,
    ) -> Self {
        Self {
            upstream,
            api_url: api_url.trim_end_matches('/').to_string(),
            network,
            owner,
            token_list,
        }
    }

    /// 账户自身地址代表原生 SOL
    fn mint_for(&self, address: &str) -> String {
        if address == self.owner {
            SOL_ADDRESS.to_string()
        } else {
            address.to_string()
        }
    }

    pub async fn quote(
        &self,
        input: &str,
        output: &str,
        amount: Decimal,
        slippage_bps: u16,
    ) -> AppResult<Quote> {
        let input_mint = self.mint_for(input);
        let output_mint = self.mint_for(output);

        let token = self
            .token_list
            .find(&self.network.id, &input_mint)
            .await?
            .ok_or_else(|| AppError::invalid_input(format!("Unknown token: {}", input_mint)))?;
        let units = to_base_units(amount, token.decimals)?;

        let url = format!("{}/v1/{}/ft/swap/order", self.api_url, self.network.id);
        let quote: Quote = self
            .upstream
            .get_json(
                &url,
                &[
                    ("inputMint", input_mint.clone()),
                    ("outputMint", output_mint.clone()),
                    ("amount", units.to_string()),
                    ("slippageBps", slippage_bps.to_string()),
                    ("publicKey", self.owner.clone()),
                ],
            )
            .await?;

        tracing::info!(input = %input_mint, output = %output_mint, amount = units, "swap quote received");
        Ok(quote)
    }

    /// 签名报价中的交易并交给后端执行；执行成功后等待链上确认
    pub async fn execute(
        &self,
        keypair: &Keypair,
        transfers: &SvmTransferService,
        quote: &Quote,
    ) -> AppResult<Vec<SwapStep>> {
        let encoded = quote
            .transaction()
            .ok_or_else(|| AppError::invalid_input("Quote carries no transaction"))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| AppError::invalid_input(format!("Malformed quote transaction: {}", e)))?;

        let mut tx = Transaction::deserialize(&bytes)?;
        tx.sign(keypair)?;

        let url = format!("{}/v1/{}/ft/swap/execute", self.api_url, self.network.id);
        let response: ExecuteResponse = self
            .upstream
            .post_json(
                &url,
                &ExecuteRequest {
                    signed_transaction: tx.to_base64()?,
                    request_id: quote.request_id(),
                },
            )
            .await?;

        if response.status != "Success" {
            tracing::warn!(status = %response.status, error = ?response.error, "swap execution failed");
            return Ok(vec![SwapStep {
                id: None,
                name: "swap".to_string(),
                status: SwapStatus::Fail,
                error: response.error,
            }]);
        }

        let signature = response
            .signature
            .or_else(|| tx.signature())
            .ok_or_else(|| AppError::transient("Swap executed without a signature"))?;

        let step = match transfers.confirm_transfer(&signature).await {
            Ok(()) => SwapStep {
                id: Some(signature.clone()),
                name: "swap".to_string(),
                status: SwapStatus::Success,
                error: None,
            },
            Err(e) => SwapStep {
                id: Some(signature.clone()),
                name: "swap".to_string(),
                status: SwapStatus::Fail,
                error: Some(e.message),
            },
        };
        tracing::info!(tx_id = %signature, status = ?step.status, "swap settled");
        Ok(vec![step])
    }
}
