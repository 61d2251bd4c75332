//! 上游 HTTP 客户端：带超时/重试/指数回退
//! 后端 API、代币列表、价格源、DAS 索引器与 JSON-RPC 节点都经由这里访问。

use std::time::{Duration, Instant};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    config::HttpConfig,
    error::{AppError, AppResult},
};

#[derive(Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    pub timeout: Duration,
    pub retries: usize,
}

impl Default for UpstreamClient {
    fn default() -> Self {
        Self::new(&HttpConfig::default())
    }
}

impl UpstreamClient {
    pub fn new(config: &HttpConfig) -> Self {
        let timeout = Duration::from_millis(config.timeout_ms);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            timeout,
            retries: config.retries,
        }
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> AppResult<T> {
        let resp = self
            .send_with_retry(url, || self.client.get(url).query(query))
            .await?;
        Ok(resp.json::<T>().await?)
    }

    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> AppResult<T> {
        let resp = self
            .send_with_retry(url, || self.client.post(url).json(body))
            .await?;
        Ok(resp.json::<T>().await?)
    }

    /// 提交原始文本（Esplora 广播交易）
    ///
    /// 不重试；4xx 视为对方拒绝了请求体，返回 `TransactionRejected`。
    pub async fn post_text(&self, url: &str, body: String) -> AppResult<String> {
        let resp = self.client.post(url).body(body).send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if status.is_success() {
            Ok(text)
        } else if status.is_client_error() {
            Err(AppError::rejected(
                format!("{} rejected the request: {}", url, text.trim()),
                None,
            ))
        } else {
            Err(AppError::transient(format!("{} returned HTTP {}", url, status)))
        }
    }

    /// JSON-RPC 2.0 调用；`error` 字段映射为瞬时故障
    pub async fn json_rpc<T: DeserializeOwned>(
        &self,
        url: &str,
        method: &str,
        params: serde_json::Value,
    ) -> AppResult<T> {
        self.json_rpc_checked(url, method, params)
            .await?
            .map_err(|err| AppError::transient(format!("RPC {} failed: {}", method, err)))
    }

    /// 同 `json_rpc`，但把节点返回的 `error` 交给调用方判断
    ///
    /// 外层错误是传输/解码失败，内层错误是节点拒绝了请求。
    pub async fn json_rpc_checked<T: DeserializeOwned>(
        &self,
        url: &str,
        method: &str,
        params: serde_json::Value,
    ) -> AppResult<Result<T, RpcError>> {
        let req = JsonRpcRequest::new(method, params);
        let resp: JsonRpcResponse = self.post_json(url, &req).await?;

        if let Some(err) = resp.error {
            return Ok(Err(err));
        }

        Ok(Ok(serde_json::from_value(
            resp.result.unwrap_or(serde_json::Value::Null),
        )?))
    }

    async fn send_with_retry<F>(&self, url: &str, build: F) -> AppResult<reqwest::Response>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0usize;
        let mut last_err = AppError::transient(format!("upstream request to {} failed", url));

        loop {
            let start = Instant::now();
            match build().send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        tracing::trace!(url, elapsed_ms = start.elapsed().as_millis() as u64, "upstream ok");
                        return Ok(resp);
                    }
                    if status == reqwest::StatusCode::NOT_FOUND {
                        return Err(AppError::not_found(format!("{} returned 404", url)));
                    }
                    if !(status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS)
                    {
                        // 其余 4xx 重试无意义
                        return Err(AppError::transient(format!(
                            "{} returned HTTP {}",
                            url, status
                        )));
                    }
                    last_err = AppError::transient(format!("{} returned HTTP {}", url, status));
                }
                Err(e) => {
                    last_err = e.into();
                }
            }

            attempt += 1;
            if attempt > self.retries {
                break;
            }
            let backoff = 50 * (1 << (attempt.min(5))); // 简单指数回退，最大 ~1600ms
            tracing::debug!(url, attempt, backoff_ms = backoff, "retrying upstream request");
            tokio::time::sleep(Duration::from_millis(backoff as u64)).await;
        }

        tracing::warn!(url, error = %last_err, "upstream request failed after retries");
        Err(last_err)
    }
}

#[derive(Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'a str,
    method: &'a str,
    params: serde_json::Value,
    id: u64,
}

impl<'a> JsonRpcRequest<'a> {
    fn new(method: &'a str, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params,
            id: 1,
        }
    }
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

/// 节点返回的 JSON-RPC 错误对象
#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}
