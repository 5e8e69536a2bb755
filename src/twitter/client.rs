//! Bearer 认证的 Twitter API 客户端

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::error::{TwitterError, TwitterResult};

/// 错误信息中保留的响应体长度
#[cfg(not(feature = "sensitive-logs"))]
const MAX_ERROR_BODY_BYTES: usize = 512;

/// 限流重置时间头（Unix 秒）
pub const RATE_LIMIT_RESET_HEADER: &str = "x-rate-limit-reset";

/// Twitter API 客户端
///
/// 只负责发请求和校验状态码，不做任何重试
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    bearer_token: String,
}

impl ApiClient {
    pub fn new(client: Client, bearer_token: impl Into<String>) -> Self {
        Self {
            client,
            bearer_token: bearer_token.into(),
        }
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.bearer_auth(&self.bearer_token)
    }

    /// GET 并解析 JSON，状态码必须等于 `expected`
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        expected: StatusCode,
    ) -> TwitterResult<T> {
        tracing::debug!(url = %url, "GET");
        let response = self
            .authorized(self.client.get(url))
            .query(query)
            .send()
            .await?;
        let response = ensure_status(response, expected).await?;
        decode_json(response).await
    }

    /// POST JSON 请求体并解析 JSON 响应，状态码必须等于 `expected`
    pub async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
        expected: StatusCode,
    ) -> TwitterResult<T> {
        tracing::debug!(url = %url, "POST");
        let response = self
            .authorized(self.client.post(url))
            .json(body)
            .send()
            .await?;
        let response = ensure_status(response, expected).await?;
        decode_json(response).await
    }

    /// 打开长连接，返回尚未读取的响应
    pub async fn open_stream(&self, url: &str) -> TwitterResult<Response> {
        tracing::debug!(url = %url, "打开流式连接");
        let response = self.authorized(self.client.get(url)).send().await?;
        ensure_status(response, StatusCode::OK).await
    }
}

/// 状态码不符时读取响应体并转换为 `TwitterError::Api`
async fn ensure_status(response: Response, expected: StatusCode) -> TwitterResult<Response> {
    let status = response.status();
    if status == expected {
        return Ok(response);
    }

    let rate_limit_reset = response
        .headers()
        .get(RATE_LIMIT_RESET_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<i64>().ok());

    let body = response.text().await.unwrap_or_default();

    #[cfg(feature = "sensitive-logs")]
    tracing::debug!(status = status.as_u16(), body = %body, "上游返回非预期状态码");

    #[cfg(not(feature = "sensitive-logs"))]
    let body = crate::common::truncate_with_ellipsis(&body, MAX_ERROR_BODY_BYTES);

    Err(TwitterError::Api {
        status: status.as_u16(),
        body,
        rate_limit_reset,
    })
}

/// 先取文本再解析，解析失败归类为 `Parse` 而不是网络错误
async fn decode_json<T: DeserializeOwned>(response: Response) -> TwitterResult<T> {
    let text = response.text().await?;
    Ok(serde_json::from_str(&text)?)
}
