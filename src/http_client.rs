//! HTTP Client 构建模块
//!
//! Input: 代理 URL、超时、客户端标识
//! Output: reqwest::Client

use reqwest::{Client, Proxy};
use std::time::Duration;

/// 建立连接的超时时间
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// 构建 HTTP Client
///
/// `timeout_secs` 作用于单次读取而不是整个请求，
/// 否则长连接的过滤流会在超时后被强制断开。
///
/// # Arguments
/// * `proxy_url` - 可选的代理 URL，支持 http://、socks5://（可带认证信息）
/// * `timeout_secs` - 读取超时（秒）
/// * `user_agent` - 固定的客户端标识
pub fn build_client(
    proxy_url: Option<&str>,
    timeout_secs: u64,
    user_agent: &str,
) -> anyhow::Result<Client> {
    let mut builder = Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .read_timeout(Duration::from_secs(timeout_secs))
        .user_agent(user_agent);

    if let Some(url) = proxy_url {
        let proxy = Proxy::all(url)?;
        builder = builder.proxy(proxy);
        tracing::debug!("HTTP Client 使用代理: {}", url);
    }

    Ok(builder.build()?)
}
