//! 过滤流读取
//!
//! 响应体是按行分隔的 JSON，服务端会定期发送空的 `\r\n` 作为心跳。
//! 读取持续到连接自然关闭或出错为止，时长限制由调用方负责。

use bytes::BytesMut;
use futures::StreamExt;
use serde_json::Value;

use super::client::ApiClient;
use super::error::TwitterResult;

/// 把分块到达的字节切分成完整的行
///
/// 只返回去除首尾空白后非空的行，心跳行直接丢弃
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: BytesMut,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个数据块，返回其中所有已完整的行
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw = self.buffer.split_to(pos + 1);
            if let Some(line) = non_blank(&raw) {
                lines.push(line);
            }
        }
        lines
    }

    /// 连接关闭后取出缓冲区中没有换行结尾的最后一行
    pub fn finish(&mut self) -> Option<String> {
        let raw = self.buffer.split();
        non_blank(&raw)
    }
}

fn non_blank(raw: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim();
    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}

/// 过滤流读取器
pub struct StreamReader {
    api: ApiClient,
    stream_url: String,
}

impl StreamReader {
    pub fn new(api: ApiClient, stream_url: impl Into<String>) -> Self {
        Self {
            api,
            stream_url: stream_url.into(),
        }
    }

    /// 打开流并把每条记录交给 `on_record`，返回收到的记录数
    ///
    /// 非 200 状态码（包括 429）以 `TwitterError::Api` 返回，
    /// 任意一行 JSON 解析失败都会结束本次读取。
    pub async fn read_stream<F>(&self, mut on_record: F) -> TwitterResult<u64>
    where
        F: FnMut(Value) -> TwitterResult<()>,
    {
        let response = self.api.open_stream(&self.stream_url).await?;
        tracing::info!(url = %self.stream_url, "过滤流已连接");

        let mut body = response.bytes_stream();
        let mut decoder = LineDecoder::new();
        let mut delivered = 0u64;

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            for line in decoder.push(&chunk) {
                on_record(serde_json::from_str(&line)?)?;
                delivered += 1;
            }
        }

        if let Some(line) = decoder.finish() {
            on_record(serde_json::from_str(&line)?)?;
            delivered += 1;
        }

        tracing::info!(delivered, "过滤流连接已关闭");
        Ok(delivered)
    }
}
