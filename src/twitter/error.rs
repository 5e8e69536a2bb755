//! Twitter API 错误类型
//!
//! 组件只负责抛出带类型的错误，是否重试由 `runner` 统一决定。

use thiserror::Error;

/// Twitter 相关错误
#[derive(Error, Debug)]
pub enum TwitterError {
    /// 网络层失败（建立连接或读取响应体时断开）
    #[error("连接失败: {0}")]
    Connectivity(reqwest::Error),

    /// 上游返回了非预期的状态码
    #[error("API 返回错误 (HTTP {status}): {body}")]
    Api {
        status: u16,
        body: String,
        /// `x-rate-limit-reset` 头（Unix 秒），仅在上游提供时存在
        rate_limit_reset: Option<i64>,
    },

    /// 响应体或流中的某一行不是合法 JSON
    #[error("JSON 解析失败: {0}")]
    Parse(#[from] serde_json::Error),

    /// 本地配置不合法（凭据缺失、规则与标签数量不一致等）
    #[error("配置错误: {0}")]
    Config(String),

    /// 写入日志文件失败
    #[error("写入日志失败: {0}")]
    Sink(#[from] std::io::Error),
}

impl TwitterError {
    /// 是否为限流（HTTP 429）
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Api { status: 429, .. })
    }
}

impl From<reqwest::Error> for TwitterError {
    fn from(e: reqwest::Error) -> Self {
        // URL 模板写错之类的问题重试也不会好转
        if e.is_builder() {
            Self::Config(format!("无法构建请求: {}", e))
        } else {
            Self::Connectivity(e)
        }
    }
}

/// Twitter 操作结果
pub type TwitterResult<T> = Result<T, TwitterError>;
