//! 外层运行循环
//!
//! 状态机：ATTEMPT -> SUCCESS | RETRY -> ATTEMPT | FATAL。
//! 组件只返回带类型的错误，是否重试、等待多久都由这里的 `classify` 决定。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::model::config::NonSuccessPolicy;
use crate::sink::RecordSink;
use crate::twitter::{TwitterError, TwitterResult};

/// 普通重试前的固定停顿，避免上游不可达时空转
pub const RETRY_PAUSE: Duration = Duration::from_secs(1);

/// 对一次失败的处理决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Retry,
    /// 等待到限流重置时间后再重试
    RetryAfter(Duration),
    Fatal,
}

/// 错误分类，不依赖网络，可单独测试
pub fn classify(err: &TwitterError, policy: NonSuccessPolicy, now: DateTime<Utc>) -> Action {
    match err {
        TwitterError::Connectivity(_) => Action::Retry,
        TwitterError::Api { rate_limit_reset, .. } if err.is_rate_limited() => match rate_limit_reset {
            Some(reset) => {
                let wait_ms = reset.saturating_mul(1000).saturating_sub(now.timestamp_millis());
                Action::RetryAfter(Duration::from_millis(wait_ms.max(0) as u64))
            }
            None => Action::Retry,
        },
        TwitterError::Api { .. } => match policy {
            NonSuccessPolicy::Retry => Action::Retry,
            NonSuccessPolicy::Fatal => Action::Fatal,
        },
        TwitterError::Parse(_) | TwitterError::Config(_) | TwitterError::Sink(_) => Action::Fatal,
    }
}

/// 运行单元的最终结果
#[derive(Debug)]
pub enum Outcome {
    /// 某次尝试正常结束
    Completed,
    /// 到达配置的时长上限
    DeadlineReached,
    Fatal(TwitterError),
}

impl Outcome {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

/// 单个运行单元的重试循环
pub struct RunLoop {
    name: &'static str,
    policy: NonSuccessPolicy,
    sink: Arc<dyn RecordSink>,
    deadline: Option<Instant>,
    retry_pause: Duration,
}

impl RunLoop {
    /// `name` 同时用作日志文件中的消息前缀，例如 "Stream Tweet"
    pub fn new(name: &'static str, policy: NonSuccessPolicy, sink: Arc<dyn RecordSink>) -> Self {
        Self {
            name,
            policy,
            sink,
            deadline: None,
            retry_pause: RETRY_PAUSE,
        }
    }

    /// 从现在起最多运行 `limit`，`None` 表示不限时
    ///
    /// 时长大到无法表示为时间点时同样视为不限时
    pub fn with_time_limit(mut self, limit: Option<Duration>) -> Self {
        self.deadline = limit.and_then(|limit| {
            let deadline = Instant::now().checked_add(limit);
            if deadline.is_none() {
                tracing::warn!(unit = self.name, "运行时长超出可表示范围，按不限时处理");
            }
            deadline
        });
        self
    }

    #[cfg(test)]
    fn with_retry_pause(mut self, pause: Duration) -> Self {
        self.retry_pause = pause;
        self
    }

    /// 反复执行 `attempt` 直到成功、遇到致命错误或到达截止时间
    pub async fn run<F, Fut>(&self, mut attempt: F) -> Outcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = TwitterResult<()>>,
    {
        loop {
            if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return self.deadline_reached();
            }

            let result = match self.deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, attempt()).await {
                    Ok(result) => result,
                    Err(_) => return self.deadline_reached(),
                },
                None => attempt().await,
            };

            let err = match result {
                Ok(()) => {
                    tracing::info!(unit = self.name, "运行单元已完成");
                    return Outcome::Completed;
                }
                Err(err) => err,
            };

            self.record(&format!("{} Failed - {}", self.name, err), true);

            let wait = match classify(&err, self.policy, Utc::now()) {
                Action::Fatal => {
                    tracing::error!(unit = self.name, "遇到不可重试的错误，运行单元终止");
                    return Outcome::Fatal(err);
                }
                Action::Retry => self.retry_pause,
                Action::RetryAfter(wait) => {
                    tracing::warn!(unit = self.name, wait_secs = wait.as_secs(), "触发限流，等待重置");
                    wait
                }
            };

            self.record(&format!("Retrying {}", self.name), false);
            self.pause(wait).await;
        }
    }

    /// 等待，但不越过截止时间
    async fn pause(&self, wait: Duration) {
        match self.deadline {
            Some(deadline) => {
                let until = Instant::now()
                    .checked_add(wait)
                    .map_or(deadline, |until| until.min(deadline));
                tokio::time::sleep_until(until).await;
            }
            None => tokio::time::sleep(wait).await,
        }
    }

    fn deadline_reached(&self) -> Outcome {
        tracing::info!(unit = self.name, "已到达运行时长上限，停止");
        Outcome::DeadlineReached
    }

    /// 写入数据日志，同时输出到 tracing；日志写失败不影响运行状态
    fn record(&self, message: &str, is_error: bool) {
        let written = if is_error {
            tracing::error!(unit = self.name, "{}", message);
            self.sink.error(message)
        } else {
            tracing::info!(unit = self.name, "{}", message);
            self.sink.info(message, None)
        };

        if let Err(e) = written {
            tracing::warn!(unit = self.name, "写入日志文件失败: {}", e);
        }
    }
}
