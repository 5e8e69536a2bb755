use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sink::{DEFAULT_BACKUP_COUNT, DEFAULT_MAX_BYTES};
use crate::twitter::TwitterError;
use crate::twitter::users::TEMPLATE_PLACEHOLDER;

/// 单个用户拉取的推文数量范围（API 限制）
pub const MIN_TWEET_COUNT: u32 = 5;
pub const MAX_TWEET_COUNT: u32 = 100;

/// 不限时长
pub const INDEFINITE_DURATION: &str = "-1";

/// 用户字段及其默认开关
pub const USER_FIELDS: &[(&str, bool)] = &[
    ("created_at", true),
    ("description", true),
    ("entities", true),
    ("id", true),
    ("location", true),
    ("name", true),
    ("pinned_tweet_id", true),
    ("profile_image_url", true),
    ("protected", true),
    ("public_metrics", true),
    ("url", true),
    ("username", true),
    ("verified", true),
    ("withheld", true),
];

/// 推文字段及其默认开关
///
/// 三个 metrics 字段需要用户上下文授权，默认关闭
pub const TWEET_FIELDS: &[(&str, bool)] = &[
    ("attachments", true),
    ("author_id", true),
    ("context_annotations", true),
    ("conversation_id", true),
    ("created_at", true),
    ("entities", true),
    ("geo", true),
    ("id", true),
    ("in_reply_to_user_id", true),
    ("lang", true),
    ("non_public_metrics", false),
    ("organic_metrics", false),
    ("possibly_sensitive", true),
    ("promoted_metrics", false),
    ("public_metrics", true),
    ("referenced_tweets", true),
    ("source", true),
    ("text", true),
    ("withheld", true),
];

fn field_map(fields: &[(&str, bool)]) -> BTreeMap<String, bool> {
    fields
        .iter()
        .map(|(name, on)| (name.to_string(), *on))
        .collect()
}

// ============ 各配置段 ============

/// API 端点
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Links {
    #[serde(default = "default_stream_rules_link")]
    pub stream_rules: String,
    #[serde(default = "default_stream_link")]
    pub stream: String,
    /// `{}` 替换为逗号分隔的用户名
    #[serde(default = "default_users_link")]
    pub users: String,
    /// `{}` 替换为用户 id
    #[serde(default = "default_user_tweets_link")]
    pub user_tweets: String,
}

fn default_stream_rules_link() -> String {
    "https://api.twitter.com/2/tweets/search/stream/rules".to_string()
}

fn default_stream_link() -> String {
    "https://api.twitter.com/2/tweets/search/stream".to_string()
}

fn default_users_link() -> String {
    "https://api.twitter.com/2/users/by?usernames={}".to_string()
}

fn default_user_tweets_link() -> String {
    "https://api.twitter.com/2/users/{}/tweets".to_string()
}

impl Default for Links {
    fn default() -> Self {
        Self {
            stream_rules: default_stream_rules_link(),
            stream: default_stream_link(),
            users: default_users_link(),
            user_tweets: default_user_tweets_link(),
        }
    }
}

/// 未指定子命令时运行哪些服务
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Services {
    #[serde(default = "default_true")]
    pub stream_tweet: bool,
    #[serde(default = "default_true")]
    pub user_tweet: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Services {
    fn default() -> Self {
        Self {
            stream_tweet: true,
            user_tweet: true,
        }
    }
}

/// 文件路径
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FilePaths {
    #[serde(default = "default_stream_tweet_log_file")]
    pub stream_tweet_log_file: PathBuf,
    #[serde(default = "default_user_tweet_log_file")]
    pub user_tweet_log_file: PathBuf,
    /// `userTweet.users` 为空时从该文件读取用户名
    #[serde(default = "default_usernames_file")]
    pub usernames_file: PathBuf,
}

fn default_stream_tweet_log_file() -> PathBuf {
    PathBuf::from("logs/stream_tweet.log")
}

fn default_user_tweet_log_file() -> PathBuf {
    PathBuf::from("logs/user_tweet.log")
}

fn default_usernames_file() -> PathBuf {
    PathBuf::from("usernames.txt")
}

impl Default for FilePaths {
    fn default() -> Self {
        Self {
            stream_tweet_log_file: default_stream_tweet_log_file(),
            user_tweet_log_file: default_user_tweet_log_file(),
            usernames_file: default_usernames_file(),
        }
    }
}

/// 过滤流配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StreamTweetConfig {
    #[serde(default = "default_rules")]
    pub rules: Vec<String>,
    /// 与 rules 按位置一一对应
    #[serde(default = "default_tags")]
    pub tags: Vec<String>,
    /// `XmYs` 格式，`-1` 表示不限时
    #[serde(default = "default_duration")]
    pub duration: String,
}

fn default_rules() -> Vec<String> {
    vec!["(#OneTeam OR #LoveWhereYouWorked) -is:retweet -is:reply -is:quote -is:nullcast".to_string()]
}

fn default_tags() -> Vec<String> {
    vec!["OneTeam & LoveWhereYouWorked".to_string()]
}

fn default_duration() -> String {
    INDEFINITE_DURATION.to_string()
}

impl Default for StreamTweetConfig {
    fn default() -> Self {
        Self {
            rules: default_rules(),
            tags: default_tags(),
            duration: default_duration(),
        }
    }
}

/// 用户推文配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserTweetConfig {
    #[serde(default = "default_users")]
    pub users: Vec<String>,
    /// 每个用户拉取的推文数（单页）
    #[serde(default = "default_count")]
    pub count: u32,
}

fn default_users() -> Vec<String> {
    vec!["elonmusk".to_string(), "realDonaldTrump".to_string()]
}

fn default_count() -> u32 {
    MIN_TWEET_COUNT
}

impl Default for UserTweetConfig {
    fn default() -> Self {
        Self {
            users: default_users(),
            count: default_count(),
        }
    }
}

/// 数据日志轮转配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
    #[serde(default = "default_backup_count")]
    pub backup_count: u32,
}

fn default_max_bytes() -> u64 {
    DEFAULT_MAX_BYTES
}

fn default_backup_count() -> u32 {
    DEFAULT_BACKUP_COUNT
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
            backup_count: default_backup_count(),
        }
    }
}

/// 非 429 的非预期状态码如何处理
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum NonSuccessPolicy {
    #[default]
    Retry,
    Fatal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    #[serde(default)]
    pub non_success_status: NonSuccessPolicy,
}

// ============ 顶层配置 ============

/// twiquery 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub links: Links,

    #[serde(default)]
    pub services: Services,

    #[serde(default)]
    pub filepaths: FilePaths,

    #[serde(default)]
    pub stream_tweet: StreamTweetConfig,

    #[serde(default)]
    pub user_tweet: UserTweetConfig,

    #[serde(default = "default_user_fields")]
    pub user_fields: BTreeMap<String, bool>,

    #[serde(default = "default_tweet_fields")]
    pub tweet_fields: BTreeMap<String, bool>,

    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    /// HTTP 读取超时（秒）
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// HTTP 代理地址（可选）
    /// 支持格式: http://host:port, https://host:port, socks5://host:port
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,

    /// 配置文件路径（运行时元数据，不写入 JSON）
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

fn default_user_fields() -> BTreeMap<String, bool> {
    field_map(USER_FIELDS)
}

fn default_tweet_fields() -> BTreeMap<String, bool> {
    field_map(TWEET_FIELDS)
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            links: Links::default(),
            services: Services::default(),
            filepaths: FilePaths::default(),
            stream_tweet: StreamTweetConfig::default(),
            user_tweet: UserTweetConfig::default(),
            user_fields: default_user_fields(),
            tweet_fields: default_tweet_fields(),
            log: LogConfig::default(),
            retry: RetryConfig::default(),
            timeout_secs: default_timeout_secs(),
            proxy_url: None,
            config_path: None,
        }
    }
}

impl Config {
    /// 获取默认配置文件路径
    pub fn default_config_path() -> &'static str {
        "config.json"
    }

    /// 从文件加载配置
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            // 配置文件不存在，返回默认配置
            let mut config = Self::default();
            config.config_path = Some(path.to_path_buf());
            return Ok(config);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        let mut config: Config = serde_json::from_str(&content)
            .with_context(|| format!("解析配置文件失败: {}", path.display()))?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// 获取配置文件路径（如果有）
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// 将当前配置写回原始配置文件
    pub fn save(&self) -> anyhow::Result<()> {
        let path = self
            .config_path
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("配置文件路径未知，无法保存配置"))?;

        let content = serde_json::to_string_pretty(self).context("序列化配置失败")?;
        fs::write(path, content)
            .with_context(|| format!("写入配置文件失败: {}", path.display()))?;
        Ok(())
    }

    /// 解析后的过滤流时长，`None` 表示不限时
    pub fn stream_duration(&self) -> Result<Option<Duration>, TwitterError> {
        parse_stream_duration(&self.stream_tweet.duration).map_err(TwitterError::Config)
    }

    /// 运行前的整体校验，任何一项不通过都属于不可重试的配置错误
    pub fn validate(&self) -> Result<(), TwitterError> {
        let stream = &self.stream_tweet;
        if stream.rules.is_empty() {
            return Err(TwitterError::Config("至少需要一条过滤规则".to_string()));
        }
        if stream.rules.len() != stream.tags.len() {
            return Err(TwitterError::Config(format!(
                "规则数量 ({}) 与标签数量 ({}) 不一致",
                stream.rules.len(),
                stream.tags.len()
            )));
        }
        self.stream_duration()?;

        let count = self.user_tweet.count;
        if !(MIN_TWEET_COUNT..=MAX_TWEET_COUNT).contains(&count) {
            return Err(TwitterError::Config(format!(
                "推文数量 {} 超出范围 [{}, {}]",
                count, MIN_TWEET_COUNT, MAX_TWEET_COUNT
            )));
        }

        for (name, template) in [
            ("links.users", &self.links.users),
            ("links.userTweets", &self.links.user_tweets),
        ] {
            if !template.contains(TEMPLATE_PLACEHOLDER) {
                return Err(TwitterError::Config(format!(
                    "{} 缺少占位符 {}",
                    name, TEMPLATE_PLACEHOLDER
                )));
            }
        }

        Ok(())
    }
}

/// 解析 `XmYs` / `Xm` / `Ys` 格式的时长，`-1` 表示不限时
pub fn parse_stream_duration(value: &str) -> Result<Option<Duration>, String> {
    let value = value.trim();
    if value == INDEFINITE_DURATION {
        return Ok(None);
    }

    let invalid = || format!("无效的时长 '{}'，格式应为 XmYs、Xm、Ys 或 -1", value);

    let mut rest = value;
    let mut total_secs = 0u64;
    let mut matched = false;

    if let Some(pos) = rest.find('m') {
        let minutes: u64 = rest[..pos].parse().map_err(|_| invalid())?;
        total_secs = minutes.checked_mul(60).ok_or_else(invalid)?;
        rest = &rest[pos + 1..];
        matched = true;
    }

    if let Some(seconds) = rest.strip_suffix('s') {
        let seconds: u64 = seconds.parse().map_err(|_| invalid())?;
        total_secs = total_secs.checked_add(seconds).ok_or_else(invalid)?;
        rest = "";
        matched = true;
    }

    if !matched || !rest.is_empty() {
        return Err(invalid());
    }
    if total_secs == 0 {
        return Err(format!("时长 '{}' 必须大于 0", value));
    }

    Ok(Some(Duration::from_secs(total_secs)))
}
