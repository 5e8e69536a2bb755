//! Twitter API v2 访问层
//!
//! - 过滤流规则同步（获取 -> 删除 -> 新增）
//! - 过滤流读取
//! - 用户名解析与时间线拉取

pub mod client;
pub mod error;
pub mod rules;
pub mod stream;
pub mod types;
pub mod users;

pub use client::ApiClient;
pub use error::{TwitterError, TwitterResult};
pub use rules::RuleSynchronizer;
pub use stream::StreamReader;
pub use users::UserFetcher;
