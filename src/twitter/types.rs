//! Twitter API v2 类型定义

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{TwitterError, TwitterResult};

/// 资源 ID 缺失时使用的键
pub const UNKNOWN_KEY: &str = "Unknown";

// ============ 过滤流规则 ============

/// 过滤流规则
///
/// `id` 由服务端在创建时分配，本地构造的规则不带 id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// 查询表达式
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl FilterRule {
    pub fn new(value: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            id: None,
            value: value.into(),
            tag: Some(tag.into()),
        }
    }

    /// 按位置将规则表达式与标签配对
    ///
    /// 两者数量必须一致，否则在发出任何请求之前返回配置错误
    pub fn pair_all(values: &[String], tags: &[String]) -> TwitterResult<Vec<FilterRule>> {
        if values.len() != tags.len() {
            return Err(TwitterError::Config(format!(
                "规则数量 ({}) 与标签数量 ({}) 不一致",
                values.len(),
                tags.len()
            )));
        }

        Ok(values
            .iter()
            .zip(tags)
            .map(|(value, tag)| FilterRule::new(value.as_str(), tag.as_str()))
            .collect())
    }
}

/// GET rules 端点的响应
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<FilterRule>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl RuleSet {
    /// 没有 data 字段或 data 为空
    pub fn is_empty(&self) -> bool {
        self.data.as_ref().is_none_or(|rules| rules.is_empty())
    }

    /// 所有带服务端 id 的规则 id
    pub fn ids(&self) -> Vec<String> {
        self.data
            .iter()
            .flatten()
            .filter_map(|rule| rule.id.clone())
            .collect()
    }
}

/// 新增规则请求体：`{"add": [{value, tag}]}`
#[derive(Debug, Serialize)]
pub struct AddRulesRequest<'a> {
    pub add: &'a [FilterRule],
}

/// 删除规则请求体：`{"delete": {"ids": [...]}}`
#[derive(Debug, Serialize)]
pub struct DeleteRulesRequest {
    pub delete: DeleteIds,
}

#[derive(Debug, Serialize)]
pub struct DeleteIds {
    pub ids: Vec<String>,
}

impl DeleteRulesRequest {
    pub fn new(ids: Vec<String>) -> Self {
        Self {
            delete: DeleteIds { ids },
        }
    }
}

// ============ 字段投影 ============

/// 启用的字段集合，序列化为逗号分隔的查询参数
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSelection {
    enabled: BTreeSet<String>,
}

impl FieldSelection {
    /// 从 字段名 -> 是否启用 的映射构建
    pub fn from_flags(flags: &BTreeMap<String, bool>) -> Self {
        Self {
            enabled: flags
                .iter()
                .filter(|(_, on)| **on)
                .map(|(name, _)| name.clone())
                .collect(),
        }
    }

    /// 解析逗号分隔的参数值
    #[cfg(test)]
    pub fn parse(param: &str) -> Self {
        Self {
            enabled: param
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn to_param(&self) -> String {
        self.enabled
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn is_empty(&self) -> bool {
        self.enabled.is_empty()
    }
}

// ============ 用户查询 ============

/// 批量用户查询响应：`{data: [...], errors: [...]}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserLookupResponse {
    #[serde(default)]
    pub data: Vec<Value>,
    #[serde(default)]
    pub errors: Vec<Value>,
}

/// 一次查询的结果，每个条目恰好落入其中一边
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UserLookup {
    pub successes: BTreeMap<String, Value>,
    pub failures: BTreeMap<String, Value>,
}

impl From<UserLookupResponse> for UserLookup {
    fn from(response: UserLookupResponse) -> Self {
        let mut lookup = UserLookup::default();
        for item in response.data {
            let key = key_of(&item, "id");
            lookup.successes.insert(key, item);
        }
        for item in response.errors {
            let key = key_of(&item, "resource_id");
            lookup.failures.insert(key, item);
        }
        lookup
    }
}

/// 取条目的 id 字段作为键，缺失时回退到 "Unknown"
fn key_of(item: &Value, field: &str) -> String {
    match item.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => UNKNOWN_KEY.to_string(),
        Some(other) => other.to_string(),
    }
}

/// 用户时间线响应
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostsResponse {
    #[serde(default)]
    pub data: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<Value>>,
}
