//! 过滤流规则同步
//!
//! 严格按 获取 -> 删除 -> 新增 的顺序执行，不做增量对比：
//! 每次运行都先清空服务端已有规则，再装入配置中的规则。

use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::Value;

use super::client::ApiClient;
use super::error::TwitterResult;
use super::types::{AddRulesRequest, DeleteRulesRequest, FilterRule, RuleSet};
use crate::sink::RecordSink;

/// 规则同步器
pub struct RuleSynchronizer {
    api: ApiClient,
    rules_url: String,
    sink: Arc<dyn RecordSink>,
}

impl RuleSynchronizer {
    pub fn new(api: ApiClient, rules_url: impl Into<String>, sink: Arc<dyn RecordSink>) -> Self {
        Self {
            api,
            rules_url: rules_url.into(),
            sink,
        }
    }

    /// 获取服务端当前的规则
    pub async fn fetch_rules(&self) -> TwitterResult<RuleSet> {
        let value: Value = self
            .api
            .get_json(&self.rules_url, &[], StatusCode::OK)
            .await?;
        self.sink.info("Get Rules", Some(&value))?;

        let rules: RuleSet = serde_json::from_value(value)?;
        tracing::info!(count = rules.ids().len(), "已获取过滤规则");
        Ok(rules)
    }

    /// 按 id 删除规则；规则集为空或没有 data 字段时不发请求
    pub async fn delete_rules(&self, rules: &RuleSet) -> TwitterResult<()> {
        if rules.is_empty() {
            tracing::debug!("没有需要删除的规则");
            return Ok(());
        }

        let payload = DeleteRulesRequest::new(rules.ids());
        let value: Value = self
            .api
            .post_json(&self.rules_url, &payload, StatusCode::OK)
            .await?;
        self.sink.info("Delete All Rules", Some(&value))?;

        tracing::info!(count = payload.delete.ids.len(), "已删除过滤规则");
        Ok(())
    }

    /// 新增规则，服务端必须返回 201
    ///
    /// 规则与标签的数量校验由调用方在此之前完成（见 `FilterRule::pair_all`），
    /// 空规则集照常提交，由 API 判定是否合法。
    pub async fn install_rules(&self, rules: &[FilterRule]) -> TwitterResult<()> {
        let payload = AddRulesRequest { add: rules };
        let value: Value = self
            .api
            .post_json(&self.rules_url, &payload, StatusCode::CREATED)
            .await?;
        self.sink.info("Set Rules", Some(&value))?;

        tracing::info!(count = rules.len(), "已设置过滤规则");
        Ok(())
    }

    /// 完整同步：获取 -> 删除 -> 新增
    pub async fn synchronize(&self, rules: &[FilterRule]) -> TwitterResult<()> {
        let existing = self.fetch_rules().await?;
        self.delete_rules(&existing).await?;
        self.install_rules(rules).await
    }
}
