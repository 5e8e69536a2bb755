//! 两个运行单元：过滤流与用户推文
//!
//! 每个单元持有自己的 HTTP 客户端和日志文件，只读共享配置。

use std::path::Path;
use std::sync::Arc;

use crate::common::read_usernames;
use crate::http_client::build_client;
use crate::model::config::Config;
use crate::runner::{Outcome, RunLoop};
use crate::sink::{RecordSink, RotatingFileSink};
use crate::twitter::types::{FieldSelection, FilterRule, UNKNOWN_KEY};
use crate::twitter::{ApiClient, RuleSynchronizer, StreamReader, TwitterError, TwitterResult, UserFetcher};

fn open_sink(config: &Config, path: &Path) -> TwitterResult<Arc<dyn RecordSink>> {
    let sink = RotatingFileSink::open(path, config.log.max_bytes, config.log.backup_count)
        .inspect_err(|e| tracing::error!(path = %path.display(), "打开日志文件失败: {}", e))?;
    tracing::info!(path = %sink.path().display(), "数据日志输出到文件");
    Ok(Arc::new(sink))
}

fn api_client(config: &Config, bearer_token: &str, user_agent: &str) -> TwitterResult<ApiClient> {
    let client = build_client(config.proxy_url.as_deref(), config.timeout_secs, user_agent)
        .map_err(|e| TwitterError::Config(format!("构建 HTTP 客户端失败: {:#}", e)))?;
    Ok(ApiClient::new(client, bearer_token))
}

// ============ 运行单元 ============

/// 可独立运行的单元
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Stream,
    User,
}

impl Unit {
    pub fn name(self) -> &'static str {
        match self {
            Self::Stream => StreamService::NAME,
            Self::User => UserService::NAME,
        }
    }

    /// 在单元内部完成构建与运行
    ///
    /// 构建失败（日志文件打不开、代理地址非法等）只结束本单元，不影响其他单元
    pub async fn run(self, config: Arc<Config>, bearer_token: Arc<str>) -> Outcome {
        tracing::info!(unit = self.name(), "启动运行单元");
        let built = match self {
            Self::Stream => StreamService::new(config, &bearer_token).map(Service::Stream),
            Self::User => UserService::new(config, &bearer_token).map(Service::User),
        };

        match built {
            Ok(Service::Stream(service)) => service.run().await,
            Ok(Service::User(service)) => service.run().await,
            Err(e) => {
                tracing::error!(unit = self.name(), "运行单元初始化失败: {}", e);
                Outcome::Fatal(e)
            }
        }
    }
}

enum Service {
    Stream(StreamService),
    User(UserService),
}

// ============ 过滤流 ============

/// 过滤流单元：同步规则后持续读取推文
pub struct StreamService {
    config: Arc<Config>,
    sink: Arc<dyn RecordSink>,
    rules: RuleSynchronizer,
    reader: StreamReader,
}

impl StreamService {
    pub const NAME: &'static str = "Stream Tweet";
    pub const USER_AGENT: &'static str = "v2FilteredStreamRust";

    pub fn new(config: Arc<Config>, bearer_token: &str) -> TwitterResult<Self> {
        let api = api_client(&config, bearer_token, Self::USER_AGENT)?;
        let sink = open_sink(&config, &config.filepaths.stream_tweet_log_file)?;
        Ok(Self::with_parts(config, api, sink))
    }

    pub fn with_parts(config: Arc<Config>, api: ApiClient, sink: Arc<dyn RecordSink>) -> Self {
        let rules = RuleSynchronizer::new(api.clone(), config.links.stream_rules.clone(), sink.clone());
        let reader = StreamReader::new(api, config.links.stream.clone());
        Self {
            config,
            sink,
            rules,
            reader,
        }
    }

    /// 一次完整尝试：校验规则 -> 同步规则 -> 读取流
    pub async fn run_once(&self) -> TwitterResult<()> {
        let stream = &self.config.stream_tweet;
        // 数量不一致时不发出任何请求
        let rules = FilterRule::pair_all(&stream.rules, &stream.tags)?;

        self.rules.synchronize(&rules).await?;

        let sink = &self.sink;
        let delivered = self
            .reader
            .read_stream(|record| {
                sink.info(Self::NAME, Some(&record))?;
                Ok(())
            })
            .await?;

        tracing::info!(delivered, "本次过滤流读取结束");
        Ok(())
    }

    /// 在重试循环中运行，时长上限取自配置
    pub async fn run(&self) -> Outcome {
        let limit = match self.config.stream_duration() {
            Ok(limit) => limit,
            Err(e) => return Outcome::Fatal(e),
        };

        RunLoop::new(Self::NAME, self.config.retry.non_success_status, self.sink.clone())
            .with_time_limit(limit)
            .run(move || self.run_once())
            .await
    }
}

// ============ 用户推文 ============

/// 用户推文单元：解析用户名后逐个拉取最近推文
pub struct UserService {
    config: Arc<Config>,
    sink: Arc<dyn RecordSink>,
    fetcher: UserFetcher,
}

impl UserService {
    pub const NAME: &'static str = "User Tweet";
    pub const USER_AGENT: &'static str = "v2UserLookupRust";

    pub fn new(config: Arc<Config>, bearer_token: &str) -> TwitterResult<Self> {
        let api = api_client(&config, bearer_token, Self::USER_AGENT)?;
        let sink = open_sink(&config, &config.filepaths.user_tweet_log_file)?;
        Ok(Self::with_parts(config, api, sink))
    }

    pub fn with_parts(config: Arc<Config>, api: ApiClient, sink: Arc<dyn RecordSink>) -> Self {
        let fetcher = UserFetcher::new(
            api,
            config.links.users.clone(),
            config.links.user_tweets.clone(),
        );
        Self {
            config,
            sink,
            fetcher,
        }
    }

    /// 配置中的用户名优先，为空时读取用户名文件
    fn usernames(&self) -> TwitterResult<Vec<String>> {
        let configured = &self.config.user_tweet.users;
        if !configured.is_empty() {
            return Ok(configured.clone());
        }

        let path = &self.config.filepaths.usernames_file;
        let usernames = read_usernames(path).map_err(|e| {
            TwitterError::Config(format!("读取用户名文件失败 {}: {}", path.display(), e))
        })?;
        if usernames.is_empty() {
            return Err(TwitterError::Config(format!(
                "没有可查询的用户名: {}",
                path.display()
            )));
        }
        Ok(usernames)
    }

    /// 一次完整尝试：解析用户名 -> 记录结果 -> 拉取每个用户的推文
    pub async fn run_once(&self) -> TwitterResult<()> {
        let usernames = self.usernames()?;
        let user_fields = FieldSelection::from_flags(&self.config.user_fields);
        let tweet_fields = FieldSelection::from_flags(&self.config.tweet_fields);

        let lookup = self.fetcher.resolve_users(&usernames, &user_fields).await?;
        self.sink
            .info("users_id", Some(&serde_json::to_value(&lookup.successes)?))?;
        self.sink
            .info("error_data", Some(&serde_json::to_value(&lookup.failures)?))?;

        for user_id in lookup.successes.keys() {
            if user_id == UNKNOWN_KEY {
                tracing::warn!("跳过缺少 id 的用户记录");
                continue;
            }

            let posts = self
                .fetcher
                .fetch_user_posts(user_id, &tweet_fields, self.config.user_tweet.count)
                .await?;
            self.sink
                .info("tweets_response", Some(&serde_json::to_value(&posts)?))?;
        }

        Ok(())
    }

    pub async fn run(&self) -> Outcome {
        RunLoop::new(Self::NAME, self.config.retry.non_success_status, self.sink.clone())
            .run(move || self.run_once())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::config::NonSuccessPolicy;
    use crate::sink::MemorySink;
    use reqwest::Client;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(server: &MockServer) -> Config {
        let mut config = Config::default();
        config.links.stream_rules = format!("{}/2/tweets/search/stream/rules", server.uri());
        config.links.stream = format!("{}/2/tweets/search/stream", server.uri());
        config.links.users = format!("{}/2/users/by?usernames={{}}", server.uri());
        config.links.user_tweets = format!("{}/2/users/{{}}/tweets", server.uri());
        config.stream_tweet.rules = vec!["foo".to_string()];
        config.stream_tweet.tags = vec!["t1".to_string()];
        config.user_fields = BTreeMap::from([("username".to_string(), true)]);
        config.tweet_fields = BTreeMap::from([
            ("text".to_string(), true),
            ("organic_metrics".to_string(), false),
        ]);
        config
    }

    fn api() -> ApiClient {
        ApiClient::new(Client::new(), "token")
    }

    #[tokio::test]
    async fn test_stream_mismatched_rules_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut config = test_config(&server);
        config.stream_tweet.tags.push("t2".to_string());
        let sink = Arc::new(MemorySink::default());
        let service = StreamService::with_parts(Arc::new(config), api(), sink.clone());

        let outcome = service.run().await;
        assert!(matches!(outcome, Outcome::Fatal(TwitterError::Config(_))));
        assert_eq!(sink.errors().len(), 1);
    }

    #[tokio::test]
    async fn test_stream_pass_writes_records() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/2/tweets/search/stream/rules"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"meta": {"result_count": 0}})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/2/tweets/search/stream/rules"))
            .and(body_json(json!({"add": [{"value": "foo", "tag": "t1"}]})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"meta": {}})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/2/tweets/search/stream"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "{\"data\":{\"id\":\"1\",\"text\":\"hi\"}}\r\n\r\n{\"data\":{\"id\":\"2\",\"text\":\"yo\"}}\r\n",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let sink = Arc::new(MemorySink::default());
        let service = StreamService::with_parts(Arc::new(test_config(&server)), api(), sink.clone());

        let outcome = service.run().await;
        assert!(matches!(outcome, Outcome::Completed));

        let records = sink.data_of(StreamService::NAME);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["data"]["id"], "2");
    }

    #[tokio::test]
    async fn test_stream_fatal_policy_stops_on_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/2/tweets/search/stream/rules"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = test_config(&server);
        config.retry.non_success_status = NonSuccessPolicy::Fatal;
        let sink = Arc::new(MemorySink::default());
        let service = StreamService::with_parts(Arc::new(config), api(), sink.clone());

        let outcome = service.run().await;
        assert!(matches!(outcome, Outcome::Fatal(TwitterError::Api { status: 500, .. })));
        assert!(sink.errors()[0].starts_with("Stream Tweet Failed - "));
    }

    #[tokio::test]
    async fn test_stream_duration_ends_unit_successfully() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/2/tweets/search/stream/rules"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/2/tweets/search/stream/rules"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
            .mount(&server)
            .await;
        // 响应迟迟不来，模拟一直挂起的长连接
        Mock::given(method("GET"))
            .and(path("/2/tweets/search/stream"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("{\"id\":1}\n")
                    .set_delay(Duration::from_secs(30)),
            )
            .mount(&server)
            .await;

        let mut config = test_config(&server);
        config.stream_tweet.duration = "1s".to_string();
        let sink = Arc::new(MemorySink::default());
        let service = StreamService::with_parts(Arc::new(config), api(), sink.clone());

        let outcome = service.run().await;
        assert!(matches!(outcome, Outcome::DeadlineReached));
        assert!(sink.errors().is_empty());
    }

    #[tokio::test]
    async fn test_user_pass_logs_lookup_and_posts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/2/users/by"))
            .and(query_param("usernames", "a,ghost"))
            .and(query_param("user.fields", "username"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"id": "1", "username": "a"}],
                "errors": [{"resource_id": "2", "title": "Not Found Error"}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/2/users/1/tweets"))
            .and(query_param("tweet.fields", "text"))
            .and(query_param("max_results", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"id": "100", "text": "hello"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = test_config(&server);
        config.user_tweet.users = vec!["a".to_string(), "ghost".to_string()];
        let sink = Arc::new(MemorySink::default());
        let service = UserService::with_parts(Arc::new(config), api(), sink.clone());

        let outcome = service.run().await;
        assert!(matches!(outcome, Outcome::Completed));

        assert_eq!(sink.data_of("users_id"), vec![json!({"1": {"id": "1", "username": "a"}})]);
        assert_eq!(
            sink.data_of("error_data"),
            vec![json!({"2": {"resource_id": "2", "title": "Not Found Error"}})]
        );
        let posts = sink.data_of("tweets_response");
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0]["data"][0]["text"], "hello");
    }

    #[tokio::test]
    async fn test_user_pass_reads_usernames_file_when_list_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/2/users/by"))
            .and(query_param("usernames", "jack,dorsey"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("usernames.txt");
        std::fs::write(&file, "jack\n\n  dorsey  \n").unwrap();

        let mut config = test_config(&server);
        config.user_tweet.users.clear();
        config.filepaths.usernames_file = file;
        let sink = Arc::new(MemorySink::default());
        let service = UserService::with_parts(Arc::new(config), api(), sink.clone());

        service.run_once().await.unwrap();
        assert_eq!(sink.data_of("users_id"), vec![json!({})]);
    }

    #[tokio::test]
    async fn test_user_pass_missing_usernames_file_is_fatal() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        let mut config = test_config(&server);
        config.user_tweet.users.clear();
        config.filepaths.usernames_file = dir.path().join("absent.txt");
        let sink = Arc::new(MemorySink::default());
        let service = UserService::with_parts(Arc::new(config), api(), sink.clone());

        let outcome = service.run().await;
        assert!(matches!(outcome, Outcome::Fatal(TwitterError::Config(_))));
    }

    #[test]
    fn test_new_opens_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.filepaths.user_tweet_log_file = dir.path().join("logs").join("user.log");

        let service = UserService::new(Arc::new(config), "token");
        assert!(service.is_ok());
        assert!(dir.path().join("logs").join("user.log").exists());
    }

    #[test]
    fn test_new_reports_unwritable_log_as_sink_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, b"x").unwrap();
        let mut config = Config::default();
        config.filepaths.user_tweet_log_file = blocker.join("user.log");

        let result = UserService::new(Arc::new(config), "token");
        assert!(matches!(result, Err(TwitterError::Sink(_))));
    }

    #[tokio::test]
    async fn test_unit_construction_failure_does_not_stop_sibling() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/2/tweets/search/stream/rules"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/2/tweets/search/stream/rules"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/2/tweets/search/stream"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("{\"data\":{\"id\":\"1\",\"text\":\"hi\"}}\r\n"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, b"x").unwrap();
        let mut config = test_config(&server);
        config.filepaths.stream_tweet_log_file = dir.path().join("stream.log");
        config.filepaths.user_tweet_log_file = blocker.join("user.log");

        let config = Arc::new(config);
        let token: Arc<str> = Arc::from("token");
        let user = tokio::spawn(Unit::User.run(config.clone(), token.clone()));
        let stream = tokio::spawn(Unit::Stream.run(config, token));

        let user = user.await.unwrap();
        let stream = stream.await.unwrap();
        assert!(matches!(user, Outcome::Fatal(TwitterError::Sink(_))));
        assert!(matches!(stream, Outcome::Completed));

        let written = std::fs::read_to_string(dir.path().join("stream.log")).unwrap();
        assert!(written.contains("\"hi\""));
    }
}
