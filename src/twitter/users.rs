//! 用户查询与时间线拉取

use reqwest::StatusCode;

use super::client::ApiClient;
use super::error::{TwitterError, TwitterResult};
use super::types::{FieldSelection, PostsResponse, UserLookup, UserLookupResponse};

/// URL 模板中的占位符
pub const TEMPLATE_PLACEHOLDER: &str = "{}";

/// 用 `value` 替换模板中的第一个 `{}`
pub fn fill_template(template: &str, value: &str) -> TwitterResult<String> {
    if !template.contains(TEMPLATE_PLACEHOLDER) {
        return Err(TwitterError::Config(format!(
            "URL 模板缺少占位符 {}: {}",
            TEMPLATE_PLACEHOLDER, template
        )));
    }
    Ok(template.replacen(TEMPLATE_PLACEHOLDER, value, 1))
}

/// 用户数据拉取器
///
/// 不做重试，也不处理分页
pub struct UserFetcher {
    api: ApiClient,
    users_url: String,
    user_posts_url: String,
}

impl UserFetcher {
    /// `users_url` 中的 `{}` 替换为逗号分隔的用户名，
    /// `user_posts_url` 中的 `{}` 替换为用户 id
    pub fn new(api: ApiClient, users_url: impl Into<String>, user_posts_url: impl Into<String>) -> Self {
        Self {
            api,
            users_url: users_url.into(),
            user_posts_url: user_posts_url.into(),
        }
    }

    /// 批量解析用户名，按 id 拆分为成功与失败两组
    pub async fn resolve_users(
        &self,
        usernames: &[String],
        fields: &FieldSelection,
    ) -> TwitterResult<UserLookup> {
        let joined = usernames
            .iter()
            .map(|name| urlencoding::encode(name).into_owned())
            .collect::<Vec<_>>()
            .join(",");
        let url = fill_template(&self.users_url, &joined)?;

        let mut query = Vec::new();
        if !fields.is_empty() {
            query.push(("user.fields", fields.to_param()));
        }

        let response: UserLookupResponse = self.api.get_json(&url, &query, StatusCode::OK).await?;
        let lookup = UserLookup::from(response);

        tracing::info!(
            requested = usernames.len(),
            resolved = lookup.successes.len(),
            failed = lookup.failures.len(),
            "用户名解析完成"
        );
        Ok(lookup)
    }

    /// 拉取单个用户最近的推文，只取第一页
    pub async fn fetch_user_posts(
        &self,
        user_id: &str,
        fields: &FieldSelection,
        max_results: u32,
    ) -> TwitterResult<PostsResponse> {
        let url = fill_template(&self.user_posts_url, &urlencoding::encode(user_id))?;

        let mut query = Vec::new();
        if !fields.is_empty() {
            query.push(("tweet.fields", fields.to_param()));
        }
        query.push(("max_results", max_results.to_string()));

        let posts: PostsResponse = self.api.get_json(&url, &query, StatusCode::OK).await?;
        tracing::debug!(user_id = %user_id, count = posts.data.len(), "已拉取用户推文");
        Ok(posts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Client;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(server: &MockServer) -> UserFetcher {
        UserFetcher::new(
            ApiClient::new(Client::new(), "token"),
            format!("{}/2/users/by?usernames={{}}", server.uri()),
            format!("{}/2/users/{{}}/tweets", server.uri()),
        )
    }

    #[test]
    fn test_fill_template() {
        assert_eq!(
            fill_template("https://x/2/users/{}/tweets", "44196397").unwrap(),
            "https://x/2/users/44196397/tweets"
        );
        assert!(matches!(
            fill_template("https://x/2/users", "1"),
            Err(TwitterError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_users_partitions_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/2/users/by"))
            .and(query_param("usernames", "a,ghost"))
            .and(query_param("user.fields", "id,username"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"id": "1", "username": "a"}],
                "errors": [{"resource_id": "2"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let fields = FieldSelection::parse("username,id");
        let lookup = fetcher(&server)
            .resolve_users(&["a".to_string(), "ghost".to_string()], &fields)
            .await
            .unwrap();

        assert_eq!(lookup.successes.keys().collect::<Vec<_>>(), vec!["1"]);
        assert_eq!(lookup.failures.keys().collect::<Vec<_>>(), vec!["2"]);
    }

    #[tokio::test]
    async fn test_resolve_users_non_200_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/2/users/by"))
            .respond_with(ResponseTemplate::new(503).set_body_string("over capacity"))
            .mount(&server)
            .await;

        let err = fetcher(&server)
            .resolve_users(&["a".to_string()], &FieldSelection::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TwitterError::Api { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_fetch_user_posts_sends_fields_and_page_size() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/2/users/1/tweets"))
            .and(query_param("tweet.fields", "created_at,text"))
            .and(query_param("max_results", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"id": "100", "text": "hello"}],
                "meta": {"result_count": 1, "next_token": "abc"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let fields = FieldSelection::parse("text,created_at");
        let posts = fetcher(&server)
            .fetch_user_posts("1", &fields, 5)
            .await
            .unwrap();

        assert_eq!(posts.data.len(), 1);
        assert_eq!(posts.data[0]["text"], "hello");
    }
}
