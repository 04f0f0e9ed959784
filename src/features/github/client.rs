use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use thiserror::Error;

use crate::config::GitHubConfig;
use crate::error::AppError;

use super::models::{RepoDetails, RepositoryMetadata};

const GITHUB_ACCEPT: &str = "application/vnd.github+json";
const API_VERSION_HEADER: &str = "x-github-api-version";

/// 元数据获取失败
#[derive(Error, Debug)]
pub enum FetchError {
    /// 非 2xx 响应
    #[error("GitHub 返回 {status} {status_text}: {body}")]
    Status {
        status: u16,
        status_text: String,
        body: String,
    },
    /// 请求发送失败或响应体读取失败
    #[error("网络错误: {0}")]
    Transport(String),
    /// 2xx 响应但 JSON 不完整/不合法
    #[error("响应解析失败: {0}")]
    Decode(String),
}

/// GitHub REST API 客户端（只读、单次请求、无重试）
#[derive(Clone)]
pub struct GitHubClient {
    client: reqwest::Client,
    api_base_url: String,
    headers: HeaderMap,
}

impl GitHubClient {
    pub fn new(cfg: &GitHubConfig) -> Result<Self, AppError> {
        let mut builder = reqwest::Client::builder().user_agent(cfg.user_agent.clone());
        if let Some(timeout) = cfg.timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| AppError::Internal(format!("初始化 HTTP Client 失败: {e}")))?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(GITHUB_ACCEPT));
        headers.insert(
            HeaderName::from_static(API_VERSION_HEADER),
            HeaderValue::from_str(&cfg.api_version)
                .map_err(|e| AppError::Internal(format!("非法的 api_version: {e}")))?,
        );
        if let Some(token) = cfg.bearer_token() {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| AppError::Internal(format!("非法的 GitHub token: {e}")))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        Ok(Self {
            client,
            api_base_url: cfg.api_base_url.trim_end_matches('/').to_string(),
            headers,
        })
    }

    /// 构造 `{base}/repos/{owner}/{repo}`，owner/repo 作为独立路径段进行百分号编码。
    fn repo_url(&self, owner: &str, repo: &str) -> Result<reqwest::Url, FetchError> {
        let mut url = reqwest::Url::parse(&self.api_base_url)
            .map_err(|e| FetchError::Transport(format!("非法的 API 基地址: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| FetchError::Transport("API 基地址不能作为路径前缀".to_string()))?
            .pop_if_empty()
            .extend(["repos", owner, repo]);
        Ok(url)
    }

    /// 获取仓库元数据。
    ///
    /// 任何非 2xx 都返回 [`FetchError::Status`]，携带状态码、状态文本与原始响应体。
    pub async fn fetch_repo(
        &self,
        owner: &str,
        repo: &str,
    ) -> Result<RepositoryMetadata, FetchError> {
        let url = self.repo_url(owner, repo)?;
        let resp = self
            .client
            .get(url)
            .headers(self.headers.clone())
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
                body,
            });
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        let details: RepoDetails =
            serde_json::from_slice(&bytes).map_err(|e| FetchError::Decode(e.to_string()))?;
        Ok(details.into())
    }
}
