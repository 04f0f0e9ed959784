use serde::{Deserialize, Serialize};

/// `GET /repos/{owner}/{repo}` 响应中实际用到的字段，其余字段在反序列化时丢弃。
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RepoDetails {
    #[serde(default)]
    pub description: Option<String>,
    pub stargazers_count: u64,
    pub forks_count: u64,
    pub open_issues_count: u64,
    pub owner: RepoOwner,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RepoOwner {
    pub avatar_url: String,
}

/// 渲染所需的仓库元数据
///
/// 只能由一次成功且完整解析的响应构造，不存在"部分填充"的实例。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryMetadata {
    pub description: Option<String>,
    pub avatar_url: String,
    pub open_issues_count: u64,
    pub star_count: u64,
    pub fork_count: u64,
}

impl From<RepoDetails> for RepositoryMetadata {
    fn from(d: RepoDetails) -> Self {
        Self {
            description: d.description,
            avatar_url: d.owner.avatar_url,
            open_issues_count: d.open_issues_count,
            star_count: d.stargazers_count,
            fork_count: d.forks_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_consumed_fields_and_ignores_the_rest() {
        let body = r#"{
            "id": 1,
            "full_name": "acme/widget",
            "description": null,
            "archived": false,
            "topics": ["a", "b"],
            "stargazers_count": 1000,
            "forks_count": 7,
            "open_issues_count": 0,
            "owner": { "login": "acme", "id": 9, "avatar_url": "https://avatars.example/u/9" }
        }"#;
        let details: RepoDetails = serde_json::from_str(body).expect("parse repo details");
        let meta = RepositoryMetadata::from(details);
        assert_eq!(
            meta,
            RepositoryMetadata {
                description: None,
                avatar_url: "https://avatars.example/u/9".into(),
                open_issues_count: 0,
                star_count: 1000,
                fork_count: 7,
            }
        );
    }

    #[test]
    fn missing_owner_is_rejected() {
        let body = r#"{"stargazers_count":1,"forks_count":1,"open_issues_count":1}"#;
        assert!(serde_json::from_str::<RepoDetails>(body).is_err());
    }
}
