use percent_encoding::percent_decode_str;

use crate::error::AppError;

/// 请求路径解析出的仓库标识
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryIdentity {
    pub owner: String,
    pub name: String,
    /// 追加在标题后的子路径（来自 `path` 查询参数）
    pub sub_path: Option<String>,
}

impl RepositoryIdentity {
    pub fn new(owner: impl Into<String>, name: impl Into<String>, sub_path: Option<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            sub_path: sub_path.filter(|p| !p.is_empty()),
        }
    }

    /// 取路径中前两个非空段作为 owner / repo，其余段忽略。段内容做百分号解码。
    pub fn from_path(path: &str, sub_path: Option<String>) -> Result<Self, AppError> {
        let mut segments = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(percent_decode);
        match (segments.next(), segments.next()) {
            (Some(owner), Some(name)) if !owner.is_empty() && !name.is_empty() => {
                Ok(Self::new(owner, name, sub_path))
            }
            _ => Err(AppError::InvalidIdentity(path.to_string())),
        }
    }

    /// `{owner}/{name}` 或 `{owner}/{name}/{sub_path}`
    pub fn title(&self) -> String {
        match &self.sub_path {
            Some(p) => format!("{}/{}/{}", self.owner, self.name, p),
            None => format!("{}/{}", self.owner, self.name),
        }
    }
}

fn percent_decode(segment: &str) -> String {
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn takes_first_two_segments() {
        let id = RepositoryIdentity::from_path("/acme/widget", None).expect("identity");
        assert_eq!((id.owner.as_str(), id.name.as_str()), ("acme", "widget"));
        assert_eq!(id.title(), "acme/widget");

        let id = RepositoryIdentity::from_path("/acme/widget/tree/main", None).expect("identity");
        assert_eq!(id.title(), "acme/widget");

        let id = RepositoryIdentity::from_path("//acme//widget/", None).expect("identity");
        assert_eq!(id.title(), "acme/widget");
    }

    #[test]
    fn missing_owner_or_repo_is_rejected() {
        for path in ["/", "", "/acme", "/acme/", "//"] {
            assert!(
                matches!(
                    RepositoryIdentity::from_path(path, None),
                    Err(AppError::InvalidIdentity(_))
                ),
                "path {path:?} should be rejected"
            );
        }
    }

    #[test]
    fn segments_are_percent_decoded() {
        let id = RepositoryIdentity::from_path("/my%2Dorg/re%20po%zz", None).expect("identity");
        assert_eq!(id.owner, "my-org");
        assert_eq!(id.name, "re po%zz");

        // 非 UTF-8 字节按替换字符处理
        let id = RepositoryIdentity::from_path("/acme/%E4%BD%A0%FF", None).expect("identity");
        assert_eq!(id.name, "你\u{FFFD}");
    }

    #[test]
    fn sub_path_extends_title() {
        let id = RepositoryIdentity::from_path("/acme/widget", Some("src/main.go".into()))
            .expect("identity");
        assert_eq!(id.title(), "acme/widget/src/main.go");

        let id = RepositoryIdentity::from_path("/acme/widget", Some(String::new())).expect("identity");
        assert_eq!(id.sub_path, None);
        assert_eq!(id.title(), "acme/widget");
    }
}
