use std::borrow::Cow;

use crate::features::github::RepositoryMetadata;
use crate::features::og::RepositoryIdentity;

use super::binder::Placeholder;
use super::layout::{
    DESCRIPTION_MAX_COLUMNS, DESCRIPTION_MAX_LINES, TITLE_MAX_COLUMNS, truncate_with_ellipsis,
    wrap_words,
};

/// 单次请求内、待代入模板的全部取值
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderContext {
    pub title: String,
    pub description: String,
    pub avatar_url: String,
    /// `tokens` 查询参数原样透传，不做任何校验
    pub token_count: Option<String>,
    pub issues: u64,
    pub stars: u64,
    pub forks: u64,
}

impl RenderContext {
    pub fn new(
        identity: &RepositoryIdentity,
        token_count: Option<String>,
        metadata: RepositoryMetadata,
    ) -> Self {
        Self {
            title: identity.title(),
            description: metadata.description.unwrap_or_default(),
            avatar_url: metadata.avatar_url,
            token_count,
            issues: metadata.open_issues_count,
            stars: metadata.star_count,
            forks: metadata.fork_count,
        }
    }

    /// 占位元素对应的文本：整数为十进制纯数字（无千分位），缺省的 token 数为空串。
    /// 标题超出可用宽度时以省略号结尾。
    pub fn text_for(&self, field: Placeholder) -> Cow<'_, str> {
        match field {
            Placeholder::Title => Cow::Owned(truncate_with_ellipsis(&self.title, TITLE_MAX_COLUMNS)),
            Placeholder::Description => Cow::Borrowed(&self.description),
            Placeholder::Tokens => Cow::Borrowed(self.token_count.as_deref().unwrap_or("")),
            Placeholder::Issues => Cow::Owned(self.issues.to_string()),
            Placeholder::Stars => Cow::Owned(self.stars.to_string()),
            Placeholder::Forks => Cow::Owned(self.forks.to_string()),
            Placeholder::Avatar => Cow::Borrowed(&self.avatar_url),
        }
    }

    /// 分行后的文本。只有描述会折行，其余字段恒为一行。
    pub fn lines_for(&self, field: Placeholder) -> Vec<Cow<'_, str>> {
        match field {
            Placeholder::Description => {
                wrap_words(&self.description, DESCRIPTION_MAX_COLUMNS, DESCRIPTION_MAX_LINES)
                    .into_iter()
                    .map(Cow::Owned)
                    .collect()
            }
            other => vec![self.text_for(other)],
        }
    }
}
