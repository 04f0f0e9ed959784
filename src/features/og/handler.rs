use axum::{
    Router,
    extract::{Query, State},
    http::{HeaderValue, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use std::time::Instant;

use crate::{
    error::AppError,
    features::{
        github::FetchError,
        image::RenderedImage,
        template::{Document, RenderContext},
    },
    state::AppState,
};

use super::identity::RepositoryIdentity;

/// OG 图片查询参数；同名参数重复出现时取第一个值
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OgQuery {
    /// 追加到标题后的子路径
    pub path: Option<String>,
    /// token 数，原样透传
    pub tokens: Option<String>,
}

impl OgQuery {
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut q = Self::default();
        for (k, v) in pairs {
            match k.as_str() {
                "path" if q.path.is_none() => q.path = Some(v),
                "tokens" if q.tokens.is_none() => q.tokens = Some(v),
                _ => {}
            }
        }
        q
    }
}

/// 获取元数据并绑定模板，得到待渲染的文档（远程图片尚未内联）
pub async fn bind_document(
    state: &AppState,
    identity: &RepositoryIdentity,
    tokens: Option<String>,
) -> Result<(RenderContext, Document), AppError> {
    let metadata = match state.github.fetch_repo(&identity.owner, &identity.name).await {
        Ok(m) => {
            tracing::info!(
                owner = %identity.owner,
                repo = %identity.name,
                description = m.description.as_deref().unwrap_or(""),
                avatar_url = %m.avatar_url,
                issues = m.open_issues_count,
                stars = m.star_count,
                forks = m.fork_count,
                "仓库元数据获取成功"
            );
            m
        }
        Err(e) => {
            match &e {
                FetchError::Status {
                    status,
                    status_text,
                    body,
                } => tracing::warn!(
                    owner = %identity.owner,
                    repo = %identity.name,
                    status,
                    status_text = %status_text,
                    body = %body,
                    "GitHub 返回非 2xx 响应"
                ),
                other => tracing::warn!(
                    owner = %identity.owner,
                    repo = %identity.name,
                    error = %other,
                    "仓库元数据获取失败"
                ),
            }
            return Err(e.into());
        }
    };

    let ctx = RenderContext::new(identity, tokens, metadata);
    let doc = state.template.bind(&ctx);
    Ok((ctx, doc))
}

/// 单次请求的完整流水线：获取元数据 -> 绑定模板 -> 渲染。
///
/// 元数据获取失败直接短路，不会进入渲染。
pub async fn generate_og_image(
    state: &AppState,
    identity: &RepositoryIdentity,
    tokens: Option<String>,
) -> Result<RenderedImage, AppError> {
    let t0 = Instant::now();
    let (ctx, doc) = bind_document(state, identity, tokens).await?;
    let bind_duration = t0.elapsed();

    let image = state.renderer.render_async(doc).await?;

    tracing::info!(
        title = %ctx.title,
        bytes = image.bytes.len(),
        "OG 图片生成完成，元数据耗时: {}ms, 总耗时: {}ms",
        bind_duration.as_millis(),
        t0.elapsed().as_millis()
    );
    Ok(image)
}

/// `/{owner}/{repo}` 入口。不限制请求方法。
pub async fn render_og_image(
    State(state): State<AppState>,
    uri: Uri,
    query: Option<Query<Vec<(String, String)>>>,
) -> Result<Response, AppError> {
    let q = OgQuery::from_pairs(query.map(|Query(pairs)| pairs).unwrap_or_default());
    let identity = RepositoryIdentity::from_path(uri.path(), q.path)?;
    let image = generate_og_image(&state, &identity, q.tokens).await?;

    let mut res = (StatusCode::OK, image.bytes).into_response();
    res.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(image.content_type),
    );
    Ok(res)
}

/// OG 路由：所有未被其它路由命中的路径都按 `/{owner}/{repo}` 处理
pub fn create_og_router() -> Router<AppState> {
    Router::new().fallback(render_og_image)
}
