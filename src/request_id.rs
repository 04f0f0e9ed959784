//! `X-Request-Id` 处理
//!
//! 生成与回写交给 tower-http 的 request-id 中间件；这里只负责 id 的格式：
//! 客户端传入的值合法时沿用，否则丢弃并生成 `og_` 前缀的新 id。

use axum::{Router, extract::Request, http::HeaderValue};
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// 新 id 形如 `og_<32 位十六进制>`
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeOgRequestId;

impl MakeRequestId for MakeOgRequestId {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&format!("og_{}", Uuid::new_v4().simple()))
            .ok()
            .map(RequestId::new)
    }
}

fn is_valid_request_id(v: &str) -> bool {
    !v.is_empty()
        && v.len() <= 128
        && v.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.')
}

/// 规整客户端传入的 id：去掉首尾空白，不合法则移除，交由 [`MakeOgRequestId`] 重新生成
pub async fn strip_invalid_request_id(mut req: Request) -> Request {
    let cleaned = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| is_valid_request_id(v))
        .and_then(|v| HeaderValue::from_str(v).ok());

    match cleaned {
        Some(value) => {
            req.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
        None => {
            req.headers_mut().remove(REQUEST_ID_HEADER);
        }
    }
    req
}

/// 给路由套上 request-id 处理：规整 -> 生成（写入请求扩展）-> 回写到响应头。
///
/// 需要读取 id 的层（如 `TraceLayer`）应在调用本函数之前添加。
pub fn with_request_id(router: Router) -> Router {
    router
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeOgRequestId))
        .layer(axum::middleware::map_request(strip_invalid_request_id))
}

/// 从请求扩展中读取 id；未经过 [`with_request_id`] 时为空串
pub fn request_id_of<B>(req: &axum::http::Request<B>) -> &str {
    req.extensions()
        .get::<RequestId>()
        .and_then(|id| id.header_value().to_str().ok())
        .unwrap_or_default()
}
