use axum::{Router, extract::Request, routing::get};
use tower_http::trace::TraceLayer;

use crate::features::{health::health_check, og::create_og_router};
use crate::request_id::{request_id_of, with_request_id};
use crate::state::AppState;

/// 组装完整路由：`/health` + 其余路径全部交给 OG 处理器
pub fn build_router(state: AppState) -> Router {
    let router = Router::<AppState>::new()
        .route("/health", get(health_check))
        .merge(create_og_router())
        .with_state(state)
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &Request| {
                tracing::info_span!(
                    "http",
                    method = %req.method(),
                    uri = %req.uri(),
                    request_id = %request_id_of(req),
                )
            }),
        );
    // request-id 层在外，TraceLayer 建 span 时 id 已就绪
    with_request_id(router)
}
