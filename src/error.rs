use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::features::github::FetchError;
use crate::features::image::RenderError;

/// 应用统一错误类型
///
/// 所有错误都在最外层 handler 统一处理：对外只返回固定的纯文本，
/// 上游状态码、渲染细节等仅写入日志。
#[derive(Error, Debug)]
pub enum AppError {
    /// 路径中缺少 owner 或 repo
    #[error("请求路径缺少 owner 或 repo: {0}")]
    InvalidIdentity(String),

    /// GitHub 返回非 2xx（不存在、私有、限流等不做区分）
    #[error("仓库元数据获取失败: {0}")]
    RepoNotFound(FetchError),

    /// 图像渲染错误
    #[error("图像渲染错误: {0}")]
    Render(#[from] RenderError),

    /// 内部服务器错误
    #[error("内部错误: {0}")]
    Internal(String),
}

/// 只有上游明确给出非 2xx 才算“仓库不存在”；连不上或响应体无法解析属于服务端故障
impl From<FetchError> for AppError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::Status { .. } => AppError::RepoNotFound(e),
            FetchError::Transport(_) | FetchError::Decode(_) => {
                AppError::Internal(format!("仓库元数据获取失败: {e}"))
            }
        }
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidIdentity(_) | AppError::RepoNotFound(_) => StatusCode::NOT_FOUND,
            AppError::Render(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 对外响应体（稳定契约，不含任何内部细节）
    pub fn public_message(&self) -> &'static str {
        match self {
            AppError::InvalidIdentity(_) => "Not found",
            AppError::RepoNotFound(_) => "Repo not found",
            AppError::Render(_) => "Render failed",
            AppError::Internal(_) => "Internal error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // request_id 由外层 http span 携带
        if status.is_server_error() {
            tracing::error!(error = %self, "请求处理失败");
        } else {
            tracing::info!(error = %self, "请求被拒绝");
        }

        let mut res = (status, self.public_message()).into_response();
        res.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        res
    }
}
