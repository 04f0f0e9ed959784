use std::path::Path;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::features::github::GitHubClient;
use crate::features::image::Renderer;
use crate::features::template::Template;

/// 聚合的应用共享状态，启动后只读
#[derive(Clone)]
pub struct AppState {
    pub github: Arc<GitHubClient>,
    /// 启动时解析一次的模板
    pub template: Arc<Template>,
    pub renderer: Arc<Renderer>,
}

impl AppState {
    pub fn new(github: GitHubClient, template: Template, renderer: Renderer) -> Self {
        Self {
            github: Arc::new(github),
            template: Arc::new(template),
            renderer: Arc::new(renderer),
        }
    }

    /// 按配置构建全部组件。模板不合法时直接失败，不等到第一个请求。
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let github = GitHubClient::new(&config.github)?;

        let template = match config.render.template_path.as_deref() {
            Some(path) => {
                tracing::info!("加载自定义模板: {}", path);
                Template::from_file(Path::new(path))
            }
            None => Template::bundled(),
        }
        .map_err(|e| AppError::Internal(format!("模板加载失败: {e}")))?;

        let missing = template.missing_placeholders();
        if !missing.is_empty() {
            tracing::warn!("模板缺少占位元素: {:?}，对应字段将不会出现在图片中", missing);
        }

        let renderer = Renderer::new(&config.render, &config.github.user_agent)?;
        tracing::info!(
            "渲染器就绪: {}x{} {:?}",
            config.render.width,
            config.render.height,
            renderer.output_format()
        );

        Ok(Self::new(github, template, renderer))
    }
}
