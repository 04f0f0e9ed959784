use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "ServerConfig::default_host")]
    pub host: String,
    /// 监听端口
    #[serde(default = "ServerConfig::default_port")]
    pub port: u16,
}

impl ServerConfig {
    fn default_host() -> String {
        "0.0.0.0".to_string()
    }
    fn default_port() -> u16 {
        8787
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别（未设置 RUST_LOG 时生效）
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
    /// 日志格式：full | compact
    #[serde(default = "LoggingConfig::default_format")]
    pub format: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "repo_og_image=info,tower_http=info".to_string()
    }
    fn default_format() -> String {
        "full".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            format: Self::default_format(),
        }
    }
}

/// GitHub API 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// API 基地址（测试时可指向本地 mock）
    #[serde(default = "GitHubConfig::default_api_base_url")]
    pub api_base_url: String,
    /// User-Agent（GitHub 要求必须携带）
    #[serde(default = "GitHubConfig::default_user_agent")]
    pub user_agent: String,
    /// `X-GitHub-Api-Version` 头
    #[serde(default = "GitHubConfig::default_api_version")]
    pub api_version: String,
    /// 可选 Bearer Token；留空则匿名访问
    #[serde(default)]
    pub token: Option<String>,
    /// 请求超时（秒，0 表示沿用 reqwest 默认，即不设超时）
    #[serde(default)]
    pub timeout_secs: u64,
}

impl GitHubConfig {
    fn default_api_base_url() -> String {
        "https://api.github.com".to_string()
    }
    fn default_user_agent() -> String {
        "github-og-image".to_string()
    }
    fn default_api_version() -> String {
        "2022-11-28".to_string()
    }

    /// 非空 token（空字符串视为未配置）
    pub fn bearer_token(&self) -> Option<&str> {
        self.token.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    /// 获取请求超时
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base_url: Self::default_api_base_url(),
            user_agent: Self::default_user_agent(),
            api_version: Self::default_api_version(),
            token: None,
            timeout_secs: 0,
        }
    }
}

/// 输出图片格式（每个进程固定一种）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Png,
    #[serde(alias = "jpg")]
    Jpeg,
    Webp,
}

impl OutputFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Webp => "image/webp",
        }
    }
}

/// 图片渲染配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// 输出宽度（像素）。模板按 600x315 设计，这里取两倍以保证缩放后的清晰度
    #[serde(default = "RenderConfig::default_width")]
    pub width: u32,
    /// 输出高度（像素）
    #[serde(default = "RenderConfig::default_height")]
    pub height: u32,
    /// 输出格式
    #[serde(default)]
    pub format: OutputFormat,
    /// JPEG 质量（1-100，仅 format=jpeg 时有效）
    #[serde(default = "RenderConfig::default_jpeg_quality")]
    pub jpeg_quality: u8,
    /// 是否优先速度渲染（OptimizeSpeed），提升栅格化性能，可能略降画质
    #[serde(default)]
    pub optimize_speed: bool,
    /// 模板未指定字体时使用的默认字体族
    #[serde(default = "RenderConfig::default_font_family")]
    pub font_family: String,
    /// 额外字体目录（*.ttf / *.otf），与系统字体一起加载
    #[serde(default = "RenderConfig::default_fonts_dir")]
    pub fonts_dir: String,
    /// 自定义模板路径；留空使用内置模板
    #[serde(default)]
    pub template_path: Option<String>,
    /// 渲染前是否下载并内联远程图片（头像）
    #[serde(default = "RenderConfig::default_fetch_remote_images")]
    pub fetch_remote_images: bool,
    /// 远程图片下载超时（秒）
    #[serde(default = "RenderConfig::default_remote_image_timeout")]
    pub remote_image_timeout_secs: u64,
}

impl RenderConfig {
    fn default_width() -> u32 {
        1200
    }
    fn default_height() -> u32 {
        630
    }
    fn default_jpeg_quality() -> u8 {
        85
    }
    fn default_font_family() -> String {
        "DejaVu Sans".to_string()
    }
    fn default_fonts_dir() -> String {
        "resources/fonts".to_string()
    }
    fn default_fetch_remote_images() -> bool {
        true
    }
    fn default_remote_image_timeout() -> u64 {
        10
    }

    /// 获取远程图片下载超时
    pub fn remote_image_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_image_timeout_secs.max(1))
    }

    /// 获取字体目录路径
    pub fn fonts_path(&self) -> PathBuf {
        PathBuf::from(&self.fonts_dir)
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: Self::default_width(),
            height: Self::default_height(),
            format: OutputFormat::default(),
            jpeg_quality: Self::default_jpeg_quality(),
            optimize_speed: false,
            font_family: Self::default_font_family(),
            fonts_dir: Self::default_fonts_dir(),
            template_path: None,
            fetch_remote_images: Self::default_fetch_remote_images(),
            remote_image_timeout_secs: Self::default_remote_image_timeout(),
        }
    }
}

/// 优雅退出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// 优雅退出超时时间（秒）
    #[serde(default = "ShutdownConfig::default_timeout")]
    pub timeout_secs: u64,
}

impl ShutdownConfig {
    fn default_timeout() -> u64 {
        30
    }

    /// 获取优雅退出超时时间
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout_secs: Self::default_timeout(),
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// GitHub API 配置
    #[serde(default)]
    pub github: GitHubConfig,
    /// 图片渲染配置
    #[serde(default)]
    pub render: RenderConfig,
    /// 优雅退出配置
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

impl AppConfig {
    /// 从配置文件加载配置，支持环境变量覆盖
    ///
    /// 配置文件可缺省；环境变量示例：`APP_SERVER__PORT=8080`、`APP_GITHUB__TOKEN=...`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path();

        let builder = ConfigBuilder::builder()
            .add_source(File::from(config_path).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = builder.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// 获取配置文件路径（`APP_CONFIG_PATH` 优先）
    pub fn get_config_path() -> PathBuf {
        std::env::var_os("APP_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// 启动期校验：提前拒绝无法渲染的配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.render.width == 0 || self.render.height == 0 {
            return Err(ConfigError::Message(format!(
                "render.width/height 必须大于 0（当前 {}x{}）",
                self.render.width, self.render.height
            )));
        }
        if !(1..=100).contains(&self.render.jpeg_quality) {
            return Err(ConfigError::Message(format!(
                "render.jpeg_quality 必须在 1-100 之间（当前 {}）",
                self.render.jpeg_quality
            )));
        }
        Ok(())
    }

    /// 获取服务器监听地址
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_render_at_double_display_resolution() {
        let cfg = AppConfig::default();
        assert_eq!((cfg.render.width, cfg.render.height), (1200, 630));
        assert_eq!(cfg.render.format, OutputFormat::Png);
        assert!(cfg.github.bearer_token().is_none());
        assert!(cfg.github.timeout().is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let cfg: AppConfig = ConfigBuilder::builder()
            .add_source(File::from_str(
                "[server]\nport = 9000\n[render]\nformat = \"jpg\"\n",
                config::FileFormat::Toml,
            ))
            .build()
            .and_then(|c| c.try_deserialize())
            .expect("deserialize config");

        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.render.format, OutputFormat::Jpeg);
        assert_eq!(cfg.render.format.content_type(), "image/jpeg");
        assert_eq!(cfg.github.api_base_url, "https://api.github.com");
    }

    #[test]
    fn blank_token_is_treated_as_anonymous() {
        let gh = GitHubConfig {
            token: Some("   ".to_string()),
            ..GitHubConfig::default()
        };
        assert!(gh.bearer_token().is_none());

        let gh = GitHubConfig {
            token: Some("ghp_abc".to_string()),
            ..GitHubConfig::default()
        };
        assert_eq!(gh.bearer_token(), Some("ghp_abc"));
    }

    #[test]
    fn validate_rejects_zero_size_and_bad_quality() {
        let mut cfg = AppConfig::default();
        cfg.render.width = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.render.jpeg_quality = 0;
        assert!(cfg.validate().is_err());
    }
}
