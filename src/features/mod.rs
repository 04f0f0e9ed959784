/// GitHub 仓库元数据
pub mod github;

/// 健康检查
pub mod health;

/// SVG 栅格化与编码
pub mod image;

/// OG 图片请求入口
pub mod og;

/// 模板占位符绑定
pub mod template;
