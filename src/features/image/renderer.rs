use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use image::ColorType;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use resvg::usvg::{self, Options as UsvgOptions, fontdb};
use resvg::{
    render,
    tiny_skia::{Pixmap, Transform},
};
use thiserror::Error;
use tokio::task::spawn_blocking;

use crate::config::{OutputFormat, RenderConfig};
use crate::features::template::Document;

use super::remote::RemoteImageFetcher;

/// 渲染失败（对外统一为 500，细节只写日志）
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("SVG 解析失败: {0}")]
    Parse(String),
    #[error("无法创建 {0}x{1} 的画布")]
    Pixmap(u32, u32),
    #[error("图片编码失败: {0}")]
    Encode(String),
    #[error("阻塞渲染任务执行失败: {0}")]
    Join(String),
    #[error("渲染器初始化失败: {0}")]
    Setup(String),
    #[error("远程图片获取失败: {0}")]
    RemoteImage(String),
}

/// 渲染结果
#[derive(Debug, Clone)]
pub struct RenderedImage {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub width: u32,
    pub height: u32,
}

// 全局字体数据库单例（首次初始化时的字体目录生效）
static GLOBAL_FONT_DB: OnceLock<Arc<fontdb::Database>> = OnceLock::new();

/// 初始化全局字体数据库：系统字体 + 自定义字体目录
fn init_global_font_db(fonts_dir: &Path) -> Arc<fontdb::Database> {
    let mut font_db = fontdb::Database::new();
    font_db.load_system_fonts();

    if fonts_dir.exists() {
        if let Ok(entries) = fs::read_dir(fonts_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_file()
                    && (path.extension() == Some("ttf".as_ref())
                        || path.extension() == Some("otf".as_ref()))
                {
                    if let Err(e) = font_db.load_font_file(&path) {
                        tracing::error!("加载字体文件失败 '{}': {}", path.display(), e);
                    }
                }
            }
        }
    }

    tracing::info!("字体数据库加载完成，共 {} 个字体", font_db.len());
    Arc::new(font_db)
}

/// 获取全局字体数据库
pub fn get_global_font_db(fonts_dir: &Path) -> Arc<fontdb::Database> {
    GLOBAL_FONT_DB
        .get_or_init(|| init_global_font_db(fonts_dir))
        .clone()
}

/// 文档 -> 固定尺寸栅格图片。配置在进程内固定，不随请求变化。
#[derive(Clone)]
pub struct Renderer {
    font_db: Arc<fontdb::Database>,
    config: RenderConfig,
    /// 相对路径资源（自定义模板引用的本地图片）的基准目录
    resources_dir: Option<PathBuf>,
    remote: Option<RemoteImageFetcher>,
}

impl Renderer {
    pub fn new(config: &RenderConfig, user_agent: &str) -> Result<Self, RenderError> {
        let remote = if config.fetch_remote_images {
            Some(RemoteImageFetcher::new(
                user_agent,
                config.remote_image_timeout(),
            )?)
        } else {
            None
        };
        let resources_dir = config
            .template_path
            .as_deref()
            .and_then(|p| Path::new(p).parent())
            .map(Path::to_path_buf);

        Ok(Self {
            font_db: get_global_font_db(&config.fonts_path()),
            config: config.clone(),
            resources_dir,
            remote,
        })
    }

    pub fn output_format(&self) -> OutputFormat {
        self.config.format
    }

    /// 异步入口：先内联远程图片，再把解析/栅格化/编码放进阻塞线程池。
    pub async fn render_async(&self, doc: Document) -> Result<RenderedImage, RenderError> {
        let doc = match &self.remote {
            Some(remote) => remote.inline_remote_images(doc).await,
            None => doc,
        };
        let this = self.clone();
        spawn_blocking(move || this.render(&doc))
            .await
            .map_err(|e| RenderError::Join(e.to_string()))?
    }

    /// 同步渲染。输出尺寸恒为配置的 width x height，与文档自身尺寸无关。
    pub fn render(&self, doc: &Document) -> Result<RenderedImage, RenderError> {
        let t0 = Instant::now();
        let speed = self.config.optimize_speed;
        let opts = UsvgOptions {
            resources_dir: self.resources_dir.clone(),
            fontdb: self.font_db.clone(),
            font_family: self.config.font_family.clone(),
            font_size: 16.0,
            languages: vec!["en".to_string()],
            shape_rendering: if speed {
                usvg::ShapeRendering::OptimizeSpeed
            } else {
                usvg::ShapeRendering::GeometricPrecision
            },
            text_rendering: if speed {
                usvg::TextRendering::OptimizeSpeed
            } else {
                usvg::TextRendering::OptimizeLegibility
            },
            image_rendering: if speed {
                usvg::ImageRendering::OptimizeSpeed
            } else {
                usvg::ImageRendering::OptimizeQuality
            },
            ..Default::default()
        };

        let tree = usvg::Tree::from_data(doc.as_str().as_bytes(), &opts)
            .map_err(|e| RenderError::Parse(e.to_string()))?;
        let t_parse = t0.elapsed();

        let (width, height) = (self.config.width, self.config.height);
        let mut pixmap = Pixmap::new(width, height).ok_or(RenderError::Pixmap(width, height))?;
        let src = tree.size();
        let transform = Transform::from_scale(
            width as f32 / src.width(),
            height as f32 / src.height(),
        );
        render(&tree, transform, &mut pixmap.as_mut());
        let t_raster = t0.elapsed();

        let bytes = match self.config.format {
            OutputFormat::Png => encode_png(&pixmap, speed)?,
            OutputFormat::Jpeg => encode_jpeg(&pixmap, self.config.jpeg_quality)?,
            OutputFormat::Webp => encode_webp(&pixmap)?,
        };
        let t_encode = t0.elapsed();

        tracing::debug!(
            "渲染内部分段: 解析={:?}, 栅格化={:?}, 编码={:?}, 总计={:?}",
            t_parse,
            t_raster - t_parse,
            t_encode - t_raster,
            t_encode
        );

        Ok(RenderedImage {
            bytes,
            content_type: self.config.format.content_type(),
            width,
            height,
        })
    }
}

/// tiny-skia 的像素是预乘 alpha，PNG/WebP 需要还原为直通 alpha
fn demultiplied_rgba(pixmap: &Pixmap) -> Vec<u8> {
    let mut out = Vec::with_capacity(pixmap.data().len());
    for px in pixmap.pixels() {
        let c = px.demultiply();
        out.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
    }
    out
}

fn encode_png(pixmap: &Pixmap, speed: bool) -> Result<Vec<u8>, RenderError> {
    let (w, h) = (pixmap.width(), pixmap.height());
    let rgba = demultiplied_rgba(pixmap);
    let mut out = Vec::with_capacity(rgba.len() / 4);
    {
        let mut encoder = png::Encoder::new(&mut out, w, h);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        if speed {
            encoder.set_compression(png::Compression::Fast);
            encoder.set_filter(png::FilterType::NoFilter);
        } else {
            encoder.set_compression(png::Compression::Default);
            encoder.set_filter(png::FilterType::Paeth);
        }
        let mut writer = encoder
            .write_header()
            .map_err(|e| RenderError::Encode(format!("PNG write_header error: {e}")))?;
        writer
            .write_image_data(&rgba)
            .map_err(|e| RenderError::Encode(format!("PNG write_image_data error: {e}")))?;
        writer
            .finish()
            .map_err(|e| RenderError::Encode(format!("PNG finish error: {e}")))?;
    }
    Ok(out)
}

fn encode_jpeg(pixmap: &Pixmap, quality: u8) -> Result<Vec<u8>, RenderError> {
    let (w, h) = (pixmap.width(), pixmap.height());
    // JPEG 无透明通道：预乘后的 RGB 恰好等于合成到黑色背景上的结果
    let mut rgb: Vec<u8> = Vec::with_capacity((w as usize) * (h as usize) * 3);
    for px in pixmap.data().chunks_exact(4) {
        rgb.extend_from_slice(&px[..3]);
    }

    let mut out = Vec::new();
    let mut enc = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
    enc.encode(&rgb, w, h, ColorType::Rgb8.into())
        .map_err(|e| RenderError::Encode(format!("JPEG encode error: {e}")))?;
    Ok(out)
}

fn encode_webp(pixmap: &Pixmap) -> Result<Vec<u8>, RenderError> {
    let (w, h) = (pixmap.width(), pixmap.height());
    let rgba = demultiplied_rgba(pixmap);
    let mut out = Vec::new();
    WebPEncoder::new_lossless(&mut out)
        .encode(&rgba, w, h, ColorType::Rgba8.into())
        .map_err(|e| RenderError::Encode(format!("WebP encode error: {e}")))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="600" height="315" viewBox="0 0 600 315"><rect width="600" height="315" fill="#0d1117"/><rect x="0" y="0" width="300" height="315" fill="#ff0000"/></svg>"##;

    fn renderer(format: OutputFormat) -> Renderer {
        let cfg = RenderConfig {
            format,
            fetch_remote_images: false,
            ..RenderConfig::default()
        };
        Renderer::new(&cfg, "test-agent").expect("renderer")
    }

    #[test]
    fn png_has_fixed_output_size() {
        let img = renderer(OutputFormat::Png)
            .render(&Document::new(SVG))
            .expect("render");
        assert_eq!(img.content_type, "image/png");
        let decoded = image::load_from_memory(&img.bytes).expect("decode png");
        assert_eq!((decoded.width(), decoded.height()), (1200, 630));
        // 左半边是红色，说明 600x315 的文档被放大到了整张画布
        let px = decoded.to_rgba8().get_pixel(10, 10).0;
        assert_eq!(px, [255, 0, 0, 255]);
        let px = decoded.to_rgba8().get_pixel(1190, 620).0;
        assert_eq!(px, [0x0d, 0x11, 0x17, 255]);
    }

    #[test]
    fn jpeg_and_webp_are_supported() {
        let jpeg = renderer(OutputFormat::Jpeg)
            .render(&Document::new(SVG))
            .expect("render jpeg");
        assert_eq!(jpeg.content_type, "image/jpeg");
        assert_eq!(
            image::guess_format(&jpeg.bytes).expect("guess"),
            image::ImageFormat::Jpeg
        );

        let webp = renderer(OutputFormat::Webp)
            .render(&Document::new(SVG))
            .expect("render webp");
        assert_eq!(webp.content_type, "image/webp");
        let decoded = image::load_from_memory(&webp.bytes).expect("decode webp");
        assert_eq!((decoded.width(), decoded.height()), (1200, 630));
    }

    #[test]
    fn same_document_renders_identical_bytes() {
        let r = renderer(OutputFormat::Png);
        let a = r.render(&Document::new(SVG)).expect("render a");
        let b = r.render(&Document::new(SVG)).expect("render b");
        assert_eq!(a.bytes, b.bytes);
    }

    #[test]
    fn malformed_document_is_render_error() {
        let err = renderer(OutputFormat::Png)
            .render(&Document::new("<svg><rect></svg>"))
            .expect_err("should fail");
        assert!(matches!(err, RenderError::Parse(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn async_render_matches_sync() {
        let r = renderer(OutputFormat::Png);
        let a = r.render_async(Document::new(SVG)).await.expect("async");
        let b = r.render(&Document::new(SVG)).expect("sync");
        assert_eq!(a.bytes, b.bytes);
    }
}
