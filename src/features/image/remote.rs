use std::collections::HashMap;
use std::io::Cursor;
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::STANDARD as base64_engine};
use image::ImageFormat;

use crate::features::template::Document;
use crate::features::template::svg::{self, escape_xml};

use super::renderer::RenderError;

/// 单张远程图片的大小上限
const MAX_REMOTE_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// 渲染前把 `<image>` 的 http(s) 地址下载并内联为 Data URI。
///
/// usvg 不做网络访问，头像等远程图片必须预先取回。下载失败时保留原地址，
/// 渲染器随后会跳过这张图片，而不是让整个请求失败。
#[derive(Clone)]
pub struct RemoteImageFetcher {
    client: reqwest::Client,
}

struct RemoteHref {
    attr: String,
    url: String,
    span: std::ops::Range<usize>,
}

impl RemoteImageFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, RenderError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent.to_string())
            .timeout(timeout)
            .build()
            .map_err(|e| RenderError::Setup(format!("初始化图片下载 Client 失败: {e}")))?;
        Ok(Self { client })
    }

    pub async fn inline_remote_images(&self, doc: Document) -> Document {
        let hrefs = remote_image_hrefs(doc.as_str());
        if hrefs.is_empty() {
            return doc;
        }

        let mut resolved: HashMap<&str, Option<String>> = HashMap::new();
        for href in &hrefs {
            if resolved.contains_key(href.url.as_str()) {
                continue;
            }
            let data_uri = match self.fetch_data_uri(&href.url).await {
                Ok(uri) => Some(uri),
                Err(e) => {
                    tracing::warn!(url = %href.url, error = %e, "远程图片下载失败，跳过内联");
                    None
                }
            };
            resolved.insert(href.url.as_str(), data_uri);
        }

        let src = doc.as_str();
        let mut out = String::with_capacity(src.len());
        let mut cursor = 0;
        for href in &hrefs {
            let Some(Some(uri)) = resolved.get(href.url.as_str()) else {
                continue;
            };
            out.push_str(&src[cursor..href.span.start]);
            out.push_str(&href.attr);
            out.push_str("=\"");
            out.push_str(&escape_xml(uri));
            out.push('"');
            cursor = href.span.end;
        }
        out.push_str(&src[cursor..]);
        Document::new(out)
    }

    async fn fetch_data_uri(&self, url: &str) -> Result<String, RenderError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RenderError::RemoteImage(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(RenderError::RemoteImage(format!("HTTP {}", resp.status())));
        }
        if resp
            .content_length()
            .is_some_and(|len| len as usize > MAX_REMOTE_IMAGE_BYTES)
        {
            return Err(RenderError::RemoteImage("图片过大".to_string()));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| RenderError::RemoteImage(e.to_string()))?;
        if bytes.len() > MAX_REMOTE_IMAGE_BYTES {
            return Err(RenderError::RemoteImage("图片过大".to_string()));
        }
        to_data_uri(&bytes)
    }
}

/// PNG/JPEG/GIF 原样内联，其它格式（WebP 等）先解码再转成 PNG。
pub(crate) fn to_data_uri(bytes: &[u8]) -> Result<String, RenderError> {
    let format = image::guess_format(bytes)
        .map_err(|e| RenderError::RemoteImage(format!("无法识别的图片格式: {e}")))?;
    let (mime, payload) = match format {
        ImageFormat::Png => ("image/png", None),
        ImageFormat::Jpeg => ("image/jpeg", None),
        ImageFormat::Gif => ("image/gif", None),
        other => {
            let img = image::load_from_memory_with_format(bytes, other)
                .map_err(|e| RenderError::RemoteImage(format!("图片解码失败: {e}")))?;
            let mut out = Vec::new();
            img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
                .map_err(|e| RenderError::RemoteImage(format!("图片转码失败: {e}")))?;
            ("image/png", Some(out))
        }
    };
    let b64 = base64_engine.encode(payload.as_deref().unwrap_or(bytes));
    Ok(format!("data:{mime};base64,{b64}"))
}

fn remote_image_hrefs(src: &str) -> Vec<RemoteHref> {
    // 文档若无法解析，交给 usvg 报告错误
    let Ok(doc) = svg::parse(src) else {
        return Vec::new();
    };
    let mut hrefs: Vec<RemoteHref> = doc
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "image")
        .flat_map(|n| n.attributes())
        .filter(|a| a.name() == "href")
        .filter_map(|a| {
            let url = a.value().trim();
            (url.starts_with("http://") || url.starts_with("https://")).then(|| RemoteHref {
                attr: svg::attr_qname(src, &a).to_string(),
                url: url.to_string(),
                span: a.range(),
            })
        })
        .collect();
    hrefs.sort_by_key(|h| h.span.start);
    hrefs
}
