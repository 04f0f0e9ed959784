use std::ops::Range;
use std::path::Path;

use roxmltree::Node;
use thiserror::Error;

use super::context::RenderContext;
use super::layout::LINE_HEIGHT;
use super::svg::{self, escape_xml};

/// 内置 OG 模板（600x315 设计尺寸）
pub const BUNDLED_TEMPLATE: &str = include_str!("../../../resources/templates/og.svg");

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("读取模板失败 {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("模板格式非法: {0}")]
    Xml(#[from] roxmltree::Error),
}

/// 模板中可识别的占位元素（按 `id` 属性定位）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    Title,
    Description,
    Tokens,
    Issues,
    Stars,
    Forks,
    Avatar,
}

impl Placeholder {
    pub const ALL: [Placeholder; 7] = [
        Placeholder::Title,
        Placeholder::Description,
        Placeholder::Tokens,
        Placeholder::Issues,
        Placeholder::Stars,
        Placeholder::Forks,
        Placeholder::Avatar,
    ];

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.id() == id)
    }

    pub fn id(self) -> &'static str {
        match self {
            Placeholder::Title => "title",
            Placeholder::Description => "description",
            Placeholder::Tokens => "tokens",
            Placeholder::Issues => "issues",
            Placeholder::Stars => "stars",
            Placeholder::Forks => "forks",
            Placeholder::Avatar => "avatar",
        }
    }
}

/// 一处待改写的源文本区间
#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
    /// 替换元素的内部内容；`line_x` 为元素的 `x` 属性，多行文本的每个 `<tspan>` 都从这里起笔
    Content {
        field: Placeholder,
        range: Range<usize>,
        line_x: Option<String>,
    },
    /// 自闭合元素：把末尾 `/>` 展开为 `>内容</name>`
    Expand {
        field: Placeholder,
        element: String,
        range: Range<usize>,
        line_x: Option<String>,
    },
    /// 覆盖一个已存在的图片地址属性
    SetAttr { attr: String, range: Range<usize> },
    /// 插入 `href` 属性（元素原本没有图片地址属性时）
    InsertHref { at: usize },
}

impl Slot {
    fn range(&self) -> Range<usize> {
        match self {
            Slot::Content { range, .. } | Slot::Expand { range, .. } | Slot::SetAttr { range, .. } => {
                range.clone()
            }
            Slot::InsertHref { at } => *at..*at,
        }
    }
}

/// 已完成绑定的文档（序列化文本）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document(String);

impl Document {
    pub fn new(markup: impl Into<String>) -> Self {
        Self(markup.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// 解析并校验过的模板，改写位置在加载时一次算好。
#[derive(Debug, Clone)]
pub struct Template {
    source: String,
    slots: Vec<Slot>,
}

impl Template {
    /// 解析模板：必须是合法的 XML 文档。
    ///
    /// 同一 id 出现多次时每一处都会被改写；位于另一个文本占位元素内部的占位元素
    /// 会随外层内容一起被替换掉，不单独记录。
    pub fn parse(source: impl Into<String>) -> Result<Self, TemplateError> {
        let source = source.into();
        let slots = collect_slots(&source)?;
        Ok(Self { source, slots })
    }

    pub fn bundled() -> Result<Self, TemplateError> {
        Self::parse(BUNDLED_TEMPLATE)
    }

    pub fn from_file(path: &Path) -> Result<Self, TemplateError> {
        let source = std::fs::read_to_string(path).map_err(|source| TemplateError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(source)
    }

    /// 模板里没有出现的占位元素（只用于启动期告警）
    pub fn missing_placeholders(&self) -> Vec<&'static str> {
        Placeholder::ALL
            .into_iter()
            .filter(|p| {
                !self.slots.iter().any(|s| match s {
                    Slot::Content { field, .. } | Slot::Expand { field, .. } => field == p,
                    Slot::SetAttr { .. } | Slot::InsertHref { .. } => *p == Placeholder::Avatar,
                })
            })
            .map(Placeholder::id)
            .collect()
    }

    /// 把上下文代入模板。纯函数：相同模板与上下文得到逐字节相同的文档。
    pub fn bind(&self, ctx: &RenderContext) -> Document {
        let mut out = String::with_capacity(self.source.len() + 256);
        let mut cursor = 0;
        for slot in &self.slots {
            let range = slot.range();
            out.push_str(&self.source[cursor..range.start]);
            match slot {
                Slot::Content { field, line_x, .. } => {
                    write_text(&mut out, ctx, *field, line_x.as_deref());
                }
                Slot::Expand {
                    field,
                    element,
                    line_x,
                    ..
                } => {
                    out.push('>');
                    write_text(&mut out, ctx, *field, line_x.as_deref());
                    out.push_str("</");
                    out.push_str(element);
                    out.push('>');
                }
                Slot::SetAttr { attr, .. } => {
                    out.push_str(attr);
                    out.push_str("=\"");
                    out.push_str(&escape_xml(&ctx.avatar_url));
                    out.push('"');
                }
                Slot::InsertHref { .. } => {
                    out.push_str(" href=\"");
                    out.push_str(&escape_xml(&ctx.avatar_url));
                    out.push('"');
                }
            }
            cursor = range.end;
        }
        out.push_str(&self.source[cursor..]);
        Document(out)
    }
}

/// 多行时每行一个 `<tspan x dy>`；元素没有 `x` 属性时退化为单行
fn write_text(out: &mut String, ctx: &RenderContext, field: Placeholder, line_x: Option<&str>) {
    let lines = ctx.lines_for(field);
    match line_x {
        Some(x) if lines.len() > 1 => {
            let x = escape_xml(x);
            for (i, line) in lines.iter().enumerate() {
                out.push_str("<tspan x=\"");
                out.push_str(&x);
                out.push_str("\" dy=\"");
                out.push_str(if i == 0 { "0" } else { LINE_HEIGHT });
                out.push_str("\">");
                out.push_str(&escape_xml(line));
                out.push_str("</tspan>");
            }
        }
        _ => out.push_str(&escape_xml(&lines.join(" "))),
    }
}

fn text_placeholder(node: Node<'_, '_>) -> Option<Placeholder> {
    node.attribute("id")
        .and_then(Placeholder::from_id)
        .filter(|p| *p != Placeholder::Avatar)
}

fn collect_slots(src: &str) -> Result<Vec<Slot>, TemplateError> {
    let doc = svg::parse(src)?;
    let mut slots = Vec::new();

    for node in doc.descendants().filter(Node::is_element) {
        // 文本占位元素内部的一切都会被整体替换
        if node.ancestors().skip(1).any(|a| text_placeholder(a).is_some()) {
            continue;
        }
        let Some(field) = node.attribute("id").and_then(Placeholder::from_id) else {
            continue;
        };

        if field == Placeholder::Avatar {
            let mut has_href = false;
            for attr in node.attributes().filter(|a| a.name() == "href") {
                has_href = true;
                slots.push(Slot::SetAttr {
                    attr: svg::attr_qname(src, &attr).to_string(),
                    range: attr.range(),
                });
            }
            if !has_href {
                slots.push(Slot::InsertHref {
                    at: svg::tag_name_range(src, node).end,
                });
            }
            continue;
        }

        let line_x = node.attribute("x").map(str::to_string);
        match svg::inner_range(src, node) {
            Some(range) => slots.push(Slot::Content {
                field,
                range,
                line_x,
            }),
            None => {
                let end = svg::start_tag_end(src, node);
                slots.push(Slot::Expand {
                    field,
                    element: src[svg::tag_name_range(src, node)].to_string(),
                    range: end - 2..end,
                    line_x,
                });
            }
        }
    }

    slots.sort_by_key(|s| s.range().start);
    Ok(slots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::github::RepositoryMetadata;
    use crate::features::og::RepositoryIdentity;

    fn ctx(sub_path: Option<&str>, tokens: Option<&str>) -> RenderContext {
        RenderContext::new(
            &RepositoryIdentity::new("acme", "widget", sub_path.map(str::to_string)),
            tokens.map(str::to_string),
            RepositoryMetadata {
                description: Some("Widgets & <gadgets>".to_string()),
                avatar_url: "https://avatars.example/u/1?v=4&s=64".to_string(),
                open_issues_count: 3,
                star_count: 1000,
                fork_count: 42,
            },
        )
    }

    const MINI: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink">
<image id="avatar" href="placeholder.png" width="10" height="10"/>
<text id="title">owner/repo</text>
<text id="description"><tspan>placeholder</tspan></text>
<text id="tokens">0</text>
<text id="issues">0</text><text id="stars">0</text><text id="forks">0</text>
<text id="footer">keep me</text>
</svg>"#;

    #[test]
    fn substitutes_every_placeholder() {
        let tpl = Template::parse(MINI).expect("parse");
        assert!(tpl.missing_placeholders().is_empty());
        let doc = tpl.bind(&ctx(None, Some("42")));
        let out = doc.as_str();

        assert!(out.contains(r#"<text id="title">acme/widget</text>"#));
        assert!(out.contains(r#"<text id="description">Widgets &amp; &lt;gadgets&gt;</text>"#));
        assert!(out.contains(r#"<text id="tokens">42</text>"#));
        assert!(out.contains(r#"<text id="issues">3</text>"#));
        assert!(out.contains(r#"<text id="stars">1000</text>"#));
        assert!(out.contains(r#"<text id="forks">42</text>"#));
        assert!(out.contains(r#"href="https://avatars.example/u/1?v=4&amp;s=64""#));
        assert!(out.contains(r#"<text id="footer">keep me</text>"#));
        assert!(!out.contains("placeholder"));
    }

    #[test]
    fn sub_path_is_appended_to_title() {
        let tpl = Template::parse(MINI).expect("parse");
        let doc = tpl.bind(&ctx(Some("src/main.go"), None));
        assert!(doc.as_str().contains(r#"<text id="title">acme/widget/src/main.go</text>"#));
    }

    #[test]
    fn absent_tokens_render_empty() {
        let tpl = Template::parse(MINI).expect("parse");
        let doc = tpl.bind(&ctx(None, None));
        assert!(doc.as_str().contains(r#"<text id="tokens"></text>"#));
    }

    #[test]
    fn binding_is_deterministic() {
        let tpl = Template::parse(MINI).expect("parse");
        let c = ctx(Some("lib"), Some("7"));
        assert_eq!(tpl.bind(&c), tpl.bind(&c));
    }

    #[test]
    fn self_closing_placeholder_is_expanded() {
        let tpl = Template::parse(r#"<svg><text id="tokens" x="1"/></svg>"#).expect("parse");
        let doc = tpl.bind(&ctx(None, Some("9k")));
        assert_eq!(doc.as_str(), r#"<svg><text id="tokens" x="1">9k</text></svg>"#);
    }

    #[test]
    fn avatar_without_href_gets_one_and_xlink_is_overwritten() {
        let tpl = Template::parse(
            r#"<svg xmlns:xlink="http://www.w3.org/1999/xlink"><image id="avatar"/><image id="avatar" xlink:href="x"/></svg>"#,
        )
        .expect("parse");
        let doc = tpl.bind(&ctx(None, None));
        assert_eq!(
            doc.as_str(),
            r#"<svg xmlns:xlink="http://www.w3.org/1999/xlink"><image href="https://avatars.example/u/1?v=4&amp;s=64" id="avatar"/><image id="avatar" xlink:href="https://avatars.example/u/1?v=4&amp;s=64"/></svg>"#
        );
    }

    #[test]
    fn long_text_is_wrapped_and_ellipsized() {
        let tpl = Template::parse(
            r#"<svg><text id="title" x="40">t</text><text id="description" x="40" y="118">d</text></svg>"#,
        )
        .expect("parse");
        let ctx = RenderContext::new(
            &RepositoryIdentity::new("some-organization", "an-extremely-long-repository-name", None),
            None,
            RepositoryMetadata {
                description: Some("A very long description that keeps going ".repeat(8)),
                avatar_url: String::new(),
                open_issues_count: 0,
                star_count: 0,
                fork_count: 0,
            },
        );
        let doc = tpl.bind(&ctx);
        let out = doc.as_str();

        assert!(out.contains(r#"<text id="title" x="40">some-organization/an-extr…</text>"#), "{out}");
        assert_eq!(out.matches("<tspan ").count(), 3, "{out}");
        assert!(out.contains(r#"<text id="description" x="40" y="118"><tspan x="40" dy="0">A very long"#));
        assert!(out.contains(r#"<tspan x="40" dy="1.35em">"#));
        assert!(out.contains("…</tspan></text>"));
        // 输出仍是合法文档
        assert!(svg::parse(out).is_ok());
    }

    #[test]
    fn doctype_and_comments_are_preserved() {
        let src = r#"<?xml version="1.0"?><!DOCTYPE svg [<!ENTITY x "]">]><svg><!-- <text id="stars">no</text> --><text id="stars">0</text></svg>"#;
        let tpl = Template::parse(src).expect("parse");
        let doc = tpl.bind(&ctx(None, None));
        assert_eq!(
            doc.as_str(),
            r#"<?xml version="1.0"?><!DOCTYPE svg [<!ENTITY x "]">]><svg><!-- <text id="stars">no</text> --><text id="stars">1000</text></svg>"#
        );
    }

    #[test]
    fn duplicate_ids_are_all_rewritten() {
        let tpl = Template::parse(r#"<svg><text id="stars">a</text><text id="stars">b</text></svg>"#)
            .expect("parse");
        let doc = tpl.bind(&ctx(None, None));
        assert_eq!(
            doc.as_str(),
            r#"<svg><text id="stars">1000</text><text id="stars">1000</text></svg>"#
        );
    }

    #[test]
    fn nested_placeholder_is_replaced_with_outer_content() {
        let tpl = Template::parse(
            r#"<svg><g id="title"><text id="stars">s</text></g><text id="forks">f</text></svg>"#,
        )
        .expect("parse");
        let doc = tpl.bind(&ctx(None, None));
        assert_eq!(
            doc.as_str(),
            r#"<svg><g id="title">acme/widget</g><text id="forks">42</text></svg>"#
        );
    }

    #[test]
    fn reports_missing_placeholders() {
        let tpl = Template::parse(r#"<svg><text id="title">t</text></svg>"#).expect("parse");
        assert_eq!(
            tpl.missing_placeholders(),
            vec!["description", "tokens", "issues", "stars", "forks", "avatar"]
        );
    }

    #[test]
    fn rejects_malformed_templates() {
        for src in ["<svg><text></svg>", "<svg>", "</svg>", "<svg x=1/>", "<svg><image xlink:href=\"a\"/></svg>"] {
            assert!(
                matches!(Template::parse(src), Err(TemplateError::Xml(_))),
                "{src:?} should be rejected"
            );
        }
    }

    #[test]
    fn bundled_template_is_complete() {
        let tpl = Template::bundled().expect("bundled template parses");
        assert!(tpl.missing_placeholders().is_empty());
    }
}
