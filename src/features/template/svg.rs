//! 基于 roxmltree 的文档辅助函数。
//!
//! 模板和绑定后的文档都交给 roxmltree 解析（同时完成合法性校验），
//! 改写只依赖节点与属性在源文本中的字节区间，源文本本身原样保留。

use std::ops::Range;

use roxmltree::{Attribute, Document, Node, ParsingOptions};

/// 解析文档；允许带内部子集的 DOCTYPE
pub fn parse(src: &str) -> Result<Document<'_>, roxmltree::Error> {
    Document::parse_with_options(
        src,
        ParsingOptions {
            allow_dtd: true,
            ..ParsingOptions::default()
        },
    )
}

/// 属性在源文本里的限定名，保留 `xlink:` 之类的前缀
pub fn attr_qname<'a>(src: &'a str, attr: &Attribute<'_, '_>) -> &'a str {
    &src[attr.range_qname()]
}

/// 元素限定名在源文本中的区间（`<` 之后到第一个空白、`/` 或 `>`）
pub fn tag_name_range(src: &str, node: Node<'_, '_>) -> Range<usize> {
    let start = node.range().start + 1;
    let end = src[start..]
        .find(|c: char| c.is_ascii_whitespace() || c == '/' || c == '>')
        .map_or(src.len(), |i| start + i);
    start..end
}

/// 开始标签结束位置（`>` 之后）。引号内的 `>` 不算。
pub fn start_tag_end(src: &str, node: Node<'_, '_>) -> usize {
    let bytes = src.as_bytes();
    let end = node.range().end;
    let mut quote: Option<u8> = None;
    for i in tag_name_range(src, node).end..end {
        match (quote, bytes[i]) {
            (Some(q), b) if b == q => quote = None,
            (Some(_), _) => {}
            (None, b @ (b'"' | b'\'')) => quote = Some(b),
            (None, b'>') => return i + 1,
            _ => {}
        }
    }
    end
}

/// 元素的内部内容区间；自闭合元素返回 `None`
pub fn inner_range(src: &str, node: Node<'_, '_>) -> Option<Range<usize>> {
    let open_end = start_tag_end(src, node);
    if src[..open_end].ends_with("/>") {
        return None;
    }
    let close_start = src[open_end..node.range().end]
        .rfind("</")
        .map_or(node.range().end, |i| open_end + i);
    Some(open_end..close_start)
}

/// 文本/属性值转义（五个预定义实体）
pub fn escape_xml(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_element<'a, 'input>(doc: &'a Document<'input>, name: &str) -> Node<'a, 'input> {
        doc.descendants()
            .find(|n| n.tag_name().name() == name)
            .expect("element present")
    }

    #[test]
    fn ranges_cover_tag_parts() {
        let src = r#"<svg xmlns:xlink="http://www.w3.org/1999/xlink"><text data-x="a>b" x='1'>hi <tspan>t</tspan></text><image xlink:href = "a.png" /></svg>"#;
        let doc = parse(src).expect("parse");

        let text = first_element(&doc, "text");
        assert_eq!(&src[tag_name_range(src, text)], "text");
        let inner = inner_range(src, text).expect("has content");
        assert_eq!(&src[inner], "hi <tspan>t</tspan>");

        let image = first_element(&doc, "image");
        assert_eq!(inner_range(src, image), None);
        let href = image.attributes().next().expect("href attr");
        assert_eq!(attr_qname(src, &href), "xlink:href");
        assert_eq!(href.value(), "a.png");
    }

    #[test]
    fn doctype_with_bracket_in_entity_value_is_accepted() {
        let src = r#"<!DOCTYPE svg [<!ENTITY x "]">]><svg><!-- <b> --><text>t</text></svg>"#;
        let doc = parse(src).expect("parse");
        let text = first_element(&doc, "text");
        assert_eq!(&src[inner_range(src, text).expect("content")], "t");
    }

    #[test]
    fn escapes_predefined_entities() {
        assert_eq!(escape_xml(r#"<a href="x">&'"#), "&lt;a href=&quot;x&quot;&gt;&amp;&apos;");
    }
}
