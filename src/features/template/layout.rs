use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// 标题最多占用的显示宽度（列）。内置模板中标题从 x=40 开始，需停在头像（x=496）之前。
pub const TITLE_MAX_COLUMNS: usize = 26;
/// 描述每行的显示宽度（列）
pub const DESCRIPTION_MAX_COLUMNS: usize = 60;
/// 描述最多行数，超出部分在最后一行以省略号结尾
pub const DESCRIPTION_MAX_LINES: usize = 3;
/// 多行文本的行距（`<tspan dy>`）
pub const LINE_HEIGHT: &str = "1.35em";

fn char_width(ch: char) -> usize {
    UnicodeWidthChar::width(ch).unwrap_or(0).max(1)
}

/// 超出宽度时截断并追加 `…`（省略号按 1 列计）
pub fn truncate_with_ellipsis(text: &str, max_width: usize) -> String {
    if max_width == 0 {
        return String::new();
    }
    if text.width() <= max_width {
        return text.to_string();
    }
    let target = max_width - 1;
    let mut acc = String::new();
    let mut w = 0usize;
    for ch in text.chars() {
        let ch_w = char_width(ch);
        if w + ch_w > target {
            break;
        }
        acc.push(ch);
        w += ch_w;
    }
    acc.truncate(acc.trim_end().len());
    acc.push('…');
    acc
}

/// 按显示宽度折行，优先在空白处断开；单词本身超宽（或 CJK 连续文本）时按字符断开。
///
/// 超过 `max_lines` 的内容被丢弃，最后一行以 `…` 结尾。空白会被折叠为单个空格。
pub fn wrap_words(text: &str, max_width: usize, max_lines: usize) -> Vec<String> {
    if max_width == 0 || max_lines == 0 {
        return Vec::new();
    }

    let mut lines = Vec::<String>::new();
    let mut current = String::new();
    let mut current_w = 0usize;
    let mut overflow = false;

    'words: for word in text.split_whitespace() {
        let word_w = word.width();
        let sep = usize::from(!current.is_empty());
        if current_w + sep + word_w <= max_width {
            if sep == 1 {
                current.push(' ');
            }
            current.push_str(word);
            current_w += sep + word_w;
            continue;
        }

        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
            current_w = 0;
            if lines.len() == max_lines {
                overflow = true;
                break;
            }
        }

        for ch in word.chars() {
            let ch_w = char_width(ch);
            if current_w + ch_w > max_width && !current.is_empty() {
                lines.push(std::mem::take(&mut current));
                current_w = 0;
                if lines.len() == max_lines {
                    overflow = true;
                    break 'words;
                }
            }
            current.push(ch);
            current_w += ch_w;
        }
    }

    if !overflow && !current.is_empty() {
        lines.push(current);
    }
    if overflow {
        if let Some(last) = lines.last_mut() {
            let mut cut = truncate_with_ellipsis(last, max_width.saturating_sub(1));
            if !cut.ends_with('…') {
                cut.push('…');
            }
            *last = cut;
        }
    }
    lines
}
