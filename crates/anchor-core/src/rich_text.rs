//! Structured rich text for the note editor and its Markdown form.
//!
//! Notes are stored as Markdown. The editor works on `RichText` blocks with
//! styled spans. Supported subset:
//! - Headings (`#` to `######`)
//! - Paragraphs (soft line breaks become spaces)
//! - Bullet lists (`-`, `*`, `+`) and ordered lists (`1.`, `1)`)
//! - Fenced code blocks with an optional language
//! - Inline `**bold**`, `*italic*`, `` `code` `` and backslash escapes
//!
//! Conversion is a semantic round trip: parsing the Markdown produced by
//! `to_markdown` yields the same `RichText`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanStyle {
    pub bold: bool,
    pub italic: bool,
    pub code: bool,
}

impl SpanStyle {
    pub fn plain() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub text: String,
    pub style: SpanStyle,
}

impl Span {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::styled(text, SpanStyle::plain())
    }

    pub fn styled(text: impl Into<String>, style: SpanStyle) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Heading { level: u8, spans: Vec<Span> },
    Paragraph { spans: Vec<Span> },
    BulletList { items: Vec<Vec<Span>> },
    OrderedList { items: Vec<Vec<Span>> },
    CodeBlock { lang: Option<String>, code: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RichText {
    pub blocks: Vec<Block>,
}

impl RichText {
    pub fn new(blocks: Vec<Block>) -> Self {
        Self { blocks }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn from_markdown(markdown: &str) -> Self {
        from_markdown(markdown)
    }

    pub fn to_markdown(&self) -> String {
        to_markdown(self)
    }

    /// Unstyled text, one line per heading, paragraph, item or code line.
    pub fn plain_text(&self) -> String {
        let mut lines = Vec::new();
        for block in &self.blocks {
            match block {
                Block::Heading { spans, .. } | Block::Paragraph { spans } => {
                    lines.push(spans_text(spans));
                }
                Block::BulletList { items } | Block::OrderedList { items } => {
                    lines.extend(items.iter().map(|item| spans_text(item)));
                }
                Block::CodeBlock { code, .. } => lines.push(code.clone()),
            }
        }
        lines.join("\n")
    }
}

fn spans_text(spans: &[Span]) -> String {
    spans.iter().map(|s| s.text.as_str()).collect()
}

// ============================================================================
// Markdown → RichText
// ============================================================================

enum ListKind {
    Bullet,
    Ordered,
}

/// Block under construction while scanning lines.
enum Pending {
    None,
    Paragraph(Vec<String>),
    List(ListKind, Vec<String>),
}

pub fn from_markdown(markdown: &str) -> RichText {
    let mut blocks = Vec::new();
    let mut pending = Pending::None;
    let mut lines = markdown.lines();

    while let Some(raw) = lines.next() {
        let line = raw.trim();

        if let Some(lang) = line.strip_prefix("```") {
            flush(&mut blocks, &mut pending);
            let mut code = Vec::new();
            for inner in lines.by_ref() {
                if inner.trim() == "```" {
                    break;
                }
                code.push(inner);
            }
            let lang = lang.trim();
            blocks.push(Block::CodeBlock {
                lang: (!lang.is_empty()).then(|| lang.to_string()),
                code: code.join("\n"),
            });
            continue;
        }

        if line.is_empty() {
            flush(&mut blocks, &mut pending);
            continue;
        }

        if let Some((level, text)) = heading(line) {
            flush(&mut blocks, &mut pending);
            blocks.push(Block::Heading {
                level,
                spans: parse_inline(text),
            });
            continue;
        }

        if let Some(item) = bullet_item(line) {
            match &mut pending {
                Pending::List(ListKind::Bullet, items) => items.push(item.to_string()),
                _ => {
                    flush(&mut blocks, &mut pending);
                    pending = Pending::List(ListKind::Bullet, vec![item.to_string()]);
                }
            }
            continue;
        }

        if let Some(item) = ordered_item(line) {
            match &mut pending {
                Pending::List(ListKind::Ordered, items) => items.push(item.to_string()),
                _ => {
                    flush(&mut blocks, &mut pending);
                    pending = Pending::List(ListKind::Ordered, vec![item.to_string()]);
                }
            }
            continue;
        }

        match &mut pending {
            Pending::Paragraph(parts) => parts.push(line.to_string()),
            // Lazy continuation of the last item.
            Pending::List(_, items) => {
                if let Some(last) = items.last_mut() {
                    last.push(' ');
                    last.push_str(line);
                }
            }
            Pending::None => pending = Pending::Paragraph(vec![line.to_string()]),
        }
    }

    flush(&mut blocks, &mut pending);
    RichText { blocks }
}

fn flush(blocks: &mut Vec<Block>, pending: &mut Pending) {
    match std::mem::replace(pending, Pending::None) {
        Pending::None => {}
        Pending::Paragraph(parts) => blocks.push(Block::Paragraph {
            spans: parse_inline(&parts.join(" ")),
        }),
        Pending::List(kind, items) => {
            let items = items.iter().map(|item| parse_inline(item)).collect();
            blocks.push(match kind {
                ListKind::Bullet => Block::BulletList { items },
                ListKind::Ordered => Block::OrderedList { items },
            });
        }
    }
}

fn heading(line: &str) -> Option<(u8, &str)> {
    let level = line.bytes().take_while(|&b| b == b'#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &line[level..];
    if rest.is_empty() {
        return Some((level as u8, ""));
    }
    rest.strip_prefix(' ').map(|text| (level as u8, text.trim()))
}

fn bullet_item(line: &str) -> Option<&str> {
    ["- ", "* ", "+ "]
        .iter()
        .find_map(|marker| line.strip_prefix(marker))
        .map(str::trim)
}

fn ordered_item(line: &str) -> Option<&str> {
    let digits = line.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 || digits > 9 {
        return None;
    }
    let rest = &line[digits..];
    rest.strip_prefix(". ")
        .or_else(|| rest.strip_prefix(") "))
        .map(str::trim)
}

fn is_escapable(c: char) -> bool {
    matches!(
        c,
        '\\' | '`' | '*' | '_' | '#' | '-' | '+' | '.' | '!' | '[' | ']' | '(' | ')'
    )
}

fn parse_inline(text: &str) -> Vec<Span> {
    let chars: Vec<char> = text.chars().collect();
    let mut spans: Vec<Span> = Vec::new();
    let mut buf = String::new();
    let mut style = SpanStyle::plain();
    let mut i = 0;

    let emit = |buf: &mut String, style: SpanStyle, spans: &mut Vec<Span>| {
        if !buf.is_empty() {
            push_span(spans, Span::styled(std::mem::take(buf), style));
        }
    };

    while i < chars.len() {
        let c = chars[i];

        if c == '\\' && chars.get(i + 1).is_some_and(|&n| is_escapable(n)) {
            buf.push(chars[i + 1]);
            i += 2;
            continue;
        }

        if c == '`' {
            if let Some(close) = chars[i + 1..].iter().position(|&n| n == '`') {
                emit(&mut buf, style, &mut spans);
                let code: String = chars[i + 1..i + 1 + close].iter().collect();
                if !code.is_empty() {
                    push_span(&mut spans, Span::styled(code, SpanStyle { code: true, ..style }));
                }
                i += close + 2;
                continue;
            }
        }

        if c == '*' || c == '_' {
            let double = chars.get(i + 1) == Some(&c);
            let width = if double { 2 } else { 1 };
            let active = if double { style.bold } else { style.italic };
            let toggles = if active {
                true
            } else {
                opens_emphasis(&chars, i, width)
            };
            if toggles {
                emit(&mut buf, style, &mut spans);
                if double {
                    style.bold = !style.bold;
                } else {
                    style.italic = !style.italic;
                }
                i += width;
                continue;
            }
        }

        buf.push(c);
        i += 1;
    }

    emit(&mut buf, style, &mut spans);
    spans
}

/// Whether the emphasis run of `width` markers at `i` can open: it must be
/// followed by non-whitespace, have a matching run later on, and (for `_`)
/// not sit inside a word.
fn opens_emphasis(chars: &[char], i: usize, width: usize) -> bool {
    let marker = chars[i];
    let after = i + width;
    if !chars.get(after).is_some_and(|c| !c.is_whitespace()) {
        return false;
    }
    if marker == '_' && i > 0 && chars[i - 1].is_alphanumeric() {
        return false;
    }
    chars[after + 1..]
        .windows(width)
        .any(|w| w.iter().all(|&c| c == marker))
}

/// Append `span`, merging it into the previous one when styles match.
fn push_span(spans: &mut Vec<Span>, span: Span) {
    match spans.last_mut() {
        Some(last) if last.style == span.style => last.text.push_str(&span.text),
        _ => spans.push(span),
    }
}

// ============================================================================
// RichText → Markdown
// ============================================================================

pub fn to_markdown(text: &RichText) -> String {
    text.blocks
        .iter()
        .map(render_block)
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_block(block: &Block) -> String {
    match block {
        Block::Heading { level, spans } => {
            let level = (*level).clamp(1, 6) as usize;
            format!("{} {}", "#".repeat(level), render_inline(spans))
                .trim_end()
                .to_string()
        }
        Block::Paragraph { spans } => guard_block_start(render_inline(spans)),
        Block::BulletList { items } => items
            .iter()
            .map(|item| format!("- {}", guard_block_start(render_inline(item))))
            .collect::<Vec<_>>()
            .join("\n"),
        Block::OrderedList { items } => items
            .iter()
            .enumerate()
            .map(|(n, item)| format!("{}. {}", n + 1, guard_block_start(render_inline(item))))
            .collect::<Vec<_>>()
            .join("\n"),
        Block::CodeBlock { lang, code } => {
            format!("```{}\n{}\n```", lang.as_deref().unwrap_or(""), code)
        }
    }
}

/// Escape text that would otherwise be read as a heading or list marker.
fn guard_block_start(rendered: String) -> String {
    if rendered.starts_with('#') || rendered.starts_with("- ") || rendered.starts_with("+ ") {
        return format!("\\{}", rendered);
    }
    let digits = rendered.bytes().take_while(u8::is_ascii_digit).count();
    if digits > 0 && matches!(rendered.as_bytes().get(digits), Some(b'.') | Some(b')')) {
        return format!("{}\\{}", &rendered[..digits], &rendered[digits..]);
    }
    rendered
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '`' | '*' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[derive(Clone, Copy, PartialEq)]
enum Marker {
    Bold,
    Italic,
}

impl Marker {
    fn as_str(self) -> &'static str {
        match self {
            Marker::Bold => "**",
            Marker::Italic => "*",
        }
    }
}

fn render_inline(spans: &[Span]) -> String {
    let mut out = String::new();
    let mut open: Vec<Marker> = Vec::new();

    for span in spans {
        let want_bold = span.style.bold;
        let want_italic = span.style.italic;
        let has_bold = open.contains(&Marker::Bold);
        let has_italic = open.contains(&Marker::Italic);

        // Turning anything off closes everything so nesting stays valid.
        if (has_bold && !want_bold) || (has_italic && !want_italic) {
            while let Some(marker) = open.pop() {
                out.push_str(marker.as_str());
            }
        }
        if want_bold && !open.contains(&Marker::Bold) {
            out.push_str(Marker::Bold.as_str());
            open.push(Marker::Bold);
        }
        if want_italic && !open.contains(&Marker::Italic) {
            out.push_str(Marker::Italic.as_str());
            open.push(Marker::Italic);
        }

        if span.style.code {
            out.push('`');
            out.push_str(&span.text);
            out.push('`');
        } else {
            out.push_str(&escape(&span.text));
        }
    }

    while let Some(marker) = open.pop() {
        out.push_str(marker.as_str());
    }
    out
}
