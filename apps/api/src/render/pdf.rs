//! PDF layout and serialization.
//!
//! Greedy word-wrap over the block model using the static Helvetica metrics,
//! top-down pagination, then one lopdf content stream per page. Text is
//! written in WinAnsiEncoding, which covers Latin-1 plus typographic quotes,
//! dashes and the bullet glyph.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

use crate::render::font_metrics::{get_metrics, FontStyle, PageConfig};
use crate::render::markdown::{Block, BlockKind, Run};

/// One word made of one or more styled pieces ("**Acme**'s" is two pieces).
type Word = Vec<(FontStyle, String)>;

#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Text {
        x: f32,
        y: f32,
        size: f32,
        segments: Vec<(FontStyle, String)>,
    },
    Rule {
        x1: f32,
        x2: f32,
        y: f32,
    },
}

/// Laid-out pages, each a list of draw operations in page coordinates.
#[derive(Debug, Clone)]
pub struct PageLayout {
    pub pages: Vec<Vec<DrawOp>>,
}

// ────────────────────────────────────────────────────────────────────────────
// Layout
// ────────────────────────────────────────────────────────────────────────────

struct Cursor<'a> {
    config: &'a PageConfig,
    pages: Vec<Vec<DrawOp>>,
    y: f32,
}

impl<'a> Cursor<'a> {
    fn new(config: &'a PageConfig) -> Self {
        Self {
            config,
            pages: vec![Vec::new()],
            y: config.page_height_pt - config.margin_pt,
        }
    }

    fn top(&self) -> f32 {
        self.config.page_height_pt - self.config.margin_pt
    }

    fn at_page_top(&self) -> bool {
        (self.y - self.top()).abs() < f32::EPSILON
    }

    /// Vertical gap before a block; skipped at the top of a page.
    fn gap(&mut self, amount: f32) {
        if !self.at_page_top() {
            self.y -= amount;
        }
    }

    /// Moves to a new page when `height` no longer fits above the bottom margin.
    fn reserve(&mut self, height: f32) {
        if self.y - height < self.config.margin_pt && !self.at_page_top() {
            self.pages.push(Vec::new());
            self.y = self.top();
        }
    }

    fn push(&mut self, op: DrawOp) {
        if let Some(page) = self.pages.last_mut() {
            page.push(op);
        }
    }
}

fn heading_size(level: u8, body: f32) -> f32 {
    match level {
        1 => body * 1.65,
        2 => body * 1.35,
        3 => body * 1.15,
        _ => body,
    }
}

/// Lays out blocks into pages.
pub fn layout_blocks(blocks: &[Block], config: &PageConfig) -> PageLayout {
    let mut cursor = Cursor::new(config);
    let body = config.body_size_pt;
    let left = config.margin_pt;

    for block in blocks {
        match &block.kind {
            BlockKind::Rule => {
                cursor.gap(body * 0.5);
                cursor.reserve(body * 0.5);
                cursor.push(DrawOp::Rule {
                    x1: left,
                    x2: left + config.text_width_pt(),
                    y: cursor.y,
                });
                cursor.y -= body * 0.5;
            }
            BlockKind::Heading(level) => {
                let size = heading_size(*level, body);
                cursor.gap(size * 0.6);
                let words = tokenize(&block.runs, true);
                place_lines(&mut cursor, &words, left, size, None);
            }
            BlockKind::Paragraph => {
                cursor.gap(body * 0.4);
                let indent = block.indent as f32 * config.list_indent_pt;
                let words = tokenize(&block.runs, false);
                place_lines(&mut cursor, &words, left + indent, body, None);
            }
            BlockKind::ListItem { marker, depth } => {
                cursor.gap(body * 0.15);
                let text_x = left + *depth as f32 * config.list_indent_pt;
                let marker_x = text_x - config.list_indent_pt * 0.8;
                let words = tokenize(&block.runs, false);
                place_lines(&mut cursor, &words, text_x, body, Some((marker_x, marker)));
            }
        }
    }

    PageLayout {
        pages: cursor.pages,
    }
}

fn place_lines(
    cursor: &mut Cursor<'_>,
    words: &[Word],
    x: f32,
    size: f32,
    marker: Option<(f32, &String)>,
) {
    let right = cursor.config.margin_pt + cursor.config.text_width_pt();
    let max_width = (right - x).max(size);
    let line_height = size * cursor.config.line_spacing;

    for (i, line) in wrap_words(words, max_width, size).into_iter().enumerate() {
        cursor.reserve(line_height);
        let baseline = cursor.y - size;
        if i == 0 {
            if let Some((marker_x, text)) = marker {
                cursor.push(DrawOp::Text {
                    x: marker_x,
                    y: baseline,
                    size,
                    segments: vec![(FontStyle::Regular, text.clone())],
                });
            }
        }
        cursor.push(DrawOp::Text {
            x,
            y: baseline,
            size,
            segments: join_line(line),
        });
        cursor.y -= line_height;
    }
}

/// Splits runs into words on whitespace, keeping per-piece styles.
fn tokenize(runs: &[Run], force_bold: bool) -> Vec<Word> {
    let mut words = Vec::new();
    let mut current: Word = Vec::new();

    for run in runs {
        let style = if force_bold {
            run.style.with_bold()
        } else {
            run.style
        };
        for ch in run.text.chars() {
            if ch.is_whitespace() {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
                continue;
            }
            match current.last_mut() {
                Some((s, text)) if *s == style => text.push(ch),
                _ => current.push((style, ch.to_string())),
            }
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn word_width(word: &Word, size: f32) -> f32 {
    word.iter()
        .map(|(style, text)| get_metrics(*style).measure_pt(text, size))
        .sum()
}

/// Greedy word-wrap. A word wider than the line gets a line of its own.
pub fn wrap_words(words: &[Word], max_width: f32, size: f32) -> Vec<Vec<Word>> {
    let space = get_metrics(FontStyle::Regular).space_width * size;
    let mut lines: Vec<Vec<Word>> = Vec::new();
    let mut current: Vec<Word> = Vec::new();
    let mut width = 0.0_f32;

    for word in words {
        let w = word_width(word, size);
        if !current.is_empty() && width + space + w > max_width {
            lines.push(std::mem::take(&mut current));
            width = 0.0;
        }
        width += if current.is_empty() { w } else { space + w };
        current.push(word.clone());
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Joins words with single spaces and merges adjacent pieces of equal style.
fn join_line(line: Vec<Word>) -> Vec<(FontStyle, String)> {
    let mut segments: Vec<(FontStyle, String)> = Vec::new();
    for (i, word) in line.into_iter().enumerate() {
        if i > 0 {
            if let Some((_, text)) = segments.last_mut() {
                text.push(' ');
            }
        }
        for (style, text) in word {
            match segments.last_mut() {
                Some((s, existing)) if *s == style => existing.push_str(&text),
                _ => segments.push((style, text)),
            }
        }
    }
    segments
}

// ────────────────────────────────────────────────────────────────────────────
// Serialization
// ────────────────────────────────────────────────────────────────────────────

/// Encodes text as WinAnsiEncoding bytes; unmappable characters become '?'.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            ' '..='~' => c as u8,
            '\u{a0}'..='\u{ff}' => c as u32 as u8,
            '€' => 0x80,
            '…' => 0x85,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            _ => b'?',
        })
        .collect()
}

fn real(v: f32) -> Object {
    Object::Real(v)
}

fn page_operations(ops: &[DrawOp]) -> Vec<Operation> {
    let mut operations = Vec::new();
    for op in ops {
        match op {
            DrawOp::Text {
                x,
                y,
                size,
                segments,
            } => {
                operations.push(Operation::new("BT", vec![]));
                operations.push(Operation::new("Td", vec![real(*x), real(*y)]));
                for (style, text) in segments {
                    operations.push(Operation::new(
                        "Tf",
                        vec![Object::Name(style.resource_name().as_bytes().to_vec()), real(*size)],
                    ));
                    operations.push(Operation::new(
                        "Tj",
                        vec![Object::string_literal(encode_win_ansi(text))],
                    ));
                }
                operations.push(Operation::new("ET", vec![]));
            }
            DrawOp::Rule { x1, x2, y } => {
                operations.push(Operation::new("w", vec![real(0.5)]));
                operations.push(Operation::new("m", vec![real(*x1), real(*y)]));
                operations.push(Operation::new("l", vec![real(*x2), real(*y)]));
                operations.push(Operation::new("S", vec![]));
            }
        }
    }
    operations
}

/// Serializes a page layout into PDF bytes.
pub fn write_pdf(layout: &PageLayout, config: &PageConfig, title: &str) -> Result<Vec<u8>, String> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut fonts = lopdf::Dictionary::new();
    for style in FontStyle::ALL {
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => style.base_font(),
            "Encoding" => "WinAnsiEncoding",
        });
        fonts.set(style.resource_name(), font_id);
    }
    let resources_id = doc.add_object(dictionary! {
        "Font" => fonts,
    });

    let mut kids: Vec<Object> = Vec::with_capacity(layout.pages.len());
    for ops in &layout.pages {
        let content = Content {
            operations: page_operations(ops),
        };
        let encoded = content
            .encode()
            .map_err(|e| format!("failed to encode page content: {e}"))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id: ObjectId = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                real(config.page_width_pt),
                real(config.page_height_pt),
            ],
            "Resources" => resources_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let page_count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal(encode_win_ansi(title)),
        "Producer" => Object::string_literal("jobjuicer-api"),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| format!("failed to serialize PDF: {e}"))?;
    Ok(bytes)
}
