//! Markdown → block model.
//!
//! Flattens the pulldown-cmark event stream into the handful of block kinds
//! the PDF layout understands. Anything else (tables, images, raw HTML)
//! degrades to plain text or is dropped.

use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};

use crate::render::font_metrics::FontStyle;

/// A styled run of inline text.
#[derive(Debug, Clone, PartialEq)]
pub struct Run {
    pub text: String,
    pub style: FontStyle,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlockKind {
    /// Level 1..=6.
    Heading(u8),
    Paragraph,
    /// A list item with its marker ("•" or "3.") and nesting depth (1-based).
    ListItem { marker: String, depth: usize },
    Rule,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub kind: BlockKind,
    pub runs: Vec<Run>,
    /// List nesting depth the block sits in (0 outside lists).
    pub indent: usize,
}

impl Block {
    fn new(kind: BlockKind, indent: usize) -> Self {
        Self {
            kind,
            runs: Vec::new(),
            indent,
        }
    }

    /// Concatenated text of all runs.
    #[cfg(test)]
    pub fn plain_text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }

    fn is_blank(&self) -> bool {
        self.runs.iter().all(|r| r.text.trim().is_empty())
    }
}

#[derive(Default)]
struct BlockBuilder {
    blocks: Vec<Block>,
    current: Option<Block>,
    bold: u32,
    italic: u32,
    /// Next number for each open list; `None` for bullet lists.
    lists: Vec<Option<u64>>,
}

impl BlockBuilder {
    fn style(&self) -> FontStyle {
        FontStyle::from_flags(self.bold > 0, self.italic > 0)
    }

    fn flush(&mut self) {
        if let Some(block) = self.current.take() {
            if block.kind == BlockKind::Rule || !block.is_blank() {
                self.blocks.push(block);
            }
        }
    }

    fn start(&mut self, kind: BlockKind) {
        self.flush();
        self.current = Some(Block::new(kind, self.lists.len()));
    }

    fn push_text(&mut self, text: &str) {
        let style = self.style();
        let depth = self.lists.len();
        let block = self
            .current
            .get_or_insert_with(|| Block::new(BlockKind::Paragraph, depth));
        match block.runs.last_mut() {
            Some(last) if last.style == style => last.text.push_str(text),
            _ => block.runs.push(Run {
                text: text.to_string(),
                style,
            }),
        }
    }

    fn next_list_marker(&mut self) -> String {
        match self.lists.last_mut() {
            Some(Some(n)) => {
                let marker = format!("{n}.");
                *n += 1;
                marker
            }
            _ => "•".to_string(),
        }
    }
}

/// Parses markdown into layout blocks.
pub fn parse_blocks(markdown: &str) -> Vec<Block> {
    let mut builder = BlockBuilder::default();

    for event in Parser::new_ext(markdown, Options::ENABLE_STRIKETHROUGH) {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                builder.start(BlockKind::Heading(heading_level(level)));
            }
            Event::Start(Tag::Paragraph) => {
                // Loose list items wrap their text in a paragraph; keep the item.
                let in_fresh_item = matches!(
                    &builder.current,
                    Some(b) if matches!(b.kind, BlockKind::ListItem { .. }) && b.runs.is_empty()
                );
                if !in_fresh_item {
                    builder.start(BlockKind::Paragraph);
                }
            }
            Event::Start(Tag::List(first)) => {
                builder.flush();
                builder.lists.push(first);
            }
            Event::End(TagEnd::List(_)) => {
                builder.flush();
                builder.lists.pop();
            }
            Event::Start(Tag::Item) => {
                let marker = builder.next_list_marker();
                let depth = builder.lists.len();
                builder.start(BlockKind::ListItem { marker, depth });
            }
            Event::Start(Tag::Strong) => builder.bold += 1,
            Event::End(TagEnd::Strong) => builder.bold = builder.bold.saturating_sub(1),
            Event::Start(Tag::Emphasis) => builder.italic += 1,
            Event::End(TagEnd::Emphasis) => builder.italic = builder.italic.saturating_sub(1),
            Event::End(TagEnd::Heading(_) | TagEnd::Paragraph | TagEnd::Item) => builder.flush(),
            Event::Text(text) | Event::Code(text) => builder.push_text(&text),
            Event::SoftBreak | Event::HardBreak => builder.push_text(" "),
            Event::Rule => {
                builder.flush();
                builder.blocks.push(Block::new(BlockKind::Rule, 0));
            }
            _ => {}
        }
    }

    builder.flush();
    builder.blocks
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}
