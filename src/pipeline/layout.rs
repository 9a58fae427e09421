//! HTML layout for the built-in rasterizer.
//!
//! Handles the subset of HTML the document templates use: headings,
//! paragraphs, `div`s, line breaks, lists, horizontal rules, bold runs and
//! bordered tables. Everything else is treated as inline text. Styles are
//! not interpreted beyond `align="…"` and `text-align` in a `style`
//! attribute.
//!
//! ```text
//! HTML ──parse_html──▶ Vec<Block> ──layout──▶ Vec<PageDrawing>
//! ```

use crate::config::{mm_to_pt, PageGeometry, PageNumberOptions};
use crate::error::Xml2PdfError;
use crate::pipeline::draw::{DrawOp, PageDrawing};
use crate::pipeline::fonts::FontSet;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::ops::Range;
use tracing::debug;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "wbr",
];
const SKIPPED_ELEMENTS: &[&str] = &["head", "style", "script", "title", "template"];
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "h1", "h2", "h3", "h4", "h5", "h6", "li", "center", "blockquote", "pre",
    "address", "section", "article", "header", "footer",
];

const LINE_SPACING: f32 = 1.3;
const CELL_PADDING: f32 = 3.0;
const BORDER_WIDTH: f32 = 0.5;

// ── Document model ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inline {
    Text { text: String, bold: bool },
    Break,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    pub inlines: Vec<Inline>,
    pub align: Align,
    /// Multiple of the base font size.
    pub scale: f32,
    pub bold: bool,
    /// Vertical space before/after, in multiples of the font size.
    pub space_before: f32,
    pub space_after: f32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Cell {
    pub inlines: Vec<Inline>,
    pub header: bool,
    pub align: Align,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Text(TextBlock),
    Table(Vec<Vec<Cell>>),
    Rule,
}

// ── Parsing ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct BlockStyle {
    align: Align,
    scale: f32,
    bold: bool,
    space_before: f32,
    space_after: f32,
}

impl Default for BlockStyle {
    fn default() -> Self {
        Self {
            align: Align::Left,
            scale: 1.0,
            bold: false,
            space_before: 0.0,
            space_after: 0.0,
        }
    }
}

#[derive(Default)]
struct TableBuilder {
    rows: Vec<Vec<Cell>>,
    cell: Option<Cell>,
}

#[derive(Default)]
struct HtmlBuilder {
    blocks: Vec<Block>,
    current: Option<TextBlock>,
    styles: Vec<BlockStyle>,
    open: Vec<String>,
    tables: Vec<TableBuilder>,
    lists: Vec<Option<usize>>,
    bold: usize,
    skip: usize,
}

/// Parse template output into blocks.
///
/// The parser is lenient the way browsers are: unknown elements are
/// transparent, mismatched end tags close back to the matching open
/// element and unclosed elements are closed at end of input.
pub fn parse_html(html: &str) -> Result<Vec<Block>, Xml2PdfError> {
    let mut reader = Reader::from_str(html);
    reader.check_end_names(false);

    let mut builder = HtmlBuilder::default();
    loop {
        let event = reader
            .read_event()
            .map_err(|e| Xml2PdfError::RasterizationFailed {
                detail: format!("HTML parse error at byte {}: {}", reader.buffer_position(), e),
            })?;
        match event {
            Event::Start(ref e) => {
                let name = tag_name(e);
                let void = VOID_ELEMENTS.contains(&name.as_str());
                builder.start(&name, e);
                if void {
                    builder.end(&name);
                }
            }
            Event::Empty(ref e) => {
                let name = tag_name(e);
                builder.start(&name, e);
                builder.end(&name);
            }
            Event::End(ref e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_ascii_lowercase();
                builder.end(&name);
            }
            Event::Text(ref e) => {
                let text = e
                    .unescape_with(html_entity)
                    .map_err(|err| Xml2PdfError::RasterizationFailed {
                        detail: format!("bad character reference: {}", err),
                    })?;
                builder.text(&text);
            }
            Event::CData(ref e) => builder.text(&String::from_utf8_lossy(e.as_ref())),
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(builder.finish())
}

fn tag_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).to_ascii_lowercase()
}

fn html_entity(name: &str) -> Option<&'static str> {
    match name {
        "nbsp" => Some("\u{a0}"),
        "laquo" => Some("«"),
        "raquo" => Some("»"),
        "mdash" => Some("—"),
        "ndash" => Some("–"),
        "hellip" => Some("…"),
        "numero" => Some("№"),
        "copy" => Some("©"),
        "deg" => Some("°"),
        "bull" => Some("•"),
        _ => None,
    }
}

/// `align="…"` or `text-align: …` in `style`.
fn align_attr(e: &BytesStart<'_>) -> Option<Align> {
    let mut align = None;
    for attr in e.html_attributes().flatten() {
        let key = attr.key.local_name();
        let value = attr
            .unescape_value()
            .map(|v| v.to_ascii_lowercase())
            .unwrap_or_default();
        let parsed = match key.as_ref() {
            b"align" => parse_align(value.trim()),
            b"style" => value
                .split(';')
                .filter_map(|decl| decl.split_once(':'))
                .find(|(prop, _)| prop.trim() == "text-align")
                .and_then(|(_, v)| parse_align(v.trim())),
            _ => None,
        };
        if parsed.is_some() {
            align = parsed;
        }
    }
    align
}

fn parse_align(value: &str) -> Option<Align> {
    match value {
        "center" | "middle" => Some(Align::Center),
        "right" => Some(Align::Right),
        "left" | "justify" => Some(Align::Left),
        _ => None,
    }
}

impl HtmlBuilder {
    fn start(&mut self, name: &str, e: &BytesStart<'_>) {
        if self.skip > 0 || SKIPPED_ELEMENTS.contains(&name) {
            self.skip += 1;
            self.open.push(name.to_string());
            return;
        }
        self.open.push(name.to_string());

        if BLOCK_ELEMENTS.contains(&name) {
            if self.in_cell() {
                self.cell_break();
                return;
            }
            self.flush();
            let parent = self.styles.last().copied().unwrap_or_default();
            let mut style = BlockStyle {
                align: parent.align,
                ..BlockStyle::default()
            };
            match name {
                "h1" => heading(&mut style, 1.6),
                "h2" => heading(&mut style, 1.3),
                "h3" => heading(&mut style, 1.15),
                "h4" | "h5" | "h6" => heading(&mut style, 1.0),
                "p" | "blockquote" | "pre" | "address" => style.space_after = 0.5,
                "center" => style.align = Align::Center,
                _ => {}
            }
            if let Some(align) = align_attr(e) {
                style.align = align;
            }
            self.styles.push(style);
            if name == "li" {
                let marker = match self.lists.last_mut() {
                    Some(Some(n)) => {
                        *n += 1;
                        format!("{}. ", n)
                    }
                    _ => "• ".to_string(),
                };
                self.text(&marker);
            }
            return;
        }

        match name {
            "br" => self.line_break(),
            "hr" => {
                self.flush();
                self.blocks.push(Block::Rule);
            }
            "b" | "strong" => self.bold += 1,
            "ul" => {
                self.flush();
                self.lists.push(None);
            }
            "ol" => {
                self.flush();
                self.lists.push(Some(0));
            }
            "table" => {
                if self.in_cell() {
                    self.cell_break();
                } else {
                    self.flush();
                }
                self.tables.push(TableBuilder::default());
            }
            "tr" => {
                if let Some(table) = self.tables.last_mut() {
                    table.close_cell();
                    table.rows.push(Vec::new());
                }
            }
            "td" | "th" => {
                let align = align_attr(e).unwrap_or_default();
                if let Some(table) = self.tables.last_mut() {
                    table.close_cell();
                    if table.rows.is_empty() {
                        table.rows.push(Vec::new());
                    }
                    table.cell = Some(Cell {
                        inlines: Vec::new(),
                        header: name == "th",
                        align,
                    });
                }
            }
            _ => {}
        }
    }

    fn end(&mut self, name: &str) {
        let Some(pos) = self.open.iter().rposition(|open| open == name) else {
            return;
        };
        while self.open.len() > pos {
            if let Some(open) = self.open.pop() {
                self.close(&open);
            }
        }
    }

    fn close(&mut self, name: &str) {
        if self.skip > 0 {
            self.skip -= 1;
            return;
        }
        if BLOCK_ELEMENTS.contains(&name) {
            if self.in_cell() {
                return;
            }
            self.flush();
            self.styles.pop();
            return;
        }
        match name {
            "b" | "strong" => self.bold = self.bold.saturating_sub(1),
            "ul" | "ol" => {
                self.flush();
                self.lists.pop();
            }
            "td" | "th" => {
                if let Some(table) = self.tables.last_mut() {
                    table.close_cell();
                }
            }
            "table" => {
                if let Some(mut table) = self.tables.pop() {
                    table.close_cell();
                    table.rows.retain(|row| !row.is_empty());
                    if let Some(outer) = self.cell_mut() {
                        // Nested table: flatten into the enclosing cell.
                        for row in table.rows {
                            for cell in row {
                                outer.inlines.extend(cell.inlines);
                                outer.inlines.push(Inline::Text {
                                    text: " ".into(),
                                    bold: false,
                                });
                            }
                            outer.inlines.push(Inline::Break);
                        }
                    } else if !table.rows.is_empty() {
                        self.blocks.push(Block::Table(table.rows));
                    }
                }
            }
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        if self.skip > 0 || text.is_empty() {
            return;
        }
        let bold = self.bold > 0;
        if let Some(cell) = self.cell_mut() {
            let bold = bold || cell.header;
            cell.inlines.push(Inline::Text {
                text: text.to_string(),
                bold,
            });
            return;
        }
        if !self.tables.is_empty() {
            // Stray text between table rows.
            if text.trim().is_empty() {
                return;
            }
        }
        self.current_block().inlines.push(Inline::Text {
            text: text.to_string(),
            bold,
        });
    }

    fn line_break(&mut self) {
        if self.skip > 0 {
            return;
        }
        if self.in_cell() {
            self.cell_break();
        } else {
            self.current_block().inlines.push(Inline::Break);
        }
    }

    fn in_cell(&self) -> bool {
        self.tables.last().is_some_and(|t| t.cell.is_some())
    }

    fn cell_mut(&mut self) -> Option<&mut Cell> {
        self.tables.last_mut().and_then(|t| t.cell.as_mut())
    }

    fn cell_break(&mut self) {
        if let Some(cell) = self.cell_mut() {
            if cell.inlines.iter().any(has_content) {
                cell.inlines.push(Inline::Break);
            }
        }
    }

    fn current_block(&mut self) -> &mut TextBlock {
        let style = self.styles.last().copied().unwrap_or_default();
        self.current.get_or_insert_with(|| TextBlock {
            inlines: Vec::new(),
            align: style.align,
            scale: style.scale,
            bold: style.bold,
            space_before: style.space_before,
            space_after: style.space_after,
        })
    }

    fn flush(&mut self) {
        if let Some(block) = self.current.take() {
            if block.inlines.iter().any(has_content) {
                self.blocks.push(Block::Text(block));
            }
        }
    }

    fn finish(mut self) -> Vec<Block> {
        while let Some(open) = self.open.pop() {
            self.close(&open);
        }
        while let Some(mut table) = self.tables.pop() {
            table.close_cell();
            table.rows.retain(|row| !row.is_empty());
            if !table.rows.is_empty() {
                self.blocks.push(Block::Table(table.rows));
            }
        }
        self.flush();
        self.blocks
    }
}

impl TableBuilder {
    fn close_cell(&mut self) {
        if let Some(cell) = self.cell.take() {
            match self.rows.last_mut() {
                Some(row) => row.push(cell),
                None => self.rows.push(vec![cell]),
            }
        }
    }
}

fn heading(style: &mut BlockStyle, scale: f32) {
    style.scale = scale;
    style.bold = true;
    style.space_before = 0.6;
    style.space_after = 0.4;
}

fn has_content(inline: &Inline) -> bool {
    match inline {
        Inline::Text { text, .. } => !text.trim().is_empty(),
        Inline::Break => false,
    }
}

// ── Line breaking ────────────────────────────────────────────────────────

/// A run of same-weight text on one line.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub text: String,
    pub bold: bool,
    pub x: f32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextLine {
    pub segments: Vec<Segment>,
    pub width: f32,
}

struct Word {
    text: String,
    bold: bool,
    space_before: bool,
}

fn words(inlines: &[Inline], force_bold: bool) -> Vec<Option<Word>> {
    let mut out: Vec<Option<Word>> = Vec::new();
    let mut pending_space = false;
    let mut current: Option<Word> = None;

    for inline in inlines {
        match inline {
            Inline::Break => {
                out.extend(current.take().map(Some));
                out.push(None);
                pending_space = false;
            }
            Inline::Text { text, bold } => {
                let bold = *bold || force_bold;
                for ch in text.chars() {
                    // Non-breaking spaces join words.
                    if ch.is_whitespace() && ch != '\u{a0}' {
                        if let Some(word) = current.take() {
                            out.push(Some(word));
                        }
                        pending_space = true;
                        continue;
                    }
                    let ch = if ch == '\u{a0}' { ' ' } else { ch };
                    match current.as_mut() {
                        Some(word) if word.bold == bold => word.text.push(ch),
                        _ => {
                            if let Some(word) = current.take() {
                                out.push(Some(word));
                            }
                            current = Some(Word {
                                text: ch.to_string(),
                                bold,
                                space_before: pending_space,
                            });
                            pending_space = false;
                        }
                    }
                }
            }
        }
    }
    out.extend(current.take().map(Some));
    out
}

/// Greedy line breaking of `inlines` into lines no wider than `max_width`.
///
/// Words longer than a full line are split between characters. A `Break`
/// always ends the current line.
pub fn wrap(
    inlines: &[Inline],
    fonts: &FontSet,
    size: f32,
    force_bold: bool,
    max_width: f32,
) -> Vec<TextLine> {
    let space = fonts.regular().text_width(" ", size);
    let mut lines = Vec::new();
    let mut line = TextLine::default();
    let mut line_has_words = false;

    for item in words(inlines, force_bold) {
        let Some(word) = item else {
            lines.push(std::mem::take(&mut line));
            line_has_words = false;
            continue;
        };
        let face = fonts.face(word.bold);
        let mut pieces = vec![word.text.clone()];
        if face.text_width(&word.text, size) > max_width {
            pieces = split_long_word(&word.text, |s| face.text_width(s, size), max_width);
        }

        for (i, piece) in pieces.into_iter().enumerate() {
            let width = face.text_width(&piece, size);
            let gap = if line_has_words && word.space_before && i == 0 {
                space
            } else {
                0.0
            };
            if line_has_words && line.width + gap + width > max_width {
                lines.push(std::mem::take(&mut line));
                line_has_words = false;
            }
            let gap = if line_has_words { gap } else { 0.0 };
            push_piece(&mut line, &piece, word.bold, gap, width);
            line_has_words = true;
        }
    }
    if line_has_words || lines.is_empty() {
        lines.push(line);
    }
    lines
}

fn push_piece(line: &mut TextLine, text: &str, bold: bool, gap: f32, width: f32) {
    match line.segments.last_mut() {
        Some(seg) if seg.bold == bold => {
            if gap > 0.0 {
                seg.text.push(' ');
            }
            seg.text.push_str(text);
        }
        _ => line.segments.push(Segment {
            text: if gap > 0.0 {
                format!(" {}", text)
            } else {
                text.to_string()
            },
            bold,
            x: line.width,
        }),
    }
    line.width += gap + width;
}

fn split_long_word(word: &str, measure: impl Fn(&str) -> f32, max_width: f32) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    for ch in word.chars() {
        current.push(ch);
        if measure(&current) > max_width && current.chars().count() > 1 {
            current.pop();
            pieces.push(std::mem::take(&mut current));
            current.push(ch);
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

// ── Pagination ───────────────────────────────────────────────────────────

struct Layouter<'a> {
    fonts: &'a FontSet,
    base_size: f32,
    page_width: f32,
    page_height: f32,
    left: f32,
    width: f32,
    top: f32,
    bottom: f32,
    pages: Vec<PageDrawing>,
    y: f32,
}

impl<'a> Layouter<'a> {
    fn new(geometry: &PageGeometry, fonts: &'a FontSet) -> Self {
        let page_width = geometry.width_pt();
        let page_height = geometry.height_pt();
        let left = mm_to_pt(geometry.margin_left_mm);
        let right = mm_to_pt(geometry.margin_right_mm);
        let top = page_height - mm_to_pt(geometry.margin_top_mm);
        let mut layouter = Self {
            fonts,
            base_size: geometry.font_size_pt,
            page_width,
            page_height,
            left,
            width: page_width - left - right,
            top,
            bottom: mm_to_pt(geometry.margin_bottom_mm),
            pages: Vec::new(),
            y: top,
        };
        layouter.new_page();
        layouter
    }

    fn new_page(&mut self) {
        self.pages
            .push(PageDrawing::new(self.page_width, self.page_height));
        self.y = self.top;
    }

    /// Start a new page unless `height` fits or the page is still empty.
    fn ensure(&mut self, height: f32) {
        if self.y - height < self.bottom && self.y < self.top {
            self.new_page();
        }
    }

    fn page(&mut self) -> &mut PageDrawing {
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    fn skip(&mut self, amount: f32) {
        // Space at the top of a page is dropped.
        if self.y < self.top {
            self.y = (self.y - amount).max(self.bottom);
        }
    }

    fn text_block(&mut self, block: &TextBlock) {
        let size = self.base_size * block.scale;
        let line_height = size * LINE_SPACING;
        self.skip(block.space_before * size);

        let lines = wrap(&block.inlines, self.fonts, size, block.bold, self.width);
        for line in lines {
            self.ensure(line_height);
            let baseline = self.y - size;
            let offset = align_offset(block.align, self.width, line.width);
            let left = self.left;
            for seg in line.segments {
                self.page().ops.push(DrawOp::Text {
                    x: left + offset + seg.x,
                    y: baseline,
                    size,
                    bold: seg.bold,
                    text: seg.text,
                });
            }
            self.y -= line_height;
        }
        self.skip(block.space_after * size);
    }

    fn table(&mut self, rows: &[Vec<Cell>]) {
        let size = self.base_size;
        let line_height = size * LINE_SPACING;
        let columns = column_widths(rows, self.fonts, size, self.width);

        for row in rows {
            let wrapped: Vec<Vec<TextLine>> = row
                .iter()
                .zip(&columns)
                .map(|(cell, w)| {
                    wrap(&cell.inlines, self.fonts, size, cell.header, w - 2.0 * CELL_PADDING)
                })
                .collect();
            let max_lines = wrapped.iter().map(Vec::len).max().unwrap_or(1).max(1);
            let row_height = max_lines as f32 * line_height + 2.0 * CELL_PADDING;

            if row_height <= self.top - self.bottom {
                self.ensure(row_height);
                self.row_slice(row, &wrapped, &columns, 0..max_lines);
                continue;
            }

            // Taller than a whole page: continue the row on following pages.
            debug!("Splitting a {:.0}pt table row across pages", row_height);
            let mut start = 0;
            while start < max_lines {
                let room = (self.y - self.bottom - 2.0 * CELL_PADDING) / line_height;
                let fit = room.floor().max(0.0) as usize;
                if fit == 0 && self.y < self.top {
                    self.new_page();
                    continue;
                }
                let end = (start + fit.max(1)).min(max_lines);
                self.row_slice(row, &wrapped, &columns, start..end);
                start = end;
                if start < max_lines {
                    self.new_page();
                }
            }
        }
        self.skip(size * 0.5);
    }

    /// Draw wrapped lines `lines` of every cell in `row` as one bordered strip.
    fn row_slice(
        &mut self,
        row: &[Cell],
        wrapped: &[Vec<TextLine>],
        columns: &[f32],
        lines: Range<usize>,
    ) {
        let size = self.base_size;
        let line_height = size * LINE_SPACING;
        let height = lines.len() as f32 * line_height + 2.0 * CELL_PADDING;
        let top = self.y;
        let mut x = self.left;
        for (i, width) in columns.iter().enumerate() {
            self.page().ops.push(DrawOp::Rect {
                x,
                y: top - height,
                w: *width,
                h: height,
                width: BORDER_WIDTH,
            });
            if let (Some(cell), Some(cell_lines)) = (row.get(i), wrapped.get(i)) {
                let shown = cell_lines.iter().enumerate().skip(lines.start).take(lines.len());
                for (n, line) in shown {
                    let baseline =
                        top - CELL_PADDING - size - (n - lines.start) as f32 * line_height;
                    let offset = align_offset(cell.align, width - 2.0 * CELL_PADDING, line.width);
                    for seg in &line.segments {
                        self.page().ops.push(DrawOp::Text {
                            x: x + CELL_PADDING + offset + seg.x,
                            y: baseline,
                            size,
                            bold: seg.bold,
                            text: seg.text.clone(),
                        });
                    }
                }
            }
            x += width;
        }
        self.y = top - height;
    }

    fn rule(&mut self) {
        self.ensure(6.0);
        let y = self.y - 3.0;
        let (left, right) = (self.left, self.left + self.width);
        self.page().ops.push(DrawOp::Line {
            from: (left, y),
            to: (right, y),
            width: BORDER_WIDTH,
        });
        self.y -= 6.0;
    }
}

fn align_offset(align: Align, available: f32, used: f32) -> f32 {
    match align {
        Align::Left => 0.0,
        Align::Center => ((available - used) / 2.0).max(0.0),
        Align::Right => (available - used).max(0.0),
    }
}

/// Column widths filling `total`: natural widths when they fit, otherwise
/// minimum widths plus the remainder shared in proportion to what each
/// column would like beyond its minimum.
fn column_widths(rows: &[Vec<Cell>], fonts: &FontSet, size: f32, total: f32) -> Vec<f32> {
    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
    if columns == 0 {
        return Vec::new();
    }
    let pad = 2.0 * CELL_PADDING;
    let mut natural = vec![pad; columns];
    let mut minimum = vec![pad; columns];

    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            let lines = wrap(&cell.inlines, fonts, size, cell.header, f32::INFINITY);
            let widest_line = lines.iter().map(|l| l.width).fold(0.0, f32::max);
            natural[i] = natural[i].max(widest_line + pad);
            let widest_word = words(&cell.inlines, cell.header)
                .into_iter()
                .flatten()
                .map(|w| fonts.face(w.bold).text_width(&w.text, size))
                .fold(0.0, f32::max);
            minimum[i] = minimum[i].max(widest_word + pad);
        }
    }

    let natural_sum: f32 = natural.iter().sum();
    if natural_sum <= total {
        return natural.iter().map(|w| w * total / natural_sum).collect();
    }
    let minimum_sum: f32 = minimum.iter().sum();
    if minimum_sum >= total {
        return minimum.iter().map(|w| w * total / minimum_sum).collect();
    }
    let spare = total - minimum_sum;
    let wanted: f32 = natural.iter().zip(&minimum).map(|(n, m)| n - m).sum();
    natural
        .iter()
        .zip(&minimum)
        .map(|(n, m)| m + spare * (n - m) / wanted)
        .collect()
}

/// Lay blocks out on pages of the given geometry.
///
/// Always yields at least one page.
pub fn layout(blocks: &[Block], geometry: &PageGeometry, fonts: &FontSet) -> Vec<PageDrawing> {
    let mut layouter = Layouter::new(geometry, fonts);
    for block in blocks {
        match block {
            Block::Text(text) => layouter.text_block(text),
            Block::Table(rows) => layouter.table(rows),
            Block::Rule => layouter.rule(),
        }
    }
    debug!(
        "Laid out {} blocks on {} page(s)",
        blocks.len(),
        layouter.pages.len()
    );
    layouter.pages
}

/// Centre a page label in the bottom margin of every page.
pub fn add_running_footer(
    pages: &mut [PageDrawing],
    geometry: &PageGeometry,
    fonts: &FontSet,
    numbers: &PageNumberOptions,
) {
    let total = pages.len();
    let size = numbers.font_size_pt;
    let y = mm_to_pt(geometry.margin_bottom_mm) / 2.0;
    for (i, page) in pages.iter_mut().enumerate() {
        let label = numbers.label(i + 1, total);
        let x = (page.width_pt - fonts.regular().text_width(&label, size)) / 2.0;
        page.ops.push(DrawOp::Text {
            x,
            y,
            size,
            bold: false,
            text: label,
        });
    }
}
