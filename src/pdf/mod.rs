//! Page text with per-line font attribution, read straight from the PDF
//! content streams.
//!
//! Runs are placed with each font's own advances plus the text-state spacing
//! operators, under the `q`/`Q`/`cm` graphics state. Text rise and clipping
//! are ignored, and lines are rebuilt from baselines alone.

mod metrics;

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use lopdf::content::Content;
use lopdf::{Document, Object, ObjectId};
use tracing::warn;

use metrics::Metrics;

/// TJ adjustments (thousandths of an em) at or below this read as a space.
const TJ_SPACE_THRESHOLD: f32 = -250.0;
/// Gap between runs, as a fraction of the font size, that reads as a space.
const RUN_SPACE_GAP: f32 = 0.15;

#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    pub text: String,
    /// Font of the line's first visible character.
    pub font: String,
}

#[derive(Debug, Clone, Default)]
pub struct Page {
    pub lines: Vec<TextLine>,
    /// Shown strings lost to an undefined font resource or undecodable bytes.
    pub skipped_runs: usize,
}

impl Page {
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Anything that can hand out pages by zero-based index.
pub trait PageSource {
    fn page_count(&self) -> usize;
    fn page(&self, index: usize) -> Result<Page>;
}

/// A contiguous piece of shown text in one font.
#[derive(Debug, Clone)]
pub struct TextRun {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub size: f32,
    pub font: String,
    pub text: String,
}

/// One element of a Tj string or TJ array.
enum Piece<'a> {
    Glyphs { text: String, bytes: &'a [u8] },
    /// Position adjustment in thousandths of an em.
    Adjust(f32),
}

struct PageRuns {
    runs: Vec<TextRun>,
    skipped: usize,
}

pub struct PdfDocument {
    doc: Document,
    pages: Vec<ObjectId>,
    line_tolerance: f32,
}

impl PdfDocument {
    pub fn open(path: &Path, line_tolerance: f32) -> Result<Self> {
        let doc = Document::load(path).with_context(|| format!("Failed to open PDF {:?}", path))?;
        let pages = doc.get_pages().into_values().collect();
        Ok(PdfDocument {
            doc,
            pages,
            line_tolerance,
        })
    }

    fn page_runs(&self, index: usize, page_id: ObjectId) -> Result<PageRuns> {
        // Resource key (e.g. "F12") -> (BaseFont, encoding, advances)
        let faces: BTreeMap<Vec<u8>, (String, Option<_>, Metrics)> = self
            .doc
            .get_page_fonts(page_id)?
            .into_iter()
            .map(|(key, font)| {
                let name = font
                    .get(b"BaseFont")
                    .and_then(Object::as_name)
                    .map(|n| String::from_utf8_lossy(n).into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(&key).into_owned());
                let encoding = font.get_font_encoding(&self.doc).ok();
                let metrics = Metrics::from_font(&self.doc, font, &name);
                (key, (name, encoding, metrics))
            })
            .collect();

        let data = self.doc.get_page_content(page_id)?;
        let content = Content::decode(&data)?;

        let mut state = TextState::default();
        let mut runs = Vec::new();
        let mut skipped = 0;

        for op in &content.operations {
            let args = &op.operands;
            let arg = |i: usize| args.get(i).and_then(number);
            match op.operator.as_str() {
                "q" => state.save(),
                "Q" => state.restore(),
                "cm" => {
                    if let Some(m) = matrix(args) {
                        state.concat(m);
                    }
                }
                "BT" => state.begin(),
                "Tf" => {
                    if let Some(key) = args.first().and_then(|o| o.as_name().ok()) {
                        state.gs.font = key.to_vec();
                    }
                    if let Some(size) = arg(1) {
                        state.gs.size = size;
                    }
                }
                "Tc" => {
                    if let Some(v) = arg(0) {
                        state.gs.char_spacing = v;
                    }
                }
                "Tw" => {
                    if let Some(v) = arg(0) {
                        state.gs.word_spacing = v;
                    }
                }
                "Tz" => {
                    if let Some(v) = arg(0) {
                        state.gs.h_scale = v / 100.0;
                    }
                }
                "TL" => {
                    if let Some(v) = arg(0) {
                        state.gs.leading = v;
                    }
                }
                "Td" | "TD" => {
                    if let (Some(tx), Some(ty)) = (arg(0), arg(1)) {
                        if op.operator == "TD" {
                            state.gs.leading = -ty;
                        }
                        state.move_line(tx, ty);
                    }
                }
                "Tm" => {
                    if let Some(m) = matrix(args) {
                        state.set_matrix(m);
                    }
                }
                "T*" => state.next_line(),
                "Tj" | "TJ" | "'" | "\"" => {
                    if op.operator == "\"" {
                        if let (Some(aw), Some(ac)) = (arg(0), arg(1)) {
                            state.gs.word_spacing = aw;
                            state.gs.char_spacing = ac;
                        }
                    }
                    if op.operator == "'" || op.operator == "\"" {
                        state.next_line();
                    }
                    let shown = match op.operator.as_str() {
                        "\"" => args.get(2),
                        _ => args.first(),
                    };
                    let items = match shown {
                        Some(Object::Array(items)) => items.as_slice(),
                        Some(obj) => std::slice::from_ref(obj),
                        None => continue,
                    };

                    let Some((name, encoding, metrics)) = faces.get(&state.gs.font) else {
                        skipped += 1;
                        warn!(
                            page = index,
                            font = %String::from_utf8_lossy(&state.gs.font),
                            "Text shown with a font the page does not define"
                        );
                        continue;
                    };

                    let mut pieces = Vec::with_capacity(items.len());
                    for item in items {
                        match item {
                            Object::String(bytes, _) => {
                                let decoded = match encoding {
                                    Some(enc) => Document::decode_text(enc, bytes),
                                    None => Ok(String::from_utf8_lossy(bytes).into_owned()),
                                };
                                let text = decoded.unwrap_or_else(|e| {
                                    skipped += 1;
                                    warn!(page = index, font = %name, "Could not decode shown text: {}", e);
                                    String::new()
                                });
                                pieces.push(Piece::Glyphs {
                                    text,
                                    bytes: bytes.as_slice(),
                                });
                            }
                            other => {
                                if let Some(n) = number(other) {
                                    pieces.push(Piece::Adjust(n));
                                }
                            }
                        }
                    }
                    if let Some(run) = state.show(name, metrics, &pieces) {
                        runs.push(run);
                    }
                }
                _ => {}
            }
        }

        Ok(PageRuns { runs, skipped })
    }
}

impl PageSource for PdfDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page(&self, index: usize) -> Result<Page> {
        let page_id = *self
            .pages
            .get(index)
            .with_context(|| format!("Page {} out of range ({} pages)", index, self.pages.len()))?;
        let PageRuns { runs, skipped } = self
            .page_runs(index, page_id)
            .with_context(|| format!("Failed to read text of page {}", index))?;
        Ok(Page {
            lines: group_lines(runs, self.line_tolerance),
            skipped_runs: skipped,
        })
    }
}

/// Matrices are [a b c d e f].
type Matrix = [f32; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// `m` then `n`, i.e. m × n.
fn multiply(m: &Matrix, n: &Matrix) -> Matrix {
    [
        m[0] * n[0] + m[1] * n[2],
        m[0] * n[1] + m[1] * n[3],
        m[2] * n[0] + m[3] * n[2],
        m[2] * n[1] + m[3] * n[3],
        m[4] * n[0] + m[5] * n[2] + n[4],
        m[4] * n[1] + m[5] * n[3] + n[5],
    ]
}

fn matrix(args: &[Object]) -> Option<Matrix> {
    let m: Vec<f32> = args.iter().filter_map(number).collect();
    match m[..] {
        [a, b, c, d, e, f] => Some([a, b, c, d, e, f]),
        _ => None,
    }
}

/// The part of the graphics state that `q`/`Q` save and restore.
#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    font: Vec<u8>,
    size: f32,
    char_spacing: f32,
    word_spacing: f32,
    /// Tz / 100
    h_scale: f32,
    leading: f32,
}

impl Default for GraphicsState {
    fn default() -> Self {
        GraphicsState {
            ctm: IDENTITY,
            font: Vec::new(),
            size: 1.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            h_scale: 1.0,
            leading: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
struct TextState {
    tm: Matrix,
    tlm: Matrix,
    gs: GraphicsState,
    saved: Vec<GraphicsState>,
}

impl Default for TextState {
    fn default() -> Self {
        TextState {
            tm: IDENTITY,
            tlm: IDENTITY,
            gs: GraphicsState::default(),
            saved: Vec::new(),
        }
    }
}

impl TextState {
    fn save(&mut self) {
        self.saved.push(self.gs.clone());
    }

    fn restore(&mut self) {
        if let Some(gs) = self.saved.pop() {
            self.gs = gs;
        }
    }

    fn concat(&mut self, m: Matrix) {
        self.gs.ctm = multiply(&m, &self.gs.ctm);
    }

    fn begin(&mut self) {
        self.tm = IDENTITY;
        self.tlm = IDENTITY;
    }

    fn set_matrix(&mut self, m: Matrix) {
        self.tm = m;
        self.tlm = m;
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        let [a, b, c, d, e, f] = self.tlm;
        self.tlm = [a, b, c, d, e + tx * a + ty * c, f + tx * b + ty * d];
        self.tm = self.tlm;
    }

    fn next_line(&mut self) {
        self.move_line(0.0, -self.gs.leading);
    }

    /// Horizontal displacement, in unscaled text space, of one shown string.
    fn glyph_advance(&self, metrics: &Metrics, bytes: &[u8]) -> f32 {
        let gs = &self.gs;
        metrics
            .codes(bytes)
            .map(|code| {
                let mut w = metrics.width(code) / 1000.0 * gs.size + gs.char_spacing;
                if code == 32 && !metrics.is_two_byte() {
                    w += gs.word_spacing;
                }
                w * gs.h_scale
            })
            .sum()
    }

    /// Lay out one Tj/TJ operand, moving the text matrix past it.
    fn show(&mut self, font: &str, metrics: &Metrics, pieces: &[Piece]) -> Option<TextRun> {
        let origin = multiply(&self.tm, &self.gs.ctm);
        let mut text = String::new();
        let mut advance = 0.0;

        for piece in pieces {
            let dx = match piece {
                Piece::Glyphs { text: shown, bytes } => {
                    text.push_str(shown);
                    self.glyph_advance(metrics, bytes)
                }
                Piece::Adjust(n) => {
                    if *n <= TJ_SPACE_THRESHOLD && !text.is_empty() && !text.ends_with(' ') {
                        text.push(' ');
                    }
                    -n / 1000.0 * self.gs.size * self.gs.h_scale
                }
            };
            self.tm[4] += dx * self.tm[0];
            self.tm[5] += dx * self.tm[1];
            advance += dx;
        }

        if text.is_empty() {
            return None;
        }
        Some(TextRun {
            x: origin[4],
            y: origin[5],
            width: advance * origin[0].hypot(origin[1]),
            size: self.gs.size * origin[2].hypot(origin[3]),
            font: font.to_string(),
            text,
        })
    }
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}


/// Rebuild reading-order lines from positioned runs: top to bottom by
/// baseline, left to right within a line.
pub fn group_lines(mut runs: Vec<TextRun>, tolerance: f32) -> Vec<TextLine> {
    runs.sort_by(|a, b| b.y.total_cmp(&a.y));

    let mut groups: Vec<Vec<TextRun>> = Vec::new();
    for run in runs {
        match groups.last_mut() {
            Some(group) if (group[0].y - run.y).abs() <= tolerance => group.push(run),
            _ => groups.push(vec![run]),
        }
    }

    groups
        .into_iter()
        .filter_map(|mut group| {
            group.sort_by(|a, b| a.x.total_cmp(&b.x));
            let font = group.iter().find(|r| !r.text.trim().is_empty())?.font.clone();

            let mut text = String::new();
            let mut prev_end: Option<(f32, f32)> = None;
            for run in &group {
                if let Some((end, size)) = prev_end {
                    let gap = run.x - end;
                    if gap > size * RUN_SPACE_GAP
                        && !text.ends_with(char::is_whitespace)
                        && !run.text.starts_with(char::is_whitespace)
                    {
                        text.push(' ');
                    }
                }
                text.push_str(&run.text);
                prev_end = Some((run.x + run.width, run.size));
            }

            let text = text.trim().to_string();
            if text.is_empty() {
                None
            } else {
                Some(TextLine { text, font })
            }
        })
        .collect()
}

/// In-memory pages, for driving the parser without a PDF.
#[cfg(test)]
impl PageSource for Vec<Page> {
    fn page_count(&self) -> usize {
        self.len()
    }

    fn page(&self, index: usize) -> Result<Page> {
        self.get(index)
            .cloned()
            .with_context(|| format!("Page {} out of range ({} pages)", index, self.len()))
    }
}

/// Fixture format: one `font<TAB>text` per line, `---` between pages.
#[cfg(test)]
pub fn pages_from_fixture(src: &str) -> Vec<Page> {
    let mut pages = vec![Page::default()];
    for raw in src.lines() {
        if raw.trim() == "---" {
            pages.push(Page::default());
            continue;
        }
        if raw.trim().is_empty() {
            continue;
        }
        let (font, text) = raw.split_once('\t').unwrap_or(("", raw));
        if let Some(page) = pages.last_mut() {
            page.lines.push(TextLine {
                text: text.to_string(),
                font: font.to_string(),
            });
        }
    }
    pages
}
