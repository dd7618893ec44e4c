use tracing::{debug, warn};

use crate::config::Fonts;
use crate::pdf::{Page, TextLine};

/// Documentation collected for one mnemonic, in page order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstructionSpec {
    pub name: String,
    pub desc: String,
    pub code: String,
    pub notes: String,
}

impl InstructionSpec {
    fn new(name: String) -> Self {
        InstructionSpec {
            name,
            ..Default::default()
        }
    }
}

/// What a line contributes to the record being built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// Two-token line in the name font; carries the lower-cased mnemonic.
    Heading(String),
    /// Content before the first heading.
    Orphan,
    /// Name font reused to open the notes section; text is dropped.
    NotesMarker,
    Desc,
    Code,
    Notes,
    Unknown,
}

/// Scanner state that classification depends on.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cursor {
    pub open: bool,
    pub pending_notes: bool,
}

pub fn classify(fonts: &Fonts, line: &TextLine, cursor: Cursor) -> FieldKind {
    let font = line.font.as_str();

    if font == fonts.name {
        let mut tokens = line.text.split_whitespace();
        if let (Some(first), Some(_), None) = (tokens.next(), tokens.next(), tokens.next()) {
            return FieldKind::Heading(first.to_lowercase());
        }
    }
    if !cursor.open {
        return FieldKind::Orphan;
    }
    if font == fonts.notes {
        return FieldKind::NotesMarker;
    }
    if cursor.pending_notes {
        return FieldKind::Notes;
    }

    if font == fonts.italic || font == fonts.desc {
        FieldKind::Desc
    } else if font == fonts.code {
        FieldKind::Code
    } else {
        FieldKind::Unknown
    }
}

/// Accumulates records line by line. The open record moves to `finished`
/// when the next heading arrives or on `finish`.
pub struct SpecBuilder<'a> {
    fonts: &'a Fonts,
    current: Option<InstructionSpec>,
    finished: Vec<InstructionSpec>,
    pending_notes: bool,
    unknown_lines: usize,
}

impl<'a> SpecBuilder<'a> {
    pub fn new(fonts: &'a Fonts) -> Self {
        SpecBuilder {
            fonts,
            current: None,
            finished: Vec::new(),
            pending_notes: false,
            unknown_lines: 0,
        }
    }

    /// Notes never carry over a page break.
    pub fn begin_page(&mut self) {
        self.pending_notes = false;
    }

    pub fn push_page(&mut self, page: &Page) {
        self.begin_page();
        for line in &page.lines {
            self.push_line(line);
        }
    }

    pub fn push_line(&mut self, line: &TextLine) {
        let cursor = Cursor {
            open: self.current.is_some(),
            pending_notes: self.pending_notes,
        };
        let kind = classify(self.fonts, line, cursor);

        let field = match kind {
            FieldKind::Heading(name) => {
                debug!(mnemonic = %name, "Instruction heading");
                if let Some(done) = self.current.replace(InstructionSpec::new(name)) {
                    self.finished.push(done);
                }
                self.pending_notes = false;
                return;
            }
            FieldKind::Orphan => return,
            FieldKind::NotesMarker => {
                self.pending_notes = true;
                return;
            }
            FieldKind::Unknown => {
                self.unknown_lines += 1;
                warn!(font = %line.font, "Don't know how to parse line: {}", line.text);
                return;
            }
            field @ (FieldKind::Desc | FieldKind::Code | FieldKind::Notes) => field,
        };

        let Some(spec) = self.current.as_mut() else { return };
        let text = if line.font == self.fonts.italic {
            format!("_{}_", line.text)
        } else {
            line.text.clone()
        };
        let target = match field {
            FieldKind::Code => &mut spec.code,
            FieldKind::Notes => &mut spec.notes,
            _ => &mut spec.desc,
        };
        append(target, &text);
    }

    pub fn unknown_lines(&self) -> usize {
        self.unknown_lines
    }

    pub fn finish(mut self) -> Vec<InstructionSpec> {
        if let Some(last) = self.current.take() {
            self.finished.push(last);
        }
        self.finished
    }
}

fn append(field: &mut String, text: &str) {
    if !field.is_empty() {
        field.push('\n');
    }
    field.push_str(text);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fonts() -> Fonts {
        Fonts::default()
    }

    fn line(font: &str, text: &str) -> TextLine {
        TextLine {
            font: font.to_string(),
            text: text.to_string(),
        }
    }

    fn page(lines: Vec<TextLine>) -> Page {
        Page {
            lines,
            ..Default::default()
        }
    }

    fn scan(pages: &[Page], fonts: &Fonts) -> Vec<InstructionSpec> {
        let mut builder = SpecBuilder::new(fonts);
        for page in pages {
            builder.push_page(page);
        }
        builder.finish()
    }

    const OPEN: Cursor = Cursor {
        open: true,
        pending_notes: false,
    };

    #[test]
    fn two_token_name_line_is_heading() {
        let f = fonts();
        assert_eq!(
            classify(&f, &line(&f.name, "S_ADD_U32 0"), Cursor::default()),
            FieldKind::Heading("s_add_u32".into())
        );
    }

    #[test]
    fn three_token_name_line_is_not_heading() {
        let f = fonts();
        assert_eq!(
            classify(&f, &line(&f.name, "ADD Rd, Rs"), Cursor::default()),
            FieldKind::Orphan
        );
        assert_eq!(classify(&f, &line(&f.name, "ADD Rd, Rs"), OPEN), FieldKind::NotesMarker);
    }

    #[test]
    fn heading_needs_name_font() {
        let f = fonts();
        assert_eq!(classify(&f, &line(&f.desc, "S_ADD_U32 0"), OPEN), FieldKind::Desc);
    }

    #[test]
    fn pending_notes_overrides_font() {
        let f = fonts();
        let cursor = Cursor {
            open: true,
            pending_notes: true,
        };
        for font in [&f.desc, &f.code, &f.italic, &"Footer".to_string()] {
            assert_eq!(classify(&f, &line(font, "x"), cursor), FieldKind::Notes);
        }
        assert_eq!(classify(&f, &line(&f.name, "Notes"), cursor), FieldKind::NotesMarker);
        assert!(matches!(
            classify(&f, &line(&f.name, "V_NOP 0"), cursor),
            FieldKind::Heading(_)
        ));
    }

    #[test]
    fn fonts_map_to_fields() {
        let f = fonts();
        assert_eq!(classify(&f, &line(&f.italic, "x"), OPEN), FieldKind::Desc);
        assert_eq!(classify(&f, &line(&f.code, "x"), OPEN), FieldKind::Code);
        assert_eq!(classify(&f, &line("Helvetica", "12"), OPEN), FieldKind::Unknown);
    }

    #[test]
    fn builds_desc_code_and_notes() {
        let f = fonts();
        let specs = scan(
            &[page(vec![
                line(&f.name, "S_MOV_B32 0"),
                line(&f.desc, "Move a value."),
                line(&f.desc, "Second line."),
                line(&f.code, "D0.b32 = S0.b32"),
                line(&f.name, "Notes"),
                line("Footer", "See also: S_CMOV_B32."),
            ])],
            &f,
        );
        assert_eq!(specs.len(), 1);
        let s = &specs[0];
        assert_eq!(s.name, "s_mov_b32");
        assert_eq!(s.desc, "Move a value.\nSecond line.");
        assert_eq!(s.code, "D0.b32 = S0.b32");
        assert_eq!(s.notes, "See also: S_CMOV_B32.");
    }

    #[test]
    fn italic_is_emphasised_in_desc_and_notes() {
        let f = fonts();
        let specs = scan(
            &[page(vec![
                line(&f.name, "S_NOP 0"),
                line(&f.italic, "Does nothing."),
                line(&f.name, "Notes"),
                line(&f.italic, "Really nothing."),
            ])],
            &f,
        );
        assert_eq!(specs[0].desc, "_Does nothing._");
        assert_eq!(specs[0].notes, "_Really nothing._");
    }

    #[test]
    fn lines_before_first_heading_are_dropped() {
        let f = fonts();
        let mut b = SpecBuilder::new(&f);
        b.push_page(&page(vec![
            line(&f.desc, "Chapter intro"),
            line("Helvetica", "233"),
            line(&f.name, "ADD Rd, Rs"),
        ]));
        assert_eq!(b.unknown_lines(), 0);
        assert!(b.finish().is_empty());
    }

    #[test]
    fn unknown_fonts_are_counted_and_skipped() {
        let f = fonts();
        let mut b = SpecBuilder::new(&f);
        b.push_page(&page(vec![
            line(&f.name, "S_NOP 0"),
            line("Helvetica", "Page 233"),
            line(&f.desc, "Does nothing."),
        ]));
        assert_eq!(b.unknown_lines(), 1);
        assert_eq!(b.finish()[0].desc, "Does nothing.");
    }

    #[test]
    fn notes_reset_at_page_break() {
        let f = fonts();
        let specs = scan(
            &[
                page(vec![
                    line(&f.name, "S_NOP 0"),
                    line(&f.name, "Notes"),
                    line(&f.desc, "note text"),
                ]),
                page(vec![line(&f.desc, "continued description")]),
            ],
            &f,
        );
        assert_eq!(specs[0].notes, "note text");
        assert_eq!(specs[0].desc, "continued description");
    }

    #[test]
    fn heading_closes_notes() {
        let f = fonts();
        let specs = scan(
            &[page(vec![
                line(&f.name, "S_NOP 0"),
                line(&f.name, "Notes"),
                line(&f.desc, "note"),
                line(&f.name, "S_SLEEP 1"),
                line(&f.desc, "Sleep."),
            ])],
            &f,
        );
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[1].name, "s_sleep");
        assert_eq!(specs[1].desc, "Sleep.");
        assert!(specs[1].notes.is_empty());
    }

    #[test]
    fn duplicates_are_kept_in_order() {
        let f = fonts();
        let specs = scan(
            &[page(vec![
                line(&f.name, "V_MOV_B32 1"),
                line(&f.desc, "first"),
                line(&f.name, "V_MOV_B32 385"),
                line(&f.desc, "second"),
            ])],
            &f,
        );
        let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["v_mov_b32", "v_mov_b32"]);
        assert_eq!(specs[1].desc, "second");
    }
}
