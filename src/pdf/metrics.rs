//! Glyph advances per font resource, in thousandths of an em.

use lopdf::{Dictionary, Document, Object};

use super::number;

/// Advance used when a font gives no width for a code.
const DEFAULT_WIDTH: f32 = 500.0;
/// Type0 fonts without `/DW`.
const CID_DEFAULT_WIDTH: f32 = 1000.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    /// Type0 fonts show two-byte codes.
    two_byte: bool,
    first_char: u32,
    widths: Vec<f32>,
    /// Inclusive CID ranges from `/W`.
    cid_widths: Vec<(u32, u32, f32)>,
    default_width: f32,
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics {
            two_byte: false,
            first_char: 0,
            widths: Vec::new(),
            cid_widths: Vec::new(),
            default_width: DEFAULT_WIDTH,
        }
    }
}

impl Metrics {
    pub fn from_font(doc: &Document, font: &Dictionary, base_font: &str) -> Metrics {
        let is_type0 = font
            .get(b"Subtype")
            .and_then(Object::as_name)
            .is_ok_and(|s| s == b"Type0".as_slice());
        if is_type0 {
            return Self::composite(doc, font);
        }

        let widths: Vec<f32> = font
            .get(b"Widths")
            .ok()
            .and_then(|o| resolve(doc, o))
            .and_then(|o| o.as_array().ok())
            .map(|arr| {
                arr.iter()
                    .map(|w| resolve(doc, w).and_then(number).unwrap_or(0.0))
                    .collect()
            })
            .unwrap_or_default();
        if widths.is_empty() {
            return standard(base_font);
        }

        let first_char = font.get(b"FirstChar").ok().and_then(number).unwrap_or(0.0) as u32;
        let missing = font
            .get(b"FontDescriptor")
            .ok()
            .and_then(|o| resolve(doc, o))
            .and_then(|o| o.as_dict().ok())
            .and_then(|d| d.get(b"MissingWidth").ok())
            .and_then(number)
            .filter(|w| *w > 0.0);

        Metrics {
            first_char,
            widths,
            default_width: missing.unwrap_or(DEFAULT_WIDTH),
            ..Metrics::default()
        }
    }

    fn composite(doc: &Document, font: &Dictionary) -> Metrics {
        let descendant = font
            .get(b"DescendantFonts")
            .ok()
            .and_then(|o| resolve(doc, o))
            .and_then(|o| o.as_array().ok())
            .and_then(|arr| arr.first())
            .and_then(|o| resolve(doc, o))
            .and_then(|o| o.as_dict().ok());

        let default_width = descendant
            .and_then(|d| d.get(b"DW").ok())
            .and_then(number)
            .unwrap_or(CID_DEFAULT_WIDTH);
        let cid_widths = descendant
            .and_then(|d| d.get(b"W").ok())
            .and_then(|o| resolve(doc, o))
            .and_then(|o| o.as_array().ok())
            .map(|w| cid_ranges(doc, w))
            .unwrap_or_default();

        Metrics {
            two_byte: true,
            cid_widths,
            default_width,
            ..Metrics::default()
        }
    }

    pub fn is_two_byte(&self) -> bool {
        self.two_byte
    }

    pub fn width(&self, code: u32) -> f32 {
        if self.two_byte {
            return self
                .cid_widths
                .iter()
                .find(|(start, end, _)| (*start..=*end).contains(&code))
                .map_or(self.default_width, |(_, _, w)| *w);
        }
        code.checked_sub(self.first_char)
            .and_then(|i| self.widths.get(i as usize))
            .copied()
            .filter(|w| *w > 0.0)
            .unwrap_or(self.default_width)
    }

    /// Character codes in a shown string.
    pub fn codes<'b>(&self, bytes: &'b [u8]) -> Box<dyn Iterator<Item = u32> + 'b> {
        if self.two_byte {
            Box::new(bytes.chunks(2).map(|pair| {
                pair.iter().fold(0u32, |code, b| (code << 8) | u32::from(*b))
            }))
        } else {
            Box::new(bytes.iter().map(|b| u32::from(*b)))
        }
    }
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    doc.dereference(obj).ok().map(|(_, o)| o)
}

/// `/W` entries are either `c [w1 w2 ...]` or `c_first c_last w`.
fn cid_ranges(doc: &Document, arr: &[Object]) -> Vec<(u32, u32, f32)> {
    let mut out = Vec::new();
    let mut i = 0;
    while i + 1 < arr.len() {
        let Some(start) = number(&arr[i]) else {
            i += 1;
            continue;
        };
        let start = start as u32;
        match resolve(doc, &arr[i + 1]) {
            Some(Object::Array(widths)) => {
                for (offset, w) in widths.iter().enumerate() {
                    if let Some(w) = number(w) {
                        let cid = start + offset as u32;
                        out.push((cid, cid, w));
                    }
                }
                i += 2;
            }
            Some(end) => {
                let (Some(end), Some(w)) = (number(end), arr.get(i + 2).and_then(number)) else {
                    break;
                };
                out.push((start, end as u32, w));
                i += 3;
            }
            None => break,
        }
    }
    out
}

/// Unembedded standard fonts carry no `/Widths`; fall back to the base-14
/// family metrics. Bold and oblique faces share the regular face's table.
fn standard(base_font: &str) -> Metrics {
    let family = base_font.split_once('+').map_or(base_font, |(_, name)| name);
    if family.starts_with("Courier") {
        return Metrics {
            default_width: 600.0,
            ..Metrics::default()
        };
    }
    let table: &[f32] = if family.starts_with("Helvetica") || family.starts_with("Arial") {
        &HELVETICA_WIDTHS
    } else if family.starts_with("Times") {
        &TIMES_WIDTHS
    } else {
        return Metrics::default();
    };
    Metrics {
        first_char: 32,
        widths: table.to_vec(),
        ..Metrics::default()
    }
}

/// Helvetica advances for codes 32..=126.
#[rustfmt::skip]
const HELVETICA_WIDTHS: [f32; 95] = [
    278.0, 278.0, 355.0, 556.0, 556.0, 889.0, 667.0, 191.0, 333.0, 333.0, 389.0, 584.0, 278.0, 333.0, 278.0, 278.0,
    556.0, 556.0, 556.0, 556.0, 556.0, 556.0, 556.0, 556.0, 556.0, 556.0, 278.0, 278.0, 584.0, 584.0, 584.0, 556.0,
    1015.0, 667.0, 667.0, 722.0, 722.0, 667.0, 611.0, 778.0, 722.0, 278.0, 500.0, 667.0, 556.0, 833.0, 722.0, 778.0,
    667.0, 778.0, 722.0, 667.0, 611.0, 722.0, 667.0, 944.0, 667.0, 667.0, 611.0, 278.0, 278.0, 278.0, 469.0, 556.0,
    333.0, 556.0, 556.0, 500.0, 556.0, 556.0, 278.0, 556.0, 556.0, 222.0, 222.0, 500.0, 222.0, 833.0, 556.0, 556.0,
    556.0, 556.0, 333.0, 500.0, 278.0, 556.0, 500.0, 722.0, 500.0, 500.0, 500.0, 334.0, 260.0, 334.0, 584.0,
];

/// Times-Roman advances for codes 32..=126.
#[rustfmt::skip]
const TIMES_WIDTHS: [f32; 95] = [
    250.0, 333.0, 408.0, 500.0, 500.0, 833.0, 778.0, 180.0, 333.0, 333.0, 500.0, 564.0, 250.0, 333.0, 250.0, 278.0,
    500.0, 500.0, 500.0, 500.0, 500.0, 500.0, 500.0, 500.0, 500.0, 500.0, 278.0, 278.0, 564.0, 564.0, 564.0, 444.0,
    921.0, 722.0, 667.0, 667.0, 722.0, 611.0, 556.0, 722.0, 722.0, 333.0, 389.0, 722.0, 611.0, 889.0, 722.0, 722.0,
    556.0, 722.0, 667.0, 556.0, 611.0, 722.0, 722.0, 944.0, 722.0, 722.0, 611.0, 333.0, 278.0, 333.0, 469.0, 500.0,
    333.0, 444.0, 500.0, 444.0, 500.0, 444.0, 333.0, 500.0, 500.0, 278.0, 278.0, 500.0, 278.0, 778.0, 500.0, 500.0,
    500.0, 500.0, 333.0, 389.0, 278.0, 500.0, 500.0, 722.0, 500.0, 500.0, 444.0, 480.0, 200.0, 480.0, 541.0,
];

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    #[test]
    fn courier_is_monospaced() {
        let m = standard("Courier-Bold");
        assert_eq!(m.width(u32::from(b'i')), 600.0);
        assert_eq!(m.width(u32::from(b'W')), 600.0);
    }

    #[test]
    fn helvetica_table_is_indexed_from_space() {
        let m = standard("ABCDEF+Helvetica");
        assert_eq!(m.width(u32::from(b' ')), 278.0);
        assert_eq!(m.width(u32::from(b'W')), 944.0);
        assert_eq!(m.width(u32::from(b'~')), 584.0);
        assert_eq!(m.width(200), DEFAULT_WIDTH);
    }

    #[test]
    fn widths_array_wins_over_standard_table() {
        let doc = Document::with_version("1.5");
        let font = dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "FirstChar" => 65,
            "Widths" => vec![Object::Integer(700), Object::Integer(0), Object::Integer(650)],
        };
        let m = Metrics::from_font(&doc, &font, "Helvetica");
        assert_eq!(m.width(65), 700.0);
        assert_eq!(m.width(66), DEFAULT_WIDTH);
        assert_eq!(m.width(67), 650.0);
        assert_eq!(m.width(32), DEFAULT_WIDTH);
    }

    #[test]
    fn missing_width_from_descriptor() {
        let doc = Document::with_version("1.5");
        let font = dictionary! {
            "Subtype" => "TrueType",
            "FirstChar" => 32,
            "Widths" => vec![Object::Integer(250)],
            "FontDescriptor" => dictionary! { "MissingWidth" => 420 },
        };
        let m = Metrics::from_font(&doc, &font, "X+Custom");
        assert_eq!(m.width(32), 250.0);
        assert_eq!(m.width(33), 420.0);
    }

    #[test]
    fn type0_reads_cid_widths() {
        let doc = Document::with_version("1.5");
        let font = dictionary! {
            "Subtype" => "Type0",
            "DescendantFonts" => vec![Object::Dictionary(dictionary! {
                "DW" => 900,
                "W" => vec![
                    Object::Integer(10),
                    Object::Array(vec![Object::Integer(500), Object::Real(600.0)]),
                    Object::Integer(20),
                    Object::Integer(22),
                    Object::Integer(700),
                ],
            })],
        };
        let m = Metrics::from_font(&doc, &font, "X+Mono");
        assert!(m.is_two_byte());
        assert_eq!(m.width(10), 500.0);
        assert_eq!(m.width(11), 600.0);
        assert_eq!(m.width(21), 700.0);
        assert_eq!(m.width(5), 900.0);
        let codes: Vec<u32> = m.codes(&[0x00, 0x0a, 0x01, 0x00]).collect();
        assert_eq!(codes, [10, 256]);
    }
}
