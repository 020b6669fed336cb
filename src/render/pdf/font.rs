// Font resources for PDF pages.
//
// TrueType faces are embedded whole as a Type0 font with Identity-H encoding:
// text is written as big-endian glyph ids, widths come from the face metrics
// and a ToUnicode map keeps the text searchable. Without a face the page uses
// the standard Helvetica fonts, which every reader ships.
use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::collections::BTreeMap;

use crate::render::fonts::{ascii_fold, Builtin, Font, FontFace, FontSource};

#[rustfmt::skip]
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556,
    278, 278, 584, 584, 584, 556, 1015,
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833,
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611,
    278, 278, 278, 469, 556, 333,
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833,
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500,
    334, 260, 334, 584,
];

#[rustfmt::skip]
const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556,
    333, 333, 584, 584, 584, 611, 975,
    722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833,
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611,
    333, 278, 333, 584, 556, 333,
    556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889,
    611, 611, 611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500,
    389, 280, 389, 584,
];

pub(super) enum FontResource {
    Standard {
        base: &'static str,
        widths: &'static [u16; 95],
    },
    Embedded {
        face: FontFace,
        used: BTreeMap<u16, char>,
    },
}

impl FontResource {
    pub(super) fn for_font(font: &Font) -> Self {
        match &font.source {
            FontSource::TrueType(face) => FontResource::Embedded {
                face: face.clone(),
                used: BTreeMap::new(),
            },
            FontSource::Builtin(Builtin::Regular) => FontResource::Standard {
                base: "Helvetica",
                widths: &HELVETICA_WIDTHS,
            },
            FontSource::Builtin(Builtin::Bold) => FontResource::Standard {
                base: "Helvetica-Bold",
                widths: &HELVETICA_BOLD_WIDTHS,
            },
        }
    }

    /// Identifies the resource so every face is registered once per page.
    pub(super) fn key(&self) -> String {
        match self {
            FontResource::Standard { base, .. } => (*base).to_string(),
            FontResource::Embedded { face, .. } => face.name.clone(),
        }
    }

    /// Width of `text` in points at `size`.
    pub(super) fn width(&self, text: &str, size: f32) -> f32 {
        let milli: f32 = match self {
            FontResource::Standard { widths, .. } => text
                .chars()
                .map(|ch| f32::from(widths[ascii_fold(ch) as usize - 0x20]))
                .sum(),
            FontResource::Embedded { face, .. } => text.chars().map(|ch| face.advance_milli(ch)).sum(),
        };
        milli * size / 1000.0
    }

    /// Encodes `text` as a string operand for `Tj`.
    pub(super) fn encode(&mut self, text: &str) -> Object {
        match self {
            FontResource::Standard { .. } => {
                Object::String(win_ansi(text), StringFormat::Literal)
            }
            FontResource::Embedded { face, used } => {
                let mut bytes = Vec::with_capacity(text.len() * 2);
                for ch in text.chars() {
                    let gid = face.glyph_id(ch);
                    used.entry(gid).or_insert(ch);
                    bytes.extend_from_slice(&gid.to_be_bytes());
                }
                Object::String(bytes, StringFormat::Hexadecimal)
            }
        }
    }

    /// Adds the font objects to `doc` and returns the font dictionary id.
    pub(super) fn write(&self, doc: &mut Document) -> ObjectId {
        match self {
            FontResource::Standard { base, .. } => doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => *base,
                "Encoding" => "WinAnsiEncoding",
            }),
            FontResource::Embedded { face, used } => write_type0(doc, face, used),
        }
    }
}

/// WinAnsiEncoding matches Latin-1 for U+00A0..U+00FF; everything else
/// outside ASCII is folded.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|ch| match ch {
            ' '..='~' => ch as u8,
            '\u{a1}'..='\u{ff}' => ch as u32 as u8,
            other => ascii_fold(other) as u8,
        })
        .collect()
}

fn base_font_name(face: &FontFace) -> Vec<u8> {
    face.name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect::<String>()
        .into_bytes()
}

fn write_type0(doc: &mut Document, face: &FontFace, used: &BTreeMap<u16, char>) -> ObjectId {
    let base = base_font_name(face);
    let (ascent, descent) = face.vertical_milli();

    let file_id = doc.add_object(Stream::new(
        dictionary! { "Length1" => face.data.len() as i64 },
        face.data.as_ref().clone(),
    ));

    let descriptor_id = doc.add_object(dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => Object::Name(base.clone()),
        "Flags" => 32,
        "FontBBox" => vec![
            Object::Integer(0),
            Object::Integer(descent.round() as i64),
            Object::Integer(1000),
            Object::Integer(ascent.round() as i64),
        ],
        "ItalicAngle" => 0,
        "Ascent" => ascent.round() as i64,
        "Descent" => descent.round() as i64,
        "CapHeight" => ascent.round() as i64,
        "StemV" => 80,
        "FontFile2" => file_id,
    });

    let mut widths: Vec<Object> = Vec::with_capacity(used.len() * 2);
    for (gid, ch) in used {
        widths.push(Object::Integer(i64::from(*gid)));
        widths.push(Object::Array(vec![Object::Integer(
            face.advance_milli(*ch).round() as i64,
        )]));
    }

    let descendant_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "CIDFontType2",
        "BaseFont" => Object::Name(base.clone()),
        "CIDSystemInfo" => dictionary! {
            "Registry" => Object::string_literal("Adobe"),
            "Ordering" => Object::string_literal("Identity"),
            "Supplement" => 0,
        },
        "FontDescriptor" => descriptor_id,
        "CIDToGIDMap" => "Identity",
        "DW" => 1000,
        "W" => widths,
    });

    let to_unicode_id = doc.add_object(Stream::new(dictionary! {}, to_unicode_cmap(used)));

    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type0",
        "BaseFont" => Object::Name(base),
        "Encoding" => "Identity-H",
        "DescendantFonts" => vec![Object::Reference(descendant_id)],
        "ToUnicode" => to_unicode_id,
    })
}

fn to_unicode_cmap(used: &BTreeMap<u16, char>) -> Vec<u8> {
    let mut cmap = String::from(
        "/CIDInit /ProcSet findresource begin\n\
         12 dict begin\n\
         begincmap\n\
         /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
         /CMapName /Adobe-Identity-UCS def\n\
         /CMapType 2 def\n\
         1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n",
    );
    let entries: Vec<(&u16, &char)> = used.iter().collect();
    // bfchar sections hold at most 100 entries
    for chunk in entries.chunks(100) {
        cmap.push_str(&format!("{} beginbfchar\n", chunk.len()));
        for (gid, ch) in chunk {
            let mut units = [0u16; 2];
            let hex: String = ch
                .encode_utf16(&mut units)
                .iter()
                .map(|u| format!("{:04X}", u))
                .collect();
            cmap.push_str(&format!("<{:04X}> <{}>\n", gid, hex));
        }
        cmap.push_str("endbfchar\n");
    }
    cmap.push_str("endcmap\nCMapName currentdict /CMap defineresource pop\nend\nend\n");
    cmap.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn helvetica() -> FontResource {
        FontResource::for_font(&Font {
            source: FontSource::Builtin(Builtin::Regular),
            size: 12.0,
        })
    }

    #[test]
    fn helvetica_width_uses_afm_metrics() {
        // "Hi" = 722 + 222
        let width = helvetica().width("Hi", 10.0);
        assert!((width - 9.44).abs() < 1e-3);
    }

    #[test]
    fn win_ansi_keeps_latin1_and_folds_the_rest() {
        assert_eq!(win_ansi("Çö"), vec![0xC7, 0xF6]);
        assert_eq!(win_ansi("şİ"), b"sI".to_vec());
    }

    #[test]
    fn cmap_lists_used_glyphs() {
        let mut used = BTreeMap::new();
        used.insert(36u16, 'A');
        used.insert(300u16, 'ş');
        let cmap = String::from_utf8(to_unicode_cmap(&used)).unwrap();
        assert!(cmap.contains("2 beginbfchar"));
        assert!(cmap.contains("<0024> <0041>"));
        assert!(cmap.contains("<012C> <015F>"));
    }
}
