// Font discovery for the raster and PDF renderers.
// TrueType faces are looked up by file name in the usual system font folders;
// when nothing is found the renderers fall back to built-in fonts.
use rusttype::{Font as TrueTypeFont, Scale};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

const FONT_DIRS: &[&str] = &[
    "fonts",
    "/usr/share/fonts/truetype/dejavu",
    "/usr/share/fonts/truetype/liberation",
    "/usr/share/fonts/dejavu",
    "/usr/share/fonts/TTF",
    "/System/Library/Fonts/Supplemental",
    "/Library/Fonts",
];

static EXTRA_DIR: OnceLock<PathBuf> = OnceLock::new();
static FACES: OnceLock<Mutex<HashMap<String, Option<FontFace>>>> = OnceLock::new();

/// Adds a directory that is searched before the system font folders.
/// Only the first registration wins.
pub fn register_font_dir(dir: impl Into<PathBuf>) {
    let _ = EXTRA_DIR.set(dir.into());
}

/// A parsed TrueType face together with the raw file, which the PDF
/// renderer embeds.
#[derive(Clone)]
pub struct FontFace {
    pub name: String,
    pub data: Arc<Vec<u8>>,
    pub font: TrueTypeFont<'static>,
}

impl FontFace {
    fn parse(name: &str, data: Vec<u8>) -> Option<Self> {
        let font = TrueTypeFont::try_from_vec(data.clone())?;
        Some(Self {
            name: name.to_string(),
            data: Arc::new(data),
            font,
        })
    }

    pub fn units_per_em(&self) -> f32 {
        f32::from(self.font.units_per_em().max(1))
    }

    /// rusttype scales relative to ascent - descent; this converts a point
    /// size (em based) into that scale.
    pub fn scale_for(&self, size: f32) -> Scale {
        let vm = self.font.v_metrics_unscaled();
        Scale::uniform(size * (vm.ascent - vm.descent) / self.units_per_em())
    }

    /// Advance width of `ch` in 1/1000 em.
    pub fn advance_milli(&self, ch: char) -> f32 {
        let vm = self.font.v_metrics_unscaled();
        let unit = Scale::uniform(vm.ascent - vm.descent);
        let advance = self.font.glyph(ch).scaled(unit).h_metrics().advance_width;
        advance * 1000.0 / self.units_per_em()
    }

    pub fn glyph_id(&self, ch: char) -> u16 {
        self.font.glyph(ch).id().0
    }

    /// Ascent and descent in 1/1000 em.
    pub fn vertical_milli(&self) -> (f32, f32) {
        let vm = self.font.v_metrics_unscaled();
        let k = 1000.0 / self.units_per_em();
        (vm.ascent * k, vm.descent * k)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Builtin {
    Regular,
    Bold,
}

#[derive(Clone)]
pub enum FontSource {
    TrueType(FontFace),
    Builtin(Builtin),
}

/// A usable font at a given point size.
#[derive(Clone)]
pub struct Font {
    pub source: FontSource,
    pub size: f32,
}

impl Font {
    pub fn is_builtin(&self) -> bool {
        matches!(self.source, FontSource::Builtin(_))
    }
}

/// Loads the named font (file stem, e.g. `DejaVuSans-Bold`) at `size`.
/// Never fails: an unknown or unreadable font yields the built-in family,
/// bold when the name says so.
pub fn load_font(name: &str, size: f32) -> Font {
    match find_face(name) {
        Some(face) => Font {
            source: FontSource::TrueType(face),
            size,
        },
        None => {
            let weight = if name.to_ascii_lowercase().contains("bold") {
                Builtin::Bold
            } else {
                Builtin::Regular
            };
            Font {
                source: FontSource::Builtin(weight),
                size,
            }
        }
    }
}

fn find_face(name: &str) -> Option<FontFace> {
    let cache = FACES.get_or_init(|| Mutex::new(HashMap::new()));
    let mut cache = match cache.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Some(hit) = cache.get(name) {
        return hit.clone();
    }

    let face = search_dirs()
        .iter()
        .flat_map(|dir| face_paths(dir, name))
        .find_map(|path| read_face(name, &path));

    match &face {
        Some(_) => tracing::debug!(font = name, "loaded TrueType font"),
        None => tracing::warn!(font = name, "font not found, using built-in fallback"),
    }
    cache.insert(name.to_string(), face.clone());
    face
}

fn search_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::with_capacity(FONT_DIRS.len() + 1);
    if let Some(extra) = EXTRA_DIR.get() {
        dirs.push(extra.clone());
    }
    dirs.extend(FONT_DIRS.iter().map(PathBuf::from));
    dirs
}

/// Only TrueType outlines: PDF pages embed faces as `FontFile2`.
fn face_paths(dir: &Path, name: &str) -> Vec<PathBuf> {
    ["ttf", "TTF"]
        .iter()
        .map(|ext| dir.join(format!("{}.{}", name, ext)))
        .collect()
}

fn read_face(name: &str, path: &Path) -> Option<FontFace> {
    let data = std::fs::read(path).ok()?;
    if data.starts_with(b"OTTO") {
        tracing::warn!(path = %path.display(), "skipping CFF-outline font");
        return None;
    }
    FontFace::parse(name, data)
}

/// Folds characters the built-in fonts cannot show onto plain ASCII.
/// Turkish letters keep their base letter; anything else becomes `?`.
pub fn ascii_fold(ch: char) -> char {
    match ch {
        ' '..='~' => ch,
        'ç' => 'c',
        'Ç' => 'C',
        'ğ' => 'g',
        'Ğ' => 'G',
        'ı' => 'i',
        'İ' => 'I',
        'ö' => 'o',
        'Ö' => 'O',
        'ş' => 's',
        'Ş' => 'S',
        'ü' => 'u',
        'Ü' => 'U',
        'â' | 'à' | 'á' | 'ä' | 'ã' | 'å' => 'a',
        'Â' | 'À' | 'Á' | 'Ä' | 'Ã' | 'Å' => 'A',
        'ê' | 'è' | 'é' | 'ë' => 'e',
        'Ê' | 'È' | 'É' | 'Ë' => 'E',
        'î' | 'ì' | 'í' | 'ï' => 'i',
        'Î' | 'Ì' | 'Í' | 'Ï' => 'I',
        'ô' | 'ò' | 'ó' | 'õ' => 'o',
        'Ô' | 'Ò' | 'Ó' | 'Õ' => 'O',
        'û' | 'ù' | 'ú' => 'u',
        'Û' | 'Ù' | 'Ú' => 'U',
        'ñ' => 'n',
        'Ñ' => 'N',
        '\u{2018}' | '\u{2019}' => '\'',
        '\u{201C}' | '\u{201D}' => '"',
        '\u{2013}' | '\u{2014}' => '-',
        '\t' | '\u{a0}' => ' ',
        _ => '?',
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_font_falls_back_to_builtin() {
        let font = load_font("NoSuchFace-Regular-7f3a", 14.0);
        assert!(font.is_builtin());
        assert_eq!(font.size, 14.0);
        assert!(matches!(font.source, FontSource::Builtin(Builtin::Regular)));
    }

    #[test]
    fn bold_name_selects_bold_fallback() {
        let font = load_font("NoSuchFace-Bold-7f3a", 20.0);
        assert!(matches!(font.source, FontSource::Builtin(Builtin::Bold)));
    }

    #[test]
    fn only_truetype_files_are_searched() {
        let paths = face_paths(Path::new("/fonts"), "DejaVuSans");
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/fonts/DejaVuSans.ttf"),
                PathBuf::from("/fonts/DejaVuSans.TTF"),
            ]
        );
    }

    #[test]
    fn cff_outlines_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Cff.ttf");
        let mut data = b"OTTO".to_vec();
        data.extend_from_slice(&[0u8; 64]);
        std::fs::write(&path, data).unwrap();
        assert!(read_face("Cff", &path).is_none());
    }

    #[test]
    fn ascii_fold_keeps_base_letters() {
        let folded: String = "SERTİFİKA ğüşıöç".chars().map(ascii_fold).collect();
        assert_eq!(folded, "SERTIFIKA gusioc");
        assert_eq!(ascii_fold('€'), '?');
    }
}
