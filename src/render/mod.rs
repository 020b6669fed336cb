//! Certificate rendering: raster images, PDF pages and the format converter.
//!
//! The raster and PDF renderers draw the same fixed layout; the constants
//! below are shared so both outputs read the same.

pub mod bitmap;
pub mod convert;
pub mod fonts;
pub mod pdf;
pub mod raster;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("could not decode template: {0}")]
    Decode(String),

    #[error("could not encode certificate: {0}")]
    Encode(String),

    #[error("drawing backend failed: {0}")]
    Backend(String),
}

/// Landscape A4 in PDF points; also the blank raster canvas size in pixels.
pub const PAGE_WIDTH: f32 = 842.0;
pub const PAGE_HEIGHT: f32 = 595.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Color(pub u8, pub u8, pub u8);

impl Color {
    pub const BACKGROUND: Color = Color(0xf9, 0xf9, 0xf9);
    pub const FRAME: Color = Color(0x34, 0x98, 0xdb);
    pub const INK: Color = Color(0x2c, 0x3e, 0x50);
    pub const TEXT: Color = Color(0x34, 0x49, 0x5e);
    pub const ACCENT: Color = Color(0xe7, 0x4c, 0x3c);

    pub fn unit(self) -> (f32, f32, f32) {
        (
            f32::from(self.0) / 255.0,
            f32::from(self.1) / 255.0,
            f32::from(self.2) / 255.0,
        )
    }
}

pub const TITLE: &str = "SERTİFİKA";
pub const INTRO: &str = "Bu sertifika,";
pub const PARTICIPANT: &str = "isimli katılımcının";
pub const COMPLETION: &str = "eğitimini başarıyla tamamladığını belgelemektedir.";
pub const SIGNATURE_LINE: &str = "____________________";
pub const SIGNATURE_LABEL: &str = "Yetkili İmza";
pub const VERIFICATION_LABEL: &str = "Doğrulama Kodu";
/// Used where the full label does not fit the verification box.
pub const VERIFICATION_LABEL_SHORT: &str = "Kod";

pub fn date_line(date: &str) -> String {
    format!("Tarih: {}", date)
}

pub fn quoted(course: &str) -> String {
    format!("\"{}\"", course)
}

/// Font names (file stems) the renderers ask for. Missing files fall back
/// to the built-in fonts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Typefaces {
    pub regular: String,
    pub bold: String,
}

impl Default for Typefaces {
    fn default() -> Self {
        Self {
            regular: "DejaVuSans".to_string(),
            bold: "DejaVuSans-Bold".to_string(),
        }
    }
}

/// The values drawn onto image and PDF certificates.
#[derive(Clone, Debug)]
pub struct CertificateText {
    pub student_name: String,
    pub course_name: String,
    pub date: String,
    pub verification_stub: String,
}
