use std::sync::Arc;
use thiserror::Error;

use super::template::{substitute, unresolved_tokens, FieldMap, TemplateFormat};
use crate::render::raster::{self, RasterFormat};
use crate::render::{pdf, RenderError, Typefaces};
use crate::storage::{Store, StoreError, ARTIFACT_FOLDER};

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("template not found: {0}")]
    NotFound(String),

    #[error("unsupported template format: {0:?}")]
    UnsupportedFormat(String),

    #[error("certificate generation failed")]
    GenerationFailed,
}

/// Turns a template into certificate bytes of the same format family.
pub trait CertificateRenderer: Send + Sync {
    fn render(&self, template: &[u8], fields: &FieldMap) -> Result<Vec<u8>, RenderError>;
}

/// Token substitution over UTF-8 HTML.
pub struct HtmlRenderer;

impl CertificateRenderer for HtmlRenderer {
    fn render(&self, template: &[u8], fields: &FieldMap) -> Result<Vec<u8>, RenderError> {
        let html = std::str::from_utf8(template)
            .map_err(|e| RenderError::Decode(format!("template is not UTF-8: {}", e)))?;
        let out = substitute(html, fields.tokens());
        let leftover = unresolved_tokens(&out);
        if !leftover.is_empty() {
            tracing::debug!(?leftover, "template has unknown placeholders");
        }
        Ok(out.into_bytes())
    }
}

/// Draws the standard layout on a fresh page. The uploaded PDF only selects
/// this renderer; its bytes are not edited.
pub struct PdfRenderer {
    pub typefaces: Typefaces,
}

impl CertificateRenderer for PdfRenderer {
    fn render(&self, _template: &[u8], fields: &FieldMap) -> Result<Vec<u8>, RenderError> {
        pdf::render_certificate(&fields.certificate_text(), &self.typefaces)
    }
}

/// Draws the layout over the template image.
pub struct ImageRenderer {
    pub format: RasterFormat,
    pub typefaces: Typefaces,
}

impl CertificateRenderer for ImageRenderer {
    fn render(&self, template: &[u8], fields: &FieldMap) -> Result<Vec<u8>, RenderError> {
        raster::render(
            Some(template),
            &fields.certificate_text(),
            self.format,
            &self.typefaces,
        )
    }
}

/// Reads a course template from the store, renders it for one student and
/// stores the result under `certificates/`.
#[derive(Clone)]
pub struct CertificateGenerator {
    store: Arc<dyn Store>,
    typefaces: Typefaces,
}

impl CertificateGenerator {
    pub fn new(store: Arc<dyn Store>, typefaces: Typefaces) -> Self {
        Self { store, typefaces }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn typefaces(&self) -> &Typefaces {
        &self.typefaces
    }

    fn renderer_for(&self, format: TemplateFormat) -> Box<dyn CertificateRenderer> {
        match format {
            TemplateFormat::Html => Box::new(HtmlRenderer),
            TemplateFormat::Pdf => Box::new(PdfRenderer {
                typefaces: self.typefaces.clone(),
            }),
            TemplateFormat::Image(format) => Box::new(ImageRenderer {
                format,
                typefaces: self.typefaces.clone(),
            }),
        }
    }

    /// Returns the store path of the new certificate. Every call writes a
    /// new artifact, even for identical input.
    pub fn generate(&self, template_path: &str, fields: &FieldMap) -> Result<String, GenerateError> {
        let format = TemplateFormat::from_path(template_path)
            .map_err(GenerateError::UnsupportedFormat)?;

        let template = match self.store.read(template_path) {
            Ok(bytes) => bytes,
            Err(StoreError::NotFound(path)) => return Err(GenerateError::NotFound(path)),
            Err(e) => {
                tracing::error!(template = %template_path, error = %e, "could not read template");
                return Err(GenerateError::GenerationFailed);
            }
        };

        let bytes = self
            .renderer_for(format)
            .render(&template, fields)
            .map_err(|e| {
                tracing::error!(template = %template_path, error = %e, "rendering failed");
                GenerateError::GenerationFailed
            })?;

        let path = self
            .store
            .write(&bytes, ARTIFACT_FOLDER, format.extension())
            .map_err(|e| {
                tracing::error!(template = %template_path, error = %e, "could not store certificate");
                GenerateError::GenerationFailed
            })?;

        tracing::info!(
            template = %template_path,
            certificate = %path,
            student = %fields.student_name,
            "certificate generated"
        );
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use image::{DynamicImage, GenericImageView, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn fields() -> FieldMap {
        FieldMap {
            student_name: "Ada Lovelace".to_string(),
            course_name: "Algorithms 101".to_string(),
            instructor_name: "Charles Babbage".to_string(),
            date: "01.01.2030".to_string(),
            serial_number: "203001010007".to_string(),
            verification_code: Some("0123456789abcdef".to_string()),
        }
    }

    fn setup() -> (Arc<MemoryStore>, CertificateGenerator) {
        let store = Arc::new(MemoryStore::new());
        let generator = CertificateGenerator::new(store.clone(), Typefaces::default());
        (store, generator)
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([255, 255, 255])))
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn html_template_is_filled_in() {
        let (store, generator) = setup();
        store.insert(
            "certificate-templates/welcome.html",
            "<p>{{ogrenci_adi}} - {{kurs_adi}} - {{tarih}}</p>",
        );

        let path = generator
            .generate("certificate-templates/welcome.html", &fields())
            .unwrap();
        assert!(path.starts_with("certificates/"));
        assert!(path.ends_with(".html"));

        let html = String::from_utf8(store.read(&path).unwrap()).unwrap();
        assert_eq!(html, "<p>Ada Lovelace - Algorithms 101 - 01.01.2030</p>");
    }

    #[test]
    fn html_output_has_no_known_tokens_left() {
        let (store, generator) = setup();
        store.insert(
            "certificate-templates/all.HTML",
            "{{ogrenci_adi}} {{kurs_adi}} {{egitmen_adi}} {{tarih}} {{sertifika_no}}",
        );
        let path = generator
            .generate("certificate-templates/all.HTML", &fields())
            .unwrap();
        let html = String::from_utf8(store.read(&path).unwrap()).unwrap();
        assert!(unresolved_tokens(&html).is_empty());
        assert!(html.contains("Charles Babbage"));
        assert!(html.contains("203001010007"));
    }

    #[test]
    fn each_call_stores_a_new_artifact() {
        let (store, generator) = setup();
        store.insert("certificate-templates/t.html", "{{ogrenci_adi}}");
        let a = generator.generate("certificate-templates/t.html", &fields()).unwrap();
        let b = generator.generate("certificate-templates/t.html", &fields()).unwrap();
        assert_ne!(a, b);
        assert_eq!(store.read(&a).unwrap(), store.read(&b).unwrap());
    }

    #[test]
    fn raster_certificate_keeps_template_dimensions() {
        let (store, generator) = setup();
        store.insert("certificate-templates/bg.png", png(1000, 700));

        let path = generator.generate("certificate-templates/bg.png", &fields()).unwrap();
        assert!(path.ends_with(".png"));
        let img = image::load_from_memory(&store.read(&path).unwrap()).unwrap();
        assert_eq!(img.dimensions(), (1000, 700));
    }

    #[test]
    fn jpeg_template_gives_jpg_artifact() {
        let (store, generator) = setup();
        let mut jpeg = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::from_pixel(300, 200, Rgb([250, 250, 250])))
            .write_to(&mut jpeg, ImageFormat::Jpeg)
            .unwrap();
        store.insert("certificate-templates/bg.jpeg", jpeg.into_inner());

        let path = generator.generate("certificate-templates/bg.jpeg", &fields()).unwrap();
        assert!(path.ends_with(".jpg"));
        let img = image::load_from_memory(&store.read(&path).unwrap()).unwrap();
        assert_eq!(img.dimensions(), (300, 200));
    }

    #[test]
    fn pdf_template_gives_fresh_pdf() {
        let (store, generator) = setup();
        store.insert("certificate-templates/t.pdf", b"%PDF-1.4 not really".to_vec());

        let path = generator.generate("certificate-templates/t.pdf", &fields()).unwrap();
        assert!(path.ends_with(".pdf"));
        let doc = lopdf::Document::load_mem(&store.read(&path).unwrap()).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn unsupported_extension_writes_nothing() {
        let (store, generator) = setup();
        store.insert("certificate-templates/t.docx", b"PK".to_vec());

        let err = generator
            .generate("certificate-templates/t.docx", &fields())
            .unwrap_err();
        assert!(matches!(err, GenerateError::UnsupportedFormat(ext) if ext == "docx"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn missing_template_writes_nothing() {
        let (store, generator) = setup();
        let err = generator
            .generate("certificate-templates/missing.html", &fields())
            .unwrap_err();
        assert!(matches!(err, GenerateError::NotFound(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn broken_image_fails_without_writing() {
        let (store, generator) = setup();
        store.insert("certificate-templates/bg.png", b"not a png".to_vec());

        let err = generator
            .generate("certificate-templates/bg.png", &fields())
            .unwrap_err();
        assert!(matches!(err, GenerateError::GenerationFailed));
        assert_eq!(store.len(), 1);
    }
}
