//! Single-page PDF drawing on top of `lopdf`, and the PDF certificate layout.

mod font;

use image::RgbImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, Stream};

use self::font::FontResource;
use super::fonts::{load_font, Font};
use super::{
    date_line, quoted, CertificateText, Color, RenderError, Typefaces, COMPLETION, INTRO,
    PAGE_HEIGHT, PAGE_WIDTH, PARTICIPANT, SIGNATURE_LABEL, SIGNATURE_LINE, TITLE,
    VERIFICATION_LABEL,
};

/// A page under construction. Coordinates are PDF points with the origin in
/// the lower-left corner.
pub struct PdfPage {
    width: f32,
    height: f32,
    operations: Vec<Operation>,
    fonts: Vec<FontResource>,
    images: Vec<RgbImage>,
}

impl PdfPage {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            operations: Vec::new(),
            fonts: Vec::new(),
            images: Vec::new(),
        }
    }

    pub fn landscape_a4() -> Self {
        Self::new(PAGE_WIDTH, PAGE_HEIGHT)
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn fill_color(&mut self, color: Color) {
        let (r, g, b) = color.unit();
        self.operations
            .push(Operation::new("rg", vec![r.into(), g.into(), b.into()]));
    }

    pub fn stroke_color(&mut self, color: Color) {
        let (r, g, b) = color.unit();
        self.operations
            .push(Operation::new("RG", vec![r.into(), g.into(), b.into()]));
    }

    pub fn line_width(&mut self, width: f32) {
        self.operations.push(Operation::new("w", vec![width.into()]));
    }

    pub fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32) {
        self.rect(x, y, w, h);
        self.operations.push(Operation::new("f", vec![]));
    }

    pub fn stroke_rect(&mut self, x: f32, y: f32, w: f32, h: f32) {
        self.rect(x, y, w, h);
        self.operations.push(Operation::new("S", vec![]));
    }

    fn rect(&mut self, x: f32, y: f32, w: f32, h: f32) {
        self.operations.push(Operation::new(
            "re",
            vec![x.into(), y.into(), w.into(), h.into()],
        ));
    }

    fn font_index(&mut self, font: &Font) -> usize {
        let resource = FontResource::for_font(font);
        let key = resource.key();
        match self.fonts.iter().position(|f| f.key() == key) {
            Some(index) => index,
            None => {
                self.fonts.push(resource);
                self.fonts.len() - 1
            }
        }
    }

    pub fn text_width(&mut self, font: &Font, text: &str) -> f32 {
        let index = self.font_index(font);
        self.fonts[index].width(text, font.size)
    }

    /// Draws `text` with its baseline starting at (`x`, `y`) in the current
    /// fill color.
    pub fn text(&mut self, font: &Font, x: f32, y: f32, text: &str) {
        let index = self.font_index(font);
        let encoded = self.fonts[index].encode(text);
        let name = format!("F{}", index + 1);
        self.operations.push(Operation::new("BT", vec![]));
        self.operations.push(Operation::new(
            "Tf",
            vec![Object::Name(name.into_bytes()), font.size.into()],
        ));
        self.operations
            .push(Operation::new("Td", vec![x.into(), y.into()]));
        self.operations.push(Operation::new("Tj", vec![encoded]));
        self.operations.push(Operation::new("ET", vec![]));
    }

    pub fn text_centered(&mut self, font: &Font, center_x: f32, y: f32, text: &str) {
        let width = self.text_width(font, text);
        self.text(font, center_x - width / 2.0, y, text);
    }

    pub fn text_right(&mut self, font: &Font, right_x: f32, y: f32, text: &str) {
        let width = self.text_width(font, text);
        self.text(font, right_x - width, y, text);
    }

    /// Places `image` scaled to `w` x `h` with its lower-left corner at (`x`, `y`).
    pub fn image(&mut self, image: RgbImage, x: f32, y: f32, w: f32, h: f32) {
        self.images.push(image);
        let name = format!("Im{}", self.images.len());
        self.operations.push(Operation::new("q", vec![]));
        self.operations.push(Operation::new(
            "cm",
            vec![
                w.into(),
                0.into(),
                0.into(),
                h.into(),
                x.into(),
                y.into(),
            ],
        ));
        self.operations
            .push(Operation::new("Do", vec![Object::Name(name.into_bytes())]));
        self.operations.push(Operation::new("Q", vec![]));
    }

    /// Serializes the page into a complete PDF document held in memory.
    pub fn finish(self, title: &str) -> Result<Vec<u8>, RenderError> {
        let PdfPage {
            width,
            height,
            operations,
            fonts,
            images,
        } = self;

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut font_dict = Dictionary::new();
        for (i, font) in fonts.iter().enumerate() {
            let id = font.write(&mut doc);
            font_dict.set(format!("F{}", i + 1), id);
        }

        let mut xobjects = Dictionary::new();
        for (i, image) in images.into_iter().enumerate() {
            let (w, h) = image.dimensions();
            let id = doc.add_object(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => i64::from(w),
                    "Height" => i64::from(h),
                    "ColorSpace" => "DeviceRGB",
                    "BitsPerComponent" => 8,
                },
                image.into_raw(),
            ));
            xobjects.set(format!("Im{}", i + 1), id);
        }

        let content = Content { operations }
            .encode()
            .map_err(|e| RenderError::Backend(e.to_string()))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        let resources_id = doc.add_object(dictionary! {
            "Font" => font_dict,
            "XObject" => xobjects,
        });

        let media_box: Vec<Object> = vec![0.into(), 0.into(), width.into(), height.into()];
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => media_box,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        let info_id = doc.add_object(dictionary! {
            "Title" => Object::string_literal(title),
            "Producer" => Object::string_literal("sertifika"),
        });
        doc.trailer.set("Root", catalog_id);
        doc.trailer.set("Info", info_id);
        doc.compress();

        let mut out = Vec::new();
        doc.save_to(&mut out)
            .map_err(|e| RenderError::Backend(e.to_string()))?;
        Ok(out)
    }
}

/// Renders the certificate layout onto a fresh landscape A4 page.
pub fn render_certificate(
    text: &CertificateText,
    typefaces: &Typefaces,
) -> Result<Vec<u8>, RenderError> {
    let mut page = PdfPage::landscape_a4();
    let (w, h) = (page.width(), page.height());

    let title = load_font(&typefaces.bold, 36.0);
    let subtitle = load_font(&typefaces.bold, 20.0);
    let course = load_font(&typefaces.bold, 18.0);
    let normal = load_font(&typefaces.regular, 14.0);
    let label = load_font(&typefaces.regular, 12.0);
    let small = load_font(&typefaces.regular, 8.0);

    page.fill_color(Color::BACKGROUND);
    page.fill_rect(0.0, 0.0, w, h);

    page.stroke_color(Color::FRAME);
    page.line_width(10.0);
    page.stroke_rect(20.0, 20.0, w - 40.0, h - 40.0);
    page.stroke_color(Color::INK);
    page.line_width(2.0);
    page.stroke_rect(30.0, 30.0, w - 60.0, h - 60.0);

    page.fill_color(Color::INK);
    page.text_centered(&title, w / 2.0, h - 100.0, TITLE);

    page.fill_color(Color::TEXT);
    page.text_right(&label, w - 50.0, h - 150.0, &date_line(&text.date));

    let mid = h / 2.0;
    page.text_centered(&normal, w / 2.0, mid + 50.0, INTRO);
    page.fill_color(Color::ACCENT);
    page.text_centered(&subtitle, w / 2.0, mid + 20.0, &text.student_name);
    page.fill_color(Color::TEXT);
    page.text_centered(&normal, w / 2.0, mid - 10.0, PARTICIPANT);
    page.fill_color(Color::FRAME);
    page.text_centered(&course, w / 2.0, mid - 50.0, &quoted(&text.course_name));
    page.fill_color(Color::TEXT);
    page.text_centered(&normal, w / 2.0, mid - 90.0, COMPLETION);

    page.text(&label, w - 200.0, h / 4.0 - 20.0, SIGNATURE_LINE);
    page.text(&label, w - 180.0, h / 4.0 - 40.0, SIGNATURE_LABEL);

    page.stroke_color(Color::TEXT);
    page.line_width(1.0);
    page.stroke_rect(50.0, 50.0, 100.0, 100.0);
    page.text_centered(&small, 100.0, 110.0, VERIFICATION_LABEL);
    page.text_centered(&small, 100.0, 90.0, &text.verification_stub);

    page.finish("Sertifika")
}
