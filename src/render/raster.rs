// Image certificates: the fixed layout drawn onto a template image or a
// blank canvas. Positions are laid out for 842x595 and scaled to the canvas.
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use rusttype::point;
use std::io::Cursor;

use super::bitmap;
use super::fonts::{load_font, Builtin, Font, FontSource};
use super::{
    date_line, quoted, CertificateText, Color, RenderError, Typefaces, COMPLETION, INTRO,
    PAGE_HEIGHT, PAGE_WIDTH, PARTICIPANT, SIGNATURE_LABEL, SIGNATURE_LINE, TITLE,
    VERIFICATION_LABEL, VERIFICATION_LABEL_SHORT,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RasterFormat {
    Png,
    Jpeg,
}

impl RasterFormat {
    pub fn extension(self) -> &'static str {
        match self {
            RasterFormat::Png => "png",
            RasterFormat::Jpeg => "jpg",
        }
    }

    fn image_format(self) -> ImageFormat {
        match self {
            RasterFormat::Png => ImageFormat::Png,
            RasterFormat::Jpeg => ImageFormat::Jpeg,
        }
    }
}

#[derive(Clone, Copy)]
enum Anchor {
    Center,
    RightMiddle,
    TopLeft,
}

struct Canvas {
    img: RgbImage,
    sx: f32,
    sy: f32,
}

impl Canvas {
    fn new(img: RgbImage) -> Self {
        let sx = img.width() as f32 / PAGE_WIDTH;
        let sy = img.height() as f32 / PAGE_HEIGHT;
        Self { img, sx, sy }
    }

    fn width(&self) -> f32 {
        PAGE_WIDTH
    }

    fn height(&self) -> f32 {
        PAGE_HEIGHT
    }

    fn font_scale(&self) -> f32 {
        self.sx.min(self.sy)
    }

    fn px(&self, x: f32) -> f32 {
        x * self.sx
    }

    fn py(&self, y: f32) -> f32 {
        y * self.sy
    }

    fn font(&self, name: &str, size: f32) -> Font {
        load_font(name, size * self.font_scale())
    }

    fn put(&mut self, x: i64, y: i64, color: Color, coverage: f32) {
        if x < 0 || y < 0 || x >= i64::from(self.img.width()) || y >= i64::from(self.img.height()) {
            return;
        }
        if coverage <= 0.0 {
            return;
        }
        let a = coverage.min(1.0);
        let inv = 1.0 - a;
        let dst = self.img.get_pixel_mut(x as u32, y as u32);
        dst.0[0] = (f32::from(color.0) * a + f32::from(dst.0[0]) * inv) as u8;
        dst.0[1] = (f32::from(color.1) * a + f32::from(dst.0[1]) * inv) as u8;
        dst.0[2] = (f32::from(color.2) * a + f32::from(dst.0[2]) * inv) as u8;
    }

    /// Outline of the rectangle (x0, y0)-(x1, y1) in layout coordinates,
    /// `thickness` growing inwards.
    fn rectangle(&mut self, x0: f32, y0: f32, x1: f32, y1: f32, thickness: f32, color: Color) {
        let t = (thickness * self.font_scale()).round().max(1.0) as i64;
        let (x0, y0) = (self.px(x0).round() as i64, self.py(y0).round() as i64);
        let (x1, y1) = (self.px(x1).round() as i64, self.py(y1).round() as i64);
        for i in 0..t {
            for x in (x0 + i)..=(x1 - i) {
                self.put(x, y0 + i, color, 1.0);
                self.put(x, y1 - i, color, 1.0);
            }
            for y in (y0 + i)..=(y1 - i) {
                self.put(x0 + i, y, color, 1.0);
                self.put(x1 - i, y, color, 1.0);
            }
        }
    }

    /// Width, height and ascent of `text` in pixels.
    fn measure(font: &Font, text: &str) -> (f32, f32, f32) {
        match &font.source {
            FontSource::TrueType(face) => {
                let scale = face.scale_for(font.size);
                let vm = face.font.v_metrics(scale);
                let width = face
                    .font
                    .layout(text, scale, point(0.0, 0.0))
                    .last()
                    .map(|g| g.position().x + g.unpositioned().h_metrics().advance_width)
                    .unwrap_or(0.0);
                (width, vm.ascent - vm.descent, vm.ascent)
            }
            FontSource::Builtin(_) => {
                let height = bitmap::HEIGHT as f32;
                (bitmap::text_width(text) as f32, height, height)
            }
        }
    }

    /// The first of `labels` whose width fits in `max_width` layout units,
    /// or the last one when none does.
    fn fitting<'a>(&self, font: &Font, labels: &[&'a str], max_width: f32) -> &'a str {
        let limit = self.px(max_width);
        labels
            .iter()
            .copied()
            .find(|label| Self::measure(font, label).0 <= limit)
            .or_else(|| labels.last().copied())
            .unwrap_or_default()
    }

    fn text(&mut self, font: &Font, text: &str, x: f32, y: f32, anchor: Anchor, color: Color) {
        let (width, height, ascent) = Self::measure(font, text);
        let (x, y) = (self.px(x), self.py(y));
        let (left, top) = match anchor {
            Anchor::Center => (x - width / 2.0, y - height / 2.0),
            Anchor::RightMiddle => (x - width, y - height / 2.0),
            Anchor::TopLeft => (x, y),
        };

        match &font.source {
            FontSource::TrueType(face) => {
                let scale = face.scale_for(font.size);
                let glyphs: Vec<_> = face
                    .font
                    .layout(text, scale, point(left, top + ascent))
                    .collect();
                for glyph in glyphs {
                    if let Some(bb) = glyph.pixel_bounding_box() {
                        glyph.draw(|gx, gy, v| {
                            let px = i64::from(gx as i32 + bb.min.x);
                            let py = i64::from(gy as i32 + bb.min.y);
                            self.put(px, py, color, v);
                        });
                    }
                }
            }
            FontSource::Builtin(weight) => {
                let bold = *weight == Builtin::Bold;
                let (left, top) = (left.round() as i64, top.round() as i64);
                bitmap::for_each_pixel(text, left, top, |px, py| {
                    self.put(px, py, color, 1.0);
                    if bold {
                        self.put(px + 1, py, color, 1.0);
                    }
                });
            }
        }
    }
}

pub fn blank_canvas() -> RgbImage {
    let Color(r, g, b) = Color::BACKGROUND;
    RgbImage::from_pixel(PAGE_WIDTH as u32, PAGE_HEIGHT as u32, Rgb([r, g, b]))
}

/// Drops alpha by compositing the image over the certificate background, so
/// transparent templates keep a light page.
pub fn flatten(image: DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let rgba = image.to_rgba8();
    let Color(br, bg, bb) = Color::BACKGROUND;
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, px) in rgba.enumerate_pixels() {
        let [r, g, b, a] = px.0;
        let a = f32::from(a) / 255.0;
        let mix = |c: u8, base: u8| (f32::from(c) * a + f32::from(base) * (1.0 - a)).round() as u8;
        out.put_pixel(x, y, Rgb([mix(r, br), mix(g, bg), mix(b, bb)]));
    }
    out
}

/// Renders an image certificate. `background` is the template image; `None`
/// draws on a blank 842x595 canvas. The result keeps the canvas dimensions.
pub fn render(
    background: Option<&[u8]>,
    text: &CertificateText,
    format: RasterFormat,
    typefaces: &Typefaces,
) -> Result<Vec<u8>, RenderError> {
    let img = match background {
        Some(bytes) => {
            let decoded =
                image::load_from_memory(bytes).map_err(|e| RenderError::Decode(e.to_string()))?;
            flatten(decoded)
        }
        None => blank_canvas(),
    };
    if img.width() == 0 || img.height() == 0 {
        return Err(RenderError::Decode("template image is empty".to_string()));
    }

    let mut canvas = Canvas::new(img);
    draw_layout(&mut canvas, text, typefaces);
    encode(canvas.img, format)
}

fn draw_layout(canvas: &mut Canvas, text: &CertificateText, typefaces: &Typefaces) {
    let (w, h) = (canvas.width(), canvas.height());

    let title = canvas.font(&typefaces.bold, 36.0);
    let subtitle = canvas.font(&typefaces.bold, 20.0);
    let course = canvas.font(&typefaces.bold, 18.0);
    let normal = canvas.font(&typefaces.regular, 14.0);
    let label = canvas.font(&typefaces.regular, 12.0);
    let small = canvas.font(&typefaces.regular, 9.0);

    canvas.rectangle(20.0, 20.0, w - 20.0, h - 20.0, 10.0, Color::FRAME);
    canvas.rectangle(30.0, 30.0, w - 30.0, h - 30.0, 2.0, Color::INK);

    canvas.text(&title, TITLE, w / 2.0, 100.0, Anchor::Center, Color::INK);
    canvas.text(
        &label,
        &date_line(&text.date),
        w - 50.0,
        150.0,
        Anchor::RightMiddle,
        Color::TEXT,
    );

    let mid = h / 2.0;
    canvas.text(&normal, INTRO, w / 2.0, mid - 50.0, Anchor::Center, Color::TEXT);
    canvas.text(
        &subtitle,
        &text.student_name,
        w / 2.0,
        mid - 20.0,
        Anchor::Center,
        Color::ACCENT,
    );
    canvas.text(&normal, PARTICIPANT, w / 2.0, mid + 10.0, Anchor::Center, Color::TEXT);
    canvas.text(
        &course,
        &quoted(&text.course_name),
        w / 2.0,
        mid + 50.0,
        Anchor::Center,
        Color::FRAME,
    );
    canvas.text(&normal, COMPLETION, w / 2.0, mid + 90.0, Anchor::Center, Color::TEXT);

    canvas.text(&label, SIGNATURE_LINE, w - 200.0, h - 120.0, Anchor::TopLeft, Color::TEXT);
    canvas.text(&label, SIGNATURE_LABEL, w - 180.0, h - 95.0, Anchor::TopLeft, Color::TEXT);

    canvas.rectangle(50.0, h - 150.0, 150.0, h - 50.0, 1.0, Color::TEXT);
    let verification =
        canvas.fitting(&small, &[VERIFICATION_LABEL, VERIFICATION_LABEL_SHORT], 96.0);
    canvas.text(&small, verification, 100.0, h - 110.0, Anchor::Center, Color::TEXT);
    canvas.text(
        &small,
        &text.verification_stub,
        100.0,
        h - 90.0,
        Anchor::Center,
        Color::TEXT,
    );
}

fn encode(img: RgbImage, format: RasterFormat) -> Result<Vec<u8>, RenderError> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, format.image_format())
        .map_err(|e| RenderError::Encode(e.to_string()))?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn sample_text() -> CertificateText {
        CertificateText {
            student_name: "Ada Lovelace".to_string(),
            course_name: "Algorithms 101".to_string(),
            date: "01.01.2030".to_string(),
            verification_stub: "1a2b3c4d".to_string(),
        }
    }

    fn missing_typefaces() -> Typefaces {
        Typefaces {
            regular: "NoSuchFace-Regular-7f3a".to_string(),
            bold: "NoSuchFace-Bold-7f3a".to_string(),
        }
    }

    fn encode_png(img: RgbImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn text_band_has_ink(img: &RgbImage) -> bool {
        let Color(r, g, b) = Color::BACKGROUND;
        let background = Rgb([r, g, b]);
        let (w, h) = (img.width(), img.height());
        (h / 2 - 60..h / 2 + 100)
            .flat_map(|y| (100..w - 100).map(move |x| (x, y)))
            .any(|(x, y)| *img.get_pixel(x, y) != background)
    }

    #[test]
    fn blank_canvas_png_has_fixed_size_and_text() {
        for typefaces in [missing_typefaces(), Typefaces::default()] {
            let bytes = render(None, &sample_text(), RasterFormat::Png, &typefaces).unwrap();
            let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::Png)
                .unwrap()
                .to_rgb8();
            assert_eq!(decoded.dimensions(), (842, 595));
            assert!(text_band_has_ink(&decoded));
        }
    }

    #[test]
    fn template_dimensions_are_preserved() {
        let template = encode_png(RgbImage::from_pixel(400, 300, Rgb([255, 255, 255])));
        let bytes = render(
            Some(&template),
            &sample_text(),
            RasterFormat::Jpeg,
            &missing_typefaces(),
        )
        .unwrap();
        let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::Jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (400, 300));
    }

    #[test]
    fn frame_is_drawn_at_scaled_inset() {
        let template = encode_png(RgbImage::from_pixel(1684, 1190, Rgb([255, 255, 255])));
        let bytes = render(
            Some(&template),
            &sample_text(),
            RasterFormat::Png,
            &missing_typefaces(),
        )
        .unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgb8();
        let Color(r, g, b) = Color::FRAME;
        // outer frame starts at 20 * 2 px and is 10 * 2 px thick
        assert_eq!(*decoded.get_pixel(842, 45), Rgb([r, g, b]));
        assert_eq!(*decoded.get_pixel(842, 20), Rgb([255, 255, 255]));
    }

    #[test]
    fn transparent_template_keeps_light_background() {
        let template = {
            let mut out = Cursor::new(Vec::new());
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(842, 595, Rgba([0, 0, 0, 0])))
                .write_to(&mut out, ImageFormat::Png)
                .unwrap();
            out.into_inner()
        };
        let bytes = render(
            Some(&template),
            &sample_text(),
            RasterFormat::Png,
            &missing_typefaces(),
        )
        .unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgb8();
        let Color(r, g, b) = Color::BACKGROUND;
        assert_eq!(*decoded.get_pixel(5, 5), Rgb([r, g, b]));
    }

    #[test]
    fn flatten_blends_partial_alpha() {
        let half = DynamicImage::ImageRgba8(RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 128])));
        let Rgb([r, _, _]) = *flatten(half).get_pixel(0, 0);
        // 0xf9 * (1 - 128/255)
        assert_eq!(r, 124);
    }

    #[test]
    fn builtin_verification_label_stays_inside_its_box() {
        let bytes = render(None, &sample_text(), RasterFormat::Png, &missing_typefaces()).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgb8();
        let Color(r, g, b) = Color::BACKGROUND;
        // between the inner frame (x 30..32) and the box's left edge (x 50)
        for y in 470..500 {
            for x in 33..50 {
                assert_eq!(*decoded.get_pixel(x, y), Rgb([r, g, b]), "ink at ({}, {})", x, y);
            }
        }
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let err = render(
            Some(b"definitely not an image"),
            &sample_text(),
            RasterFormat::Png,
            &missing_typefaces(),
        )
        .unwrap_err();
        assert!(matches!(err, RenderError::Decode(_)));
    }
}
