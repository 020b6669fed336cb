// On-demand conversions used by the certificate viewer. Both build the PDF
// in memory, so nothing is written to disk.
use super::fonts::load_font;
use super::pdf::PdfPage;
use super::raster::flatten;
use super::{RenderError, Typefaces};

pub const HTML_TITLE: &str = "HTML Sertifikası";
pub const HTML_DISCLAIMER: &str = "Bu sertifika HTML formatından dönüştürülmüştür.";

/// Share of the page the converted image may cover.
const IMAGE_FIT: f32 = 0.8;

/// Produces a placeholder page for an HTML certificate. The HTML itself is
/// not rendered; the page only carries a title and a disclaimer.
pub fn html_to_pdf(html: &str, typefaces: &Typefaces) -> Result<Vec<u8>, RenderError> {
    tracing::debug!(html_len = html.len(), "converting HTML certificate to placeholder PDF");
    let mut page = PdfPage::landscape_a4();
    let h = page.height();
    let font = load_font(&typefaces.regular, 12.0);
    page.text(&font, 50.0, h - 50.0, HTML_TITLE);
    page.text(&font, 50.0, h - 100.0, HTML_DISCLAIMER);
    page.finish(HTML_TITLE)
}

/// Places a raster certificate on a landscape A4 page, scaled uniformly to
/// 80% of the largest size that fits and centered.
pub fn image_to_pdf(bytes: &[u8]) -> Result<Vec<u8>, RenderError> {
    let image = flatten(
        image::load_from_memory(bytes).map_err(|e| RenderError::Decode(e.to_string()))?,
    );
    let (iw, ih) = (image.width() as f32, image.height() as f32);
    if iw == 0.0 || ih == 0.0 {
        return Err(RenderError::Decode("image has no pixels".to_string()));
    }

    let mut page = PdfPage::landscape_a4();
    let (w, h) = (page.width(), page.height());
    let (dw, dh, x, y) = fit(iw, ih, w, h);
    page.image(image, x, y, dw, dh);
    page.finish("Sertifika")
}

/// Returns (width, height, x, y) of the image box on the page.
fn fit(iw: f32, ih: f32, w: f32, h: f32) -> (f32, f32, f32, f32) {
    let scale = (w / iw).min(h / ih) * IMAGE_FIT;
    let (dw, dh) = (iw * scale, ih * scale);
    (dw, dh, (w - dw) / 2.0, (h - dh) / 2.0)
}
