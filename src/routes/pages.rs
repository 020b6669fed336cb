use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tera::Context;
use uuid::Uuid;

use crate::certificate::TemplateFormat;
use crate::db::{self, Course, Student};
use crate::render::convert;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct TokenQuery {
    token: Option<String>,
    #[serde(default)]
    inline: bool,
}

/// Why a certificate cannot be shown.
pub enum Unavailable {
    InvalidLink,
    UnknownToken,
    NotCompleted,
    NotIssued,
    MissingFile,
    Internal,
}

impl Unavailable {
    fn status(&self) -> StatusCode {
        match self {
            Unavailable::InvalidLink => StatusCode::BAD_REQUEST,
            Unavailable::UnknownToken | Unavailable::NotIssued | Unavailable::MissingFile => {
                StatusCode::NOT_FOUND
            }
            Unavailable::NotCompleted => StatusCode::FORBIDDEN,
            Unavailable::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// (is_error, headline, detail)
    fn message(&self) -> (bool, &'static str, &'static str) {
        match self {
            Unavailable::InvalidLink => (
                true,
                "Geçersiz sertifika linki!",
                "Sertifika linki eksik veya hatalı.",
            ),
            Unavailable::UnknownToken => (
                true,
                "Sertifika bulunamadı!",
                "Bu token ile eşleşen bir sertifika bulunamadı.",
            ),
            Unavailable::NotCompleted => (
                false,
                "Bu öğrenci eğitimi henüz tamamlamamış!",
                "Sertifika sadece eğitimi tamamlayan öğrenciler için oluşturulur.",
            ),
            Unavailable::NotIssued => (
                false,
                "Bu öğrenci için henüz sertifika oluşturulmamış!",
                "Sertifika henüz oluşturulmamış. Lütfen daha sonra tekrar deneyin.",
            ),
            Unavailable::MissingFile => (true, "Sertifika dosyası bulunamadı!", ""),
            Unavailable::Internal => (
                true,
                "Sertifika görüntülenirken bir hata oluştu.",
                "Lütfen daha sonra tekrar deneyin.",
            ),
        }
    }
}

impl IntoResponse for Unavailable {
    fn into_response(self) -> Response {
        let (is_error, headline, detail) = self.message();
        let mut ctx = Context::new();
        ctx.insert(if is_error { "error" } else { "warning" }, headline);
        ctx.insert("detail", detail);
        (self.status(), render_template("certificate.html", ctx)).into_response()
    }
}

struct Issued {
    student: Student,
    token: Uuid,
    path: String,
    format: TemplateFormat,
}

async fn find_certificate(state: &AppState, token: Option<&str>) -> Result<Issued, Unavailable> {
    let token = token
        .and_then(|t| Uuid::parse_str(t.trim()).ok())
        .ok_or(Unavailable::InvalidLink)?;

    let student = match db::get_student_by_token(state.pool.as_ref(), token).await {
        Ok(Some(s)) => s,
        Ok(None) => return Err(Unavailable::UnknownToken),
        Err(e) => {
            tracing::error!("Failed to look up certificate token: {}", e);
            return Err(Unavailable::Internal);
        }
    };
    if !student.has_completed_course {
        return Err(Unavailable::NotCompleted);
    }
    let path = student.certificate_path.clone().ok_or(Unavailable::NotIssued)?;
    let format = TemplateFormat::from_path(&path).map_err(|ext| {
        tracing::error!(student_id = student.id, ext = %ext, "certificate has unknown format");
        Unavailable::Internal
    })?;

    Ok(Issued {
        student,
        token,
        path,
        format,
    })
}

async fn read_certificate(state: &AppState, issued: &Issued) -> Result<Vec<u8>, Unavailable> {
    let store = state.store().clone();
    let path = issued.path.clone();
    match tokio::task::spawn_blocking(move || store.read(&path)).await {
        Ok(Ok(bytes)) => Ok(bytes),
        Ok(Err(e)) => {
            tracing::warn!(path = %issued.path, error = %e, "certificate file unavailable");
            Err(Unavailable::MissingFile)
        }
        Err(e) => {
            tracing::error!("Certificate read task failed: {}", e);
            Err(Unavailable::Internal)
        }
    }
}

/// Public certificate page reached from the emailed link.
pub async fn view_certificate(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TokenQuery>,
) -> Result<Html<String>, Unavailable> {
    let issued = find_certificate(&state, query.token.as_deref()).await?;
    let course: Option<Course> = db::get_course(state.pool.as_ref(), issued.student.course_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to load course: {}", e);
            Unavailable::Internal
        })?;

    let token = issued.token.to_string();
    let kind = match issued.format {
        TemplateFormat::Html => "html",
        TemplateFormat::Pdf => "pdf",
        TemplateFormat::Image(_) => "image",
    };

    let mut ctx = Context::new();
    ctx.insert("student_name", &issued.student.full_name());
    ctx.insert("email", &issued.student.email);
    ctx.insert(
        "course_name",
        &course.map(|c| c.name).unwrap_or_default(),
    );
    ctx.insert("token", &token);
    ctx.insert("kind", kind);
    ctx.insert("download_url", &format!("/certificate/download?token={}", token));
    ctx.insert("pdf_url", &format!("/certificate/pdf?token={}", token));
    ctx.insert("verification_url", &state.config.certificate_link(&token));

    Ok(render_template("certificate.html", ctx))
}

/// The stored certificate bytes, as an attachment unless `inline=true`.
pub async fn download_certificate(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TokenQuery>,
) -> Result<Response, Unavailable> {
    let issued = find_certificate(&state, query.token.as_deref()).await?;
    let content = read_certificate(&state, &issued).await?;

    let mime = mime_guess::from_path(&issued.path)
        .first_raw()
        .unwrap_or("application/octet-stream");
    let file_name = format!(
        "sertifika_{}.{}",
        super::download_stem(&issued.student.first_name, &issued.student.last_name),
        issued.format.extension()
    );
    let disposition = if query.inline { "inline" } else { "attachment" };

    Ok((
        [
            (header::CONTENT_TYPE, mime.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("{}; filename=\"{}\"", disposition, file_name),
            ),
        ],
        content,
    )
        .into_response())
}

/// The certificate as PDF. HTML and image certificates are converted on the
/// fly; PDF certificates are returned as stored.
pub async fn certificate_pdf(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TokenQuery>,
) -> Result<Response, Unavailable> {
    let issued = find_certificate(&state, query.token.as_deref()).await?;
    let content = read_certificate(&state, &issued).await?;

    let format = issued.format;
    let typefaces = state.generator.typefaces().clone();
    let converted = tokio::task::spawn_blocking(move || match format {
        TemplateFormat::Pdf => Ok(content),
        TemplateFormat::Html => convert::html_to_pdf(&String::from_utf8_lossy(&content), &typefaces),
        TemplateFormat::Image(_) => convert::image_to_pdf(&content),
    })
    .await;

    let pdf = match converted {
        Ok(Ok(pdf)) => pdf,
        Ok(Err(e)) => {
            tracing::error!(path = %issued.path, error = %e, "PDF conversion failed");
            return Err(Unavailable::Internal);
        }
        Err(e) => {
            tracing::error!("PDF conversion task failed: {}", e);
            return Err(Unavailable::Internal);
        }
    };

    let file_name = format!(
        "sertifika_{}.pdf",
        super::download_stem(&issued.student.first_name, &issued.student.last_name)
    );
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        pdf,
    )
        .into_response())
}

fn render_template(name: &str, ctx: Context) -> Html<String> {
    let tera = crate::templates::get_tera();
    let rendered = tera.render(name, &ctx).unwrap_or_else(|e| {
        tracing::error!("Template error in {}: {}", name, e);
        format!("Template error: {}", name)
    });
    Html(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_pages_render() {
        for reason in [
            Unavailable::InvalidLink,
            Unavailable::UnknownToken,
            Unavailable::NotCompleted,
            Unavailable::NotIssued,
            Unavailable::MissingFile,
            Unavailable::Internal,
        ] {
            let (_, headline, _) = reason.message();
            let mut ctx = Context::new();
            ctx.insert("error", headline);
            ctx.insert("detail", "");
            let Html(page) = render_template("certificate.html", ctx);
            assert!(page.contains("notice"), "{}", page);
        }
    }

    #[test]
    fn viewer_page_offers_pdf_conversion_for_images() {
        let mut ctx = Context::new();
        ctx.insert("student_name", "Ada Lovelace");
        ctx.insert("email", "ada@example.org");
        ctx.insert("course_name", "Algorithms 101");
        ctx.insert("token", "abc");
        ctx.insert("kind", "image");
        ctx.insert("download_url", "/certificate/download?token=abc");
        ctx.insert("pdf_url", "/certificate/pdf?token=abc");
        ctx.insert("verification_url", "https://certs.example.org/certificate?token=abc");

        let Html(page) = render_template("certificate.html", ctx);
        assert!(page.contains("Ada Lovelace"));
        assert!(page.contains("<img"));
        assert!(page.contains("PDF&#x27;e Çevir") || page.contains("PDF'e Çevir"));
    }
}
