mod api;
mod pages;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::render::fonts::ascii_fold;
use crate::state::AppState;

/// Largest accepted template upload.
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/courses", post(api::create_course).get(api::list_courses))
        .route("/api/courses/:course_id", get(api::get_course))
        .route("/api/courses/:course_id/template", post(api::upload_template))
        .route("/api/courses/:course_id/template/html", put(api::put_html_template))
        .route(
            "/api/courses/:course_id/students",
            post(api::create_student).get(api::list_students),
        )
        .route("/api/courses/:course_id/complete", post(api::complete_course))
        .route("/api/courses/:course_id/certificates.zip", get(api::download_all))
        .route(
            "/api/students/:student_id/complete",
            post(api::complete_student).delete(api::uncomplete_student),
        )
        .route("/api/students/:student_id/certificate", post(api::issue_certificate))
        .route("/certificate", get(pages::view_certificate))
        .route("/certificate/download", get(pages::download_certificate))
        .route("/certificate/pdf", get(pages::certificate_pdf))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// `First_Last` with only ASCII letters, digits, `-` and `_`, safe for a
/// Content-Disposition header.
pub(crate) fn download_stem(first_name: &str, last_name: &str) -> String {
    ascii_file_name(&format!("{} {}", first_name.trim(), last_name.trim()))
}

pub(crate) fn ascii_file_name(name: &str) -> String {
    let stem: String = name
        .trim()
        .chars()
        .map(|c| if c.is_ascii() { c } else { ascii_fold(c) })
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect();
    if stem.is_empty() {
        "sertifika".to_string()
    } else {
        stem
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Ada", "Lovelace", "Ada_Lovelace")]
    #[case("Çağrı", "Öztürk", "Cagri_Ozturk")]
    #[case(" İsmail ", "Şen", "Ismail_Sen")]
    #[case("a\"b", "c/d", "a_b_c_d")]
    fn download_names_are_header_safe(
        #[case] first: &str,
        #[case] last: &str,
        #[case] expected: &str,
    ) {
        assert_eq!(download_stem(first, last), expected);
    }

    #[test]
    fn empty_name_gets_placeholder() {
        assert_eq!(ascii_file_name("  "), "sertifika");
    }
}
