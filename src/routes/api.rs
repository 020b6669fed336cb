use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::io::Write;
use std::sync::Arc;

use crate::certificate::{GenerateError, TemplateFormat};
use crate::db::{self, NewCourse, NewStudent};
use crate::issuance::{self, IssueError};
use crate::state::AppState;
use crate::storage::TEMPLATE_FOLDER;

/// JSON error body: `{"success": false, "error": "..."}`.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn not_found(what: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, format!("{} not found", what))
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({
                "success": false,
                "error": self.message
            })),
        )
            .into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &e {
            if db_err.is_unique_violation() {
                return Self::new(StatusCode::CONFLICT, "record already exists");
            }
        }
        tracing::error!("Database error: {}", e);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "database error")
    }
}

impl From<IssueError> for ApiError {
    fn from(e: IssueError) -> Self {
        let status = match &e {
            IssueError::StudentNotFound(_) | IssueError::CourseNotFound(_) => StatusCode::NOT_FOUND,
            IssueError::NotCompleted(_) | IssueError::NoTemplate(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            IssueError::Generate(GenerateError::NotFound(_)) => StatusCode::NOT_FOUND,
            IssueError::Generate(GenerateError::UnsupportedFormat(_)) => StatusCode::BAD_REQUEST,
            IssueError::Database(err) => {
                tracing::error!("Database error: {}", err);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            IssueError::Generate(GenerateError::GenerationFailed) | IssueError::Mail(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, e.to_string())
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Deserialize)]
pub struct RegenerateQuery {
    #[serde(default)]
    regenerate: bool,
}

pub async fn create_course(
    State(state): State<Arc<AppState>>,
    Json(course): Json<NewCourse>,
) -> ApiResult<impl IntoResponse> {
    if course.name.trim().is_empty() {
        return Err(ApiError::bad_request("course name is required"));
    }
    let course = db::create_course(state.pool.as_ref(), &course).await?;
    tracing::info!(course_id = course.id, name = %course.name, "course created");
    Ok((StatusCode::CREATED, Json(course)))
}

pub async fn list_courses(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    Ok(Json(db::list_courses(state.pool.as_ref()).await?))
}

pub async fn get_course(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<i32>,
) -> ApiResult<impl IntoResponse> {
    let course = db::get_course(state.pool.as_ref(), course_id)
        .await?
        .ok_or_else(|| ApiError::not_found("course"))?;
    Ok(Json(course))
}

/// Multipart upload with a `template` file field (html, pdf, jpg, jpeg, png).
pub async fn upload_template(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<i32>,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let (filename, data) = match read_template_field(&mut multipart).await? {
        Some((name, data)) if !data.is_empty() => (name, data),
        _ => return Err(ApiError::bad_request("template file is required")),
    };
    let format = TemplateFormat::from_path(&filename).map_err(|ext| {
        ApiError::bad_request(format!(
            "unsupported template format {:?}; use html, pdf, jpg, jpeg or png",
            ext
        ))
    })?;
    check_template(format, &data)?;

    store_template(&state, course_id, &data, format).await
}

/// File name and bytes of the last `template` field. A malformed body is a
/// bad request, not a missing file.
async fn read_template_field(
    multipart: &mut Multipart,
) -> ApiResult<Option<(String, Vec<u8>)>> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid multipart body: {}", e)))?
    {
        if field.name() != Some("template") {
            continue;
        }
        let filename = field.file_name().unwrap_or("").to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("could not read upload: {}", e)))?;
        upload = Some((filename, data.to_vec()));
    }
    Ok(upload)
}

/// Rejects uploads that every later generation would fail on.
fn check_template(format: TemplateFormat, data: &[u8]) -> ApiResult<()> {
    match format {
        TemplateFormat::Html => {
            std::str::from_utf8(data).map_err(|e| {
                ApiError::bad_request(format!("template HTML is not valid UTF-8: {}", e))
            })?;
        }
        TemplateFormat::Image(_) => {
            image::load_from_memory(data).map_err(|e| {
                ApiError::bad_request(format!("template image is unreadable: {}", e))
            })?;
        }
        TemplateFormat::Pdf => {}
    }
    Ok(())
}

/// Raw HTML body stored as the course template.
pub async fn put_html_template(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<i32>,
    body: String,
) -> ApiResult<impl IntoResponse> {
    if body.trim().is_empty() {
        return Err(ApiError::bad_request("template body is empty"));
    }
    store_template(&state, course_id, body.as_bytes(), TemplateFormat::Html).await
}

async fn store_template(
    state: &AppState,
    course_id: i32,
    data: &[u8],
    format: TemplateFormat,
) -> ApiResult<Json<db::Course>> {
    db::get_course(state.pool.as_ref(), course_id)
        .await?
        .ok_or_else(|| ApiError::not_found("course"))?;

    let path = state
        .store()
        .write(data, TEMPLATE_FOLDER, format.extension())
        .map_err(|e| {
            tracing::error!("Failed to store template: {}", e);
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "could not store template")
        })?;

    let course = db::set_course_template(state.pool.as_ref(), course_id, &path)
        .await?
        .ok_or_else(|| ApiError::not_found("course"))?;
    tracing::info!(course_id, template = %path, "course template updated");
    Ok(Json(course))
}

pub async fn create_student(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<i32>,
    Json(student): Json<NewStudent>,
) -> ApiResult<impl IntoResponse> {
    if student.first_name.trim().is_empty() || student.last_name.trim().is_empty() {
        return Err(ApiError::bad_request("first and last name are required"));
    }
    db::get_course(state.pool.as_ref(), course_id)
        .await?
        .ok_or_else(|| ApiError::not_found("course"))?;

    let student = db::create_student(state.pool.as_ref(), course_id, &student).await?;
    tracing::info!(course_id, student_id = student.id, "student enrolled");
    Ok((StatusCode::CREATED, Json(student)))
}

pub async fn list_students(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<i32>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(db::list_students(state.pool.as_ref(), course_id).await?))
}

pub async fn complete_student(
    State(state): State<Arc<AppState>>,
    Path(student_id): Path<i32>,
) -> ApiResult<impl IntoResponse> {
    set_completed(&state, student_id, true).await
}

pub async fn uncomplete_student(
    State(state): State<Arc<AppState>>,
    Path(student_id): Path<i32>,
) -> ApiResult<impl IntoResponse> {
    set_completed(&state, student_id, false).await
}

async fn set_completed(
    state: &AppState,
    student_id: i32,
    completed: bool,
) -> ApiResult<Json<db::Student>> {
    let student = db::set_student_completed(state.pool.as_ref(), student_id, completed)
        .await?
        .ok_or_else(|| ApiError::not_found("student"))?;
    Ok(Json(student))
}

pub async fn issue_certificate(
    State(state): State<Arc<AppState>>,
    Path(student_id): Path<i32>,
    Query(query): Query<RegenerateQuery>,
) -> ApiResult<impl IntoResponse> {
    let issued = issuance::issue_certificate(&state, student_id, query.regenerate).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "certificate": issued,
    })))
}

pub async fn complete_course(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<i32>,
    Query(query): Query<RegenerateQuery>,
) -> ApiResult<impl IntoResponse> {
    let report = issuance::complete_course(&state, course_id, query.regenerate).await?;
    Ok(Json(serde_json::json!({
        "success": report.failed.is_empty(),
        "report": report,
    })))
}

/// Every issued certificate of a course in one zip archive.
pub async fn download_all(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<i32>,
) -> ApiResult<impl IntoResponse> {
    let course = db::get_course(state.pool.as_ref(), course_id)
        .await?
        .ok_or_else(|| ApiError::not_found("course"))?;
    let students = db::list_students(state.pool.as_ref(), course_id).await?;

    let mut zip_data = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut zip_data));
        let options = zip::write::SimpleFileOptions::default().unix_permissions(0o644);

        for student in &students {
            let Some(path) = student.certificate_path.as_deref() else {
                continue;
            };
            let content = match state.store().read(path) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(student_id = student.id, error = %e, "skipping certificate");
                    continue;
                }
            };
            let ext = path.rsplit('.').next().unwrap_or("bin");
            let name = format!(
                "{}_{}.{}",
                super::download_stem(&student.first_name, &student.last_name),
                student.id,
                ext
            );
            let written = zip
                .start_file(name, options)
                .map_err(std::io::Error::from)
                .and_then(|_| zip.write_all(&content));
            if let Err(e) = written {
                tracing::error!("Failed to add certificate to archive: {}", e);
                return Err(ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "could not build archive",
                ));
            }
        }

        if let Err(e) = zip.finish() {
            tracing::error!("Failed to finish archive: {}", e);
            return Err(ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "could not build archive",
            ));
        }
    }

    let download_name = format!(
        "{}_Sertifikalar.zip",
        super::ascii_file_name(&course.name)
    );
    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", download_name),
            ),
        ],
        zip_data,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::raster::RasterFormat;
    use axum::{body::Body, extract::FromRequest, http::Request};
    use rstest::rstest;

    const BOUNDARY: &str = "sertifika-boundary";

    async fn multipart(body: &'static str) -> Multipart {
        let request = Request::builder()
            .method("POST")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap();
        Multipart::from_request(request, &()).await.unwrap()
    }

    #[tokio::test]
    async fn template_field_is_read() {
        let mut form = multipart(
            "--sertifika-boundary\r\n\
             Content-Disposition: form-data; name=\"note\"\r\n\r\n\
             ignored\r\n\
             --sertifika-boundary\r\n\
             Content-Disposition: form-data; name=\"template\"; filename=\"t.html\"\r\n\
             Content-Type: text/html\r\n\r\n\
             <p>{{ogrenci_adi}}</p>\r\n\
             --sertifika-boundary--\r\n",
        )
        .await;
        let (name, data) = read_template_field(&mut form).await.ok().flatten().unwrap();
        assert_eq!(name, "t.html");
        assert_eq!(data, b"<p>{{ogrenci_adi}}</p>");
    }

    #[tokio::test]
    async fn malformed_multipart_is_a_bad_request() {
        let mut form = multipart("this is not a multipart body").await;
        let err = read_template_field(&mut form).await.err().unwrap();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.message.starts_with("invalid multipart body"), "{}", err.message);
    }

    #[rstest]
    #[case(TemplateFormat::Html, b"<p>{{ogrenci_adi}}</p>".to_vec(), true)]
    #[case(TemplateFormat::Html, "<p>Öğrenci</p>".as_bytes().to_vec(), true)]
    #[case(TemplateFormat::Html, vec![b'<', b'p', b'>', 0xff, 0xfe], false)]
    #[case(TemplateFormat::Image(RasterFormat::Png), b"not a png".to_vec(), false)]
    #[case(TemplateFormat::Pdf, b"%PDF-1.4".to_vec(), true)]
    fn uploads_are_checked_before_storing(
        #[case] format: TemplateFormat,
        #[case] data: Vec<u8>,
        #[case] accepted: bool,
    ) {
        let result = check_template(format, &data);
        assert_eq!(result.is_ok(), accepted);
        if let Err(err) = result {
            assert_eq!(err.status, StatusCode::BAD_REQUEST);
        }
    }
}
