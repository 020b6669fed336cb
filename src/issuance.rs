//! Issuing certificates to students: render from the course template,
//! record the artifact and email the student a link to it.

use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::future::Future;
use thiserror::Error;

use crate::certificate::{CertificateGenerator, FieldMap, GenerateError};
use crate::config::Config;
use crate::db::{self, Course, Student};
use crate::mail::{certificate_email, MailError, Mailer};
use crate::state::AppState;

#[derive(Debug, Error)]
pub enum IssueError {
    #[error("student {0} not found")]
    StudentNotFound(i32),

    #[error("course {0} not found")]
    CourseNotFound(i32),

    #[error("student {0} has not completed the course")]
    NotCompleted(i32),

    #[error("course {0} has no certificate template")]
    NoTemplate(i32),

    #[error(transparent)]
    Generate(#[from] GenerateError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("email error: {0}")]
    Mail(#[from] MailError),
}

/// Outcome for one student.
#[derive(Debug, Clone, Serialize)]
pub struct Issued {
    pub student_id: i32,
    pub certificate_path: String,
    /// Public page for the certificate.
    pub link: String,
    /// `false` when an existing certificate was reused.
    pub generated: bool,
    pub emailed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Failure {
    pub student_id: i32,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionReport {
    pub course_id: i32,
    pub students: usize,
    pub generated: usize,
    pub emailed: usize,
    pub failed: Vec<Failure>,
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub fn field_map(student: &Student, course: &Course, date: NaiveDate) -> FieldMap {
    FieldMap::for_student(
        &student.full_name(),
        student.id,
        &course.name,
        course.instructor_name.as_deref(),
        &student.certificate_access_token.to_string(),
        date,
    )
}

/// Runs generation on the blocking pool; rendering is CPU-bound.
pub async fn render_in_background(
    generator: &CertificateGenerator,
    template_path: &str,
    fields: FieldMap,
) -> Result<String, GenerateError> {
    let generator = generator.clone();
    let template_path = template_path.to_string();
    tokio::task::spawn_blocking(move || generator.generate(&template_path, &fields))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "certificate task panicked");
            GenerateError::GenerationFailed
        })?
}

/// Emails the certificate link. Returns `Ok(false)` for students without an
/// address.
pub fn notify_student(
    mailer: &dyn Mailer,
    config: &Config,
    student: &Student,
    course: &Course,
) -> Result<bool, MailError> {
    if !student.has_email() {
        tracing::info!(student_id = student.id, "student has no email, skipping notification");
        return Ok(false);
    }
    let link = config.certificate_link(&student.certificate_access_token.to_string());
    let email = certificate_email(
        &student.email,
        &config.sender_email,
        &config.sender_name,
        &student.full_name(),
        &course.name,
        &link,
    )?;
    mailer.send(&email)?;
    Ok(true)
}

/// Makes sure a completed student has a certificate and emails the link.
/// An existing certificate is reused unless `regenerate` is set; a mail
/// failure is logged and leaves the certificate in place.
pub async fn issue_certificate(
    state: &AppState,
    student_id: i32,
    regenerate: bool,
) -> Result<Issued, IssueError> {
    let pool = state.pool.as_ref();
    let student = db::get_student(pool, student_id)
        .await?
        .ok_or(IssueError::StudentNotFound(student_id))?;
    if !student.has_completed_course {
        return Err(IssueError::NotCompleted(student_id));
    }
    let course = db::get_course(pool, student.course_id)
        .await?
        .ok_or(IssueError::CourseNotFound(student.course_id))?;

    issue_for(state, &student, &course, regenerate).await
}

/// The certificate the student should end up with: the recorded one, or a
/// fresh render of the course template when there is none or `regenerate`
/// is set. The flag is `true` for a fresh render, which the caller records.
async fn ensure_certificate(
    generator: &CertificateGenerator,
    student: &Student,
    course: &Course,
    regenerate: bool,
) -> Result<(String, bool), IssueError> {
    if let (Some(path), false) = (&student.certificate_path, regenerate) {
        return Ok((path.clone(), false));
    }
    let template = course
        .certificate_template_path
        .as_deref()
        .ok_or(IssueError::NoTemplate(course.id))?;
    let fields = field_map(student, course, today());
    let path = render_in_background(generator, template, fields).await?;
    Ok((path, true))
}

async fn issue_for(
    state: &AppState,
    student: &Student,
    course: &Course,
    regenerate: bool,
) -> Result<Issued, IssueError> {
    let (certificate_path, generated) =
        ensure_certificate(&state.generator, student, course, regenerate).await?;
    if generated {
        db::set_certificate_path(state.pool.as_ref(), student.id, &certificate_path).await?;
    }

    let emailed = match notify_student(state.mailer.as_ref(), &state.config, student, course) {
        Ok(sent) => sent,
        Err(e) => {
            tracing::warn!(student_id = student.id, error = %e, "could not email certificate");
            false
        }
    };

    tracing::info!(
        student_id = student.id,
        course_id = course.id,
        certificate = %certificate_path,
        generated,
        emailed,
        "certificate issued"
    );
    Ok(Issued {
        student_id: student.id,
        certificate_path,
        link: state
            .config
            .certificate_link(&student.certificate_access_token.to_string()),
        generated,
        emailed,
    })
}

/// Runs `issue` for each student in turn and tallies the outcomes. Failures
/// are collected; they never cut the run short.
async fn issue_each<'a, F, Fut>(
    course_id: i32,
    students: &'a [Student],
    mut issue: F,
) -> CompletionReport
where
    F: FnMut(&'a Student) -> Fut,
    Fut: Future<Output = Result<Issued, IssueError>>,
{
    let mut report = CompletionReport {
        course_id,
        students: students.len(),
        generated: 0,
        emailed: 0,
        failed: Vec::new(),
    };
    for student in students {
        match issue(student).await {
            Ok(issued) => {
                report.generated += usize::from(issued.generated);
                report.emailed += usize::from(issued.emailed);
            }
            Err(e) => {
                tracing::error!(student_id = student.id, error = %e, "certificate issue failed");
                report.failed.push(Failure {
                    student_id: student.id,
                    error: e.to_string(),
                });
            }
        }
    }
    report
}

/// Marks the course completed and issues certificates to every student who
/// finished it, one at a time. A failure for one student does not stop the
/// rest.
pub async fn complete_course(
    state: &AppState,
    course_id: i32,
    regenerate: bool,
) -> Result<CompletionReport, IssueError> {
    let pool = state.pool.as_ref();
    let course = db::get_course(pool, course_id)
        .await?
        .ok_or(IssueError::CourseNotFound(course_id))?;
    if course.certificate_template_path.is_none() {
        return Err(IssueError::NoTemplate(course_id));
    }

    db::mark_course_completed(pool, course_id).await?;
    let students = db::completed_students(pool, course_id).await?;

    let course = &course;
    let report = issue_each(course_id, &students, move |student| {
        issue_for(state, student, course, regenerate)
    })
    .await;

    tracing::info!(
        course_id,
        students = report.students,
        generated = report.generated,
        failed = report.failed.len(),
        "course completed"
    );
    Ok(report)
}
