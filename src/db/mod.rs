mod models;

pub use models::*;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

pub type DbPool = Arc<PgPool>;

pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(Arc::new(pool))
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

pub async fn create_course(pool: &PgPool, course: &NewCourse) -> Result<Course, sqlx::Error> {
    sqlx::query_as::<_, Course>(
        r#"
        INSERT INTO courses (name, description, instructor_name, start_date, end_date)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(course.name.trim())
    .bind(&course.description)
    .bind(&course.instructor_name)
    .bind(course.start_date)
    .bind(course.end_date)
    .fetch_one(pool)
    .await
}

pub async fn list_courses(pool: &PgPool) -> Result<Vec<Course>, sqlx::Error> {
    sqlx::query_as::<_, Course>("SELECT * FROM courses ORDER BY created_at DESC")
        .fetch_all(pool)
        .await
}

pub async fn get_course(pool: &PgPool, course_id: i32) -> Result<Option<Course>, sqlx::Error> {
    sqlx::query_as::<_, Course>("SELECT * FROM courses WHERE id = $1")
        .bind(course_id)
        .fetch_optional(pool)
        .await
}

/// Points the course at a new template. The previous blob stays in the store.
pub async fn set_course_template(
    pool: &PgPool,
    course_id: i32,
    template_path: &str,
) -> Result<Option<Course>, sqlx::Error> {
    sqlx::query_as::<_, Course>(
        "UPDATE courses SET certificate_template_path = $2 WHERE id = $1 RETURNING *",
    )
    .bind(course_id)
    .bind(template_path)
    .fetch_optional(pool)
    .await
}

pub async fn mark_course_completed(pool: &PgPool, course_id: i32) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE courses SET is_completed = true WHERE id = $1")
        .bind(course_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Enrolls a student with a fresh certificate access token.
pub async fn create_student(
    pool: &PgPool,
    course_id: i32,
    student: &NewStudent,
) -> Result<Student, sqlx::Error> {
    sqlx::query_as::<_, Student>(
        r#"
        INSERT INTO students (course_id, first_name, last_name, email, phone_number, certificate_access_token)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(course_id)
    .bind(student.first_name.trim())
    .bind(student.last_name.trim())
    .bind(student.email.trim())
    .bind(&student.phone_number)
    .bind(Uuid::new_v4())
    .fetch_one(pool)
    .await
}

pub async fn list_students(pool: &PgPool, course_id: i32) -> Result<Vec<Student>, sqlx::Error> {
    sqlx::query_as::<_, Student>(
        "SELECT * FROM students WHERE course_id = $1 ORDER BY last_name, first_name, id",
    )
    .bind(course_id)
    .fetch_all(pool)
    .await
}

pub async fn completed_students(
    pool: &PgPool,
    course_id: i32,
) -> Result<Vec<Student>, sqlx::Error> {
    sqlx::query_as::<_, Student>(
        "SELECT * FROM students WHERE course_id = $1 AND has_completed_course ORDER BY id",
    )
    .bind(course_id)
    .fetch_all(pool)
    .await
}

pub async fn get_student(pool: &PgPool, student_id: i32) -> Result<Option<Student>, sqlx::Error> {
    sqlx::query_as::<_, Student>("SELECT * FROM students WHERE id = $1")
        .bind(student_id)
        .fetch_optional(pool)
        .await
}

pub async fn get_student_by_token(
    pool: &PgPool,
    token: Uuid,
) -> Result<Option<Student>, sqlx::Error> {
    sqlx::query_as::<_, Student>("SELECT * FROM students WHERE certificate_access_token = $1")
        .bind(token)
        .fetch_optional(pool)
        .await
}

pub async fn set_student_completed(
    pool: &PgPool,
    student_id: i32,
    completed: bool,
) -> Result<Option<Student>, sqlx::Error> {
    sqlx::query_as::<_, Student>(
        "UPDATE students SET has_completed_course = $2 WHERE id = $1 RETURNING *",
    )
    .bind(student_id)
    .bind(completed)
    .fetch_optional(pool)
    .await
}

pub async fn set_certificate_path(
    pool: &PgPool,
    student_id: i32,
    certificate_path: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE students SET certificate_path = $2 WHERE id = $1")
        .bind(student_id)
        .bind(certificate_path)
        .execute(pool)
        .await?;
    Ok(())
}
