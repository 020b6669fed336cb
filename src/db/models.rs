use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Course {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub instructor_name: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub is_completed: bool,
    pub certificate_template_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Student {
    pub id: i32,
    pub course_id: i32,
    pub first_name: String,
    pub last_name: String,
    /// Empty when the student gave no address.
    pub email: String,
    pub phone_number: Option<String>,
    pub has_completed_course: bool,
    pub certificate_path: Option<String>,
    pub certificate_access_token: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Student {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }

    pub fn has_email(&self) -> bool {
        !self.email.trim().is_empty()
    }
}

#[derive(Debug, Deserialize)]
pub struct NewCourse {
    pub name: String,
    pub description: Option<String>,
    pub instructor_name: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct NewStudent {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    pub phone_number: Option<String>,
}
