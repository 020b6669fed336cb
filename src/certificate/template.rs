use chrono::NaiveDate;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;
use uuid::Uuid;

use crate::render::raster::RasterFormat;
use crate::render::CertificateText;

pub const TOKEN_STUDENT: &str = "{{ogrenci_adi}}";
pub const TOKEN_COURSE: &str = "{{kurs_adi}}";
pub const TOKEN_INSTRUCTOR: &str = "{{egitmen_adi}}";
pub const TOKEN_DATE: &str = "{{tarih}}";
pub const TOKEN_SERIAL: &str = "{{sertifika_no}}";

/// Instructor shown when the course has none on record.
pub const DEFAULT_INSTRUCTOR: &str = "Eğitmen Adı";

/// Template kinds, decided once from the stored path's extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TemplateFormat {
    Html,
    Pdf,
    Image(RasterFormat),
}

impl TemplateFormat {
    /// Returns `Err(extension)` for anything outside html, pdf, jpg, jpeg
    /// and png. Matching is case-insensitive.
    pub fn from_path(path: &str) -> Result<Self, String> {
        let ext = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "html" => Ok(TemplateFormat::Html),
            "pdf" => Ok(TemplateFormat::Pdf),
            "png" => Ok(TemplateFormat::Image(RasterFormat::Png)),
            "jpg" | "jpeg" => Ok(TemplateFormat::Image(RasterFormat::Jpeg)),
            _ => Err(ext),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            TemplateFormat::Html => "html",
            TemplateFormat::Pdf => "pdf",
            TemplateFormat::Image(format) => format.extension(),
        }
    }
}

/// Values substituted into one certificate.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldMap {
    pub student_name: String,
    pub course_name: String,
    pub instructor_name: String,
    /// Completion date, `DD.MM.YYYY`.
    pub date: String,
    pub serial_number: String,
    /// The student's access token. Image and PDF certificates print its
    /// first eight characters as the verification code.
    pub verification_code: Option<String>,
}

impl FieldMap {
    /// Field values for a student finishing on `date`.
    pub fn for_student(
        student_name: &str,
        student_id: i32,
        course_name: &str,
        instructor_name: Option<&str>,
        access_token: &str,
        date: NaiveDate,
    ) -> Self {
        let instructor = instructor_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_INSTRUCTOR);
        Self {
            student_name: student_name.to_string(),
            course_name: course_name.to_string(),
            instructor_name: instructor.to_string(),
            date: date.format("%d.%m.%Y").to_string(),
            serial_number: certificate_serial(date, student_id),
            verification_code: Some(access_token.to_string()),
        }
    }

    /// Token and value pairs for HTML templates.
    pub fn tokens(&self) -> [(&'static str, &str); 5] {
        [
            (TOKEN_STUDENT, self.student_name.as_str()),
            (TOKEN_COURSE, self.course_name.as_str()),
            (TOKEN_INSTRUCTOR, self.instructor_name.as_str()),
            (TOKEN_DATE, self.date.as_str()),
            (TOKEN_SERIAL, self.serial_number.as_str()),
        ]
    }

    /// Eight characters printed in the verification box: the access token
    /// prefix, or a random one when no token was given.
    pub fn verification_stub(&self) -> String {
        let source = self
            .verification_code
            .as_deref()
            .filter(|code| !code.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        source.chars().take(8).collect()
    }

    pub fn certificate_text(&self) -> CertificateText {
        CertificateText {
            student_name: self.student_name.clone(),
            course_name: self.course_name.clone(),
            date: self.date.clone(),
            verification_stub: self.verification_stub(),
        }
    }
}

/// Issue date followed by the zero-padded student id, e.g. `203001010042`.
pub fn certificate_serial(date: NaiveDate, student_id: i32) -> String {
    format!("{}{:04}", date.format("%Y%m%d"), student_id)
}

/// Replaces every occurrence of every token with its value in a single
/// left-to-right pass. Values are not escaped and never scanned again, so a
/// value that looks like a token stays literal. Text that matches no token
/// is left as is.
pub fn substitute<'a, I>(template: &str, tokens: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut values: HashMap<&str, &str> = HashMap::new();
    for (token, value) in tokens {
        if !token.is_empty() {
            values.entry(token).or_insert(value);
        }
    }
    if values.is_empty() {
        return template.to_string();
    }

    // Longer tokens first so one token that prefixes another cannot shadow it.
    let mut keys: Vec<&str> = values.keys().copied().collect();
    keys.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    let pattern = keys
        .iter()
        .map(|token| regex::escape(token))
        .collect::<Vec<_>>()
        .join("|");
    let re = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(e) => {
            tracing::error!("token pattern rejected: {}", e);
            return template.to_string();
        }
    };

    re.replace_all(template, |caps: &regex::Captures| {
        values.get(&caps[0]).copied().unwrap_or_default().to_string()
    })
    .into_owned()
}

/// `{{name}}` markers still present in `text`, in order of appearance.
pub fn unresolved_tokens(text: &str) -> Vec<String> {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    let re = TOKEN.get_or_init(|| Regex::new(r"\{\{\s*[A-Za-z0-9_]+\s*\}\}").unwrap());
    re.find_iter(text).map(|m| m.as_str().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn fields() -> FieldMap {
        FieldMap {
            student_name: "Ada Lovelace".to_string(),
            course_name: "Algorithms 101".to_string(),
            instructor_name: "Charles Babbage".to_string(),
            date: "01.01.2030".to_string(),
            serial_number: "203001010007".to_string(),
            verification_code: None,
        }
    }

    #[rstest]
    #[case("certificate-templates/a.html", Ok(TemplateFormat::Html))]
    #[case("a.HTML", Ok(TemplateFormat::Html))]
    #[case("x/y.pdf", Ok(TemplateFormat::Pdf))]
    #[case("t.png", Ok(TemplateFormat::Image(RasterFormat::Png)))]
    #[case("t.jpg", Ok(TemplateFormat::Image(RasterFormat::Jpeg)))]
    #[case("t.JPEG", Ok(TemplateFormat::Image(RasterFormat::Jpeg)))]
    #[case("t.docx", Err("docx".to_string()))]
    #[case("no_extension", Err(String::new()))]
    fn format_from_extension(#[case] path: &str, #[case] expected: Result<TemplateFormat, String>) {
        assert_eq!(TemplateFormat::from_path(path), expected);
    }

    #[test]
    fn welcome_template_scenario() {
        let template = "<p>{{ogrenci_adi}} - {{kurs_adi}} - {{tarih}}</p>";
        let out = substitute(template, fields().tokens());
        assert_eq!(out, "<p>Ada Lovelace - Algorithms 101 - 01.01.2030</p>");
    }

    #[test]
    fn unknown_tokens_and_plain_text_are_untouched() {
        let template = "<b>{{unknown}}</b> {{ogrenci_adi}} {{ ogrenci_adi }} {tarih}";
        let out = substitute(template, fields().tokens());
        assert_eq!(out, "<b>{{unknown}}</b> Ada Lovelace {{ ogrenci_adi }} {tarih}");
    }

    #[test]
    fn values_are_not_escaped_or_expanded() {
        let mut f = fields();
        f.student_name = "<i>Ada</i> & {{kurs_adi}}".to_string();
        let out = substitute("{{ogrenci_adi}}", [(TOKEN_STUDENT, f.student_name.as_str())]);
        assert_eq!(out, "<i>Ada</i> & {{kurs_adi}}");
    }

    #[test]
    fn inserted_values_are_not_substituted_again() {
        let out = substitute(
            "{{ogrenci_adi}} / {{kurs_adi}}",
            [(TOKEN_STUDENT, "{{kurs_adi}}"), (TOKEN_COURSE, "Algorithms 101")],
        );
        assert_eq!(out, "{{kurs_adi}} / Algorithms 101");

        // same result whichever token comes first
        let out = substitute(
            "{{ogrenci_adi}} / {{kurs_adi}}",
            [(TOKEN_COURSE, "Algorithms 101"), (TOKEN_STUDENT, "{{kurs_adi}}")],
        );
        assert_eq!(out, "{{kurs_adi}} / Algorithms 101");
    }

    #[test]
    fn substitution_is_idempotent_for_plain_values() {
        let template = "{{ogrenci_adi}}|{{kurs_adi}}|{{egitmen_adi}}|{{tarih}}|{{sertifika_no}}|{{x}}";
        let f = fields();
        let once = substitute(template, f.tokens());
        let twice = substitute(&once, f.tokens());
        assert_eq!(once, twice);
        assert_eq!(unresolved_tokens(&once), vec!["{{x}}".to_string()]);
    }

    #[test]
    fn every_occurrence_is_replaced() {
        let out = substitute("{{tarih}} {{tarih}}{{tarih}}", fields().tokens());
        assert_eq!(out, "01.01.2030 01.01.203001.01.2030");
    }

    #[test]
    fn field_map_for_student() {
        let date = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();
        let f = FieldMap::for_student(
            "Ada Lovelace",
            42,
            "Algorithms 101",
            Some("  "),
            "c0ffee12-3456-7890-abcd-ef0123456789",
            date,
        );
        assert_eq!(f.date, "01.01.2030");
        assert_eq!(f.serial_number, "203001010042");
        assert_eq!(f.instructor_name, DEFAULT_INSTRUCTOR);
        assert_eq!(f.verification_stub(), "c0ffee12");
    }

    #[test]
    fn stub_without_token_is_random() {
        let f = fields();
        let a = f.verification_stub();
        let b = f.verification_stub();
        assert_eq!(a.len(), 8);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
