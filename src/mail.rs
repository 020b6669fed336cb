use tera::Context;
use thiserror::Error;

pub const CERTIFICATE_SUBJECT: &str = "Eğitim Sertifikanız Hazır!";

#[derive(Debug, Error)]
pub enum MailError {
    #[error("no recipient address")]
    NoRecipient,

    #[error("could not render email: {0}")]
    Template(#[from] tera::Error),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub html_body: String,
}

/// Outgoing mail. Implementations must be safe to share between requests.
pub trait Mailer: Send + Sync {
    fn send(&self, email: &Email) -> Result<(), MailError>;
}

/// Writes each message to the log instead of an SMTP server.
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, email: &Email) -> Result<(), MailError> {
        tracing::info!(
            to = %email.to,
            from = %email.from,
            subject = %email.subject,
            body_len = email.html_body.len(),
            "email delivered to log"
        );
        Ok(())
    }
}

/// Keeps sent messages in memory.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingMailer {
    sent: std::sync::Mutex<Vec<Email>>,
}

#[cfg(test)]
impl RecordingMailer {
    pub fn sent(&self) -> Vec<Email> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[cfg(test)]
impl Mailer for RecordingMailer {
    fn send(&self, email: &Email) -> Result<(), MailError> {
        match self.sent.lock() {
            Ok(mut sent) => sent.push(email.clone()),
            Err(poisoned) => poisoned.into_inner().push(email.clone()),
        }
        Ok(())
    }
}

/// Builds the "certificate is ready" message with the student's link.
pub fn certificate_email(
    to: &str,
    sender_email: &str,
    sender_name: &str,
    student_name: &str,
    course_name: &str,
    certificate_link: &str,
) -> Result<Email, MailError> {
    if to.trim().is_empty() {
        return Err(MailError::NoRecipient);
    }

    let mut ctx = Context::new();
    ctx.insert("student_name", student_name);
    ctx.insert("course_name", course_name);
    ctx.insert("certificate_link", certificate_link);
    ctx.insert("sender_name", sender_name);
    let html_body = crate::templates::get_tera().render("certificate_email.html", &ctx)?;

    Ok(Email {
        to: to.trim().to_string(),
        from: format!("{} <{}>", sender_name, sender_email),
        subject: CERTIFICATE_SUBJECT.to_string(),
        html_body,
    })
}
