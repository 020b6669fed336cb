use std::sync::OnceLock;
use tera::Tera;

static TERA: OnceLock<Tera> = OnceLock::new();

/// Page and email templates, compiled into the binary.
const TEMPLATES: [(&str, &str); 2] = [
    ("certificate.html", include_str!("../templates/certificate.html")),
    (
        "certificate_email.html",
        include_str!("../templates/certificate_email.html"),
    ),
];

pub fn get_tera() -> &'static Tera {
    TERA.get_or_init(|| {
        let mut tera = Tera::default();
        if let Err(e) = tera.add_raw_templates(TEMPLATES) {
            tracing::error!(error = %e, "failed to load templates");
        }
        tera
    })
}
