//! Course templates and the facade that turns them into student certificates.

pub mod generator;
pub mod template;

pub use generator::{CertificateGenerator, GenerateError};
pub use template::{FieldMap, TemplateFormat};
