use crate::certificate::CertificateGenerator;
use crate::config::Config;
use crate::db::DbPool;
use crate::mail::Mailer;
use crate::storage::Store;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Arc<Config>,
    pub generator: CertificateGenerator,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub fn store(&self) -> &Arc<dyn Store> {
        self.generator.store()
    }
}
