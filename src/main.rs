mod certificate;
mod config;
mod db;
mod issuance;
mod mail;
mod render;
mod routes;
mod state;
mod storage;
mod templates;

use std::sync::Arc;

use crate::certificate::CertificateGenerator;
use crate::config::StorageKind;
use crate::render::Typefaces;
use crate::storage::{LocalStore, MemoryStore, Store};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sertifika=info,tower_http=info".into()),
        )
        .init();

    let config = config::Config::from_env()?;
    let config = Arc::new(config);

    if let Some(dir) = &config.font_dir {
        render::fonts::register_font_dir(dir.clone());
    }

    let store: Arc<dyn Store> = match config.storage_type {
        StorageKind::Local => Arc::new(LocalStore::new(&config.storage_path)?),
        StorageKind::Memory => {
            tracing::warn!("Using in-memory storage; certificates are lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(pool.as_ref()).await?;

    let state = Arc::new(state::AppState {
        pool,
        config: config.clone(),
        generator: CertificateGenerator::new(store, Typefaces::default()),
        mailer: Arc::new(mail::LogMailer),
    });

    let app = routes::router(state);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Sertifika listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
