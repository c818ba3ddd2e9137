use actix_cors::Cors;
use actix_web::{middleware::Compress, web, App, HttpServer};
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use qahub::config::{validate_env_vars, AppConfig};
use qahub::openapi::ApiDoc;
use qahub::repo::Repo;
use qahub::storage::build_file_store;
use qahub::{config, AppState, SecurityHeaders};

async fn build_repo(cfg: &AppConfig) -> anyhow::Result<Arc<dyn Repo>> {
    #[cfg(feature = "postgres-store")]
    {
        let url = cfg
            .database_url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set for postgres-store"))?;
        let repo = qahub::repo::pg::PgRepo::connect_lazy(url)?;
        repo.migrate().await?;
        info!("Using Postgres repository backend");
        return Ok(Arc::new(repo));
    }
    #[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
    {
        let repo = qahub::repo::inmem::InMemRepo::open_dir(&cfg.data_dir);
        info!(dir = %cfg.data_dir.display(), "Using in-memory repository backend");
        return Ok(Arc::new(repo));
    }
    #[allow(unreachable_code)]
    Err(anyhow::anyhow!("built without a repository backend feature"))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env automatically only in debug builds to reduce manual setup overhead.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    if let Err(problems) = validate_env_vars() {
        for p in &problems {
            eprintln!("{p}");
        }
        eprintln!("Please copy .env.example to .env and configure it");
        std::process::exit(1);
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Bootstrapping Q&A server");
    let cfg = AppConfig::from_env();
    info!(frontend = ?cfg.frontend_url, sidebar_ttl = ?cfg.sidebar_ttl, "configuration loaded");

    let repo = build_repo(&cfg).await.map_err(|e| {
        error!("repository setup failed: {e:#}");
        std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
    })?;
    let file_store = build_file_store(&cfg).await.map_err(|e| {
        error!("file storage setup failed: {e:#}");
        std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
    })?;
    let state = web::Data::new(AppState::new(repo, file_store, cfg.sidebar_ttl));

    let openapi = ApiDoc::openapi();
    info!("OpenAPI document generated");

    let frontend_url = cfg.frontend_url.clone();
    let enable_hsts = cfg.enable_hsts;
    let server = HttpServer::new(move || {
        let cors = {
            let mut c = Cors::default()
                // during local dev allow React/Vite default ports
                .allowed_origin("http://localhost:5173")
                .allowed_origin("http://127.0.0.1:5173")
                .allowed_origin("http://localhost:3000")
                .allowed_origin("http://127.0.0.1:3000")
                .allow_any_header()
                .allowed_methods(["GET", "POST", "PATCH", "DELETE", "OPTIONS"])
                .supports_credentials()
                .max_age(3600);
            if let Some(front) = frontend_url.as_deref() {
                c = c.allowed_origin(front);
            }
            c
        };

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(SecurityHeaders::new(enable_hsts))
            .wrap(cors)
            .app_data(state.clone())
            .configure(config)
            .service(SwaggerUi::new("/docs").url("/docs/openapi.json", openapi.clone()))
    })
    .bind(cfg.bind_addr.as_str())?;

    info!("Listening on http://{}", cfg.bind_addr);
    server.run().await
}
