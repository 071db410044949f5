use anyhow::Context;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: Option<String>,
    pub max_connections: u32,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let max_connections = match std::env::var("GRADEBOOK_MAX_CONNECTIONS") {
            Ok(value) => value
                .parse()
                .with_context(|| format!("GRADEBOOK_MAX_CONNECTIONS is not a number: {value}"))?,
            Err(_) => 5,
        };

        Ok(Self {
            database_url: std::env::var("DATABASE_URL").ok(),
            max_connections,
        })
    }

    pub fn require_database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set to a production Postgres instance, or pass --snapshot")
    }
}

/// Logs go to stderr so report output on stdout stays clean.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
