use std::net::SocketAddr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    /// Base URL of the external clustering engine, e.g. `http://localhost:5001/api`.
    pub compute_url: String,
    pub compute_timeout_secs: u64,
    pub compute_connect_timeout_secs: u64,
    pub compute_retry_backoff_ms: u64,
    /// Age after which a `pending` clustering result is considered abandoned.
    pub pending_grace_secs: u64,
    pub sweep_cron: String,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("compute_url", &self.compute_url)
            .field("compute_timeout_secs", &self.compute_timeout_secs)
            .field(
                "compute_connect_timeout_secs",
                &self.compute_connect_timeout_secs,
            )
            .field("compute_retry_backoff_ms", &self.compute_retry_backoff_ms)
            .field("pending_grace_secs", &self.pending_grace_secs)
            .field("sweep_cron", &self.sweep_cron)
            .finish()
    }
}
