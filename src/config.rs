//! Environment-driven configuration for the binary.

use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    /// sqlx connection URL for the fingerprint store.
    pub database_url: String,
    /// Address the HTTP server binds to.
    pub bind_addr: String,
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            database_url: env_or("DATABASE_URL", "sqlite:attune.db"),
            bind_addr: env_or("BIND_ADDR", "0.0.0.0:8080"),
        }
    }
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}
