//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid request timeout")]
    InvalidTimeout,

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Pool min_connections exceeds max_connections")]
    InvalidPoolSize,

    #[error("Invalid gateway base URL format")]
    InvalidGatewayUrl,

    #[error("Gateway TLS verification must stay enabled in production")]
    TlsVerificationRequired,

    #[error("Invalid minimum charge amount")]
    InvalidMinCharge,

    #[error("Invalid renewal window")]
    InvalidRenewalWindow,

    #[error("Cron shared secret is too short")]
    CronSecretTooShort,
}
