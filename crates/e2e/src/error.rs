//! Error types for the check runner

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Site failed to start: {0}")]
    SiteStartup(String),

    #[error("Site health check failed after {0} attempts")]
    SiteHealthCheck(usize),

    #[error("Playwright not found. Install with: npm i -D playwright && npx playwright install")]
    PlaywrightNotFound,

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Check suite parse error: {0}")]
    SuiteParse(String),

    #[error("Check suite not found: {0}")]
    SuiteNotFound(String),

    #[error("Probe '{key}' failed: {reason}")]
    Probe { key: String, reason: String },

    #[error("Probe '{0}' produced no output")]
    MissingProbe(String),

    #[error("Visual regression: {0}")]
    VisualRegression(String),

    #[error("Screenshot mismatch: {name} differs by {diff_percent:.2}% (threshold: {threshold:.2}%)")]
    ScreenshotMismatch {
        name: String,
        diff_percent: f64,
        threshold: f64,
    },

    #[error("Baseline not found: {0}")]
    BaselineNotFound(String),

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("Config error: {0}")]
    Config(#[from] railguide_common::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type E2eResult<T> = Result<T, E2eError>;
