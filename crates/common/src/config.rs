//! Checker configuration
//!
//! Loaded from a TOML file (`railguide.toml`). Every section and field has a
//! default, so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::contract::SiteContract;
use crate::error::{Error, Result};
use crate::tolerance::Tolerances;

/// Top-level checker configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckerConfig {
    pub site: SiteConfig,
    pub contract: SiteContract,
    pub tolerances: Tolerances,
    pub browser: BrowserConfig,
    pub artifacts: ArtifactConfig,
}

impl CheckerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: CheckerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading config from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load `path` if it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        let mut problems = self.tolerances.problems();

        if self.contract.referral_code.trim().is_empty() {
            problems.push("contract.referral_code must not be empty".to_string());
        }
        if self.contract.referral_param.trim().is_empty() {
            problems.push("contract.referral_param must not be empty".to_string());
        }
        if self.site.base_url.trim().is_empty() && self.site.start_command.is_none() {
            problems.push("site.base_url or site.start_command is required".to_string());
        }
        if self.browser.max_parallel == 0 {
            problems.push("browser.max_parallel must be at least 1".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidConfig(problems.join("; ")))
        }
    }
}

/// Where the site under test lives
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Base URL of an already running instance
    pub base_url: String,

    /// Shell command that serves the built site. `$PORT` and `$HOST` are
    /// exported to it. When set, the site is started before the checks run.
    pub start_command: Option<String>,

    /// Port for the started site (None = find a free port)
    pub port: Option<u16>,

    pub startup_timeout_secs: u64,

    /// Path polled until the started site answers
    pub health_path: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:4321".to_string(),
            start_command: None,
            port: None,
            startup_timeout_secs: 30,
            health_path: "/".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserKind::Chromium => "chromium",
            BrowserKind::Firefox => "firefox",
            BrowserKind::Webkit => "webkit",
        }
    }
}

impl std::str::FromStr for BrowserKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(BrowserKind::Chromium),
            "firefox" => Ok(BrowserKind::Firefox),
            "webkit" | "safari" => Ok(BrowserKind::Webkit),
            other => Err(Error::InvalidConfig(format!("unknown browser '{}'", other))),
        }
    }
}

impl std::fmt::Display for BrowserKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub browser: BrowserKind,
    pub headless: bool,

    /// Extra wait after network idle, for fonts and transitions
    pub settle_ms: u64,

    pub navigation_timeout_ms: u64,

    /// Hard limit for one check case, browser launch included
    pub case_timeout_secs: u64,

    /// Check cases run concurrently, each in its own browser
    pub max_parallel: usize,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            browser: BrowserKind::Chromium,
            headless: true,
            settle_ms: 500,
            navigation_timeout_ms: 30_000,
            case_timeout_secs: 120,
            max_parallel: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    pub results_dir: PathBuf,
    pub baseline_dir: PathBuf,
    pub actual_dir: PathBuf,
    pub diff_dir: PathBuf,

    /// Write missing or changed baselines instead of failing
    pub update_baselines: bool,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("test-results"),
            baseline_dir: PathBuf::from("test-results/baselines"),
            actual_dir: PathBuf::from("test-results/screenshots"),
            diff_dir: PathBuf::from("test-results/diffs"),
            update_baselines: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = CheckerConfig::from_toml_str("").unwrap();
        assert_eq!(config.site.base_url, "http://127.0.0.1:4321");
        assert_eq!(config.contract.referral_code, "RRANX");
        assert_eq!(config.tolerances.touch_target_px, 44.0);
        assert_eq!(config.browser.browser, BrowserKind::Chromium);
    }

    #[test]
    fn test_partial_override() {
        let config = CheckerConfig::from_toml_str(
            r#"
[site]
base_url = "https://guide.example.com"

[contract]
referral_code = "ABCDE"

[tolerances]
section_spacing_px = 80.0

[browser]
browser = "webkit"
max_parallel = 2
"#,
        )
        .unwrap();
        assert_eq!(config.site.base_url, "https://guide.example.com");
        assert_eq!(config.contract.referral_token(), "referralCode=ABCDE");
        assert_eq!(config.contract.partner_host, "railway.com");
        assert_eq!(config.tolerances.section_spacing_px, 80.0);
        assert_eq!(config.tolerances.column_height_ratio, 2.5);
        assert_eq!(config.browser.browser, BrowserKind::Webkit);
        assert_eq!(config.browser.max_parallel, 2);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = CheckerConfig::from_toml_str(
            r#"
[contract]
referral_code = ""

[tolerances]
visual_threshold_percent = 150.0
"#,
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("referral_code"));
        assert!(msg.contains("visual_threshold_percent"));
    }

    #[test]
    fn test_load_or_default() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("railguide.toml");
        let config = CheckerConfig::load_or_default(&missing).unwrap();
        assert_eq!(config.browser.max_parallel, 4);

        let mut file = std::fs::File::create(&missing).unwrap();
        writeln!(file, "[browser]\nsettle_ms = 1000").unwrap();
        let config = CheckerConfig::load_or_default(&missing).unwrap();
        assert_eq!(config.browser.settle_ms, 1000);
    }

    #[test]
    fn test_browser_kind_parse() {
        assert_eq!("Firefox".parse::<BrowserKind>().unwrap(), BrowserKind::Firefox);
        assert!("lynx".parse::<BrowserKind>().is_err());
    }
}
