//! Playwright browser automation
//!
//! Each check case becomes one Node script: launch a browser, open an
//! isolated context at the case's viewport, navigate, settle, run the setup
//! actions and then every probe. The browser is closed in `finally` on every
//! exit path.

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;
use tokio::process::Command as TokioCommand;
use tracing::debug;

use railguide_common::{BrowserKind, CheckerConfig};

use crate::error::{E2eError, E2eResult};
use crate::probe::{js_str, Probe, PROBE_MARKER};
use crate::spec::{Action, CheckCase, ScrollTarget};

/// Playwright browser handle
pub struct PlaywrightHandle {
    base_url: String,
    screenshot_dir: PathBuf,
    browser: BrowserKind,
    headless: bool,
    settle_ms: u64,
    navigation_timeout_ms: u64,
    case_timeout: Duration,
    work_dir: PathBuf,
}

impl PlaywrightHandle {
    /// Create a new handle after verifying Playwright is installed
    pub fn new(config: PlaywrightConfig) -> E2eResult<Self> {
        Self::check_playwright_installed()?;
        Self::unchecked(config)
    }

    /// Create a handle without probing for the Playwright install
    pub fn unchecked(config: PlaywrightConfig) -> E2eResult<Self> {
        std::fs::create_dir_all(&config.screenshot_dir)?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            screenshot_dir: config.screenshot_dir,
            browser: config.browser,
            headless: config.headless,
            settle_ms: config.settle_ms,
            navigation_timeout_ms: config.navigation_timeout_ms,
            case_timeout: config.case_timeout,
            work_dir: config.work_dir,
        })
    }

    fn check_playwright_installed() -> E2eResult<()> {
        let output = Command::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match output {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }

    pub fn screenshot_path(&self, name: &str) -> PathBuf {
        self.screenshot_dir.join(format!("{}.png", name))
    }

    /// Build the script measuring one case
    pub fn build_script(&self, case: &CheckCase, probes: &[(String, Probe)]) -> String {
        let settle_ms = case.suite.settle_ms.unwrap_or(self.settle_ms);
        let url = format!("{}{}", self.base_url, case.suite.page);
        let mut script = String::new();

        script.push_str(&format!(
            r#"
const {{ {browser} }} = require('playwright');

const emit = (key, ok, value, error) =>
  console.log('{marker} ' + JSON.stringify({{ key, ok, value, error }}));

(async () => {{
  const browser = await {browser}.launch({{ headless: {headless} }});
  try {{
    const context = await browser.newContext({{
      viewport: {{ width: {width}, height: {height} }}
    }});
    const page = await context.newPage();
    page.setDefaultTimeout({nav_timeout});
    const url = {url};

    const settle = async () => {{
      await page.waitForLoadState('networkidle').catch(() => {{}});
      await page.waitForTimeout({settle_ms});
    }};

    const watches = {{}};
    const navStart = Date.now();
    const navigation = page.goto(url, {{ waitUntil: 'load', timeout: {nav_timeout} }});
{watches}    await navigation;
    await settle();
"#,
            browser = self.browser.as_str(),
            marker = PROBE_MARKER,
            headless = self.headless,
            width = case.viewport.width,
            height = case.viewport.height,
            nav_timeout = self.navigation_timeout_ms,
            url = js_str(&url),
            watches = probes
                .iter()
                .filter_map(|(key, probe)| probe.watch_js(key))
                .collect::<String>(),
        ));

        for (i, action) in case.suite.actions.iter().enumerate() {
            script.push_str(&format!("\n    // Action {}\n", i + 1));
            script.push_str(&action_to_js(action));
            script.push('\n');
        }

        for (key, probe) in probes {
            script.push_str(&probe.to_js(key));
        }

        script.push_str(
            r#"
  } catch (error) {
    console.error(JSON.stringify({ success: false, error: error.message, stack: error.stack }));
    process.exitCode = 1;
  } finally {
    await browser.close();
  }
})();
"#,
        );

        script
    }

    /// Run a script with node and return its stdout
    pub async fn run_script(&self, script: &str) -> E2eResult<String> {
        // Node resolves `require` from the script's directory, so the script
        // lives under the work dir next to its node_modules
        let temp_dir = tempfile::Builder::new()
            .prefix(".railguide-case-")
            .tempdir_in(&self.work_dir)?;
        let script_path = temp_dir.path().join("case.js");
        std::fs::write(&script_path, script)?;

        debug!("Running Playwright script: {}", script_path.display());

        let run = TokioCommand::new("node")
            .arg(&script_path)
            .current_dir(&self.work_dir)
            .env("NODE_PATH", self.work_dir.join("node_modules"))
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.case_timeout, run)
            .await
            .map_err(|_| {
                E2eError::Timeout(format!("script did not finish within {:?}", self.case_timeout))
            })??;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(E2eError::Playwright(format!(
                "Script failed:\nstdout: {}\nstderr: {}",
                stdout, stderr
            )));
        }

        Ok(stdout)
    }
}

fn action_to_js(action: &Action) -> String {
    match action {
        Action::Click { selector, optional: false } => {
            format!("    await page.locator({}).first().click();", js_str(selector))
        }
        Action::Click { selector, optional: true } => format!(
            r#"    {{
      const target = page.locator({sel}).first();
      if (await target.isVisible()) await target.click();
    }}"#,
            sel = js_str(selector),
        ),
        Action::Hover { selector } => {
            format!("    await page.locator({}).first().hover();", js_str(selector))
        }
        Action::Scroll { to } => {
            let expr = match to {
                ScrollTarget::ViewportHeight => "window.scrollTo(0, window.innerHeight)",
                ScrollTarget::Bottom => "window.scrollTo(0, document.body.scrollHeight)",
                ScrollTarget::Top => "window.scrollTo(0, 0)",
            };
            format!("    await page.evaluate(() => {});", expr)
        }
        Action::Sleep { ms } => format!("    await page.waitForTimeout({});", ms),
        Action::Wait { selector, timeout_ms, state } => format!(
            "    await page.locator({}).first().waitFor({{ state: '{}', timeout: {} }});",
            js_str(selector),
            state.as_str(),
            timeout_ms
        ),
        Action::InitScript { script } => format!(
            "    await context.addInitScript({{ content: {} }});",
            js_str(script)
        ),
        Action::Reload => r#"    await page.reload({ waitUntil: 'load' });
    await settle();"#
            .to_string(),
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub base_url: String,
    pub screenshot_dir: PathBuf,
    pub browser: BrowserKind,
    pub headless: bool,
    pub settle_ms: u64,
    pub navigation_timeout_ms: u64,
    /// Upper bound for one whole case script
    pub case_timeout: Duration,
    /// Project directory whose node_modules provides `playwright`
    pub work_dir: PathBuf,
}

impl PlaywrightConfig {
    pub fn from_checker(config: &CheckerConfig) -> Self {
        Self {
            base_url: config.site.base_url.clone(),
            screenshot_dir: config.artifacts.actual_dir.clone(),
            browser: config.browser.browser,
            headless: config.browser.headless,
            settle_ms: config.browser.settle_ms,
            navigation_timeout_ms: config.browser.navigation_timeout_ms,
            case_timeout: Duration::from_secs(config.browser.case_timeout_secs),
            work_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self::from_checker(&CheckerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::CheckSuite;
    use tempfile::TempDir;

    fn handle(dir: &TempDir, browser: BrowserKind) -> PlaywrightHandle {
        PlaywrightHandle::unchecked(PlaywrightConfig {
            base_url: "http://127.0.0.1:4321/".to_string(),
            screenshot_dir: dir.path().to_path_buf(),
            browser,
            ..PlaywrightConfig::default()
        })
        .unwrap()
    }

    fn case(yaml: &str) -> CheckCase {
        CheckSuite::from_yaml(yaml).unwrap().cases().remove(0)
    }

    #[test]
    fn test_script_header_uses_case_viewport() {
        let dir = TempDir::new().unwrap();
        let pw = handle(&dir, BrowserKind::Webkit);
        let case = case("name: home\nviewports: [mobile-s]\nchecks:\n  - check: landmarks\n");
        let probes = vec![("0:landmarks".to_string(), Probe::Performance)];
        let script = pw.build_script(&case, &probes);

        assert!(script.contains("const { webkit } = require('playwright');"));
        assert!(script.contains("viewport: { width: 375, height: 812 }"));
        assert!(script.contains(r#"const url = "http://127.0.0.1:4321/";"#));
        assert!(script.contains(r#"emit("0:landmarks", true, value)"#));
        assert!(script.contains("await browser.close();"));
        assert!(script.contains("waitForTimeout(500)"));
    }

    #[test]
    fn test_suite_settle_overrides_default() {
        let dir = TempDir::new().unwrap();
        let pw = handle(&dir, BrowserKind::Chromium);
        let case = case("name: x\nsettle_ms: 1500\nchecks:\n  - check: landmarks\n");
        assert!(pw.build_script(&case, &[]).contains("waitForTimeout(1500)"));
    }

    #[test]
    fn test_no_js_fallback_actions() {
        let dir = TempDir::new().unwrap();
        let pw = handle(&dir, BrowserKind::Chromium);
        let case = case(
            r#"
name: no-js
page: /blog
actions:
  - action: init_script
    script: "window.addEventListener = () => {};"
  - action: reload
checks:
  - check: heading_hierarchy
"#,
        );
        let script = pw.build_script(&case, &[]);
        let init = script.find("addInitScript").unwrap();
        let reload = script.find("page.reload").unwrap();
        assert!(init < reload);
        assert!(script.contains(r#"content: "window.addEventListener = () => {};""#));
        assert!(script.contains(r#"const url = "http://127.0.0.1:4321/blog";"#));
    }

    #[test]
    fn test_optional_click_checks_visibility() {
        let js = action_to_js(&Action::Click {
            selector: "[aria-label*=\"menu\"]".to_string(),
            optional: true,
        });
        assert!(js.contains("if (await target.isVisible()) await target.click();"));
    }

    fn node_available() -> bool {
        Command::new("node")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    #[tokio::test]
    async fn test_run_script_resolves_modules_from_work_dir() {
        if !node_available() {
            eprintln!("node not installed, skipping");
            return;
        }
        let project = TempDir::new().unwrap();
        let module_dir = project.path().join("node_modules").join("railguide-stub");
        std::fs::create_dir_all(&module_dir).unwrap();
        std::fs::write(
            module_dir.join("index.js"),
            "module.exports = { browserName: () => 'stub-chromium' };",
        )
        .unwrap();

        let pw = PlaywrightHandle::unchecked(PlaywrightConfig {
            screenshot_dir: project.path().join("shots"),
            work_dir: project.path().to_path_buf(),
            ..PlaywrightConfig::default()
        })
        .unwrap();

        let stdout = pw
            .run_script("console.log(require('railguide-stub').browserName());")
            .await
            .unwrap();
        assert_eq!(stdout.trim(), "stub-chromium");

        // The per-case script directory is cleaned up afterwards
        let leftovers = std::fs::read_dir(project.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".railguide-case-"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_failing_script_reports_stderr() {
        if !node_available() {
            eprintln!("node not installed, skipping");
            return;
        }
        let project = TempDir::new().unwrap();
        let pw = PlaywrightHandle::unchecked(PlaywrightConfig {
            screenshot_dir: project.path().join("shots"),
            work_dir: project.path().to_path_buf(),
            ..PlaywrightConfig::default()
        })
        .unwrap();

        match pw.run_script("require('not-installed-anywhere');").await {
            Err(E2eError::Playwright(msg)) => assert!(msg.contains("not-installed-anywhere")),
            other => panic!("expected playwright error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_visibility_watch_starts_before_navigation_completes() {
        let dir = TempDir::new().unwrap();
        let pw = handle(&dir, BrowserKind::Chromium);
        let case = case("name: layout\nchecks:\n  - check: hero_load_time\n");
        let probes = vec![(
            "0:hero-load-time".to_string(),
            Probe::VisibleAfterNavigation {
                selector: "main h1".to_string(),
                timeout_ms: 3000,
            },
        )];
        let script = pw.build_script(&case, &probes);

        let goto = script.find("page.goto(url").unwrap();
        let watch = script.find(r#"watches["0:hero-load-time"] ="#).unwrap();
        let arrived = script.find("await navigation;").unwrap();
        assert!(goto < watch && watch < arrived);
    }

    #[test]
    fn test_screenshot_path() {
        let dir = TempDir::new().unwrap();
        let pw = handle(&dir, BrowserKind::Chromium);
        assert_eq!(pw.screenshot_path("home-full"), dir.path().join("home-full.png"));
    }
}
