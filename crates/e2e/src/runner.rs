//! Check runner that orchestrates the site, Playwright and visual regression

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use railguide_common::{CheckerConfig, Viewport};

use crate::checker::{CaseChecker, CaseEvaluation, VisualDiffResult};
use crate::error::{E2eError, E2eResult};
use crate::layout::{Assertion, Status};
use crate::playwright::{PlaywrightConfig, PlaywrightHandle};
use crate::probe::ProbeOutput;
use crate::server::SiteServer;
use crate::spec::{CheckCase, CheckSuite};
use crate::visual::{VisualConfig, VisualTester};

/// Result of one suite at one viewport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseResult {
    pub suite: String,
    pub viewport: Viewport,
    pub success: bool,
    pub duration_ms: u64,
    pub assertions: Vec<Assertion>,
    pub visual_diffs: Vec<VisualDiffResult>,
    /// Set when the case could not be measured at all
    pub error: Option<String>,
}

impl CaseResult {
    fn from_evaluation(case: &CheckCase, evaluation: CaseEvaluation, duration_ms: u64) -> Self {
        let success = !evaluation.assertions.iter().any(Assertion::is_failure);
        Self {
            suite: case.suite.name.clone(),
            viewport: case.viewport.clone(),
            success,
            duration_ms,
            assertions: evaluation.assertions,
            visual_diffs: evaluation.visual_diffs,
            error: None,
        }
    }

    fn from_error(case: &CheckCase, error: &E2eError, duration_ms: u64) -> Self {
        Self {
            suite: case.suite.name.clone(),
            viewport: case.viewport.clone(),
            success: false,
            duration_ms,
            assertions: Vec::new(),
            visual_diffs: Vec::new(),
            error: Some(error.to_string()),
        }
    }

    pub fn id(&self) -> String {
        format!("{}@{}", self.suite, self.viewport.label)
    }

    pub fn warnings(&self) -> usize {
        self.assertions
            .iter()
            .filter(|a| a.status == Status::Warn)
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &Assertion> {
        self.assertions.iter().filter(|a| a.is_failure())
    }
}

/// Result of a whole run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub warnings: usize,
    pub duration_ms: u64,
    pub results: Vec<CaseResult>,
}

impl SuiteReport {
    pub fn from_results(started_at: DateTime<Utc>, duration_ms: u64, results: Vec<CaseResult>) -> Self {
        let passed = results.iter().filter(|r| r.success).count();
        Self {
            started_at,
            total: results.len(),
            passed,
            failed: results.len() - passed,
            warnings: results.iter().map(CaseResult::warnings).sum(),
            duration_ms,
            results,
        }
    }

    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// Main check runner
pub struct CheckRunner {
    config: CheckerConfig,
    site: Option<SiteServer>,
    suites_dir: PathBuf,
    output_dir: PathBuf,
}

impl CheckRunner {
    pub fn new() -> Self {
        Self::with_config(RunnerConfig::default())
    }

    pub fn with_config(config: RunnerConfig) -> Self {
        let output_dir = config
            .output_dir
            .unwrap_or_else(|| config.checker.artifacts.results_dir.clone());
        Self {
            config: config.checker,
            site: None,
            suites_dir: config.suites_dir,
            output_dir,
        }
    }

    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }

    /// Attach to or spawn the site under test
    pub async fn start_site(&mut self) -> E2eResult<()> {
        if self.site.is_some() {
            return Ok(());
        }

        let site = SiteServer::start(&self.config.site).await?;
        self.config.site.base_url = site.base_url().to_string();
        self.site = Some(site);
        Ok(())
    }

    pub fn stop_site(&mut self) -> E2eResult<()> {
        if let Some(mut site) = self.site.take() {
            site.stop()?;
        }
        Ok(())
    }

    fn visual_tester(&self) -> E2eResult<VisualTester> {
        VisualTester::new(VisualConfig::from_artifacts(
            &self.config.artifacts,
            self.config.tolerances.visual_threshold_percent,
            self.config.tolerances.pixel_channel_tolerance,
        ))
    }

    pub async fn run_all(&mut self) -> E2eResult<SuiteReport> {
        let suites = CheckSuite::load_all(&self.suites_dir)?;
        self.run_suites(&suites).await
    }

    pub async fn run_tagged(&mut self, tag: &str) -> E2eResult<SuiteReport> {
        let suites = CheckSuite::load_all(&self.suites_dir)?;
        let tagged: Vec<CheckSuite> = CheckSuite::filter_by_tag(&suites, tag)
            .into_iter()
            .cloned()
            .collect();
        if tagged.is_empty() {
            warn!("No suites tagged '{}'", tag);
        }
        self.run_suites(&tagged).await
    }

    pub async fn run_suite_named(&mut self, name: &str) -> E2eResult<SuiteReport> {
        let suite = CheckSuite::load_all(&self.suites_dir)?
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| E2eError::SuiteNotFound(name.to_string()))?;
        self.run_suites(std::slice::from_ref(&suite)).await
    }

    /// Run every case of the given suites, up to `max_parallel` at a time
    pub async fn run_suites(&mut self, suites: &[CheckSuite]) -> E2eResult<SuiteReport> {
        let started_at = Utc::now();
        let start = Instant::now();

        self.start_site().await?;

        let playwright = PlaywrightHandle::new(PlaywrightConfig::from_checker(&self.config))?;
        let visual = self.visual_tester()?;
        visual.clean_diffs()?;

        let cases: Vec<CheckCase> = suites.iter().flat_map(CheckSuite::cases).collect();
        let max_parallel = self.config.browser.max_parallel.max(1);

        info!(
            "Running {} case(s) from {} suite(s), {} at a time...",
            cases.len(),
            suites.len(),
            max_parallel
        );

        let this = &*self;
        let mut results: Vec<CaseResult> = stream::iter(cases.iter())
            .map(|case| this.run_case(case, &playwright, &visual))
            .buffer_unordered(max_parallel)
            .collect()
            .await;
        results.sort_by(|a, b| a.suite.cmp(&b.suite).then(a.viewport.width.cmp(&b.viewport.width)));

        let report = SuiteReport::from_results(started_at, start.elapsed().as_millis() as u64, results);

        info!(
            "Check results: {} passed, {} failed, {} warnings ({} ms)",
            report.passed, report.failed, report.warnings, report.duration_ms
        );

        Ok(report)
    }

    /// Run one case in isolation. Errors become a failed result.
    pub async fn run_case(
        &self,
        case: &CheckCase,
        playwright: &PlaywrightHandle,
        visual: &VisualTester,
    ) -> CaseResult {
        let start = Instant::now();
        debug!("Running case: {}", case.id());

        let result = match self.measure_case(case, playwright, visual).await {
            Ok(evaluation) => {
                CaseResult::from_evaluation(case, evaluation, start.elapsed().as_millis() as u64)
            }
            Err(e) => CaseResult::from_error(case, &e, start.elapsed().as_millis() as u64),
        };

        if result.success {
            info!("✓ {} ({} ms)", result.id(), result.duration_ms);
        } else if let Some(e) = &result.error {
            error!("✗ {} - {}", result.id(), e);
        } else {
            for failure in result.failures() {
                error!("✗ {} {} - {}", result.id(), failure.check, failure.message);
            }
        }

        result
    }

    async fn measure_case(
        &self,
        case: &CheckCase,
        playwright: &PlaywrightHandle,
        visual: &VisualTester,
    ) -> E2eResult<CaseEvaluation> {
        let checker = CaseChecker::new(case, &self.config);
        let probes = checker.probes();
        let script = playwright.build_script(case, &probes);

        let stdout = playwright.run_script(&script).await?;
        let output = ProbeOutput::parse(&stdout)?;
        if output.is_empty() && !probes.is_empty() {
            return Err(E2eError::Playwright(format!(
                "{} produced no probe output",
                case.id()
            )));
        }

        Ok(checker.evaluate(&output, visual))
    }

    /// Promote every actual screenshot to baseline
    pub fn update_baselines(&self) -> E2eResult<Vec<String>> {
        let updated = self.visual_tester()?.update_all_baselines()?;
        info!("Updated {} baseline(s)", updated.len());
        Ok(updated)
    }

    /// Write the report to `check-results.json` in the output directory
    pub fn write_results(&self, report: &SuiteReport) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;

        let path = self.output_dir.join("check-results.json");
        let json = serde_json::to_string_pretty(report)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

impl Default for CheckRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CheckRunner {
    fn drop(&mut self) {
        if let Err(e) = self.stop_site() {
            warn!("Failed to stop site: {}", e);
        }
    }
}

/// Configuration for the check runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub checker: CheckerConfig,
    pub suites_dir: PathBuf,
    /// Defaults to the configured results directory
    pub output_dir: Option<PathBuf>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            checker: CheckerConfig::default(),
            suites_dir: PathBuf::from("checks"),
            output_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn case() -> CheckCase {
        CheckSuite::from_yaml("name: home\nviewports: [mobile-s]\nchecks:\n  - check: landmarks\n")
            .unwrap()
            .cases()
            .remove(0)
    }

    #[test]
    fn test_case_result_success_ignores_warnings() {
        let evaluation = CaseEvaluation {
            assertions: vec![
                Assertion::pass("landmarks", "ok"),
                Assertion::warn("touch-targets", "small"),
                Assertion::skip("screenshot:full", "no baseline"),
            ],
            visual_diffs: vec![],
        };
        let result = CaseResult::from_evaluation(&case(), evaluation, 10);
        assert!(result.success);
        assert_eq!(result.warnings(), 1);
        assert_eq!(result.id(), "home@mobile-s");
    }

    #[test]
    fn test_report_counts() {
        let ok = CaseResult::from_evaluation(
            &case(),
            CaseEvaluation {
                assertions: vec![Assertion::warn("w", "w")],
                visual_diffs: vec![],
            },
            5,
        );
        let broken = CaseResult::from_error(&case(), &E2eError::Timeout("script".to_string()), 7);
        let report = SuiteReport::from_results(Utc::now(), 12, vec![ok, broken]);
        assert_eq!(report.total, 2);
        assert_eq!(report.passed, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.warnings, 1);
        assert!(!report.success());
    }

    #[test]
    fn test_write_results() {
        let dir = TempDir::new().unwrap();
        let runner = CheckRunner::with_config(RunnerConfig {
            output_dir: Some(dir.path().to_path_buf()),
            ..RunnerConfig::default()
        });
        let report = SuiteReport::from_results(Utc::now(), 0, vec![]);
        let path = runner.write_results(&report).unwrap();
        assert_eq!(path, dir.path().join("check-results.json"));

        let parsed: SuiteReport =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(parsed.total, 0);
    }

    #[tokio::test]
    async fn test_unknown_suite_name() {
        let dir = TempDir::new().unwrap();
        let mut runner = CheckRunner::with_config(RunnerConfig {
            suites_dir: dir.path().to_path_buf(),
            ..RunnerConfig::default()
        });
        assert!(matches!(
            runner.run_suite_named("missing").await,
            Err(E2eError::SuiteNotFound(_))
        ));
    }
}
