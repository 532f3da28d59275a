use railguide_common::CheckerConfig;
use railguide_e2e::{CheckRunner, RunnerConfig};
use std::path::PathBuf;

/// Live Smoke Run
///
/// Runs the `smoke` suites against a real site. Needs node, the playwright
/// package and a site at `RAILGUIDE_BASE_URL`, so it is ignored by default:
///
/// ```text
/// RAILGUIDE_BASE_URL=http://127.0.0.1:4321 cargo test -p railguide-e2e --test live_site -- --ignored
/// ```
#[tokio::test]
#[ignore]
async fn smoke_suites_pass_against_live_site() {
    let base_url = std::env::var("RAILGUIDE_BASE_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:4321".to_string());
    let results = tempfile::tempdir().unwrap();

    let mut checker = CheckerConfig::default();
    checker.site.base_url = base_url;
    checker.artifacts.results_dir = results.path().to_path_buf();
    checker.artifacts.actual_dir = results.path().join("screenshots");
    checker.artifacts.baseline_dir = results.path().join("baselines");
    checker.artifacts.diff_dir = results.path().join("diffs");

    let mut runner = CheckRunner::with_config(RunnerConfig {
        checker,
        suites_dir: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../checks"),
        output_dir: None,
    });

    let report = runner.run_tagged("smoke").await.expect("runner error");
    runner.write_results(&report).unwrap();

    for result in report.results.iter().filter(|r| !r.success) {
        eprintln!("{}: {:?}", result.id(), result.error);
        for failure in result.failures() {
            eprintln!("  {} - {}", failure.check, failure.message);
        }
    }
    assert!(report.success(), "{} of {} cases failed", report.failed, report.total);
    assert!(results.path().join("check-results.json").exists());
}
