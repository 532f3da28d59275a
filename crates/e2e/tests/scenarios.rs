use image::{Rgba, RgbaImage};
use railguide_common::CheckerConfig;
use railguide_e2e::probe::ProbeOutput;
use railguide_e2e::visual::{VisualConfig, VisualTester};
use railguide_e2e::{CaseChecker, CheckCase, CheckSuite, Status};
use tempfile::TempDir;
use test_case::test_case;

struct Workspace {
    _dir: TempDir,
    config: CheckerConfig,
    visual: VisualTester,
}

fn workspace() -> Workspace {
    let dir = TempDir::new().unwrap();
    let mut config = CheckerConfig::default();
    config.artifacts.baseline_dir = dir.path().join("baselines");
    config.artifacts.actual_dir = dir.path().join("screenshots");
    config.artifacts.diff_dir = dir.path().join("diffs");
    let visual = VisualTester::new(VisualConfig::from_artifacts(&config.artifacts, 20.0, 5)).unwrap();
    Workspace { _dir: dir, config, visual }
}

fn first_case(yaml: &str) -> CheckCase {
    CheckSuite::from_yaml(yaml).unwrap().cases().remove(0)
}

fn probe_line(key: &str, value: serde_json::Value) -> String {
    format!(
        "__PROBE__ {}\n",
        serde_json::json!({ "key": key, "ok": true, "value": value })
    )
}

/// Referral Links At 375×812
///
/// Each referral link found by `a[href*="referralCode=RRANX"]` has a
/// non-zero box; a collapsed one fails the check.
#[test_case(48.0, Status::Pass; "rendered links pass")]
#[test_case(0.0, Status::Fail; "collapsed link fails")]
fn referral_links_on_mobile(second_height: f64, expected: Status) {
    let ws = workspace();
    let case = first_case(
        r#"
name: conversion
viewports: [mobile-s]
checks:
  - check: referral_links
    selector: 'a[href*="referralCode=RRANX"]'
"#,
    );

    let stdout = probe_line(
        "0:referral-links",
        serde_json::json!([
            { "index": 0, "text": "Deploy on Railway", "href": "https://railway.com?referralCode=RRANX",
              "visible": true, "bounding_box": { "x": 16, "y": 420, "width": 220, "height": 48 } },
            { "index": 1, "text": "Start free", "href": "https://railway.com/new?referralCode=RRANX",
              "visible": second_height > 0.0,
              "bounding_box": { "x": 16, "y": 900, "width": 180, "height": second_height } }
        ]),
    );

    let eval = CaseChecker::new(&case, &ws.config)
        .evaluate(&ProbeOutput::parse(&stdout).unwrap(), &ws.visual);
    assert_eq!(eval.assertions[0].status, expected, "{}", eval.assertions[0].message);
}

/// Centered Main Across Breakpoints
///
/// Equal margins and bounded width pass at 375, 768 and 1280; unequal
/// margins fail regardless of width.
#[test_case("mobile", "0px", "0px", Status::Pass)]
#[test_case("tablet", "0px", "0px", Status::Pass)]
#[test_case("desktop", "240px", "240px", Status::Pass)]
#[test_case("desktop", "0px", "480px", Status::Fail)]
fn centered_main(viewport: &str, left: &str, right: &str, expected: Status) {
    let ws = workspace();
    let case = first_case(&format!(
        "name: home\nviewports: [{}]\nchecks:\n  - check: centered_container\n",
        viewport
    ));
    let max_width = format!("{}px", case.viewport.width.min(800));

    let stdout = probe_line(
        "0:centered:main",
        serde_json::json!({
            "max-width": max_width,
            "margin-left": left,
            "margin-right": right,
            "padding-left": "16px",
            "padding-right": "16px",
        }),
    );

    let eval = CaseChecker::new(&case, &ws.config)
        .evaluate(&ProbeOutput::parse(&stdout).unwrap(), &ws.visual);
    assert_eq!(eval.assertions[0].status, expected, "{}", eval.assertions[0].message);
}

/// Touch targets below 44px only warn; the case still succeeds.
#[test]
fn small_touch_targets_warn() {
    let ws = workspace();
    let case = first_case("name: t\nviewports: [mobile-s]\nchecks:\n  - check: touch_targets\n");
    let stdout = probe_line(
        "0:touch-targets",
        serde_json::json!([
            { "index": 0, "href": "https://railway.com?referralCode=RRANX", "visible": true,
              "bounding_box": { "x": 0, "y": 10, "width": 60, "height": 30 } }
        ]),
    );

    let eval = CaseChecker::new(&case, &ws.config)
        .evaluate(&ProbeOutput::parse(&stdout).unwrap(), &ws.visual);
    assert_eq!(eval.assertions[0].status, Status::Warn);
    assert!(!eval.assertions[0].is_failure());
}

/// Theme Toggle Regression
///
/// Before and after screenshots must differ from each other and each stay
/// within 20% of its own baseline.
#[test_case(0, Status::Pass; "both states match")]
#[test_case(30, Status::Fail; "dark state regressed")]
fn theme_toggle_against_baselines(changed_rows: u32, expected: Status) {
    let ws = workspace();
    let case = first_case("name: theme\nchecks:\n  - check: theme_toggle\n    threshold: 20\n");

    let light = RgbaImage::from_pixel(10, 10, Rgba([250, 250, 250, 255]));
    let dark = RgbaImage::from_pixel(10, 10, Rgba([20, 20, 28, 255]));
    let before = case.artifact_name("theme-before");
    let after = case.artifact_name("theme-after");

    light.save(ws.visual.baseline_path(&before)).unwrap();
    dark.save(ws.visual.baseline_path(&after)).unwrap();
    light.save(ws.visual.actual_path(&before)).unwrap();

    let mut regressed = dark.clone();
    for y in 0..(changed_rows / 10).min(10) {
        for x in 0..10 {
            regressed.put_pixel(x, y, Rgba([200, 40, 40, 255]));
        }
    }
    regressed.save(ws.visual.actual_path(&after)).unwrap();

    let stdout = probe_line("0:theme-toggle", serde_json::json!({ "toggle_found": true }));
    let eval = CaseChecker::new(&case, &ws.config)
        .evaluate(&ProbeOutput::parse(&stdout).unwrap(), &ws.visual);

    assert_eq!(eval.assertions[0].status, expected, "{}", eval.assertions[0].message);
    assert_eq!(eval.visual_diffs.len(), 2);
}

/// A missing theme toggle skips the check instead of failing it.
#[test]
fn theme_toggle_absent_is_skipped() {
    let ws = workspace();
    let case = first_case("name: theme\nchecks:\n  - check: theme_toggle\n");
    let stdout = probe_line("0:theme-toggle", serde_json::json!({ "toggle_found": false }));
    let eval = CaseChecker::new(&case, &ws.config)
        .evaluate(&ProbeOutput::parse(&stdout).unwrap(), &ws.visual);
    assert_eq!(eval.assertions[0].status, Status::Skip);
}
