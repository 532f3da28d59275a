//! Maps checks of one case onto probes and evaluates what they reported

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

use railguide_common::CheckerConfig;

use crate::error::{E2eError, E2eResult};
use crate::layout::{self, Assertion, Status};
use crate::probe::{
    Captured, ClipRect, HeadingFont, HeuristicFlags, ImageInfo, InteractionShot,
    LandmarkPresence, PathStage, PerformanceMetrics, Probe, ProbeOutput, TextBlock,
    ThemeToggled,
};
use crate::spec::{Check, CheckCase, Clip, InteractionState};
use crate::visual::VisualTester;

const STYLE_PROPERTIES: [&str; 5] = [
    "max-width",
    "margin-left",
    "margin-right",
    "padding-left",
    "padding-right",
];

/// Outcome of one screenshot comparison, as stored in the report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualDiffResult {
    pub name: String,
    pub threshold: f64,
    pub diff_percent: f64,
    pub matches: bool,
    pub diff_image_path: Option<PathBuf>,
    #[serde(default)]
    pub baseline_created: bool,
}

/// Assertions and screenshot comparisons of one case
#[derive(Debug, Default)]
pub struct CaseEvaluation {
    pub assertions: Vec<Assertion>,
    pub visual_diffs: Vec<VisualDiffResult>,
}

/// Turns the checks of a case into probes and back into assertions
pub struct CaseChecker<'a> {
    case: &'a CheckCase,
    config: &'a CheckerConfig,
}

impl<'a> CaseChecker<'a> {
    pub fn new(case: &'a CheckCase, config: &'a CheckerConfig) -> Self {
        Self { case, config }
    }

    fn key(index: usize, check: &Check) -> String {
        format!("{}:{}", index, check.name())
    }

    fn shot_path(&self, shot: &str) -> PathBuf {
        self.config
            .artifacts
            .actual_dir
            .join(format!("{}.png", self.case.artifact_name(shot)))
    }

    fn clip_rect(&self, clip: Clip) -> ClipRect {
        let (x, y, width, height) = clip.resolve(&self.case.viewport);
        ClipRect { x, y, width, height }
    }

    /// Check override, then suite override, then the configured default.
    /// Element crops default to the strict threshold.
    fn threshold(&self, check_threshold: Option<f64>, element_crop: bool) -> f64 {
        let tolerances = &self.config.tolerances;
        let default = if element_crop {
            tolerances.strict_visual_threshold_percent
        } else {
            tolerances.visual_threshold_percent
        };
        check_threshold
            .or(self.case.suite.visual_threshold)
            .unwrap_or(default)
    }

    fn scoped(&self, selector: &str) -> String {
        selector
            .split(',')
            .map(|s| format!("{} {}", self.config.contract.content_scope, s.trim()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Probes for every check of the case, keyed `{index}:{check name}`
    pub fn probes(&self) -> Vec<(String, Probe)> {
        let contract = &self.config.contract;
        let tolerances = &self.config.tolerances;
        let mut probes = Vec::new();

        for (index, check) in self.case.suite.checks.iter().enumerate() {
            let key = Self::key(index, check);
            match check {
                Check::CenteredContainer { selector, .. } => probes.push((
                    key,
                    Probe::ComputedStyle {
                        selector: selector.clone(),
                        properties: STYLE_PROPERTIES.iter().map(|p| p.to_string()).collect(),
                    },
                )),
                Check::NoHorizontalOverflow => probes.push((
                    key,
                    Probe::FirstBox {
                        selector: "body".to_string(),
                    },
                )),
                Check::HeadingHierarchy => probes.push((
                    key,
                    Probe::HeadingLevels {
                        selector: contract.heading_selector(),
                    },
                )),
                Check::Landmarks => probes.push((
                    key,
                    Probe::Landmarks {
                        landmarks: contract.landmarks.clone(),
                    },
                )),
                Check::TouchTargets => probes.push((
                    key,
                    Probe::Links {
                        selector: contract.partner_link_selector(),
                        limit: None,
                    },
                )),
                Check::ReferralLinks { selector, limit } => probes.push((
                    key,
                    Probe::Links {
                        selector: selector
                            .clone()
                            .unwrap_or_else(|| contract.partner_link_selector()),
                        limit: *limit,
                    },
                )),
                Check::CtaVisibility => probes.push((
                    key,
                    Probe::WaitVisible {
                        selector: contract.partner_link_selector(),
                        fallback: Some(contract.cta_fallback_selector.clone()),
                        timeout_ms: tolerances.first_cta_visible_ms,
                    },
                )),
                Check::SectionSpacing { selector } => probes.push((
                    key,
                    Probe::Boxes {
                        selector: selector
                            .clone()
                            .unwrap_or_else(|| contract.section_selector.clone()),
                    },
                )),
                Check::ColumnBalance { container, left, right } => {
                    let within = |s: &str| match container {
                        Some(c) => format!("{} {}", c, s),
                        None => s.to_string(),
                    };
                    probes.push((format!("{}/left", key), Probe::FirstBox { selector: within(left) }));
                    probes.push((format!("{}/right", key), Probe::FirstBox { selector: within(right) }));
                }
                Check::HeroProminence => probes.push((
                    key,
                    Probe::FirstBox {
                        selector: "h1".to_string(),
                    },
                )),
                Check::HeroLoadTime => probes.push((
                    key,
                    Probe::VisibleAfterNavigation {
                        selector: self.scoped("h1"),
                        timeout_ms: tolerances.hero_visible_ms,
                    },
                )),
                Check::Typography { selector } => probes.push((
                    key,
                    Probe::FontSizes {
                        selector: selector.clone().unwrap_or_else(|| {
                            format!("{}, header h1, header h2, header h3", self.scoped("h1, h2, h3"))
                        }),
                    },
                )),
                Check::ContentFlow { selector } => probes.push((
                    key,
                    Probe::TextBlocks {
                        selector: selector.clone().unwrap_or_else(|| "h1, h2, h3, p".to_string()),
                    },
                )),
                Check::ImageAltText => probes.push((key, Probe::Images)),
                Check::Screenshot { name, full_page, clip, selector, .. } => probes.push((
                    key,
                    Probe::Screenshot {
                        path: self.shot_path(name),
                        full_page: *full_page,
                        clip: clip.map(|c| self.clip_rect(c)),
                        selector: selector.clone(),
                    },
                )),
                Check::ThemeToggle { clip, transition_ms, .. } => probes.push((
                    key,
                    Probe::ThemeToggle {
                        selector: contract.theme_toggle_selector.clone(),
                        before: self.shot_path("theme-before"),
                        after: self.shot_path("theme-after"),
                        clip: clip.map(|c| self.clip_rect(c)),
                        transition_ms: *transition_ms,
                    },
                )),
                Check::InteractionStates { selector, limit, states, .. } => probes.push((
                    key,
                    Probe::InteractionStates {
                        selector: selector.clone(),
                        elements: (0..*limit)
                            .map(|i| {
                                states
                                    .iter()
                                    .map(|state| InteractionShot {
                                        state: *state,
                                        path: self.shot_path(&interaction_shot(i, *state)),
                                    })
                                    .collect()
                            })
                            .collect(),
                    },
                )),
                Check::Performance => probes.push((key, Probe::Performance)),
                Check::UxHeuristics => probes.push((
                    key,
                    Probe::Heuristics {
                        presence: self.heuristic_presence(),
                    },
                )),
                Check::ConversionPath => probes.push((
                    key,
                    Probe::ConversionPath {
                        stages: self.conversion_stages(),
                    },
                )),
                Check::ContentMentions { pattern, .. } => probes.push((
                    key,
                    Probe::TextMatches {
                        pattern: pattern.clone(),
                    },
                )),
            }
        }

        probes
    }

    /// Heuristics detectable from element presence alone
    fn heuristic_presence(&self) -> Vec<(String, String)> {
        vec![
            (
                "visibility_of_system_status".to_string(),
                r#"[class*="loading"], [class*="spinner"], [aria-live]"#.to_string(),
            ),
            (
                "user_control_and_freedom".to_string(),
                r#"nav, [role="navigation"], [class*="breadcrumb"]"#.to_string(),
            ),
            (
                "help_and_documentation".to_string(),
                r#"[class*="faq"], [class*="help"], [class*="support"]"#.to_string(),
            ),
            (
                "flexibility_and_efficiency".to_string(),
                self.config.contract.theme_toggle_selector.clone(),
            ),
        ]
    }

    fn conversion_stages(&self) -> Vec<PathStage> {
        let contract = &self.config.contract;
        let stage = |n: usize, slug: &str, label: &str, selector: String, last: bool| PathStage {
            label: label.to_string(),
            selector,
            last,
            screenshot: self.shot_path(&format!("conversion-step-{}-{}", n, slug)),
        };
        vec![
            stage(1, "hero", "Hero section visible", contract.hero_selector.clone(), false),
            stage(
                2,
                "features",
                "Features section visible",
                r#"[class*="feature"], .features"#.to_string(),
                false,
            ),
            stage(
                3,
                "testimonials",
                "Testimonials visible",
                r#"[class*="testimonial"], .testimonials"#.to_string(),
                false,
            ),
            stage(4, "faq", "FAQ section visible", r#"[class*="faq"], .faq"#.to_string(), false),
            stage(5, "final-cta", "Final CTA visible", contract.partner_link_selector(), true),
        ]
    }

    /// Evaluate every check against the probe output. Never fails as a whole:
    /// a missing or failed probe becomes a failed assertion for its check.
    pub fn evaluate(&self, output: &ProbeOutput, visual: &VisualTester) -> CaseEvaluation {
        let mut evaluation = CaseEvaluation::default();

        for (index, check) in self.case.suite.checks.iter().enumerate() {
            let key = Self::key(index, check);
            let name = check.name();
            let assertion = self
                .evaluate_check(&key, &name, check, output, visual, &mut evaluation.visual_diffs)
                .unwrap_or_else(|e| Assertion::fail(&name, e.to_string()));

            debug!("{} {}: {}", self.case.id(), assertion.check, assertion.status);
            evaluation.assertions.push(assertion);
        }

        evaluation
    }

    fn evaluate_check(
        &self,
        key: &str,
        name: &str,
        check: &Check,
        output: &ProbeOutput,
        visual: &VisualTester,
        diffs: &mut Vec<VisualDiffResult>,
    ) -> E2eResult<Assertion> {
        let contract = &self.config.contract;
        let tolerances = &self.config.tolerances;
        let viewport = &self.case.viewport;

        let assertion = match check {
            Check::CenteredContainer {
                require_padding_on_narrow,
                max_width_within_viewport,
                ..
            } => layout::centered_container(
                name,
                &output.style(key)?,
                viewport,
                *require_padding_on_narrow,
                *max_width_within_viewport,
            ),
            Check::NoHorizontalOverflow => layout::no_horizontal_overflow(
                name,
                output.first_box(key)?,
                viewport,
                tolerances.body_overflow_px,
            ),
            Check::HeadingHierarchy => layout::heading_hierarchy(name, &output.levels(key)?),
            Check::Landmarks => {
                layout::landmarks(name, &output.decode::<Vec<LandmarkPresence>>(key)?)
            }
            Check::TouchTargets => layout::touch_targets(
                name,
                &output.ctas(key)?,
                viewport,
                tolerances.touch_target_px,
            ),
            Check::ReferralLinks { .. } => {
                layout::referral_links(name, &output.ctas(key)?, contract, viewport)
            }
            Check::CtaVisibility => layout::visible_within(
                name,
                &output.elapsed(key)?,
                tolerances.first_cta_visible_ms,
            ),
            Check::SectionSpacing { .. } => {
                layout::section_spacing(name, &output.boxes(key)?, tolerances.section_spacing_px)
            }
            Check::ColumnBalance { .. } => layout::column_balance(
                name,
                output.first_box(&format!("{}/left", key))?,
                output.first_box(&format!("{}/right", key))?,
                tolerances.column_height_ratio,
                tolerances.column_min_height_px,
            ),
            Check::HeroProminence => {
                layout::hero_prominence(name, output.first_box(key)?, tolerances.hero_min_height_px)
            }
            Check::HeroLoadTime => {
                layout::visible_within(name, &output.elapsed(key)?, tolerances.hero_visible_ms)
            }
            Check::Typography { .. } => layout::typography(
                name,
                &output.decode::<Vec<HeadingFont>>(key)?,
                tolerances.heading_min_font_px,
            ),
            Check::ContentFlow { .. } => layout::content_flow(
                name,
                &output.decode::<Vec<TextBlock>>(key)?,
                tolerances.content_flow_backtrack_px,
            ),
            Check::ImageAltText => {
                layout::image_alt_text(name, &output.decode::<Vec<ImageInfo>>(key)?)
            }
            Check::Screenshot { name: shot, threshold, selector, .. } => {
                let captured: Captured = output.decode(key)?;
                if !captured.captured {
                    Assertion::skip(name, "screenshot target not visible")
                } else {
                    let threshold = self.threshold(*threshold, selector.is_some());
                    self.compare_screenshot(name, shot, threshold, visual, diffs)
                }
            }
            Check::ThemeToggle { threshold, .. } => {
                let toggled: ThemeToggled = output.decode(key)?;
                if !toggled.toggle_found {
                    Assertion::skip(name, "no visible theme toggle")
                } else {
                    self.evaluate_theme_toggle(name, self.threshold(*threshold, false), visual, diffs)?
                }
            }
            Check::InteractionStates { states, threshold, .. } => {
                let captured: Vec<usize> = output.decode(key)?;
                if captured.is_empty() {
                    Assertion::skip(name, "no visible interactive elements")
                } else {
                    let threshold = self.threshold(*threshold, true);
                    let parts: Vec<Assertion> = captured
                        .iter()
                        .flat_map(|&i| states.iter().map(move |&state| interaction_shot(i, state)))
                        .map(|shot| self.compare_screenshot(name, &shot, threshold, visual, diffs))
                        .collect();
                    worst_of(
                        name,
                        format!("{} interactive elements captured", captured.len()),
                        &parts,
                    )
                }
            }
            Check::Performance => layout::performance(
                name,
                &output.decode::<PerformanceMetrics>(key)?,
                tolerances,
            ),
            Check::UxHeuristics => {
                layout::ux_heuristics(name, &output.decode::<HeuristicFlags>(key)?)
            }
            Check::ConversionPath => {
                layout::conversion_path(name, &output.decode::<Vec<String>>(key)?)
            }
            Check::ContentMentions { pattern, min } => {
                layout::content_mentions(name, pattern, output.decode::<usize>(key)?, *min)
            }
        };

        Ok(assertion)
    }

    fn compare_screenshot(
        &self,
        check: &str,
        shot: &str,
        threshold: f64,
        visual: &VisualTester,
        diffs: &mut Vec<VisualDiffResult>,
    ) -> Assertion {
        let artifact = self.case.artifact_name(shot);
        match visual.compare(&artifact, Some(threshold)) {
            Ok(diff) => {
                diffs.push(VisualDiffResult {
                    name: artifact.clone(),
                    threshold,
                    diff_percent: diff.diff_percent,
                    matches: diff.matches,
                    diff_image_path: diff.diff_image_path.clone(),
                    baseline_created: diff.baseline_created,
                });
                if diff.baseline_created {
                    info!("Baseline created for {}", artifact);
                    Assertion::pass(check, format!("baseline created for {}", artifact))
                } else if diff.matches {
                    Assertion::pass(
                        check,
                        format!("{} differs by {:.2}% (threshold {}%)", artifact, diff.diff_percent, threshold),
                    )
                } else {
                    Assertion::fail(
                        check,
                        E2eError::ScreenshotMismatch {
                            name: artifact,
                            diff_percent: diff.diff_percent,
                            threshold,
                        }
                        .to_string(),
                    )
                }
            }
            Err(E2eError::BaselineNotFound(path)) => Assertion::skip(
                check,
                format!("no baseline at {}; capture with --update-baselines", path),
            ),
            Err(e) => Assertion::fail(check, e.to_string()),
        }
    }

    fn evaluate_theme_toggle(
        &self,
        check: &str,
        threshold: f64,
        visual: &VisualTester,
        diffs: &mut Vec<VisualDiffResult>,
    ) -> E2eResult<Assertion> {
        let before = visual.actual_path(&self.case.artifact_name("theme-before"));
        let after = visual.actual_path(&self.case.artifact_name("theme-after"));
        if !visual.images_differ(&before, &after)? {
            return Ok(Assertion::fail(check, "toggling the theme did not change the page"));
        }

        let parts = [
            self.compare_screenshot(check, "theme-before", threshold, visual, diffs),
            self.compare_screenshot(check, "theme-after", threshold, visual, diffs),
        ];
        Ok(worst_of(check, "theme states differ".to_string(), &parts))
    }
}

fn interaction_shot(index: usize, state: InteractionState) -> String {
    format!("interactive-{}-{}", index, state.as_str())
}

/// Folds several comparisons into one assertion carrying the worst status
fn worst_of(check: &str, summary: String, parts: &[Assertion]) -> Assertion {
    let status = parts.iter().map(|a| a.status).max().unwrap_or(Status::Pass);
    let message = format!(
        "{}; {}",
        summary,
        parts.iter().map(|a| a.message.as_str()).collect::<Vec<_>>().join("; ")
    );

    match status {
        Status::Fail => Assertion::fail(check, message),
        Status::Skip => Assertion::skip(check, message),
        Status::Warn => Assertion::warn(check, message),
        Status::Pass => Assertion::pass(check, message),
    }
}
