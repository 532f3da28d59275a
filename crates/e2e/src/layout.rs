//! Layout and visual consistency assertions
//!
//! Pure read-then-compare functions over measurements taken from a loaded
//! page. Nothing here touches the browser, so every threshold decision is
//! testable without one. Outcomes are data: a failed comparison yields an
//! [`Assertion`] with [`Status::Fail`], never an error.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use railguide_common::{BoundingBox, CtaRecord, SiteContract, StyleSnapshot, Tolerances, Viewport};

use crate::probe::{
    Elapsed, HeadingFont, HeuristicFlags, ImageInfo, LandmarkPresence, PerformanceMetrics,
    TextBlock,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pass,
    Skip,
    Warn,
    Fail,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Pass => write!(f, "pass"),
            Status::Skip => write!(f, "skip"),
            Status::Warn => write!(f, "warn"),
            Status::Fail => write!(f, "fail"),
        }
    }
}

/// Outcome of one check within one case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assertion {
    pub check: String,
    pub status: Status,
    pub message: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub measured: Value,
}

impl Assertion {
    fn new(check: &str, status: Status, message: impl Into<String>) -> Self {
        Self {
            check: check.to_string(),
            status,
            message: message.into(),
            measured: Value::Null,
        }
    }

    pub fn pass(check: &str, message: impl Into<String>) -> Self {
        Self::new(check, Status::Pass, message)
    }

    pub fn fail(check: &str, message: impl Into<String>) -> Self {
        Self::new(check, Status::Fail, message)
    }

    pub fn warn(check: &str, message: impl Into<String>) -> Self {
        Self::new(check, Status::Warn, message)
    }

    pub fn skip(check: &str, message: impl Into<String>) -> Self {
        Self::new(check, Status::Skip, message)
    }

    pub fn with_measured(mut self, measured: Value) -> Self {
        self.measured = measured;
        self
    }

    pub fn is_failure(&self) -> bool {
        self.status == Status::Fail
    }
}

/// Container is bounded and centered; narrow viewports also need side padding
pub fn centered_container(
    check: &str,
    style: &StyleSnapshot,
    viewport: &Viewport,
    require_padding_on_narrow: bool,
    max_width_within_viewport: bool,
) -> Assertion {
    let measured = json!(style);
    let mut problems = Vec::new();

    match style.px("max-width") {
        Some(w) if w <= 0.0 => problems.push(format!("max-width {}px is not positive", w)),
        Some(w) if max_width_within_viewport && w > viewport.width as f64 => problems.push(
            format!("max-width {}px exceeds viewport width {}px", w, viewport.width),
        ),
        Some(_) => {}
        None => problems.push(format!(
            "max-width is unbounded ({})",
            style.get("max-width").unwrap_or("missing")
        )),
    }

    if !style.margins_equal() {
        problems.push(format!(
            "margins differ: left {} vs right {}",
            style.get("margin-left").unwrap_or("missing"),
            style.get("margin-right").unwrap_or("missing"),
        ));
    }

    if require_padding_on_narrow && viewport.is_narrow() {
        for side in ["padding-left", "padding-right"] {
            if style.px(side).map(|p| p <= 0.0).unwrap_or(true) {
                problems.push(format!(
                    "{} is {} on a {}px viewport",
                    side,
                    style.get(side).unwrap_or("missing"),
                    viewport.width
                ));
            }
        }
    }

    if problems.is_empty() {
        Assertion::pass(check, "container is bounded and centered").with_measured(measured)
    } else {
        Assertion::fail(check, problems.join("; ")).with_measured(measured)
    }
}

pub fn no_horizontal_overflow(
    check: &str,
    body: Option<BoundingBox>,
    viewport: &Viewport,
    tolerance: f64,
) -> Assertion {
    let Some(body) = body else {
        return Assertion::fail(check, "body has no bounding box");
    };
    let (left, right) = body.horizontal_margins(viewport.width as f64);
    let measured = json!({
        "body_width": body.width,
        "viewport_width": viewport.width,
        "margin_left": left,
        "margin_right": right,
    });
    if body.fits_horizontally(viewport.width as f64, tolerance) {
        Assertion::pass(check, format!("body width {:.0}px fits", body.width)).with_measured(measured)
    } else {
        Assertion::fail(
            check,
            format!(
                "body width {:.0}px overflows {}px viewport (tolerance {}px)",
                body.width, viewport.width, tolerance
            ),
        )
        .with_measured(measured)
    }
}

/// Content must open with a top-level heading
pub fn heading_hierarchy(check: &str, levels: &[u8]) -> Assertion {
    let measured = json!(levels);
    match levels.first() {
        None => Assertion::pass(check, "no headings in content scope").with_measured(measured),
        Some(1) => Assertion::pass(check, "content starts with h1").with_measured(measured),
        Some(level) => Assertion::fail(
            check,
            format!("first content heading is h{}, expected h1", level),
        )
        .with_measured(measured),
    }
}

pub fn landmarks(check: &str, found: &[LandmarkPresence]) -> Assertion {
    if found.is_empty() {
        return Assertion::skip(check, "no landmarks configured");
    }
    let missing: Vec<&str> = found
        .iter()
        .filter(|l| !l.visible)
        .map(|l| l.name.as_str())
        .collect();
    let measured = json!(found);
    if missing.is_empty() {
        Assertion::pass(check, format!("{} landmarks visible", found.len())).with_measured(measured)
    } else {
        Assertion::fail(check, format!("landmarks not visible: {}", missing.join(", ")))
            .with_measured(measured)
    }
}

/// Undersized touch targets are reported as warnings, never failures
pub fn touch_targets(check: &str, ctas: &[CtaRecord], viewport: &Viewport, min: f64) -> Assertion {
    if !viewport.is_mobile() {
        return Assertion::skip(check, format!("{} is not a mobile viewport", viewport));
    }
    let measured: Vec<&CtaRecord> = ctas.iter().filter(|c| c.bounding_box.is_some()).collect();
    if measured.is_empty() {
        return Assertion::skip(check, "no measurable CTAs");
    }

    let small: Vec<String> = measured
        .iter()
        .filter(|c| !c.touch_target_adequate(min))
        .map(|c| c.describe())
        .collect();

    for cta in &small {
        warn!("CTA {} is not touch-friendly on {} (min {}px)", cta, viewport, min);
    }

    let detail = json!(measured
        .iter()
        .map(|c| json!({
            "index": c.index,
            "in_viewport": c.in_viewport(viewport),
            "adequate": c.touch_target_adequate(min),
        }))
        .collect::<Vec<_>>());

    if small.is_empty() {
        Assertion::pass(check, format!("{} touch targets at least {}px", measured.len(), min))
            .with_measured(detail)
    } else {
        Assertion::warn(
            check,
            format!("{} of {} touch targets below {}px: {}", small.len(), measured.len(), min, small.join(", ")),
        )
        .with_measured(detail)
    }
}

/// Every inspected partner link carries the referral code and is rendered.
/// The header logo is exempt from the visibility requirement on mobile.
pub fn referral_links(
    check: &str,
    ctas: &[CtaRecord],
    contract: &SiteContract,
    viewport: &Viewport,
) -> Assertion {
    if ctas.is_empty() {
        return Assertion::fail(check, "no referral links found");
    }

    let mut problems = Vec::new();
    let mut exempt = 0;

    for cta in ctas {
        if !cta.points_to_partner(contract) || !cta.has_referral_code(contract) {
            problems.push(format!(
                "{} href {:?} does not carry {}",
                cta.describe(),
                cta.href.as_deref().unwrap_or(""),
                contract.referral_link()
            ));
        }

        if viewport.is_mobile() && cta.is_header_logo(contract) {
            exempt += 1;
            continue;
        }

        if !cta.visible || !cta.is_rendered() {
            problems.push(format!("{} is not visible", cta.describe()));
        }
    }

    let measured = json!({ "links": ctas.len(), "exempt": exempt });
    if problems.is_empty() {
        Assertion::pass(
            check,
            format!("{} referral links carry {}", ctas.len(), contract.referral_token()),
        )
        .with_measured(measured)
    } else {
        Assertion::fail(check, problems.join("; ")).with_measured(measured)
    }
}

/// Something became visible within `limit_ms`
pub fn visible_within(check: &str, elapsed: &Elapsed, limit_ms: u64) -> Assertion {
    let measured = json!(elapsed);
    let via = if elapsed.via_fallback { " (via fallback)" } else { "" };
    if elapsed.elapsed_ms <= limit_ms as f64 {
        Assertion::pass(check, format!("visible after {:.0}ms{}", elapsed.elapsed_ms, via))
            .with_measured(measured)
    } else {
        Assertion::fail(
            check,
            format!("visible after {:.0}ms{}, limit {}ms", elapsed.elapsed_ms, via, limit_ms),
        )
        .with_measured(measured)
    }
}

/// Gaps between consecutive sections stay within `tolerance` of the mean gap
pub fn section_spacing(check: &str, sections: &[BoundingBox], tolerance: f64) -> Assertion {
    let gaps: Vec<f64> = sections.windows(2).map(|w| w[0].gap_to(&w[1])).collect();
    if gaps.len() < 2 {
        return Assertion::pass(check, format!("{} section gaps, nothing to compare", gaps.len()))
            .with_measured(json!(gaps));
    }

    let mean = gaps.iter().sum::<f64>() / gaps.len() as f64;
    let outliers: Vec<String> = gaps
        .iter()
        .enumerate()
        .filter(|(_, g)| (*g - mean).abs() >= tolerance)
        .map(|(i, g)| format!("gap {} is {:.0}px", i, g))
        .collect();

    let measured = json!({ "gaps": gaps, "mean": mean });
    if outliers.is_empty() {
        Assertion::pass(check, format!("{} gaps within {}px of {:.0}px", gaps.len(), tolerance, mean))
            .with_measured(measured)
    } else {
        Assertion::fail(
            check,
            format!("mean gap {:.0}px, tolerance {}px: {}", mean, tolerance, outliers.join(", ")),
        )
        .with_measured(measured)
    }
}

pub fn column_balance(
    check: &str,
    left: Option<BoundingBox>,
    right: Option<BoundingBox>,
    max_ratio: f64,
    min_height: f64,
) -> Assertion {
    let (Some(left), Some(right)) = (left, right) else {
        return Assertion::skip(check, "columns not rendered");
    };

    let short = left.height.min(right.height);
    let tall = left.height.max(right.height);
    let measured = json!({ "left_height": left.height, "right_height": right.height });
    if short <= 0.0 {
        return Assertion::fail(check, "a column has zero height").with_measured(measured);
    }

    let ratio = tall / short;
    let mut problems = Vec::new();
    if ratio >= max_ratio {
        problems.push(format!("height ratio {:.2} reaches {}", ratio, max_ratio));
    }
    if left.height <= min_height {
        problems.push(format!("left column {:.0}px not above {}px", left.height, min_height));
    }
    if right.height <= min_height {
        problems.push(format!("right column {:.0}px not above {}px", right.height, min_height));
    }

    let measured = json!({ "left_height": left.height, "right_height": right.height, "ratio": ratio });
    if problems.is_empty() {
        Assertion::pass(check, format!("height ratio {:.2}", ratio)).with_measured(measured)
    } else {
        Assertion::fail(check, problems.join("; ")).with_measured(measured)
    }
}

pub fn hero_prominence(check: &str, hero: Option<BoundingBox>, min_height: f64) -> Assertion {
    match hero {
        None => Assertion::fail(check, "hero heading not rendered"),
        Some(b) if b.height > min_height => {
            Assertion::pass(check, format!("hero height {:.0}px", b.height))
        }
        Some(b) => Assertion::fail(
            check,
            format!("hero height {:.0}px not above {}px", b.height, min_height),
        ),
    }
}

pub fn typography(check: &str, headings: &[HeadingFont], min_font: f64) -> Assertion {
    if headings.is_empty() {
        return Assertion::skip(check, "no visible headings");
    }
    let small: Vec<String> = headings
        .iter()
        .filter(|h| h.font_size_px <= min_font)
        .map(|h| format!("{} \"{}\" {}px", h.tag, h.text, h.font_size_px))
        .collect();
    let measured = json!(headings);
    if small.is_empty() {
        Assertion::pass(check, format!("{} headings above {}px", headings.len(), min_font))
            .with_measured(measured)
    } else {
        Assertion::fail(check, format!("headings too small: {}", small.join(", ")))
            .with_measured(measured)
    }
}

/// Text blocks appear top to bottom, allowing side-by-side layouts to step
/// back up by `backtrack`
pub fn content_flow(check: &str, blocks: &[TextBlock], backtrack: f64) -> Assertion {
    let violations: Vec<String> = blocks
        .windows(2)
        .filter(|w| w[1].y < w[0].y - backtrack)
        .map(|w| format!("{} \"{}\" at {:.0} above {} at {:.0}", w[1].tag, w[1].text, w[1].y, w[0].tag, w[0].y))
        .collect();
    if violations.is_empty() {
        Assertion::pass(check, format!("{} blocks flow downwards", blocks.len()))
    } else {
        Assertion::fail(check, violations.join("; "))
    }
}

/// Missing alt text is a warning. `alt=""` marks a decorative image and is fine.
pub fn image_alt_text(check: &str, images: &[ImageInfo]) -> Assertion {
    if images.is_empty() {
        return Assertion::skip(check, "no images");
    }
    let missing: Vec<&str> = images
        .iter()
        .filter(|i| i.alt.is_none())
        .filter(|i| !i.src.as_deref().unwrap_or("").contains("decorative"))
        .map(|i| i.src.as_deref().unwrap_or("<no src>"))
        .collect();
    for src in &missing {
        warn!("Image missing alt text: {}", src);
    }
    if missing.is_empty() {
        Assertion::pass(check, format!("{} images have alt text", images.len()))
    } else {
        Assertion::warn(check, format!("images missing alt text: {}", missing.join(", ")))
    }
}

pub fn performance(check: &str, metrics: &PerformanceMetrics, tolerances: &Tolerances) -> Assertion {
    let mut problems = Vec::new();
    if metrics.load_time_ms >= tolerances.load_event_ms {
        problems.push(format!(
            "load event at {:.0}ms, limit {}ms",
            metrics.load_time_ms, tolerances.load_event_ms
        ));
    }
    if metrics.first_contentful_paint_ms >= tolerances.first_contentful_paint_ms {
        problems.push(format!(
            "first contentful paint at {:.0}ms, limit {}ms",
            metrics.first_contentful_paint_ms, tolerances.first_contentful_paint_ms
        ));
    }
    let measured = json!(metrics);
    if problems.is_empty() {
        Assertion::pass(
            check,
            format!(
                "load {:.0}ms, FCP {:.0}ms",
                metrics.load_time_ms, metrics.first_contentful_paint_ms
            ),
        )
        .with_measured(measured)
    } else {
        Assertion::fail(check, problems.join("; ")).with_measured(measured)
    }
}

/// Usability heuristics scored by the checker. Only some can be detected from
/// markup; the rest stay false and still count towards the total.
pub const HEURISTICS: [&str; 8] = [
    "visibility_of_system_status",
    "user_control_and_freedom",
    "consistency_and_standards",
    "error_prevention",
    "recognition_rather_than_recall",
    "flexibility_and_efficiency",
    "aesthetic_and_minimalist_design",
    "help_and_documentation",
];

/// Informational score, always passes
pub fn ux_heuristics(check: &str, flags: &HeuristicFlags) -> Assertion {
    let passed = HEURISTICS
        .iter()
        .filter(|h| flags.get(**h).copied().unwrap_or(false))
        .count();
    let score = passed as f64 / HEURISTICS.len() as f64 * 100.0;
    Assertion::pass(
        check,
        format!("UX heuristics score {:.1}% ({}/{})", score, passed, HEURISTICS.len()),
    )
    .with_measured(json!({ "flags": flags, "score": score }))
}

/// The landing page must expose more than two funnel stages
pub fn conversion_path(check: &str, reached: &[String]) -> Assertion {
    let measured = json!(reached);
    if reached.len() > 2 {
        Assertion::pass(check, format!("{} stages: {}", reached.len(), reached.join(" → ")))
            .with_measured(measured)
    } else {
        Assertion::fail(
            check,
            format!("only {} funnel stages visible: {}", reached.len(), reached.join(", ")),
        )
        .with_measured(measured)
    }
}

pub fn content_mentions(check: &str, pattern: &str, count: usize, min: usize) -> Assertion {
    if count >= min {
        Assertion::pass(check, format!("{} elements match /{}/i", count, pattern))
    } else {
        Assertion::fail(check, format!("{} elements match /{}/i, expected at least {}", count, pattern, min))
    }
}
