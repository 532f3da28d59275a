//! Declarative YAML check suites

use railguide_common::Viewport;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::{E2eError, E2eResult};

/// A check suite parsed from YAML: one page, the viewports it is checked at,
/// optional setup actions and the checks themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckSuite {
    /// Unique name, used for artifact naming
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Tags for filtering suites
    #[serde(default)]
    pub tags: Vec<String>,

    /// URL path relative to the site base URL
    #[serde(default = "default_page")]
    pub page: String,

    /// Each viewport becomes an independent check case
    #[serde(default = "default_viewports")]
    pub viewports: Vec<Viewport>,

    /// Overrides the configured settle delay
    #[serde(default)]
    pub settle_ms: Option<u64>,

    /// Run in order after the page settles, before any check
    #[serde(default)]
    pub actions: Vec<Action>,

    pub checks: Vec<Check>,

    /// Visual diff threshold in percent for every screenshot in this suite
    #[serde(default)]
    pub visual_threshold: Option<f64>,
}

fn default_page() -> String {
    "/".to_string()
}

fn default_viewports() -> Vec<Viewport> {
    vec![Viewport::default()]
}

/// Setup interaction performed before measuring
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Click an element. Optional clicks are skipped when the element is hidden.
    Click {
        selector: String,
        #[serde(default)]
        optional: bool,
    },

    Hover {
        selector: String,
    },

    Scroll {
        #[serde(default)]
        to: ScrollTarget,
    },

    /// Wait for a fixed amount of time (use sparingly)
    Sleep {
        ms: u64,
    },

    Wait {
        selector: String,
        #[serde(default = "default_wait_timeout")]
        timeout_ms: u64,
        #[serde(default)]
        state: WaitState,
    },

    /// Register a script run before any page script on the next navigation
    InitScript {
        script: String,
    },

    /// Reload and settle again
    Reload,
}

fn default_wait_timeout() -> u64 {
    5000
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollTarget {
    /// One screenful down
    #[default]
    ViewportHeight,
    Bottom,
    Top,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    #[default]
    Visible,
    Hidden,
    Attached,
    Detached,
}

impl WaitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitState::Visible => "visible",
            WaitState::Hidden => "hidden",
            WaitState::Attached => "attached",
            WaitState::Detached => "detached",
        }
    }
}

/// Visual state an interactive element is captured in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionState {
    Normal,
    Hover,
    Focus,
}

impl InteractionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionState::Normal => "normal",
            InteractionState::Hover => "hover",
            InteractionState::Focus => "focus",
        }
    }
}

/// Screenshot clip rectangle. Missing width/height take the viewport's.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Clip {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
}

impl Clip {
    /// Concrete rectangle, never wider than the viewport
    pub fn resolve(&self, viewport: &Viewport) -> (f64, f64, f64, f64) {
        let vw = viewport.width as f64;
        let width = self.width.unwrap_or(vw).min(vw - self.x).max(1.0);
        let height = self.height.unwrap_or(viewport.height as f64).max(1.0);
        (self.x, self.y, width, height)
    }
}

/// A single verification, named by what it asserts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum Check {
    /// Container has a bounded max-width and equal horizontal margins
    CenteredContainer {
        #[serde(default = "default_container")]
        selector: String,
        #[serde(default = "default_true")]
        require_padding_on_narrow: bool,
        #[serde(default = "default_true")]
        max_width_within_viewport: bool,
    },

    /// Body is not wider than the viewport
    NoHorizontalOverflow,

    /// First heading in the content scope is an h1
    HeadingHierarchy,

    /// Every contract landmark is visible
    Landmarks,

    /// Partner links on mobile are at least the minimum touch size (warning only)
    TouchTargets,

    /// Partner links exist, carry the referral code and are rendered
    ReferralLinks {
        #[serde(default)]
        selector: Option<String>,
        #[serde(default)]
        limit: Option<usize>,
    },

    /// A CTA becomes visible within the configured time
    CtaVisibility,

    /// Vertical gaps between sections are consistent
    SectionSpacing {
        #[serde(default)]
        selector: Option<String>,
    },

    /// Two side-by-side columns have comparable heights
    ColumnBalance {
        #[serde(default)]
        container: Option<String>,
        left: String,
        right: String,
    },

    /// The first h1 is rendered prominently
    HeroProminence,

    /// Main hero heading is visible within the configured load time
    HeroLoadTime,

    /// Headings render above the minimum font size
    Typography {
        #[serde(default)]
        selector: Option<String>,
    },

    /// Text blocks flow top to bottom
    ContentFlow {
        #[serde(default)]
        selector: Option<String>,
    },

    /// Images carry alt text (warning only)
    ImageAltText,

    /// Capture a screenshot and compare it against its baseline
    Screenshot {
        name: String,
        #[serde(default)]
        full_page: bool,
        #[serde(default)]
        clip: Option<Clip>,
        #[serde(default)]
        selector: Option<String>,
        #[serde(default)]
        threshold: Option<f64>,
    },

    /// Toggling the theme changes the page; both states match their baselines
    ThemeToggle {
        #[serde(default)]
        clip: Option<Clip>,
        #[serde(default)]
        threshold: Option<f64>,
        #[serde(default = "default_transition_ms")]
        transition_ms: u64,
    },

    /// The first visible interactive elements match their baselines in
    /// each state
    InteractionStates {
        #[serde(default = "default_interactive")]
        selector: String,
        #[serde(default = "default_interactive_limit")]
        limit: usize,
        #[serde(default = "default_interaction_states")]
        states: Vec<InteractionState>,
        #[serde(default)]
        threshold: Option<f64>,
    },

    /// Navigation timing stays under the configured limits
    Performance,

    /// Scores presence of common usability affordances (informational)
    UxHeuristics,

    /// Hero, value proposition, social proof, FAQ and final CTA are reachable
    ConversionPath,

    /// Page text matches a case-insensitive pattern at least `min` times
    ContentMentions {
        pattern: String,
        #[serde(default = "default_min_mentions")]
        min: usize,
    },
}

fn default_container() -> String {
    "main".to_string()
}

fn default_true() -> bool {
    true
}

fn default_min_mentions() -> usize {
    1
}

fn default_transition_ms() -> u64 {
    1000
}

fn default_interactive() -> String {
    r#"button, a, [role="button"]"#.to_string()
}

fn default_interactive_limit() -> usize {
    5
}

fn default_interaction_states() -> Vec<InteractionState> {
    vec![
        InteractionState::Normal,
        InteractionState::Hover,
        InteractionState::Focus,
    ]
}

impl Check {
    /// Stable name used in reports and artifact names
    pub fn name(&self) -> String {
        match self {
            Check::CenteredContainer { selector, .. } => format!("centered:{}", selector),
            Check::NoHorizontalOverflow => "no-horizontal-overflow".to_string(),
            Check::HeadingHierarchy => "heading-hierarchy".to_string(),
            Check::Landmarks => "landmarks".to_string(),
            Check::TouchTargets => "touch-targets".to_string(),
            Check::ReferralLinks { .. } => "referral-links".to_string(),
            Check::CtaVisibility => "cta-visibility".to_string(),
            Check::SectionSpacing { .. } => "section-spacing".to_string(),
            Check::ColumnBalance { .. } => "column-balance".to_string(),
            Check::HeroProminence => "hero-prominence".to_string(),
            Check::HeroLoadTime => "hero-load-time".to_string(),
            Check::Typography { .. } => "typography".to_string(),
            Check::ContentFlow { .. } => "content-flow".to_string(),
            Check::ImageAltText => "image-alt-text".to_string(),
            Check::Screenshot { name, .. } => format!("screenshot:{}", name),
            Check::ThemeToggle { .. } => "theme-toggle".to_string(),
            Check::InteractionStates { .. } => "interaction-states".to_string(),
            Check::Performance => "performance".to_string(),
            Check::UxHeuristics => "ux-heuristics".to_string(),
            Check::ConversionPath => "conversion-path".to_string(),
            Check::ContentMentions { pattern, .. } => format!("mentions:{}", pattern),
        }
    }
}

/// One suite at one viewport: the unit of isolation and of reporting
#[derive(Debug, Clone)]
pub struct CheckCase {
    pub suite: CheckSuite,
    pub viewport: Viewport,
}

impl CheckCase {
    pub fn id(&self) -> String {
        format!("{}@{}", self.suite.name, self.viewport.label)
    }

    /// Artifact file stem for a screenshot taken in this case
    pub fn artifact_name(&self, shot: &str) -> String {
        format!("{}-{}-{}", self.suite.name, shot, self.viewport.artifact_suffix())
    }
}

impl CheckSuite {
    /// Parse a check suite from YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let suite: CheckSuite = serde_yaml::from_str(yaml)?;
        suite.validate()?;
        Ok(suite)
    }

    /// Parse a check suite from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| E2eError::SuiteParse(format!("{}: {}", path.display(), e)))
    }

    /// Load all suites from a directory, ordered by file path
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut suites = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            suites.push(Self::from_file(entry.path())?);
        }

        let mut seen = HashSet::new();
        for suite in &suites {
            if !seen.insert(suite.name.as_str()) {
                return Err(E2eError::SuiteParse(format!(
                    "duplicate suite name '{}'",
                    suite.name
                )));
            }
        }

        Ok(suites)
    }

    /// Filter suites by tag
    pub fn filter_by_tag<'a>(suites: &'a [Self], tag: &str) -> Vec<&'a Self> {
        suites.iter().filter(|s| s.tags.iter().any(|t| t == tag)).collect()
    }

    /// Expand into one case per viewport
    pub fn cases(&self) -> Vec<CheckCase> {
        self.viewports
            .iter()
            .map(|viewport| CheckCase {
                suite: self.clone(),
                viewport: viewport.clone(),
            })
            .collect()
    }

    fn validate(&self) -> E2eResult<()> {
        if self.name.trim().is_empty() {
            return Err(E2eError::SuiteParse("suite name must not be empty".to_string()));
        }
        if !self.page.starts_with('/') {
            return Err(E2eError::SuiteParse(format!(
                "{}: page must be a path starting with '/', got '{}'",
                self.name, self.page
            )));
        }
        if self.viewports.is_empty() {
            return Err(E2eError::SuiteParse(format!("{}: no viewports", self.name)));
        }
        if self.checks.is_empty() {
            return Err(E2eError::SuiteParse(format!("{}: no checks", self.name)));
        }
        let mut shots = HashSet::new();
        let mut interaction_checks = 0;
        for check in &self.checks {
            match check {
                Check::Screenshot { name, .. } => {
                    if !shots.insert(name.as_str()) {
                        return Err(E2eError::SuiteParse(format!(
                            "{}: duplicate screenshot name '{}'",
                            self.name, name
                        )));
                    }
                }
                Check::InteractionStates { limit, states, .. } => {
                    interaction_checks += 1;
                    if *limit == 0 || states.is_empty() {
                        return Err(E2eError::SuiteParse(format!(
                            "{}: interaction_states needs a limit and at least one state",
                            self.name
                        )));
                    }
                }
                _ => {}
            }
        }
        // Their screenshots share the `interactive-` names
        if interaction_checks > 1 {
            return Err(E2eError::SuiteParse(format!(
                "{}: at most one interaction_states check per suite",
                self.name
            )));
        }
        Ok(())
    }
}
