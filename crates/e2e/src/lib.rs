//! Railguide browser checks
//!
//! This crate verifies a running instance of the referral site from Rust:
//! - Attaches to the site or spawns it as a subprocess
//! - Drives Playwright through generated Node scripts
//! - Parses declarative YAML check suites
//! - Evaluates layout, accessibility and conversion checks against measured values
//! - Performs visual regression testing with baseline screenshots
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Check Runner (Rust)                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CheckRunner                                                │
//! │    ├── start_site() -> SiteServer                           │
//! │    ├── run_suites(suites) -> SuiteReport                    │
//! │    │     └── run_case(suite × viewport) -> CaseResult       │
//! │    │           ├── CaseChecker::probes() -> [Probe]         │
//! │    │           ├── PlaywrightHandle::run_script() -> stdout │
//! │    │           ├── ProbeOutput::parse(stdout)               │
//! │    │           └── CaseChecker::evaluate() -> [Assertion]   │
//! │    └── update_baselines()                                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CheckSuite (YAML)                                          │
//! │    ├── name, page, viewports, tags                          │
//! │    ├── actions: click | hover | scroll | wait | reload ...  │
//! │    └── checks: centered_container | referral_links |        │
//! │                screenshot | theme_toggle | ...              │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod checker;
pub mod error;
pub mod layout;
pub mod playwright;
pub mod probe;
pub mod runner;
pub mod server;
pub mod spec;
pub mod visual;

pub use checker::{CaseChecker, VisualDiffResult};
pub use error::{E2eError, E2eResult};
pub use layout::{Assertion, Status};
pub use runner::{CaseResult, CheckRunner, RunnerConfig, SuiteReport};
pub use spec::{Action, Check, CheckCase, CheckSuite, InteractionState};
