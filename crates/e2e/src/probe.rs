//! Measurement probes
//!
//! A probe is one read-only query against the loaded page. Each probe is
//! rendered into a self-contained JS block that reports exactly one line on
//! stdout:
//!
//! ```text
//! __PROBE__ {"key":"3:referral-links","ok":true,"value":[...]}
//! __PROBE__ {"key":"4:landmarks","ok":false,"error":"Timeout 5000ms exceeded"}
//! ```
//!
//! A failing probe only fails the assertion that depends on it.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use tracing::debug;

use railguide_common::{BoundingBox, CtaRecord, Landmark, StyleSnapshot};

use crate::error::{E2eError, E2eResult};
use crate::spec::InteractionState;

pub const PROBE_MARKER: &str = "__PROBE__";

static PROBE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^__PROBE__ (.+)$").expect("static regex"));

/// Encode a Rust string as a JS string literal
pub fn js_str(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

fn js_path(path: &std::path::Path) -> String {
    js_str(&path.to_string_lossy())
}

/// Selector matching only the rendered elements of `selector`
fn visible_only(selector: &str) -> String {
    js_str(&format!("{} >> visible=true", selector))
}

/// Screenshot rectangle in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ClipRect {
    fn to_js(self) -> String {
        json!({ "x": self.x, "y": self.y, "width": self.width, "height": self.height }).to_string()
    }
}

/// One stage of the landing-to-conversion path
#[derive(Debug, Clone)]
pub struct PathStage {
    pub label: String,
    pub selector: String,
    /// Use the last match instead of the first
    pub last: bool,
    pub screenshot: PathBuf,
}

/// One state screenshot of an interactive element
#[derive(Debug, Clone)]
pub struct InteractionShot {
    pub state: InteractionState,
    pub path: PathBuf,
}

/// A measurement request
#[derive(Debug, Clone)]
pub enum Probe {
    ComputedStyle {
        selector: String,
        properties: Vec<String>,
    },
    FirstBox {
        selector: String,
    },
    Boxes {
        selector: String,
    },
    HeadingLevels {
        selector: String,
    },
    Links {
        selector: String,
        limit: Option<usize>,
    },
    /// Time from probe start until any match of the selector (or the
    /// fallback) is visible
    WaitVisible {
        selector: String,
        fallback: Option<String>,
        timeout_ms: u64,
    },
    /// Time from navigation start until the selector is visible. The wait
    /// starts while the page is still loading.
    VisibleAfterNavigation {
        selector: String,
        timeout_ms: u64,
    },
    Landmarks {
        landmarks: Vec<Landmark>,
    },
    Screenshot {
        path: PathBuf,
        full_page: bool,
        clip: Option<ClipRect>,
        selector: Option<String>,
    },
    ThemeToggle {
        selector: String,
        before: PathBuf,
        after: PathBuf,
        clip: Option<ClipRect>,
        transition_ms: u64,
    },
    Performance,
    TextBlocks {
        selector: String,
    },
    FontSizes {
        selector: String,
    },
    Images,
    TextMatches {
        pattern: String,
    },
    Heuristics {
        presence: Vec<(String, String)>,
    },
    ConversionPath {
        stages: Vec<PathStage>,
    },
    /// Element screenshots per state; `elements[i]` belongs to the i-th match
    InteractionStates {
        selector: String,
        elements: Vec<Vec<InteractionShot>>,
    },
}

impl Probe {
    /// Render the probe as an isolated JS block reporting under `key`
    pub fn to_js(&self, key: &str) -> String {
        format!(
            r#"
    try {{
      const value = await (async () => {{
{body}
      }})();
      emit({key}, true, value);
    }} catch (error) {{
      emit({key}, false, null, error.message);
    }}
"#,
            body = self.body(key),
            key = js_str(key),
        )
    }

    /// JS started right after navigation begins, before the page has loaded
    pub fn watch_js(&self, key: &str) -> Option<String> {
        match self {
            Probe::VisibleAfterNavigation { selector, timeout_ms } => Some(format!(
                r#"    watches[{key}] = page.locator({sel}).first()
      .waitFor({{ state: 'visible', timeout: {timeout_ms} }})
      .then(() => ({{ ok: true, at: Date.now() }}), error => ({{ ok: false, error }}));
"#,
                key = js_str(key),
                sel = js_str(selector),
            )),
            _ => None,
        }
    }

    fn body(&self, key: &str) -> String {
        match self {
            Probe::ComputedStyle { selector, properties } => format!(
                r#"        return await page.locator({sel}).first().evaluate((el, props) => {{
          const styles = window.getComputedStyle(el);
          const out = {{}};
          for (const p of props) out[p] = styles.getPropertyValue(p);
          return out;
        }}, {props});"#,
                sel = js_str(selector),
                props = json!(properties),
            ),
            Probe::FirstBox { selector } => format!(
                r#"        return await page.locator({sel}).first().boundingBox();"#,
                sel = js_str(selector),
            ),
            Probe::Boxes { selector } => format!(
                r#"        const boxes = [];
        for (const el of await page.locator({sel}).all()) {{
          const box = await el.boundingBox();
          if (box) boxes.push(box);
        }}
        return boxes;"#,
                sel = js_str(selector),
            ),
            Probe::HeadingLevels { selector } => format!(
                r#"        return await page.locator({sel}).evaluateAll(els =>
          els.map(el => parseInt(el.tagName.charAt(1), 10)));"#,
                sel = js_str(selector),
            ),
            Probe::Links { selector, limit } => format!(
                r#"        const links = page.locator({sel});
        const count = await links.count();
        const limit = {limit} ?? count;
        const records = [];
        for (let i = 0; i < Math.min(count, limit); i++) {{
          const link = links.nth(i);
          records.push({{
            index: i,
            text: ((await link.textContent()) || '').trim(),
            href: await link.getAttribute('href'),
            visible: await link.isVisible(),
            bounding_box: await link.boundingBox(),
            classes: await link.getAttribute('class'),
            aria_label: await link.getAttribute('aria-label'),
          }});
        }}
        return records;"#,
                sel = js_str(selector),
                limit = json!(limit),
            ),
            Probe::WaitVisible { selector, fallback, timeout_ms } => {
                let recover = match fallback {
                    Some(fb) => format!(
                        r#"viaFallback = true;
          await page.locator({fb}).first().waitFor({{ state: 'visible', timeout: {timeout_ms} }});"#,
                        fb = visible_only(fb),
                    ),
                    None => "throw error;".to_string(),
                };
                format!(
                    r#"        const start = Date.now();
        let viaFallback = false;
        try {{
          await page.locator({sel}).first().waitFor({{ state: 'visible', timeout: {timeout_ms} }});
        }} catch (error) {{
          {recover}
        }}
        return {{ elapsed_ms: Date.now() - start, via_fallback: viaFallback }};"#,
                    sel = visible_only(selector),
                )
            }
            Probe::VisibleAfterNavigation { .. } => format!(
                r#"        const seen = await watches[{key}];
        if (!seen.ok) throw seen.error;
        return {{ elapsed_ms: Math.max(0, seen.at - navStart), via_fallback: false }};"#,
                key = js_str(key),
            ),
            Probe::Landmarks { landmarks } => {
                let pairs: Vec<(&str, &str)> = landmarks
                    .iter()
                    .map(|l| (l.name.as_str(), l.selector.as_str()))
                    .collect();
                format!(
                    r#"        const found = [];
        for (const [name, sel] of {pairs}) {{
          found.push({{ name, visible: await page.locator(sel).first().isVisible() }});
        }}
        return found;"#,
                    pairs = json!(pairs),
                )
            }
            Probe::Screenshot { path, full_page, clip, selector } => match selector {
                Some(sel) => format!(
                    r#"        const target = page.locator({sel}).first();
        if (!(await target.isVisible())) return {{ path: {path}, captured: false }};
        await target.screenshot({{ path: {path}, animations: 'disabled' }});
        return {{ path: {path}, captured: true }};"#,
                    sel = js_str(sel),
                    path = js_path(path),
                ),
                None => {
                    let clip = clip
                        .map(|c| format!(", clip: {}", c.to_js()))
                        .unwrap_or_default();
                    format!(
                        r#"        await page.screenshot({{ path: {path}, fullPage: {full_page}{clip}, animations: 'disabled' }});
        return {{ path: {path}, captured: true }};"#,
                        path = js_path(path),
                    )
                }
            },
            Probe::ThemeToggle { selector, before, after, clip, transition_ms } => {
                let clip = clip
                    .map(|c| format!(", clip: {}", c.to_js()))
                    .unwrap_or_default();
                format!(
                    r#"        const toggle = page.locator({sel}).first();
        if (!(await toggle.isVisible())) return {{ toggle_found: false }};
        await page.screenshot({{ path: {before}{clip} }});
        await toggle.click();
        await page.waitForTimeout({transition_ms});
        await page.screenshot({{ path: {after}{clip} }});
        await toggle.click();
        await page.waitForTimeout({transition_ms});
        return {{ toggle_found: true }};"#,
                    sel = js_str(selector),
                    before = js_path(before),
                    after = js_path(after),
                )
            }
            Probe::Performance => r#"        return await page.evaluate(() => {
          const nav = performance.getEntriesByType('navigation')[0];
          const paint = name => performance.getEntriesByName(name)[0]?.startTime || 0;
          return {
            load_time_ms: nav ? nav.loadEventEnd : 0,
            dom_content_loaded_ms: nav ? nav.domContentLoadedEventEnd : 0,
            first_paint_ms: paint('first-paint'),
            first_contentful_paint_ms: paint('first-contentful-paint'),
          };
        });"#
                .to_string(),
            Probe::TextBlocks { selector } => format!(
                r#"        return await page.locator({sel}).evaluateAll(els => els
          .map(el => {{
            const r = el.getBoundingClientRect();
            return {{
              tag: el.tagName.toLowerCase(),
              y: r.top + window.scrollY,
              height: r.height,
              text: (el.textContent || '').trim().slice(0, 50),
            }};
          }})
          .filter(b => b.height > 0));"#,
                sel = js_str(selector),
            ),
            Probe::FontSizes { selector } => format!(
                r#"        return await page.locator({sel}).evaluateAll(els => els
          .filter(el => el.getClientRects().length > 0)
          .map(el => ({{
            tag: el.tagName.toLowerCase(),
            text: (el.textContent || '').trim().slice(0, 30),
            font_size_px: parseInt(window.getComputedStyle(el).fontSize, 10),
          }})));"#,
                sel = js_str(selector),
            ),
            Probe::Images => r#"        return await page.locator('img').evaluateAll(els =>
          els.map(el => ({ src: el.getAttribute('src'), alt: el.getAttribute('alt') })));"#
                .to_string(),
            Probe::TextMatches { pattern } => format!(
                r#"        return await page.getByText(new RegExp({pattern}, 'i')).count();"#,
                pattern = js_str(pattern),
            ),
            Probe::Heuristics { presence } => format!(
                r#"        const flags = {{}};
        for (const [name, sel] of {presence}) {{
          flags[name] = (await page.locator(sel).count()) > 0;
        }}
        const buttons = page.locator('button, .button, a[class*="btn"]');
        flags.consistency_and_standards = false;
        if ((await buttons.count()) > 1) {{
          const first = await buttons.first().getAttribute('class');
          const last = await buttons.last().getAttribute('class');
          flags.consistency_and_standards = !!(first && last && (first.includes('btn') || last.includes('btn')));
        }}
        return flags;"#,
                presence = json!(presence),
            ),
            Probe::ConversionPath { stages } => {
                let stages: Vec<Value> = stages
                    .iter()
                    .map(|s| {
                        json!([s.label, s.selector, s.last, s.screenshot.to_string_lossy()])
                    })
                    .collect();
                format!(
                    r#"        const reached = [];
        for (const [label, sel, last, shot] of {stages}) {{
          const loc = last ? page.locator(sel).last() : page.locator(sel).first();
          if (await loc.isVisible()) {{
            reached.push(label);
            await loc.scrollIntoViewIfNeeded();
            await loc.screenshot({{ path: shot }});
          }}
        }}
        return reached;"#,
                    stages = json!(stages),
                )
            }
            Probe::InteractionStates { selector, elements } => {
                let elements: Vec<Vec<Value>> = elements
                    .iter()
                    .map(|shots| {
                        shots
                            .iter()
                            .map(|s| json!([s.state.as_str(), s.path.to_string_lossy()]))
                            .collect()
                    })
                    .collect();
                format!(
                    r#"        const targets = page.locator({sel});
        const count = await targets.count();
        const captured = [];
        for (const [i, shots] of {elements}.entries()) {{
          if (i >= count) break;
          const el = targets.nth(i);
          if (!(await el.isVisible())) continue;
          await el.scrollIntoViewIfNeeded();
          for (const [state, path] of shots) {{
            await page.mouse.move(0, 0);
            await el.evaluate(e => e.blur && e.blur());
            if (state === 'hover') await el.hover();
            if (state === 'focus') await el.focus();
            await el.screenshot({{ path, animations: 'disabled' }});
          }}
          captured.push(i);
        }}
        await page.mouse.move(0, 0);
        return captured;"#,
                    sel = js_str(selector),
                    elements = json!(elements),
                )
            }
        }
    }
}

/// Elapsed time reported by a visibility probe
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Elapsed {
    pub elapsed_ms: f64,
    #[serde(default)]
    pub via_fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkPresence {
    pub name: String,
    pub visible: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Captured {
    pub path: PathBuf,
    pub captured: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThemeToggled {
    pub toggle_found: bool,
}

/// Navigation timing, milliseconds from navigation start
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub load_time_ms: f64,
    pub dom_content_loaded_ms: f64,
    pub first_paint_ms: f64,
    pub first_contentful_paint_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub tag: String,
    pub y: f64,
    #[serde(default)]
    pub height: f64,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadingFont {
    pub tag: String,
    #[serde(default)]
    pub text: String,
    pub font_size_px: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub src: Option<String>,
    pub alt: Option<String>,
}

pub type HeuristicFlags = BTreeMap<String, bool>;

/// One reported probe line
#[derive(Debug, Clone, Deserialize)]
struct ProbeLine {
    ok: bool,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    error: Option<String>,
}

/// Everything the probes of one script reported
#[derive(Debug, Default)]
pub struct ProbeOutput {
    lines: HashMap<String, ProbeLine>,
}

#[derive(Deserialize)]
struct KeyedLine {
    key: String,
    #[serde(flatten)]
    line: ProbeLine,
}

impl ProbeOutput {
    /// Extract probe lines from script stdout. Other console output is ignored.
    pub fn parse(stdout: &str) -> E2eResult<Self> {
        let mut lines = HashMap::new();
        for cap in PROBE_LINE.captures_iter(stdout) {
            let keyed: KeyedLine = serde_json::from_str(&cap[1])?;
            debug!("probe {} ok={}", keyed.key, keyed.line.ok);
            lines.insert(keyed.key, keyed.line);
        }
        Ok(Self { lines })
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Decode the value a probe reported
    pub fn decode<T: DeserializeOwned>(&self, key: &str) -> E2eResult<T> {
        let line = self
            .lines
            .get(key)
            .ok_or_else(|| E2eError::MissingProbe(key.to_string()))?;
        if !line.ok {
            return Err(E2eError::Probe {
                key: key.to_string(),
                reason: line.error.clone().unwrap_or_else(|| "unknown error".to_string()),
            });
        }
        serde_json::from_value(line.value.clone()).map_err(|e| E2eError::Probe {
            key: key.to_string(),
            reason: format!("unexpected value: {}", e),
        })
    }

    pub fn style(&self, key: &str) -> E2eResult<StyleSnapshot> {
        self.decode(key)
    }

    pub fn first_box(&self, key: &str) -> E2eResult<Option<BoundingBox>> {
        self.decode(key)
    }

    pub fn boxes(&self, key: &str) -> E2eResult<Vec<BoundingBox>> {
        self.decode(key)
    }

    pub fn levels(&self, key: &str) -> E2eResult<Vec<u8>> {
        self.decode(key)
    }

    pub fn ctas(&self, key: &str) -> E2eResult<Vec<CtaRecord>> {
        self.decode(key)
    }

    pub fn elapsed(&self, key: &str) -> E2eResult<Elapsed> {
        self.decode(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ignores_other_console_output() {
        let stdout = r#"
[TEST] starting
__PROBE__ {"key":"0:heading-hierarchy","ok":true,"value":[1,2,2,3]}
Found 3 links
__PROBE__ {"key":"1:landmarks","ok":false,"error":"Timeout 5000ms exceeded"}
"#;
        let out = ProbeOutput::parse(stdout).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out.levels("0:heading-hierarchy").unwrap(), vec![1, 2, 2, 3]);
        match out.decode::<Vec<LandmarkPresence>>("1:landmarks") {
            Err(E2eError::Probe { reason, .. }) => assert!(reason.contains("Timeout")),
            other => panic!("expected probe error, got {:?}", other),
        }
        assert!(matches!(
            out.levels("9:missing"),
            Err(E2eError::MissingProbe(_))
        ));
    }

    #[test]
    fn test_decode_cta_records() {
        let stdout = r#"__PROBE__ {"key":"k","ok":true,"value":[{"index":0,"text":"Deploy","href":"https://railway.com?referralCode=RRANX","visible":true,"bounding_box":{"x":16,"y":420,"width":180,"height":48},"classes":"btn btn-primary","aria_label":null}]}"#;
        let out = ProbeOutput::parse(stdout).unwrap();
        let ctas = out.ctas("k").unwrap();
        assert_eq!(ctas.len(), 1);
        assert_eq!(ctas[0].bounding_box.unwrap().height, 48.0);
        assert!(ctas[0].aria_label.is_none());
    }

    #[test]
    fn test_decode_null_box() {
        let out = ProbeOutput::parse(r#"__PROBE__ {"key":"b","ok":true,"value":null}"#).unwrap();
        assert_eq!(out.first_box("b").unwrap(), None);
    }

    #[test]
    fn test_wrong_shape_is_probe_error() {
        let out = ProbeOutput::parse(r#"__PROBE__ {"key":"s","ok":true,"value":[1,2]}"#).unwrap();
        assert!(matches!(out.style("s"), Err(E2eError::Probe { .. })));
    }

    #[test]
    fn test_selectors_are_json_escaped() {
        let probe = Probe::FirstBox {
            selector: r#"a[href*="referralCode=RRANX"]'); process.exit(0); ('"#.to_string(),
        };
        let js = probe.to_js("0:x");
        assert!(js.contains(r#"page.locator("a[href*=\"referralCode=RRANX\"]'); process.exit(0); ('")"#));
        assert!(js.contains(r#"emit("0:x", true, value)"#));
    }

    #[test]
    fn test_wait_visible_without_fallback_rethrows() {
        let probe = Probe::WaitVisible {
            selector: "a".to_string(),
            fallback: None,
            timeout_ms: 1000,
        };
        let js = probe.to_js("k");
        assert!(js.contains("throw error;"));
        assert!(js.contains("timeout: 1000"));

        let probe = Probe::WaitVisible {
            selector: "a".to_string(),
            fallback: Some(".btn-primary".to_string()),
            timeout_ms: 1000,
        };
        assert!(probe.to_js("k").contains(r#"page.locator(".btn-primary >> visible=true")"#));
    }

    #[test]
    fn test_wait_visible_skips_hidden_matches() {
        // A hidden mobile-menu copy of the CTA comes first in the DOM
        let probe = Probe::WaitVisible {
            selector: "nav a.cta, main a.cta".to_string(),
            fallback: None,
            timeout_ms: 2000,
        };
        let js = probe.to_js("k");
        assert!(js.contains(r#"page.locator("nav a.cta, main a.cta >> visible=true").first()"#));
    }

    #[test]
    fn test_visible_after_navigation_awaits_its_watch() {
        let probe = Probe::VisibleAfterNavigation {
            selector: "main h1".to_string(),
            timeout_ms: 3000,
        };
        let watch = probe.watch_js("2:hero-load-time").unwrap();
        assert!(watch.contains(r#"watches["2:hero-load-time"] = page.locator("main h1")"#));
        assert!(watch.contains("timeout: 3000"));

        let js = probe.to_js("2:hero-load-time");
        assert!(js.contains(r#"await watches["2:hero-load-time"]"#));
        assert!(js.contains("seen.at - navStart"));
        assert!(!js.contains("loadedAt"));

        assert!(Probe::Images.watch_js("k").is_none());
    }

    #[test]
    fn test_font_sizes_truncate_to_whole_pixels() {
        let js = Probe::FontSizes { selector: "h1".to_string() }.to_js("k");
        assert!(js.contains("parseInt(window.getComputedStyle(el).fontSize, 10)"));
        assert!(!js.contains("parseFloat"));
    }

    #[test]
    fn test_interaction_states_rendering() {
        let probe = Probe::InteractionStates {
            selector: "button".to_string(),
            elements: vec![vec![
                InteractionShot {
                    state: InteractionState::Normal,
                    path: PathBuf::from("/tmp/shots/b-0-normal.png"),
                },
                InteractionShot {
                    state: InteractionState::Focus,
                    path: PathBuf::from("/tmp/shots/b-0-focus.png"),
                },
            ]],
        };
        let js = probe.to_js("k");
        assert!(js.contains(r#"[[["normal","/tmp/shots/b-0-normal.png"],["focus","/tmp/shots/b-0-focus.png"]]]"#));
        assert!(js.contains("if (!(await el.isVisible())) continue;"));
        assert!(js.contains("await el.hover();"));
        assert!(js.contains("await el.focus();"));
        assert!(js.contains("return captured;"));
    }

    #[test]
    fn test_screenshot_clip_rendering() {
        let probe = Probe::Screenshot {
            path: PathBuf::from("/tmp/shots/home.png"),
            full_page: false,
            clip: Some(ClipRect { x: 0.0, y: 0.0, width: 375.0, height: 812.0 }),
            selector: None,
        };
        let js = probe.to_js("k");
        assert!(js.contains(r#"path: "/tmp/shots/home.png""#));
        assert!(js.contains("clip: {"));
        assert!(js.contains(r#""width":375.0"#));
        assert!(js.contains(r#""height":812.0"#));
        assert!(js.contains("fullPage: false"));
    }
}
