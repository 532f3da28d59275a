//! Empirical thresholds used by the layout and visual checks
//!
//! None of these are derived; they were tuned against real renders and are
//! kept configurable.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tolerances {
    /// Minimum width and height of a touch target on mobile
    pub touch_target_px: f64,

    /// Allowed deviation of a section gap from the mean gap
    pub section_spacing_px: f64,

    /// Largest allowed height ratio between two balanced columns
    pub column_height_ratio: f64,

    pub column_min_height_px: f64,

    pub hero_min_height_px: f64,

    /// Headings must render strictly larger than this
    pub heading_min_font_px: f64,

    /// Body may exceed the viewport width by this much before it counts as overflow
    pub body_overflow_px: f64,

    /// How far a later text block may sit above an earlier one
    pub content_flow_backtrack_px: f64,

    pub first_cta_visible_ms: u64,

    pub hero_visible_ms: u64,

    pub load_event_ms: f64,

    pub first_contentful_paint_ms: f64,

    /// Percentage of differing pixels tolerated for layout screenshots
    pub visual_threshold_percent: f64,

    /// Percentage tolerated for hero and header crops
    pub strict_visual_threshold_percent: f64,

    /// Per-channel difference below which two pixels count as equal
    pub pixel_channel_tolerance: u8,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            touch_target_px: 44.0,
            section_spacing_px: 65.0,
            column_height_ratio: 2.5,
            column_min_height_px: 100.0,
            hero_min_height_px: 40.0,
            heading_min_font_px: 17.0,
            body_overflow_px: 20.0,
            content_flow_backtrack_px: 150.0,
            first_cta_visible_ms: 2000,
            hero_visible_ms: 3000,
            load_event_ms: 3000.0,
            first_contentful_paint_ms: 3000.0,
            visual_threshold_percent: 20.0,
            strict_visual_threshold_percent: 10.0,
            pixel_channel_tolerance: 5,
        }
    }
}

impl Tolerances {
    /// Describe every out-of-range value
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        for (name, value) in [
            ("visual_threshold_percent", self.visual_threshold_percent),
            ("strict_visual_threshold_percent", self.strict_visual_threshold_percent),
        ] {
            if !(0.0..=100.0).contains(&value) {
                problems.push(format!("{} must be within 0..=100, got {}", name, value));
            }
        }

        if self.column_height_ratio < 1.0 {
            problems.push(format!(
                "column_height_ratio must be at least 1.0, got {}",
                self.column_height_ratio
            ));
        }

        for (name, value) in [
            ("touch_target_px", self.touch_target_px),
            ("section_spacing_px", self.section_spacing_px),
            ("column_min_height_px", self.column_min_height_px),
            ("hero_min_height_px", self.hero_min_height_px),
            ("body_overflow_px", self.body_overflow_px),
            ("content_flow_backtrack_px", self.content_flow_backtrack_px),
        ] {
            if value < 0.0 {
                problems.push(format!("{} must not be negative, got {}", name, value));
            }
        }

        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(Tolerances::default().problems().is_empty());
    }

    #[test]
    fn test_out_of_range_values_reported() {
        let t = Tolerances {
            visual_threshold_percent: 120.0,
            column_height_ratio: 0.5,
            section_spacing_px: -1.0,
            ..Default::default()
        };
        let problems = t.problems();
        assert_eq!(problems.len(), 3);
        assert!(problems[0].contains("visual_threshold_percent"));
    }
}
