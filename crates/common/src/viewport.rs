//! Viewport descriptors used to parametrize checks

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

/// Widths below this are treated as mobile (touch) viewports
pub const MOBILE_MAX_WIDTH: u32 = 768;

/// Simulated rendering area for one check case
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub label: String,
}

const PRESETS: &[(&str, u32, u32)] = &[
    ("mobile-xs", 320, 568),
    ("mobile-s", 375, 812),
    ("mobile-l", 414, 896),
    ("mobile", 375, 667),
    ("tablet", 768, 1024),
    ("laptop", 1024, 768),
    ("desktop", 1280, 720),
    ("desktop-l", 1440, 900),
    ("desktop-xl", 1920, 1080),
];

impl Viewport {
    pub fn new(label: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            label: label.into(),
        }
    }

    /// All named breakpoints, narrowest first
    pub fn presets() -> Vec<Viewport> {
        PRESETS
            .iter()
            .map(|(label, w, h)| Viewport::new(*label, *w, *h))
            .collect()
    }

    /// Look up a named breakpoint
    pub fn preset(label: &str) -> Option<Viewport> {
        PRESETS
            .iter()
            .find(|(name, _, _)| *name == label)
            .map(|(name, w, h)| Viewport::new(*name, *w, *h))
    }

    pub fn try_preset(label: &str) -> Result<Viewport> {
        Self::preset(label).ok_or_else(|| Error::UnknownViewport(label.to_string()))
    }

    /// Touch-first viewport
    pub fn is_mobile(&self) -> bool {
        self.width < MOBILE_MAX_WIDTH
    }

    /// Viewport where the layout must apply responsive padding
    pub fn is_narrow(&self) -> bool {
        self.width <= MOBILE_MAX_WIDTH
    }

    pub fn artifact_suffix(&self) -> String {
        format!("{}-{}x{}", self.label, self.width, self.height)
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Viewport::new("desktop", 1280, 720)
    }
}

impl std::fmt::Display for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}x{})", self.label, self.width, self.height)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ViewportRepr {
    Preset(String),
    Explicit {
        width: u32,
        height: u32,
        #[serde(default)]
        label: Option<String>,
    },
}

impl<'de> Deserialize<'de> for Viewport {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match ViewportRepr::deserialize(deserializer)? {
            ViewportRepr::Preset(label) => {
                Viewport::preset(&label).ok_or_else(|| {
                    serde::de::Error::custom(format!("unknown viewport preset '{}'", label))
                })
            }
            ViewportRepr::Explicit { width, height, label } => {
                if width == 0 || height == 0 {
                    return Err(serde::de::Error::custom("viewport dimensions must be non-zero"));
                }
                let label = label.unwrap_or_else(|| format!("{}x{}", width, height));
                Ok(Viewport::new(label, width, height))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(320, true, true; "extra small phone")]
    #[test_case(375, true, true; "phone")]
    #[test_case(768, false, true; "tablet edge")]
    #[test_case(1280, false, false; "desktop")]
    fn test_breakpoint_classes(width: u32, mobile: bool, narrow: bool) {
        let vp = Viewport::new("vp", width, 800);
        assert_eq!(vp.is_mobile(), mobile);
        assert_eq!(vp.is_narrow(), narrow);
    }

    #[test]
    fn test_preset_lookup() {
        let vp = Viewport::preset("mobile-s").unwrap();
        assert_eq!((vp.width, vp.height), (375, 812));
        assert!(Viewport::preset("watch").is_none());
        assert!(matches!(
            Viewport::try_preset("watch"),
            Err(Error::UnknownViewport(_))
        ));
    }

    #[test]
    fn test_deserialize_preset_and_explicit() {
        let vps: Vec<Viewport> = serde_json::from_str(
            r#"["tablet", {"width": 500, "height": 900}, {"width": 600, "height": 800, "label": "odd"}]"#,
        )
        .unwrap();
        assert_eq!(vps[0], Viewport::new("tablet", 768, 1024));
        assert_eq!(vps[1].label, "500x900");
        assert_eq!(vps[2].label, "odd");
    }

    #[test]
    fn test_deserialize_rejects_zero_size() {
        let res: std::result::Result<Viewport, _> =
            serde_json::from_str(r#"{"width": 0, "height": 900}"#);
        assert!(res.is_err());
    }

    #[test]
    fn test_artifact_suffix() {
        assert_eq!(Viewport::default().artifact_suffix(), "desktop-1280x720");
    }
}
