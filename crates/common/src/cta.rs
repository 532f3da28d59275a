//! Call-to-action records read from a live page

use serde::{Deserialize, Serialize};

use crate::contract::SiteContract;
use crate::geometry::BoundingBox;
use crate::viewport::Viewport;

/// One interactive CTA element as queried from the DOM.
///
/// Has no identity beyond its position in document order at the time it was
/// read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CtaRecord {
    pub index: usize,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default)]
    pub visible: bool,
    #[serde(default)]
    pub bounding_box: Option<BoundingBox>,
    #[serde(default)]
    pub classes: Option<String>,
    #[serde(default)]
    pub aria_label: Option<String>,
}

impl CtaRecord {
    pub fn has_referral_code(&self, contract: &SiteContract) -> bool {
        let token = contract.referral_token();
        self.href.as_deref().map(|h| h.contains(&token)).unwrap_or(false)
    }

    pub fn points_to_partner(&self, contract: &SiteContract) -> bool {
        self.href
            .as_deref()
            .map(|h| h.contains(&contract.partner_host))
            .unwrap_or(false)
    }

    /// Unmeasured elements never count as adequate
    pub fn touch_target_adequate(&self, min: f64) -> bool {
        self.bounding_box
            .map(|b| b.meets_touch_target(min))
            .unwrap_or(false)
    }

    /// The header logo may legitimately be hidden on collapsed layouts
    pub fn is_header_logo(&self, contract: &SiteContract) -> bool {
        self.aria_label
            .as_deref()
            .map(|l| l.contains(&contract.header_logo_label))
            .unwrap_or(false)
    }

    /// Top edge lies inside the first screenful
    pub fn in_viewport(&self, viewport: &Viewport) -> bool {
        self.bounding_box
            .map(|b| b.y >= 0.0 && b.y <= viewport.height as f64)
            .unwrap_or(false)
    }

    pub fn is_rendered(&self) -> bool {
        self.bounding_box.map(|b| b.is_rendered()).unwrap_or(false)
    }

    /// Short label for log lines
    pub fn describe(&self) -> String {
        let text = self.text.trim();
        let text: String = text.chars().take(30).collect();
        match &self.bounding_box {
            Some(b) => format!("#{} \"{}\" {:.0}x{:.0}", self.index, text, b.width, b.height),
            None => format!("#{} \"{}\" (no box)", self.index, text),
        }
    }
}
