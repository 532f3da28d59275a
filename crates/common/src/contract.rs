//! The site contract the checks consume
//!
//! Semantic landmarks, heading scope, theme control and the referral query
//! parameter carried by every outbound partner link. Adjusting any of these is
//! a configuration change.

use serde::{Deserialize, Serialize};

/// Landmark that must be present and visible on every page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Landmark {
    pub name: String,
    pub selector: String,
}

impl Landmark {
    pub fn new(name: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            selector: selector.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteContract {
    /// Host of the promoted platform
    pub partner_host: String,

    /// Query parameter carrying the referral code
    pub referral_param: String,

    pub referral_code: String,

    /// Used when no partner link becomes visible (collapsed mobile header)
    pub cta_fallback_selector: String,

    /// aria-label fragment identifying the header logo link
    pub header_logo_label: String,

    pub landmarks: Vec<Landmark>,

    pub theme_toggle_selector: String,

    /// Scope in which heading hierarchy is evaluated
    pub content_scope: String,

    pub section_selector: String,

    pub hero_selector: String,
}

impl Default for SiteContract {
    fn default() -> Self {
        Self {
            partner_host: "railway.com".to_string(),
            referral_param: "referralCode".to_string(),
            referral_code: "RRANX".to_string(),
            cta_fallback_selector: ".btn-primary".to_string(),
            header_logo_label: "Railway Platform".to_string(),
            landmarks: vec![
                Landmark::new("header", "header"),
                Landmark::new("main", "main"),
                Landmark::new("footer", "footer"),
                Landmark::new("nav", "nav"),
            ],
            theme_toggle_selector:
                r#"[class*="theme"], [id*="theme"], button[aria-label*="theme"]"#.to_string(),
            content_scope: "main".to_string(),
            section_selector: "section".to_string(),
            hero_selector: r#"[class*="hero"], .hero, h1"#.to_string(),
        }
    }
}

impl SiteContract {
    /// `param=code` token expected in every referral href
    pub fn referral_token(&self) -> String {
        format!("{}={}", self.referral_param, self.referral_code)
    }

    pub fn referral_link(&self) -> String {
        format!("https://{}?{}", self.partner_host, self.referral_token())
    }

    pub fn referral_selector(&self) -> String {
        format!(r#"a[href*="{}"]"#, self.referral_token())
    }

    pub fn partner_link_selector(&self) -> String {
        format!(r#"a[href*="{}"]"#, self.partner_host)
    }

    /// Headings inside the content scope, in document order
    pub fn heading_selector(&self) -> String {
        (1..=6)
            .map(|level| format!("{} h{}", self.content_scope, level))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_referral_link() {
        let contract = SiteContract::default();
        assert_eq!(contract.referral_link(), "https://railway.com?referralCode=RRANX");
        assert_eq!(contract.referral_selector(), r#"a[href*="referralCode=RRANX"]"#);
        assert_eq!(contract.partner_link_selector(), r#"a[href*="railway.com"]"#);
    }

    #[test]
    fn test_heading_selector_scoped() {
        let contract = SiteContract {
            content_scope: "article".to_string(),
            ..Default::default()
        };
        let sel = contract.heading_selector();
        assert!(sel.starts_with("article h1, article h2"));
        assert!(sel.ends_with("article h6"));
    }
}
