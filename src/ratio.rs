use crate::catalog::Catalog;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Whether the User-Agent may influence the target ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UaTrustMode {
    #[default]
    Auto,
    Always,
    Never,
}

impl UaTrustMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            UaTrustMode::Auto => "auto",
            UaTrustMode::Always => "always",
            UaTrustMode::Never => "never",
        }
    }
}

impl FromStr for UaTrustMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(UaTrustMode::Auto),
            "always" => Ok(UaTrustMode::Always),
            "never" => Ok(UaTrustMode::Never),
            other => Err(format!("unknown UA trust mode: {other}")),
        }
    }
}

impl fmt::Display for UaTrustMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Mobile,
    Tablet,
    Desktop,
    Unknown,
}

/// Which resolution rule produced the target ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RatioSource {
    WidthHeight,
    Aspect,
    UaMobile,
    UaDesktop,
    DesktopFallback,
    AllFallback,
    None,
}

impl RatioSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RatioSource::WidthHeight => "width_height",
            RatioSource::Aspect => "aspect",
            RatioSource::UaMobile => "ua_mobile",
            RatioSource::UaDesktop => "ua_desktop",
            RatioSource::DesktopFallback => "desktop_fallback",
            RatioSource::AllFallback => "all_fallback",
            RatioSource::None => "none",
        }
    }
}

/// Raw, unvalidated ratio hints from a request
#[derive(Debug, Clone, Default)]
pub struct RatioParams<'a> {
    pub width: Option<&'a str>,
    pub height: Option<&'a str>,
    pub aspect: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatioDecision {
    pub target: Option<f64>,
    pub source: RatioSource,
    pub device: DeviceClass,
}

/// Parse a finite, strictly positive number; anything else is absent
pub fn parse_positive_number(value: Option<&str>) -> Option<f64> {
    let n: f64 = value?.trim().parse().ok()?;
    (n.is_finite() && n > 0.0).then_some(n)
}

/// Parse `A:B` or a plain decimal into a positive ratio
pub fn parse_aspect(value: Option<&str>) -> Option<f64> {
    let s = value?.trim();
    if s.is_empty() {
        return None;
    }

    // Only the first two `:` fields count, so `16:9:1` reads as 16:9
    if s.contains(':') {
        let mut parts = s.split(':');
        let a = parse_positive_number(parts.next())?;
        let b = parse_positive_number(parts.next())?;
        let ratio = a / b;
        return ratio.is_finite().then_some(ratio);
    }

    parse_positive_number(Some(s))
}

pub fn classify_user_agent(user_agent: &str) -> DeviceClass {
    if user_agent.trim().is_empty() {
        return DeviceClass::Unknown;
    }
    let ua = user_agent.to_lowercase();

    // iPad UAs also carry "Mobile", so tablet tokens win
    if ua.contains("ipad") || ua.contains("tablet") {
        DeviceClass::Tablet
    } else if ua.contains("mobile") || ua.contains("android") || ua.contains("iphone") {
        DeviceClass::Mobile
    } else {
        DeviceClass::Desktop
    }
}

/// Pick a target ratio; first matching rule wins.
pub fn resolve_target_ratio(
    params: &RatioParams<'_>,
    user_agent: &str,
    catalog: &Catalog,
    trust: UaTrustMode,
) -> RatioDecision {
    let decided = |target: Option<f64>, source: RatioSource, device: DeviceClass| RatioDecision {
        target,
        source,
        device,
    };

    let width = parse_positive_number(params.width);
    let height = parse_positive_number(params.height);
    if let (Some(w), Some(h)) = (width, height) {
        return decided(Some(w / h), RatioSource::WidthHeight, DeviceClass::Unknown);
    }

    if let Some(aspect) = parse_aspect(params.aspect) {
        return decided(Some(aspect), RatioSource::Aspect, DeviceClass::Unknown);
    }

    let device = match trust {
        UaTrustMode::Never => DeviceClass::Unknown,
        UaTrustMode::Auto | UaTrustMode::Always => classify_user_agent(user_agent),
    };

    match (device, catalog.dominant_portrait_ratio(), catalog.dominant_landscape_ratio()) {
        (DeviceClass::Mobile, Some(portrait), _) => {
            return decided(Some(portrait), RatioSource::UaMobile, device);
        }
        (DeviceClass::Tablet | DeviceClass::Desktop, _, Some(landscape)) => {
            return decided(Some(landscape), RatioSource::UaDesktop, device);
        }
        _ => {}
    }

    if let Some(landscape) = catalog.dominant_landscape_ratio() {
        return decided(Some(landscape), RatioSource::DesktopFallback, device);
    }
    if let Some(all) = catalog.dominant_all_ratio() {
        return decided(Some(all), RatioSource::AllFallback, device);
    }

    decided(None, RatioSource::None, device)
}
