use crate::session::SessionError;
use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use std::fmt;

/// A browser and platform combination we can impersonate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowserFamily {
    ChromeWindows,
    ChromeMac,
    FirefoxWindows,
    SafariMac,
    Edge,
    ChromeAndroid,
}

/// Share of new sessions given to each family
///
/// Mobile Chrome has a user agent pool but is never picked by default.
const FAMILY_WEIGHTS: [(BrowserFamily, f64); 5] = [
    (BrowserFamily::ChromeWindows, 0.50),
    (BrowserFamily::ChromeMac, 0.15),
    (BrowserFamily::FirefoxWindows, 0.15),
    (BrowserFamily::SafariMac, 0.10),
    (BrowserFamily::Edge, 0.10),
];

const CHROME_WINDOWS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
];

const CHROME_MAC: &[&str] = &[
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
];

const FIREFOX_WINDOWS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:122.0) Gecko/20100101 Firefox/122.0",
];

const SAFARI_MAC: &[&str] = &[
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
];

const EDGE: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
];

const CHROME_ANDROID: &[&str] = &[
    "Mozilla/5.0 (Linux; Android 13; SM-S908B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Mobile Safari/537.36",
];

impl BrowserFamily {
    /// Real user agents of this family
    pub fn user_agents(&self) -> &'static [&'static str] {
        match self {
            Self::ChromeWindows => CHROME_WINDOWS,
            Self::ChromeMac => CHROME_MAC,
            Self::FirefoxWindows => FIREFOX_WINDOWS,
            Self::SafariMac => SAFARI_MAC,
            Self::Edge => EDGE,
            Self::ChromeAndroid => CHROME_ANDROID,
        }
    }

    /// Picks a family using the default weighting
    pub fn pick<R: Rng + ?Sized>(rng: &mut R) -> Self {
        match WeightedIndex::new(FAMILY_WEIGHTS.iter().map(|(_, w)| *w)) {
            Ok(dist) => FAMILY_WEIGHTS[dist.sample(rng)].0,
            Err(_) => Self::ChromeWindows,
        }
    }

    /// Picks one user agent of this family
    pub fn pick_user_agent<R: Rng + ?Sized>(&self, rng: &mut R) -> &'static str {
        self.user_agents()
            .choose(rng)
            .copied()
            .unwrap_or(CHROME_WINDOWS[0])
    }

    /// Whether this family sends Chromium client hints
    fn is_chromium(&self) -> bool {
        matches!(
            self,
            Self::ChromeWindows | Self::ChromeMac | Self::Edge | Self::ChromeAndroid
        )
    }

    fn platform(&self) -> &'static str {
        match self {
            Self::ChromeMac | Self::SafariMac => "\"macOS\"",
            Self::ChromeAndroid => "\"Android\"",
            _ => "\"Windows\"",
        }
    }
}

impl fmt::Display for BrowserFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ChromeWindows => "chrome_windows",
            Self::ChromeMac => "chrome_mac",
            Self::FirefoxWindows => "firefox_windows",
            Self::SafariMac => "safari_mac",
            Self::Edge => "edge",
            Self::ChromeAndroid => "chrome_android",
        };
        write!(f, "{}", s)
    }
}

/// Major version from a `Chrome/NNN.x` user agent, "120" when absent
pub fn chrome_major_version(user_agent: &str) -> &str {
    user_agent
        .split_once("Chrome/")
        .and_then(|(_, rest)| rest.split('.').next())
        .filter(|v| !v.is_empty() && v.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or("120")
}

/// The header set a browser of `family` sends with a top-level navigation
///
/// `Accept-Encoding` and `Connection` are left to the HTTP client, which
/// negotiates the encodings it can decode and manages connection reuse.
pub fn browser_headers(
    family: BrowserFamily,
    user_agent: &str,
    referer: Option<&str>,
) -> Result<HeaderMap, SessionError> {
    let fetch_site = if referer.is_some() { "same-origin" } else { "none" };
    let mut pairs: Vec<(&'static str, String)> = vec![("user-agent", user_agent.to_string())];

    if family.is_chromium() {
        let version = chrome_major_version(user_agent);
        let mobile = if family == BrowserFamily::ChromeAndroid { "?1" } else { "?0" };
        pairs.extend([
            ("accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8".to_string()),
            ("accept-language", "bg-BG,bg;q=0.9,en-US;q=0.8,en;q=0.7".to_string()),
            ("sec-ch-ua", format!("\"Not_A Brand\";v=\"8\", \"Chromium\";v=\"{0}\", \"Google Chrome\";v=\"{0}\"", version)),
            ("sec-ch-ua-mobile", mobile.to_string()),
            ("sec-ch-ua-platform", family.platform().to_string()),
            ("sec-fetch-dest", "document".to_string()),
            ("sec-fetch-mode", "navigate".to_string()),
            ("sec-fetch-site", fetch_site.to_string()),
            ("sec-fetch-user", "?1".to_string()),
            ("upgrade-insecure-requests", "1".to_string()),
            ("cache-control", "max-age=0".to_string()),
        ]);
    } else if family == BrowserFamily::FirefoxWindows {
        pairs.extend([
            ("accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8".to_string()),
            ("accept-language", "bg,en-US;q=0.7,en;q=0.3".to_string()),
            ("upgrade-insecure-requests", "1".to_string()),
            ("sec-fetch-dest", "document".to_string()),
            ("sec-fetch-mode", "navigate".to_string()),
            ("sec-fetch-site", fetch_site.to_string()),
            ("sec-fetch-user", "?1".to_string()),
        ]);
    } else {
        pairs.extend([
            ("accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string()),
            ("accept-language", "bg-BG,bg;q=0.9".to_string()),
        ]);
    }

    if let Some(referer) = referer {
        pairs.push(("referer", referer.to_string()));
    }

    let mut headers = HeaderMap::with_capacity(pairs.len());
    for (name, value) in pairs {
        let header_value = HeaderValue::from_str(&value)
            .map_err(|_| SessionError::InvalidHeader { name, value: value.clone() })?;
        headers.insert(HeaderName::from_static(name), header_value);
    }
    Ok(headers)
}
