/// Bookmarked sites and the URL helpers around them
use crate::error::{LauncherError, LauncherResult};
use serde::{Deserialize, Serialize};
use url::Url;

/// How a site's icon is rendered in the list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IconType {
    #[default]
    Favicon,
    Emoji,
    None,
}

/// Where a site opens when clicked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OpenMode {
    #[default]
    Iframe,
    NewTab,
    NewWindow,
    PrivateTab,
    PrivateWindow,
}

impl OpenMode {
    pub fn as_str(self) -> &'static str {
        match self {
            OpenMode::Iframe => "iframe",
            OpenMode::NewTab => "newtab",
            OpenMode::NewWindow => "newwindow",
            OpenMode::PrivateTab => "privatetab",
            OpenMode::PrivateWindow => "privatewindow",
        }
    }

    /// Next mode in the row toggle's cycle
    pub fn next(self) -> Self {
        match self {
            OpenMode::Iframe => OpenMode::NewTab,
            OpenMode::NewTab => OpenMode::NewWindow,
            OpenMode::NewWindow => OpenMode::PrivateTab,
            OpenMode::PrivateTab => OpenMode::PrivateWindow,
            OpenMode::PrivateWindow => OpenMode::Iframe,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            OpenMode::Iframe => "Side panel",
            OpenMode::NewTab => "New tab",
            OpenMode::NewWindow => "New window",
            OpenMode::PrivateTab => "Private tab",
            OpenMode::PrivateWindow => "Private window",
        }
    }
}

/// A site in the launcher list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkedSite {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub icon_type: IconType,
    #[serde(default)]
    pub open_mode: OpenMode,
    #[serde(default)]
    pub position: i64,
}

impl BookmarkedSite {
    /// Icon source for the list row: the favicon service URL, the emoji itself, or nothing
    pub fn icon_source(&self) -> Option<String> {
        match self.icon_type {
            IconType::Favicon if !self.icon.is_empty() => Some(self.icon.clone()),
            IconType::Favicon => favicon_url(&self.url),
            IconType::Emoji if !self.icon.is_empty() => Some(self.icon.clone()),
            IconType::Emoji | IconType::None => None,
        }
    }

    /// Whether clicking the site should load it in the embedded view
    pub fn opens_in_frame(&self) -> bool {
        self.open_mode == OpenMode::Iframe && is_embeddable(&self.url)
    }
}

/// Turn user input into an absolute URL.
///
/// Input without a scheme gets `https://`:
/// - `example.com` → `https://example.com/`
/// - `localhost:3000/app` → `https://localhost:3000/app`
/// - `http://intranet` stays as typed (normalised by the parser)
pub fn normalize_site_url(input: &str) -> LauncherResult<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(LauncherError::InvalidUrl(input.to_string()));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let parsed = Url::parse(&candidate).map_err(|_| LauncherError::InvalidUrl(input.to_string()))?;
    if parsed.host_str().is_none() {
        return Err(LauncherError::InvalidUrl(input.to_string()));
    }

    Ok(parsed.to_string())
}

/// Only http(s) documents can be framed; everything else opens in a tab
pub fn is_embeddable(url: &str) -> bool {
    Url::parse(url)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Lowercased host of a URL, if it has one
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
}

/// Favicon lookup URL for a site
pub fn favicon_url(url: &str) -> Option<String> {
    host_of(url).map(|host| format!("https://www.google.com/s2/favicons?domain={}&sz=32", host))
}

/// Registrable part of a host, used as the default site name.
///
/// Keeps the last two labels, or three when the TLD is two letters and the
/// second-to-last label is `co`/`com`:
/// - `https://www.google.com/search` → `google.com`
/// - `https://news.bbc.co.uk/article` → `bbc.co.uk`
/// - `http://127.0.0.1:8080` → `127.0.0.1`
pub fn suggest_name(url: &str) -> Option<String> {
    let hostname = host_of(url)?;

    if hostname == "localhost" || is_ip_address(&hostname) {
        return Some(hostname);
    }

    let parts: Vec<&str> = hostname.split('.').collect();
    if parts.len() < 2 {
        return Some(hostname);
    }

    let tld = parts[parts.len() - 1];
    let num_parts = if parts.len() >= 3
        && tld.len() == 2
        && matches!(parts[parts.len() - 2], "co" | "com") {
        3
    } else {
        2
    };

    Some(parts[parts.len() - num_parts..].join("."))
}

fn is_ip_address(s: &str) -> bool {
    s.chars().next().is_some_and(|c| c.is_ascii_digit())
        && s.chars().all(|c| c.is_ascii_digit() || c == '.')
}
