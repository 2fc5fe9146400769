/// The side panel settings document stored in chrome.storage.local

use crate::error::{LauncherError, LauncherResult};
use crate::site::{normalize_site_url, suggest_name, BookmarkedSite, IconType, OpenMode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// List appearance preferences
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DisplayPreferences {
    pub show_icons: bool,
    pub show_names: bool,
    pub compact: bool,
    pub default_open_mode: OpenMode,
}

impl Default for DisplayPreferences {
    fn default() -> Self {
        DisplayPreferences {
            show_icons: true,
            show_names: true,
            compact: false,
            default_open_mode: OpenMode::Iframe,
        }
    }
}

/// Root settings structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SidebarSettings {
    pub sites: Vec<BookmarkedSite>,
    pub display: DisplayPreferences,
}

/// Input for a new site, as typed into the add form
#[derive(Debug, Clone, PartialEq)]
pub struct NewSite {
    pub name: String,
    pub url: String,
    pub icon: String,
    pub icon_type: IconType,
    pub open_mode: Option<OpenMode>,
}

impl NewSite {
    pub fn new(name: &str, url: &str) -> Self {
        NewSite {
            name: name.to_string(),
            url: url.to_string(),
            icon: String::new(),
            icon_type: IconType::Favicon,
            open_mode: None,
        }
    }

    pub fn with_open_mode(mut self, open_mode: OpenMode) -> Self {
        self.open_mode = Some(open_mode);
        self
    }
}

/// Partial edit of an existing site; `None` leaves a field alone
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SiteUpdate {
    pub name: Option<String>,
    pub url: Option<String>,
    pub icon: Option<String>,
    pub icon_type: Option<IconType>,
    pub open_mode: Option<OpenMode>,
}

impl SidebarSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and append a site after the current last position
    pub fn add_site(&mut self, input: NewSite) -> LauncherResult<&BookmarkedSite> {
        let url = normalize_site_url(&input.url)?;
        let name = match input.name.trim() {
            "" => suggest_name(&url).unwrap_or_else(|| url.clone()),
            trimmed => trimmed.to_string(),
        };
        let position = self
            .sites
            .iter()
            .map(|s| s.position)
            .max()
            .map_or(0, |max| max + 1);

        self.sites.push(BookmarkedSite {
            id: Uuid::new_v4().to_string(),
            name,
            url,
            icon: input.icon,
            icon_type: input.icon_type,
            open_mode: input.open_mode.unwrap_or(self.display.default_open_mode),
            position,
        });

        let index = self.sites.len() - 1;
        Ok(&self.sites[index])
    }

    pub fn remove_site(&mut self, site_id: &str) -> bool {
        let original_len = self.sites.len();
        self.sites.retain(|s| s.id != site_id);
        self.sites.len() < original_len
    }

    pub fn get_site(&self, site_id: &str) -> Option<&BookmarkedSite> {
        self.sites.iter().find(|s| s.id == site_id)
    }

    /// Apply an edit. This is the only place a site's open mode changes.
    pub fn update_site(&mut self, site_id: &str, update: SiteUpdate) -> LauncherResult<()> {
        let url = update.url.as_deref().map(normalize_site_url).transpose()?;

        let site = self
            .sites
            .iter_mut()
            .find(|s| s.id == site_id)
            .ok_or_else(|| LauncherError::SiteNotFound(site_id.to_string()))?;

        if let Some(name) = update.name {
            site.name = name;
        }
        if let Some(url) = url {
            site.url = url;
        }
        if let Some(icon) = update.icon {
            site.icon = icon;
        }
        if let Some(icon_type) = update.icon_type {
            site.icon_type = icon_type;
        }
        if let Some(open_mode) = update.open_mode {
            site.open_mode = open_mode;
        }
        Ok(())
    }

    /// Move a site to `to_index` in display order and renumber every position
    pub fn move_site(&mut self, site_id: &str, to_index: usize) -> bool {
        let mut ordered: Vec<BookmarkedSite> = self.sorted_sites().into_iter().cloned().collect();
        let Some(from) = ordered.iter().position(|s| s.id == site_id) else {
            return false;
        };

        let site = ordered.remove(from);
        let to = to_index.min(ordered.len());
        ordered.insert(to, site);

        for (index, site) in ordered.iter_mut().enumerate() {
            site.position = index as i64;
        }
        self.sites = ordered;
        true
    }

    /// Sites in display order; ties keep insertion order
    pub fn sorted_sites(&self) -> Vec<&BookmarkedSite> {
        let mut sites: Vec<&BookmarkedSite> = self.sites.iter().collect();
        sites.sort_by_key(|s| s.position);
        sites
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with(names: &[&str]) -> SidebarSettings {
        let mut settings = SidebarSettings::new();
        for name in names {
            settings
                .add_site(NewSite::new(name, &format!("https://{}.example.com", name)))
                .unwrap();
        }
        settings
    }

    fn names(settings: &SidebarSettings) -> Vec<String> {
        settings.sorted_sites().iter().map(|s| s.name.clone()).collect()
    }

    #[test]
    fn test_settings_new() {
        let settings = SidebarSettings::new();
        assert!(settings.sites.is_empty());
        assert!(settings.display.show_icons);
    }

    #[test]
    fn test_add_site() {
        let mut settings = SidebarSettings::new();
        let site = settings
            .add_site(NewSite::new("Example", "example.com"))
            .unwrap()
            .clone();

        assert_eq!(site.url, "https://example.com/");
        assert_eq!(site.open_mode, OpenMode::Iframe);
        assert_eq!(site.position, 0);
        assert!(!site.id.is_empty());
    }

    #[test]
    fn test_add_site_appends_after_max_position() {
        let mut settings = settings_with(&["a", "b"]);
        settings.sites[1].position = 40;

        let site = settings.add_site(NewSite::new("c", "c.dev")).unwrap();

        assert_eq!(site.position, 41);
    }

    #[test]
    fn test_add_site_generates_unique_ids() {
        let settings = settings_with(&["a", "b", "c"]);
        let mut ids: Vec<&str> = settings.sites.iter().map(|s| s.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn test_add_site_defaults_name_from_url() {
        let mut settings = SidebarSettings::new();
        let site = settings.add_site(NewSite::new("  ", "https://news.bbc.co.uk/x")).unwrap();
        assert_eq!(site.name, "bbc.co.uk");
    }

    #[test]
    fn test_add_site_uses_default_open_mode() {
        let mut settings = SidebarSettings::new();
        settings.display.default_open_mode = OpenMode::NewTab;

        let site = settings.add_site(NewSite::new("a", "a.dev")).unwrap();
        assert_eq!(site.open_mode, OpenMode::NewTab);

        let site = settings
            .add_site(NewSite::new("b", "b.dev").with_open_mode(OpenMode::Iframe))
            .unwrap();
        assert_eq!(site.open_mode, OpenMode::Iframe);
    }

    #[test]
    fn test_add_site_rejects_invalid_url() {
        let mut settings = SidebarSettings::new();
        assert!(settings.add_site(NewSite::new("bad", "")).is_err());
        assert!(settings.sites.is_empty());
    }

    #[test]
    fn test_remove_site() {
        let mut settings = settings_with(&["a", "b"]);
        let id = settings.sites[0].id.clone();

        assert!(settings.remove_site(&id));
        assert_eq!(names(&settings), vec!["b"]);
        assert!(!settings.remove_site("nonexistent"));
    }

    #[test]
    fn test_update_site() {
        let mut settings = settings_with(&["a"]);
        let id = settings.sites[0].id.clone();

        settings
            .update_site(
                &id,
                SiteUpdate {
                    name: Some("Renamed".to_string()),
                    open_mode: Some(OpenMode::NewWindow),
                    ..SiteUpdate::default()
                },
            )
            .unwrap();

        let site = settings.get_site(&id).unwrap();
        assert_eq!(site.name, "Renamed");
        assert_eq!(site.open_mode, OpenMode::NewWindow);
        assert_eq!(site.url, "https://a.example.com/");
    }

    #[test]
    fn test_update_site_invalid_url_leaves_site_untouched() {
        let mut settings = settings_with(&["a"]);
        let id = settings.sites[0].id.clone();

        let result = settings.update_site(
            &id,
            SiteUpdate {
                name: Some("x".to_string()),
                url: Some("https://".to_string()),
                ..SiteUpdate::default()
            },
        );

        assert!(result.is_err());
        assert_eq!(settings.get_site(&id).unwrap().name, "a");
    }

    #[test]
    fn test_update_missing_site() {
        let mut settings = SidebarSettings::new();
        let err = settings.update_site("nope", SiteUpdate::default()).unwrap_err();
        assert_eq!(err, LauncherError::SiteNotFound("nope".to_string()));
    }

    #[test]
    fn test_move_site() {
        let mut settings = settings_with(&["a", "b", "c", "d"]);
        let id = settings.sites[3].id.clone();

        assert!(settings.move_site(&id, 1));

        assert_eq!(names(&settings), vec!["a", "d", "b", "c"]);
        let positions: Vec<i64> = settings.sorted_sites().iter().map(|s| s.position).collect();
        assert_eq!(positions, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_move_site_clamps_index() {
        let mut settings = settings_with(&["a", "b", "c"]);
        let id = settings.sites[0].id.clone();

        assert!(settings.move_site(&id, 99));
        assert_eq!(names(&settings), vec!["b", "c", "a"]);
        assert!(!settings.move_site("missing", 0));
    }

    #[test]
    fn test_sorted_sites_with_gaps() {
        let mut settings = settings_with(&["a", "b", "c"]);
        settings.sites[0].position = 10;
        settings.sites[1].position = -3;
        settings.sites[2].position = 4;

        assert_eq!(names(&settings), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_partial_blob_decodes() {
        let settings: SidebarSettings = serde_json::from_str(r#"{"display":{"compact":true}}"#).unwrap();

        assert!(settings.sites.is_empty());
        assert!(settings.display.compact);
        assert!(settings.display.show_names);
    }

    #[test]
    fn test_serialization() {
        let settings = settings_with(&["a"]);

        let json = serde_json::to_string(&settings).unwrap();
        let deserialized: SidebarSettings = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized, settings);
    }
}
