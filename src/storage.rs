/// Settings persistence: chrome.storage.local first, a localStorage mirror
/// second, built-in defaults last

use crate::config::SIDEPANEL_SETTINGS_KEY;
use crate::error::{LauncherError, LauncherResult};
use crate::settings::SidebarSettings;
use serde_json::Value;
use wasm_bindgen::prelude::*;

// chrome.storage.local glue
#[wasm_bindgen(module = "/storage.js")]
extern "C" {
    #[wasm_bindgen(catch)]
    async fn getStorage(key: &str) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn setStorage(key: &str, value: JsValue) -> Result<(), JsValue>;
}

/// Pick the first usable settings blob. Never fails: a broken store still
/// leaves the panel usable with defaults.
pub fn resolve_settings(
    primary: LauncherResult<Option<Value>>,
    mirror: LauncherResult<Option<String>>,
) -> SidebarSettings {
    match primary {
        Ok(Some(value)) => match serde_json::from_value::<SidebarSettings>(value) {
            Ok(settings) => return settings,
            Err(e) => log::warn!("ignoring unreadable extension settings: {}", e),
        },
        Ok(None) => log::debug!("no extension settings stored yet"),
        Err(e) => log::warn!("{}", e),
    }

    match mirror {
        Ok(Some(json)) => match serde_json::from_str::<SidebarSettings>(&json) {
            Ok(settings) => {
                log::info!("settings restored from localStorage mirror");
                return settings;
            }
            Err(e) => log::warn!("ignoring unreadable settings mirror: {}", e),
        },
        Ok(None) => {}
        Err(e) => log::warn!("{}", e),
    }

    SidebarSettings::default()
}

async fn read_primary() -> LauncherResult<Option<Value>> {
    let value_js = getStorage(SIDEPANEL_SETTINGS_KEY)
        .await
        .map_err(|e| LauncherError::StorageRead(format!("chrome.storage: {:?}", e)))?;

    if value_js.is_null() || value_js.is_undefined() {
        return Ok(None);
    }
    serde_wasm_bindgen::from_value(value_js)
        .map(Some)
        .map_err(|e| LauncherError::decode("settings", format!("{:?}", e)))
}

fn local_storage() -> LauncherResult<web_sys::Storage> {
    web_sys::window()
        .ok_or(LauncherError::NoWindow)?
        .local_storage()
        .map_err(|e| LauncherError::StorageRead(format!("localStorage: {:?}", e)))?
        .ok_or_else(|| LauncherError::StorageRead("localStorage unavailable".to_string()))
}

fn read_mirror() -> LauncherResult<Option<String>> {
    local_storage()?
        .get_item(SIDEPANEL_SETTINGS_KEY)
        .map_err(|e| LauncherError::StorageRead(format!("localStorage: {:?}", e)))
}

fn write_mirror(json: &str) -> LauncherResult<()> {
    local_storage()?
        .set_item(SIDEPANEL_SETTINGS_KEY, json)
        .map_err(|e| LauncherError::StorageWrite(format!("localStorage: {:?}", e)))
}

/// Load settings, falling back to the mirror and then to defaults
pub async fn load_settings() -> SidebarSettings {
    let primary = read_primary().await;
    // service workers have no window; the mirror is simply absent there
    let mirror = if primary.as_ref().is_ok_and(Option::is_some) {
        Ok(None)
    } else {
        read_mirror()
    };
    resolve_settings(primary, mirror)
}

/// Write settings to both stores. Last write wins; there is no locking.
pub async fn save_settings(settings: &SidebarSettings) -> LauncherResult<()> {
    let json = serde_json::to_string(settings).map_err(|e| LauncherError::encode("settings", e))?;
    if let Err(e) = write_mirror(&json) {
        log::debug!("settings mirror not written: {}", e);
    }

    let value = serde_wasm_bindgen::to_value(settings)
        .map_err(|e| LauncherError::encode("settings", format!("{:?}", e)))?;
    setStorage(SIDEPANEL_SETTINGS_KEY, value)
        .await
        .map_err(|e| LauncherError::StorageWrite(format!("chrome.storage: {:?}", e)))?;

    log::debug!("saved {} sites", settings.sites.len());
    Ok(())
}
