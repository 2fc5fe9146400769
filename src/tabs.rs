/// Opening sites outside the side panel (tabs, windows, private windows)

use crate::error::{LauncherError, LauncherResult};
use crate::site::OpenMode;
use wasm_bindgen::prelude::*;

#[wasm_bindgen(module = "/tabs.js")]
extern "C" {
    #[wasm_bindgen(catch)]
    async fn openUrl(url: &str, mode: &str) -> Result<(), JsValue>;
}

/// Open `url` according to `mode`. `Iframe` has no meaning outside the panel
/// and opens a normal tab.
pub async fn open_url(url: &str, mode: OpenMode) -> LauncherResult<()> {
    let mode = match mode {
        OpenMode::Iframe => OpenMode::NewTab,
        other => other,
    };

    log::debug!("opening {} in {}", url, mode.as_str());
    openUrl(url, mode.as_str())
        .await
        .map_err(|e| LauncherError::Tabs(format!("{}: {:?}", url, e)))
}

pub async fn open_in_new_tab(url: &str) -> LauncherResult<()> {
    open_url(url, OpenMode::NewTab).await
}
