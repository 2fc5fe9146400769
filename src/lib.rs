/// Sidebar Launcher - side panel site launcher with an embedded browsing view
/// Built with Rust + WASM + Yew

pub mod background;
pub mod bridge;
pub mod bridge_runtime;
pub mod bypass;
pub mod config;
pub mod error;
pub mod images;
pub mod lifecycle;
pub mod protocol;
pub mod relay;
pub mod session;
pub mod settings;
pub mod site;
pub mod storage;
pub mod tabs;
pub mod ui;

use images::ImageStore;
use wasm_bindgen::prelude::*;

// Set up panic hook for better error messages in the browser console
#[wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::default());
}

// Start the Yew app for the side panel
#[wasm_bindgen]
pub fn start_side_panel() {
    yew::Renderer::<ui::panel::SidePanel>::new().render();
}

// Site helpers for the options page
#[wasm_bindgen]
pub fn suggest_site_name(url: &str) -> String {
    site::suggest_name(url).unwrap_or_default()
}

#[wasm_bindgen]
pub fn normalize_url(input: &str) -> Result<String, JsValue> {
    site::normalize_site_url(input).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Store a custom image; returns the value to keep in settings
/// (the data URL itself, or an `idb:` reference)
#[wasm_bindgen]
pub async fn store_image(data_url: String) -> Result<String, JsValue> {
    ImageStore::default()
        .save(&data_url)
        .await
        .map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Resolve a settings image value to a data URL; `null` when it is gone
#[wasm_bindgen]
pub async fn load_image(reference: String) -> Result<JsValue, JsValue> {
    match ImageStore::default().load(&reference).await {
        Ok(Some(data_url)) => Ok(JsValue::from_str(&data_url)),
        Ok(None) => Ok(JsValue::NULL),
        Err(e) => Err(JsValue::from_str(&e.to_string())),
    }
}

#[wasm_bindgen]
pub async fn delete_image(reference: String) -> Result<(), JsValue> {
    ImageStore::default()
        .remove(&reference)
        .await
        .map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Drop stored images that none of `references` point to
#[wasm_bindgen]
pub async fn collect_image_garbage(references: JsValue) -> Result<u32, JsValue> {
    let references: Vec<String> = serde_wasm_bindgen::from_value(references)
        .map_err(|e| JsValue::from_str(&format!("Failed to parse references: {:?}", e)))?;

    ImageStore::default()
        .collect_orphans(&references)
        .await
        .map(|removed| removed as u32)
        .map_err(|e| JsValue::from_str(&e.to_string()))
}
