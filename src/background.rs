/// Background service worker: answers chrome.runtime messages from the panel

use crate::bypass::{DnrRule, FrameBypassRules, RuleUpdate};
use crate::error::{LauncherError, LauncherResult};
use crate::settings::SidebarSettings;
use crate::storage::{load_settings, save_settings};
use crate::tabs::open_in_new_tab;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use wasm_bindgen::prelude::*;

#[wasm_bindgen(module = "/rules.js")]
extern "C" {
    #[wasm_bindgen(catch)]
    async fn updateSessionRules(update: JsValue) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn getSessionRules() -> Result<JsValue, JsValue>;
}

#[wasm_bindgen(module = "/runtime.js")]
extern "C" {
    #[wasm_bindgen(catch)]
    async fn sendRuntimeMessage(message: JsValue) -> Result<JsValue, JsValue>;
}

thread_local! {
    static BYPASS_RULES: RefCell<FrameBypassRules> = RefCell::new(FrameBypassRules::new());
}

/// `chrome.runtime.sendMessage` payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum RuntimeRequest {
    GetSidebarSettings,
    SaveSidebarSettings { settings: SidebarSettings },
    OpenInNewTab { url: String },
    EnableFrameBypass { url: String },
    DisableFrameBypass { url: String },
}

impl RuntimeRequest {
    pub fn action(&self) -> &'static str {
        match self {
            RuntimeRequest::GetSidebarSettings => "getSidebarSettings",
            RuntimeRequest::SaveSidebarSettings { .. } => "saveSidebarSettings",
            RuntimeRequest::OpenInNewTab { .. } => "openInNewTab",
            RuntimeRequest::EnableFrameBypass { .. } => "enableFrameBypass",
            RuntimeRequest::DisableFrameBypass { .. } => "disableFrameBypass",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RuntimeResponse {
    pub fn ok() -> Self {
        RuntimeResponse {
            success: true,
            data: None,
            error: None,
        }
    }

    pub fn with_data(data: Value) -> Self {
        RuntimeResponse {
            data: Some(data),
            ..Self::ok()
        }
    }

    pub fn failed(error: &LauncherError) -> Self {
        RuntimeResponse {
            success: false,
            data: None,
            error: Some(error.to_string()),
        }
    }
}

impl From<LauncherResult<RuntimeResponse>> for RuntimeResponse {
    fn from(result: LauncherResult<RuntimeResponse>) -> Self {
        result.unwrap_or_else(|e| RuntimeResponse::failed(&e))
    }
}

async fn apply_rules(update: RuleUpdate) -> LauncherResult<()> {
    if update.is_empty() {
        return Ok(());
    }
    let update_js = serde_wasm_bindgen::to_value(&update)
        .map_err(|e| LauncherError::encode("rule update", format!("{:?}", e)))?;
    updateSessionRules(update_js)
        .await
        .map_err(|e| LauncherError::Bypass(format!("{:?}", e)))
}

/// Worker start-up: pick up the bypass rules a previous worker left behind.
/// The message listener waits for this before handling anything.
#[wasm_bindgen]
pub async fn start_background() {
    let rules = match getSessionRules().await {
        Ok(value) => serde_wasm_bindgen::from_value::<Vec<DnrRule>>(value)
            .map_err(|e| LauncherError::decode("session rules", format!("{:?}", e))),
        Err(e) => Err(LauncherError::Bypass(format!("{:?}", e))),
    };
    match rules {
        Ok(rules) => {
            let restored = FrameBypassRules::from_session_rules(&rules);
            BYPASS_RULES.with(|table| *table.borrow_mut() = restored);
        }
        Err(e) => log::warn!("could not restore frame bypass rules: {}", e),
    }
}

/// Handle one runtime request
pub async fn handle_request(request: RuntimeRequest) -> RuntimeResponse {
    log::debug!("runtime request: {}", request.action());

    let result = match request {
        RuntimeRequest::GetSidebarSettings => {
            let settings = load_settings().await;
            serde_json::to_value(&settings)
                .map(RuntimeResponse::with_data)
                .map_err(|e| LauncherError::encode("settings", e))
        }
        RuntimeRequest::SaveSidebarSettings { settings } => {
            save_settings(&settings).await.map(|_| RuntimeResponse::ok())
        }
        RuntimeRequest::OpenInNewTab { url } => {
            open_in_new_tab(&url).await.map(|_| RuntimeResponse::ok())
        }
        RuntimeRequest::EnableFrameBypass { url } => {
            match BYPASS_RULES.with(|rules| rules.borrow_mut().enable(&url)) {
                Ok(update) => apply_rules(update).await.map(|_| RuntimeResponse::ok()),
                Err(e) => Err(e),
            }
        }
        RuntimeRequest::DisableFrameBypass { url } => {
            match BYPASS_RULES.with(|rules| rules.borrow_mut().disable(&url)) {
                Ok(update) => apply_rules(update).await.map(|_| RuntimeResponse::ok()),
                Err(e) => Err(e),
            }
        }
    };

    if let Err(e) = &result {
        log::error!("runtime request failed: {}", e);
    }
    result.into()
}

/// Send a request to the service worker from an extension page
pub async fn send_request(request: &RuntimeRequest) -> LauncherResult<RuntimeResponse> {
    let serializer = serde_wasm_bindgen::Serializer::json_compatible();
    let message = request
        .serialize(&serializer)
        .map_err(|e| LauncherError::encode("runtime message", format!("{:?}", e)))?;

    let reply = sendRuntimeMessage(message)
        .await
        .map_err(|e| LauncherError::Runtime(format!("{}: {:?}", request.action(), e)))?;
    serde_wasm_bindgen::from_value(reply)
        .map_err(|e| LauncherError::decode("runtime response", format!("{:?}", e)))
}

/// Entry point for the service worker's `chrome.runtime.onMessage` listener
#[wasm_bindgen]
pub async fn handle_runtime_message(message: JsValue) -> Result<JsValue, JsValue> {
    let response = match serde_wasm_bindgen::from_value::<RuntimeRequest>(message) {
        Ok(request) => handle_request(request).await,
        Err(e) => {
            log::warn!("unrecognised runtime message: {:?}", e);
            RuntimeResponse::failed(&LauncherError::decode("runtime message", format!("{:?}", e)))
        }
    };

    let serializer = serde_wasm_bindgen::Serializer::json_compatible();
    response
        .serialize(&serializer)
        .map_err(|e| JsValue::from_str(&format!("Failed to serialize response: {:?}", e)))
}
