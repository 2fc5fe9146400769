//! Wires `NavigationBridge` into the embedded document: history hooks, DOM
//! events, the fallback poll and the message channel to the side panel.

use crate::bridge::{BridgeAction, FrameSnapshot, NavigationBridge};
use crate::config::TimingConfig;
use crate::protocol::{decode_host_message, FrameMessage, TARGET_ORIGIN};
use gloo_timers::callback::{Interval, Timeout};
use js_sys::{Function, Object, Reflect};
use serde::Serialize;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Event, EventTarget, MessageEvent, Window};

type HistoryHook = Closure<dyn FnMut(JsValue, JsValue, JsValue) -> Result<JsValue, JsValue>>;

thread_local! {
    static ACTIVE_BRIDGE: RefCell<Option<FrameBridge>> = const { RefCell::new(None) };
}

struct BridgeInner {
    window: Window,
    core: NavigationBridge,
    debounce: Option<Timeout>,
}

type Shared = Rc<RefCell<BridgeInner>>;

/// Owns every hook installed into the frame; dropping it removes them
pub struct FrameBridge {
    inner: Shared,
    _poll: Interval,
    message_listener: Closure<dyn FnMut(MessageEvent)>,
    event_listeners: Vec<(EventTarget, &'static str, Closure<dyn FnMut(Event)>)>,
    history_hooks: Vec<(&'static str, Function, HistoryHook)>,
}

/// Entry point for the content script injected into every frame
#[wasm_bindgen]
pub fn start_frame_bridge() {
    let already_running = ACTIVE_BRIDGE.with(|slot| slot.borrow().is_some());
    if already_running {
        return;
    }

    match FrameBridge::install(TimingConfig::default()) {
        Ok(Some(bridge)) => {
            log::debug!("navigation bridge installed");
            ACTIVE_BRIDGE.with(|slot| *slot.borrow_mut() = Some(bridge));
        }
        Ok(None) => {}
        Err(e) => log::warn!("navigation bridge not installed: {:?}", e),
    }
}

fn is_framed(window: &Window) -> bool {
    match window.top() {
        Ok(Some(top)) => !Object::is(top.as_ref(), window.as_ref()),
        // a top we are not allowed to see is certainly not us
        Ok(None) | Err(_) => true,
    }
}

fn snapshot(window: &Window) -> FrameSnapshot {
    let url = window.location().href().unwrap_or_default();
    let title = window.document().map(|d| d.title()).unwrap_or_default();
    let can_go_back = window
        .history()
        .and_then(|h| h.length())
        .map(|len| len > 1)
        .unwrap_or(false);

    FrameSnapshot {
        url,
        title,
        can_go_back,
        // the History API does not expose forward entries
        can_go_forward: false,
    }
}

fn post_to_parent(window: &Window, message: &FrameMessage) {
    let serializer = serde_wasm_bindgen::Serializer::json_compatible();
    let value = match message.serialize(&serializer) {
        Ok(value) => value,
        Err(e) => {
            log::warn!("could not encode bridge message: {:?}", e);
            return;
        }
    };

    let result = window
        .parent()
        .and_then(|parent| parent.ok_or_else(|| JsValue::from_str("no parent window")))
        .and_then(|parent| parent.post_message(&value, TARGET_ORIGIN));
    if let Err(e) = result {
        log::warn!("postMessage to side panel failed: {:?}", e);
    }
}

fn perform(window: &Window, actions: Vec<BridgeAction>) {
    for action in actions {
        let result = match action {
            BridgeAction::Post(message) => {
                post_to_parent(window, &message);
                Ok(())
            }
            BridgeAction::GoBack => window.history().and_then(|h| h.back()),
            BridgeAction::GoForward => window.history().and_then(|h| h.forward()),
            BridgeAction::Reload => window.location().reload(),
        };
        if let Err(e) = result {
            log::warn!("navigation command failed: {:?}", e);
        }
    }
}

/// (Re)arm the debounce timer for whatever report is due
fn arm(shared: &Shared) {
    let delay = shared
        .borrow()
        .core
        .report_due_at()
        .map(|due| (due - js_sys::Date::now()).max(0.0) as u32);

    let timeout = delay.map(|delay| {
        let weak = Rc::downgrade(shared);
        Timeout::new(delay, move || fire(&weak))
    });
    shared.borrow_mut().debounce = timeout;
}

fn fire(weak: &Weak<RefCell<BridgeInner>>) {
    let Some(shared) = weak.upgrade() else { return };

    let (window, message, still_due) = {
        let mut inner = shared.borrow_mut();
        let snap = snapshot(&inner.window);
        let message = inner.core.on_timer(&snap, js_sys::Date::now());
        (inner.window.clone(), message, inner.core.report_due_at().is_some())
    };

    if let Some(message) = message {
        post_to_parent(&window, &message);
    }
    if still_due {
        // re-arm outside of this timer's own callback
        wasm_bindgen_futures::spawn_local(async move { arm(&shared) });
    }
}

fn note_navigation(weak: &Weak<RefCell<BridgeInner>>, new_entry: bool) {
    let Some(shared) = weak.upgrade() else { return };
    let enabled = {
        let mut inner = shared.borrow_mut();
        let now = js_sys::Date::now();
        if new_entry {
            inner.core.note_new_entry(now);
        } else {
            inner.core.note_navigation(now);
        }
        inner.core.is_enabled()
    };
    if enabled {
        arm(&shared);
    }
}

fn hook_history(
    window: &Window,
    weak: Weak<RefCell<BridgeInner>>,
    method: &'static str,
) -> Result<(&'static str, Function, HistoryHook), JsValue> {
    let history = window.history()?;
    let original: Function = Reflect::get(&history, &JsValue::from_str(method))?.dyn_into()?;

    let call_original = original.clone();
    let target = history.clone();
    let new_entry = method == "pushState";
    let hook: HistoryHook = Closure::wrap(Box::new(move |state: JsValue, title: JsValue, url: JsValue| {
        let result = call_original.call3(&target, &state, &title, &url);
        note_navigation(&weak, new_entry);
        result
    }) as Box<dyn FnMut(JsValue, JsValue, JsValue) -> Result<JsValue, JsValue>>);

    Reflect::set(&history, &JsValue::from_str(method), hook.as_ref())?;
    Ok((method, original, hook))
}

fn handle_message(weak: &Weak<RefCell<BridgeInner>>, event: MessageEvent) {
    let Some(shared) = weak.upgrade() else { return };
    let window = shared.borrow().window.clone();

    // only the embedding side panel may drive the bridge
    let from_parent = match (event.source(), window.parent()) {
        (Some(source), Ok(Some(parent))) => Object::is(source.as_ref(), parent.as_ref()),
        _ => false,
    };
    if !from_parent {
        return;
    }

    let Ok(value) = serde_wasm_bindgen::from_value::<serde_json::Value>(event.data()) else {
        return;
    };
    let message = match decode_host_message(value) {
        Ok(message) => message,
        Err(e) if e.is_foreign() => return,
        Err(e) => {
            log::debug!("ignoring message from side panel: {}", e);
            return;
        }
    };

    let actions = {
        let mut inner = shared.borrow_mut();
        let snap = snapshot(&inner.window);
        inner.core.handle_host_message(message, &snap, js_sys::Date::now())
    };
    arm(&shared);
    perform(&window, actions);
}

impl FrameBridge {
    /// Install into the current document. `Ok(None)` on a top-level page.
    pub fn install(config: TimingConfig) -> Result<Option<FrameBridge>, JsValue> {
        let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
        if !is_framed(&window) {
            return Ok(None);
        }

        let poll_interval = config.bridge_poll_interval_ms;
        let inner: Shared = Rc::new(RefCell::new(BridgeInner {
            window: window.clone(),
            core: NavigationBridge::new(config),
            debounce: None,
        }));

        let weak = Rc::downgrade(&inner);
        let message_listener = Closure::wrap(Box::new(move |event: MessageEvent| {
            handle_message(&weak, event);
        }) as Box<dyn FnMut(MessageEvent)>);
        window.add_event_listener_with_callback("message", message_listener.as_ref().unchecked_ref())?;

        let mut event_listeners = Vec::new();
        let document: EventTarget = window
            .document()
            .ok_or_else(|| JsValue::from_str("no document"))?
            .into();
        let targets: [(EventTarget, &'static str); 4] = [
            (window.clone().into(), "popstate"),
            (window.clone().into(), "hashchange"),
            (document, "DOMContentLoaded"),
            (window.clone().into(), "load"),
        ];
        for (target, event_name) in targets {
            let weak = Rc::downgrade(&inner);
            let listener = Closure::wrap(Box::new(move |_: Event| {
                note_navigation(&weak, false);
            }) as Box<dyn FnMut(Event)>);
            target.add_event_listener_with_callback(event_name, listener.as_ref().unchecked_ref())?;
            event_listeners.push((target, event_name, listener));
        }

        let mut history_hooks = Vec::new();
        for method in ["pushState", "replaceState"] {
            history_hooks.push(hook_history(&window, Rc::downgrade(&inner), method)?);
        }

        let weak = Rc::downgrade(&inner);
        let poll = Interval::new(poll_interval, move || {
            let Some(shared) = weak.upgrade() else { return };
            let (window, message) = {
                let mut inner = shared.borrow_mut();
                let snap = snapshot(&inner.window);
                let message = inner.core.poll(&snap, js_sys::Date::now());
                (inner.window.clone(), message)
            };
            if let Some(message) = message {
                post_to_parent(&window, &message);
            }
        });

        Ok(Some(FrameBridge {
            inner,
            _poll: poll,
            message_listener,
            event_listeners,
            history_hooks,
        }))
    }
}

impl Drop for FrameBridge {
    fn drop(&mut self) {
        let window = self.inner.borrow().window.clone();
        let _ = window.remove_event_listener_with_callback(
            "message",
            self.message_listener.as_ref().unchecked_ref(),
        );
        for (target, event_name, listener) in &self.event_listeners {
            let _ = target.remove_event_listener_with_callback(event_name, listener.as_ref().unchecked_ref());
        }
        if let Ok(history) = window.history() {
            for (method, original, _) in &self.history_hooks {
                let _ = Reflect::set(&history, &JsValue::from_str(method), original);
            }
        }
        self.inner.borrow_mut().debounce = None;
    }
}
