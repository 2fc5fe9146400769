/// Runtime for the embedded site view.
///
/// Executes `LifecycleEffect`s against the real iframe element and owns every
/// timer, listener and observer that belongs to the current site. Dropping the
/// host tears all of it down.

use crate::background::{send_request, RuntimeRequest};
use crate::config::{TimingConfig, ABOUT_BLANK};
use crate::error::{LauncherError, LauncherResult};
use crate::lifecycle::{IframeLifecycle, LifecycleEffect, ViewState};
use crate::protocol::{decode_frame_message, HostMessage, NavCommand, TARGET_ORIGIN};
use crate::relay::PendingNavigation;
use crate::session::{DisplayUrl, NavigationSession, NavigationState, SessionEvent, UrlSources};
use crate::site::BookmarkedSite;
use crate::tabs::{open_in_new_tab, open_url};
use gloo_timers::callback::{Interval, Timeout};
use js_sys::{Array, Object};
use serde::Serialize;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::spawn_local;
use web_sys::{Event, HtmlIFrameElement, MessageEvent, MutationObserver, MutationObserverInit, Window};
use yew::Callback;

/// What the panel needs to re-render
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    View(ViewState),
    Url(DisplayUrl),
    Navigation(NavigationState),
    Toast(Option<String>),
}

type SrcObserver = (MutationObserver, Closure<dyn FnMut(Array, MutationObserver)>);

struct HostInner {
    iframe: HtmlIFrameElement,
    config: TimingConfig,
    lifecycle: IframeLifecycle,
    session: Option<NavigationSession>,
    notify: Callback<HostEvent>,
    onload: Option<Closure<dyn FnMut(Event)>>,
    onerror: Option<Closure<dyn FnMut(Event)>>,
    load_timer: Option<Timeout>,
    return_timer: Option<Timeout>,
    toast_timer: Option<Timeout>,
    tracking_sends: Vec<Timeout>,
    /// Timers that die with the navigation session
    session_timers: Vec<Timeout>,
    poller: Option<Interval>,
    src_observer: Option<SrcObserver>,
    bypass_url: Option<String>,
}

type Shared = Rc<RefCell<HostInner>>;
type WeakHost = Weak<RefCell<HostInner>>;

pub struct FrameHost {
    inner: Shared,
    window: Window,
    message_listener: Closure<dyn FnMut(MessageEvent)>,
}

fn send_bypass(request: RuntimeRequest) {
    spawn_local(async move {
        match send_request(&request).await {
            Ok(response) if response.success => {}
            Ok(response) => log::warn!(
                "{} refused: {}",
                request.action(),
                response.error.unwrap_or_default()
            ),
            Err(e) => log::warn!("{}", e),
        }
    });
}

/// Run a lifecycle transition and its effects, then tell the panel
fn dispatch(weak: &WeakHost, transition: impl FnOnce(&mut IframeLifecycle, f64) -> Vec<LifecycleEffect>) {
    let Some(shared) = weak.upgrade() else { return };
    let effects = transition(&mut shared.borrow_mut().lifecycle, js_sys::Date::now());
    run(&shared, effects);
}

fn run(shared: &Shared, effects: Vec<LifecycleEffect>) {
    if effects.is_empty() {
        return;
    }

    let weak = Rc::downgrade(shared);
    let (notify, events) = {
        let mut inner = shared.borrow_mut();
        let mut events = Vec::new();
        for effect in effects {
            inner.apply(effect, &weak, &mut events);
        }
        events.push(HostEvent::View(inner.lifecycle.state().clone()));
        (inner.notify.clone(), events)
    };

    // emitted after the borrow ends; re-renders may call back into the host
    for event in events {
        notify.emit(event);
    }
}

fn on_frame_load(weak: &WeakHost) {
    let Some(shared) = weak.upgrade() else { return };
    // blank loads come from teardown and refresh, never from the site
    if shared.borrow().iframe.src() == ABOUT_BLANK {
        return;
    }
    dispatch(weak, |lifecycle, _| lifecycle.on_load());
}

fn poll_frame(weak: &WeakHost) {
    let Some(shared) = weak.upgrade() else { return };

    let (notify, update) = {
        let mut inner = shared.borrow_mut();
        let sources = inner.url_sources();
        let update = inner.session.as_mut().and_then(|session| session.poll(&sources));
        (inner.notify.clone(), update)
    };
    if let Some(display) = update {
        notify.emit(HostEvent::Url(display));
    }
}

fn prune_requests(weak: &WeakHost) {
    let Some(shared) = weak.upgrade() else { return };
    let mut inner = shared.borrow_mut();
    if let Some(session) = inner.session.as_mut() {
        log_unanswered(session.prune_expired(js_sys::Date::now()));
    }
}

fn log_unanswered(expired: Vec<PendingNavigation>) {
    for pending in expired {
        log::debug!("no answer to {} request {}", pending.command.as_str(), pending.request_id);
    }
}

fn on_window_message(weak: &WeakHost, event: MessageEvent) {
    let Some(shared) = weak.upgrade() else { return };

    let from_frame = match (event.source(), shared.borrow().iframe.content_window()) {
        (Some(source), Some(frame)) => Object::is(source.as_ref(), frame.as_ref()),
        _ => false,
    };
    if !from_frame {
        return;
    }

    let Ok(value) = serde_wasm_bindgen::from_value::<serde_json::Value>(event.data()) else {
        return;
    };
    let message = match decode_frame_message(value) {
        Ok(message) => message,
        Err(e) if e.is_foreign() => return,
        Err(e) => {
            log::warn!("rejected frame message: {}", e);
            return;
        }
    };

    let now = js_sys::Date::now();
    let (notify, update) = {
        let mut inner = shared.borrow_mut();
        let Some(session) = inner.session.as_mut() else {
            return;
        };
        let update = match session.handle_frame_message(message, now) {
            SessionEvent::UrlChanged { url, .. } => Some(HostEvent::Url(DisplayUrl::Url(url))),
            SessionEvent::NavigationStateChanged(state) => Some(HostEvent::Navigation(state)),
            SessionEvent::CommandResolved(resolved) => {
                if let Some(at) = resolved.refresh_state_at {
                    inner.schedule_state_refresh((at - now).max(0.0) as u32, weak);
                }
                None
            }
            SessionEvent::StaleUrl | SessionEvent::UnmatchedResult => None,
        };
        (inner.notify.clone(), update)
    };
    if let Some(update) = update {
        notify.emit(update);
    }
}

impl HostInner {
    fn url_sources(&self) -> UrlSources {
        UrlSources {
            // cross-origin frames throw on href; that source is simply absent
            frame_href: self
                .iframe
                .content_window()
                .and_then(|window| window.location().href().ok()),
            iframe_src: Some(self.iframe.src()),
        }
    }

    fn post_to_frame(&self, message: &HostMessage) {
        let Some(target) = self.iframe.content_window() else {
            return;
        };
        let serializer = serde_wasm_bindgen::Serializer::json_compatible();
        let result = message
            .serialize(&serializer)
            .map_err(|e| JsValue::from_str(&e.to_string()))
            .and_then(|value| target.post_message(&value, TARGET_ORIGIN));
        if let Err(e) = result {
            log::debug!("postMessage to frame failed: {:?}", e);
        }
    }

    fn schedule_state_refresh(&mut self, delay_ms: u32, weak: &WeakHost) {
        let weak = weak.clone();
        self.session_timers.push(Timeout::new(delay_ms, move || {
            if let Some(shared) = weak.upgrade() {
                shared.borrow().post_to_frame(&HostMessage::GetNavigationState);
            }
        }));
    }

    fn observe_src(&mut self, weak: &WeakHost) {
        let weak = weak.clone();
        let callback = Closure::wrap(Box::new(move |_: Array, _: MutationObserver| {
            poll_frame(&weak);
        }) as Box<dyn FnMut(Array, MutationObserver)>);

        let observer = match MutationObserver::new(callback.as_ref().unchecked_ref()) {
            Ok(observer) => observer,
            Err(e) => {
                log::warn!("src observer unavailable: {:?}", e);
                return;
            }
        };
        let init = MutationObserverInit::new();
        init.set_attributes(true);
        init.set_attribute_filter(&Array::of1(&JsValue::from_str("src")));
        if let Err(e) = observer.observe_with_options(&self.iframe, &init) {
            log::warn!("src observer not attached: {:?}", e);
        }
        self.src_observer = Some((observer, callback));
    }

    fn disconnect_observer(&mut self) {
        if let Some((observer, _callback)) = self.src_observer.take() {
            observer.disconnect();
        }
    }

    fn release_bypass(&mut self) {
        if let Some(url) = self.bypass_url.take() {
            send_bypass(RuntimeRequest::DisableFrameBypass { url });
        }
    }

    fn apply(&mut self, effect: LifecycleEffect, weak: &WeakHost, events: &mut Vec<HostEvent>) {
        match effect {
            LifecycleEffect::DetachFrameHandlers => {
                self.iframe.set_onload(None);
                self.iframe.set_onerror(None);
                self.onload = None;
                self.onerror = None;
            }
            LifecycleEffect::AttachFrameHandlers => {
                let load_weak = weak.clone();
                let onload = Closure::wrap(Box::new(move |_: Event| {
                    on_frame_load(&load_weak);
                }) as Box<dyn FnMut(Event)>);
                let error_weak = weak.clone();
                let onerror = Closure::wrap(Box::new(move |_: Event| {
                    dispatch(&error_weak, |lifecycle, now| lifecycle.on_error(now));
                }) as Box<dyn FnMut(Event)>);

                self.iframe.set_onload(Some(onload.as_ref().unchecked_ref()));
                self.iframe.set_onerror(Some(onerror.as_ref().unchecked_ref()));
                self.onload = Some(onload);
                self.onerror = Some(onerror);
            }
            LifecycleEffect::SetSrc(url) => {
                self.release_bypass();
                self.bypass_url = Some(url.clone());
                send_bypass(RuntimeRequest::EnableFrameBypass { url: url.clone() });
                self.iframe.set_src(&url);
            }
            LifecycleEffect::ArmLoadTimer { timeout_ms } => {
                let weak = weak.clone();
                self.load_timer = Some(Timeout::new(timeout_ms, move || {
                    dispatch(&weak, |lifecycle, _| lifecycle.on_timeout());
                }));
            }
            LifecycleEffect::CancelLoadTimer => self.load_timer = None,
            LifecycleEffect::SendTracking { enabled, delay_ms } => {
                let message = HostMessage::EnableTracking { enabled };
                // a disable or a fresh schedule drops sends still pending
                if !enabled || delay_ms == 0 {
                    self.tracking_sends.clear();
                }
                if delay_ms == 0 {
                    self.post_to_frame(&message);
                } else {
                    let weak = weak.clone();
                    self.tracking_sends.push(Timeout::new(delay_ms, move || {
                        if let Some(shared) = weak.upgrade() {
                            shared.borrow().post_to_frame(&message);
                        }
                    }));
                }
            }
            LifecycleEffect::StartTracking { site_url } => {
                self.session = Some(NavigationSession::new(&site_url, &self.config));
                let poll_weak = weak.clone();
                self.poller = Some(Interval::new(self.config.host_poll_interval_ms, move || {
                    poll_frame(&poll_weak);
                }));
                self.observe_src(weak);
                self.post_to_frame(&HostMessage::GetNavigationState);
                events.push(HostEvent::Url(DisplayUrl::Loading));
            }
            LifecycleEffect::StopTracking => {
                if let Some(mut session) = self.session.take() {
                    session.dispose();
                }
                self.poller = None;
                self.disconnect_observer();
                self.tracking_sends.clear();
                self.session_timers.clear();
                events.push(HostEvent::Url(DisplayUrl::Loading));
                events.push(HostEvent::Navigation(NavigationState::default()));
            }
            LifecycleEffect::RequestNavigationState => {
                self.post_to_frame(&HostMessage::GetNavigationState);
            }
            LifecycleEffect::ClearSrc => {
                self.iframe.set_src(ABOUT_BLANK);
                self.release_bypass();
            }
            LifecycleEffect::OpenInNewTab(url) => spawn_local(async move {
                if let Err(e) = open_in_new_tab(&url).await {
                    log::error!("{}", e);
                }
            }),
            LifecycleEffect::OpenExternally { url, mode } => spawn_local(async move {
                if let Err(e) = open_url(&url, mode).await {
                    log::error!("{}", e);
                }
            }),
            LifecycleEffect::ShowMessage { text, duration_ms } => {
                events.push(HostEvent::Toast(Some(text)));
                let weak = weak.clone();
                self.toast_timer = Some(Timeout::new(duration_ms, move || {
                    if let Some(shared) = weak.upgrade() {
                        let notify = shared.borrow().notify.clone();
                        notify.emit(HostEvent::Toast(None));
                    }
                }));
            }
            LifecycleEffect::ReturnToListAfter { delay_ms } => {
                let weak = weak.clone();
                self.return_timer = Some(Timeout::new(delay_ms, move || {
                    dispatch(&weak, |lifecycle, _| lifecycle.back_to_list());
                }));
            }
        }
    }
}

impl FrameHost {
    pub fn attach(
        iframe: HtmlIFrameElement,
        config: TimingConfig,
        notify: Callback<HostEvent>,
    ) -> LauncherResult<Self> {
        let window = web_sys::window().ok_or(LauncherError::NoWindow)?;

        let inner = Rc::new(RefCell::new(HostInner {
            iframe,
            lifecycle: IframeLifecycle::new(config.clone()),
            config,
            session: None,
            notify,
            onload: None,
            onerror: None,
            load_timer: None,
            return_timer: None,
            toast_timer: None,
            tracking_sends: Vec::new(),
            session_timers: Vec::new(),
            poller: None,
            src_observer: None,
            bypass_url: None,
        }));

        let weak = Rc::downgrade(&inner);
        let message_listener = Closure::wrap(Box::new(move |event: MessageEvent| {
            on_window_message(&weak, event);
        }) as Box<dyn FnMut(MessageEvent)>);
        window
            .add_event_listener_with_callback("message", message_listener.as_ref().unchecked_ref())
            .map_err(|e| LauncherError::Runtime(format!("message listener: {:?}", e)))?;

        Ok(FrameHost {
            inner,
            window,
            message_listener,
        })
    }

    pub fn open(&self, site: &BookmarkedSite) {
        let effects = self.inner.borrow_mut().lifecycle.open(site, js_sys::Date::now());
        run(&self.inner, effects);
    }

    pub fn back_to_list(&self) {
        let effects = self.inner.borrow_mut().lifecycle.back_to_list();
        run(&self.inner, effects);
    }

    /// Ask the frame to go back or forward. `false` when nothing is loaded.
    pub fn navigate(&self, command: NavCommand) -> bool {
        let weak = Rc::downgrade(&self.inner);
        let mut inner = self.inner.borrow_mut();
        let ttl = inner.config.pending_request_ttl_ms;
        let Some(session) = inner.session.as_mut() else {
            return false;
        };

        let now = js_sys::Date::now();
        log_unanswered(session.prune_expired(now));
        let message = session.request_navigation(command, now);
        inner.post_to_frame(&message);
        // one past the ttl so clock rounding cannot leave the entry alive
        inner
            .session_timers
            .push(Timeout::new(ttl.saturating_add(1), move || prune_requests(&weak)));
        true
    }

    pub fn view_state(&self) -> ViewState {
        self.inner.borrow().lifecycle.state().clone()
    }

    /// Whether a navigation session, host poller or src observer is alive
    pub fn is_tracking(&self) -> bool {
        let inner = self.inner.borrow();
        inner.session.is_some() || inner.poller.is_some() || inner.src_observer.is_some()
    }

    /// Navigation requests still waiting for a result
    pub fn pending_requests(&self) -> usize {
        self.inner
            .borrow()
            .session
            .as_ref()
            .map_or(0, |session| session.pending_requests())
    }

    /// Blank the frame, then restore whatever it pointed at
    pub fn refresh(&self) {
        let plan = {
            let inner = self.inner.borrow();
            let src = inner.iframe.src();
            inner.session.as_ref().and_then(|session| session.plan_refresh(&src))
        };
        let Some(plan) = plan else { return };

        let effects = self.inner.borrow_mut().lifecycle.reload(js_sys::Date::now());
        run(&self.inner, effects);

        let weak = Rc::downgrade(&self.inner);
        let mut inner = self.inner.borrow_mut();
        inner.iframe.set_src(plan.blank_url);
        let restore_url = plan.restore_url;
        inner.session_timers.push(Timeout::new(plan.restore_after_ms, move || {
            if let Some(shared) = weak.upgrade() {
                shared.borrow().iframe.set_src(&restore_url);
            }
        }));
    }

    /// Flash a message that clears itself after the fallback delay
    pub fn show_message(&self, text: &str) {
        let duration_ms = self.inner.borrow().config.fallback_message_ms;
        let effect = LifecycleEffect::ShowMessage {
            text: text.to_string(),
            duration_ms,
        };
        run(&self.inner, vec![effect]);
    }

    /// Best known URL of the embedded page
    pub fn current_url(&self) -> Option<String> {
        let inner = self.inner.borrow();
        let from_session = inner.session.as_ref().and_then(|session| {
            session
                .reconcile(&inner.url_sources())
                .url()
                .map(str::to_string)
        });
        from_session.or_else(|| match inner.lifecycle.state() {
            ViewState::Loading { url, .. } | ViewState::Loaded { url, .. } => Some(url.clone()),
            ViewState::List | ViewState::Error { .. } => None,
        })
    }

    pub fn open_current_in_tab(&self) {
        if let Some(url) = self.current_url() {
            spawn_local(async move {
                if let Err(e) = open_in_new_tab(&url).await {
                    log::error!("{}", e);
                }
            });
        }
    }
}

impl Drop for FrameHost {
    fn drop(&mut self) {
        let _ = self
            .window
            .remove_event_listener_with_callback("message", self.message_listener.as_ref().unchecked_ref());

        let weak = Rc::downgrade(&self.inner);
        let mut inner = self.inner.borrow_mut();
        let effects = inner.lifecycle.back_to_list();
        let mut unmounted = Vec::new();
        for effect in effects {
            inner.apply(effect, &weak, &mut unmounted);
        }
        inner.load_timer = None;
        inner.return_timer = None;
        inner.toast_timer = None;
        inner.disconnect_observer();
    }
}
