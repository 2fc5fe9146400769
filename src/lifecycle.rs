//! Iframe lifecycle: which site the embedded view shows and what happens when
//! it fails to load.
//!
//! Pure state machine. Each transition returns the effects the runtime has to
//! perform (set `src`, arm timers, open a tab...). A failed embed is a fact
//! about one attempt, so none of these effects ever write settings.

use crate::config::TimingConfig;
use crate::site::{BookmarkedSite, OpenMode};

/// Why an embed attempt gave up. Only used for the message shown to the user.
///
/// The kind is inferred from timing alone: browsers raise no distinguishable
/// error for a CSP/X-Frame-Options block versus a DNS failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedFailure {
    NetworkError,
    Timeout,
    FrameBlocked,
}

impl EmbedFailure {
    pub fn as_str(self) -> &'static str {
        match self {
            EmbedFailure::NetworkError => "network_error",
            EmbedFailure::Timeout => "timeout",
            EmbedFailure::FrameBlocked => "frame_blocked",
        }
    }

    pub fn user_message(self) -> &'static str {
        match self {
            EmbedFailure::NetworkError => "Couldn't load this site here. Opening it in a new tab…",
            EmbedFailure::Timeout => "This site is taking too long to load. Opening it in a new tab…",
            EmbedFailure::FrameBlocked => "This site can't be shown in the side panel. Opening it in a new tab…",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewState {
    List,
    Loading {
        site_id: String,
        url: String,
        started_at: f64,
    },
    Loaded {
        site_id: String,
        url: String,
    },
    Error {
        site_id: String,
        url: String,
        failure: EmbedFailure,
    },
}

impl ViewState {
    pub fn name(&self) -> &'static str {
        match self {
            ViewState::List => "LIST",
            ViewState::Loading { .. } => "LOADING",
            ViewState::Loaded { .. } => "LOADED",
            ViewState::Error { .. } => "ERROR",
        }
    }

    pub fn site_id(&self) -> Option<&str> {
        match self {
            ViewState::List => None,
            ViewState::Loading { site_id, .. }
            | ViewState::Loaded { site_id, .. }
            | ViewState::Error { site_id, .. } => Some(site_id),
        }
    }

    pub fn shows_frame(&self) -> bool {
        matches!(self, ViewState::Loading { .. } | ViewState::Loaded { .. })
    }
}

/// Work the runtime has to do, in order
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEffect {
    /// Drop onload/onerror closures from the previous attempt
    DetachFrameHandlers,
    AttachFrameHandlers,
    SetSrc(String),
    ArmLoadTimer { timeout_ms: u32 },
    CancelLoadTimer,
    /// Post SIDEPANEL_ENABLE_TRACKING after `delay_ms`
    SendTracking { enabled: bool, delay_ms: u32 },
    /// Create the navigation session, host poller and src observer
    StartTracking { site_url: String },
    /// Dispose the session, stop the poller, disconnect the observer
    StopTracking,
    /// Post SIDEPANEL_GET_NAVIGATION_STATE to the current document
    RequestNavigationState,
    ClearSrc,
    OpenInNewTab(String),
    OpenExternally { url: String, mode: OpenMode },
    ShowMessage { text: String, duration_ms: u32 },
    ReturnToListAfter { delay_ms: u32 },
}

#[derive(Debug)]
pub struct IframeLifecycle {
    config: TimingConfig,
    state: ViewState,
}

impl IframeLifecycle {
    pub fn new(config: TimingConfig) -> Self {
        IframeLifecycle {
            config,
            state: ViewState::List,
        }
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    /// User clicked a site in the list
    pub fn open(&mut self, site: &BookmarkedSite, now: f64) -> Vec<LifecycleEffect> {
        if !site.opens_in_frame() {
            let effect = match site.open_mode {
                OpenMode::Iframe => LifecycleEffect::OpenInNewTab(site.url.clone()),
                mode => LifecycleEffect::OpenExternally {
                    url: site.url.clone(),
                    mode,
                },
            };
            return vec![effect];
        }

        let mut effects = if self.state == ViewState::List {
            Vec::new()
        } else {
            self.back_to_list()
        };

        log::info!("embedding {} ({})", site.name, site.url);
        effects.extend([
            LifecycleEffect::DetachFrameHandlers,
            LifecycleEffect::AttachFrameHandlers,
            LifecycleEffect::SetSrc(site.url.clone()),
            LifecycleEffect::ArmLoadTimer {
                timeout_ms: self.config.load_timeout_ms,
            },
        ]);
        self.state = ViewState::Loading {
            site_id: site.id.clone(),
            url: site.url.clone(),
            started_at: now,
        };
        effects
    }

    /// iframe onload
    ///
    /// Fires for every document the frame shows, not only the first. A new
    /// document in LOADED brings a fresh bridge that starts disabled, so the
    /// enable schedule goes out again and the session stays.
    pub fn on_load(&mut self) -> Vec<LifecycleEffect> {
        match &self.state {
            ViewState::Loading { site_id, url, .. } => {
                let (site_id, url) = (site_id.clone(), url.clone());
                self.state = ViewState::Loaded {
                    site_id,
                    url: url.clone(),
                };

                let mut effects = vec![LifecycleEffect::CancelLoadTimer];
                effects.extend(self.tracking_schedule());
                effects.push(LifecycleEffect::StartTracking { site_url: url });
                effects
            }
            ViewState::Loaded { .. } => {
                let mut effects = self.tracking_schedule();
                effects.push(LifecycleEffect::RequestNavigationState);
                effects
            }
            // stray loads after an error or in the list
            ViewState::List | ViewState::Error { .. } => Vec::new(),
        }
    }

    fn tracking_schedule(&self) -> Vec<LifecycleEffect> {
        self.config
            .enable_tracking_schedule_ms
            .iter()
            .map(|&delay_ms| LifecycleEffect::SendTracking {
                enabled: true,
                delay_ms,
            })
            .collect()
    }

    /// iframe onerror
    pub fn on_error(&mut self, now: f64) -> Vec<LifecycleEffect> {
        let failure = match &self.state {
            ViewState::Loading { started_at, .. }
                if now - started_at <= f64::from(self.config.frame_blocked_window_ms) =>
            {
                EmbedFailure::FrameBlocked
            }
            ViewState::Loading { .. } | ViewState::Loaded { .. } => EmbedFailure::NetworkError,
            ViewState::List | ViewState::Error { .. } => return Vec::new(),
        };
        self.fail(failure)
    }

    /// Load timer fired
    pub fn on_timeout(&mut self) -> Vec<LifecycleEffect> {
        match self.state {
            ViewState::Loading { .. } => self.fail(EmbedFailure::Timeout),
            _ => Vec::new(),
        }
    }

    fn fail(&mut self, failure: EmbedFailure) -> Vec<LifecycleEffect> {
        let (site_id, url) = match &self.state {
            ViewState::Loading { site_id, url, .. } | ViewState::Loaded { site_id, url } => {
                (site_id.clone(), url.clone())
            }
            _ => return Vec::new(),
        };

        log::warn!("embedding {} failed: {}", url, failure.as_str());
        self.state = ViewState::Error {
            site_id,
            url: url.clone(),
            failure,
        };

        vec![
            LifecycleEffect::CancelLoadTimer,
            LifecycleEffect::DetachFrameHandlers,
            LifecycleEffect::StopTracking,
            LifecycleEffect::ShowMessage {
                text: failure.user_message().to_string(),
                duration_ms: self.config.fallback_message_ms,
            },
            LifecycleEffect::OpenInNewTab(url),
            LifecycleEffect::ReturnToListAfter {
                delay_ms: self.config.fallback_message_ms,
            },
        ]
    }

    /// Host-side refresh of a loaded frame. The document is replaced, so the
    /// next load has to enable tracking again.
    pub fn reload(&mut self, now: f64) -> Vec<LifecycleEffect> {
        let ViewState::Loaded { site_id, url } = &self.state else {
            return Vec::new();
        };

        self.state = ViewState::Loading {
            site_id: site_id.clone(),
            url: url.clone(),
            started_at: now,
        };
        vec![
            LifecycleEffect::StopTracking,
            LifecycleEffect::ArmLoadTimer {
                timeout_ms: self.config.load_timeout_ms,
            },
        ]
    }

    /// User clicked back, or the fallback message ran out
    pub fn back_to_list(&mut self) -> Vec<LifecycleEffect> {
        let was_tracking = matches!(self.state, ViewState::Loaded { .. });
        if self.state == ViewState::List {
            return Vec::new();
        }
        self.state = ViewState::List;

        let mut effects = vec![LifecycleEffect::CancelLoadTimer];
        if was_tracking {
            effects.push(LifecycleEffect::SendTracking {
                enabled: false,
                delay_ms: 0,
            });
        }
        effects.extend([
            LifecycleEffect::StopTracking,
            LifecycleEffect::DetachFrameHandlers,
            LifecycleEffect::ClearSrc,
        ]);
        effects
    }
}
