//! One navigation session per open iframe view.
//!
//! Owns everything that used to live in page-wide variables: the URL the
//! bridge last reported, the URL the poller last saw, the frame's history
//! capability and the pending command relay. `NavigationSession::new` is
//! called when a site is opened in the frame and `dispose` when the view goes
//! back to the list.

use crate::config::{TimingConfig, ABOUT_BLANK, LOADING_LABEL};
use crate::protocol::{FrameMessage, HostMessage, NavCommand};
use crate::relay::{CommandRelay, PendingNavigation, RefreshPlan, Resolved};

/// What the current-URL label shows
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayUrl {
    Url(String),
    Loading,
}

impl DisplayUrl {
    pub fn label(&self) -> &str {
        match self {
            DisplayUrl::Url(url) => url,
            DisplayUrl::Loading => LOADING_LABEL,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            DisplayUrl::Url(url) => Some(url),
            DisplayUrl::Loading => None,
        }
    }
}

/// URL sources the host can read directly from the iframe element
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UrlSources {
    /// `contentWindow.location.href`; `None` when blocked by CORS
    pub frame_href: Option<String>,
    /// `iframe.src`
    pub iframe_src: Option<String>,
}

/// Frame history capability as last reported
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NavigationState {
    pub can_go_back: bool,
    pub can_go_forward: bool,
}

/// What a frame message changed
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    UrlChanged { url: String, title: String },
    /// Older than a URL already accepted
    StaleUrl,
    NavigationStateChanged(NavigationState),
    CommandResolved(Resolved),
    UnmatchedResult,
}

fn usable(url: Option<&str>) -> Option<&str> {
    url.filter(|u| !u.is_empty() && *u != ABOUT_BLANK)
}

#[derive(Debug)]
pub struct NavigationSession {
    site_url: String,
    /// Last URL reported over the bridge
    current_url: Option<String>,
    current_url_at: f64,
    /// Last reconciled value seen by the poller
    last_known_url: Option<String>,
    displayed: DisplayUrl,
    title: Option<String>,
    nav_state: NavigationState,
    relay: CommandRelay,
    disposed: bool,
}

impl NavigationSession {
    pub fn new(site_url: &str, config: &TimingConfig) -> Self {
        NavigationSession {
            site_url: site_url.to_string(),
            current_url: None,
            current_url_at: f64::NEG_INFINITY,
            last_known_url: None,
            displayed: DisplayUrl::Loading,
            title: None,
            nav_state: NavigationState::default(),
            relay: CommandRelay::new(config),
            disposed: false,
        }
    }

    pub fn site_url(&self) -> &str {
        &self.site_url
    }

    pub fn displayed(&self) -> &DisplayUrl {
        &self.displayed
    }

    pub fn current_url(&self) -> Option<&str> {
        self.current_url.as_deref()
    }

    pub fn last_known_url(&self) -> Option<&str> {
        self.last_known_url.as_deref()
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn navigation_state(&self) -> NavigationState {
        self.nav_state
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Pick the best URL source, first match wins:
    /// same-origin location, `iframe.src`, bridge report, placeholder.
    pub fn reconcile(&self, sources: &UrlSources) -> DisplayUrl {
        usable(sources.frame_href.as_deref())
            .or_else(|| usable(sources.iframe_src.as_deref()))
            .or_else(|| usable(self.current_url.as_deref()))
            .map(|url| DisplayUrl::Url(url.to_string()))
            .unwrap_or(DisplayUrl::Loading)
    }

    /// Poller tick. Returns the new label only when the reconciled value moved.
    pub fn poll(&mut self, sources: &UrlSources) -> Option<DisplayUrl> {
        if self.disposed {
            return None;
        }

        let reconciled = self.reconcile(sources);
        let seen = reconciled.url().map(str::to_string);
        if seen == self.last_known_url {
            return None;
        }

        self.last_known_url = seen;
        self.displayed = reconciled.clone();
        Some(reconciled)
    }

    /// Apply a validated frame message
    pub fn handle_frame_message(&mut self, message: FrameMessage, now: f64) -> SessionEvent {
        match message {
            FrameMessage::UrlChange {
                url,
                title,
                timestamp,
            } => {
                if self.disposed || timestamp < self.current_url_at {
                    return SessionEvent::StaleUrl;
                }
                self.current_url_at = timestamp;
                self.current_url = Some(url.clone());
                self.title = (!title.is_empty()).then(|| title.clone());
                self.displayed = DisplayUrl::Url(url.clone());
                SessionEvent::UrlChanged { url, title }
            }
            FrameMessage::NavigationState {
                can_go_back,
                can_go_forward,
            } => {
                self.nav_state = NavigationState {
                    can_go_back,
                    can_go_forward,
                };
                SessionEvent::NavigationStateChanged(self.nav_state)
            }
            FrameMessage::NavigationResult {
                request_id,
                success,
                reason,
                ..
            } => match self.relay.resolve(&request_id, success, now) {
                Some(resolved) => {
                    if let Some(reason) = reason.filter(|_| !success) {
                        log::info!("frame declined {}: {}", resolved.command.as_str(), reason);
                    }
                    SessionEvent::CommandResolved(resolved)
                }
                None => SessionEvent::UnmatchedResult,
            },
        }
    }

    /// Back/forward go through the frame; returns the message to post
    pub fn request_navigation(&mut self, command: NavCommand, now: f64) -> HostMessage {
        self.relay.request(command, now)
    }

    /// Refresh is host-only: reload whatever the iframe points at
    pub fn plan_refresh(&self, iframe_src: &str) -> Option<RefreshPlan> {
        self.relay.plan_refresh(iframe_src)
    }

    pub fn prune_expired(&mut self, now: f64) -> Vec<PendingNavigation> {
        self.relay.prune_expired(now)
    }

    pub fn pending_requests(&self) -> usize {
        self.relay.pending_len()
    }

    /// Reset to the empty state; later messages and polls are ignored
    pub fn dispose(&mut self) {
        self.current_url = None;
        self.last_known_url = None;
        self.title = None;
        self.displayed = DisplayUrl::Loading;
        self.nav_state = NavigationState::default();
        self.relay.clear();
        self.disposed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SITE: &str = "https://example.com/";

    fn session() -> NavigationSession {
        NavigationSession::new(SITE, &TimingConfig::default())
    }

    fn url_change(url: &str, timestamp: f64) -> FrameMessage {
        FrameMessage::UrlChange {
            url: url.to_string(),
            title: String::new(),
            timestamp,
        }
    }

    fn sources(frame_href: Option<&str>, iframe_src: Option<&str>) -> UrlSources {
        UrlSources {
            frame_href: frame_href.map(str::to_string),
            iframe_src: iframe_src.map(str::to_string),
        }
    }

    #[test]
    fn test_reconcile_order() {
        let mut session = session();
        session.handle_frame_message(url_change("https://example.com/bridge", 1.0), 1.0);

        assert_eq!(
            session.reconcile(&sources(Some("https://example.com/same-origin"), Some(SITE))),
            DisplayUrl::Url("https://example.com/same-origin".to_string())
        );
        assert_eq!(
            session.reconcile(&sources(None, Some(SITE))),
            DisplayUrl::Url(SITE.to_string())
        );
        assert_eq!(
            session.reconcile(&sources(Some(ABOUT_BLANK), Some(ABOUT_BLANK))),
            DisplayUrl::Url("https://example.com/bridge".to_string())
        );
    }

    #[test]
    fn test_reconcile_falls_back_to_loading() {
        let session = session();

        let display = session.reconcile(&sources(None, Some("")));

        assert_eq!(display, DisplayUrl::Loading);
        assert_eq!(display.label(), LOADING_LABEL);
    }

    #[test]
    fn test_poll_reports_only_changes() {
        let mut session = session();
        let cross_origin = sources(None, Some(SITE));

        assert_eq!(session.poll(&cross_origin), Some(DisplayUrl::Url(SITE.to_string())));
        assert_eq!(session.poll(&cross_origin), None);
        assert_eq!(session.last_known_url(), Some(SITE));

        let moved = sources(Some("https://example.com/next"), Some(SITE));
        assert_eq!(
            session.poll(&moved),
            Some(DisplayUrl::Url("https://example.com/next".to_string()))
        );
    }

    #[test]
    fn test_poll_does_not_override_bridge_report() {
        let mut session = session();
        let cross_origin = sources(None, Some(SITE));
        session.poll(&cross_origin);

        session.handle_frame_message(url_change("https://example.com/deep", 10.0), 10.0);
        assert_eq!(session.poll(&cross_origin), None);

        assert_eq!(session.displayed().label(), "https://example.com/deep");
    }

    #[test]
    fn test_url_changes_last_write_wins() {
        let mut session = session();

        for (i, hash) in ["#1", "#2", "#3"].iter().enumerate() {
            let url = format!("https://example.com/{}", hash);
            session.handle_frame_message(url_change(&url, i as f64), i as f64);
        }

        assert_eq!(session.displayed().label(), "https://example.com/#3");
        assert_eq!(session.current_url(), Some("https://example.com/#3"));
    }

    #[test]
    fn test_reordered_url_change_is_stale() {
        let mut session = session();

        session.handle_frame_message(url_change("https://example.com/#3", 30.0), 31.0);
        let event = session.handle_frame_message(url_change("https://example.com/#2", 20.0), 32.0);

        assert_eq!(event, SessionEvent::StaleUrl);
        assert_eq!(session.displayed().label(), "https://example.com/#3");
    }

    #[test]
    fn test_url_change_keeps_title() {
        let mut session = session();

        let event = session.handle_frame_message(
            FrameMessage::UrlChange {
                url: SITE.to_string(),
                title: "Example Domain".to_string(),
                timestamp: 1.0,
            },
            1.0,
        );

        assert!(matches!(event, SessionEvent::UrlChanged { .. }));
        assert_eq!(session.title(), Some("Example Domain"));
    }

    #[test]
    fn test_navigation_state() {
        let mut session = session();

        let event = session.handle_frame_message(
            FrameMessage::NavigationState {
                can_go_back: true,
                can_go_forward: false,
            },
            0.0,
        );

        let expected = NavigationState {
            can_go_back: true,
            can_go_forward: false,
        };
        assert_eq!(event, SessionEvent::NavigationStateChanged(expected));
        assert_eq!(session.navigation_state(), expected);
    }

    #[test]
    fn test_back_round_trip() {
        let mut session = session();

        let request_id = match session.request_navigation(NavCommand::Back, 100.0) {
            HostMessage::Navigate { request_id, .. } => request_id,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(session.pending_requests(), 1);

        let event = session.handle_frame_message(
            FrameMessage::NavigationResult {
                request_id,
                success: true,
                command: NavCommand::Back,
                reason: None,
            },
            250.0,
        );

        assert_eq!(
            event,
            SessionEvent::CommandResolved(Resolved {
                command: NavCommand::Back,
                success: true,
                refresh_state_at: Some(450.0),
            })
        );
        assert_eq!(session.pending_requests(), 0);
    }

    #[test]
    fn test_forged_result_is_unmatched() {
        let mut session = session();

        let event = session.handle_frame_message(
            FrameMessage::NavigationResult {
                request_id: "nobody-asked".to_string(),
                success: true,
                command: NavCommand::Back,
                reason: None,
            },
            0.0,
        );

        assert_eq!(event, SessionEvent::UnmatchedResult);
    }

    #[test]
    fn test_pending_requests_pruned() {
        let mut session = session();
        session.request_navigation(NavCommand::Back, 0.0);

        assert_eq!(session.prune_expired(5_000.0).len(), 1);
        assert_eq!(session.pending_requests(), 0);
    }

    #[test]
    fn test_unanswered_request_swept_by_next_request() {
        let mut session = session();
        session.request_navigation(NavCommand::Back, 1.0);

        // timer callback observed the clock a millisecond early
        assert!(session.prune_expired(5_000.0).is_empty());
        assert_eq!(session.pending_requests(), 1);

        assert_eq!(session.prune_expired(6_000.0).len(), 1);
        session.request_navigation(NavCommand::Forward, 6_000.0);
        assert_eq!(session.pending_requests(), 1);
        assert!(session.prune_expired(6_001.0).is_empty());
    }

    #[test]
    fn test_dispose_resets_everything() {
        let mut session = session();
        session.poll(&sources(None, Some(SITE)));
        session.handle_frame_message(url_change("https://example.com/x", 1.0), 1.0);
        session.request_navigation(NavCommand::Back, 1.0);

        session.dispose();

        assert!(session.is_disposed());
        assert_eq!(session.current_url(), None);
        assert_eq!(session.last_known_url(), None);
        assert_eq!(session.displayed(), &DisplayUrl::Loading);
        assert_eq!(session.pending_requests(), 0);

        assert_eq!(session.poll(&sources(None, Some(SITE))), None);
        assert_eq!(
            session.handle_frame_message(url_change("https://example.com/y", 2.0), 2.0),
            SessionEvent::StaleUrl
        );
    }
}
