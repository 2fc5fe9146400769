//! URL reporting core of the bridge that runs inside the embedded frame.
//!
//! The frame cannot be inspected from the side panel when it is cross-origin,
//! so it reports its own location. This type holds the decision logic only:
//! the wasm runtime in `bridge_runtime` feeds it events, a location snapshot
//! and the current time, then performs whatever it returns.

use crate::config::{TimingConfig, ABOUT_BLANK};
use crate::protocol::{FrameMessage, HostMessage, NavCommand};

/// What the frame looks like right now
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSnapshot {
    pub url: String,
    pub title: String,
    pub can_go_back: bool,
    pub can_go_forward: bool,
}

/// Side effects requested from the runtime, in order
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeAction {
    Post(FrameMessage),
    GoBack,
    GoForward,
    Reload,
}

#[derive(Debug)]
pub struct NavigationBridge {
    config: TimingConfig,
    enabled: bool,
    last_reported: Option<String>,
    report_due_at: Option<f64>,
    /// Entries ahead of us that our own back commands created
    forward_entries: u32,
}

impl NavigationBridge {
    pub fn new(config: TimingConfig) -> Self {
        NavigationBridge {
            config,
            enabled: false,
            last_reported: None,
            report_due_at: None,
            forward_entries: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// When the pending debounced report should fire, if any
    pub fn report_due_at(&self) -> Option<f64> {
        self.report_due_at
    }

    /// React to a validated message from the side panel
    pub fn handle_host_message(
        &mut self,
        message: HostMessage,
        snapshot: &FrameSnapshot,
        now: f64,
    ) -> Vec<BridgeAction> {
        match message {
            HostMessage::EnableTracking { enabled: true } => {
                if !self.enabled {
                    log::debug!("URL tracking enabled");
                }
                self.enabled = true;
                // Repeated enables are expected; keep an earlier pending report
                let due = now + f64::from(self.config.initial_report_delay_ms);
                self.report_due_at = Some(self.report_due_at.map_or(due, |at| at.min(due)));
                Vec::new()
            }
            HostMessage::EnableTracking { enabled: false } => {
                log::debug!("URL tracking disabled");
                self.enabled = false;
                self.report_due_at = None;
                self.last_reported = None;
                Vec::new()
            }
            HostMessage::GetNavigationState => {
                vec![BridgeAction::Post(navigation_state(&self.effective(snapshot)))]
            }
            HostMessage::Navigate {
                command,
                request_id,
            } => {
                let actions = navigate(command, request_id, &self.effective(snapshot));
                if actions.contains(&BridgeAction::GoBack) {
                    self.forward_entries += 1;
                } else if actions.contains(&BridgeAction::GoForward) {
                    self.forward_entries = self.forward_entries.saturating_sub(1);
                }
                actions
            }
        }
    }

    /// The History API hides forward entries; fill in the ones we know of
    fn effective(&self, snapshot: &FrameSnapshot) -> FrameSnapshot {
        FrameSnapshot {
            can_go_forward: snapshot.can_go_forward || self.forward_entries > 0,
            ..snapshot.clone()
        }
    }

    /// `pushState` dropped every forward entry
    pub fn note_new_entry(&mut self, now: f64) {
        self.forward_entries = 0;
        self.note_navigation(now);
    }

    /// A history/hash/load event happened; report once things settle
    pub fn note_navigation(&mut self, now: f64) {
        if self.enabled {
            self.report_due_at = Some(now + f64::from(self.config.report_debounce_ms));
        }
    }

    /// Debounce timer callback
    pub fn on_timer(&mut self, snapshot: &FrameSnapshot, now: f64) -> Option<FrameMessage> {
        match self.report_due_at {
            Some(due) if now >= due => {
                self.report_due_at = None;
                self.report(snapshot, now)
            }
            _ => None,
        }
    }

    /// Periodic fallback check for navigation no event told us about
    pub fn poll(&mut self, snapshot: &FrameSnapshot, now: f64) -> Option<FrameMessage> {
        self.report(snapshot, now)
    }

    fn report(&mut self, snapshot: &FrameSnapshot, now: f64) -> Option<FrameMessage> {
        if !self.enabled || snapshot.url.is_empty() || snapshot.url == ABOUT_BLANK {
            return None;
        }
        if self.last_reported.as_deref() == Some(snapshot.url.as_str()) {
            return None;
        }

        self.last_reported = Some(snapshot.url.clone());
        Some(FrameMessage::UrlChange {
            url: snapshot.url.clone(),
            title: snapshot.title.clone(),
            timestamp: now,
        })
    }
}

fn navigation_state(snapshot: &FrameSnapshot) -> FrameMessage {
    FrameMessage::NavigationState {
        can_go_back: snapshot.can_go_back,
        can_go_forward: snapshot.can_go_forward,
    }
}

fn navigate(command: NavCommand, request_id: String, snapshot: &FrameSnapshot) -> Vec<BridgeAction> {
    let result = |success: bool, reason: Option<&str>| {
        BridgeAction::Post(FrameMessage::NavigationResult {
            request_id: request_id.clone(),
            success,
            command,
            reason: reason.map(str::to_string),
        })
    };

    // Reply before acting: back/reload may tear this document down
    match command {
        NavCommand::Back if snapshot.can_go_back => vec![result(true, None), BridgeAction::GoBack],
        NavCommand::Back => vec![result(false, Some("no_history"))],
        NavCommand::Forward if snapshot.can_go_forward => {
            vec![result(true, None), BridgeAction::GoForward]
        }
        NavCommand::Forward => vec![result(false, Some("no_forward_history"))],
        NavCommand::Refresh => vec![result(true, None), BridgeAction::Reload],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(url: &str) -> FrameSnapshot {
        FrameSnapshot {
            url: url.to_string(),
            title: format!("title of {}", url),
            can_go_back: false,
            can_go_forward: false,
        }
    }

    fn enabled_bridge(now: f64) -> NavigationBridge {
        let mut bridge = NavigationBridge::new(TimingConfig::default());
        let actions = bridge.handle_host_message(
            HostMessage::EnableTracking { enabled: true },
            &snapshot("https://example.com/"),
            now,
        );
        assert!(actions.is_empty());
        bridge
    }

    fn reported_url(message: Option<FrameMessage>) -> Option<String> {
        match message {
            Some(FrameMessage::UrlChange { url, .. }) => Some(url),
            _ => None,
        }
    }

    #[test]
    fn test_disabled_bridge_reports_nothing() {
        let mut bridge = NavigationBridge::new(TimingConfig::default());

        bridge.note_navigation(0.0);

        assert_eq!(bridge.report_due_at(), None);
        assert_eq!(bridge.poll(&snapshot("https://example.com/"), 10.0), None);
    }

    #[test]
    fn test_enable_schedules_initial_report() {
        let mut bridge = enabled_bridge(1_000.0);
        let page = snapshot("https://example.com/");

        assert_eq!(bridge.report_due_at(), Some(1_100.0));
        assert_eq!(bridge.on_timer(&page, 1_050.0), None);

        let message = bridge.on_timer(&page, 1_100.0).unwrap();
        assert_eq!(
            message,
            FrameMessage::UrlChange {
                url: "https://example.com/".to_string(),
                title: "title of https://example.com/".to_string(),
                timestamp: 1_100.0,
            }
        );
        assert_eq!(bridge.report_due_at(), None);
    }

    #[test]
    fn test_reports_are_deduplicated() {
        let mut bridge = enabled_bridge(0.0);
        let page = snapshot("https://example.com/a");

        assert!(bridge.poll(&page, 10.0).is_some());
        assert_eq!(bridge.poll(&page, 1_510.0), None);
        assert_eq!(bridge.poll(&page, 3_010.0), None);

        bridge.note_navigation(3_100.0);
        assert_eq!(bridge.on_timer(&page, 3_150.0), None);

        let moved = snapshot("https://example.com/b");
        assert_eq!(reported_url(bridge.poll(&moved, 4_510.0)), Some(moved.url));
    }

    #[test]
    fn test_about_blank_is_never_reported() {
        let mut bridge = enabled_bridge(0.0);

        assert_eq!(bridge.on_timer(&snapshot(ABOUT_BLANK), 100.0), None);
        assert_eq!(bridge.poll(&snapshot(ABOUT_BLANK), 1_500.0), None);
        assert_eq!(bridge.poll(&snapshot(""), 3_000.0), None);
    }

    #[test]
    fn test_push_state_right_after_enable_yields_one_report() {
        let mut bridge = enabled_bridge(0.0);

        // pushState one millisecond after the enable message
        bridge.note_navigation(1.0);
        let pushed = snapshot("https://example.com/pushed");

        let due = bridge.report_due_at().unwrap();
        assert!(due <= 200.0);

        let mut messages = Vec::new();
        for now in [due, due + 50.0, 150.0, 199.0] {
            messages.extend(bridge.on_timer(&pushed, now));
        }

        assert_eq!(messages.len(), 1);
        assert_eq!(reported_url(messages.pop()), Some(pushed.url));
    }

    #[test]
    fn test_rapid_hashchanges_report_final_url() {
        let mut bridge = enabled_bridge(0.0);
        assert!(bridge.poll(&snapshot("https://example.com/"), 5.0).is_some());

        bridge.note_navigation(200.0);
        bridge.note_navigation(210.0);
        bridge.note_navigation(220.0);
        assert_eq!(bridge.report_due_at(), Some(270.0));

        // the earlier deadlines were superseded
        assert_eq!(bridge.on_timer(&snapshot("https://example.com/#2"), 250.0), None);

        let message = bridge.on_timer(&snapshot("https://example.com/#3"), 270.0);
        assert_eq!(reported_url(message), Some("https://example.com/#3".to_string()));
    }

    #[test]
    fn test_repeated_enables_do_not_push_report_back() {
        let mut bridge = enabled_bridge(0.0);

        for now in [500.0, 1_500.0, 3_000.0] {
            bridge.handle_host_message(
                HostMessage::EnableTracking { enabled: true },
                &snapshot("https://example.com/"),
                now,
            );
        }

        assert_eq!(bridge.report_due_at(), Some(100.0));
    }

    #[test]
    fn test_disable_clears_pending_and_memory() {
        let mut bridge = enabled_bridge(0.0);
        let page = snapshot("https://example.com/");
        assert!(bridge.poll(&page, 10.0).is_some());

        bridge.handle_host_message(HostMessage::EnableTracking { enabled: false }, &page, 20.0);
        assert!(!bridge.is_enabled());
        assert_eq!(bridge.report_due_at(), None);
        assert_eq!(bridge.poll(&page, 30.0), None);

        bridge.handle_host_message(HostMessage::EnableTracking { enabled: true }, &page, 40.0);
        assert_eq!(reported_url(bridge.on_timer(&page, 140.0)), Some(page.url.clone()));
    }

    #[test]
    fn test_navigation_state_reply() {
        let mut bridge = NavigationBridge::new(TimingConfig::default());
        let mut page = snapshot("https://example.com/");
        page.can_go_back = true;

        let actions = bridge.handle_host_message(HostMessage::GetNavigationState, &page, 0.0);

        assert_eq!(
            actions,
            vec![BridgeAction::Post(FrameMessage::NavigationState {
                can_go_back: true,
                can_go_forward: false
            })]
        );
    }

    #[test]
    fn test_back_command() {
        let mut bridge = NavigationBridge::new(TimingConfig::default());
        let mut page = snapshot("https://example.com/");
        page.can_go_back = true;

        let actions = bridge.handle_host_message(
            HostMessage::Navigate {
                command: NavCommand::Back,
                request_id: "r1".to_string(),
            },
            &page,
            0.0,
        );

        assert_eq!(
            actions,
            vec![
                BridgeAction::Post(FrameMessage::NavigationResult {
                    request_id: "r1".to_string(),
                    success: true,
                    command: NavCommand::Back,
                    reason: None,
                }),
                BridgeAction::GoBack,
            ]
        );
    }

    #[test]
    fn test_back_without_history() {
        let mut bridge = NavigationBridge::new(TimingConfig::default());

        let actions = bridge.handle_host_message(
            HostMessage::Navigate {
                command: NavCommand::Back,
                request_id: "r2".to_string(),
            },
            &snapshot("https://example.com/"),
            0.0,
        );

        assert_eq!(
            actions,
            vec![BridgeAction::Post(FrameMessage::NavigationResult {
                request_id: "r2".to_string(),
                success: false,
                command: NavCommand::Back,
                reason: Some("no_history".to_string()),
            })]
        );
    }

    #[test]
    fn test_forward_available_after_back() {
        let mut bridge = NavigationBridge::new(TimingConfig::default());
        let mut page = snapshot("https://example.com/b");
        page.can_go_back = true;
        let navigate = |command, id: &str| HostMessage::Navigate {
            command,
            request_id: id.to_string(),
        };

        let actions = bridge.handle_host_message(navigate(NavCommand::Forward, "f0"), &page, 0.0);
        assert!(matches!(
            &actions[..],
            [BridgeAction::Post(FrameMessage::NavigationResult { success: false, reason: Some(reason), .. })]
                if reason == "no_forward_history"
        ));

        bridge.handle_host_message(navigate(NavCommand::Back, "b1"), &page, 0.0);
        let actions = bridge.handle_host_message(HostMessage::GetNavigationState, &page, 0.0);
        assert_eq!(
            actions,
            vec![BridgeAction::Post(FrameMessage::NavigationState {
                can_go_back: true,
                can_go_forward: true
            })]
        );

        let actions = bridge.handle_host_message(navigate(NavCommand::Forward, "f1"), &page, 0.0);
        assert_eq!(actions.last(), Some(&BridgeAction::GoForward));

        let actions = bridge.handle_host_message(navigate(NavCommand::Forward, "f2"), &page, 0.0);
        assert_eq!(actions.len(), 1);
    }

    #[test]
    fn test_push_state_drops_forward_entries() {
        let mut bridge = NavigationBridge::new(TimingConfig::default());
        let mut page = snapshot("https://example.com/b");
        page.can_go_back = true;
        bridge.handle_host_message(
            HostMessage::Navigate {
                command: NavCommand::Back,
                request_id: "b1".to_string(),
            },
            &page,
            0.0,
        );

        bridge.note_new_entry(10.0);

        let actions = bridge.handle_host_message(HostMessage::GetNavigationState, &page, 20.0);
        assert_eq!(
            actions,
            vec![BridgeAction::Post(FrameMessage::NavigationState {
                can_go_back: true,
                can_go_forward: false
            })]
        );
    }

    #[test]
    fn test_refresh_command_replies_then_reloads() {
        let mut bridge = NavigationBridge::new(TimingConfig::default());

        let actions = bridge.handle_host_message(
            HostMessage::Navigate {
                command: NavCommand::Refresh,
                request_id: "r3".to_string(),
            },
            &snapshot("https://example.com/"),
            0.0,
        );

        assert_eq!(actions.len(), 2);
        assert!(matches!(actions[0], BridgeAction::Post(FrameMessage::NavigationResult { success: true, .. })));
        assert_eq!(actions[1], BridgeAction::Reload);
    }
}
