/// Timing constants and storage keys shared by the host page and the frame bridge

/// chrome.storage.local key (and localStorage mirror key) for the side panel settings
pub const SIDEPANEL_SETTINGS_KEY: &str = "sidepanel_settings";

/// Blank document used to tear an iframe down or force a reload
pub const ABOUT_BLANK: &str = "about:blank";

/// Placeholder shown while no URL source is available
pub const LOADING_LABEL: &str = "Loading…";

/// Every delay used by the navigation bridge, the lifecycle manager and the relay.
///
/// All values are milliseconds. The host page and the frame bridge both build
/// their runtime from `TimingConfig::default()`, so the two sides agree on the
/// debounce and poll cadence without any handshake.
#[derive(Debug, Clone, PartialEq)]
pub struct TimingConfig {
    /// Fallback URL poll inside the frame while tracking is enabled
    pub bridge_poll_interval_ms: u32,
    /// Trailing debounce applied to history/hash/load events inside the frame
    pub report_debounce_ms: u32,
    /// Delay between enabling tracking and the first report
    pub initial_report_delay_ms: u32,
    /// Host-side poll of iframe.src / same-origin location
    pub host_poll_interval_ms: u32,
    /// Time an iframe gets to fire onload before it counts as failed
    pub load_timeout_ms: u32,
    /// Offsets at which SIDEPANEL_ENABLE_TRACKING is re-sent after onload
    pub enable_tracking_schedule_ms: Vec<u32>,
    /// Lifetime of an unacknowledged navigation request
    pub pending_request_ttl_ms: u32,
    /// Delay before asking the frame for its history state after a successful command
    pub state_refresh_delay_ms: u32,
    /// Gap between blanking the iframe and restoring its URL on refresh
    pub refresh_restore_delay_ms: u32,
    /// How long the fallback toast stays up before the view returns to the list
    pub fallback_message_ms: u32,
    /// An onerror this soon after src was set is reported as a blocked frame
    pub frame_blocked_window_ms: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        TimingConfig {
            bridge_poll_interval_ms: 1_500,
            report_debounce_ms: 50,
            initial_report_delay_ms: 100,
            host_poll_interval_ms: 1_000,
            load_timeout_ms: 10_000,
            enable_tracking_schedule_ms: vec![0, 500, 1_500, 3_000],
            pending_request_ttl_ms: 5_000,
            state_refresh_delay_ms: 200,
            refresh_restore_delay_ms: 100,
            fallback_message_ms: 2_500,
            frame_blocked_window_ms: 1_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timings() {
        let config = TimingConfig::default();

        assert_eq!(config.bridge_poll_interval_ms, 1_500);
        assert_eq!(config.report_debounce_ms, 50);
        assert_eq!(config.load_timeout_ms, 10_000);
        assert_eq!(config.enable_tracking_schedule_ms, vec![0, 500, 1_500, 3_000]);
        assert_eq!(config.pending_request_ttl_ms, 5_000);
    }

    #[test]
    fn test_first_report_lands_inside_two_hundred_ms() {
        let config = TimingConfig::default();
        assert!(config.initial_report_delay_ms.max(config.report_debounce_ms) < 200);
    }
}
