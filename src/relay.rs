//! Host-side relay for back/forward/refresh.
//!
//! Commands posted into a cross-origin frame have no delivery confirmation;
//! the frame may or may not answer. The relay therefore only promises that it
//! never holds on to an unanswered request for longer than the TTL.

use crate::config::{TimingConfig, ABOUT_BLANK};
use crate::protocol::{HostMessage, NavCommand};
use std::collections::HashMap;
use uuid::Uuid;

/// A command posted into the frame and not yet answered
#[derive(Debug, Clone, PartialEq)]
pub struct PendingNavigation {
    pub request_id: String,
    pub command: NavCommand,
    pub timestamp: f64,
}

/// Outcome of matching a SIDEPANEL_NAVIGATION_RESULT to its request
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub command: NavCommand,
    pub success: bool,
    /// When to ask the frame for its history state again
    pub refresh_state_at: Option<f64>,
}

/// Host-side refresh: blank the frame, then put the URL back
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshPlan {
    pub blank_url: &'static str,
    pub restore_url: String,
    pub restore_after_ms: u32,
}

#[derive(Debug)]
pub struct CommandRelay {
    pending: HashMap<String, PendingNavigation>,
    ttl_ms: f64,
    state_refresh_delay_ms: f64,
    refresh_restore_delay_ms: u32,
}

impl CommandRelay {
    pub fn new(config: &TimingConfig) -> Self {
        CommandRelay {
            pending: HashMap::new(),
            ttl_ms: f64::from(config.pending_request_ttl_ms),
            state_refresh_delay_ms: f64::from(config.state_refresh_delay_ms),
            refresh_restore_delay_ms: config.refresh_restore_delay_ms,
        }
    }

    /// Record a command that needs the frame's cooperation and build the message to post
    pub fn request(&mut self, command: NavCommand, now: f64) -> HostMessage {
        let request_id = Uuid::new_v4().to_string();
        self.pending.insert(
            request_id.clone(),
            PendingNavigation {
                request_id: request_id.clone(),
                command,
                timestamp: now,
            },
        );

        HostMessage::Navigate {
            command,
            request_id,
        }
    }

    /// Match a result to its pending request.
    ///
    /// Results for unknown or already-expired requests return `None`.
    pub fn resolve(&mut self, request_id: &str, success: bool, now: f64) -> Option<Resolved> {
        let entry = self.pending.remove(request_id)?;
        if now - entry.timestamp >= self.ttl_ms {
            log::debug!("late result for {} request {}", entry.command.as_str(), request_id);
            return None;
        }

        Some(Resolved {
            command: entry.command,
            success,
            refresh_state_at: success.then_some(now + self.state_refresh_delay_ms),
        })
    }

    /// Drop every request older than the TTL and return them
    pub fn prune_expired(&mut self, now: f64) -> Vec<PendingNavigation> {
        let ttl = self.ttl_ms;
        let expired_ids: Vec<String> = self
            .pending
            .values()
            .filter(|p| now - p.timestamp >= ttl)
            .map(|p| p.request_id.clone())
            .collect();

        let expired: Vec<PendingNavigation> = expired_ids
            .iter()
            .filter_map(|id| self.pending.remove(id))
            .collect();

        for entry in &expired {
            log::debug!(
                "{} request {} expired without a result",
                entry.command.as_str(),
                entry.request_id
            );
        }
        expired
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, request_id: &str) -> bool {
        self.pending.contains_key(request_id)
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Plan a full reload of `current_src`; nothing to do for a blank frame
    pub fn plan_refresh(&self, current_src: &str) -> Option<RefreshPlan> {
        if current_src.is_empty() || current_src == ABOUT_BLANK {
            return None;
        }

        Some(RefreshPlan {
            blank_url: ABOUT_BLANK,
            restore_url: current_src.to_string(),
            restore_after_ms: self.refresh_restore_delay_ms,
        })
    }
}
