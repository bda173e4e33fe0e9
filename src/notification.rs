//! Best-effort interaction notifications.
//!
//! Every listener reports what it saw as a `(protocol, message)` pair. Delivery never fails
//! the caller: sinks log their own problems and move on.

use crate::config::{compile_filters, NotificationConfig};
use crate::error::Error;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

pub type DynNotifier = Arc<dyn Notifier + Send + Sync>;

/// A sink for interaction events.
pub trait Notifier {
    fn notify(&self, protocol: &str, message: &str);
}

/// Emits each notification as a `tracing` event on the `notification` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, protocol: &str, message: &str) {
        tracing::info!(target: "notification", protocol, "{message}");
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _protocol: &str, _message: &str) {}
}

#[derive(Debug, Default)]
struct Route {
    enabled: bool,
    filters: Vec<Regex>,
}

/// Fans notifications out to every sink, honouring the per-protocol switches and drop-filters
/// from [`NotificationConfig`]. Protocols without a switch (e.g. `default`) always pass.
pub struct Notifications {
    routes: HashMap<&'static str, Route>,
    sinks: Vec<DynNotifier>,
}

impl Notifications {
    /// # Errors
    ///
    /// Returns [`Error::InvalidFilter`] if a filter isn't a valid regex.
    pub fn new(config: &NotificationConfig, sinks: Vec<DynNotifier>) -> Result<Self, Error> {
        let mut routes = HashMap::new();
        for (protocol, enabled, filters) in [
            ("dns", config.dns, &config.dns_filters),
            ("http", config.http, &config.http_filters),
            ("smtp", config.smtp, &config.smtp_filters),
            ("imap", config.imap, &config.imap_filters),
        ] {
            routes.insert(
                protocol,
                Route {
                    enabled,
                    filters: compile_filters(filters)?,
                },
            );
        }
        Ok(Self { routes, sinks })
    }

    fn wanted(&self, protocol: &str, message: &str) -> bool {
        match self.routes.get(protocol) {
            None => true,
            Some(route) => route.enabled && !route.filters.iter().any(|f| f.is_match(message)),
        }
    }
}

impl Notifier for Notifications {
    fn notify(&self, protocol: &str, message: &str) {
        if !self.wanted(protocol, message) {
            tracing::trace!(protocol, "notification dropped");
            return;
        }
        for sink in &self.sinks {
            sink.notify(protocol, message);
        }
    }
}
