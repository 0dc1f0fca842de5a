use std::cell::RefCell;
use std::process::Command;
use std::rc::Rc;

use tracing::{debug, info, warn};

use crate::config::Config;

/// Notification delivery seam. Delivery is best-effort: implementations
/// swallow failures, so a refused or broken backend costs a notification,
/// never task state.
pub trait Notify {
    fn deliver(&self, title: &str, body: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
}

/// Delivers through `notify-send` when the host has it. Permission is
/// decided once, lazily, at startup: a missing helper or a disabled
/// `notifications` config key is the denied state, and denied delivery
/// is a silent no-op.
#[derive(Debug)]
pub struct DesktopNotifier {
    permission: Permission,
}

impl DesktopNotifier {
    #[tracing::instrument(skip(cfg))]
    pub fn request(cfg: &Config) -> Self {
        if !cfg.get_bool("notifications").unwrap_or(true) {
            info!("notifications disabled by config");
            return Self {
                permission: Permission::Denied,
            };
        }

        let permission = match which::which("notify-send") {
            Ok(helper) => {
                debug!(helper = %helper.display(), "notification helper found");
                Permission::Granted
            }
            Err(_) => {
                info!("notify-send not found; notifications suppressed");
                Permission::Denied
            }
        };

        Self { permission }
    }

    pub fn permission(&self) -> Permission {
        self.permission
    }
}

impl Notify for DesktopNotifier {
    fn deliver(&self, title: &str, body: &str) {
        if self.permission != Permission::Granted {
            debug!(title, "notification suppressed; permission not granted");
            return;
        }

        match Command::new("notify-send").arg(title).arg(body).status() {
            Ok(status) if status.success() => {
                debug!(title, "delivered notification");
            }
            Ok(status) => {
                warn!(title, code = ?status.code(), "notify-send exited nonzero");
            }
            Err(err) => {
                warn!(title, error = %err, "failed to spawn notify-send");
            }
        }
    }
}

/// Captures deliveries in memory instead of reaching a desktop; the
/// substitute backend for tests and headless runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryNotifier {
    delivered: Rc<RefCell<Vec<(String, String)>>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliveries(&self) -> Vec<(String, String)> {
        self.delivered.borrow().clone()
    }
}

impl Notify for MemoryNotifier {
    fn deliver(&self, title: &str, body: &str) {
        self.delivered
            .borrow_mut()
            .push((title.to_string(), body.to_string()));
    }
}
