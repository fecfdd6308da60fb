//! Permission-gated notification surface.

use std::fmt;
use std::io::{self, IsTerminal, Write};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{GarageError, Result};
use crate::storage::StorageAdapter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    #[default]
    Default,
    Granted,
    Denied,
    Unsupported,
}

impl PermissionState {
    pub fn as_label(self) -> &'static str {
        match self {
            Self::Default => "Permission not requested",
            Self::Granted => "Permission granted",
            Self::Denied => "Permission denied",
            Self::Unsupported => "Notifications unsupported",
        }
    }
}

pub trait Notifier: fmt::Debug {
    fn permission(&self) -> PermissionState;

    fn request_permission(&mut self) -> Result<PermissionState>;

    fn revoke(&mut self) -> Result<PermissionState> {
        Ok(self.permission())
    }

    fn send(&mut self, title: &str, body: &str) -> Result<()>;
}

impl<N: Notifier + ?Sized> Notifier for Box<N> {
    fn permission(&self) -> PermissionState {
        (**self).permission()
    }

    fn request_permission(&mut self) -> Result<PermissionState> {
        (**self).request_permission()
    }

    fn revoke(&mut self) -> Result<PermissionState> {
        (**self).revoke()
    }

    fn send(&mut self, title: &str, body: &str) -> Result<()> {
        (**self).send(title, body)
    }
}

/// Prints notifications on a terminal stream and remembers the granted
/// permission in storage.
pub struct TerminalNotifier {
    storage: StorageAdapter,
    permission: PermissionState,
    out: Box<dyn Write>,
    color: bool,
}

impl fmt::Debug for TerminalNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerminalNotifier")
            .field("permission", &self.permission)
            .field("color", &self.color)
            .finish_non_exhaustive()
    }
}

impl TerminalNotifier {
    pub fn stderr(storage: StorageAdapter, color: bool) -> Self {
        let color = color && io::stderr().is_terminal();
        Self::with_writer(storage, Box::new(io::stderr()), color)
    }

    pub fn with_writer(storage: StorageAdapter, out: Box<dyn Write>, color: bool) -> Self {
        let permission = storage.load_permission();
        debug!(permission = ?permission, "terminal notifier ready");
        Self {
            storage,
            permission,
            out,
            color,
        }
    }

    fn set_permission(&mut self, state: PermissionState) -> Result<PermissionState> {
        self.permission = state;
        self.storage.save_permission(state)?;
        info!(permission = ?state, "notification permission updated");
        Ok(state)
    }
}

impl Notifier for TerminalNotifier {
    fn permission(&self) -> PermissionState {
        self.permission
    }

    fn request_permission(&mut self) -> Result<PermissionState> {
        self.set_permission(PermissionState::Granted)
    }

    fn revoke(&mut self) -> Result<PermissionState> {
        self.set_permission(PermissionState::Denied)
    }

    fn send(&mut self, title: &str, body: &str) -> Result<()> {
        if self.permission != PermissionState::Granted {
            debug!(title, "skipping notification because permission is not granted");
            return Err(GarageError::Notification {
                message: "permission not granted".to_string(),
            });
        }

        let heading = if self.color {
            format!("\x1b[1;35m🔔 {title}\x1b[0m")
        } else {
            format!("🔔 {title}")
        };
        writeln!(self.out, "{heading}\n   {body}")
            .and_then(|()| self.out.flush())
            .map_err(|err| {
                warn!(error = %err, title, "failed to emit notification");
                GarageError::Notification {
                    message: err.to_string(),
                }
            })?;
        info!(title, "emitted notification");
        Ok(())
    }
}

/// Surface without notification support.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn permission(&self) -> PermissionState {
        PermissionState::Unsupported
    }

    fn request_permission(&mut self) -> Result<PermissionState> {
        Ok(PermissionState::Unsupported)
    }

    fn send(&mut self, _title: &str, _body: &str) -> Result<()> {
        Err(GarageError::Notification {
            message: "notifications are not supported".to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotification {
    pub title: String,
    pub body: String,
}

/// Keeps sent notifications in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    pub permission: PermissionState,
    pub sent: Vec<SentNotification>,
    pub fail_sends: bool,
}

impl RecordingNotifier {
    pub fn granted() -> Self {
        Self {
            permission: PermissionState::Granted,
            ..Self::default()
        }
    }

    pub fn titles(&self) -> Vec<&str> {
        self.sent.iter().map(|n| n.title.as_str()).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn permission(&self) -> PermissionState {
        self.permission
    }

    fn request_permission(&mut self) -> Result<PermissionState> {
        if self.permission != PermissionState::Unsupported {
            self.permission = PermissionState::Granted;
        }
        Ok(self.permission)
    }

    fn revoke(&mut self) -> Result<PermissionState> {
        if self.permission != PermissionState::Unsupported {
            self.permission = PermissionState::Denied;
        }
        Ok(self.permission)
    }

    fn send(&mut self, title: &str, body: &str) -> Result<()> {
        if self.fail_sends || self.permission != PermissionState::Granted {
            return Err(GarageError::Notification {
                message: "rejected by recording notifier".to_string(),
            });
        }
        self.sent.push(SentNotification {
            title: title.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}
