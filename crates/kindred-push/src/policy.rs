use kindred_types::models::{NotificationKind, NotificationPreferences};

/// How a single notification should reach the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presentation {
    /// Alert with sound.
    Alert,
    /// Delivered without sound; the app only refreshes its badge.
    BadgeOnly,
    /// Nothing goes to the gateway. The log entry is still written.
    Suppressed,
}

/// Per-user delivery rules, resolved once from stored preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationPolicy {
    prefs: NotificationPreferences,
}

impl NotificationPolicy {
    pub fn new(prefs: NotificationPreferences) -> Self {
        Self { prefs }
    }

    pub fn presentation(&self, kind: NotificationKind) -> Presentation {
        if !self.prefs.push_enabled {
            Presentation::Suppressed
        } else if self.prefs.allows(kind) {
            Presentation::Alert
        } else {
            Presentation::BadgeOnly
        }
    }
}

impl Default for NotificationPolicy {
    fn default() -> Self {
        Self::new(NotificationPreferences::default())
    }
}

impl From<NotificationPreferences> for NotificationPolicy {
    fn from(prefs: NotificationPreferences) -> Self {
        Self::new(prefs)
    }
}
