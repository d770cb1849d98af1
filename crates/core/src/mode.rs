use serde::{Deserialize, Serialize};
use std::fmt;

/// Session-wide operating mode, fixed at construction time.
///
/// Connected sessions treat a remote server as the source of truth; local
/// sessions are a self-contained single-user sandbox. Each mode persists
/// into its own storage namespace so the two can never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingMode {
    Connected,
    Local,
}

impl OperatingMode {
    pub fn namespace(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Local => "local",
        }
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.namespace())
    }
}
