//! `[runtime]` and `[watch]` sections.
//!
//! ```toml
//! [runtime]
//! profile = "auto"          # auto | process | browser | hosted
//! agent = "127.0.0.1:5290"
//! browser_port = 5291
//!
//! [watch]
//! debounce_ms = 300
//! cooldown_ms = 800
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::actor::fs::Timing;
use crate::applier::RuntimeProfile;

/// Which applier to build; `auto` infers it from the project graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileSetting {
    #[default]
    Auto,
    Process,
    Browser,
    Hosted,
}

impl ProfileSetting {
    /// Forced profile, or `None` for inference.
    pub fn forced(self) -> Option<RuntimeProfile> {
        match self {
            Self::Auto => None,
            Self::Process => Some(RuntimeProfile::Process),
            Self::Browser => Some(RuntimeProfile::Browser),
            Self::Hosted => Some(RuntimeProfile::Hosted),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub profile: ProfileSetting,
    /// In-process agent address.
    pub agent: String,
    /// How long to keep retrying the agent connection.
    pub agent_timeout_ms: u64,
    /// First WebSocket port tried for browser clients.
    pub browser_port: u16,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            profile: ProfileSetting::Auto,
            agent: "127.0.0.1:5290".into(),
            agent_timeout_ms: 5_000,
            browser_port: 5291,
        }
    }
}

impl RuntimeConfig {
    pub fn agent_timeout(&self) -> Duration {
        Duration::from_millis(self.agent_timeout_ms)
    }
}

/// File watcher timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSection {
    pub debounce_ms: u64,
    pub cooldown_ms: u64,
}

impl Default for WatchSection {
    fn default() -> Self {
        let timing = Timing::default();
        Self {
            debounce_ms: timing.debounce.as_millis() as u64,
            cooldown_ms: timing.cooldown.as_millis() as u64,
        }
    }
}

impl WatchSection {
    pub fn timing(&self) -> Timing {
        Timing {
            debounce: Duration::from_millis(self.debounce_ms),
            cooldown: Duration::from_millis(self.cooldown_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_parse_config;

    #[test]
    fn test_runtime_defaults() {
        let config = test_parse_config("");
        assert_eq!(config.runtime.profile, ProfileSetting::Auto);
        assert_eq!(config.runtime.profile.forced(), None);
        assert_eq!(config.runtime.agent, "127.0.0.1:5290");
        assert_eq!(config.runtime.browser_port, 5291);
        assert_eq!(config.watch.timing(), Timing::default());
    }

    #[test]
    fn test_profile_override() {
        let config = test_parse_config("[runtime]\nprofile = \"hosted\"\nbrowser_port = 9000");
        assert_eq!(config.runtime.profile.forced(), Some(RuntimeProfile::Hosted));
        assert_eq!(config.runtime.browser_port, 9000);
    }

    #[test]
    fn test_unknown_profile_rejected() {
        assert!(toml::from_str::<RuntimeConfig>("profile = \"desktop\"").is_err());
    }

    #[test]
    fn test_watch_timing() {
        let config = test_parse_config("[watch]\ndebounce_ms = 50\ncooldown_ms = 0");
        let timing = config.watch.timing();
        assert_eq!(timing.debounce, Duration::from_millis(50));
        assert_eq!(timing.cooldown, Duration::ZERO);
    }
}
