use std::fmt;

use commitline_http::config::HttpConfig;
use serde::Deserialize;

/// Buffer sizing of a server release line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerProfile {
    /// 8 KiB output buffer, 2 KiB aggregation.
    #[default]
    Compact,
    /// 32 KiB output buffer, 8 KiB aggregation.
    Standard,
}

impl ServerProfile {
    pub const ALL: [ServerProfile; 2] = [ServerProfile::Compact, ServerProfile::Standard];

    pub fn output_buffer_size(self) -> usize {
        match self {
            ServerProfile::Compact => 8 * 1024,
            ServerProfile::Standard => 32 * 1024,
        }
    }

    pub fn output_aggregation_size(self) -> usize {
        self.output_buffer_size() / 4
    }

    pub fn http_config(self) -> HttpConfig {
        HttpConfig::with_buffer_sizes(self.output_buffer_size(), self.output_aggregation_size())
    }
}

impl fmt::Display for ServerProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerProfile::Compact => f.write_str("compact"),
            ServerProfile::Standard => f.write_str("standard"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_matches_http_defaults() {
        assert_eq!(ServerProfile::default().http_config(), HttpConfig::default());
    }

    #[test]
    fn every_profile_is_valid() {
        for profile in ServerProfile::ALL {
            let config = profile.http_config();
            assert_eq!(config.validate(), Ok(()), "{profile}");
            assert_eq!(config.output_buffer_size, profile.output_buffer_size());
        }
    }

    #[test]
    fn deserialize_by_name() {
        let profile: ServerProfile = serde_json::from_str("\"standard\"").unwrap();
        assert_eq!(profile, ServerProfile::Standard);
    }
}
