//! Logging output selection shared by the Warden binaries.
//!
//! Every Warden process writes diagnostics to stderr, where the supervising
//! service manager captures them. The format is chosen per process through
//! `WARDEN_LOG_FORMAT` and defaults to JSON so per-domain backend logs can
//! be ingested and correlated; the compact form exists for debugging a
//! single domain interactively.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How a Warden process renders its diagnostic output.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per event, for log ingestion across domains.
    #[default]
    Json,
    /// Compact single-line output for interactive debugging.
    Compact,
}

/// Error produced when `WARDEN_LOG_FORMAT` names an unknown format.
pub type LogFormatParseError = strum::ParseError;

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("json", Some(LogFormat::Json))]
    #[case("compact", Some(LogFormat::Compact))]
    #[case("JSON", Some(LogFormat::Json))]
    #[case("plain", None)]
    fn formats_parse_case_insensitively(#[case] input: &str, #[case] expected: Option<LogFormat>) {
        assert_eq!(input.parse::<LogFormat>().ok(), expected);
    }

    #[test]
    fn display_matches_the_wire_spelling() {
        assert_eq!(LogFormat::Json.to_string(), "json");
        assert_eq!(LogFormat::Compact.to_string(), "compact");
    }

    #[test]
    fn serde_round_trips_snake_case() {
        let encoded = serde_json::to_string(&LogFormat::Compact).expect("encode");
        assert_eq!(encoded, "\"compact\"");
        let decoded: LogFormat = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(decoded, LogFormat::Compact);
    }
}
