//! Connection and transaction tuning knobs.

use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_TX_DEADLINE: Duration = Duration::from_secs(3);

/// Storage configuration. `busy_timeout` is applied when a connection is
/// opened; `tx_deadline` is read by repositories built with
/// `try_new_with_config`.
///
/// Durations are (de)serialized as whole milliseconds, e.g.
/// `{"busy_timeout_ms": 5000, "tx_deadline_ms": 3000}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// How long a writer waits on SQLite's write lock before failing.
    #[serde(rename = "busy_timeout_ms", with = "millis")]
    pub busy_timeout: Duration,
    /// Upper bound on a single unit of work, lock wait included. `None`
    /// disables the deadline.
    #[serde(rename = "tx_deadline_ms", with = "optional_millis")]
    pub tx_deadline: Option<Duration>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            tx_deadline: Some(DEFAULT_TX_DEADLINE),
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod optional_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer
                .serialize_some(&u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::StoreConfig;
    use std::time::Duration;

    #[test]
    fn defaults_match_documented_values() {
        let config = StoreConfig::default();
        assert_eq!(config.busy_timeout, Duration::from_secs(5));
        assert_eq!(config.tx_deadline, Some(Duration::from_secs(3)));
    }

    #[test]
    fn deserializes_millisecond_fields_with_defaults() {
        let config: StoreConfig = serde_json::from_str(r#"{"tx_deadline_ms": 250}"#).unwrap();
        assert_eq!(config.tx_deadline, Some(Duration::from_millis(250)));
        assert_eq!(config.busy_timeout, Duration::from_secs(5));

        let disabled: StoreConfig = serde_json::from_str(r#"{"tx_deadline_ms": null}"#).unwrap();
        assert_eq!(disabled.tx_deadline, None);
    }

    #[test]
    fn serializes_as_milliseconds() {
        let json = serde_json::to_value(StoreConfig::default()).unwrap();
        assert_eq!(json["busy_timeout_ms"], 5000);
        assert_eq!(json["tx_deadline_ms"], 3000);
    }
}
