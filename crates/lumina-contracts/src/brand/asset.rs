use std::fmt;

use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};

pub const ERROR_SENTINEL: &str = "error_failed";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AssetState {
    #[default]
    NotRequested,
    Pending,
    Failed,
    Ready(String),
}

impl AssetState {
    pub fn from_stored(raw: &str) -> Self {
        if raw.is_empty() {
            return AssetState::Pending;
        }
        if raw.starts_with("error") {
            return AssetState::Failed;
        }
        AssetState::Ready(raw.to_string())
    }

    pub fn stored(&self) -> Option<&str> {
        match self {
            AssetState::NotRequested => None,
            AssetState::Pending => Some(""),
            AssetState::Failed => Some(ERROR_SENTINEL),
            AssetState::Ready(payload) => Some(payload.as_str()),
        }
    }

    pub fn is_not_requested(&self) -> bool {
        matches!(self, AssetState::NotRequested)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, AssetState::Pending)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, AssetState::Failed)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, AssetState::Ready(_))
    }

    pub fn payload(&self) -> Option<&str> {
        match self {
            AssetState::Ready(payload) => Some(payload.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for AssetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetState::NotRequested => write!(f, "not requested"),
            AssetState::Pending => write!(f, "generating"),
            AssetState::Failed => write!(f, "failed"),
            AssetState::Ready(_) => write!(f, "ready"),
        }
    }
}

impl Serialize for AssetState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.stored() {
            Some(encoded) => serializer.serialize_str(encoded),
            None => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for AssetState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(match raw {
            None => AssetState::NotRequested,
            Some(text) => AssetState::from_stored(&text),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_encoding_roundtrip() {
        assert_eq!(AssetState::from_stored(""), AssetState::Pending);
        assert_eq!(AssetState::from_stored("error_failed"), AssetState::Failed);
        assert_eq!(
            AssetState::from_stored("data:image/png;base64,QUJD"),
            AssetState::Ready("data:image/png;base64,QUJD".to_string())
        );

        assert_eq!(AssetState::Pending.stored(), Some(""));
        assert_eq!(AssetState::Failed.stored(), Some(ERROR_SENTINEL));
        assert_eq!(AssetState::NotRequested.stored(), None);
    }

    #[test]
    fn legacy_error_prefixes_classify_as_failed() {
        assert_eq!(AssetState::from_stored("error"), AssetState::Failed);
        assert_eq!(AssetState::from_stored("error_timeout"), AssetState::Failed);
    }

    #[test]
    fn serde_matches_legacy_strings() -> anyhow::Result<()> {
        let ready = AssetState::Ready("data:image/png;base64,QUJD".to_string());
        assert_eq!(
            serde_json::to_string(&ready)?,
            "\"data:image/png;base64,QUJD\""
        );
        assert_eq!(serde_json::to_string(&AssetState::Pending)?, "\"\"");
        assert_eq!(
            serde_json::to_string(&AssetState::Failed)?,
            "\"error_failed\""
        );

        let parsed: AssetState = serde_json::from_str("\"\"")?;
        assert_eq!(parsed, AssetState::Pending);
        let parsed: AssetState = serde_json::from_str("null")?;
        assert_eq!(parsed, AssetState::NotRequested);
        Ok(())
    }
}
