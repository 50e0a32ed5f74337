use serde::{Deserialize, Serialize};
use std::fmt;

/// リモート側で採番された出席レコード ID。往復済みのレコードにのみ存在する。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", into = "String")]
pub struct RemoteAttendanceId(String);

impl RemoteAttendanceId {
    pub fn new(value: String) -> Result<Self, String> {
        if value.trim().is_empty() {
            return Err("Remote attendance ID cannot be empty".to_string());
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteAttendanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// bigint の主キーと uuid の主キーのどちらも受け付ける
impl TryFrom<serde_json::Value> for RemoteAttendanceId {
    type Error = String;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        match value {
            serde_json::Value::String(s) => Self::new(s),
            serde_json::Value::Number(n) => Self::new(n.to_string()),
            other => Err(format!("Unsupported remote attendance ID: {other}")),
        }
    }
}

impl From<RemoteAttendanceId> for String {
    fn from(id: RemoteAttendanceId) -> Self {
        id.0
    }
}
