//! Access to the local YashanDB instance.

mod yasql;

pub use yasql::YasqlClient;

use crate::deadline::Deadline;
use chrono::{
    DateTime,
    Local,
};
use serde::{
    Deserialize,
    Serialize,
};
use thiserror::Error;

/// Failure categories of database calls. Access checks turn them into
/// description/tip pairs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum YasErrorKind {
    MissingCredentials,
    NotOpen,
    InvalidCredentials,
    LackLogin,
    LackPrivilege,
    ObjectMissing,
    ConnectFailed,
    Other,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct YasdbError {
    pub kind: YasErrorKind,
    pub code: Option<String>,
    pub message: String,
}

impl YasdbError {
    pub fn new(kind: YasErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
        }
    }

    /// Builds an error from a `YAS-xxxxx ...` line or any other client message.
    pub fn classify(message: &str) -> Self {
        let message = message.trim();
        let code = message
            .strip_prefix("YAS-")
            .and_then(|rest| rest.split(|c: char| !c.is_ascii_digit()).next())
            .filter(|digits| !digits.is_empty())
            .map(|digits| format!("YAS-{digits}"));
        let lower = message.to_lowercase();
        let kind = if lower.contains("not open") || lower.contains("not mounted") {
            YasErrorKind::NotOpen
        } else if lower.contains("invalid username") || lower.contains("password") {
            YasErrorKind::InvalidCredentials
        } else if lower.contains("create session") || lower.contains("login") {
            YasErrorKind::LackLogin
        } else if lower.contains("privilege") {
            YasErrorKind::LackPrivilege
        } else if lower.contains("does not exist") || lower.contains("not exist") {
            YasErrorKind::ObjectMissing
        } else if lower.contains("connect") || lower.contains("refused") || lower.contains("timed out") {
            YasErrorKind::ConnectFailed
        } else {
            YasErrorKind::Other
        };
        Self {
            kind,
            code,
            message: message.to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VParameter {
    pub name: String,
    pub value: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VInstance {
    pub instance_number: String,
    pub instance_name: String,
    pub host_name: String,
    pub version: String,
    pub startup_time: String,
    pub status: String,
    pub role: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VDatabase {
    pub database_name: String,
    pub status: String,
    pub open_mode: String,
    pub role: String,
    pub log_mode: String,
    pub create_time: String,
}

impl VDatabase {
    pub fn is_read_write(&self) -> bool {
        self.open_mode.eq_ignore_ascii_case("READ_WRITE") || self.open_mode.eq_ignore_ascii_case("READ WRITE")
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlowLog {
    pub start_time: String,
    pub user_name: String,
    pub user_host: String,
    pub query_time: String,
    pub rows_sent: String,
    pub sql_text: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub snap_id: u64,
    pub begin_time: String,
    pub end_time: String,
}

/// SQL client for the local instance. Implementations open their own session
/// per call, so concurrent items never share one.
pub trait YasdbClient: Send + Sync {
    fn check_connection(&self) -> Result<(), YasdbError>;

    fn parameter(&self, name: &str) -> Result<String, YasdbError>;

    fn parameters(&self) -> Result<Vec<VParameter>, YasdbError>;

    fn database(&self) -> Result<VDatabase, YasdbError>;

    fn instance(&self) -> Result<VInstance, YasdbError>;

    fn slow_logs(&self, start: DateTime<Local>, end: DateTime<Local>) -> Result<Vec<SlowLog>, YasdbError>;

    fn snapshots(&self, start: DateTime<Local>, end: DateTime<Local>) -> Result<Vec<Snapshot>, YasdbError>;

    /// HTML AWR report between two snapshots. A session still running at
    /// `deadline` is killed.
    fn awr_report(&self, begin: &Snapshot, end: &Snapshot, deadline: Deadline) -> Result<String, YasdbError>;
}
