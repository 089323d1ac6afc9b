//! The wire contract of the control protocol.
//!
//! Every operation has its own subject, `<prefix>.service.<operation>`, and
//! exchanges JSON documents.
//!
//! Operation | Request | Response
//! ---|---|---
//! `create` | a service spec | `record`
//! `list` | `{}` (or nothing) | `records`
//! `get`, `status` | `{"id"}` | `record`
//! `update` | `{"id", "spec"}` | `record`
//! `delete` | `{"id", "force"}` | `ack`
//! `start`, `stop`, `restart` | `{"id"}` | `record`
//! `enable`, `disable`, `reload` | `{"id"}` | `ack`
//! `log` | `{"id", "lines", "follow"}` | `stream`
//! `shell` | `{"id"}` | `session`
//!
//! Responses are tagged by `result`. A failure is:
//!
//! ```json
//! {"result": "error", "code": "NOT_FOUND", "message": "the service \"web\" does not exist"}
//! ```
use std::str::FromStr;

use derive_more::Display;
use hxe_primitives::{ServiceId, ServiceRecord, ServiceSpec};
use serde::{Deserialize, Serialize};

use crate::core::journal::Line;
use crate::core::{Error, ErrorCode};

/// The default number of buffered lines returned by `log`.
pub const DEFAULT_LOG_LINES: usize = 100;

#[derive(Serialize, Deserialize, Copy, Clone, Debug, Display, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    #[display("list")]
    List,
    #[display("get")]
    Get,
    #[display("status")]
    Status,
    #[display("create")]
    Create,
    #[display("update")]
    Update,
    #[display("delete")]
    Delete,
    #[display("start")]
    Start,
    #[display("stop")]
    Stop,
    #[display("restart")]
    Restart,
    #[display("reload")]
    Reload,
    #[display("enable")]
    Enable,
    #[display("disable")]
    Disable,
    #[display("log")]
    Log,
    #[display("shell")]
    Shell,
}

impl Operation {
    pub const ALL: [Operation; 14] = [
        Operation::List,
        Operation::Get,
        Operation::Status,
        Operation::Create,
        Operation::Update,
        Operation::Delete,
        Operation::Start,
        Operation::Stop,
        Operation::Restart,
        Operation::Reload,
        Operation::Enable,
        Operation::Disable,
        Operation::Log,
        Operation::Shell,
    ];

    /// The subject the operation is requested on.
    #[must_use]
    pub fn subject(self, prefix: &str) -> String {
        format!("{prefix}.service.{self}")
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown operation \"{0}\"")]
pub struct UnknownOperation(pub String);

impl FromStr for Operation {
    type Err = UnknownOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|operation| operation.to_string() == s)
            .ok_or_else(|| UnknownOperation(s.to_owned()))
    }
}

/// The payload of `list`.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ListRequest {}

/// The payload of the operations that only name a service.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct IdRequest {
    pub id: ServiceId,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UpdateRequest {
    pub id: ServiceId,
    pub spec: ServiceSpec,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DeleteRequest {
    pub id: ServiceId,
    /// Stop a running service first instead of refusing.
    #[serde(default)]
    pub force: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct LogRequest {
    pub id: ServiceId,
    #[serde(default = "LogRequest::default_lines")]
    pub lines: usize,
    /// Publish the live lines of the current run.
    #[serde(default)]
    pub follow: bool,
}

impl LogRequest {
    fn default_lines() -> usize {
        DEFAULT_LOG_LINES
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Response {
    Record {
        record: ServiceRecord,
    },
    Records {
        records: Vec<ServiceRecord>,
    },
    Ack {
        id: ServiceId,
    },
    Stream {
        handle: String,
        /// Where the live lines are published, when following.
        subject: Option<String>,
        lines: Vec<Line>,
    },
    Session {
        token: String,
    },
    Error {
        code: ErrorCode,
        message: String,
    },
}

impl Response {
    #[must_use]
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Response::Error {
            code,
            message: message.into(),
        }
    }

    /// The error code, if the operation failed.
    #[must_use]
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Response::Error { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<Error> for Response {
    fn from(err: Error) -> Self {
        Response::error(err.code(), err.to_string())
    }
}

/// What a `log` follower receives on the stream subject.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum LogFrame {
    Line(Line),
    /// The process is gone; nothing else will be published.
    End { code: i32 },
}

#[cfg(test)]
mod tests {
    use hxe_primitives::{ServiceId, ServiceRecord};
    use serde_json::json;

    use super::{DeleteRequest, LogRequest, Operation, Response};
    use crate::core::ErrorCode;

    #[test]
    fn it_should_name_one_subject_per_operation() {
        assert_eq!(Operation::Start.subject("hxe"), "hxe.service.start");
        assert_eq!("status".parse::<Operation>(), Ok(Operation::Status));
        assert!("launch".parse::<Operation>().is_err());

        for operation in Operation::ALL {
            assert_eq!(operation.to_string().parse::<Operation>(), Ok(operation));
        }
    }

    #[test]
    fn it_should_fill_in_the_optional_request_fields() {
        let delete: DeleteRequest = serde_json::from_value(json!({"id": "web"})).unwrap();
        let log: LogRequest = serde_json::from_value(json!({"id": "web"})).unwrap();

        assert!(!delete.force);
        assert_eq!(log.lines, super::DEFAULT_LOG_LINES);
        assert!(!log.follow);
    }

    #[test]
    fn it_should_tag_the_responses_by_result() {
        let record = ServiceRecord::ready(ServiceId::new("web").unwrap());

        let value = serde_json::to_value(Response::Record { record }).unwrap();

        assert_eq!(value["result"], "record");
        assert_eq!(value["record"]["state"], "ready");

        let value = serde_json::to_value(Response::error(ErrorCode::NotFound, "nope")).unwrap();

        assert_eq!(value, json!({"result": "error", "code": "NOT_FOUND", "message": "nope"}));
    }
}
