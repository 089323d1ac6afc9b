use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum Status {
    Ok,
    Error,
}

/// The health of the supervisor, as seen through the control protocol.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct Report {
    pub status: Status,
    /// Number of managed services.
    pub managed: usize,
    pub running: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Report {
    #[must_use]
    pub fn error(message: String) -> Report {
        Report {
            status: Status::Error,
            managed: 0,
            running: 0,
            failed: 0,
            message: Some(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::Report;

    #[test]
    fn it_should_name_the_status_with_its_variant() {
        let report = Report::error("no reply".to_owned());

        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({"status": "Error", "managed": 0, "running": 0, "failed": 0, "message": "no reply"})
        );
    }
}
