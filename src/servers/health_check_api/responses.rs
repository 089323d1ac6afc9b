use axum::Json;
use hxe_primitives::{ServiceRecord, ServiceState};

use super::resources::{Report, Status};

/// Summarizes the records answered by `list`.
#[must_use]
pub fn ok(records: &[ServiceRecord]) -> Json<Report> {
    Json(Report {
        status: Status::Ok,
        managed: records.len(),
        running: records.iter().filter(|record| record.state == ServiceState::Running).count(),
        failed: records.iter().filter(|record| record.state == ServiceState::Failed).count(),
        message: None,
    })
}

#[must_use]
pub fn error(message: String) -> Json<Report> {
    Json(Report::error(message))
}
