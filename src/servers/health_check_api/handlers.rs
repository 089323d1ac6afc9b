use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use super::resources::Report;
use super::responses;
use crate::servers::gateway::client::Client;
use crate::servers::gateway::protocol::{ListRequest, Operation, Response};

/// Endpoint for the container health check.
///
/// It asks the gateway for the list of services, so a healthy report means
/// the bus, the gateway and the supervisor all answer.
pub(crate) async fn health_check_handler(State(client): State<Arc<Client>>) -> Json<Report> {
    match client.call(Operation::List, &ListRequest {}).await {
        Ok(Response::Records { records }) => responses::ok(&records),
        Ok(Response::Error { code, message }) => responses::error(format!("{code}: {message}")),
        Ok(other) => responses::error(format!("unexpected response: {other:?}")),
        Err(e) => responses::error(e.to_string()),
    }
}
