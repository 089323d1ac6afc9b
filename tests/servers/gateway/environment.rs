use std::sync::Arc;
use std::time::Duration;

use hxe::bootstrap::app::initialize_supervisor;
use hxe::bus::{Bus, LocalBus};
use hxe::core::Supervisor;
use hxe::servers::gateway::backend::Sessions;
use hxe::servers::gateway::client::Client;
use hxe::servers::gateway::protocol::{IdRequest, Operation, Response};
use hxe::servers::gateway::server::{GatewayServer, Running, Stopped};
use hxe_configuration::Configuration;
use hxe_primitives::{ServiceId, ServiceRecord};

pub struct Environment<S> {
    pub config: Arc<Configuration>,
    pub supervisor: Arc<Supervisor>,
    pub bus: Arc<dyn Bus>,
    pub server: GatewayServer<S>,
}

impl Environment<Stopped> {
    pub fn new(configuration: &Arc<Configuration>) -> Self {
        let supervisor = initialize_supervisor(configuration).expect("it should build the supervisor");

        Self {
            config: configuration.clone(),
            supervisor,
            bus: Arc::new(LocalBus::new()),
            server: GatewayServer::new(configuration.gateway.clone()),
        }
    }

    pub fn start(self) -> Environment<Running> {
        Environment {
            config: self.config,
            supervisor: self.supervisor.clone(),
            bus: self.bus.clone(),
            server: self
                .server
                .start(self.supervisor, self.bus, Arc::new(Sessions::default()))
                .expect("it should start the gateway"),
        }
    }
}

impl Environment<Running> {
    pub fn new(configuration: &Arc<Configuration>) -> Self {
        Environment::<Stopped>::new(configuration).start()
    }

    pub async fn stop(self) -> Environment<Stopped> {
        self.supervisor.shutdown().await;

        Environment {
            config: self.config,
            supervisor: self.supervisor,
            bus: self.bus,
            server: self.server.stop().await.expect("it should stop the gateway"),
        }
    }

    pub fn client(&self) -> Client {
        Client::new(self.bus.clone(), self.config.gateway.subject_prefix.clone(), Duration::from_secs(10))
    }

    /// Requests an operation, panicking if nobody answers.
    pub async fn call<T: serde::Serialize>(&self, operation: Operation, request: &T) -> Response {
        self.client()
            .call(operation, request)
            .await
            .expect("the gateway should answer")
    }

    pub async fn status(&self, id: &ServiceId) -> ServiceRecord {
        match self.call(Operation::Status, &IdRequest { id: id.clone() }).await {
            Response::Record { record } => record,
            other => panic!("unexpected response: {other:?}"),
        }
    }

    /// Polls the status of a service until it satisfies the condition.
    pub async fn wait_for<F>(&self, id: &ServiceId, condition: F) -> ServiceRecord
    where
        F: Fn(&ServiceRecord) -> bool,
    {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);

        loop {
            let record = self.status(id).await;

            if condition(&record) {
                return record;
            }

            assert!(
                tokio::time::Instant::now() < deadline,
                "the service never reached the expected status, last seen: {record:?}"
            );

            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}
