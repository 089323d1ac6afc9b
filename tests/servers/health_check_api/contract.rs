use std::sync::Arc;
use std::time::Duration;

use hxe::bus::{Bus, LocalBus};
use hxe::servers::gateway::client::Client;
use hxe::servers::gateway::protocol::Operation;
use hxe::servers::health_check_api::resources::{Report, Status};
use hxe_test_helpers::{configuration, fixtures, random};

use super::environment::Running;
use super::Environment;
use crate::servers::gateway;

async fn get_report(env: &Environment<Running>) -> Report {
    let url = format!("http://{}/health_check", env.state.local_addr);

    reqwest::get(url)
        .await
        .expect("it should answer")
        .json::<Report>()
        .await
        .expect("it should be a report")
}

#[tokio::test]
async fn it_should_report_the_managed_services() {
    let config = Arc::new(configuration::ephemeral_with_memory_store());
    let control = gateway::Environment::<hxe::servers::gateway::server::Running>::new(&config);

    let id = random::service_id("sleeper");
    control.call(Operation::Create, &fixtures::sleeper(id)).await;

    let env = Environment::<Running>::new(&config.health_check_api, Arc::new(control.client())).await;

    let report = get_report(&env).await;

    assert_eq!(report.status, Status::Ok);
    assert_eq!(report.managed, 1);
    assert_eq!(report.running, 0);
    assert_eq!(report.message, None);

    env.stop().await.expect("it should stop the service");
    control.stop().await;
}

#[tokio::test]
async fn it_should_report_an_error_when_the_gateway_does_not_answer() {
    let config = configuration::ephemeral();
    let bus: Arc<dyn Bus> = Arc::new(LocalBus::new());
    let client = Arc::new(Client::new(bus, config.gateway.subject_prefix.clone(), Duration::from_millis(100)));

    let env = Environment::<Running>::new(&config.health_check_api, client).await;

    let report = get_report(&env).await;

    assert_eq!(report.status, Status::Error);
    assert!(report.message.is_some());

    env.stop().await.expect("it should stop the service");
}
