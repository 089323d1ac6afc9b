use std::sync::Arc;
use std::time::Duration;

use hxe::bus::Bus as _;
use hxe::core::ErrorCode;
use hxe::servers::gateway::protocol::{DeleteRequest, IdRequest, ListRequest, LogFrame, LogRequest, Operation, Response};
use hxe::servers::gateway::server::Running;
use hxe_primitives::{ServiceId, ServiceRecord, ServiceState};
use hxe_test_helpers::{configuration, fixtures, random};

use super::Environment;

fn record(response: Response) -> ServiceRecord {
    match response {
        Response::Record { record } => record,
        other => panic!("expected a record, got: {other:?}"),
    }
}

fn id_request(id: &ServiceId) -> IdRequest {
    IdRequest { id: id.clone() }
}

#[tokio::test]
async fn it_should_run_a_created_service() {
    let env = Environment::<Running>::new(&Arc::new(configuration::ephemeral_with_memory_store()));
    let id = random::service_id("sleeper");

    let created = record(env.call(Operation::Create, &fixtures::sleeper(id.clone())).await);
    assert_eq!(created.state, ServiceState::Ready);

    record(env.call(Operation::Start, &id_request(&id)).await);

    let status = env.status(&id).await;

    assert_eq!(status.state, ServiceState::Running);
    assert_ne!(status.pid, 0);

    env.stop().await;
}

#[tokio::test]
async fn it_should_give_up_on_a_service_that_keeps_crashing() {
    let env = Environment::<Running>::new(&Arc::new(configuration::ephemeral_with_memory_store()));
    let id = random::service_id("crasher");

    env.call(Operation::Create, &fixtures::crasher(id.clone(), 2)).await;
    env.call(Operation::Start, &id_request(&id)).await;

    let failed = env.wait_for(&id, |record| record.state == ServiceState::Failed).await;

    assert_eq!(failed.retry_count, 2);
    assert_eq!(failed.pid, 0);
    assert_eq!(failed.exit_code, 1);
    assert!(failed.last_error.is_some());

    env.stop().await;
}

#[tokio::test]
async fn it_should_refuse_to_delete_a_running_service() {
    let env = Environment::<Running>::new(&Arc::new(configuration::ephemeral_with_memory_store()));
    let id = random::service_id("sleeper");

    env.call(Operation::Create, &fixtures::sleeper(id.clone())).await;
    env.call(Operation::Start, &id_request(&id)).await;

    let refused = env
        .call(Operation::Delete, &DeleteRequest { id: id.clone(), force: false })
        .await;

    assert_eq!(refused.code(), Some(ErrorCode::Conflict));

    let stopped = record(env.call(Operation::Stop, &id_request(&id)).await);
    assert_eq!(stopped.state, ServiceState::Stopped);

    let deleted = env
        .call(Operation::Delete, &DeleteRequest { id: id.clone(), force: false })
        .await;

    assert_eq!(deleted, Response::Ack { id: id.clone() });
    assert_eq!(
        env.call(Operation::Status, &id_request(&id)).await.code(),
        Some(ErrorCode::NotFound)
    );

    env.stop().await;
}

#[tokio::test]
async fn it_should_replace_the_process_on_restart() {
    let env = Environment::<Running>::new(&Arc::new(configuration::ephemeral_with_memory_store()));
    let id = random::service_id("sleeper");

    env.call(Operation::Create, &fixtures::sleeper(id.clone())).await;
    let started = record(env.call(Operation::Start, &id_request(&id)).await);

    record(env.call(Operation::Restart, &id_request(&id)).await);

    let status = env.status(&id).await;

    assert_eq!(status.state, ServiceState::Running);
    assert_ne!(status.pid, 0);
    assert_ne!(status.pid, started.pid);
    assert_eq!(status.retry_count, 0);

    env.stop().await;
}

#[tokio::test]
async fn it_should_list_the_services_in_id_order() {
    let env = Environment::<Running>::new(&Arc::new(configuration::ephemeral_with_memory_store()));

    for id in ["web", "api", "db"] {
        env.call(Operation::Create, &fixtures::sleeper(ServiceId::new(id).unwrap()))
            .await;
    }

    let Response::Records { records } = env.call(Operation::List, &ListRequest {}).await else {
        panic!("expected records");
    };

    let ids: Vec<String> = records.iter().map(|record| record.id.to_string()).collect();

    assert_eq!(ids, vec!["api", "db", "web"]);

    env.stop().await;
}

#[tokio::test]
async fn it_should_answer_a_timeout_while_the_command_completes() {
    let env = Environment::<Running>::new(&Arc::new(configuration::ephemeral_with_short_request_timeout()));
    let id = random::service_id("stubborn");

    env.call(Operation::Create, &fixtures::stubborn(id.clone())).await;
    env.supervisor.start(&id).await.expect("it should start");

    let response = env.call(Operation::Stop, &id_request(&id)).await;

    assert_eq!(response.code(), Some(ErrorCode::Timeout));

    let stopped = env.wait_for(&id, |record| record.state == ServiceState::Stopped).await;

    assert_eq!(stopped.exit_code, 137);

    env.stop().await;
}

#[tokio::test]
async fn it_should_answer_bad_request_for_an_unknown_operation() {
    let env = Environment::<Running>::new(&Arc::new(configuration::ephemeral_with_memory_store()));

    let answer = env
        .bus
        .request(
            &format!("{}.service.launch", env.config.gateway.subject_prefix),
            b"{}".to_vec(),
            Duration::from_secs(5),
        )
        .await
        .expect("the gateway should answer");

    let response: Response = serde_json::from_slice(&answer).unwrap();

    assert_eq!(response.code(), Some(ErrorCode::BadRequest));

    env.stop().await;
}

#[tokio::test]
async fn it_should_republish_the_state_changes() {
    let env = Environment::<Running>::new(&Arc::new(configuration::ephemeral_with_memory_store()));
    let id = random::service_id("oneshot");

    let mut events = env
        .bus
        .subscribe(&format!("{}.event.{id}", env.config.gateway.subject_prefix))
        .unwrap();

    env.call(Operation::Create, &fixtures::oneshot(id.clone())).await;
    env.call(Operation::Start, &id_request(&id)).await;

    let mut states = Vec::new();

    while states.last() != Some(&ServiceState::Success) {
        let message = tokio::time::timeout(Duration::from_secs(10), events.next())
            .await
            .expect("it should publish the changes")
            .unwrap();

        states.push(record(serde_json::from_slice(&message.payload).unwrap()).state);
    }

    assert_eq!(
        states,
        vec![
            ServiceState::Ready,
            ServiceState::Starting,
            ServiceState::Running,
            ServiceState::Success
        ]
    );

    env.stop().await;
}

#[tokio::test]
async fn it_should_stream_the_lines_of_a_followed_service_until_it_exits() {
    let env = Environment::<Running>::new(&Arc::new(configuration::ephemeral_with_memory_store()));
    let id = random::service_id("sleeper");

    env.call(Operation::Create, &fixtures::sleeper(id.clone())).await;
    env.call(Operation::Start, &id_request(&id)).await;

    let response = env
        .call(
            Operation::Log,
            &LogRequest {
                id: id.clone(),
                lines: 10,
                follow: true,
            },
        )
        .await;

    let Response::Stream {
        subject: Some(subject), ..
    } = response
    else {
        panic!("expected a followed stream, got: {response:?}");
    };

    let mut frames = env.bus.subscribe(&subject).unwrap();

    env.call(Operation::Stop, &id_request(&id)).await;

    let message = tokio::time::timeout(Duration::from_secs(10), frames.next())
        .await
        .expect("it should publish the end of the stream")
        .unwrap();

    assert_eq!(serde_json::from_slice::<LogFrame>(&message.payload).unwrap(), LogFrame::End { code: 143 });

    env.stop().await;
}
