use std::time::Duration;

use assessor::application::ports::{BrokerError, Task, TaskBroker, TaskKind};
use assessor::domain::JobId;
use assessor::infrastructure::broker::ChannelBroker;

fn task(kind: TaskKind) -> Task {
    Task {
        job_id: JobId::new(),
        kind,
    }
}

#[tokio::test]
async fn given_dispatched_task_when_receiving_then_subscriber_of_that_kind_gets_it() {
    let broker = ChannelBroker::new(8);
    let files = broker.subscribe(TaskKind::FileAnnotate).unwrap();
    let sent = task(TaskKind::FileAnnotate);

    broker.dispatch(sent).await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(1), files.recv())
        .await
        .unwrap();
    assert_eq!(received, Some(sent));
}

#[tokio::test]
async fn given_cloned_subscriptions_when_receiving_then_each_task_is_delivered_once() {
    let broker = ChannelBroker::new(8);
    let first = broker.subscribe(TaskKind::ApiAnnotate).unwrap();
    let second = first.clone();
    let a = task(TaskKind::ApiAnnotate);
    let b = task(TaskKind::ApiAnnotate);

    broker.dispatch(a).await.unwrap();
    broker.dispatch(b).await.unwrap();

    assert_eq!(first.recv().await, Some(a));
    assert_eq!(second.recv().await, Some(b));
}

#[tokio::test]
async fn given_full_queue_when_dispatching_then_reports_queue_full() {
    let broker = ChannelBroker::new(1);
    broker.dispatch(task(TaskKind::ApiAnnotate)).await.unwrap();

    let result = broker.dispatch(task(TaskKind::ApiAnnotate)).await;

    assert!(matches!(result, Err(BrokerError::QueueFull(TaskKind::ApiAnnotate))));
}

#[tokio::test]
async fn given_kind_without_route_when_dispatching_or_subscribing_then_reports_no_route() {
    let broker = ChannelBroker::with_kinds(&[TaskKind::ApiAnnotate], 4);

    let dispatch = broker.dispatch(task(TaskKind::FileAnnotate)).await;
    let subscribe = broker.subscribe(TaskKind::FileAnnotate);

    assert!(matches!(dispatch, Err(BrokerError::NoRoute(TaskKind::FileAnnotate))));
    assert!(matches!(subscribe, Err(BrokerError::NoRoute(_))));
}

#[tokio::test]
async fn given_closed_broker_when_dispatching_then_reports_unavailable_but_queued_tasks_remain() {
    let broker = ChannelBroker::new(4);
    let subscription = broker.subscribe(TaskKind::ApiAnnotate).unwrap();
    let queued = task(TaskKind::ApiAnnotate);
    broker.dispatch(queued).await.unwrap();

    broker.close();
    let result = broker.dispatch(task(TaskKind::ApiAnnotate)).await;

    assert!(matches!(result, Err(BrokerError::Unavailable(_))));
    assert_eq!(subscription.recv().await, Some(queued));
}

#[test]
fn given_task_kind_when_displaying_then_uses_queue_name() {
    assert_eq!(TaskKind::ApiAnnotate.to_string(), "api_annotate");
    assert_eq!(TaskKind::FileAnnotate.as_str(), "file_annotate");
}
