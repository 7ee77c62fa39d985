use crate::common::{CountingScheduler, OpenPool, assert_contains, init_test_logging};
use dfk::policy::{Acl, CloudPool, WorkerPool};
use dfk::{DispatchRequest, Dispatcher, LocalQueue};
use dfk_common::channel::MockChannel;
use dfk_common::{
    Channel, DfkError, ExecutionPlan, Label, LocalEndpoint, Principal, TaskOutcome,
    WorkDescriptor, WorkerId, WorkerNode,
};
use dfk_wkr::{ProcessLauncher, TaskRunner};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn sh(script: &str) -> ExecutionPlan {
    ExecutionPlan::new(["sh", "-c", script]).unwrap()
}

fn mock_channel() -> (MockChannel, Arc<dyn Channel>) {
    let channel = MockChannel::builder().build();
    let shared: Arc<dyn Channel> = Arc::new(channel.clone());
    (channel, shared)
}

fn local_queue(root: &Path) -> LocalQueue {
    let mut queue = LocalQueue::new();
    queue.add_worker(
        WorkerNode {
            id: WorkerId::new("builder"),
            root: root.to_path_buf(),
            launcher: Arc::new(ProcessLauncher),
            endpoint: Arc::new(LocalEndpoint::loopback("builder")),
        },
        vec!["linux".to_string()],
        2,
        true,
        WorkerPool::new("builder", Acl::new(["alice"])),
    );
    queue
}

async fn never() {
    std::future::pending::<()>().await
}

#[tokio::test]
async fn test_empty_command_is_rejected_before_the_queue() {
    init_test_logging();
    crate::test_log!("TEST START: test_empty_command_is_rejected_before_the_queue");

    let scheduler = CountingScheduler::new(vec![OpenPool::new("w")]);
    let dispatcher = Dispatcher::new(scheduler.clone());
    let plan: ExecutionPlan = serde_json::from_str(r#"{"command": []}"#).unwrap();
    let (_, channel) = mock_channel();

    let err = dispatcher
        .dispatch(DispatchRequest::new(plan, Principal::new("alice")), channel, never())
        .await
        .unwrap_err();

    assert!(matches!(err, DfkError::SubmissionRejected(_)));
    assert_eq!(scheduler.lookups(), 0);
    assert_eq!(scheduler.submits(), 0);
    crate::test_log!("TEST PASS: test_empty_command_is_rejected_before_the_queue");
}

#[tokio::test]
async fn test_missing_build_permission_is_access_denied() {
    init_test_logging();
    crate::test_log!("TEST START: test_missing_build_permission_is_access_denied");

    let scheduler = CountingScheduler::new(vec![
        OpenPool::restricted("w1", "bob"),
        OpenPool::restricted("w2", "carol"),
    ]);
    let dispatcher = Dispatcher::new(scheduler.clone());
    let (_, channel) = mock_channel();

    let err = dispatcher
        .dispatch(
            DispatchRequest::new(sh("true"), Principal::new("alice")),
            channel,
            never(),
        )
        .await
        .unwrap_err();

    match &err {
        DfkError::AccessDenied {
            principal,
            permission,
        } => {
            assert_eq!(principal, "alice");
            assert_eq!(*permission, "Worker.Build");
        }
        other => panic!("expected AccessDenied, got {other:?}"),
    }
    assert_contains(&err.to_string(), "Worker.Build");
    assert_eq!(scheduler.submits(), 0);
    crate::test_log!("TEST PASS: test_missing_build_permission_is_access_denied");
}

#[tokio::test]
async fn test_access_denied_never_launches() {
    init_test_logging();
    let root = tempfile::tempdir().unwrap();
    let marker = root.path().join("launched");
    let dispatcher = Dispatcher::new(Arc::new(local_queue(root.path())));
    let (channel, shared) = mock_channel();

    let err = dispatcher
        .dispatch(
            DispatchRequest::new(
                sh(&format!("touch {}", marker.display())),
                Principal::new("mallory"),
            ),
            shared,
            never(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, DfkError::AccessDenied { .. }));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!marker.exists());
    assert!(channel.stderr_buffer().contents().is_empty());
}

#[tokio::test]
async fn test_no_reachable_pool() {
    init_test_logging();
    let scheduler = CountingScheduler::new(Vec::new());
    let dispatcher = Dispatcher::new(scheduler.clone());
    let (_, channel) = mock_channel();

    let err = dispatcher
        .dispatch(
            DispatchRequest::new(sh("true"), Principal::new("alice")).with_label("linux"),
            channel,
            never(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, DfkError::NoWorkerReachable(ref target) if target == "linux"));
    assert_eq!(scheduler.submits(), 0);
}

#[tokio::test]
async fn test_unknown_label() {
    init_test_logging();
    let root = tempfile::tempdir().unwrap();
    let dispatcher = Dispatcher::new(Arc::new(local_queue(root.path())));
    let (_, channel) = mock_channel();

    let err = dispatcher
        .dispatch(
            DispatchRequest::new(sh("true"), Principal::new("alice")).with_label("solaris"),
            channel,
            never(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, DfkError::NoSuchLabel(ref l) if l == "solaris"));
}

#[tokio::test]
async fn test_display_name_derived_from_command() {
    init_test_logging();
    let scheduler = CountingScheduler::new(vec![OpenPool::new("w")]);
    let dispatcher = Dispatcher::new(scheduler.clone());

    let (_, channel) = mock_channel();
    let plan = ExecutionPlan::new(["cargo", "test", "--release", "--workspace"]).unwrap();
    let pending = tokio::spawn({
        let dispatcher = dispatcher.clone();
        async move {
            dispatcher
                .dispatch(DispatchRequest::new(plan, Principal::new("alice")), channel, never())
                .await
        }
    });

    while scheduler.submits() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(scheduler.display_names(), ["cargo test --release ..."]);

    scheduler.resolve_all(TaskOutcome::Completed { exit_code: 0 });
    assert_eq!(pending.await.unwrap().unwrap(), 0);
}

#[tokio::test]
async fn test_cancelled_queue_item() {
    init_test_logging();
    let scheduler = CountingScheduler::new(vec![OpenPool::new("w")]);
    let dispatcher = Dispatcher::new(scheduler.clone());

    let (_, channel) = mock_channel();
    let pending = tokio::spawn({
        let dispatcher = dispatcher.clone();
        async move {
            dispatcher
                .dispatch(
                    DispatchRequest::new(sh("true"), Principal::new("alice"))
                        .with_display_name("named"),
                    channel,
                    never(),
                )
                .await
        }
    });

    while scheduler.submits() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(scheduler.display_names(), ["named"]);
    scheduler.resolve_all(TaskOutcome::Cancelled);

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, DfkError::Cancelled));
    assert_eq!(err.to_string(), "Task cancelled");
}

#[tokio::test]
async fn test_interrupt_cancels_the_queued_task() {
    init_test_logging();
    let scheduler = CountingScheduler::new(vec![OpenPool::new("w")]);
    let dispatcher = Dispatcher::new(scheduler.clone());
    let (_, channel) = mock_channel();

    let err = dispatcher
        .dispatch(
            DispatchRequest::new(sh("true"), Principal::new("alice")),
            channel,
            tokio::time::sleep(Duration::from_millis(50)),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, DfkError::Interrupted));
    let tokens = scheduler.cancel_tokens();
    assert_eq!(tokens.len(), 1);
    assert!(tokens[0].is_cancelled());
}

#[tokio::test]
async fn test_exit_code_round_trip_through_local_queue() {
    init_test_logging();
    crate::test_log!("TEST START: test_exit_code_round_trip_through_local_queue");

    let root = tempfile::tempdir().unwrap();
    let dispatcher = Dispatcher::new(Arc::new(local_queue(root.path())));
    let (channel, shared) = mock_channel();

    let code = dispatcher
        .dispatch(
            DispatchRequest::new(sh("echo hi; echo warn >&2; exit 4"), Principal::new("alice"))
                .with_label("linux"),
            shared,
            never(),
        )
        .await
        .unwrap();

    assert_eq!(code, 4);
    assert_eq!(channel.stdout_buffer().to_string_lossy(), "hi\n");
    let stderr = channel.stderr_buffer().to_string_lossy();
    assert_contains(&stderr, "Executing on builder");
    assert_contains(&stderr, "warn");
    crate::test_log!("TEST PASS: test_exit_code_round_trip_through_local_queue");
}

#[tokio::test]
async fn test_provisioner_only_admits_but_stays_queued() {
    init_test_logging();
    let mut queue = LocalQueue::new();
    queue.add_cloud(
        vec!["spot".to_string()],
        CloudPool::new("cloud", Acl::new(["alice"]), Acl::default()),
    );
    let dispatcher = Dispatcher::new(Arc::new(queue));
    let (channel, shared) = mock_channel();

    let err = dispatcher
        .dispatch(
            DispatchRequest::new(sh("echo ran"), Principal::new("alice")).with_label("spot"),
            shared,
            tokio::time::sleep(Duration::from_millis(100)),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, DfkError::Interrupted));
    assert!(channel.stdout_buffer().contents().is_empty());
}

#[tokio::test]
async fn test_offline_labelled_worker_is_admitted_and_waits() {
    init_test_logging();
    crate::test_log!("TEST START: test_offline_labelled_worker_is_admitted_and_waits");

    let root = tempfile::tempdir().unwrap();
    let mut queue = LocalQueue::new();
    queue.add_worker(
        WorkerNode {
            id: WorkerId::new("gpu1"),
            root: root.path().to_path_buf(),
            launcher: Arc::new(ProcessLauncher),
            endpoint: Arc::new(LocalEndpoint::loopback("gpu1")),
        },
        vec!["gpu".to_string()],
        1,
        false,
        WorkerPool::new("gpu1", Acl::new(["*"])),
    );
    let dispatcher = Dispatcher::new(Arc::new(queue));
    let (channel, shared) = mock_channel();

    let label = Label::new("gpu");
    let alice = Principal::new("alice");
    dispatcher.admit(Some(&label), &alice).unwrap();

    let mut handle = dispatcher
        .submit(WorkDescriptor {
            label: Some(label),
            display_name: "render".to_string(),
            estimated_duration_ms: -1,
            principal: alice,
            work: Box::new(TaskRunner::new(sh("echo ran"), shared)),
        })
        .unwrap();

    let waiting = tokio::time::timeout(Duration::from_millis(100), handle.outcome()).await;
    assert!(waiting.is_err(), "task ran without an online worker");

    handle.cancel();
    assert_eq!(handle.outcome().await, TaskOutcome::Cancelled);
    assert!(channel.stdout_buffer().contents().is_empty());
    crate::test_log!("TEST PASS: test_offline_labelled_worker_is_admitted_and_waits");
}
