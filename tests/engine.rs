mod common;

use std::time::Duration;

use common::{LoopbackFactory, engine, inputs, next_of};
use loopvisor::{
    ControlError, EventKind, LifecycleState, OwnerId, Severity, StopCause, TaskId,
};

#[tokio::test(start_paused = true)]
async fn identify_start_and_observe() {
    let factory = LoopbackFactory::default();
    let sent = factory.sent.clone();
    let engine = engine(factory).await;
    let alice = OwnerId::from("alice");

    let mut wide = engine.subscribe(&alice, None).await;
    assert!(engine.identify(&alice).await.unwrap().is_empty());
    next_of(&mut wide, EventKind::Identified).await;

    let id = engine
        .start_task(&alice, inputs("tok-1\ntok-2", "one\ntwo\nthree"))
        .await
        .unwrap();
    let started = next_of(&mut wide, EventKind::TaskStarted).await;
    assert_eq!(started.task, Some(id));
    let snapshot = next_of(&mut wide, EventKind::OwnerTasksSnapshot).await;
    assert_eq!(snapshot.tasks.as_ref().unwrap()[0].task_id, id);

    let mut focused = engine.subscribe(&alice, Some(id)).await;
    let stats = next_of(&mut focused, EventKind::StatsUpdate).await;
    assert_eq!(stats.stats.unwrap().sent, 1);

    tokio::time::sleep(Duration::from_secs(20)).await;
    let tasks = engine.list_tasks(&alice).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert!(tasks[0].running);
    assert_eq!(tasks[0].state, LifecycleState::Running);

    let details = engine.get_task_details(&alice, id).await.unwrap();
    assert_eq!(details.total_channels, 2);
    assert_eq!(details.active_channels, 2);
    assert_eq!(details.sequence_len, 3);
    assert!(details.sent >= 3);
    assert!(details.logs.len() <= loopvisor::DETAILS_LOG_ENTRIES);

    let sent = sent.lock().unwrap().clone();
    assert_eq!(sent[0], ("tok-1".to_owned(), "hey one bye".to_owned()));
    assert_eq!(sent[1], ("tok-2".to_owned(), "hey two bye".to_owned()));
    assert_eq!(sent[2], ("tok-1".to_owned(), "hey three bye".to_owned()));
}

#[tokio::test(start_paused = true)]
async fn unidentified_owner_is_rejected() {
    let engine = engine(LoopbackFactory::default()).await;
    let ghost = OwnerId::from("ghost");
    let mut obs = engine.subscribe(&ghost, None).await;

    let err = engine
        .start_task(&ghost, inputs("tok", "hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, ControlError::OwnerNotIdentified { .. }));

    let ev = next_of(&mut obs, EventKind::Error).await;
    assert_eq!(ev.severity, Some(Severity::Error));
}

#[tokio::test(start_paused = true)]
async fn foreign_tasks_are_unauthorized() {
    let engine = engine(LoopbackFactory::default()).await;
    let (alice, bob) = (OwnerId::from("alice"), OwnerId::from("bob"));
    engine.identify(&alice).await.unwrap();
    engine.identify(&bob).await.unwrap();
    let id = engine.start_task(&alice, inputs("tok", "hi")).await.unwrap();

    let mut bobs = engine.subscribe(&bob, None).await;
    assert!(matches!(
        engine.get_task_details(&bob, id).await,
        Err(ControlError::Unauthorized { .. })
    ));
    assert!(matches!(
        engine.stop_task(&bob, id).await,
        Err(ControlError::Unauthorized { .. })
    ));
    assert!(matches!(
        engine.stop_task(&bob, TaskId::new()).await,
        Err(ControlError::TaskNotFound { .. })
    ));

    let err = next_of(&mut bobs, EventKind::Error).await;
    assert_eq!(err.task, Some(id));
    assert!(engine.task(&alice, id).await.unwrap().is_running().await);
}

#[tokio::test(start_paused = true)]
async fn empty_message_list_creates_nothing() {
    let engine = engine(LoopbackFactory::default()).await;
    let alice = OwnerId::from("alice");
    engine.identify(&alice).await.unwrap();

    assert_eq!(
        engine.start_task(&alice, inputs("tok", "\n  \n")).await,
        Err(ControlError::EmptySequence)
    );
    assert!(engine.list_tasks(&alice).await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn all_bad_credentials_stop_with_error() {
    let engine = engine(LoopbackFactory::default()).await;
    let alice = OwnerId::from("alice");
    engine.identify(&alice).await.unwrap();

    let id = engine
        .start_task(&alice, inputs("bad-1\nbad-2\nbad-3", "hi"))
        .await
        .unwrap();
    let mut obs = engine.subscribe(&alice, Some(id)).await;

    let stopped = next_of(&mut obs, EventKind::TaskStopped).await;
    assert_eq!(stopped.severity, Some(Severity::Error));
    assert_eq!(
        stopped.state,
        Some(LifecycleState::Stopped(StopCause::AllChannelsAuthFailed))
    );

    let details = engine.get_task_details(&alice, id).await.unwrap();
    assert!(!details.running);
    assert_eq!(details.active_channels, 0);
    assert_eq!(details.sent, 0);

    // Removing the finished task still reports the stop.
    assert_eq!(engine.stop_task(&alice, id).await, Ok(true));
    let removed = next_of(&mut obs, EventKind::TaskStopped).await;
    assert_eq!(removed.task, Some(id));
    assert_eq!(removed.severity, Some(Severity::Info));
    assert!(engine.list_tasks(&alice).await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stop_is_idempotent_and_unlinks() {
    let factory = LoopbackFactory::default();
    let sent = factory.sent.clone();
    let engine = engine(factory).await;
    let alice = OwnerId::from("alice");
    engine.identify(&alice).await.unwrap();
    let id = engine.start_task(&alice, inputs("tok", "hi")).await.unwrap();

    tokio::time::sleep(Duration::from_secs(12)).await;
    let task = engine.task(&alice, id).await.unwrap();
    assert!(task.stop().await);
    assert!(task.stop().await);
    let stats = task.stats().await;

    assert_eq!(engine.stop_task(&alice, id).await, Ok(true));
    assert!(matches!(
        engine.stop_task(&alice, id).await,
        Err(ControlError::TaskNotFound { .. })
    ));

    let delivered = sent.lock().unwrap().len();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(sent.lock().unwrap().len(), delivered);
    assert_eq!(task.stats().await, stats);
    assert_eq!(stats.sent, delivered as u64);
}

#[tokio::test(start_paused = true)]
async fn stop_all_and_logout() {
    let engine = engine(LoopbackFactory::default()).await;
    let alice = OwnerId::from("alice");
    engine.identify(&alice).await.unwrap();
    engine.start_task(&alice, inputs("a", "x")).await.unwrap();
    engine.start_task(&alice, inputs("b", "y")).await.unwrap();

    let mut obs = engine.subscribe(&alice, None).await;
    assert_eq!(engine.stop_all_tasks(&alice).await.unwrap(), 2);
    // Each task reports its own stop before the owner-wide one.
    let mut all = next_of(&mut obs, EventKind::TaskStopped).await;
    while all.task.is_some() {
        all = next_of(&mut obs, EventKind::TaskStopped).await;
    }
    assert_eq!(all.message.as_deref(), Some("all"));
    assert!(engine.list_tasks(&alice).await.unwrap().is_empty());

    engine.start_task(&alice, inputs("c", "z")).await.unwrap();
    assert_eq!(engine.logout(&alice).await, 1);
    assert!(matches!(
        engine.list_tasks(&alice).await,
        Err(ControlError::OwnerNotIdentified { .. })
    ));

    // Logout ends the owner's observers.
    tokio::time::timeout(Duration::from_secs(5), async {
        while obs.recv().await.is_some() {}
    })
    .await
    .unwrap();
}
