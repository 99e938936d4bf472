use std::sync::Arc;
use std::time::Duration;

use beach_call::media::{LoggingSink, MediaSink, StreamRef};
use beach_call::mock::{MockCapture, MockSessionFactory};
use beach_call::{CallOrchestrator, CallResult, Collaborators, UserDirectory};
use call_signaling::{LocalHub, PeerId};
use tokio::task::JoinHandle;
use tokio::time::sleep;

struct Client {
    id: PeerId,
    directory: UserDirectory,
    sessions: MockSessionFactory,
    remote_sink: Arc<LoggingSink>,
    task: JoinHandle<CallResult<()>>,
}

async fn join(hub: &LocalHub, name: &str) -> Client {
    let (id, channel) = hub.connect_as(name);
    let (signaling, inbound) = channel.into_parts();
    let directory = UserDirectory::new();
    let sessions = MockSessionFactory::new();
    let remote_sink = Arc::new(LoggingSink::new("remote"));
    let mut orchestrator = CallOrchestrator::new(Collaborators {
        signaling,
        capture: Arc::new(MockCapture::new(format!("{name}-camera"))),
        sessions: Arc::new(sessions.clone()),
        directory: directory.clone(),
        local_sink: Arc::new(LoggingSink::new("local")),
        remote_sink: remote_sink.clone(),
    });
    orchestrator.start().await.expect("start");
    let task = tokio::spawn(orchestrator.run(inbound));
    Client {
        id,
        directory,
        sessions,
        remote_sink,
        task,
    }
}

async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn selecting_a_user_connects_both_sides() {
    let hub = LocalHub::new();
    let alice = join(&hub, "alice").await;
    let bob = join(&hub, "bob").await;

    assert!(
        wait_until(|| alice.directory.contains(&bob.id)).await,
        "alice never saw bob"
    );
    assert!(bob.directory.contains(&alice.id));
    alice.directory.select(&bob.id).expect("select bob");

    assert!(
        wait_until(|| {
            alice.remote_sink.attached() == Some(StreamRef::new("remote-bob"))
                && bob.remote_sink.attached() == Some(StreamRef::new("remote-alice"))
        })
        .await,
        "remote streams never attached"
    );
    assert!(
        wait_until(|| {
            alice.sessions.applied_candidates(&bob.id).len() == 1
                && bob.sessions.applied_candidates(&alice.id).len() == 1
        })
        .await,
        "candidates never crossed"
    );
    assert_eq!(alice.sessions.sessions_opened(&bob.id), 1);
    assert_eq!(bob.sessions.sessions_opened(&alice.id), 1);
    assert_eq!(
        alice.sessions.local_stream(&bob.id).as_deref(),
        Some("alice-camera")
    );
    assert_eq!(
        bob.directory.talking_with_label(),
        None,
        "answering does not select on the callee side"
    );

    hub.relay().leave(&alice.id);
    tokio::time::timeout(Duration::from_secs(2), alice.task)
        .await
        .expect("alice stopped")
        .expect("join")
        .expect("alice run");
    assert!(alice.sessions.is_closed(&bob.id));
    assert!(
        wait_until(|| bob.sessions.is_closed(&alice.id)).await,
        "bob kept a connection to a departed user"
    );
    assert!(!bob.directory.contains(&alice.id));

    hub.relay().leave(&bob.id);
    tokio::time::timeout(Duration::from_secs(2), bob.task)
        .await
        .expect("bob stopped")
        .expect("join")
        .expect("bob run");
}

#[tokio::test]
async fn late_joiner_sees_everyone_already_online() {
    let hub = LocalHub::new();
    let first = join(&hub, "first").await;
    let second = join(&hub, "second").await;
    let late = join(&hub, "late").await;

    assert!(
        wait_until(|| late.directory.contains(&first.id) && late.directory.contains(&second.id))
            .await
    );
    assert!(wait_until(|| first.directory.entries().len() == 2).await);
    assert_eq!(late.directory.entries().len(), 2);

    for client in [first, second, late] {
        hub.relay().leave(&client.id);
        tokio::time::timeout(Duration::from_secs(2), client.task)
            .await
            .expect("stopped")
            .expect("join")
            .expect("run");
    }
}
