// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use ndm_core::{DestCode, DestSpec, MsgsSpec, TypeSet};

fn file_msgs(path: &std::path::Path) -> Arc<Messages> {
    let mut dest = DestSpec::new(DestCode::File);
    dest.targets.push(path.display().to_string());
    dest.types = TypeSet::all();
    let mut spec = MsgsSpec::default();
    spec.push(dest);
    Messages::new(spec)
}

#[test]
fn queued_messages_drain_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("q.log");
    let env = DaemonEnv::new("qtest", dir.path());
    let job = JobCtx::new("job", 1).with_msgs(file_msgs(&log));

    for i in 0..4 {
        queue_msg(&env, Some(&job), MessageType::Info, 1, &format!("q{i}"));
    }
    assert_eq!(job.queued(), 4);
    assert!(!log.exists(), "queueing must not deliver");

    dequeue_messages(&env, Some(&job));
    assert_eq!(job.queued(), 0);

    let content = std::fs::read_to_string(&log).unwrap();
    let positions: Vec<usize> = (0..4)
        .map(|i| content.find(&format!("q{i}")).unwrap())
        .collect();
    let mut sorted = positions.clone();
    sorted.sort_unstable();
    assert_eq!(positions, sorted);
}

#[test]
fn jobless_messages_use_the_daemon_queue() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("d.log");
    let env = DaemonEnv::new("qtest", dir.path());
    *env.default_msgs.write() = Some(file_msgs(&log));

    queue_msg(&env, None, MessageType::Warning, 1, "from watchdog");
    assert_eq!(env.daemon_queue.lock().len(), 1);

    dequeue_messages(&env, None);
    assert!(env.daemon_queue.lock().is_empty());
    assert!(std::fs::read_to_string(&log).unwrap().contains("from watchdog"));
}

#[test]
fn empty_queues_are_cheap() {
    let dir = tempfile::tempdir().unwrap();
    let env = DaemonEnv::new("qtest", dir.path());
    let job = JobCtx::new("job", 1);
    dequeue_messages(&env, Some(&job));
    dequeue_messages(&env, None);
}
