//! Event dispatcher integration tests
//!
//! Covers per-channel ordering, lane isolation, and drain on shutdown.

use std::sync::Arc;

use hearth_agent::memory;
use hearth_agent::{Dispatcher, GeneratedContent, MemoryStore, PipelineSettings};

mod common;
use common::{StubGenerator, build_agent, build_agent_with, dm_with, event_payload, wallet};

#[tokio::test]
async fn test_events_on_a_channel_run_in_order() {
    let agent = build_agent(StubGenerator::sequence(vec![
        GeneratedContent::text("r1"),
        GeneratedContent::text("r2"),
        GeneratedContent::text("r3"),
    ]));
    let user = wallet('b');
    let channel = dm_with(&user);
    let dispatcher = Dispatcher::new(Arc::new(agent.runtime));

    for (id, text) in [(1, "first"), (2, "second"), (3, "third")] {
        dispatcher
            .enqueue(&channel, event_payload(&channel, id, &user, text))
            .await
            .unwrap();
    }
    assert_eq!(dispatcher.active_lanes().await, 1);
    dispatcher.shutdown().await;

    // Replies were scripted in order, so each must answer its own trigger.
    let turns = agent.store.recent_memories(memory::room_id(&channel), 20).await.unwrap();
    for (text, remote_id) in [("r1", 1), ("r2", 2), ("r3", 3)] {
        let reply = turns.iter().find(|t| t.content.text == text).unwrap();
        assert_eq!(reply.content.in_reply_to, Some(memory::turn_id(&channel, remote_id)));
    }
    assert_eq!(agent.generator.calls(), 3);
    assert_eq!(agent.transport.sent().await.len(), 3);
}

#[tokio::test]
async fn test_channels_get_separate_lanes() {
    let agent = build_agent(StubGenerator::of(GeneratedContent::text("hi")));
    let alice = wallet('a');
    let bob = wallet('b');
    let first = dm_with(&alice);
    let second = dm_with(&bob);
    let dispatcher = Dispatcher::new(Arc::new(agent.runtime));

    dispatcher.enqueue(&first, event_payload(&first, 1, &alice, "hello")).await.unwrap();
    dispatcher.enqueue(&second, event_payload(&second, 1, &bob, "hello")).await.unwrap();
    assert_eq!(dispatcher.active_lanes().await, 2);

    dispatcher.shutdown().await;
    let sent = agent.transport.sent().await;
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|m| m.sender == agent.profile.identity));
}

#[tokio::test]
async fn test_shutdown_drains_bounded_queue() {
    let agent = build_agent_with(
        StubGenerator::of(GeneratedContent::text("ack")),
        PipelineSettings { queue_capacity: 2, ..PipelineSettings::default() },
    );
    let user = wallet('c');
    let channel = dm_with(&user);
    let dispatcher = Dispatcher::new(Arc::new(agent.runtime));

    // More events than the queue holds; enqueue waits for the worker.
    for id in 1..=5 {
        dispatcher
            .enqueue(&channel, event_payload(&channel, id, &user, "ping"))
            .await
            .unwrap();
    }
    dispatcher.shutdown().await;

    assert_eq!(agent.transport.sent().await.len(), 5);
    // Every run flips thinking, typing, then idle.
    assert_eq!(agent.transport.statuses().await.len(), 15);
}
