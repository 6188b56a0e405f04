//! End-to-end negotiation tests driving the coordinator against the
//! loopback engine, covering the full client sequence (capabilities →
//! create-transport → connect → send/recv-track → resume) plus eviction
//! and cascade behavior.
//!
//! Run with: cargo test --test negotiation

use std::sync::Arc;

use confab_signal::{
    ConsumerId, Coordinator, EngineConfig, EngineEvent, LoopbackEngine, MediaEngine, MediaKind,
    PeerId, RoomId, SignalError, SignalingConfig, TransportDirection, TransportOptions,
};
use serde_json::json;

fn harness() -> (Arc<Coordinator>, Arc<LoopbackEngine>) {
    let engine = Arc::new(LoopbackEngine::new(EngineConfig::default()));
    let coordinator = Coordinator::new(SignalingConfig::default(), engine.clone());
    (coordinator, engine)
}

/// Two logged-in users joined to one room
async fn room_with_two_peers(coordinator: &Coordinator) -> (RoomId, PeerId, PeerId) {
    let host = coordinator.login();
    let guest = coordinator.login();
    let room = coordinator.create_room(host.id()).expect("create room");
    let room_id = room.id().clone();

    let (sender, caps) = coordinator.join(&room_id, host.id()).await.expect("join host");
    assert!(caps["codecs"].is_array());
    let (receiver, _) = coordinator.join(&room_id, guest.id()).await.expect("join guest");

    (room_id, sender, receiver)
}

async fn connected_transport(
    coordinator: &Coordinator,
    peer: &PeerId,
    direction: TransportDirection,
) -> TransportOptions {
    let options = coordinator
        .create_transport(peer, direction)
        .await
        .expect("create transport");
    coordinator
        .connect_transport(peer, &options.id, json!({"role": "client", "fingerprints": []}))
        .await
        .expect("connect transport");
    options
}

#[tokio::test]
async fn test_full_negotiation_sequence() {
    let (coordinator, _engine) = harness();
    let (_room_id, sender, receiver) = room_with_two_peers(&coordinator).await;

    let send = connected_transport(&coordinator, &sender, TransportDirection::Send).await;
    let producer_id = coordinator
        .send_track(
            &sender,
            &send.id,
            MediaKind::Video,
            json!({"codecs": [], "encodings": [{"ssrc": 1111}]}),
            false,
            json!({"mediaTag": "cam-video"}),
        )
        .await
        .expect("send track");

    connected_transport(&coordinator, &receiver, TransportDirection::Recv).await;
    let grant = coordinator
        .recv_track(&receiver, &sender, "cam-video", json!({"codecs": []}))
        .await
        .expect("recv track");

    assert_eq!(grant.producer_id, producer_id);
    assert_eq!(grant.kind, MediaKind::Video);
    assert!(!grant.producer_paused);
    assert!(grant.rtp_parameters["codecs"].is_array());

    coordinator
        .resume_consumer(&receiver, &grant.id)
        .await
        .expect("resume consumer");

    // Resuming an already-resumed consumer stays a success.
    coordinator
        .resume_consumer(&receiver, &grant.id)
        .await
        .expect("repeat resume");

    // The sync snapshot reflects the whole room.
    let snapshot = coordinator.sync(&sender).expect("sync");
    assert_eq!(snapshot.peers.len(), 2);
    let sender_view = &snapshot.peers[sender.as_str()];
    assert!(!sender_view.media["cam-video"].paused);
    assert_eq!(
        sender_view.media["cam-video"].encodings,
        json!([{"ssrc": 1111}])
    );
    let receiver_view = &snapshot.peers[receiver.as_str()];
    assert!(receiver_view.consumer_layers.contains_key(&grant.id));
}

#[tokio::test]
async fn test_duplicate_recv_track_is_rejected() {
    let (coordinator, engine) = harness();
    let (_room_id, sender, receiver) = room_with_two_peers(&coordinator).await;

    let send = connected_transport(&coordinator, &sender, TransportDirection::Send).await;
    coordinator
        .send_track(
            &sender,
            &send.id,
            MediaKind::Video,
            json!({"codecs": []}),
            false,
            json!({"mediaTag": "cam-video"}),
        )
        .await
        .expect("send track");
    connected_transport(&coordinator, &receiver, TransportDirection::Recv).await;

    coordinator
        .recv_track(&receiver, &sender, "cam-video", json!({"codecs": []}))
        .await
        .expect("first recv track");
    let consumers_after_first = engine.consumer_count();

    let err = coordinator
        .recv_track(&receiver, &sender, "cam-video", json!({"codecs": []}))
        .await
        .expect_err("duplicate must be rejected");
    assert!(matches!(err, SignalError::DuplicateConsumer { .. }));

    // No second consumer leaked into the engine.
    assert_eq!(engine.consumer_count(), consumers_after_first);
}

#[tokio::test]
async fn test_out_of_order_calls_are_rejected() {
    let (coordinator, _engine) = harness();
    let (_room_id, sender, receiver) = room_with_two_peers(&coordinator).await;

    // Connect before create-transport.
    let err = coordinator
        .connect_transport(&sender, &"t-unknown".into(), json!({}))
        .await
        .expect_err("unknown transport");
    assert_eq!(err.to_string(), "server-side transport t-unknown not found");

    // Send-track over a recv transport.
    let recv = connected_transport(&coordinator, &sender, TransportDirection::Recv).await;
    let err = coordinator
        .send_track(
            &sender,
            &recv.id,
            MediaKind::Audio,
            json!({"codecs": []}),
            false,
            json!({"mediaTag": "cam-audio"}),
        )
        .await
        .expect_err("wrong direction");
    assert!(matches!(err, SignalError::InvalidState(_)));

    // Recv-track before the source published anything.
    let err = coordinator
        .recv_track(&receiver, &sender, "cam-video", json!({"codecs": []}))
        .await
        .expect_err("no producer yet");
    assert!(matches!(err, SignalError::ProducerNotFound { .. }));

    // Recv-track without a recv transport on the subscriber.
    let send = connected_transport(&coordinator, &sender, TransportDirection::Send).await;
    coordinator
        .send_track(
            &sender,
            &send.id,
            MediaKind::Video,
            json!({"codecs": []}),
            false,
            json!({"mediaTag": "cam-video"}),
        )
        .await
        .expect("send track");
    let err = coordinator
        .recv_track(&receiver, &sender, "cam-video", json!({"codecs": []}))
        .await
        .expect_err("no recv transport");
    assert_eq!(
        err.to_string(),
        format!("server-side recv transport for {receiver} not found")
    );

    // Resume of a consumer that never existed.
    let err = coordinator
        .resume_consumer(&receiver, &ConsumerId::from("c-unknown"))
        .await
        .expect_err("unknown consumer");
    assert!(matches!(err, SignalError::ConsumerNotFound(_)));
}

#[tokio::test]
async fn test_incompatible_capabilities() {
    let (coordinator, _engine) = harness();
    let (_room_id, sender, receiver) = room_with_two_peers(&coordinator).await;

    let send = connected_transport(&coordinator, &sender, TransportDirection::Send).await;
    coordinator
        .send_track(
            &sender,
            &send.id,
            MediaKind::Video,
            json!({"codecs": []}),
            false,
            json!({"mediaTag": "cam-video"}),
        )
        .await
        .expect("send track");
    connected_transport(&coordinator, &receiver, TransportDirection::Recv).await;

    // The loopback engine rejects non-object capability blobs.
    let err = coordinator
        .recv_track(&receiver, &sender, "cam-video", json!(null))
        .await
        .expect_err("capability check must fail");
    assert!(matches!(err, SignalError::IncompatibleCapabilities { .. }));
}

#[tokio::test]
async fn test_one_transport_per_direction() {
    let (coordinator, engine) = harness();
    let (_room_id, sender, _receiver) = room_with_two_peers(&coordinator).await;

    let first = coordinator
        .create_transport(&sender, TransportDirection::Send)
        .await
        .expect("first transport");
    let second = coordinator
        .create_transport(&sender, TransportDirection::Send)
        .await
        .expect("replacement transport");
    assert_ne!(first.id, second.id);

    // The replaced transport was closed on the engine as well.
    assert_eq!(engine.transport_count(), 1);

    // Operations against the replaced transport now fail.
    let err = coordinator
        .connect_transport(&sender, &first.id, json!({}))
        .await
        .expect_err("old transport is gone");
    assert!(matches!(err, SignalError::TransportNotFound(_)));
}

#[tokio::test]
async fn test_stale_peer_eviction_cascades() {
    let (coordinator, engine) = harness();
    let (_room_id, sender, receiver) = room_with_two_peers(&coordinator).await;

    let send = connected_transport(&coordinator, &sender, TransportDirection::Send).await;
    coordinator
        .send_track(
            &sender,
            &send.id,
            MediaKind::Video,
            json!({"codecs": []}),
            false,
            json!({"mediaTag": "cam-video"}),
        )
        .await
        .expect("send track");
    connected_transport(&coordinator, &receiver, TransportDirection::Recv).await;
    coordinator
        .recv_track(&receiver, &sender, "cam-video", json!({"codecs": []}))
        .await
        .expect("recv track");

    // Nobody synced for longer than the staleness window.
    let stale_ms = coordinator.config().peer_stale_ms as i64;
    coordinator
        .sweep_stale_peers(Coordinator::now_ms() + stale_ms + 1)
        .await;

    assert_eq!(coordinator.sync(&sender).expect_err("evicted").to_string(), "not connected");
    assert_eq!(coordinator.sync(&receiver).expect_err("evicted").to_string(), "not connected");
    assert_eq!(engine.transport_count(), 0);
    assert_eq!(engine.producer_count(), 0);
    assert_eq!(engine.consumer_count(), 0);
}

#[tokio::test]
async fn test_sync_keeps_peer_alive() {
    let (coordinator, _engine) = harness();
    let (_room_id, sender, _receiver) = room_with_two_peers(&coordinator).await;

    // A sweep inside the window evicts nobody.
    coordinator.sweep_stale_peers(Coordinator::now_ms()).await;
    assert!(coordinator.sync(&sender).is_ok());
}

#[tokio::test]
async fn test_engine_transport_close_event_cascades() {
    let (coordinator, _engine) = harness();
    let (_room_id, sender, receiver) = room_with_two_peers(&coordinator).await;

    let send = connected_transport(&coordinator, &sender, TransportDirection::Send).await;
    coordinator
        .send_track(
            &sender,
            &send.id,
            MediaKind::Video,
            json!({"codecs": []}),
            false,
            json!({"mediaTag": "cam-video"}),
        )
        .await
        .expect("send track");
    connected_transport(&coordinator, &receiver, TransportDirection::Recv).await;
    let grant = coordinator
        .recv_track(&receiver, &sender, "cam-video", json!({"codecs": []}))
        .await
        .expect("recv track");

    // The engine reports the sender's transport gone; the producer and the
    // receiver's consumer must follow.
    coordinator
        .handle_event(EngineEvent::TransportClosed {
            transport_id: send.id.clone(),
        })
        .await;

    let err = coordinator
        .resume_consumer(&receiver, &grant.id)
        .await
        .expect_err("consumer closed by cascade");
    assert!(matches!(err, SignalError::AlreadyClosed(_)));

    let snapshot = coordinator.sync(&sender).expect("sender still connected");
    assert!(snapshot.peers[sender.as_str()].media.is_empty());
    assert!(snapshot.peers[receiver.as_str()].consumer_layers.is_empty());
}

#[tokio::test]
async fn test_rejoin_replaces_peer_record() {
    let (coordinator, engine) = harness();
    let host = coordinator.login();
    let room = coordinator.create_room(host.id()).expect("room");
    let room_id = room.id().clone();

    let (first, _) = coordinator.join(&room_id, host.id()).await.expect("join");
    coordinator
        .create_transport(&first, TransportDirection::Send)
        .await
        .expect("transport");

    let (second, _) = coordinator.join(&room_id, host.id()).await.expect("rejoin");
    assert_eq!(first, second);
    assert_eq!(room.peer_count(), 1);
    // The old peer's transport went away with the old record.
    assert_eq!(engine.transport_count(), 0);
}

#[tokio::test]
async fn test_stats_refresh_populates_sync_snapshot() {
    let (coordinator, _engine) = harness();
    let (_room_id, sender, receiver) = room_with_two_peers(&coordinator).await;

    let send = connected_transport(&coordinator, &sender, TransportDirection::Send).await;
    let producer_id = coordinator
        .send_track(
            &sender,
            &send.id,
            MediaKind::Video,
            json!({"codecs": []}),
            false,
            json!({"mediaTag": "cam-video"}),
        )
        .await
        .expect("send track");
    connected_transport(&coordinator, &receiver, TransportDirection::Recv).await;
    let grant = coordinator
        .recv_track(&receiver, &sender, "cam-video", json!({"codecs": []}))
        .await
        .expect("recv track");

    coordinator.refresh_stats().await;

    let snapshot = coordinator.sync(&sender).expect("sync");
    let producer_stats = &snapshot.peers[sender.as_str()].stats[producer_id.as_str()];
    assert!(producer_stats[0].bitrate.is_some());
    let consumer_stats = &snapshot.peers[receiver.as_str()].stats[grant.id.as_str()];
    assert!(consumer_stats[0].bitrate.is_some());
}

#[tokio::test]
async fn test_volume_events_reach_sync_response() {
    let (coordinator, engine) = harness();
    let (_room_id, sender, _receiver) = room_with_two_peers(&coordinator).await;

    let send = connected_transport(&coordinator, &sender, TransportDirection::Send).await;
    let producer_id = coordinator
        .send_track(
            &sender,
            &send.id,
            MediaKind::Audio,
            json!({"codecs": []}),
            false,
            json!({"mediaTag": "cam-audio"}),
        )
        .await
        .expect("send track");

    // Pump engine events through the coordinator by hand; the maintenance
    // tasks would normally do this.
    let mut events = engine.subscribe();
    engine.emit_volume(&producer_id, -38);
    while let Ok(event) = events.try_recv() {
        coordinator.handle_event(event).await;
    }

    let snapshot = coordinator.sync(&sender).expect("sync");
    assert_eq!(snapshot.active_speaker.producer_id, Some(producer_id));
    assert_eq!(snapshot.active_speaker.volume, Some(-38));
    assert_eq!(snapshot.active_speaker.peer_id, Some(sender));
}
