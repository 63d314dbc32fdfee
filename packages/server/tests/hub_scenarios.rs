//! Hub scenarios: fan-out, multi-connection users, backpressure, shutdown and
//! domain-event routing.

mod common;

use std::{sync::Arc, time::Duration};

use flowra_realtime::{
    config::HubConfig,
    domain::{DomainEvent, RoomId, UserId},
    infrastructure::event_bus::InMemoryEventBus,
    realtime::{Broadcaster, Connection, HubState},
};
use serde_json::json;

use common::*;

// ========================================
// テスト作業記録
// ========================================
// 【何をテストするか】
// - S1: ルーム参加とブロードキャスト
// - S2: ルーム外の接続には配信されない
// - S3: 同一ユーザーの複数接続と presence
// - S4: 送信キュー満杯時の破棄（ブロックしない）
// - S5: グレースフルシャットダウン
// - S6: Broadcaster によるドメインイベントの配信
//
// 【テスト方法】
// - ポンプを介さず、送信キュー（OutboundReceiver）を直接読む
// - presence.changed は配信の検証では読み飛ばす
// ========================================

#[tokio::test]
async fn test_s1_join_and_broadcast() {
    // テスト項目: 同じルームの全接続にブロードキャストが一度ずつ順番どおりに届く
    // given (前提条件):
    let (hub, cancel, handle) = start_hub(HubConfig::default());
    let (u1, u2) = (UserId::generate(), UserId::generate());
    let room = RoomId::generate();
    let (c1, mut rx1) = register(&hub, u1).await;
    let (c2, mut rx2) = register(&hub, u2).await;
    hub.join_room(&c1, room).await;
    hub.join_room(&c2, room).await;

    // when (操作):
    hub.broadcast_to_room(room, json!({"type": "test", "seq": 1}).to_string());
    hub.broadcast_to_room(room, json!({"type": "test", "seq": 2}).to_string());

    // then (期待する結果):
    for rx in [&mut rx1, &mut rx2] {
        assert_eq!(next_payload(rx).await["seq"], 1);
        assert_eq!(next_payload(rx).await["seq"], 2);
        expect_no_payload(rx).await;
    }
    let presence = hub.room_presence(&[u1, u2]);
    assert_eq!(presence.get(&u1), Some(&true));
    assert_eq!(presence.get(&u2), Some(&true));

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_s2_fan_out_skips_non_members() {
    // テスト項目: 別のルームに参加している接続にはブロードキャストが届かない
    // given (前提条件):
    let (hub, cancel, handle) = start_hub(HubConfig::default());
    let (room, other_room) = (RoomId::generate(), RoomId::generate());
    let (c1, mut rx1) = register(&hub, UserId::generate()).await;
    let (c2, mut rx2) = register(&hub, UserId::generate()).await;
    hub.join_room(&c1, room).await;
    hub.join_room(&c2, other_room).await;

    // when (操作):
    hub.broadcast_to_room(room, json!({"type": "test"}).to_string());

    // then (期待する結果):
    assert_eq!(next_payload(&mut rx1).await["type"], "test");
    expect_no_payload(&mut rx2).await;

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_s3_multiple_connections_per_user() {
    // テスト項目: ユーザー宛の送信は全接続に届き、最後の接続が切れるまで offline は通知されない
    // given (前提条件):
    let (hub, cancel, handle) = start_hub(HubConfig::default());
    let u1 = UserId::generate();
    let room = RoomId::generate();
    let (c1a, mut rx1a) = register(&hub, u1).await;
    let (c1b, mut rx1b) = register(&hub, u1).await;
    let (observer, mut observer_rx) = register(&hub, UserId::generate()).await;
    hub.join_room(&observer, room).await;
    hub.join_room(&c1a, room).await;
    hub.join_room(&c1b, room).await;
    drain(&mut rx1a);
    drain(&mut rx1b);

    // when (操作):
    hub.send_to_user(u1, json!({"type": "direct", "n": 1}).to_string());

    // then (期待する結果):
    assert_eq!(next_payload(&mut rx1a).await["n"], 1);
    assert_eq!(next_payload(&mut rx1b).await["n"], 1);

    // observer saw its own online edge, then exactly one for u1
    assert_eq!(next_frame(&mut observer_rx).await["type"], "presence.changed");
    let online = next_frame(&mut observer_rx).await;
    assert_eq!(
        online,
        json!({"type": "presence.changed", "user_id": u1.to_string(), "is_online": true})
    );

    // when (操作):
    hub.unregister(&c1a).await;
    hub.send_to_user(u1, json!({"type": "direct", "n": 2}).to_string());

    // then (期待する結果):
    assert_eq!(next_payload(&mut rx1b).await["n"], 2);
    assert!(c1a.is_closed());
    assert!(hub.room_presence(&[u1])[&u1]);
    assert!(
        tokio::time::timeout(QUIET_PERIOD, observer_rx.recv())
            .await
            .is_err(),
        "no presence change while c1b is attached"
    );

    // when (操作):
    hub.unregister(&c1b).await;

    // then (期待する結果):
    let offline = next_frame(&mut observer_rx).await;
    assert_eq!(
        offline,
        json!({"type": "presence.changed", "user_id": u1.to_string(), "is_online": false})
    );
    assert!(!hub.room_presence(&[u1])[&u1]);

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_presence_follows_rooms_left_and_rejoined() {
    // テスト項目: 退出済みのルームには offline が届かず、再参加すると online が再度届く
    // given (前提条件):
    let (hub, cancel, handle) = start_hub(HubConfig::default());
    let user = UserId::generate();
    let room = RoomId::generate();
    let (observer, mut observer_rx) = register(&hub, UserId::generate()).await;
    hub.join_room(&observer, room).await;
    let (first, _first_rx) = register(&hub, user).await;
    hub.join_room(&first, room).await;
    hub.leave_room(&first, room).await;
    drain(&mut observer_rx);

    // when (操作):
    hub.unregister(&first).await;

    // then (期待する結果):
    assert!(first.rooms().is_empty());
    assert!(
        tokio::time::timeout(QUIET_PERIOD, observer_rx.recv())
            .await
            .is_err(),
        "no offline edge for a room the user already left"
    );

    // when (操作):
    let (second, _second_rx) = register(&hub, user).await;
    hub.join_room(&second, room).await;
    hub.leave_room(&second, room).await;
    let (late, mut late_rx) = register(&hub, UserId::generate()).await;
    hub.join_room(&late, room).await;
    drain(&mut late_rx);
    hub.join_room(&second, room).await;

    // then (期待する結果):
    assert_eq!(
        next_frame(&mut late_rx).await,
        json!({"type": "presence.changed", "user_id": user.to_string(), "is_online": true})
    );

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_s4_backpressure_drops_for_the_slow_connection_only() {
    // テスト項目: 送信キューが満杯の接続ではフレームが破棄されるが、接続は維持され他の接続には届く
    // given (前提条件):
    let (hub, cancel, handle) = start_hub(HubConfig::default());
    let room = RoomId::generate();

    // slow: capacity 2, never read until the end
    let (slow, mut slow_rx) = Connection::new(UserId::generate(), 2);
    assert!(hub.register(slow.clone()).await);
    let (fast, mut fast_rx) = register(&hub, UserId::generate()).await;
    hub.join_room(&slow, room).await; // slow: 1 frame (own online edge)
    hub.join_room(&fast, room).await; // slow: 2 frames (fast's online edge), now full

    // when (操作):
    let started = tokio::time::Instant::now();
    hub.broadcast_to_room(room, json!({"type": "test"}).to_string());

    // then (期待する結果):
    assert!(started.elapsed() < Duration::from_millis(100));
    assert_eq!(next_payload(&mut fast_rx).await["type"], "test");
    wait_until(|| hub.stats().dropped_frames == 1).await;
    assert!(!slow.is_closed());
    let queued = drain(&mut slow_rx);
    assert_eq!(queued.len(), 2);
    assert!(queued.iter().all(|f| f["type"] == "presence.changed"));

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_s5_graceful_shutdown() {
    // テスト項目: キャンセルで全接続のトランスポートとキューが一度だけ閉じられ、以降の操作は何もしない
    // given (前提条件):
    let (hub, cancel, handle) = start_hub(HubConfig::default());
    let rooms = [RoomId::generate(), RoomId::generate()];
    let mut attached = Vec::new();
    for i in 0..4 {
        let (connection, peer, serve) = attach(&hub, UserId::generate()).await;
        hub.join_room(&connection, rooms[i % rooms.len()]).await;
        attached.push((connection, peer, serve));
    }

    // when (操作):
    cancel.cancel();
    tokio::time::timeout(RECV_TIMEOUT, handle)
        .await
        .expect("hub did not stop in time")
        .unwrap();

    // then (期待する結果):
    assert_eq!(hub.state(), HubState::Stopped);
    for (connection, mut peer, serve) in attached {
        peer.expect_close().await;
        tokio::time::timeout(RECV_TIMEOUT, serve)
            .await
            .expect("pumps did not stop")
            .unwrap();
        assert!(connection.is_closed());
        assert!(!connection.close(), "queue must be closed exactly once");
    }

    let (late, _late_rx) = hub.connect(UserId::generate());
    assert!(!hub.register(late.clone()).await);
    hub.join_room(&late, rooms[0]).await;
    hub.broadcast_to_room(rooms[0], "ignored");
    hub.send_to_user(late.user_id(), "ignored");
    hub.unregister(&late).await;
    let stats = hub.stats();
    assert_eq!((stats.connections, stats.users, stats.rooms), (0, 0, 0));
}

#[tokio::test]
async fn test_s6_broadcaster_routing() {
    // テスト項目: notification.created はユーザーの全接続に、message.sent はルームの全接続に届く
    // given (前提条件):
    let (hub, cancel, handle) = start_hub(HubConfig::default());
    let bus = Arc::new(InMemoryEventBus::new());
    let broadcaster = Broadcaster::new(
        hub.clone(),
        bus.clone(),
        HubConfig::default().event_types,
    );
    broadcaster.start().await.unwrap();

    let (u1, u2) = (UserId::generate(), UserId::generate());
    let room = RoomId::generate();
    let (_c1a, mut rx1a) = register(&hub, u1).await;
    let (_c1b, mut rx1b) = register(&hub, u1).await;
    let (c2, mut rx2) = register(&hub, u2).await;

    // when (操作):
    let notification = DomainEvent::new("notification.created", uuid::Uuid::new_v4(), "notification")
        .with_user(u1)
        .with_payload(br#"{"title":"hello"}"#.to_vec());
    assert_eq!(bus.publish(&notification).await, Ok(1));

    // then (期待する結果):
    for rx in [&mut rx1a, &mut rx1b] {
        let frame = next_payload(rx).await;
        assert_eq!(frame["type"], "notification.new");
        assert_eq!(frame["data"]["title"], "hello");
        expect_no_payload(rx).await;
    }
    expect_no_payload(&mut rx2).await;

    // when (操作):
    hub.join_room(&c2, room).await;
    let message = DomainEvent::new("message.sent", *room.as_uuid(), "chat")
        .with_payload(br#"{"text":"hi"}"#.to_vec());
    bus.publish(&message).await.unwrap();

    // then (期待する結果):
    let frame = next_payload(&mut rx2).await;
    assert_eq!(frame["type"], "message.new");
    assert_eq!(frame["chat_id"], room.to_string());
    assert_eq!(frame["data"], json!({"text": "hi"}));
    expect_no_payload(&mut rx2).await;
    expect_no_payload(&mut rx1a).await;

    // a second start adds no handlers
    broadcaster.start().await.unwrap();
    assert_eq!(bus.handler_count("message.sent"), 1);

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_unknown_event_kind_is_ignored() {
    // テスト項目: 対応表に無いイベント種別は購読されず、どこにも配信されない
    // given (前提条件):
    let (hub, cancel, handle) = start_hub(HubConfig::default());
    let bus = Arc::new(InMemoryEventBus::new());
    let broadcaster = Broadcaster::new(hub.clone(), bus.clone(), vec!["user.renamed".to_string()]);
    broadcaster.start().await.unwrap();
    let (_c, mut rx) = register(&hub, UserId::generate()).await;

    // when (操作):
    let handled = bus
        .publish(&DomainEvent::new("user.renamed", uuid::Uuid::new_v4(), "user"))
        .await;

    // then (期待する結果):
    assert_eq!(bus.handler_count("user.renamed"), 0);
    assert_eq!(handled, Ok(0));
    expect_no_payload(&mut rx).await;

    cancel.cancel();
    handle.await.unwrap();
}
