//! End-to-end scenarios over a mock transport.

use ddp_client::{ConnectionConfig, ConnectionEvent, ConnectionState, ErrorKind};
use ddp_protocol::ClientMessage;
use ddp_testkit::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn call_result_then_updated() {
    let client = TestClient::connected();
    let call = client
        .connection
        .call("math.add", vec![json!(2), json!(3)]);
    assert_eq!(
        client.take_sent(),
        vec![ClientMessage::Method {
            method: "math.add".into(),
            params: vec![json!(2), json!(3)],
            id: call.id(),
        }]
    );

    client.deliver(result_ok(&call.id(), json!(5)));
    client.deliver(updated(&[&call.id()]));

    assert!(client.connection.pending_calls().is_empty());
    assert_eq!(call.result(), json!(5));
    assert!(call.has_result() && call.has_updated());
}

#[test]
fn subscription_data_then_ready() {
    let client = TestClient::connected();
    let sub = client.connection.subscribe("items", vec![]);
    assert_eq!(sub.id(), "0");

    client.deliver(added("items", "a", json!({"x": 1})));
    client.deliver(ready(&["0"]));

    assert!(sub.is_ready());
    assert_eq!(
        client.documents("items").get("a"),
        Some(&fields(json!({"x": 1})))
    );
}

#[test]
fn unclean_close_keeps_registries_and_replays_them_first() {
    let client = TestClient::connected();
    let sub = client.connection.subscribe("items", vec![json!("all")]);
    let call = client.connection.call("slow", vec![]);
    client.take_sent();

    client.drop_transport();
    assert_eq!(client.connection.state(), ConnectionState::Disconnected);
    assert_eq!(client.take_events(), vec![ConnectionEvent::Disconnected]);
    assert_eq!(client.connection.active_subscriptions().len(), 1);
    assert_eq!(client.connection.pending_calls().len(), 1);

    client.connection.connect().unwrap();
    client.open_transport();
    let later = client.connection.call("later", vec![]);

    let sent = client.take_sent();
    assert_eq!(
        sent,
        vec![
            ClientMessage::Connect {
                session: Some("s1".into()),
                version: "1".into(),
                support: vec!["1".into()],
            },
            ClientMessage::Sub {
                id: sub.id(),
                name: "items".into(),
                params: vec![json!("all")],
            },
            ClientMessage::Method {
                method: "slow".into(),
                params: vec![],
                id: call.id(),
            },
            ClientMessage::Method {
                method: "later".into(),
                params: vec![],
                id: later.id(),
            },
        ]
    );
}

#[test]
fn clean_close_drops_everything() {
    let client = TestClient::connected();
    let sub = client.connection.subscribe("items", vec![]);
    let call = client.connection.call("slow", vec![]);
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    call.on_result(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    client.close_cleanly();
    assert_eq!(client.connection.state(), ConnectionState::Closed);
    assert_eq!(client.connection.session(), None);
    assert!(client.connection.active_subscriptions().is_empty());
    assert!(client.connection.pending_calls().is_empty());
    assert!(!sub.is_active());
    assert_eq!(client.take_events(), vec![ConnectionEvent::Closed]);

    // A late result for the dropped call is ignored.
    client.deliver(result_ok(&call.id(), json!(1)));
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert!(!call.has_result());
}

#[test]
fn reconnect_after_clean_close_starts_fresh() {
    let client = TestClient::connected();
    client.connection.subscribe("items", vec![]);
    client.close_cleanly();
    client.take_sent();

    client.connect_with_session("s2");
    let sent = client.take_sent();
    assert_eq!(
        sent,
        vec![ClientMessage::Connect {
            session: None,
            version: "1".into(),
            support: vec!["1".into()],
        }]
    );
    assert_eq!(client.connection.session().as_deref(), Some("s2"));

    // Ids keep counting after a clean close.
    let sub = client.connection.subscribe("items", vec![]);
    assert_eq!(sub.id(), "1");
}

#[test]
fn unsubscribe_then_nosub() {
    let client = TestClient::connected();
    let sub = client.connection.subscribe("items", vec![]);
    client.take_sent();

    client.connection.unsubscribe(&sub).unwrap();
    assert_eq!(client.take_sent_kinds(), vec!["unsub"]);
    assert_eq!(client.connection.active_subscriptions().len(), 1);

    client.deliver(nosub(&sub.id(), None));
    assert!(client.connection.active_subscriptions().is_empty());
    assert!(client.take_events().is_empty());
}

#[test]
fn version_refusal_closes_the_attempt() {
    let client = TestClient::new();
    client.connection.connect().unwrap();
    client.open_transport();
    client.deliver(failed("pre2"));

    let events = client.take_events();
    assert!(matches!(
        events.as_slice(),
        [ConnectionEvent::Error(e)] if e.kind == ErrorKind::ProtocolVersion
    ));
    assert_eq!(client.transport.close_count(), 1);

    client.transport.emit(ddp_client::TransportEvent::Closed { was_clean: true });
    assert_eq!(client.connection.state(), ConnectionState::Closed);
}

#[test]
fn documents_survive_reconnect_and_reconcile() {
    let client = TestClient::connected();
    client.connection.subscribe("items", vec![]);
    client.deliver_all([
        added("items", "a", json!({"x": 1, "y": 2})),
        added("items", "b", json!({"x": 3})),
    ]);

    client.drop_transport();
    client.connect_with_session("s1");
    client.deliver_all([
        changed("items", "a", json!({"x": 10}), &["y"]),
        removed("items", "b"),
        added_before("items", "c", json!({"z": 0}), Some("a")),
        moved_before("items", "c", None),
        ready(&["0"]),
    ]);

    let documents = client.documents("items");
    assert_eq!(documents.len(), 2);
    assert_eq!(documents["a"], fields(json!({"x": 10})));
    assert_eq!(documents["c"], fields(json!({"z": 0})));
}

#[test]
fn server_ping_is_answered() {
    let client = TestClient::connected();
    client.deliver(ping(Some("hb-1")));
    assert_eq!(
        client.take_sent(),
        vec![ClientMessage::Pong {
            id: Some("hb-1".into())
        }]
    );
}

#[test]
fn pending_calls_are_not_resent_when_disabled() {
    let client = TestClient::with_config(
        ConnectionConfig::default().with_resend_pending_calls(false),
    );
    client.connect_with_session("s1");
    let call = client.connection.call("once", vec![]);
    client.drop_transport();
    client.take_sent();

    client.connection.connect().unwrap();
    client.open_transport();
    assert_eq!(client.take_sent_kinds(), vec!["connect"]);
    assert_eq!(client.connection.pending_calls().len(), 1);

    client.deliver(result_ok(&call.id(), json!("done")));
    client.deliver(updated(&[&call.id()]));
    assert!(client.connection.pending_calls().is_empty());
}

#[test]
fn stats_count_frames() {
    let client = TestClient::connected();
    let before = client.connection.stats();
    client.deliver(ping(None));
    client.transport.receive("{broken");

    let after = client.connection.stats();
    assert_eq!(after.frames_received, before.frames_received + 2);
    assert_eq!(after.frames_sent, before.frames_sent + 1);
    assert_eq!(after.frames_dropped, before.frames_dropped + 1);
}
