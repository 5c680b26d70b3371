//! Fuzz testing harnesses for the DDP client.
//!
//! Each target takes arbitrary bytes and must never panic. They are plain
//! functions so they can back cargo-fuzz targets or proptest cases.

use crate::generators::{DocEvent, ReferenceModel};
use crate::harness::TestClient;
use ddp_client::Fields;
use ddp_localdb::{DocumentCollection, JsonCollection};
use ddp_protocol::ServerMessage;
use serde_json::Value;

/// Fuzz target for frame decoding.
///
/// Arbitrary text either decodes, decodes to `None`, or is rejected with an
/// error. Whatever decodes re-encodes.
pub fn fuzz_frame_decode(data: &[u8]) {
    let text = String::from_utf8_lossy(data);
    if let Ok(Some(message)) = ServerMessage::decode(&text) {
        assert!(message.encode().is_ok(), "decoded message failed to encode");
    }
}

/// Fuzz target for the dispatcher.
///
/// Feeds the bytes as one inbound frame to a connected client that has a
/// subscription and a pending call registered.
pub fn fuzz_dispatch(data: &[u8]) {
    let client = TestClient::connected();
    let subscription = client.connection.subscribe("items", Vec::new());
    let call = client.connection.call("m", Vec::new());

    client
        .transport
        .receive(String::from_utf8_lossy(data).into_owned());

    // The records stay consistent whatever the frame was.
    let registered = client.connection.pending_calls();
    assert!(registered.len() <= 1);
    if registered.is_empty() {
        assert!(call.is_complete());
    }
    if !subscription.is_active() {
        assert!(client.connection.active_subscriptions().is_empty());
    }
}

/// Fuzz target for collection reconciliation.
///
/// Interprets the bytes as a stream of add/change/remove operations, applies
/// them to a [`JsonCollection`] and checks the result against the
/// [`ReferenceModel`].
pub fn fuzz_collection_events(data: &[u8]) {
    let collection = JsonCollection::new("fuzz");
    let mut events = Vec::new();

    for chunk in data.chunks(3) {
        let op = chunk[0];
        let id = format!("{}", (b'a' + chunk.get(1).copied().unwrap_or(0) % 4) as char);
        let field = format!("{}", (b'f' + chunk.get(2).copied().unwrap_or(0) % 4) as char);
        let mut fields = Fields::new();
        fields.insert(field.clone(), Value::from(op));

        let event = match op % 3 {
            0 => DocEvent::Added { id, fields },
            1 => DocEvent::Changed {
                id,
                fields,
                cleared: if op % 2 == 0 { vec![field] } else { Vec::new() },
            },
            _ => DocEvent::Removed { id },
        };

        let _ = match &event {
            DocEvent::Added { id, fields } => collection.add(id, fields.clone()),
            DocEvent::Changed {
                id,
                fields,
                cleared,
            } => collection.change(id, fields.clone(), cleared.clone()),
            DocEvent::Removed { id } => collection.remove(id),
        };
        events.push(event);
    }

    let model = ReferenceModel::fold(&events);
    assert_eq!(&collection.snapshot(), model.documents());
}
