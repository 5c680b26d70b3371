//! Server frame builders.
//!
//! Each function returns the JSON a DDP server would send, ready for
//! [`MockTransport::receive_json`](ddp_client::MockTransport::receive_json)
//! or [`TestClient::deliver`](crate::TestClient::deliver).

use ddp_client::Fields;
use serde_json::{json, Value};

/// Converts a JSON object literal into a field map.
///
/// # Panics
///
/// Panics if `value` is not an object.
pub fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// `connected` with a session id.
pub fn connected(session: &str) -> Value {
    json!({"msg": "connected", "session": session})
}

/// `failed` naming the version the server would accept.
pub fn failed(version: &str) -> Value {
    json!({"msg": "failed", "version": version})
}

/// `ping`, with an optional id.
pub fn ping(id: Option<&str>) -> Value {
    match id {
        Some(id) => json!({"msg": "ping", "id": id}),
        None => json!({"msg": "ping"}),
    }
}

/// `added` for one document.
pub fn added(collection: &str, id: &str, fields: Value) -> Value {
    json!({"msg": "added", "collection": collection, "id": id, "fields": fields})
}

/// `changed` for one document.
pub fn changed(collection: &str, id: &str, fields: Value, cleared: &[&str]) -> Value {
    json!({
        "msg": "changed",
        "collection": collection,
        "id": id,
        "fields": fields,
        "cleared": cleared,
    })
}

/// `removed` for one document.
pub fn removed(collection: &str, id: &str) -> Value {
    json!({"msg": "removed", "collection": collection, "id": id})
}

/// `addedBefore` for one document.
pub fn added_before(collection: &str, id: &str, fields: Value, before: Option<&str>) -> Value {
    json!({
        "msg": "addedBefore",
        "collection": collection,
        "id": id,
        "fields": fields,
        "before": before,
    })
}

/// `movedBefore` for one document.
pub fn moved_before(collection: &str, id: &str, before: Option<&str>) -> Value {
    json!({"msg": "movedBefore", "collection": collection, "id": id, "before": before})
}

/// `ready` for a batch of subscription ids.
pub fn ready(subs: &[&str]) -> Value {
    json!({"msg": "ready", "subs": subs})
}

/// `nosub`, optionally carrying an error object.
pub fn nosub(id: &str, error: Option<Value>) -> Value {
    match error {
        Some(error) => json!({"msg": "nosub", "id": id, "error": error}),
        None => json!({"msg": "nosub", "id": id}),
    }
}

/// A successful `result`.
pub fn result_ok(id: &str, result: Value) -> Value {
    json!({"msg": "result", "id": id, "result": result})
}

/// A failed `result`.
pub fn result_err(id: &str, code: Value, reason: &str) -> Value {
    json!({"msg": "result", "id": id, "error": {"error": code, "reason": reason}})
}

/// `updated` for a batch of method ids.
pub fn updated(methods: &[&str]) -> Value {
    json!({"msg": "updated", "methods": methods})
}

/// A top-level `error`.
pub fn error(reason: &str) -> Value {
    json!({"msg": "error", "reason": reason})
}

/// The object a login method returns.
pub fn login_result(user_id: &str, token: &str, expires_millis: i64) -> Value {
    json!({"id": user_id, "token": token, "tokenExpires": {"$date": expires_millis}})
}
