//! Document codec trait for typed collections.

use crate::error::{LocalDbError, LocalDbResult};
use ddp_client::Fields;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Trait for types stored in a [`TypedCollection`](crate::TypedCollection).
///
/// The document id is not part of the field map; it is passed alongside.
///
/// # Example
///
/// ```rust,ignore
/// use ddp_localdb::{from_fields_serde, to_fields_serde, DocumentCodec, LocalDbResult};
///
/// #[derive(Clone, serde::Serialize, serde::Deserialize)]
/// struct Item {
///     title: String,
///     done: bool,
/// }
///
/// impl DocumentCodec for Item {
///     fn from_fields(collection: &str, id: &str, fields: &Fields) -> LocalDbResult<Self> {
///         from_fields_serde(collection, id, fields)
///     }
///
///     fn to_fields(&self, collection: &str, id: &str) -> LocalDbResult<Fields> {
///         to_fields_serde(self, collection, id)
///     }
/// }
/// ```
pub trait DocumentCodec: Sized + Clone + Send + Sync + 'static {
    /// Builds a document from its field map.
    fn from_fields(collection: &str, id: &str, fields: &Fields) -> LocalDbResult<Self>;

    /// Converts a document back to its field map.
    ///
    /// Must round-trip with [`from_fields`](Self::from_fields): typed
    /// `changed` events are applied to this map.
    fn to_fields(&self, collection: &str, id: &str) -> LocalDbResult<Fields>;
}

/// Decodes a field map with serde.
pub fn from_fields_serde<T: DeserializeOwned>(
    collection: &str,
    id: &str,
    fields: &Fields,
) -> LocalDbResult<T> {
    serde_json::from_value(Value::Object(fields.clone()))
        .map_err(|e| LocalDbError::codec(collection, id, e))
}

/// Encodes a document to a field map with serde.
pub fn to_fields_serde<T: Serialize>(value: &T, collection: &str, id: &str) -> LocalDbResult<Fields> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(LocalDbError::codec(
            collection,
            id,
            format!("expected an object, got {other}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Item {
        title: String,
        #[serde(default)]
        done: bool,
    }

    impl DocumentCodec for Item {
        fn from_fields(collection: &str, id: &str, fields: &Fields) -> LocalDbResult<Self> {
            from_fields_serde(collection, id, fields)
        }

        fn to_fields(&self, collection: &str, id: &str) -> LocalDbResult<Fields> {
            to_fields_serde(self, collection, id)
        }
    }

    #[test]
    fn serde_codec_round_trips() {
        let fields = match json!({"title": "milk", "done": true}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let item = Item::from_fields("items", "a", &fields).unwrap();
        assert_eq!(
            item,
            Item {
                title: "milk".into(),
                done: true
            }
        );
        assert_eq!(item.to_fields("items", "a").unwrap(), fields);
    }

    #[test]
    fn missing_field_is_codec_error() {
        let err = Item::from_fields("items", "a", &Fields::new()).unwrap_err();
        assert!(matches!(err, LocalDbError::Codec { ref id, .. } if id == "a"));
    }

    #[test]
    fn non_object_is_codec_error() {
        assert!(matches!(
            to_fields_serde(&42, "items", "a"),
            Err(LocalDbError::Codec { .. })
        ));
    }
}
