//! Property-based test generators using proptest.
//!
//! Document ids and field names are drawn from small alphabets so that
//! generated sequences hit the same documents and fields repeatedly.

use crate::fixtures;
use ddp_client::Fields;
use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Strategy for document ids.
pub fn doc_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-e]").expect("Invalid regex")
}

/// Strategy for field names.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[f-k]").expect("Invalid regex")
}

/// Strategy for JSON scalar field values.
pub fn field_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[a-z]{0,6}".prop_map(Value::from),
    ]
}

/// Strategy for field maps with up to four fields.
pub fn fields_strategy() -> impl Strategy<Value = Fields> {
    prop::collection::btree_map(field_name_strategy(), field_value_strategy(), 0..4)
        .prop_map(|map| map.into_iter().collect())
}

/// One data event on a single collection.
#[derive(Debug, Clone, PartialEq)]
pub enum DocEvent {
    /// `added`
    Added {
        /// Document id.
        id: String,
        /// Initial fields.
        fields: Fields,
    },
    /// `changed`
    Changed {
        /// Document id.
        id: String,
        /// Fields to overwrite.
        fields: Fields,
        /// Fields to remove.
        cleared: Vec<String>,
    },
    /// `removed`
    Removed {
        /// Document id.
        id: String,
    },
}

impl DocEvent {
    /// The server frame carrying this event.
    pub fn to_frame(&self, collection: &str) -> Value {
        match self {
            DocEvent::Added { id, fields } => {
                fixtures::added(collection, id, Value::Object(fields.clone()))
            }
            DocEvent::Changed {
                id,
                fields,
                cleared,
            } => json!({
                "msg": "changed",
                "collection": collection,
                "id": id,
                "fields": fields,
                "cleared": cleared,
            }),
            DocEvent::Removed { id } => fixtures::removed(collection, id),
        }
    }
}

/// Strategy for a single data event.
pub fn doc_event_strategy() -> impl Strategy<Value = DocEvent> {
    prop_oneof![
        3 => (doc_id_strategy(), fields_strategy())
            .prop_map(|(id, fields)| DocEvent::Added { id, fields }),
        4 => (
            doc_id_strategy(),
            fields_strategy(),
            prop::collection::vec(field_name_strategy(), 0..3),
        )
            .prop_map(|(id, fields, cleared)| DocEvent::Changed { id, fields, cleared }),
        2 => doc_id_strategy().prop_map(|id| DocEvent::Removed { id }),
    ]
}

/// Strategy for a sequence of data events.
pub fn doc_event_sequence_strategy(
    min_events: usize,
    max_events: usize,
) -> impl Strategy<Value = Vec<DocEvent>> {
    prop::collection::vec(doc_event_strategy(), min_events..max_events)
}

/// The expected state of a collection: the fold of its events over an
/// empty map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceModel {
    documents: BTreeMap<String, Fields>,
}

impl ReferenceModel {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one event. Changes and removals of absent ids do nothing.
    pub fn apply(&mut self, event: &DocEvent) {
        match event {
            DocEvent::Added { id, fields } => {
                self.documents.insert(id.clone(), fields.clone());
            }
            DocEvent::Changed {
                id,
                fields,
                cleared,
            } => {
                if let Some(doc) = self.documents.get_mut(id) {
                    for (name, value) in fields {
                        doc.insert(name.clone(), value.clone());
                    }
                    for name in cleared {
                        doc.remove(name);
                    }
                }
            }
            DocEvent::Removed { id } => {
                self.documents.remove(id);
            }
        }
    }

    /// Folds a whole sequence.
    pub fn fold<'a>(events: impl IntoIterator<Item = &'a DocEvent>) -> Self {
        let mut model = Self::new();
        for event in events {
            model.apply(event);
        }
        model
    }

    /// The expected documents.
    pub fn documents(&self) -> &BTreeMap<String, Fields> {
        &self.documents
    }
}

/// A reply the server sends for a method call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallReply {
    /// `result` for the call.
    Result,
    /// `updated` naming the call.
    Updated,
}

/// Strategy for the replies to `calls` method calls, interleaved in any
/// order, each call getting one `result` and one `updated` plus optional
/// duplicates.
pub fn call_replies_strategy(calls: usize) -> impl Strategy<Value = Vec<(usize, CallReply)>> {
    let required: Vec<(usize, CallReply)> = (0..calls)
        .flat_map(|i| [(i, CallReply::Result), (i, CallReply::Updated)])
        .collect();
    let duplicate = (
        0..calls.max(1),
        prop_oneof![Just(CallReply::Result), Just(CallReply::Updated)],
    );
    prop::collection::vec(duplicate, 0..calls + 1)
        .prop_flat_map(move |duplicates| {
            let mut replies = required.clone();
            replies.extend(duplicates.into_iter().filter(|(i, _)| *i < calls));
            Just(replies).prop_shuffle()
        })
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn fields_use_small_alphabet(fields in fields_strategy()) {
            prop_assert!(fields.len() < 4);
            for name in fields.keys() {
                prop_assert!(("f"..="k").contains(&name.as_str()));
            }
        }

        #[test]
        fn every_call_gets_both_replies(replies in call_replies_strategy(3)) {
            for call in 0..3 {
                prop_assert!(replies.contains(&(call, CallReply::Result)));
                prop_assert!(replies.contains(&(call, CallReply::Updated)));
            }
        }

        #[test]
        fn events_round_trip_through_frames(event in doc_event_strategy()) {
            let frame = event.to_frame("items");
            prop_assert_eq!(&frame["collection"], "items");
            prop_assert!(frame["msg"].is_string());
        }
    }

    #[test]
    fn model_ignores_unknown_ids() {
        let model = ReferenceModel::fold(&[
            DocEvent::Changed {
                id: "a".into(),
                fields: Fields::new(),
                cleared: vec!["f".into()],
            },
            DocEvent::Removed { id: "b".into() },
        ]);
        assert!(model.documents().is_empty());
    }
}
