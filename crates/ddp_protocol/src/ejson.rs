//! EJSON helpers.
//!
//! DDP carries dates as `{"$date": <milliseconds since the Unix epoch>}`.

use serde_json::{json, Value};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const DATE_KEY: &str = "$date";

/// Decodes an EJSON date.
///
/// Returns `None` if the value is not a `$date` object. Negative
/// timestamps are before the epoch.
pub fn date_from_value(value: &Value) -> Option<SystemTime> {
    let millis = value.get(DATE_KEY)?;
    if let Some(millis) = millis.as_u64() {
        return UNIX_EPOCH.checked_add(Duration::from_millis(millis));
    }
    let millis = millis.as_i64().or_else(|| millis.as_f64().map(|f| f as i64))?;
    if millis >= 0 {
        UNIX_EPOCH.checked_add(Duration::from_millis(millis as u64))
    } else {
        UNIX_EPOCH.checked_sub(Duration::from_millis(millis.unsigned_abs()))
    }
}

/// Encodes a date as EJSON.
pub fn date_to_value(time: SystemTime) -> Value {
    let millis = match time.duration_since(UNIX_EPOCH) {
        Ok(after) => after.as_millis() as i64,
        Err(before) => -(before.duration().as_millis() as i64),
    };
    json!({ DATE_KEY: millis })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_date() {
        let time = date_from_value(&json!({"$date": 1_500_000_000_000u64})).unwrap();
        assert_eq!(
            time.duration_since(UNIX_EPOCH).unwrap(),
            Duration::from_secs(1_500_000_000)
        );
    }

    #[test]
    fn decode_rejects_non_dates() {
        assert_eq!(date_from_value(&json!(12)), None);
        assert_eq!(date_from_value(&json!({"date": 12})), None);
        assert_eq!(date_from_value(&json!({"$date": "soon"})), None);
    }

    #[test]
    fn pre_epoch_dates() {
        let value = date_to_value(UNIX_EPOCH - Duration::from_millis(1500));
        assert_eq!(value, json!({"$date": -1500}));
        assert_eq!(
            date_from_value(&value),
            Some(UNIX_EPOCH - Duration::from_millis(1500))
        );
    }
}
