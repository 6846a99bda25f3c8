use serde_json::Value;
use std::time::Duration;

/// Structured log record as it reaches the transport: field name to value.
pub type Record = serde_json::Map<String, Value>;

/// Value attached to a key in a log call.
///
/// Durations are kept apart from plain JSON values because their encoding
/// depends on the logger's [`DurationFormat`](crate::config::DurationFormat).
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Json(Value),
    Duration(Duration),
}

impl From<Duration> for FieldValue {
    fn from(value: Duration) -> Self {
        FieldValue::Duration(value)
    }
}

macro_rules! json_field_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(value: $ty) -> Self {
                    FieldValue::Json(Value::from(value))
                }
            }
        )*
    };
}

json_field_value!(
    bool, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, String, &str, Value,
);
