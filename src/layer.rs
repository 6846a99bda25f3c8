use crate::level::Level;
use crate::logger::Logger;
use std::collections::BTreeMap;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

const SELF_TARGET: &str = env!("CARGO_CRATE_NAME");

/// `tracing_subscriber` layer that routes `tracing` events into a
/// [`Logger`].
///
/// Events are filtered by the logger's level, their fields are collected
/// into JSON values and the event target is recorded under the `logger`
/// key. `TRACE` events are treated as `debug`. Events emitted by this crate
/// itself are skipped so that transport diagnostics cannot feed back into
/// the pipeline they describe.
#[derive(Clone, Debug)]
pub struct ForwardLayer {
    logger: Logger,
}

impl ForwardLayer {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }
}

fn is_internal(target: &str) -> bool {
    target
        .strip_prefix(SELF_TARGET)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
}

impl<S> Layer<S> for ForwardLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if is_internal(meta.target()) {
            return;
        }

        let level = Level::from(*meta.level());
        if !self.logger.enabled(level) {
            return;
        }

        let mut fields = BTreeMap::new();
        let mut message: Option<String> = None;

        let mut visitor = FieldVisitor {
            fields: &mut fields,
            message: &mut message,
        };
        event.record(&mut visitor);

        self.logger.emit(
            level,
            message.as_deref().unwrap_or_default(),
            Some(meta.target()),
            fields,
        );
    }
}

pub(crate) struct FieldVisitor<'a> {
    pub fields: &'a mut BTreeMap<String, serde_json::Value>,
    pub message: &'a mut Option<String>,
}

impl FieldVisitor<'_> {
    fn insert(&mut self, field: &Field, value: serde_json::Value) {
        self.fields.insert(field.name().to_string(), value);
    }
}

impl Visit for FieldVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.insert(field, serde_json::Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, serde_json::Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, serde_json::Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, serde_json::Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, serde_json::Value::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, serde_json::Value::String(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        // `message` arrives here as `fmt::Arguments` for the common
        // `info!("text")` form.
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.insert(field, serde_json::Value::String(format!("{:?}", value)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_targets_are_internal() {
        assert!(is_internal("fluent_log_forwarder"));
        assert!(is_internal("fluent_log_forwarder::forward::client"));
        assert!(!is_internal("fluent_log_forwarder_demo"));
        assert!(!is_internal("billing::worker"));
    }
}
