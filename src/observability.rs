use biometrics::{Collector, Counter, Moments};

pub(crate) static BACKEND_REQUESTS: Counter = Counter::new("deltastrik.backend.requests");
pub(crate) static BACKEND_ERRORS: Counter = Counter::new("deltastrik.backend.errors");
pub(crate) static BACKEND_TIMEOUTS: Counter = Counter::new("deltastrik.backend.timeouts");
pub(crate) static BACKEND_EMPTY_RESPONSES: Counter =
    Counter::new("deltastrik.backend.empty_responses");
pub(crate) static BACKEND_REQUEST_DURATION: Moments =
    Moments::new("deltastrik.backend.request_duration_seconds");

pub(crate) static COMMANDS_DISPATCHED: Counter = Counter::new("deltastrik.commands.dispatched");
pub(crate) static COMMANDS_UNKNOWN: Counter = Counter::new("deltastrik.commands.unknown");

pub(crate) static SESSION_COMPACTIONS: Counter = Counter::new("deltastrik.session.compactions");
pub(crate) static SESSION_COMPACTION_FAILURES: Counter =
    Counter::new("deltastrik.session.compaction_failures");
pub(crate) static SESSION_COMPACTED_MESSAGES: Moments =
    Moments::new("deltastrik.session.compacted_messages");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&BACKEND_REQUESTS);
    collector.register_counter(&BACKEND_ERRORS);
    collector.register_counter(&BACKEND_TIMEOUTS);
    collector.register_counter(&BACKEND_EMPTY_RESPONSES);
    collector.register_moments(&BACKEND_REQUEST_DURATION);

    collector.register_counter(&COMMANDS_DISPATCHED);
    collector.register_counter(&COMMANDS_UNKNOWN);

    collector.register_counter(&SESSION_COMPACTIONS);
    collector.register_counter(&SESSION_COMPACTION_FAILURES);
    collector.register_moments(&SESSION_COMPACTED_MESSAGES);
}
