//! Engine counters, exported by whichever `metrics` recorder the binary
//! installs. Without a recorder these are no-ops.

use rosp_state::SubscriptionStatus;

pub(crate) fn transition(from: SubscriptionStatus, to: SubscriptionStatus) {
    metrics::counter!(
        "rosp_transitions_total",
        "from" => from.as_str(),
        "to" => to.as_str()
    )
    .increment(1);
}

pub(crate) fn registration() {
    metrics::counter!("rosp_registrations_total").increment(1);
}

pub(crate) fn side_effect_failed(name: &'static str) {
    metrics::counter!("rosp_side_effect_failures_total", "name" => name).increment(1);
}

pub(crate) fn payment_event(kind: &'static str, outcome: &'static str) {
    metrics::counter!("rosp_payment_events_total", "kind" => kind, "outcome" => outcome)
        .increment(1);
}
