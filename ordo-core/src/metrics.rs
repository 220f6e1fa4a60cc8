// ABOUTME: Counters for event firings, listener failures and command dispatch outcomes
// ABOUTME: Recorded through the metrics facade; the binary decides whether to export them

use metrics::counter;

pub fn record_event_emitted(event: &str) {
    counter!("ordo_events_emitted_total", "event" => event.to_string()).increment(1);
}

pub fn record_listener_failure(event: &str, group: &str) {
    counter!(
        "ordo_listener_failures_total",
        "event" => event.to_string(),
        "group" => group.to_string()
    )
    .increment(1);
}

pub fn record_dispatch(outcome: &'static str) {
    counter!("ordo_dispatch_total", "outcome" => outcome).increment(1);
}

pub fn record_command_blocked(command: &str, reason: &'static str) {
    counter!(
        "ordo_commands_blocked_total",
        "command" => command.to_string(),
        "reason" => reason
    )
    .increment(1);
}

pub fn record_command_run(command: &str) {
    counter!("ordo_commands_run_total", "command" => command.to_string()).increment(1);
}

pub fn record_command_error(command: &str) {
    counter!("ordo_command_errors_total", "command" => command.to_string()).increment(1);
}

pub fn record_module_loaded(module: &str) {
    counter!("ordo_modules_loaded_total", "module" => module.to_string()).increment(1);
}
