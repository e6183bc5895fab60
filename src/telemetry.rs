//! Tracing setup for the exercise bank.
//!
//! Log targets used by the service:
//! - `exercise_bank`: startup, snapshot IO, WebSocket lifecycle, mutation events
//! - `catalog`: college / course / knowledge point / exercise writes
//! - `rules`: rule set changes
//! - `paper`: assembly (one debug line per evaluated rule) and curation
//!
//! `LOG_LEVEL` overrides the default directives, e.g. `"info,paper=debug"`.
//! `LOG_FORMAT=json` switches to one JSON object per line.

use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVES: &str = "info,exercise_bank=debug,paper=debug,tower_http=info,axum=info";

pub fn init_tracing() {
    let filter = EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(true);

    if matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}
