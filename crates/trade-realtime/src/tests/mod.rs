//! Scenario tests for the connection manager.
//!
//! All scenarios run against a scripted transport on a paused clock:
//!
//! - `harness.rs`      - Mock transport, event log and recording surface
//! - `lifecycle.rs`    - connect, disconnect and superseded sessions
//! - `reconnect.rs`    - linear backoff, attempt limit, counter reset
//! - `auth.rs`         - token handshake, auth errors, re-authentication
//! - `command_gate.rs` - outbound commands dropped until authenticated
//! - `relay.rs`        - listener ordering and notifications

pub(crate) mod harness;
