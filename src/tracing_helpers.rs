//! Log macros that vanish unless the `tracing` feature is on.
//!
//! Engine code logs through `info_log!`, `debug_log!` and `trace_log!`. With
//! the feature enabled they expand to the matching `tracing` macro; without
//! it they expand to nothing and their arguments are never evaluated, so
//! never put side effects in a log argument.
//!
//! | Level | Event |
//! |-------|-------|
//! | `info` | root replaced (new height, separator) |
//! | `debug` | leaf split, inner split (separator, half sizes) |
//! | `trace` | optimistic restart (reason) |
//!
//! ```bash
//! # Watch the tree grow during a stress run
//! RUST_LOG=olc_btree=debug cargo test --features tracing --test stress_tests
//!
//! # Every restart, tagged with its reason
//! RUST_LOG=olc_btree=trace cargo test --features tracing --test stress_tests
//! ```

#![allow(unused_macros, unused_imports)]

/// Structural events that happen rarely (root replacement).
#[cfg(feature = "tracing")]
macro_rules! info_log {
    ($($arg:tt)*) => {
        tracing::info!($($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! info_log {
    ($($arg:tt)*) => {};
}

/// Node splits.
#[cfg(feature = "tracing")]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}

/// Per-attempt events on the hot path (restarts).
#[cfg(feature = "tracing")]
macro_rules! trace_log {
    ($($arg:tt)*) => {
        tracing::trace!($($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_log {
    ($($arg:tt)*) => {};
}

pub(crate) use debug_log;
pub(crate) use info_log;
pub(crate) use trace_log;
