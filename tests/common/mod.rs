//! Shared setup for integration tests.
//!
//! # Usage
//!
//! ```rust,ignore
//! mod common;
//!
//! #[test]
//! fn my_test() {
//!     common::init_tracing();
//!     // ...
//! }
//! ```
//!
//! # Configuration
//!
//! Environment variables:
//! - `RUST_LOG`: Filter directives (e.g., `olc_btree=debug`)
//! - `OLC_LOG_DIR`: Log directory (default: `logs/`)
//! - `OLC_LOG_CONSOLE`: Set to "0" to disable console output
//!
//! The crate only emits events when built with `--features tracing`.
//!
//! # Log Files
//!
//! Events are appended to `logs/olc_btree.jsonl` as newline-delimited JSON:
//!
//! ```bash
//! # Root replacements, in order
//! jq 'select(.fields.message == "root replaced")' logs/olc_btree.jsonl
//!
//! # Restart reasons by frequency
//! jq -r 'select(.fields.message == "optimistic restart") | .fields.reason' \
//!     logs/olc_btree.jsonl | sort | uniq -c
//! ```

#![allow(dead_code)]

use std::env;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Once;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

static INIT: Once = Once::new();

/// Install the test subscriber. Only the first call has an effect.
pub fn init_tracing() {
    INIT.call_once(setup_tracing);
}

/// Where and how test logs are written.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    pub log_dir: PathBuf,
    pub log_file: String,
    pub console_enabled: bool,
    /// Used when `RUST_LOG` is unset.
    pub default_level: Level,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            log_file: "olc_btree.jsonl".to_string(),
            console_enabled: true,
            default_level: Level::INFO,
        }
    }
}

impl TracingConfig {
    /// Defaults overridden by `OLC_LOG_DIR` and `OLC_LOG_CONSOLE`.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = env::var("OLC_LOG_DIR") {
            config.log_dir = PathBuf::from(dir);
        }

        if env::var("OLC_LOG_CONSOLE").is_ok_and(|v| v == "0") {
            config.console_enabled = false;
        }

        config
    }
}

fn make_filter(default_level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level.to_string()))
}

#[expect(clippy::expect_used, reason = "test setup fails loudly")]
fn setup_tracing() {
    let config = TracingConfig::from_env();

    std::fs::create_dir_all(&config.log_dir).expect("Failed to create log directory");

    // Append: test binaries run in parallel processes.
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(config.log_dir.join(&config.log_file))
        .expect("Failed to open log file");

    let console_layer = config.console_enabled.then(|| {
        tracing_subscriber::fmt::layer()
            .with_thread_names(true)
            .with_target(true)
            .compact()
            .with_filter(make_filter(config.default_level))
    });

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::sync::Mutex::new(file))
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_target(true)
        .json()
        .with_filter(make_filter(config.default_level));

    // try_init: another test harness may already own the global subscriber.
    let _ = Registry::default()
        .with(console_layer)
        .with(file_layer)
        .try_init();
}

/// Thread count for concurrent tests: the machine's parallelism, at least 2
/// so contention actually happens, at most 16.
pub fn test_threads() -> usize {
    std::thread::available_parallelism()
        .map_or(4, std::num::NonZeroUsize::get)
        .clamp(2, 16)
}
