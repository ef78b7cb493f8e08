// Copyright Dream Runtime Contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).
//! Process-wide logging setup. Unlike `pants`' own `logging` crate, there is
//! no Python interpreter to bridge records into here — this is a thin
//! `env_logger` wrapper so every layer's `log::{trace,debug,info,warn,error}`
//! calls land on stderr with a level filter controlled the usual way.

use std::sync::Once;

static INIT: Once = Once::new();

/// Initializes the global logger from `RUST_LOG` (falling back to `info`),
/// exactly once per process. Safe to call from every binary's/test's
/// entrypoint; later calls are no-ops.
pub fn init_logging() {
    INIT.call_once(|| {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .format_timestamp_micros()
            .init();
    });
}
