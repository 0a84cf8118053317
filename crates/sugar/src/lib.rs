//! Sugar - fluent, leak-free access to foreign object graphs.
//!
//! Automation-style object models (spreadsheet applications, document
//! hosts, scripting engines) hand out externally reference-counted handles
//! and report failures as status codes. Driving them directly means an
//! error check and a release after every step. This crate wraps a
//! [`Runtime`] so that:
//!
//! - [`Chain`] traversals read like the object model (`app.get("Workbooks")
//!   .call("Add")`) and carry the first failure forward instead of returning
//!   it at every step;
//! - [`Context`] arenas release every reference acquired in a scope exactly
//!   once, in reverse order;
//! - [`Runner`] pairs per-thread runtime initialization with nested scopes
//!   and with branches onto new threads.
//!
//! # Logging
//!
//! The crate emits `tracing` events: `debug` for handle acquisition and
//! release and for scope boundaries, `trace` for each foreign access.
//! [`init_tracing`] installs a stderr subscriber filtered by `SUGAR_LOG`
//! (falling back to `RUST_LOG`).

mod cancel;
mod chain;
mod context;
pub mod errors;
mod runner;

#[cfg(test)]
mod test_support;

use std::sync::Once;

pub use cancel::CancelToken;
pub use chain::{Chain, Flow};
pub use context::Context;
pub use errors::{Error, ErrorKind, ForeignOp};
pub use runner::{Runner, Scope};
pub use sugar_handle::{Elements, ForeignError, Handle, Runtime, Variant};

static TRACING_INIT: Once = Once::new();

/// Install a `tracing` subscriber writing to stderr.
///
/// Does nothing unless `SUGAR_LOG` or `RUST_LOG` is set; `SUGAR_LOG` wins
/// when both are. Safe to call repeatedly.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        let directives = std::env::var("SUGAR_LOG").or_else(|_| std::env::var("RUST_LOG"));
        if let Ok(directives) = directives {
            let filter = EnvFilter::new(directives);
            let _ = tracing_subscriber::registry()
                .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
                .with(filter)
                .try_init();
        }
    });
}
