/*!

Logging for the interpreter, backed by the `tracing` crate.

The public interface is just [`init_logger`]; call sites use the ordinary
`tracing` macros (`trace!`, `debug!`, `warn!`, …). The subscriber is
installed at most once, lazily, so the macros can be used from any entry
point (library embedding, binary driver, tests) without explicit setup.
Verbosity is controlled by the `UNILANG_LOG` environment variable using the
standard `tracing_subscriber::EnvFilter` syntax; the default is `warn`.

*/

use std::sync::LazyLock;

use tracing_subscriber::EnvFilter;

/// Used for implicit initialization.
static INIT_LOGGER: LazyLock<()> = LazyLock::new(|| {
  let filter = EnvFilter::try_from_env("UNILANG_LOG")
      .unwrap_or_else(|_| EnvFilter::new("warn"));
  let subscriber = tracing_subscriber::fmt()
      .with_env_filter(filter)
      .with_target(false)
      .without_time()
      .with_writer(std::io::stderr)
      .finish();

  // A test harness may have installed a subscriber already; that one wins.
  let _ = tracing::subscriber::set_global_default(subscriber);
});

/// Initializes the logging system. Idempotent.
pub fn init_logger() {
  LazyLock::force(&INIT_LOGGER);
}
