use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Install a global fmt subscriber at `level` (`error`, `warn`, `info`, `debug`, `trace`).
///
/// Unknown level names fall back to `info`. A second call is a no-op.
pub fn init_logging(level: &str) {
    let parsed = Level::from_str(level.trim()).unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(parsed)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::debug!("global subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_is_harmless() {
        init_logging("debug");
        init_logging("not-a-level");
        tracing::info!("still logging");
    }
}
