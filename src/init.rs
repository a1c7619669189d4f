use crate::layer::LoggerLayer;
use crate::logger::Logger;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Settings for routing `tracing` events into a [`Logger`].
///
/// **Fields**
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt` layer is
///   installed next to the [`LoggerLayer`] so events are also printed by
///   `tracing` itself, including this crate's own diagnostics.
#[derive(Clone, Debug, Default)]
pub struct LayerConfig {
    pub enable_stdout: bool,
}

/// Install a [`Registry`] with a [`LoggerLayer`] for `logger` as the
/// global default subscriber, so every `tracing` event in the process ends
/// up in the logger's sinks.
///
/// Fails if a global subscriber is already set.
pub fn init_tracing_with_config(
    logger: Logger,
    config: LayerConfig,
) -> Result<(), SetGlobalDefaultError> {
    let layer = LoggerLayer::new(logger);

    // The two subscriber shapes have different types, so each branch
    // installs its own.
    if config.enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)
    }
}

/// Equivalent to [`init_tracing_with_config`] with
/// [`LayerConfig::default`].
pub fn init_tracing(logger: Logger) -> Result<(), SetGlobalDefaultError> {
    init_tracing_with_config(logger, LayerConfig::default())
}
