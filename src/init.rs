use crate::handle::ForwardLogger;
use crate::layer::ForwardLayer;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::Registry;

/// Options for installing the forwarding layer as the global subscriber.
///
/// **Fields**
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt` layer is added
///   next to the [`ForwardLayer`] so events are also printed to the console.
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub enable_stdout: bool,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            enable_stdout: true,
        }
    }
}

#[derive(thiserror::Error, Debug)]
#[error("a global tracing subscriber is already installed")]
pub struct InitError(#[from] SetGlobalDefaultError);

/// A registry with only the forwarding layer, for use with
/// `tracing::subscriber::with_default` or `set_global_default`.
pub fn subscriber(handle: &ForwardLogger) -> Layered<ForwardLayer, Registry> {
    Registry::default().with(handle.layer())
}

/// Install `handle`'s layer as the global `tracing` subscriber.
///
/// **Effects**
///
/// Every `tracing` event in the process at or above the handle's level is
/// forwarded to the collector. The handle must still be closed explicitly
/// before the process exits.
pub fn init_tracing_with_config(
    handle: &ForwardLogger,
    config: LayerConfig,
) -> Result<(), InitError> {
    if config.enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer();
        tracing::subscriber::set_global_default(subscriber(handle).with(fmt_layer))?;
    } else {
        tracing::subscriber::set_global_default(subscriber(handle))?;
    }
    Ok(())
}

/// Equivalent to [`init_tracing_with_config`] with [`LayerConfig::default`].
pub fn init_tracing(handle: &ForwardLogger) -> Result<(), InitError> {
    init_tracing_with_config(handle, LayerConfig::default())
}
