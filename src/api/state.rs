//! Application state for the Payroll Calculation Engine API.
//!
//! This module defines the shared application state that is available
//! to all request handlers.

use std::sync::Arc;

use crate::config::ConfigLoader;
use crate::plugins::PluginRegistry;

/// Shared application state.
///
/// Contains resources that are shared across all request handlers: the
/// loaded payroll configuration and the plugin registry.
#[derive(Clone)]
pub struct AppState {
    /// The loaded payroll configuration.
    config: Arc<ConfigLoader>,
    /// The registered calculator plugins.
    registry: Arc<PluginRegistry>,
}

impl AppState {
    /// Creates a new application state with the built-in plugins.
    pub fn new(config: ConfigLoader) -> Self {
        Self::with_registry(config, PluginRegistry::standard())
    }

    /// Creates a new application state with a custom plugin registry.
    pub fn with_registry(config: ConfigLoader, registry: PluginRegistry) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
        }
    }

    /// Returns a reference to the configuration loader.
    pub fn config(&self) -> &ConfigLoader {
        &self.config
    }

    /// Returns a reference to the plugin registry.
    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }
}
