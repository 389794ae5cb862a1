/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use crate::saga::MissingInstancePolicy;

/// Configuration for the Relaybus runtime.
///
/// Loaded from `config.toml` in the XDG-compliant `relaybus` configuration
/// directory. Every section is optional; missing values fall back to defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Saga runtime defaults
    pub saga: SagaConfig,
    /// Recurring scheduling defaults
    pub scheduling: SchedulingConfig,
    /// Broker topology behaviour
    pub topology: TopologyConfig,
    /// Tracing configuration for binaries embedding the bus
    pub tracing: TracingConfig,
}

/// Saga runtime defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SagaConfig {
    /// Buffer messages published during a transition until the instance is persisted
    pub use_outbox: bool,
    /// Policy applied to events that declare none
    pub missing_instance: MissingInstancePolicy,
}

/// Recurring scheduling defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    /// Prefix the job scheduler uses for recurring trigger identities
    pub recurring_trigger_prefix: String,
    /// Group used by `RecurringSchedule::in_default_group`
    pub default_schedule_group: String,
}

/// Broker topology behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    /// Remove auto-delete entities after a receive pipe completes
    pub delete_auto_delete_on_shutdown: bool,
}

/// Tracing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    /// Default filter level
    pub level: String,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            use_outbox: true,
            missing_instance: MissingInstancePolicy::Fail,
        }
    }
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            recurring_trigger_prefix: "Recurring.Trigger.".to_string(),
            default_schedule_group: "default".to_string(),
        }
    }
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            delete_auto_delete_on_shutdown: true,
        }
    }
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl BusConfig {
    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns the `toml` deserialization error when the text is malformed.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Load configuration from XDG-compliant locations
    ///
    /// Looks for `relaybus/config.toml` under `$XDG_CONFIG_HOME` (or its
    /// platform fallback). Returns the default configuration when no file is
    /// found; logs an error and uses defaults when the file is unreadable or
    /// malformed.
    pub fn load() -> Self {
        use tracing::{error, info};

        let xdg_dirs = match xdg::BaseDirectories::with_prefix("relaybus") {
            Ok(dirs) => dirs,
            Err(e) => {
                error!("Failed to initialize XDG directories: {}", e);
                return Self::default();
            }
        };

        let Some(path) = xdg_dirs.find_config_file("config.toml") else {
            info!("No configuration file found, using defaults");
            return Self::default();
        };

        info!("Loading configuration from: {}", path.display());
        match std::fs::read_to_string(&path) {
            Ok(config_str) => match Self::from_toml_str(&config_str) {
                Ok(config) => {
                    info!("Successfully loaded configuration");
                    config
                }
                Err(e) => {
                    error!("Failed to parse configuration file {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                error!("Failed to read configuration file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }
}

lazy_static! {
    /// Global configuration instance loaded from XDG-compliant locations
    pub static ref CONFIG: BusConfig = BusConfig::load();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = BusConfig::default();
        assert!(config.saga.use_outbox);
        assert_eq!(config.saga.missing_instance, MissingInstancePolicy::Fail);
        assert_eq!(config.scheduling.recurring_trigger_prefix, "Recurring.Trigger.");
        assert!(config.topology.delete_auto_delete_on_shutdown);
    }

    #[test]
    fn partial_files_keep_defaults_for_missing_keys() {
        let config = BusConfig::from_toml_str(
            r#"
            [saga]
            missing_instance = "discard"
            "#,
        )
        .unwrap();
        assert_eq!(config.saga.missing_instance, MissingInstancePolicy::Discard);
        assert!(config.saga.use_outbox);
        assert_eq!(config.scheduling.default_schedule_group, "default");
    }
}
