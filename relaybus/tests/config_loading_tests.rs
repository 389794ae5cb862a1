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
use std::fs;

use relaybus::common::BusConfig;
use relaybus::saga::MissingInstancePolicy;

use crate::setup::*;

mod setup;

#[test]
fn test_every_section_can_be_overridden() -> anyhow::Result<()> {
    let config = BusConfig::from_toml_str(
        r#"
        [saga]
        use_outbox = false
        missing_instance = "discard"

        [scheduling]
        recurring_trigger_prefix = "Cron."
        default_schedule_group = "ops"

        [topology]
        delete_auto_delete_on_shutdown = false

        [tracing]
        level = "debug"
        "#,
    )?;

    assert!(!config.saga.use_outbox);
    assert_eq!(config.saga.missing_instance, MissingInstancePolicy::Discard);
    assert_eq!(config.scheduling.recurring_trigger_prefix, "Cron.");
    assert_eq!(config.scheduling.default_schedule_group, "ops");
    assert!(!config.topology.delete_auto_delete_on_shutdown);
    assert_eq!(config.tracing.level, "debug");
    Ok(())
}

#[test]
fn test_malformed_text_is_an_error() {
    assert!(BusConfig::from_toml_str("[saga]\nuse_outbox = \"sometimes\"").is_err());
}

// One test owns XDG_CONFIG_HOME for this binary; the steps run in sequence.
#[test]
fn test_load_reads_the_xdg_config_file() -> anyhow::Result<()> {
    initialize_tracing();
    let home = tempfile::tempdir()?;
    std::env::set_var("XDG_CONFIG_HOME", home.path());

    let defaults = BusConfig::load();
    assert!(defaults.saga.use_outbox, "no file yields defaults");

    let dir = home.path().join("relaybus");
    fs::create_dir_all(&dir)?;
    fs::write(
        dir.join("config.toml"),
        "[scheduling]\ndefault_schedule_group = \"nightly-jobs\"\n",
    )?;
    let loaded = BusConfig::load();
    assert_eq!(loaded.scheduling.default_schedule_group, "nightly-jobs");
    assert_eq!(loaded.scheduling.recurring_trigger_prefix, "Recurring.Trigger.");

    fs::write(dir.join("config.toml"), "this is not toml = = =")?;
    let fallback = BusConfig::load();
    assert_eq!(fallback.scheduling.default_schedule_group, "default");
    Ok(())
}
