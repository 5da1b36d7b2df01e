mod util;

use anyhow::Result;
use assert_fs::prelude::*;
use panelpatch::core::error::PatchError;
use panelpatch::core::modification::{Modification, PayloadKind};
use panelpatch::core::patch::Placement;
use panelpatch::infra::config::load_config_from;

/// Write a TOML config built from `table` into a fresh temp dir.
fn write_config(table: toml::Table) -> Result<(assert_fs::TempDir, std::path::PathBuf)> {
    let tmp = assert_fs::TempDir::new()?;
    let file = tmp.child("panelpatch.toml");
    file.write_str(&toml::to_string(&table)?)?;
    let path = file.path().to_path_buf();
    Ok((tmp, path))
}

#[test]
fn file_values_override_defaults_key_by_key() -> Result<()> {
    let host = util::FakeHost::new();

    let mut thresholds = toml::Table::new();
    thresholds.insert("cpu_warning".into(), 70.0.into());
    let mut api = toml::Table::new();
    api.insert("path".into(), host.api.display().to_string().into());
    let mut ui = toml::Table::new();
    ui.insert("path".into(), host.ui.display().to_string().into());
    ui.insert("placement".into(), "after".into());

    let mut table = toml::Table::new();
    table.insert("service".into(), "pveproxy.service".into());
    table.insert("backup_dir".into(), host.backups.display().to_string().into());
    table.insert("thresholds".into(), thresholds.into());
    table.insert("api_target".into(), api.into());
    table.insert("ui_target".into(), ui.into());
    let (_tmp, path) = write_config(table)?;

    let cfg = load_config_from(Some(&path))?;
    assert_eq!(cfg.service, "pveproxy.service");
    assert_eq!(cfg.backup_dir.as_deref(), Some(host.backups.as_path()));
    assert_eq!(cfg.thresholds.cpu_warning, 70.0);
    // Untouched siblings keep their defaults
    assert_eq!(cfg.thresholds.cpu_critical, 90.0);
    assert_eq!(cfg.modification, "sensors-widget");
    assert_eq!(cfg.api_target.path, host.api);
    assert!(cfg.api_target.anchor.contains("dinfo"));
    assert_eq!(cfg.ui_target.placement, Placement::After);

    let modification = Modification::from_config(&cfg)?;
    assert_eq!(modification.targets()[0].kind, PayloadKind::Api);
    assert_eq!(modification.targets()[1].anchor.placement(), Placement::After);
    Ok(())
}

#[test]
fn known_modifications_load_from_file() -> Result<()> {
    let mut known = toml::Table::new();
    known.insert("name".into(), "hw-monitor".into());
    known.insert("marker".into(), "modbyhwmonitor".into());
    let mut table = toml::Table::new();
    table.insert(
        "known_modifications".into(),
        toml::Value::Array(vec![known.into()]),
    );
    let (_tmp, path) = write_config(table)?;

    let cfg = load_config_from(Some(&path))?;
    assert_eq!(cfg.known_modifications.len(), 1);
    assert_eq!(cfg.known_modifications[0].marker, "modbyhwmonitor");
    Ok(())
}

#[test]
fn invalid_anchor_is_a_config_error() -> Result<()> {
    let mut api = toml::Table::new();
    api.insert("anchor".into(), "my ($dinfo".into());
    let mut table = toml::Table::new();
    table.insert("api_target".into(), api.into());
    let (_tmp, path) = write_config(table)?;

    // Loading succeeds; compiling the anchor does not
    let cfg = load_config_from(Some(&path))?;
    let err = Modification::from_config(&cfg).unwrap_err();
    assert!(matches!(err, PatchError::Config(msg) if msg.contains("invalid anchor")));
    Ok(())
}

#[test]
fn duplicate_target_file_names_are_rejected() -> Result<()> {
    let mut ui = toml::Table::new();
    ui.insert("path".into(), "/srv/other/Nodes.pm".into());
    let mut table = toml::Table::new();
    table.insert("ui_target".into(), ui.into());
    let (_tmp, path) = write_config(table)?;

    let err = load_config_from(Some(&path)).unwrap_err();
    assert!(matches!(err, PatchError::Config(msg) if msg.contains("distinct")));
    Ok(())
}
