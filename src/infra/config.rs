use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::error::{PatchError, PatchResult};
use crate::core::patch::Placement;
use crate::core::payload::Thresholds;
use crate::core::registry::KnownModification;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "PANELPATCH_CONFIG";

/// Config files probed in priority order when `PANELPATCH_CONFIG` is unset
const CONFIG_PATHS: [&str; 2] = ["/etc/panelpatch/panelpatch.toml", "panelpatch.toml"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelConfig
{
    /// Name of the modification; also the marker suffix
    pub modification: String,

    /// Backup directory (must exist when set); defaults to ~/.panelpatch/backups
    pub backup_dir: Option<PathBuf>,

    /// Host service restarted after install/uninstall
    pub service: String,

    /// Command the host runs to collect sensor data
    pub probe_command: String,

    /// Key the backend publishes the probe output under
    pub data_key: String,

    /// Colored console output (NO_COLOR always wins)
    pub color: bool,

    /// Temperature limits in Celsius
    pub thresholds: Thresholds,

    /// Backend file publishing the sensor data
    pub api_target: TargetConfig,

    /// Frontend file rendering the widget
    pub ui_target: TargetConfig,

    /// Other modifications recognised by marker
    pub known_modifications: Vec<KnownModification>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig
{
    pub path: PathBuf,
    pub anchor: String,
    pub placement: Placement,
}

impl Default for PanelConfig
{
    fn default() -> Self
    {
        Self {
            modification: "sensors-widget".to_string(),
            backup_dir: None,
            service: "pveproxy".to_string(),
            probe_command: "sensors -j".to_string(),
            data_key: "sensorsOutput".to_string(),
            color: true,
            thresholds: Thresholds::default(),
            api_target: TargetConfig {
                path: PathBuf::from("/usr/share/perl5/PVE/API2/Nodes.pm"),
                anchor: r"my \$dinfo = df\('/', 1\);".to_string(),
                placement: Placement::Before,
            },
            ui_target: TargetConfig {
                path: PathBuf::from("/usr/share/pve-manager/js/pvemanagerlib.js"),
                anchor: r"(?m)^\s*\{\s*\n\s*itemId: 'version',".to_string(),
                placement: Placement::Before,
            },
            known_modifications: Vec::new(),
        }
    }
}

impl PanelConfig
{
    /// Reject configurations the engine cannot work with.
    pub fn validate(&self) -> PatchResult<()>
    {
        let bad = |msg: String| Err(PatchError::Config(msg));

        if self.modification.is_empty()
            || !self
                .modification
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-')
        {
            return bad(format!(
                "modification name '{}' must be non-empty and use only [A-Za-z0-9-]",
                self.modification
            ));
        }

        if self.service.trim().is_empty()
        {
            return bad("service name must not be empty".into());
        }

        if self.probe_command.trim().is_empty()
        {
            return bad("probe_command must not be empty".into());
        }

        let t = &self.thresholds;
        if t.cpu_warning >= t.cpu_critical || t.drive_warning >= t.drive_critical
        {
            return bad("warning thresholds must be below critical thresholds".into());
        }

        let mut names = HashSet::new();
        for target in [&self.api_target, &self.ui_target]
        {
            if !target.path.is_absolute()
            {
                return bad(format!("target path {} must be absolute", target.path.display()));
            }
            // Snapshots are keyed by file name
            if !names.insert(target.path.file_name())
            {
                return bad(format!(
                    "target file names must be distinct ({})",
                    target.path.display()
                ));
            }
        }

        Ok(())
    }
}

/// Load defaults, then the first config file found, then `PANELPATCH__*` env vars.
pub fn load_config() -> PatchResult<PanelConfig>
{
    let explicit = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
    let file = explicit.or_else(|| {
        CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|p| p.exists())
    });
    load_config_from(file.as_deref())
}

/// Same layering with an explicit (optional) config file.
pub fn load_config_from(file: Option<&Path>) -> PatchResult<PanelConfig>
{
    let defaults = config::Config::try_from(&PanelConfig::default())
        .map_err(|e| PatchError::Config(format!("default configuration: {e}")))?;

    let mut builder = config::Config::builder().add_source(defaults);

    if let Some(path) = file
    {
        if !path.exists()
        {
            return Err(PatchError::Config(format!(
                "config file {} does not exist",
                path.display()
            )));
        }
        builder = builder.add_source(config::File::from(path));
    }

    // Double underscore keeps single underscores inside key names
    builder = builder.add_source(
        config::Environment::with_prefix("PANELPATCH")
            .prefix_separator("__")
            .separator("__"),
    );

    let cfg = builder
        .build()
        .map_err(|e| PatchError::Config(format!("failed to load configuration: {e}")))?;
    let parsed: PanelConfig = cfg
        .try_deserialize()
        .map_err(|e| PatchError::Config(format!("failed to parse configuration: {e}")))?;

    parsed.validate()?;
    Ok(parsed)
}
