//! The modification being installed: its marker, targets and payloads.

use std::path::{Path, PathBuf};

use crate::core::error::PatchResult;
use crate::core::patch::AnchorSpec;
use crate::core::payload::{RenderOptions, Thresholds, render_api_payload, render_ui_payload};
use crate::core::registry::{KnownModification, ModificationMarker};
use crate::infra::config::PanelConfig;

/// Which template a target receives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Api,
    Ui,
}

/// One target file and how it is patched
#[derive(Debug, Clone)]
pub struct TargetPatch {
    pub path: PathBuf,
    pub anchor: AnchorSpec,
    pub kind: PayloadKind,
}

#[derive(Debug, Clone)]
pub struct Modification {
    marker: ModificationMarker,
    /// Patched in this order
    targets: Vec<TargetPatch>,
    pub known: Vec<KnownModification>,
    pub thresholds: Thresholds,
    pub data_key: String,
    pub probe_command: String,
}

impl Modification {
    pub fn new(name: &str, targets: Vec<TargetPatch>) -> Self {
        let paths = targets.iter().map(|t| t.path.clone()).collect();
        Self {
            marker: ModificationMarker::new(name, paths),
            targets,
            known: Vec::new(),
            thresholds: Thresholds::default(),
            data_key: "sensorsOutput".to_string(),
            probe_command: "sensors -j".to_string(),
        }
    }

    /// Backend file first, then the frontend that reads its output.
    pub fn from_config(cfg: &PanelConfig) -> PatchResult<Self> {
        let targets = vec![
            TargetPatch {
                path: cfg.api_target.path.clone(),
                anchor: AnchorSpec::new(&cfg.api_target.anchor, cfg.api_target.placement)?,
                kind: PayloadKind::Api,
            },
            TargetPatch {
                path: cfg.ui_target.path.clone(),
                anchor: AnchorSpec::new(&cfg.ui_target.anchor, cfg.ui_target.placement)?,
                kind: PayloadKind::Ui,
            },
        ];

        let mut m = Self::new(&cfg.modification, targets);
        m.known = cfg.known_modifications.clone();
        m.thresholds = cfg.thresholds;
        m.data_key = cfg.data_key.clone();
        m.probe_command = cfg.probe_command.clone();
        Ok(m)
    }

    pub fn name(&self) -> &str {
        self.marker.name()
    }

    pub fn marker(&self) -> &ModificationMarker {
        &self.marker
    }

    pub fn targets(&self) -> &[TargetPatch] {
        &self.targets
    }

    pub fn target(&self, path: &Path) -> Option<&TargetPatch> {
        self.targets.iter().find(|t| t.path == path)
    }

    /// Rendered payload for one target.
    pub fn payload_for(&self, target: &TargetPatch, opts: &RenderOptions) -> String {
        let bounds = self.marker.bounds();
        match target.kind {
            PayloadKind::Api => render_api_payload(&bounds, opts),
            PayloadKind::Ui => render_ui_payload(&bounds, opts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hardware::SensorInventory;
    use crate::core::patch::contains_token;
    use crate::core::payload::TemperatureUnit;

    #[test]
    fn from_default_config_orders_api_before_ui() {
        let m = Modification::from_config(&PanelConfig::default()).unwrap();
        assert_eq!(m.name(), "sensors-widget");
        assert_eq!(m.marker().marker(), "panelpatch:sensors-widget");
        let kinds: Vec<_> = m.targets().iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![PayloadKind::Api, PayloadKind::Ui]);
        assert_eq!(m.marker().targets().len(), 2);
    }

    #[test]
    fn every_payload_carries_the_marker() {
        let m = Modification::from_config(&PanelConfig::default()).unwrap();
        let opts = RenderOptions {
            unit: TemperatureUnit::Celsius,
            thresholds: m.thresholds,
            sensors: SensorInventory::cpu_only(),
            data_key: m.data_key.clone(),
            probe_command: m.probe_command.clone(),
        };
        for t in m.targets() {
            assert!(contains_token(&m.payload_for(t, &opts), m.marker().marker()));
        }
    }
}
