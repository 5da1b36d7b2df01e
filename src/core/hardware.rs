//! Sensor inventory detected from `sensors -j` output.
//!
//! Only the adapter names matter here: they decide which rows the widget
//! renders. Readings themselves are fetched by the host at request time.

use serde_json::Value;

/// Sensor families present on the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorInventory {
    pub cpu: bool,
    pub nvme: bool,
    pub drives: bool,
}

impl Default for SensorInventory {
    fn default() -> Self {
        Self::cpu_only()
    }
}

// Adapter name prefixes as reported by lm-sensors drivers
const CPU_ADAPTERS: &[&str] = &["coretemp-", "k10temp-", "zenpower-", "cpu_thermal-"];
const NVME_ADAPTERS: &[&str] = &["nvme-"];
const DRIVE_ADAPTERS: &[&str] = &["drivetemp-"];

impl SensorInventory {
    /// Fallback when nothing could be probed
    pub fn cpu_only() -> Self {
        Self { cpu: true, nvme: false, drives: false }
    }

    /// Parse the JSON document printed by `sensors -j`.
    pub fn from_sensors_json(text: &str) -> serde_json::Result<Self> {
        let doc: Value = serde_json::from_str(text)?;
        let mut inv = Self { cpu: false, nvme: false, drives: false };

        if let Value::Object(adapters) = doc {
            for name in adapters.keys() {
                let has = |prefixes: &[&str]| prefixes.iter().any(|p| name.starts_with(p));
                inv.cpu |= has(CPU_ADAPTERS);
                inv.nvme |= has(NVME_ADAPTERS);
                inv.drives |= has(DRIVE_ADAPTERS);
            }
        }
        Ok(inv)
    }

    /// Family identifiers in widget order.
    pub fn families(&self) -> Vec<&'static str> {
        let mut out = Vec::with_capacity(3);
        if self.cpu {
            out.push("cpu");
        }
        if self.nvme {
            out.push("nvme");
        }
        if self.drives {
            out.push("drive");
        }
        out
    }
}
