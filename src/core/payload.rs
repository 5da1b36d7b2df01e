//! Payload rendering.
//!
//! Rendering is a pure function of [`RenderOptions`] substituted into fixed
//! templates. Nothing here touches the filesystem.

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::core::hardware::SensorInventory;
use crate::core::patch::BlockBounds;

/// Display unit chosen by the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    /// Interpret a prompt answer; empty selects the default.
    pub fn from_answer(answer: &str) -> Option<Self> {
        match answer.trim().to_ascii_lowercase().as_str() {
            "" | "c" | "celsius" => Some(Self::Celsius),
            "f" | "fahrenheit" => Some(Self::Fahrenheit),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Celsius => "°C",
            Self::Fahrenheit => "°F",
        }
    }

    /// Convert a Celsius reading into this unit.
    pub fn from_celsius(self, celsius: f64) -> f64 {
        match self {
            Self::Celsius => celsius,
            Self::Fahrenheit => celsius * 9.0 / 5.0 + 32.0,
        }
    }
}

/// Warning/critical limits, always configured in Celsius
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub cpu_warning: f64,
    pub cpu_critical: f64,
    pub drive_warning: f64,
    pub drive_critical: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cpu_warning: 80.0,
            cpu_critical: 90.0,
            drive_warning: 50.0,
            drive_critical: 60.0,
        }
    }
}

impl Thresholds {
    pub fn in_unit(&self, unit: TemperatureUnit) -> Self {
        Self {
            cpu_warning: unit.from_celsius(self.cpu_warning),
            cpu_critical: unit.from_celsius(self.cpu_critical),
            drive_warning: unit.from_celsius(self.drive_warning),
            drive_critical: unit.from_celsius(self.drive_critical),
        }
    }
}

/// Everything a payload depends on
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    pub unit: TemperatureUnit,
    pub thresholds: Thresholds,
    pub sensors: SensorInventory,
    /// Key under which the backend publishes the probe output
    pub data_key: String,
    pub probe_command: String,
}

/// Backend (Perl API) template
const API_TEMPLATE: &str = "\t# @BEGIN@
\t$res->{@DATA_KEY@} = `@COMMAND@`;
\t# @END@
";

/// Frontend (ExtJS status panel) template
const UI_TEMPLATE: &str = "\t// @BEGIN@
\t{
\t    itemId: 'thermal',
\t    colspan: 2,
\t    printBar: false,
\t    title: gettext('Temperatures'),
\t    textField: '@DATA_KEY@',
\t    renderer: function(value) {
\t        const unit = '@UNIT@';
\t        const fahrenheit = @FAHRENHEIT@;
\t        const limits = { cpu: [@CPU_WARN@, @CPU_CRIT@], nvme: [@DRIVE_WARN@, @DRIVE_CRIT@], drive: [@DRIVE_WARN@, @DRIVE_CRIT@] };
\t        const families = [@FAMILIES@];
\t        let data;
\t        try { data = JSON.parse(value); } catch (e) { return gettext('No sensor data'); }
\t        const rows = [];
\t        Object.keys(data).sort().forEach(function(adapter) {
\t            const family = adapter.startsWith('nvme-') ? 'nvme'
\t                : adapter.startsWith('drivetemp-') ? 'drive' : 'cpu';
\t            if (!families.includes(family)) { return; }
\t            Object.values(data[adapter]).forEach(function(chip) {
\t                Object.keys(chip).filter((k) => k.endsWith('_input')).forEach(function(k) {
\t                    let t = chip[k];
\t                    if (fahrenheit) { t = t * 9 / 5 + 32; }
\t                    const [warn, crit] = limits[family];
\t                    const style = t >= crit ? 'color: red; font-weight: bold;'
\t                        : t >= warn ? 'color: orange;' : '';
\t                    rows.push(`<span style=\"${style}\">${t.toFixed(1)}${unit}</span>`);
\t                });
\t            });
\t        });
\t        return rows.length ? rows.join('&nbsp;| ') : gettext('No sensor data');
\t    },
\t},
\t// @END@
";

/// Format a limit without a trailing `.0`
fn number(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{v:.0}")
    } else {
        format!("{v:.1}")
    }
}

/// Backend payload publishing the probe output under `data_key`.
pub fn render_api_payload(bounds: &BlockBounds, opts: &RenderOptions) -> String {
    API_TEMPLATE
        .replace("@BEGIN@", &bounds.begin)
        .replace("@END@", &bounds.end)
        .replace("@DATA_KEY@", &opts.data_key)
        .replace("@COMMAND@", &opts.probe_command)
}

/// Frontend widget reading `data_key` and colouring by thresholds.
pub fn render_ui_payload(bounds: &BlockBounds, opts: &RenderOptions) -> String {
    let limits = opts.thresholds.in_unit(opts.unit);
    let families = opts
        .sensors
        .families()
        .iter()
        .map(|f| format!("'{f}'"))
        .join(", ");

    UI_TEMPLATE
        .replace("@BEGIN@", &bounds.begin)
        .replace("@END@", &bounds.end)
        .replace("@DATA_KEY@", &opts.data_key)
        .replace("@UNIT@", opts.unit.symbol())
        .replace("@FAHRENHEIT@", if opts.unit == TemperatureUnit::Fahrenheit { "true" } else { "false" })
        .replace("@CPU_WARN@", &number(limits.cpu_warning))
        .replace("@CPU_CRIT@", &number(limits.cpu_critical))
        .replace("@DRIVE_WARN@", &number(limits.drive_warning))
        .replace("@DRIVE_CRIT@", &number(limits.drive_critical))
        .replace("@FAMILIES@", &families)
}
