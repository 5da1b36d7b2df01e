//! Process-backed collaborators: root check, sensor probe, service restart.

use std::process::Command;

use anyhow::{Context, Result, bail};
use tracing::debug;

use crate::core::collab::{HardwareProbe, PrivilegeCheck, ServiceReloader};
use crate::core::hardware::SensorInventory;

/// Effective uid 0
pub struct RootPrivilege;

impl PrivilegeCheck for RootPrivilege {
    #[cfg(unix)]
    fn is_privileged(&self) -> bool {
        // Safety: geteuid has no preconditions and cannot fail
        unsafe { libc::geteuid() == 0 }
    }

    #[cfg(not(unix))]
    fn is_privileged(&self) -> bool {
        false
    }
}

/// Runs the configured probe command (normally `sensors -j`)
pub struct SensorsProbe {
    command: String,
}

impl SensorsProbe {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
        }
    }
}

impl HardwareProbe for SensorsProbe {
    fn probe(&self) -> Result<SensorInventory> {
        let mut parts = self.command.split_whitespace();
        let program = parts.next().context("empty probe command")?;
        let output = Command::new(program)
            .args(parts)
            .output()
            .with_context(|| format!("run `{}` (is lm-sensors installed?)", self.command))?;

        if !output.status.success() {
            bail!(
                "`{}` exited with {}: {}",
                self.command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let text = String::from_utf8_lossy(&output.stdout);
        let inventory = SensorInventory::from_sensors_json(&text)
            .with_context(|| format!("parse output of `{}`", self.command))?;
        debug!(?inventory, "sensors detected");
        Ok(inventory)
    }
}

/// `systemctl restart <service>`
pub struct SystemdReloader {
    service: String,
}

impl SystemdReloader {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }
}

impl ServiceReloader for SystemdReloader {
    fn reload(&self) -> Result<()> {
        let status = Command::new("systemctl")
            .args(["restart", &self.service])
            .status()
            .context("run systemctl")?;
        if !status.success() {
            bail!("systemctl restart {} exited with {}", self.service, status);
        }
        debug!(service = %self.service, "service restarted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_probe_binary_is_an_error() {
        let probe = SensorsProbe::new("panelpatch-no-such-binary -j");
        assert!(probe.probe().is_err());
        assert!(SensorsProbe::new("   ").probe().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn probe_parses_command_output() {
        let probe = SensorsProbe::new(r#"echo {"nvme-pci-0100":{}}"#);
        let inv = probe.probe().unwrap();
        assert!(inv.nvme && !inv.cpu);
    }
}
