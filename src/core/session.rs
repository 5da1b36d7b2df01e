//! Install and uninstall sessions
//!
//! Each session walks a fixed sequence of steps and stops at the first error.
//! Install: Start → Checked → Configured → BackedUp → Patched → ServiceReloaded → Done.
//! Uninstall: Start → Checked → ConflictChecked → Restored → ServiceReloaded → Done.
//! Any failure moves the session to `Aborted`. State is always re-derived from
//! the target files, never carried over from an earlier run.

use indexmap::IndexMap;
use itertools::Itertools;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

use crate::core::backup::{BackupStore, FileSnapshot};
use crate::core::collab::Collaborators;
use crate::core::error::{PatchError, PatchResult};
use crate::core::hardware::SensorInventory;
use crate::core::modification::Modification;
use crate::core::patch::AnchoredPatcher;
use crate::core::payload::{RenderOptions, TemperatureUnit};
use crate::core::registry::{InstallState, ModificationRegistry};

/// Result of a session, reported to the caller only
#[derive(Debug)]
pub enum InstallationOutcome {
    Installed,
    AlreadyInstalled,
    NotInstalled,
    Restored,
    Aborted(PatchError),
}

impl InstallationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Installed | Self::Restored)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStep {
    Start,
    Checked,
    Configured,
    BackedUp,
    Patched,
    ServiceReloaded,
    Done,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UninstallStep {
    Start,
    Checked,
    ConflictChecked,
    Restored,
    ServiceReloaded,
    Done,
    Aborted,
}

fn operator_error(e: anyhow::Error) -> PatchError {
    PatchError::Operator(format!("{e:#}"))
}

fn installed_targets(registry: &ModificationRegistry) -> PatchResult<Vec<PathBuf>> {
    Ok(registry
        .current_state()?
        .into_iter()
        .filter(|(_, state)| *state == InstallState::Installed)
        .map(|(path, _)| path)
        .collect())
}

pub struct InstallSession<'a> {
    modification: &'a Modification,
    registry: ModificationRegistry,
    store: &'a BackupStore,
    collab: Collaborators<'a>,
    step: InstallStep,
    options: Option<RenderOptions>,
    snapshots: Vec<FileSnapshot>,
    patched: Vec<PathBuf>,
}

impl<'a> InstallSession<'a> {
    pub fn new(
        modification: &'a Modification,
        store: &'a BackupStore,
        collab: Collaborators<'a>,
    ) -> PatchResult<Self> {
        let registry =
            ModificationRegistry::new(modification.marker().clone(), modification.known.clone())?;
        Ok(Self {
            modification,
            registry,
            store,
            collab,
            step: InstallStep::Start,
            options: None,
            snapshots: Vec::new(),
            patched: Vec::new(),
        })
    }

    pub fn step(&self) -> InstallStep {
        self.step
    }

    /// Options gathered in the `Configured` step.
    pub fn options(&self) -> Option<&RenderOptions> {
        self.options.as_ref()
    }

    pub fn snapshots(&self) -> &[FileSnapshot] {
        &self.snapshots
    }

    /// Files patched so far, in patch order.
    pub fn patched(&self) -> &[PathBuf] {
        &self.patched
    }

    /// Drive the session to completion.
    pub fn run(&mut self) -> InstallationOutcome {
        match self.drive() {
            Ok(()) => InstallationOutcome::Installed,
            Err(e) => {
                self.step = InstallStep::Aborted;
                match e {
                    PatchError::AlreadyInstalled { .. } => InstallationOutcome::AlreadyInstalled,
                    other => InstallationOutcome::Aborted(other),
                }
            }
        }
    }

    fn drive(&mut self) -> PatchResult<()> {
        self.check()?;
        self.step = InstallStep::Checked;

        let opts = self.configure()?;
        self.options = Some(opts.clone());
        self.step = InstallStep::Configured;

        self.back_up()?;
        self.step = InstallStep::BackedUp;

        self.patch(&opts)?;
        self.step = InstallStep::Patched;

        self.reload();
        self.step = InstallStep::ServiceReloaded;

        self.step = InstallStep::Done;
        info!(modification = self.modification.name(), "installed");
        Ok(())
    }

    #[instrument(skip(self))]
    fn check(&self) -> PatchResult<()> {
        if !self.collab.privilege.is_privileged() {
            return Err(PatchError::Privilege);
        }

        let installed = installed_targets(&self.registry)?;
        if !installed.is_empty() {
            for path in &installed {
                self.collab.operator.warn(&format!(
                    "{} already contains the '{}' modification",
                    path.display(),
                    self.modification.name()
                ));
            }
            return Err(PatchError::AlreadyInstalled {
                name: self.modification.name().to_string(),
            });
        }
        Ok(())
    }

    /// Pure data gathering: no target file is read here.
    #[instrument(skip(self))]
    fn configure(&self) -> PatchResult<RenderOptions> {
        let op = self.collab.operator;
        let unit = loop {
            let answer = op
                .prompt("Display temperatures in Celsius or Fahrenheit? [C/f]")
                .map_err(operator_error)?;
            match TemperatureUnit::from_answer(&answer) {
                Some(unit) => break unit,
                None => op.warn(&format!("'{}' is not a valid choice; answer C or F", answer.trim())),
            }
        };

        let sensors = match self.collab.hardware.probe() {
            Ok(inventory) => inventory,
            Err(e) => {
                warn!(error = %e, "hardware probe failed");
                op.warn(&format!("Could not detect sensors ({e:#}); the widget will show CPU sensors only"));
                SensorInventory::cpu_only()
            }
        };

        Ok(RenderOptions {
            unit,
            thresholds: self.modification.thresholds,
            sensors,
            data_key: self.modification.data_key.clone(),
            probe_command: self.modification.probe_command.clone(),
        })
    }

    /// Every target is snapshotted before any of them is touched.
    #[instrument(skip(self))]
    fn back_up(&mut self) -> PatchResult<()> {
        let modification = self.modification;
        for target in modification.targets() {
            let snapshot = self.store.snapshot(modification.name(), &target.path)?;
            self.collab.operator.info(&format!(
                "Backed up {} to {} ({})",
                target.path.display(),
                snapshot.location.display(),
                snapshot.checksum
            ));
            self.snapshots.push(snapshot);
        }
        Ok(())
    }

    /// Patch in fixed order; files patched before a failure stay patched.
    #[instrument(skip(self, opts))]
    fn patch(&mut self, opts: &RenderOptions) -> PatchResult<()> {
        let modification = self.modification;
        let marker = modification.marker().marker();

        for target in modification.targets() {
            let payload = modification.payload_for(target, opts);
            let applied = AnchoredPatcher::insert(&target.path, &target.anchor, &payload).and_then(|_| {
                if AnchoredPatcher::is_present(&target.path, marker)? {
                    Ok(())
                } else {
                    Err(PatchError::BlockNotFound {
                        path: target.path.clone(),
                        marker: marker.to_string(),
                    })
                }
            });

            match applied {
                Ok(()) => {
                    self.collab
                        .operator
                        .info(&format!("Patched {}", target.path.display()));
                    self.patched.push(target.path.clone());
                }
                Err(e) => return Err(self.partial_failure(&target.path, e)),
            }
        }
        Ok(())
    }

    fn partial_failure(&self, failed: &Path, reason: PatchError) -> PatchError {
        if self.patched.is_empty() {
            return reason;
        }

        let op = self.collab.operator;
        op.error(&format!(
            "{} could not be patched; the files below were already patched and were left as is",
            failed.display()
        ));
        for path in &self.patched {
            match self.snapshots.iter().find(|s| &s.source == path) {
                Some(s) => op.error(&format!(
                    "  {} (backup: {})",
                    path.display(),
                    s.location.display()
                )),
                None => op.error(&format!("  {}", path.display())),
            }
        }

        PatchError::PartialPatch {
            patched: self.patched.clone(),
            failed: failed.to_path_buf(),
            reason: Box::new(reason),
        }
    }

    fn reload(&self) {
        match self.collab.reloader.reload() {
            Ok(()) => self.collab.operator.info("Host service restarted"),
            Err(e) => {
                warn!(error = %e, "service reload failed");
                self.collab.operator.warn(&format!(
                    "Could not restart the host service ({e:#}); restart it manually to see the change"
                ));
            }
        }
    }
}

pub struct UninstallSession<'a> {
    modification: &'a Modification,
    registry: ModificationRegistry,
    store: &'a BackupStore,
    collab: Collaborators<'a>,
    step: UninstallStep,
    installed: Vec<PathBuf>,
    coexisting: IndexMap<PathBuf, BTreeSet<String>>,
    best_effort: Vec<PathBuf>,
}

impl<'a> UninstallSession<'a> {
    pub fn new(
        modification: &'a Modification,
        store: &'a BackupStore,
        collab: Collaborators<'a>,
    ) -> PatchResult<Self> {
        let registry =
            ModificationRegistry::new(modification.marker().clone(), modification.known.clone())?;
        Ok(Self {
            modification,
            registry,
            store,
            collab,
            step: UninstallStep::Start,
            installed: Vec::new(),
            coexisting: IndexMap::new(),
            best_effort: Vec::new(),
        })
    }

    pub fn step(&self) -> UninstallStep {
        self.step
    }

    /// Other modifications found per target in the conflict check.
    pub fn coexisting(&self) -> &IndexMap<PathBuf, BTreeSet<String>> {
        &self.coexisting
    }

    /// Targets cleaned by block removal because no snapshot existed.
    pub fn best_effort(&self) -> &[PathBuf] {
        &self.best_effort
    }

    pub fn run(&mut self) -> InstallationOutcome {
        match self.drive() {
            Ok(()) => InstallationOutcome::Restored,
            Err(e) => {
                self.step = UninstallStep::Aborted;
                match e {
                    PatchError::NotInstalled { .. } => InstallationOutcome::NotInstalled,
                    other => InstallationOutcome::Aborted(other),
                }
            }
        }
    }

    fn drive(&mut self) -> PatchResult<()> {
        self.check()?;
        self.step = UninstallStep::Checked;

        self.conflict_check()?;
        self.step = UninstallStep::ConflictChecked;

        self.restore()?;
        self.step = UninstallStep::Restored;

        self.reload();
        self.step = UninstallStep::ServiceReloaded;

        self.step = UninstallStep::Done;
        info!(modification = self.modification.name(), "restored");
        Ok(())
    }

    #[instrument(skip(self))]
    fn check(&mut self) -> PatchResult<()> {
        if !self.collab.privilege.is_privileged() {
            return Err(PatchError::Privilege);
        }
        self.installed = installed_targets(&self.registry)?;
        if self.installed.is_empty() {
            return Err(PatchError::NotInstalled {
                name: self.modification.name().to_string(),
            });
        }
        Ok(())
    }

    /// Restoring a whole-file snapshot also reverts other modifications.
    #[instrument(skip(self))]
    fn conflict_check(&mut self) -> PatchResult<()> {
        for path in &self.installed {
            let others = self.registry.coexisting_modifications(path)?;
            if !others.is_empty() {
                self.coexisting.insert(path.clone(), others);
            }
        }
        if self.coexisting.is_empty() {
            return Ok(());
        }

        let op = self.collab.operator;
        for (path, others) in &self.coexisting {
            op.warn(&format!(
                "{} also carries: {}",
                path.display(),
                others.iter().join(", ")
            ));
        }
        op.warn("Restoring the backups will remove those modifications as well.");

        let proceed = op
            .confirm("Restore the backups anyway?")
            .map_err(operator_error)?;
        if proceed {
            return Ok(());
        }

        self.print_manual_guidance()?;
        Err(PatchError::Declined)
    }

    fn print_manual_guidance(&self) -> PatchResult<()> {
        let op = self.collab.operator;
        let bounds = self.modification.marker().bounds();
        op.info("To remove this modification by hand:");
        for path in &self.installed {
            op.info(&format!(
                "  {}: delete the lines from '{}' through '{}'",
                path.display(),
                bounds.begin,
                bounds.end
            ));
            if let Some(snap) = self.store.latest_for(self.modification.name(), path)? {
                op.info(&format!(
                    "  or restore the whole file (reverting the other modifications): cp {} {}",
                    snap.location.display(),
                    path.display()
                ));
            }
        }
        Ok(())
    }

    /// Latest snapshot per target; bounded-block removal when none exists.
    #[instrument(skip(self))]
    fn restore(&mut self) -> PatchResult<()> {
        let modification = self.modification;
        let marker = modification.marker().marker();
        let bounds = modification.marker().bounds();
        let op = self.collab.operator;

        for path in self.installed.clone() {
            match self.store.latest_for(modification.name(), &path)? {
                Some(snap) => {
                    self.store.restore(&snap, &path)?;
                    op.info(&format!(
                        "Restored {} from {}",
                        path.display(),
                        snap.location.display()
                    ));
                    if AnchoredPatcher::is_present(&path, marker)? {
                        op.warn(&format!(
                            "Backup {} still contained the modification; removing its block",
                            snap.location.display()
                        ));
                        AnchoredPatcher::remove(&path, marker, &bounds)?;
                    }
                }
                None => {
                    op.warn(&format!(
                        "No backup found for {}; removing the marked block instead (best effort)",
                        path.display()
                    ));
                    AnchoredPatcher::remove(&path, marker, &bounds)?;
                    self.best_effort.push(path.clone());
                }
            }
        }
        Ok(())
    }

    fn reload(&self) {
        match self.collab.reloader.reload() {
            Ok(()) => self.collab.operator.info("Host service restarted"),
            Err(e) => {
                warn!(error = %e, "service reload failed");
                self.collab.operator.warn(&format!(
                    "Could not restart the host service ({e:#}); restart it manually"
                ));
            }
        }
    }
}
