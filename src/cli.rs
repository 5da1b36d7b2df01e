use clap::{Parser, Subcommand};
use miette::Report;

use crate::core::backup::BackupStore;
use crate::core::collab::{Collaborators, Operator};
use crate::core::error::{PatchError, PatchResult, exit_code_for};
use crate::core::modification::Modification;
use crate::core::session::{InstallSession, InstallationOutcome, UninstallSession};
use crate::infra::config::{PanelConfig, load_config};
use crate::infra::console::Console;
use crate::infra::system::{RootPrivilege, SensorsProbe, SystemdReloader};

#[derive(Parser)]
#[command(name = "panelpatch")]
#[command(
    about = "Inject a temperature widget into a web management panel, and remove it again"
)]
#[command(version, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Back up the host files and inject the widget
    Install,

    /// Restore the host files from their latest backups
    Uninstall,
}

/// Load configuration, run the chosen session, and map it to an exit code.
pub fn run(cli: Cli) -> i32 {
    let cfg = match load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("{:?}", Report::new(e));
            return code;
        }
    };
    run_with(cli.command, &cfg)
}

/// Same as [`run`] with an already loaded configuration.
pub fn run_with(command: Commands, cfg: &PanelConfig) -> i32 {
    let console = Console::new(cfg.color);
    let privilege = RootPrivilege;
    let hardware = SensorsProbe::new(&cfg.probe_command);
    let reloader = SystemdReloader::new(&cfg.service);
    let collab = Collaborators {
        privilege: &privilege,
        hardware: &hardware,
        reloader: &reloader,
        operator: &console,
    };

    let outcome = match prepare(command, cfg, collab) {
        Ok(outcome) => outcome,
        Err(e) => InstallationOutcome::Aborted(e),
    };
    report(&console, outcome)
}

fn prepare(
    command: Commands,
    cfg: &PanelConfig,
    collab: Collaborators<'_>,
) -> PatchResult<InstallationOutcome> {
    // Opening the store may create the backup directory
    if !collab.privilege.is_privileged() {
        return Err(PatchError::Privilege);
    }
    let modification = Modification::from_config(cfg)?;
    let store = BackupStore::open(cfg.backup_dir.as_deref())?;
    let outcome = match command {
        Commands::Install => InstallSession::new(&modification, &store, collab)?.run(),
        Commands::Uninstall => UninstallSession::new(&modification, &store, collab)?.run(),
    };
    Ok(outcome)
}

/// Print the outcome and pick the exit code.
pub fn report(op: &dyn Operator, outcome: InstallationOutcome) -> i32 {
    match outcome {
        InstallationOutcome::Installed => {
            op.info("Modification installed. Reload the web interface to see the widget.");
            0
        }
        InstallationOutcome::Restored => {
            op.info("Modification removed. Reload the web interface to apply.");
            0
        }
        InstallationOutcome::AlreadyInstalled => {
            op.warn("Modification is already installed; nothing was changed.");
            2
        }
        InstallationOutcome::NotInstalled => {
            op.warn("Modification is not installed; nothing was changed.");
            2
        }
        InstallationOutcome::Aborted(e) => {
            let code = exit_code_for(&e);
            op.error("Aborted.");
            eprintln!("{:?}", Report::new(e));
            code
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::collab::{HardwareProbe, PrivilegeCheck, ServiceReloader};
    use crate::core::hardware::SensorInventory;
    use tempfile::TempDir;

    /// Unprivileged collaborators that fail loudly if a session gets that far
    struct Unprivileged;

    impl PrivilegeCheck for Unprivileged {
        fn is_privileged(&self) -> bool {
            false
        }
    }

    impl HardwareProbe for Unprivileged {
        fn probe(&self) -> anyhow::Result<SensorInventory> {
            anyhow::bail!("not expected")
        }
    }

    impl ServiceReloader for Unprivileged {
        fn reload(&self) -> anyhow::Result<()> {
            anyhow::bail!("not expected")
        }
    }

    impl Operator for Unprivileged {
        fn info(&self, _: &str) {}
        fn warn(&self, _: &str) {}
        fn error(&self, _: &str) {}
        fn prompt(&self, _: &str) -> anyhow::Result<String> {
            anyhow::bail!("not expected")
        }
    }

    #[test]
    fn privilege_is_checked_before_the_backup_directory_is_touched() {
        let tmp = TempDir::new().unwrap();
        let backups = tmp.path().join("missing");
        let mut cfg = PanelConfig::default();
        cfg.backup_dir = Some(backups.clone());

        let fake = Unprivileged;
        let collab = Collaborators {
            privilege: &fake,
            hardware: &fake,
            reloader: &fake,
            operator: &fake,
        };
        for command in [Commands::Install, Commands::Uninstall] {
            // A missing configured directory would otherwise be a config error
            let err = prepare(command, &cfg, collab).unwrap_err();
            assert!(matches!(err, PatchError::Privilege), "{err:?}");
            assert_eq!(exit_code_for(&err), 4);
        }
        assert!(!backups.exists());
    }

    #[test]
    fn parses_subcommands() {
        let cli = Cli::parse_from(["panelpatch", "install"]);
        assert_eq!(cli.command, Commands::Install);
        let cli = Cli::parse_from(["panelpatch", "uninstall"]);
        assert_eq!(cli.command, Commands::Uninstall);
    }

    #[test]
    fn rejects_missing_unknown_and_extra_arguments() {
        assert!(Cli::try_parse_from(["panelpatch"]).is_err());
        assert!(Cli::try_parse_from(["panelpatch", "upgrade"]).is_err());
        assert!(Cli::try_parse_from(["panelpatch", "install", "--force"]).is_err());
    }
}
