//! **panelpatch** - Idempotent patch, backup and restore engine for host panel files
//!
//! Injects a temperature widget into a web management panel and removes it again.
//! Every mutation is preceded by a verified snapshot; install state is always
//! read back from the target files themselves.

/// Command-line interface with clap integration
pub mod cli;

/// Core engine - snapshots, anchored patching, state detection, sessions
pub mod core {
    /// Verified timestamped snapshots and the snapshot index
    pub mod backup;
    pub use backup::{BackupStore, FileSnapshot, SnapshotIndex};

    /// Traits for privilege, hardware, service and operator collaborators
    pub mod collab;

    /// Error taxonomy and exit codes
    pub mod error;
    pub use error::{PatchError, PatchResult, exit_code_for};

    /// Sensor family detection from `sensors -j`
    pub mod hardware;

    /// The modification's marker, targets and payload wiring
    pub mod modification;

    /// Pure splice/strip engine and its file wrappers
    pub mod patch;
    pub use patch::{AnchorSpec, AnchoredPatcher, BlockBounds, Placement};

    /// Payload templates and render options
    pub mod payload;

    /// Marker-based install state and coexisting modifications
    pub mod registry;

    /// Install/uninstall state machines
    pub mod session;
    pub use session::{InstallSession, InstallationOutcome, UninstallSession};
}

/// Infrastructure - configuration, file I/O, console and system collaborators
pub mod infra {
    /// Layered configuration (defaults, TOML file, environment)
    pub mod config;
    pub use config::{PanelConfig, load_config};

    /// Colored console operator
    pub mod console;

    /// Atomic writes and digests
    pub mod io;

    /// Process-backed collaborators
    pub mod system;
}

pub use cli::{Cli, Commands};
pub use infra::{PanelConfig, load_config};
