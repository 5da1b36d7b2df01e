//! Shared test utilities for integration tests
//!
//! Provides a fake host installation (backend + frontend files in a temp
//! directory) and a scripted collaborator standing in for the operator,
//! the privilege check, the sensor probe and the service restart.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow, bail};
use assert_fs::prelude::*;

use panelpatch::core::backup::BackupStore;
use panelpatch::core::collab::{Collaborators, HardwareProbe, Operator, PrivilegeCheck, ServiceReloader};
use panelpatch::core::hardware::SensorInventory;
use panelpatch::core::modification::Modification;
use panelpatch::infra::config::PanelConfig;

pub const API_ORIGINAL: &str = "__PACKAGE__->register_method({
    name => 'status',
    path => 'status',
    method => 'GET',
    code => sub {
\tmy ($param) = @_;

\tmy $res = {
\t    uptime => 0,
\t    idle => 0,
\t};

\tmy $dinfo = df('/', 1);     # output is bytes
\t$res->{rootfs} = {
\t    total => $dinfo->{blocks},
\t};

\treturn $res;
    }});
";

pub const UI_ORIGINAL: &str = "Ext.define('PVE.node.StatusView', {
    extend: 'Proxmox.panel.StatusView',
    items: [
\t{
\t    itemId: 'cpus',
\t    printBar: false,
\t    title: gettext('CPU(s)'),
\t    textField: 'cpuinfo',
\t},
\t{
\t    itemId: 'version',
\t    colspan: 2,
\t    printBar: false,
\t    title: gettext('PVE Manager Version'),
\t    textField: 'pveversion',
\t    value: '',
\t},
    ],
});
";

/// Fake host layout inside a temp directory
pub struct FakeHost {
    pub root: assert_fs::TempDir,
    pub api: PathBuf,
    pub ui: PathBuf,
    pub backups: PathBuf,
}

impl FakeHost {
    pub fn new() -> Self {
        let root = assert_fs::TempDir::new().expect("tempdir");
        root.child("perl5/PVE/API2/Nodes.pm")
            .write_str(API_ORIGINAL)
            .expect("write api");
        root.child("pve-manager/js/pvemanagerlib.js")
            .write_str(UI_ORIGINAL)
            .expect("write ui");
        root.child("backups").create_dir_all().expect("backups");

        let api = root.child("perl5/PVE/API2/Nodes.pm").path().to_path_buf();
        let ui = root.child("pve-manager/js/pvemanagerlib.js").path().to_path_buf();
        let backups = root.child("backups").path().to_path_buf();
        Self { root, api, ui, backups }
    }

    /// Default config pointed at the fake files.
    pub fn config(&self) -> PanelConfig {
        let mut cfg = PanelConfig::default();
        cfg.api_target.path = self.api.clone();
        cfg.ui_target.path = self.ui.clone();
        cfg.backup_dir = Some(self.backups.clone());
        cfg.color = false;
        cfg
    }

    pub fn modification(&self) -> Modification {
        Modification::from_config(&self.config()).expect("modification")
    }

    pub fn store(&self) -> BackupStore {
        BackupStore::open(Some(&self.backups)).expect("store")
    }

    pub fn read(&self, path: &Path) -> String {
        fs::read_to_string(path).expect("read")
    }

    /// Number of snapshot files in the backup directory.
    pub fn backup_count(&self) -> usize {
        fs::read_dir(&self.backups)
            .expect("read backups")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".bak"))
            .count()
    }

    pub fn is_pristine(&self) -> bool {
        self.read(&self.api) == API_ORIGINAL && self.read(&self.ui) == UI_ORIGINAL
    }
}

/// Scripted collaborators with message capture
pub struct Script {
    answers: RefCell<VecDeque<String>>,
    pub messages: RefCell<Vec<(&'static str, String)>>,
    pub privileged: bool,
    pub reload_fails: bool,
    pub reloads: Cell<usize>,
    pub inventory: Option<SensorInventory>,
}

impl Script {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: RefCell::new(answers.iter().map(|a| a.to_string()).collect()),
            messages: RefCell::new(Vec::new()),
            privileged: true,
            reload_fails: false,
            reloads: Cell::new(0),
            inventory: Some(SensorInventory::cpu_only()),
        }
    }

    pub fn collab(&self) -> Collaborators<'_> {
        Collaborators {
            privilege: self,
            hardware: self,
            reloader: self,
            operator: self,
        }
    }

    /// True if any message at `level` contains `needle`.
    pub fn said(&self, level: &str, needle: &str) -> bool {
        self.messages
            .borrow()
            .iter()
            .any(|(l, m)| *l == level && m.contains(needle))
    }

    pub fn unanswered(&self) -> usize {
        self.answers.borrow().len()
    }
}

impl PrivilegeCheck for Script {
    fn is_privileged(&self) -> bool {
        self.privileged
    }
}

impl HardwareProbe for Script {
    fn probe(&self) -> Result<SensorInventory> {
        self.inventory.ok_or_else(|| anyhow!("sensors: command not found"))
    }
}

impl ServiceReloader for Script {
    fn reload(&self) -> Result<()> {
        self.reloads.set(self.reloads.get() + 1);
        if self.reload_fails {
            bail!("Job for pveproxy.service failed");
        }
        Ok(())
    }
}

impl Operator for Script {
    fn info(&self, msg: &str) {
        self.messages.borrow_mut().push(("info", msg.to_string()));
    }

    fn warn(&self, msg: &str) {
        self.messages.borrow_mut().push(("warn", msg.to_string()));
    }

    fn error(&self, msg: &str) {
        self.messages.borrow_mut().push(("error", msg.to_string()));
    }

    fn prompt(&self, question: &str) -> Result<String> {
        self.messages.borrow_mut().push(("prompt", question.to_string()));
        self.answers
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("stdin closed before an answer was given"))
    }
}
