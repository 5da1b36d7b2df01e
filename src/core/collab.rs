//! Narrow interfaces to everything outside the patch engine.
//!
//! Sessions only see these traits; `infra::system` and `infra::console` hold
//! the real implementations and tests substitute fakes.

use anyhow::Result;

use crate::core::hardware::SensorInventory;

pub trait PrivilegeCheck {
    fn is_privileged(&self) -> bool;
}

/// Source of the sensor families the widget should show
pub trait HardwareProbe {
    fn probe(&self) -> Result<SensorInventory>;
}

/// Restart of the host service after a file change
pub trait ServiceReloader {
    fn reload(&self) -> Result<()>;
}

/// Line-based prompts and leveled console messages
pub trait Operator {
    fn info(&self, msg: &str);
    fn warn(&self, msg: &str);
    fn error(&self, msg: &str);

    /// Ask a question and return the raw answer line.
    fn prompt(&self, question: &str) -> Result<String>;

    /// Yes/no question; anything but `y`/`yes` declines.
    fn confirm(&self, question: &str) -> Result<bool> {
        let answer = self.prompt(&format!("{question} [y/N]"))?;
        Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
    }
}

/// Bundle of collaborators handed to a session
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub privilege: &'a dyn PrivilegeCheck,
    pub hardware: &'a dyn HardwareProbe,
    pub reloader: &'a dyn ServiceReloader,
    pub operator: &'a dyn Operator,
}
