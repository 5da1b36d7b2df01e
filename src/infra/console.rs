//! Terminal operator: colored leveled messages and stdin prompts.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result, bail};
use owo_colors::OwoColorize;

use crate::core::collab::Operator;

pub struct Console {
    color: bool,
}

impl Console {
    /// `NO_COLOR` in the environment always disables color.
    pub fn new(color: bool) -> Self {
        let no_color = std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty());
        Self {
            color: color && !no_color,
        }
    }

    fn tag(&self, level: Level) -> String {
        let label = level.label();
        if !self.color {
            return label.to_string();
        }
        match level {
            Level::Info => label.green().bold().to_string(),
            Level::Warn => label.yellow().bold().to_string(),
            Level::Error => label.red().bold().to_string(),
            Level::Ask => label.cyan().bold().to_string(),
        }
    }
}

#[derive(Clone, Copy)]
enum Level {
    Info,
    Warn,
    Error,
    Ask,
}

impl Level {
    fn label(self) -> &'static str {
        match self {
            Level::Info => "[info]",
            Level::Warn => "[warn]",
            Level::Error => "[error]",
            Level::Ask => "[?]",
        }
    }
}

impl Operator for Console {
    fn info(&self, msg: &str) {
        println!("{} {}", self.tag(Level::Info), msg);
    }

    fn warn(&self, msg: &str) {
        eprintln!("{} {}", self.tag(Level::Warn), msg);
    }

    fn error(&self, msg: &str) {
        eprintln!("{} {}", self.tag(Level::Error), msg);
    }

    fn prompt(&self, question: &str) -> Result<String> {
        let mut out = io::stdout().lock();
        write!(out, "{} {} ", self.tag(Level::Ask), question).context("write prompt")?;
        out.flush().context("flush prompt")?;

        let mut line = String::new();
        let read = io::stdin()
            .lock()
            .read_line(&mut line)
            .context("read answer from stdin")?;
        if read == 0 {
            bail!("stdin closed before an answer was given");
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}
