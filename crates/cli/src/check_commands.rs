//! `switchboard check`: config validation and agent readiness report.
//!
//! Prints one section per area with `[ok]`, `[warn]`, `[fail]` or `[info]`
//! per item and exits non-zero when anything failed.

use std::path::Path;

use {
    anyhow::Result,
    switchboard_channels::gating::AccessPolicy,
    switchboard_config::{
        SwitchboardConfig,
        validate::{self, Severity},
    },
};

// ── ANSI helpers ────────────────────────────────────────────────────────────

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Ok,
    Warn,
    Fail,
    Info,
}

impl Status {
    fn label(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Warn => "warn",
            Self::Fail => "fail",
            Self::Info => "info",
        }
    }

    fn color(self) -> &'static str {
        match self {
            Self::Ok => GREEN,
            Self::Warn => YELLOW,
            Self::Fail => RED,
            Self::Info => CYAN,
        }
    }
}

impl From<Severity> for Status {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Error => Self::Fail,
            Severity::Warning => Self::Warn,
            Severity::Info => Self::Info,
        }
    }
}

struct Section {
    title: String,
    items: Vec<(Status, String)>,
}

impl Section {
    fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            items: Vec::new(),
        }
    }

    fn push(&mut self, status: Status, message: impl Into<String>) {
        self.items.push((status, message.into()));
    }
}

fn print_report(sections: &[Section]) -> (usize, usize) {
    let mut errors = 0usize;
    let mut warnings = 0usize;

    for section in sections {
        eprintln!("{BOLD}{}{RESET}", section.title);
        for (status, message) in &section.items {
            eprintln!("  [{}{}{RESET}]  {message}", status.color(), status.label());
            match status {
                Status::Fail => errors += 1,
                Status::Warn => warnings += 1,
                _ => {},
            }
        }
        eprintln!();
    }

    (errors, warnings)
}

// ── Entry point ─────────────────────────────────────────────────────────────

pub fn handle_check(path: &Path) -> Result<()> {
    eprintln!("{BOLD}switchboard check{RESET}");
    eprintln!("{BOLD}================={RESET}\n");

    let result = validate::validate_file(path);
    let mut sections = vec![check_config(path, &result)];

    // agents and channels can only be inspected once the file parses
    if let Ok(config) = switchboard_config::load_config(path) {
        sections.push(check_agents(&config));
        sections.push(check_channels(&config));
    }

    let (errors, warnings) = print_report(&sections);
    eprintln!("{BOLD}Summary:{RESET} {errors} error(s), {warnings} warning(s)");

    if errors > 0 {
        anyhow::bail!("config check failed with {errors} error(s)");
    }
    Ok(())
}

// ── Config ──────────────────────────────────────────────────────────────────

fn check_config(path: &Path, result: &validate::ValidationResult) -> Section {
    let mut section = Section::new(format!("Config ({})", path.display()));
    if result.diagnostics.is_empty() {
        section.push(Status::Ok, "No problems found");
        return section;
    }
    for d in &result.diagnostics {
        let message = if d.path.is_empty() {
            format!("{}: {}", d.category, d.message)
        } else {
            format!("{}: {}", d.path, d.message)
        };
        section.push(d.severity.into(), message);
    }
    section
}

// ── Agents ──────────────────────────────────────────────────────────────────

fn check_agents(config: &SwitchboardConfig) -> Section {
    let mut section = Section::new("Agents");
    if config.agents.is_empty() {
        section.push(Status::Info, "No agents configured");
    }
    for (name, agent) in &config.agents {
        if agent.command.trim().is_empty() {
            // already reported by validation
            continue;
        }
        let found = match &agent.working_dir {
            Some(dir) if !Path::new(&agent.command).is_absolute() => {
                which::which_in(&agent.command, std::env::var_os("PATH"), dir).is_ok()
            },
            _ => which::which(&agent.command).is_ok(),
        };
        if found {
            section.push(
                Status::Ok,
                format!("{name}: `{}` (max run time {}s)", agent.command, agent.max_run_time_secs),
            );
        } else {
            section.push(
                Status::Warn,
                format!("{name}: command `{}` not found on PATH", agent.command),
            );
        }
    }
    section
}

// ── Channels ────────────────────────────────────────────────────────────────

fn check_channels(config: &SwitchboardConfig) -> Section {
    let mut section = Section::new("Channels");
    for (name, channel) in &config.channels {
        let chat = channel.chat_id.as_deref().unwrap_or("any chat");
        let access = match channel.policy {
            AccessPolicy::Open => "open to everyone".to_string(),
            AccessPolicy::Allowlist => format!("{} allowlisted", channel.allowlist.len()),
            AccessPolicy::Disabled => "disabled".to_string(),
        };
        section.push(
            Status::Info,
            format!("{name}: {chat} -> {} ({access})", channel.agent),
        );
    }
    if !config.channels.contains_key(SwitchboardConfig::DEFAULT_CHANNEL) {
        section.push(
            Status::Info,
            "No `default` channel: chats without a binding are rejected",
        );
    }
    section
}
