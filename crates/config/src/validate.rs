//! Configuration validation.
//!
//! Checks cross-references between channels and agents and flags settings
//! that would make the service misbehave at runtime.

use std::path::Path;

use switchboard_channels::gating::AccessPolicy;

use crate::schema::SwitchboardConfig;

/// Platform hard limit on message length.
const PLATFORM_MAX_MESSAGE_LEN: usize = 4096;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "reference", "limits", "access", "telegram"
    pub category: &'static str,
    /// Dotted path, e.g. "channels.ops.agent"
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn new(
        severity: Severity,
        category: &'static str,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<std::path::PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

/// Load and validate the config file at `path`.
pub fn validate_file(path: &Path) -> ValidationResult {
    match crate::loader::load_config(path) {
        Ok(config) => ValidationResult {
            config_path: Some(path.to_path_buf()),
            ..validate(&config)
        },
        Err(e) => ValidationResult {
            diagnostics: vec![Diagnostic::new(
                Severity::Error,
                "syntax",
                "",
                format!("failed to load config: {e}"),
            )],
            config_path: Some(path.to_path_buf()),
        },
    }
}

/// Validate a parsed configuration.
pub fn validate(config: &SwitchboardConfig) -> ValidationResult {
    let mut diagnostics = Vec::new();
    check_telegram(config, &mut diagnostics);
    check_output(config, &mut diagnostics);
    check_channels(config, &mut diagnostics);
    check_agents(config, &mut diagnostics);
    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

fn check_telegram(config: &SwitchboardConfig, diagnostics: &mut Vec<Diagnostic>) {
    let token = config
        .telegram
        .get("token")
        .and_then(|t| t.as_str())
        .unwrap_or_default();
    if token.trim().is_empty() {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "telegram",
            "telegram.token",
            "a bot token is required",
        ));
    } else if token.starts_with("${") {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "telegram",
            "telegram.token",
            format!("environment placeholder {token} is not set"),
        ));
    }
}

fn check_output(config: &SwitchboardConfig, diagnostics: &mut Vec<Diagnostic>) {
    let len = config.output.max_message_len;
    if len == 0 || len > PLATFORM_MAX_MESSAGE_LEN {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "limits",
            "output.max_message_len",
            format!("must be between 1 and {PLATFORM_MAX_MESSAGE_LEN}, got {len}"),
        ));
    }
    if config.output.min_flush_interval_ms == 0 {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "limits",
            "output.min_flush_interval_ms",
            "no spacing between flushes; the platform may rate limit the bot",
        ));
    }
}

fn check_channels(config: &SwitchboardConfig, diagnostics: &mut Vec<Diagnostic>) {
    if config.channels.is_empty() {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "reference",
            "channels",
            "no channels configured; every inbound message will be rejected",
        ));
    }

    for (name, channel) in &config.channels {
        if !config.agents.contains_key(&channel.agent) {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "reference",
                format!("channels.{name}.agent"),
                format!("unknown agent \"{}\"", channel.agent),
            ));
        }
        if channel.policy == AccessPolicy::Allowlist && channel.allowlist.is_empty() {
            diagnostics.push(Diagnostic::new(
                Severity::Warning,
                "access",
                format!("channels.{name}.allowlist"),
                "allowlist policy with an empty list denies everyone",
            ));
        }
        if let Some(chat_id) = &channel.chat_id
            && chat_id.trim().parse::<i64>().is_err()
        {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "reference",
                format!("channels.{name}.chat_id"),
                format!("chat id \"{chat_id}\" is not numeric"),
            ));
        }
    }

    let mut seen = std::collections::HashMap::new();
    for (name, channel) in &config.channels {
        if let Some(chat_id) = &channel.chat_id
            && let Some(previous) = seen.insert(chat_id.trim(), name)
        {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "reference",
                format!("channels.{name}.chat_id"),
                format!("chat id {chat_id} is already bound to channel \"{previous}\""),
            ));
        }
    }
}

fn check_agents(config: &SwitchboardConfig, diagnostics: &mut Vec<Diagnostic>) {
    for (name, agent) in &config.agents {
        if agent.command.trim().is_empty() {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "reference",
                format!("agents.{name}.command"),
                "a command is required",
            ));
        }
        if agent.max_run_time_secs == 0 {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "limits",
                format!("agents.{name}.max_run_time_secs"),
                "must be greater than zero",
            ));
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> SwitchboardConfig {
        toml::from_str(raw).unwrap()
    }

    const VALID: &str = r#"
        [telegram]
        token = "123:ABC"

        [channels.default]
        agent = "echo"

        [channels.ops]
        chat_id = "-1001234"
        policy = "allowlist"
        allowlist = ["alice"]
        agent = "echo"

        [agents.echo]
        command = "cat"
    "#;

    #[test]
    fn valid_config_has_no_diagnostics() {
        let result = validate(&parse(VALID));
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn unknown_agent_reference_is_error() {
        let mut cfg = parse(VALID);
        cfg.channels.get_mut("ops").unwrap().agent = "missing".into();
        let result = validate(&cfg);
        assert!(result.has_errors());
        let diag = &result.diagnostics[0];
        assert_eq!(diag.path, "channels.ops.agent");
        assert_eq!(diag.category, "reference");
    }

    #[test]
    fn missing_token_is_error() {
        let mut cfg = parse(VALID);
        cfg.telegram = serde_json::json!({});
        assert!(validate(&cfg).has_errors());
    }

    #[test]
    fn unresolved_token_placeholder_is_error() {
        let mut cfg = parse(VALID);
        cfg.telegram = serde_json::json!({ "token": "${TELEGRAM_BOT_TOKEN}" });
        let result = validate(&cfg);
        assert!(result.diagnostics[0].message.contains("TELEGRAM_BOT_TOKEN"));
    }

    #[test]
    fn oversized_message_len_is_error() {
        let mut cfg = parse(VALID);
        cfg.output.max_message_len = 5000;
        assert_eq!(validate(&cfg).count(Severity::Error), 1);
    }

    #[test]
    fn empty_allowlist_is_warning() {
        let mut cfg = parse(VALID);
        cfg.channels.get_mut("ops").unwrap().allowlist.clear();
        let result = validate(&cfg);
        assert!(!result.has_errors());
        assert_eq!(result.count(Severity::Warning), 1);
    }

    #[test]
    fn duplicate_chat_id_is_error() {
        let mut cfg = parse(VALID);
        cfg.channels.get_mut("default").unwrap().chat_id = Some("-1001234".into());
        let result = validate(&cfg);
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.message.contains("already bound"))
        );
    }

    #[test]
    fn non_numeric_chat_id_is_error() {
        let mut cfg = parse(VALID);
        cfg.channels.get_mut("ops").unwrap().chat_id = Some("ops-room".into());
        assert!(validate(&cfg).has_errors());
    }

    #[test]
    fn validate_file_reports_load_errors() {
        let result = validate_file(Path::new("/nonexistent/switchboard.toml"));
        assert!(result.has_errors());
        assert_eq!(result.diagnostics[0].category, "syntax");
    }
}
