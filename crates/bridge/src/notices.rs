//! Fixed texts the engine sends on its own behalf.

use std::time::Duration;

use {switchboard_agents::SystemLevel, switchboard_config::NoticesConfig};

#[derive(Debug, Clone, Default)]
pub struct Notices {
    config: NoticesConfig,
}

impl Notices {
    pub fn new(config: NoticesConfig) -> Self {
        Self { config }
    }

    pub fn announcement(&self) -> Option<&str> {
        self.config
            .announcement
            .as_deref()
            .filter(|text| !text.trim().is_empty())
    }

    pub fn rejection(&self) -> &str {
        &self.config.rejection
    }

    pub fn no_response(&self) -> &str {
        &self.config.no_response
    }

    pub fn timeout(&self, max_run_time: Duration) -> String {
        self.config
            .timeout
            .replace("{duration}", &format_duration(max_run_time))
    }

    /// System message with its bracketed level tag, e.g. `[WARNING] disk full`.
    pub fn system(&self, level: SystemLevel, text: &str) -> String {
        format!("[{}] {text}", level.tag())
    }
}

/// Render a duration as `1h 2m 3s`, dropping zero components.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    if total == 0 {
        return format!("{}ms", duration.as_millis());
    }
    let (hours, minutes, seconds) = (total / 3600, total % 3600 / 60, total % 60);
    let mut parts = Vec::with_capacity(3);
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if seconds > 0 {
        parts.push(format!("{seconds}s"));
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case(Duration::from_secs(300), "5m")]
    #[case(Duration::from_secs(30), "30s")]
    #[case(Duration::from_secs(3723), "1h 2m 3s")]
    #[case(Duration::from_secs(7200), "2h")]
    #[case(Duration::from_millis(250), "250ms")]
    fn durations(#[case] duration: Duration, #[case] expected: &str) {
        assert_eq!(format_duration(duration), expected);
    }

    #[test]
    fn timeout_notice_names_duration() {
        let notices = Notices::default();
        assert_eq!(
            notices.timeout(Duration::from_secs(300)),
            "The agent did not finish within 5m."
        );
    }

    #[rstest]
    #[case(SystemLevel::Info, "[INFO] starting")]
    #[case(SystemLevel::Warning, "[WARNING] starting")]
    #[case(SystemLevel::Error, "[ERROR] starting")]
    fn system_messages_carry_level_tag(#[case] level: SystemLevel, #[case] expected: &str) {
        assert_eq!(Notices::default().system(level, "starting"), expected);
    }

    #[test]
    fn blank_announcement_is_ignored() {
        let notices = Notices::new(NoticesConfig {
            announcement: Some("  ".into()),
            ..Default::default()
        });
        assert_eq!(notices.announcement(), None);
    }
}
