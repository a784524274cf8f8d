use crate::domain::models::{MessageSeverity, OperationStatus, Theme};

const RESET: &str = "\x1b[0m";

/// ANSI colours for the console, per theme.
pub struct ConsolePalette {
    pub heading: &'static str,
    pub muted: &'static str,
    pub accent_blue: &'static str,
    pub accent_green: &'static str,
    pub accent_yellow: &'static str,
    pub accent_red: &'static str,
}

impl ConsolePalette {
    pub fn new(theme: Theme) -> Self {
        match theme {
            Theme::Dark => Self {
                heading: "\x1b[1;97m",
                muted: "\x1b[37m",
                accent_blue: "\x1b[94m",
                accent_green: "\x1b[92m",
                accent_yellow: "\x1b[93m",
                accent_red: "\x1b[91m",
            },
            Theme::Light => Self {
                heading: "\x1b[1;30m",
                muted: "\x1b[90m",
                accent_blue: "\x1b[34m",
                accent_green: "\x1b[32m",
                accent_yellow: "\x1b[33m",
                accent_red: "\x1b[31m",
            },
        }
    }

    /// grey when idle, blue while scanning, green while advertising
    pub fn status(&self, status: OperationStatus) -> &'static str {
        match status {
            OperationStatus::Idle => self.muted,
            OperationStatus::Scanning => self.accent_blue,
            OperationStatus::Advertising => self.accent_green,
        }
    }

    pub fn severity(&self, severity: MessageSeverity) -> &'static str {
        match severity {
            MessageSeverity::Info => self.muted,
            MessageSeverity::Warning => self.accent_yellow,
            MessageSeverity::Error => self.accent_red,
        }
    }

    pub fn paint(&self, color: &str, text: &str) -> String {
        format!("{}{}{}", color, text, RESET)
    }
}
