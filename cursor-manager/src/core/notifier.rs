/*!
Notification outputs for completed gate transitions
*/

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{error, info};

use crate::core::config::{NotificationConfig, NotificationPlugin, TerminalFormat};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
}

/// Delivery port for user-facing notifications
pub trait Notifier: Send {
    /// Name of the notifier
    fn name(&self) -> &'static str;

    /// Deliver one notification
    fn notify(&self, notification: &Notification) -> Result<(), Box<dyn std::error::Error>>;
}

/// Fans a notification out to every enabled output
pub struct NotificationManager {
    handlers: Vec<Box<dyn Notifier>>,
}

impl NotificationManager {
    pub fn new(configs: &[NotificationConfig]) -> Self {
        let mut handlers: Vec<Box<dyn Notifier>> = Vec::new();

        for config in configs {
            if !config.enabled {
                continue;
            }

            let handler: Box<dyn Notifier> = match &config.plugin {
                NotificationPlugin::Terminal { format } => Box::new(TerminalNotifier::new(*format)),
                NotificationPlugin::JsonLines { path } => Box::new(JsonLinesNotifier::new(path.clone())),
            };

            handlers.push(handler);
        }

        info!("Initialized notification manager with {} handlers", handlers.len());
        Self { handlers }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.handlers.len()
    }
}

impl Notifier for NotificationManager {
    fn name(&self) -> &'static str {
        "Manager"
    }

    /// Every handler is tried; the first failure is returned afterwards
    fn notify(&self, notification: &Notification) -> Result<(), Box<dyn std::error::Error>> {
        let mut first_error = None;
        for handler in &self.handlers {
            if let Err(e) = handler.notify(notification) {
                error!("Notifier {} failed: {}", handler.name(), e);
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Appends one JSON object per notification
pub struct JsonLinesNotifier {
    file_path: PathBuf,
}

impl JsonLinesNotifier {
    pub fn new(file_path: PathBuf) -> Self {
        Self { file_path }
    }
}

impl Notifier for JsonLinesNotifier {
    fn name(&self) -> &'static str {
        "JSON"
    }

    fn notify(&self, notification: &Notification) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = self.file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;

        let line = serde_json::json!({
            "title": notification.title,
            "message": notification.message,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        writeln!(file, "{}", line)?;
        file.flush()?;
        Ok(())
    }
}

pub struct TerminalNotifier {
    format: TerminalFormat,
}

impl TerminalNotifier {
    pub fn new(format: TerminalFormat) -> Self {
        Self { format }
    }

    fn format_notification(&self, notification: &Notification) -> String {
        match self.format {
            TerminalFormat::Plain => format!("{}: {}", notification.title, notification.message),
            TerminalFormat::Colored => format!(
                "\x1b[36m🔔 {}\x1b[0m\n   {}",
                notification.title, notification.message
            ),
        }
    }
}

impl Notifier for TerminalNotifier {
    fn name(&self) -> &'static str {
        "Terminal"
    }

    fn notify(&self, notification: &Notification) -> Result<(), Box<dyn std::error::Error>> {
        println!("{}", self.format_notification(notification));
        Ok(())
    }
}
