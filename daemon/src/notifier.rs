//! System notification sender

use crate::terminator::KillOutcome;
use notify_rust::Notification;
use tracing::warn;

pub fn send_notification(summary: &str, body: &str) -> Result<(), notify_rust::error::Error> {
    Notification::new()
        .summary(summary)
        .body(body)
        .appname("FleetGuard")
        .show()?;
    Ok(())
}

/// Title and body for an enforcement outcome, or `None` when there is
/// nothing to say. Verbose mode always reports; quiet mode only reports kills.
pub fn outcome_message(outcome: &KillOutcome, verbose: bool) -> Option<(String, String)> {
    if verbose {
        let mut body = outcome.messages.join("\n");
        body.push_str(&format!(
            "\n\nKilled by age: {}\nKilled by memory: {}\nKilled main: {}",
            outcome.killed_by_age, outcome.killed_by_memory, outcome.killed_main
        ));
        return Some(("Check & Kill result".to_string(), body));
    }
    let total = outcome.total();
    (total > 0).then(|| {
        (
            "Processes terminated".to_string(),
            format!("Processes killed: {total}"),
        )
    })
}

pub struct Notifier {
    enabled: bool,
}

impl Notifier {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn send(&self, title: &str, body: &str) {
        if !self.enabled {
            return;
        }
        if let Err(e) = send_notification(title, body) {
            warn!("Failed to send notification: {}", e);
        }
    }

    pub fn notify_outcome(&self, outcome: &KillOutcome, verbose: bool) {
        if let Some((title, body)) = outcome_message(outcome, verbose) {
            self.send(&title, &body);
        }
    }
}
