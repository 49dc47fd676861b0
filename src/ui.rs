use colored::{ColoredString, Colorize};
use reconcile::{ConfirmCallback, LifecycleStatus};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Lifecycle status, colored by how settled it is
pub fn status(status: LifecycleStatus) -> ColoredString {
    let label = status.as_str();
    match status {
        LifecycleStatus::Up => label.green(),
        LifecycleStatus::Missing | LifecycleStatus::Stopped => label.dimmed(),
        LifecycleStatus::Starting | LifecycleStatus::Stopping => label.yellow(),
        LifecycleStatus::Unknown | LifecycleStatus::Unreachable | LifecycleStatus::Rescue => {
            label.red()
        }
    }
}

/// Pad `text` to `width` columns, truncating with an ellipsis
pub fn cell(text: &str, width: usize) -> String {
    let len = text.chars().count();
    if len <= width {
        format!("{text:<width$}")
    } else if width <= 1 {
        "…".to_string()
    } else {
        let kept: String = text.chars().take(width - 1).collect();
        format!("{kept}…")
    }
}

/// Interactive confirmation on the terminal
///
/// With `assume_yes` every prompt is accepted without asking.
pub struct TerminalConfirm {
    assume_yes: bool,
}

impl TerminalConfirm {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

impl ConfirmCallback for TerminalConfirm {
    fn confirm(&mut self, prompt: &str) -> reconcile::Result<bool> {
        if self.assume_yes {
            log::debug!("Auto-confirmed: {prompt}");
            return Ok(true);
        }

        dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .map_err(|e| reconcile::Error::Prompt(e.to_string()))
    }
}
