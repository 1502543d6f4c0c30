// User-visible notices — retry warnings, terminal outcomes, series
// progress. One switch suppresses everything; non-failure notices are
// additionally rate-limited so a burst of candidates doesn't spam.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use colored::Colorize;

/// Minimum spacing between non-failure notices.
const MIN_NOTICE_INTERVAL: Duration = Duration::from_secs(2);

pub trait Notifier: Send + Sync {
    fn success(&self, title: &str, message: &str);
    fn error(&self, title: &str, message: &str);
    fn warning(&self, title: &str, message: &str);
    fn progress(&self, current: usize, total: usize);

    /// Flip the single suppression switch.
    fn set_enabled(&self, enabled: bool);
}

/// Colored terminal notifier.
pub struct TerminalNotifier {
    enabled: AtomicBool,
    last_notice: Mutex<Option<Instant>>,
}

impl TerminalNotifier {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            last_notice: Mutex::new(None),
        }
    }

    /// Rate gate for the noisy notice kinds. Failures bypass this.
    fn pass_rate_gate(&self) -> bool {
        let mut last = self.last_notice.lock().unwrap();
        let now = Instant::now();
        if let Some(previous) = *last {
            if now.duration_since(previous) < MIN_NOTICE_INTERVAL {
                return false;
            }
        }
        *last = Some(now);
        true
    }
}

impl Notifier for TerminalNotifier {
    fn success(&self, title: &str, message: &str) {
        if !self.enabled.load(Ordering::Relaxed) || !self.pass_rate_gate() {
            return;
        }
        println!("{} {}: {}", "ok".green().bold(), title, message);
    }

    fn error(&self, title: &str, message: &str) {
        if !self.enabled.load(Ordering::Relaxed) {
            return;
        }
        eprintln!("{} {}: {}", "!!".red().bold(), title, message);
    }

    fn warning(&self, title: &str, message: &str) {
        if !self.enabled.load(Ordering::Relaxed) || !self.pass_rate_gate() {
            return;
        }
        println!("{} {}: {}", "~".yellow(), title, message);
    }

    fn progress(&self, current: usize, total: usize) {
        if !self.enabled.load(Ordering::Relaxed) {
            return;
        }
        println!("{} {}/{}", "downloading".dimmed(), current, total);
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }
}

/// Notifier that says nothing. Useful when only the error log matters.
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn success(&self, _title: &str, _message: &str) {}
    fn error(&self, _title: &str, _message: &str) {}
    fn warning(&self, _title: &str, _message: &str) {}
    fn progress(&self, _current: usize, _total: usize) {}
    fn set_enabled(&self, _enabled: bool) {}
}
