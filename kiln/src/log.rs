//! The build error log.
//!
//! The scheduler never formats build output itself. Anything worth showing
//! to the person running the build goes through an [`ErrorLog`]: process
//! stderr that should stay visible, and failures that abort the run.

use std::cell::{Cell, RefCell};

/// Collaborator receiving visible build-log entries.
pub trait ErrorLog {
    /// Records a non-fatal entry, such as warnings printed by a compiler
    /// that still exited successfully.
    fn show(&self, title: &str, message: &str);

    /// Records a failure and marks the whole run as aborting.
    fn report_failure(&self, title: &str, message: &str);

    /// Returns `true` once any failure has been reported.
    fn is_aborting(&self) -> bool;
}

/// One entry of the build log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    pub title: String,
    pub message: String,
    pub fatal: bool,
}

/// The default [`ErrorLog`]: keeps every entry and forwards it to `tracing`.
#[derive(Debug, Default)]
pub struct BuildLog {
    entries: RefCell<Vec<LogEntry>>,
    aborting: Cell<bool>,
}

impl BuildLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// All entries recorded so far, in order.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.borrow().clone()
    }

    /// Renders the log the way it is shown when a run aborts: each entry
    /// under a separator line, failures first flagged as such.
    pub fn summary(&self) -> String {
        let bar = "~".repeat(50);
        let mut text = String::new();

        for entry in self.entries.borrow().iter() {
            text.push_str(&bar);
            text.push('\n');
            if entry.fatal {
                text.push_str("FAILED: ");
            }
            text.push_str(&entry.title);
            text.push_str("\n\n");
            text.push_str(&entry.message);
            if !entry.message.ends_with('\n') {
                text.push('\n');
            }
        }

        text
    }

    fn record(&self, title: &str, message: &str, fatal: bool) {
        self.entries.borrow_mut().push(LogEntry {
            title: title.to_owned(),
            message: message.to_owned(),
            fatal,
        });
    }
}

impl ErrorLog for BuildLog {
    fn show(&self, title: &str, message: &str) {
        tracing::warn!(title, "{}", message.trim_end());
        self.record(title, message, false);
    }

    fn report_failure(&self, title: &str, message: &str) {
        if !self.aborting.replace(true) {
            tracing::error!("*** Something FAILED! ***");
        }

        tracing::error!(title, "{}", message.trim_end());
        self.record(title, message, true);
    }

    fn is_aborting(&self) -> bool {
        self.aborting.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_failure_marks_the_run_aborting() {
        let log = BuildLog::new();

        log.show("cc -c a.c", "warning: unused variable");
        assert!(!log.is_aborting());

        log.report_failure("cc -c b.c", "error: expected ';'");
        log.report_failure("cc -c c.c", "error: undeclared");
        assert!(log.is_aborting());

        let fatal: Vec<_> = log
            .entries()
            .into_iter()
            .filter(|e| e.fatal)
            .map(|e| e.title)
            .collect();
        assert_eq!(fatal, vec!["cc -c b.c", "cc -c c.c"]);
    }

    #[test]
    fn summary_lists_every_entry() {
        let log = BuildLog::new();
        log.show("ld", "note\n");
        log.report_failure("cc", "boom");

        let summary = log.summary();
        assert!(summary.contains("ld\n\nnote\n"));
        assert!(summary.contains("FAILED: cc\n\nboom\n"));
    }
}
