//! Transient user-facing notices ("Now playing: …", "Song paused", errors).

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    pub fn lifetime(self) -> Duration {
        match self {
            Severity::Info | Severity::Success => Duration::from_secs(2),
            Severity::Warning => Duration::from_secs(4),
            Severity::Error => Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub severity: Severity,
    pub message: String,
    pub at: DateTime<Local>,
}

impl Notice {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            at: Local::now(),
        }
    }
}

struct Entry {
    notice: Notice,
    expires: Instant,
}

/// Recent notices with expiry.  A repeated message replaces the older copy.
pub struct NoticeLog {
    entries: VecDeque<Entry>,
    max_visible: usize,
}

impl NoticeLog {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            max_visible: 4,
        }
    }

    pub fn push(&mut self, notice: Notice) {
        self.entries.retain(|e| e.notice.message != notice.message);
        let expires = Instant::now() + notice.severity.lifetime();
        self.entries.push_back(Entry { notice, expires });
        while self.entries.len() > self.max_visible * 2 {
            self.entries.pop_front();
        }
    }

    /// Drop expired notices.
    pub fn tick(&mut self) {
        let now = Instant::now();
        self.entries.retain(|e| e.expires > now);
    }

    /// Live notices, newest first, capped at the visible count.
    pub fn visible(&self) -> Vec<Notice> {
        let now = Instant::now();
        self.entries
            .iter()
            .rev()
            .filter(|e| e.expires > now)
            .take(self.max_visible)
            .map(|e| e.notice.clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for NoticeLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_newest_first_and_dedup() {
        let mut log = NoticeLog::new();
        log.push(Notice::new(Severity::Info, "Song paused"));
        log.push(Notice::new(Severity::Success, "Song resumed"));
        log.push(Notice::new(Severity::Info, "Song paused"));

        let messages: Vec<String> = log.visible().into_iter().map(|n| n.message).collect();
        assert_eq!(messages, ["Song paused", "Song resumed"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_by_severity() {
        let mut log = NoticeLog::new();
        log.push(Notice::new(Severity::Info, "Song paused"));
        log.push(Notice::new(Severity::Error, "Error loading songs"));

        tokio::time::advance(Duration::from_secs(3)).await;
        log.tick();
        let visible = log.visible();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].severity, Severity::Error);

        tokio::time::advance(Duration::from_secs(3)).await;
        log.tick();
        assert!(log.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_is_capped() {
        let mut log = NoticeLog::new();
        for i in 0..20 {
            log.push(Notice::new(Severity::Info, format!("notice {i}")));
        }
        assert_eq!(log.visible().len(), 4);
        assert_eq!(log.visible()[0].message, "notice 19");
        assert_eq!(log.entries.len(), 8);
    }
}
