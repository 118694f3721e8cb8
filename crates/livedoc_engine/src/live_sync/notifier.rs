use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::config::ProjectId;

/* 📖 # Why deadlines instead of timer threads?

Each project has at most one pending reload, stored as the instant it becomes
due. A new change for the same project overwrites that instant, which is the
whole debounce: there is no old timer to cancel, so there is nothing that can
fire twice. The hub sleeps until the earliest deadline and asks for everything
that is due; due entries are removed before they are returned, so a reload
that causes another change schedules a fresh deadline instead of being lost.
*/

/// Per-project debounce of change notifications.
#[derive(Debug)]
pub struct DebouncedNotifier {
    window: Duration,
    pending: HashMap<ProjectId, Instant>,
}

impl DebouncedNotifier {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
        }
    }

    /// Record a qualifying change at `now`, replacing any pending deadline for the project.
    pub fn notify(&mut self, project: &ProjectId, now: Instant) {
        self.pending.insert(project.clone(), now + self.window);
    }

    /// Drop a pending reload, e.g. because the last subscriber left.
    pub fn cancel(&mut self, project: &ProjectId) -> bool {
        self.pending.remove(project).is_some()
    }

    pub fn is_pending(&self, project: &ProjectId) -> bool {
        self.pending.contains_key(project)
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().min().copied()
    }

    /// Remove and return every project whose deadline has passed, earliest first.
    pub fn take_due(&mut self, now: Instant) -> Vec<ProjectId> {
        let mut due: Vec<(Instant, ProjectId)> = self
            .pending
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(project, deadline)| (*deadline, project.clone()))
            .collect();
        due.sort();
        for (_, project) in &due {
            self.pending.remove(project);
        }
        due.into_iter().map(|(_, project)| project).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(100);

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn test_burst_collapses_into_one() {
        let mut notifier = DebouncedNotifier::new(WINDOW);
        let start = Instant::now();
        let docs = ProjectId::from("docs");

        for offset in [0, 30, 60, 90] {
            notifier.notify(&docs, start + ms(offset));
        }

        assert!(notifier.take_due(start + ms(150)).is_empty());
        assert_eq!(notifier.next_deadline(), Some(start + ms(190)));
        assert_eq!(notifier.take_due(start + ms(190)), vec![docs.clone()]);
        assert!(notifier.take_due(start + ms(500)).is_empty());
        assert!(!notifier.is_pending(&docs));
    }

    #[test]
    fn test_projects_are_independent() {
        let mut notifier = DebouncedNotifier::new(WINDOW);
        let start = Instant::now();
        let a = ProjectId::from("a");
        let b = ProjectId::from("b");

        notifier.notify(&b, start);
        notifier.notify(&a, start + ms(50));

        assert_eq!(notifier.take_due(start + ms(100)), vec![b.clone()]);
        assert!(notifier.is_pending(&a));
        assert_eq!(notifier.take_due(start + ms(200)), vec![a]);
    }

    #[test]
    fn test_due_entries_are_ordered_by_deadline() {
        let mut notifier = DebouncedNotifier::new(WINDOW);
        let start = Instant::now();
        notifier.notify(&ProjectId::from("z"), start);
        notifier.notify(&ProjectId::from("a"), start + ms(10));
        let due = notifier.take_due(start + ms(1000));
        assert_eq!(due, vec![ProjectId::from("z"), ProjectId::from("a")]);
    }

    #[test]
    fn test_notify_after_take_schedules_again() {
        let mut notifier = DebouncedNotifier::new(WINDOW);
        let start = Instant::now();
        let docs = ProjectId::from("docs");

        notifier.notify(&docs, start);
        assert_eq!(notifier.take_due(start + ms(100)).len(), 1);
        notifier.notify(&docs, start + ms(100));
        assert_eq!(notifier.next_deadline(), Some(start + ms(200)));
    }

    #[test]
    fn test_cancel() {
        let mut notifier = DebouncedNotifier::new(WINDOW);
        let docs = ProjectId::from("docs");
        notifier.notify(&docs, Instant::now());
        assert!(notifier.cancel(&docs));
        assert!(!notifier.cancel(&docs));
        assert_eq!(notifier.next_deadline(), None);
    }
}
