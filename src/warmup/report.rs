//! Warmup results.

use std::fmt;
use std::time::Duration;

/// Outcome of paging one group's members.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemberPass {
    pub pages: usize,
    pub fetched: usize,
    /// Members newly inserted into the cache.
    pub cached: usize,
    pub facts_created: usize,
    pub facts_touched: usize,
    pub errors: usize,
}

/// Summary of a full warmup run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarmupReport {
    /// Entries reloaded from the durable store.
    pub restored: usize,
    pub groups_processed: usize,
    /// Groups where at least one step failed.
    pub groups_failed: usize,
    pub groups_cached: usize,
    pub role_lists_cached: usize,
    pub channels_cached: usize,
    pub members_cached: usize,
    pub facts_created: usize,
    pub facts_touched: usize,
    pub errors: usize,
    pub elapsed: Duration,
}

impl WarmupReport {
    /// No step failed.
    pub fn is_clean(&self) -> bool {
        self.errors == 0
    }

    pub(crate) fn absorb(&mut self, pass: MemberPass) {
        self.members_cached += pass.cached;
        self.facts_created += pass.facts_created;
        self.facts_touched += pass.facts_touched;
        self.errors += pass.errors;
    }
}

impl fmt::Display for WarmupReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} groups ({} failed) in {:?}: restored {}, cached {} groups / {} role lists / {} channels / {} members, facts {} new / {} touched, {} errors",
            self.groups_processed,
            self.groups_failed,
            self.elapsed,
            self.restored,
            self.groups_cached,
            self.role_lists_cached,
            self.channels_cached,
            self.members_cached,
            self.facts_created,
            self.facts_touched,
            self.errors,
        )
    }
}
