//! Warmup configuration.

/// What a warmup pass backfills.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarmupConfig {
    pub groups: bool,
    pub roles: bool,
    pub channels: bool,
    pub members: bool,

    /// Stop paging a group's members after this many. `0` means no cap.
    pub max_members_per_group: usize,

    /// Groups to walk. `None` walks every group known to the live state.
    pub group_ids: Option<Vec<String>>,
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self {
            groups: true,
            roles: true,
            channels: true,
            members: true,
            max_members_per_group: 10_000,
            group_ids: None,
        }
    }
}

impl WarmupConfig {
    /// Restrict the pass to specific groups.
    #[must_use]
    pub fn only_groups<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    /// Set the per-group member cap.
    #[must_use]
    pub fn max_members(mut self, max: usize) -> Self {
        self.max_members_per_group = max;
        self
    }

    /// Skip member paging entirely.
    #[must_use]
    pub fn without_members(mut self) -> Self {
        self.members = false;
        self
    }
}
