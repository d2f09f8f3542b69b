use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::{MemberPass, WarmupConfig, WarmupReport};
use crate::cache::UnifiedCache;
use crate::database::DurableStore;
use crate::models::{Member, RoleList};
use crate::session::{LiveState, MAX_MEMBERS_PER_PAGE, RemoteSession};

/// Fills the cache and durable member facts from the remote API.
///
/// Every step only adds what is missing, so running it twice, or
/// concurrently for the same group, converges on the same state.
pub struct Backfill {
    remote: Arc<dyn RemoteSession>,
    state: Arc<dyn LiveState>,
    cache: Arc<UnifiedCache>,
    store: Option<Arc<dyn DurableStore>>,
    config: WarmupConfig,
}

impl Backfill {
    pub fn new(
        remote: Arc<dyn RemoteSession>,
        state: Arc<dyn LiveState>,
        cache: Arc<UnifiedCache>,
        config: WarmupConfig,
    ) -> Self {
        Self {
            remote,
            state,
            cache,
            store: None,
            config,
        }
    }

    /// Record member facts in `store` while paging members.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn DurableStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Reload persisted cache state, then backfill every configured group.
    ///
    /// Groups are processed one at a time. A failing step is logged and
    /// counted; it never aborts the run.
    pub async fn run(&self) -> WarmupReport {
        let started = Instant::now();
        let mut report = WarmupReport::default();

        match self.cache.warmup().await {
            Ok(restored) => report.restored = restored,
            Err(e) => {
                warn!("Warmup: reloading persisted cache failed: {}", e);
                report.errors += 1;
            }
        }

        let group_ids = match &self.config.group_ids {
            Some(ids) => ids.clone(),
            None => self.state.group_ids(),
        };
        info!("Warmup: backfilling {} groups", group_ids.len());

        for group_id in &group_ids {
            let errors_before = report.errors;
            self.warm_group(group_id, &mut report).await;
            report.groups_processed += 1;
            if report.errors > errors_before {
                report.groups_failed += 1;
            }
        }

        report.elapsed = started.elapsed();
        info!("Warmup finished: {}", report);
        report
    }

    async fn warm_group(&self, group_id: &str, report: &mut WarmupReport) {
        debug!("Warmup: group {}", group_id);

        if self.config.groups && !self.cache.groups().contains(group_id) {
            match self.remote.fetch_group(group_id).await {
                Ok(group) => {
                    if self.cache.groups().set_if_absent(group_id, group) {
                        report.groups_cached += 1;
                    }
                }
                Err(e) => {
                    warn!("Warmup: fetching group {} failed: {}", group_id, e);
                    report.errors += 1;
                }
            }
        }

        if self.config.roles {
            let cached = self
                .cache
                .roles()
                .peek(group_id)
                .is_some_and(|list| !list.is_empty());
            if !cached {
                match self.remote.fetch_roles(group_id).await {
                    Ok(roles) => {
                        self.cache.set_roles(group_id, RoleList::new(group_id, roles));
                        report.role_lists_cached += 1;
                    }
                    Err(e) => {
                        warn!("Warmup: fetching roles of {} failed: {}", group_id, e);
                        report.errors += 1;
                    }
                }
            }
        }

        if self.config.channels {
            match self.remote.fetch_channels(group_id).await {
                Ok(channels) => {
                    for channel in channels {
                        let id = channel.id.clone();
                        if self.cache.channels().set_if_absent(&id, channel) {
                            report.channels_cached += 1;
                        }
                    }
                }
                Err(e) => {
                    warn!("Warmup: fetching channels of {} failed: {}", group_id, e);
                    report.errors += 1;
                }
            }
        }

        if self.config.members {
            let pass = self.warm_group_members(group_id).await;
            report.absorb(pass);
        }
    }

    /// Page through a group's members, caching the ones not yet cached and
    /// recording or touching their durable facts.
    ///
    /// Stops at the configured cap, on a short or empty page, or on a fetch
    /// error (counted in the result). Safe to run concurrently for one group.
    pub async fn warm_group_members(&self, group_id: &str) -> MemberPass {
        let mut pass = MemberPass::default();
        let cap = match self.config.max_members_per_group {
            0 => usize::MAX,
            n => n,
        };

        let known = self.known_joins(group_id, &mut pass).await;
        let mut after: Option<String> = None;

        while pass.fetched < cap {
            let limit = (cap - pass.fetched).min(MAX_MEMBERS_PER_PAGE);
            let page = match self
                .remote
                .fetch_members(group_id, after.as_deref(), limit)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    warn!(
                        "Warmup: member page of {} after {:?} failed: {}",
                        group_id, after, e
                    );
                    pass.errors += 1;
                    break;
                }
            };
            pass.pages += 1;

            let Some(last) = page.last() else {
                break;
            };
            after = Some(last.user_id.clone());
            let short = page.len() < limit;
            pass.fetched += page.len();

            for member in page {
                self.record_fact(&member, known.as_ref(), &mut pass).await;
                let key = member.key();
                if self.cache.members().set_if_absent(&key, member) {
                    pass.cached += 1;
                }
            }

            if short {
                break;
            }
        }

        debug!(
            "Warmup: {} members of {} in {} pages ({} newly cached)",
            pass.fetched, group_id, pass.pages, pass.cached
        );
        pass
    }

    /// Re-fetch specific members, overwrite their cache entries and refresh
    /// their durable facts. Members that fail to fetch are skipped.
    ///
    /// Returns how many members were refreshed.
    pub async fn refresh_member_data(&self, group_id: &str, member_ids: &[String]) -> usize {
        let mut refreshed = 0;
        let now = Utc::now();

        for member_id in member_ids {
            let member = match self.remote.fetch_member(group_id, member_id).await {
                Ok(member) => member,
                Err(e) => {
                    warn!("Refreshing member {} of {} failed: {}", member_id, group_id, e);
                    continue;
                }
            };

            if let Some(store) = &self.store {
                if let Err(e) = refresh_facts(store.as_ref(), &member, now).await {
                    warn!(
                        "Refreshing facts of {} in {} failed: {}",
                        member_id, group_id, e
                    );
                }
            }

            self.cache.set_member(group_id, member_id, member);
            refreshed += 1;
        }

        debug!(
            "Refreshed {}/{} members of {}",
            refreshed,
            member_ids.len(),
            group_id
        );
        refreshed
    }

    /// Touch the durable facts of members known to still be present, so the
    /// retention cleanup keeps them. Returns how many members were touched.
    pub async fn keep_member_data_fresh(&self, group_id: &str, member_ids: &[String]) -> usize {
        let Some(store) = &self.store else {
            return 0;
        };

        let mut touched = 0;
        for member_id in member_ids {
            let join = store.touch_member_join(group_id, member_id).await;
            let roles = store.touch_member_roles(group_id, member_id).await;
            match join.and(roles) {
                Ok(()) => touched += 1,
                Err(e) => warn!("Touching facts of {} in {} failed: {}", member_id, group_id, e),
            }
        }
        touched
    }

    /// Join times already recorded for a group, fetched once per pass.
    ///
    /// `None` means the join rows are inserted or touched one by one.
    async fn known_joins(
        &self,
        group_id: &str,
        pass: &mut MemberPass,
    ) -> Option<HashMap<String, DateTime<Utc>>> {
        let store = self.store.as_ref()?;
        match store.get_all_member_joins(group_id).await {
            Ok(joins) => Some(joins),
            Err(e) => {
                debug!(
                    "Bulk join lookup for {} failed, falling back to per-member reads: {}",
                    group_id, e
                );
                pass.errors += 1;
                None
            }
        }
    }

    async fn record_fact(
        &self,
        member: &Member,
        known: Option<&HashMap<String, DateTime<Utc>>>,
        pass: &mut MemberPass,
    ) {
        let Some(store) = &self.store else {
            return;
        };
        let join_known = known.map(|joins| joins.contains_key(&member.user_id));

        match record_facts(store.as_ref(), member, join_known, Utc::now()).await {
            Ok(true) => pass.facts_created += 1,
            Ok(false) => pass.facts_touched += 1,
            Err(e) => {
                warn!(
                    "Recording facts of {} in {} failed: {}",
                    member.user_id, member.group_id, e
                );
                pass.errors += 1;
            }
        }
    }
}

/// Create whichever of the two facts is missing and touch the other.
///
/// `join_known` is the bulk-read answer for the join row, if one was taken;
/// a join row is only ever inserted, never overwritten, so concurrent passes
/// keep the first recorded time. Returns `true` if any row was created.
async fn record_facts(
    store: &dyn DurableStore,
    member: &Member,
    join_known: Option<bool>,
    now: DateTime<Utc>,
) -> crate::error::Result<bool> {
    let (group_id, member_id) = (member.group_id.as_str(), member.user_id.as_str());

    let join_created = match join_known {
        Some(true) => {
            store.touch_member_join(group_id, member_id).await?;
            false
        }
        _ => {
            let joined_at = member.joined_at.unwrap_or(now);
            store.insert_member_join(group_id, member_id, joined_at).await?
        }
    };

    let roles_created = if member.role_ids.is_empty()
        || !store.get_member_roles(group_id, member_id).await?.is_empty()
    {
        store.touch_member_roles(group_id, member_id).await?;
        false
    } else {
        store
            .upsert_member_roles(group_id, member_id, &member.role_ids, now)
            .await?;
        true
    };

    Ok(join_created || roles_created)
}

/// Overwrite facts with freshly fetched data. A recorded join time is kept
/// when the platform does not report one.
async fn refresh_facts(
    store: &dyn DurableStore,
    member: &Member,
    now: DateTime<Utc>,
) -> crate::error::Result<()> {
    let (group_id, member_id) = (member.group_id.as_str(), member.user_id.as_str());

    match member.joined_at {
        Some(joined_at) => store.upsert_member_join(group_id, member_id, joined_at).await?,
        None => {
            store.insert_member_join(group_id, member_id, now).await?;
        }
    }

    store
        .upsert_member_roles(group_id, member_id, &member.role_ids, now)
        .await
}

impl std::fmt::Debug for Backfill {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backfill")
            .field("config", &self.config)
            .field("store", &self.store.is_some())
            .finish()
    }
}
