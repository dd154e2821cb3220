use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use shared::{
    domain::{Group, GroupId, GroupWithSites, Site, SiteId},
    protocol::{
        ExportPayload, GroupImportStats, ImportOutcome, ImportStats, LoginRequest, LoginResponse,
        NewGroup, NewSite, OrderUpdate, SiteImportStats,
    },
};
use tokio::sync::Mutex;

use crate::NavStore;

/// In-memory store with the same observable behavior as the real backend:
/// capability-filtered reads, batch reorders, and name-keyed import merging.
/// Backs the demo binary and most tests.
pub struct MemoryNavStore {
    inner: Mutex<MemoryState>,
}

struct MemoryState {
    groups: Vec<Group>,
    sites: Vec<Site>,
    configs: HashMap<String, String>,
    credentials: Option<(String, String)>,
    authenticated: bool,
    next_group_id: i64,
    next_site_id: i64,
}

impl Default for MemoryNavStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryNavStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryState {
                groups: Vec::new(),
                sites: Vec::new(),
                configs: HashMap::new(),
                credentials: None,
                authenticated: false,
                next_group_id: 1,
                next_site_id: 1,
            }),
        }
    }

    pub fn with_credentials(username: impl Into<String>, password: impl Into<String>) -> Self {
        let store = Self::new();
        store.inner.try_lock().expect("fresh store").credentials =
            Some((username.into(), password.into()));
        store
    }

    /// Seed a group directly, bypassing the capability check. Test/demo only
    /// in spirit, but harmless to expose.
    pub async fn seed_group(&self, name: &str, is_public: bool) -> GroupId {
        let mut state = self.inner.lock().await;
        let order_num = state.groups.len() as i64;
        let id = GroupId(state.next_group_id);
        state.next_group_id += 1;
        let now = Utc::now();
        state.groups.push(Group {
            id,
            name: name.to_string(),
            order_num,
            is_public,
            created_at: now,
            updated_at: now,
        });
        id
    }

    pub async fn seed_site(&self, group_id: GroupId, name: &str, url: &str, is_public: bool) -> SiteId {
        let mut state = self.inner.lock().await;
        let order_num = state
            .sites
            .iter()
            .filter(|site| site.group_id == group_id)
            .map(|site| site.order_num)
            .max()
            .map_or(0, |max| max + 1);
        let id = SiteId(state.next_site_id);
        state.next_site_id += 1;
        let now = Utc::now();
        state.sites.push(Site {
            id,
            group_id,
            name: name.to_string(),
            url: url.to_string(),
            icon: String::new(),
            description: String::new(),
            notes: String::new(),
            order_num,
            is_public,
            created_at: now,
            updated_at: now,
        });
        id
    }

    pub async fn force_authenticated(&self, value: bool) {
        self.inner.lock().await.authenticated = value;
    }
}

impl MemoryState {
    fn visible_tree(&self) -> Vec<GroupWithSites> {
        let mut groups: Vec<&Group> = self
            .groups
            .iter()
            .filter(|group| self.authenticated || group.is_public)
            .collect();
        groups.sort_by_key(|group| (group.order_num, group.id.0));
        groups
            .into_iter()
            .map(|group| {
                let mut sites: Vec<Site> = self
                    .sites
                    .iter()
                    .filter(|site| site.group_id == group.id)
                    .filter(|site| self.authenticated || site.is_public)
                    .cloned()
                    .collect();
                sites.sort_by_key(|site| (site.order_num, site.id.0));
                GroupWithSites {
                    group: group.clone(),
                    sites,
                }
            })
            .collect()
    }
}

#[async_trait]
impl NavStore for MemoryNavStore {
    async fn check_auth(&self) -> Result<bool> {
        Ok(self.inner.lock().await.authenticated)
    }

    async fn login(&self, request: LoginRequest) -> Result<LoginResponse> {
        let mut state = self.inner.lock().await;
        let accepted = state
            .credentials
            .as_ref()
            .is_some_and(|(user, pass)| *user == request.username && *pass == request.password);
        if accepted {
            state.authenticated = true;
            Ok(LoginResponse {
                success: true,
                token: Some("memory-session".to_string()),
                message: None,
            })
        } else {
            Ok(LoginResponse {
                success: false,
                token: None,
                message: Some("invalid username or password".to_string()),
            })
        }
    }

    async fn logout(&self) -> Result<()> {
        self.inner.lock().await.authenticated = false;
        Ok(())
    }

    async fn fetch_groups_with_sites(&self) -> Result<Vec<GroupWithSites>> {
        Ok(self.inner.lock().await.visible_tree())
    }

    /// Applies the submitted ranks verbatim. Rejects (returns `false`) when
    /// any id does not resolve, matching the backend's all-or-nothing batch.
    async fn update_group_order(&self, updates: &[OrderUpdate]) -> Result<bool> {
        let mut state = self.inner.lock().await;
        if updates
            .iter()
            .any(|update| !state.groups.iter().any(|group| group.id.0 == update.id))
        {
            return Ok(false);
        }
        for update in updates {
            if let Some(group) = state.groups.iter_mut().find(|group| group.id.0 == update.id) {
                group.order_num = update.order_num;
                group.updated_at = Utc::now();
            }
        }
        Ok(true)
    }

    async fn update_site_order(&self, updates: &[OrderUpdate]) -> Result<bool> {
        let mut state = self.inner.lock().await;
        if updates
            .iter()
            .any(|update| !state.sites.iter().any(|site| site.id.0 == update.id))
        {
            return Ok(false);
        }
        for update in updates {
            if let Some(site) = state.sites.iter_mut().find(|site| site.id.0 == update.id) {
                site.order_num = update.order_num;
                site.updated_at = Utc::now();
            }
        }
        Ok(true)
    }

    async fn create_group(&self, group: NewGroup) -> Result<Group> {
        let mut state = self.inner.lock().await;
        let id = GroupId(state.next_group_id);
        state.next_group_id += 1;
        let now = Utc::now();
        let created = Group {
            id,
            name: group.name,
            order_num: group.order_num,
            is_public: group.is_public,
            created_at: now,
            updated_at: now,
        };
        state.groups.push(created.clone());
        Ok(created)
    }

    async fn update_group(&self, group: Group) -> Result<Group> {
        let mut state = self.inner.lock().await;
        let slot = state
            .groups
            .iter_mut()
            .find(|existing| existing.id == group.id)
            .ok_or_else(|| anyhow!("group {} not found", group.id.0))?;
        *slot = Group {
            updated_at: Utc::now(),
            ..group
        };
        Ok(slot.clone())
    }

    async fn delete_group(&self, group_id: GroupId) -> Result<()> {
        let mut state = self.inner.lock().await;
        let before = state.groups.len();
        state.groups.retain(|group| group.id != group_id);
        if state.groups.len() == before {
            return Err(anyhow!("group {} not found", group_id.0));
        }
        state.sites.retain(|site| site.group_id != group_id);
        Ok(())
    }

    async fn create_site(&self, site: NewSite) -> Result<Site> {
        let mut state = self.inner.lock().await;
        if !state.groups.iter().any(|group| group.id == site.group_id) {
            return Err(anyhow!("group {} not found", site.group_id.0));
        }
        let id = SiteId(state.next_site_id);
        state.next_site_id += 1;
        let now = Utc::now();
        let created = Site {
            id,
            group_id: site.group_id,
            name: site.name,
            url: site.url,
            icon: site.icon,
            description: site.description,
            notes: site.notes,
            order_num: site.order_num,
            is_public: site.is_public,
            created_at: now,
            updated_at: now,
        };
        state.sites.push(created.clone());
        Ok(created)
    }

    async fn update_site(&self, site: Site) -> Result<Site> {
        let mut state = self.inner.lock().await;
        let slot = state
            .sites
            .iter_mut()
            .find(|existing| existing.id == site.id)
            .ok_or_else(|| anyhow!("site {} not found", site.id.0))?;
        *slot = Site {
            updated_at: Utc::now(),
            ..site
        };
        Ok(slot.clone())
    }

    async fn delete_site(&self, site_id: SiteId) -> Result<()> {
        let mut state = self.inner.lock().await;
        let before = state.sites.len();
        state.sites.retain(|site| site.id != site_id);
        if state.sites.len() == before {
            return Err(anyhow!("site {} not found", site_id.0));
        }
        Ok(())
    }

    async fn get_configs(&self) -> Result<HashMap<String, String>> {
        Ok(self.inner.lock().await.configs.clone())
    }

    async fn set_config(&self, key: &str, value: &str) -> Result<()> {
        self.inner
            .lock()
            .await
            .configs
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Merge a backup: groups are matched by name, sites by (group, url).
    /// Matched sites are updated only when a field actually differs.
    async fn import_data(&self, payload: ExportPayload) -> Result<ImportOutcome> {
        let mut state = self.inner.lock().await;
        let mut group_stats = GroupImportStats {
            total: payload.groups.len(),
            ..Default::default()
        };
        let mut site_stats = SiteImportStats {
            total: payload.sites.len(),
            ..Default::default()
        };

        // imported group id -> local group id
        let mut group_ids: HashMap<i64, GroupId> = HashMap::new();
        for imported in &payload.groups {
            let matched = state
                .groups
                .iter()
                .find(|group| group.name == imported.name)
                .map(|group| group.id);
            if let Some(existing) = matched {
                group_ids.insert(imported.id.0, existing);
                group_stats.merged += 1;
            } else {
                let id = GroupId(state.next_group_id);
                state.next_group_id += 1;
                let now = Utc::now();
                state.groups.push(Group {
                    id,
                    name: imported.name.clone(),
                    order_num: imported.order_num,
                    is_public: true,
                    created_at: now,
                    updated_at: now,
                });
                group_ids.insert(imported.id.0, id);
                group_stats.created += 1;
            }
        }

        for imported in &payload.sites {
            let Some(&group_id) = group_ids.get(&imported.group_id.0) else {
                site_stats.skipped += 1;
                continue;
            };
            let existing = state
                .sites
                .iter_mut()
                .find(|site| site.group_id == group_id && site.url == imported.url);
            match existing {
                Some(site) => {
                    let changed = site.name != imported.name
                        || site.icon != imported.icon
                        || site.description != imported.description
                        || site.notes != imported.notes;
                    if changed {
                        site.name = imported.name.clone();
                        site.icon = imported.icon.clone();
                        site.description = imported.description.clone();
                        site.notes = imported.notes.clone();
                        site.updated_at = Utc::now();
                        site_stats.updated += 1;
                    } else {
                        site_stats.skipped += 1;
                    }
                }
                None => {
                    let id = SiteId(state.next_site_id);
                    state.next_site_id += 1;
                    let now = Utc::now();
                    state.sites.push(Site {
                        id,
                        group_id,
                        name: imported.name.clone(),
                        url: imported.url.clone(),
                        icon: imported.icon.clone(),
                        description: imported.description.clone(),
                        notes: imported.notes.clone(),
                        order_num: imported.order_num,
                        is_public: imported.is_public,
                        created_at: now,
                        updated_at: now,
                    });
                    site_stats.created += 1;
                }
            }
        }

        state.configs.extend(payload.configs);

        Ok(ImportOutcome {
            success: true,
            stats: Some(ImportStats {
                groups: group_stats,
                sites: site_stats,
            }),
            error: None,
        })
    }
}

#[cfg(test)]
#[path = "tests/memory_store_tests.rs"]
mod tests;
