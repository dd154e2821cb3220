use std::{collections::HashMap, sync::Arc};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use shared::{
    domain::{Group, GroupId, GroupWithSites, Site, SiteId, ViewMode},
    protocol::{
        ExportPayload, ImportOutcome, ImportStats, LoginRequest, LoginResponse, NewGroup, NewSite,
        OrderUpdate,
    },
};
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{error, info, warn};

pub mod error;
pub mod http_store;
pub mod memory_store;
pub mod sort;

pub use error::SortError;
pub use http_store::HttpNavStore;
pub use memory_store::MemoryNavStore;
pub use sort::SortScope;

use sort::{array_move, restore_order_by};

const EXPORT_FORMAT_VERSION: &str = "1.0";

/// Config defaults applied underneath whatever the store returns, so the
/// client always renders with a complete config map.
const DEFAULT_CONFIGS: &[(&str, &str)] = &[
    ("site.title", "Linkdeck"),
    ("site.name", "Linkdeck"),
    ("site.customCss", ""),
    ("site.backgroundImage", ""),
    ("site.backgroundOpacity", "0.15"),
    (
        "site.iconApi",
        "https://www.faviconextractor.com/favicon/{domain}?larger=true",
    ),
    ("site.searchBoxEnabled", "true"),
    ("site.searchBoxGuestEnabled", "true"),
];

/// The dashboard's external store, consumed as HTTP-shaped RPCs. The server
/// filters reads by capability and is trusted to validate that a site-order
/// batch stays within one group.
#[async_trait]
pub trait NavStore: Send + Sync {
    async fn check_auth(&self) -> Result<bool>;
    async fn login(&self, request: LoginRequest) -> Result<LoginResponse>;
    async fn logout(&self) -> Result<()>;
    async fn fetch_groups_with_sites(&self) -> Result<Vec<GroupWithSites>>;
    async fn update_group_order(&self, updates: &[OrderUpdate]) -> Result<bool>;
    async fn update_site_order(&self, updates: &[OrderUpdate]) -> Result<bool>;
    async fn create_group(&self, group: NewGroup) -> Result<Group>;
    async fn update_group(&self, group: Group) -> Result<Group>;
    async fn delete_group(&self, group_id: GroupId) -> Result<()>;
    async fn create_site(&self, site: NewSite) -> Result<Site>;
    async fn update_site(&self, site: Site) -> Result<Site>;
    async fn delete_site(&self, site_id: SiteId) -> Result<()>;
    async fn get_configs(&self) -> Result<HashMap<String, String>>;
    async fn set_config(&self, key: &str, value: &str) -> Result<()>;
    async fn import_data(&self, payload: ExportPayload) -> Result<ImportOutcome>;
}

#[derive(Debug, Clone)]
pub enum ClientEvent {
    SessionChanged(ViewMode),
    DataRefreshed,
    SortSaved,
    SortCancelled,
    Error(String),
}

struct SessionState {
    view_mode: ViewMode,
    scope: SortScope,
}

/// Client facade over the dashboard store. Holds the last-fetched canonical
/// tree (the single source of truth for rendering and order computation),
/// the sort-mode controller state, and the merged config map.
///
/// The tree is replaced wholesale on every successful fetch; entities are
/// never patched in place.
pub struct DashboardClient {
    store: Arc<dyn NavStore>,
    inner: Mutex<SessionState>,
    groups: RwLock<Vec<GroupWithSites>>,
    configs: RwLock<HashMap<String, String>>,
    events: broadcast::Sender<ClientEvent>,
}

impl DashboardClient {
    pub fn new(store: Arc<dyn NavStore>) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            store,
            inner: Mutex::new(SessionState {
                view_mode: ViewMode::ReadOnly,
                scope: SortScope::Idle,
            }),
            groups: RwLock::new(Vec::new()),
            configs: RwLock::new(default_configs()),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Probe the session capability and load the initial data set. An auth
    /// probe failure degrades to guest mode rather than failing startup.
    pub async fn initialize(&self) -> Result<ViewMode> {
        let authenticated = match self.store.check_auth().await {
            Ok(value) => value,
            Err(err) => {
                warn!("auth probe failed, continuing as guest: {err}");
                false
            }
        };
        let mode = if authenticated {
            ViewMode::Edit
        } else {
            ViewMode::ReadOnly
        };
        self.set_view_mode(mode).await;
        self.refresh_data().await?;
        self.refresh_configs().await;
        Ok(mode)
    }

    pub async fn login(&self, username: &str, password: &str, remember_me: bool) -> Result<()> {
        let response = self
            .store
            .login(LoginRequest {
                username: username.to_string(),
                password: password.to_string(),
                remember_me,
            })
            .await
            .context("login request failed")?;

        if !response.success {
            let message = response
                .message
                .unwrap_or_else(|| "invalid username or password".to_string());
            let _ = self.events.send(ClientEvent::Error(message.clone()));
            return Err(anyhow!(message));
        }

        self.set_view_mode(ViewMode::Edit).await;
        self.refresh_data().await?;
        self.refresh_configs().await;
        info!("session: logged in as editor");
        Ok(())
    }

    /// Drop editor capability and reload public content. An active sort
    /// session is abandoned with its snapshot restored first.
    pub async fn logout(&self) -> Result<()> {
        {
            let inner = self.inner.lock().await;
            let sorting = !inner.scope.is_idle();
            drop(inner);
            if sorting {
                let _ = self.cancel_sort().await;
            }
        }
        self.store.logout().await?;
        self.set_view_mode(ViewMode::ReadOnly).await;
        self.refresh_data().await?;
        self.refresh_configs().await;
        info!("session: logged out, continuing as guest");
        Ok(())
    }

    pub async fn view_mode(&self) -> ViewMode {
        self.inner.lock().await.view_mode
    }

    pub async fn sort_scope(&self) -> SortScope {
        self.inner.lock().await.scope.clone()
    }

    /// Snapshot of the entity store in display order.
    pub async fn groups(&self) -> Vec<GroupWithSites> {
        self.groups.read().await.clone()
    }

    pub async fn configs(&self) -> HashMap<String, String> {
        self.configs.read().await.clone()
    }

    /// Canonical refetch: the result fully supersedes whatever optimistic
    /// state the reorder engine left behind.
    pub async fn refresh_data(&self) -> Result<()> {
        let tree = self
            .store
            .fetch_groups_with_sites()
            .await
            .context("failed to fetch groups")?;
        *self.groups.write().await = tree;
        let _ = self.events.send(ClientEvent::DataRefreshed);
        Ok(())
    }

    /// Reload the config map, merged over built-in defaults. A failed load
    /// keeps the defaults; the dashboard stays operable either way.
    pub async fn refresh_configs(&self) {
        let mut merged = default_configs();
        match self.store.get_configs().await {
            Ok(remote) => merged.extend(remote),
            Err(err) => warn!("failed to load configs, using defaults: {err}"),
        }
        *self.configs.write().await = merged;
    }

    // ---- Sort-mode controller ----------------------------------------

    /// Enter the group-reorder scope. Rejected for guests, while another
    /// session is active, or when there is nothing to sort.
    pub async fn start_group_sort(&self) -> Result<(), SortError> {
        let mut inner = self.inner.lock().await;
        if !inner.view_mode.is_editor() {
            return Err(SortError::EditorRequired);
        }
        if !inner.scope.is_idle() {
            return Err(SortError::SessionActive(inner.scope.describe()));
        }
        let snapshot: Vec<GroupId> = self
            .groups
            .read()
            .await
            .iter()
            .map(|entry| entry.group.id)
            .collect();
        if snapshot.is_empty() {
            return Err(SortError::EmptyCollection);
        }
        inner.scope = SortScope::Groups { snapshot };
        info!("sort: group session started");
        Ok(())
    }

    /// Enter the site-reorder scope for one group. The active collection is
    /// always recomputed from the live tree, never cached separately.
    pub async fn start_site_sort(&self, group_id: GroupId) -> Result<(), SortError> {
        let mut inner = self.inner.lock().await;
        if !inner.view_mode.is_editor() {
            return Err(SortError::EditorRequired);
        }
        if !inner.scope.is_idle() {
            return Err(SortError::SessionActive(inner.scope.describe()));
        }
        let groups = self.groups.read().await;
        let entry = groups
            .iter()
            .find(|entry| entry.group.id == group_id)
            .ok_or(SortError::UnknownGroup(group_id))?;
        let snapshot: Vec<SiteId> = entry.sites.iter().map(|site| site.id).collect();
        if snapshot.is_empty() {
            return Err(SortError::EmptyCollection);
        }
        drop(groups);
        inner.scope = SortScope::Sites { group_id, snapshot };
        info!(group_id = group_id.0, "sort: site session started");
        Ok(())
    }

    /// Apply a drag result to the group collection. Same-position drops and
    /// unknown ids are silent no-ops; nothing is persisted yet.
    pub async fn move_group(&self, source: GroupId, dest: GroupId) -> Result<(), SortError> {
        let inner = self.inner.lock().await;
        if !matches!(inner.scope, SortScope::Groups { .. }) {
            return Err(SortError::NoActiveSession);
        }
        if source == dest {
            return Ok(());
        }
        let mut groups = self.groups.write().await;
        let from = groups.iter().position(|entry| entry.group.id == source);
        let to = groups.iter().position(|entry| entry.group.id == dest);
        if let (Some(from), Some(to)) = (from, to) {
            array_move(&mut groups, from, to);
        }
        Ok(())
    }

    /// Apply a drag result to the active group's site list. Only that list
    /// is touched; every other collection keeps its order.
    pub async fn move_site(&self, source: SiteId, dest: SiteId) -> Result<(), SortError> {
        let inner = self.inner.lock().await;
        let SortScope::Sites { group_id, .. } = &inner.scope else {
            return Err(SortError::NoActiveSession);
        };
        let group_id = *group_id;
        if source == dest {
            return Ok(());
        }
        let mut groups = self.groups.write().await;
        let Some(entry) = groups.iter_mut().find(|entry| entry.group.id == group_id) else {
            // group deleted externally mid-session; nothing left to move
            return Ok(());
        };
        let from = entry.sites.iter().position(|site| site.id == source);
        let to = entry.sites.iter().position(|site| site.id == dest);
        if let (Some(from), Some(to)) = (from, to) {
            array_move(&mut entry.sites, from, to);
        }
        Ok(())
    }

    /// Persist the active collection's current order as a dense 0-based
    /// batch, then reconcile with a canonical refetch. On any failure the
    /// scope and the optimistic order are left in place so the save can be
    /// retried without redoing the drags.
    pub async fn save_order(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let submitted = match inner.scope.clone() {
            SortScope::Idle => return Err(SortError::NoActiveSession.into()),
            SortScope::Groups { .. } => {
                let batch: Vec<OrderUpdate> = {
                    let groups = self.groups.read().await;
                    groups
                        .iter()
                        .enumerate()
                        .map(|(position, entry)| OrderUpdate {
                            id: entry.group.id.0,
                            order_num: position as i64,
                        })
                        .collect()
                };
                info!(entries = batch.len(), "sort: submitting group order");
                self.store.update_group_order(&batch).await
            }
            SortScope::Sites { group_id, .. } => {
                let batch: Option<Vec<OrderUpdate>> = {
                    let groups = self.groups.read().await;
                    groups
                        .iter()
                        .find(|entry| entry.group.id == group_id)
                        .map(|entry| {
                            entry
                                .sites
                                .iter()
                                .enumerate()
                                .map(|(position, site)| OrderUpdate {
                                    id: site.id.0,
                                    order_num: position as i64,
                                })
                                .collect()
                        })
                };
                let Some(batch) = batch else {
                    // the group vanished under us; there is no order left
                    // to persist and nothing worth keeping in the session
                    warn!(group_id = group_id.0, "sort: group vanished before save");
                    inner.scope = SortScope::Idle;
                    return Ok(());
                };
                info!(
                    group_id = group_id.0,
                    entries = batch.len(),
                    "sort: submitting site order"
                );
                self.store.update_site_order(&batch).await
            }
        };

        match submitted {
            Ok(true) => {
                self.refresh_data().await?;
                inner.scope = SortScope::Idle;
                info!("sort: order saved and reconciled");
                let _ = self.events.send(ClientEvent::SortSaved);
                Ok(())
            }
            Ok(false) => {
                let err = SortError::SaveRejected;
                error!("sort: {err}");
                let _ = self.events.send(ClientEvent::Error(err.to_string()));
                Err(err.into())
            }
            Err(err) => {
                error!("sort: order update failed: {err}");
                let _ = self.events.send(ClientEvent::Error(err.to_string()));
                Err(err)
            }
        }
    }

    /// Leave the sorting state without persisting, restoring the pre-session
    /// order that was captured when the scope was entered.
    pub async fn cancel_sort(&self) -> Result<(), SortError> {
        let mut inner = self.inner.lock().await;
        match std::mem::replace(&mut inner.scope, SortScope::Idle) {
            SortScope::Idle => Err(SortError::NoActiveSession),
            SortScope::Groups { snapshot } => {
                let mut groups = self.groups.write().await;
                restore_order_by(&mut groups, &snapshot, |entry| entry.group.id);
                drop(groups);
                info!("sort: group session cancelled");
                let _ = self.events.send(ClientEvent::SortCancelled);
                Ok(())
            }
            SortScope::Sites { group_id, snapshot } => {
                let mut groups = self.groups.write().await;
                if let Some(entry) = groups.iter_mut().find(|entry| entry.group.id == group_id) {
                    restore_order_by(&mut entry.sites, &snapshot, |site| site.id);
                }
                drop(groups);
                info!(group_id = group_id.0, "sort: site session cancelled");
                let _ = self.events.send(ClientEvent::SortCancelled);
                Ok(())
            }
        }
    }

    // ---- CRUD passthroughs -------------------------------------------

    /// Create a group at the end of the current group order.
    pub async fn create_group(&self, name: &str, is_public: bool) -> Result<Group> {
        self.require_editor().await?;
        if name.trim().is_empty() {
            return Err(anyhow!("group name must not be empty"));
        }
        let order_num = self.groups.read().await.len() as i64;
        let group = self
            .store
            .create_group(NewGroup {
                name: name.to_string(),
                order_num,
                is_public,
            })
            .await
            .context("failed to create group")?;
        self.refresh_data().await?;
        Ok(group)
    }

    /// Create a site after its current siblings. The rank is recomputed from
    /// the live tree, so it lands after whatever order the siblings hold now.
    pub async fn create_site(&self, mut draft: NewSite) -> Result<Site> {
        self.require_editor().await?;
        if draft.name.trim().is_empty() || draft.url.trim().is_empty() {
            return Err(anyhow!("site name and url must not be empty"));
        }
        draft.order_num = {
            let groups = self.groups.read().await;
            groups
                .iter()
                .find(|entry| entry.group.id == draft.group_id)
                .and_then(|entry| entry.sites.iter().map(|site| site.order_num).max())
                .map_or(0, |max| max + 1)
        };
        let site = self
            .store
            .create_site(draft)
            .await
            .context("failed to create site")?;
        self.refresh_data().await?;
        Ok(site)
    }

    pub async fn update_group(&self, group: Group) -> Result<()> {
        self.require_editor().await?;
        self.store
            .update_group(group)
            .await
            .context("failed to update group")?;
        self.refresh_data().await
    }

    pub async fn update_site(&self, site: Site) -> Result<()> {
        self.require_editor().await?;
        self.store
            .update_site(site)
            .await
            .context("failed to update site")?;
        self.refresh_data().await
    }

    /// Delete a group. Sibling renumbering is the server's business; the
    /// refetch is what brings the dense order back.
    pub async fn delete_group(&self, group_id: GroupId) -> Result<()> {
        self.require_editor().await?;
        self.store
            .delete_group(group_id)
            .await
            .context("failed to delete group")?;
        self.refresh_data().await
    }

    pub async fn delete_site(&self, site_id: SiteId) -> Result<()> {
        self.require_editor().await?;
        self.store
            .delete_site(site_id)
            .await
            .context("failed to delete site")?;
        self.refresh_data().await
    }

    pub async fn set_config(&self, key: &str, value: &str) -> Result<()> {
        self.require_editor().await?;
        self.store
            .set_config(key, value)
            .await
            .with_context(|| format!("failed to save config '{key}'"))?;
        self.configs
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    // ---- Backup round-trip -------------------------------------------

    /// Assemble a backup from the entity store: group skeletons, a flat site
    /// list, and the config map.
    pub async fn export_data(&self) -> Result<ExportPayload> {
        self.require_editor().await?;
        let groups = self.groups.read().await;
        let payload = ExportPayload {
            groups: groups.iter().map(|entry| (&entry.group).into()).collect(),
            sites: groups
                .iter()
                .flat_map(|entry| entry.sites.iter().cloned())
                .collect(),
            configs: self.configs.read().await.clone(),
            version: EXPORT_FORMAT_VERSION.to_string(),
            export_date: Utc::now(),
        };
        Ok(payload)
    }

    /// Hand a backup to the store for merge/dedup, then reconcile.
    pub async fn import_data(&self, payload: ExportPayload) -> Result<ImportStats> {
        self.require_editor().await?;
        let outcome = self
            .store
            .import_data(payload)
            .await
            .context("import request failed")?;
        if !outcome.success {
            let message = outcome.error.unwrap_or_else(|| "import failed".to_string());
            let _ = self.events.send(ClientEvent::Error(message.clone()));
            return Err(anyhow!(message));
        }
        self.refresh_data().await?;
        self.refresh_configs().await;
        Ok(outcome.stats.unwrap_or_default())
    }

    async fn require_editor(&self) -> Result<(), SortError> {
        if self.inner.lock().await.view_mode.is_editor() {
            Ok(())
        } else {
            Err(SortError::EditorRequired)
        }
    }

    async fn set_view_mode(&self, mode: ViewMode) {
        let mut inner = self.inner.lock().await;
        if inner.view_mode != mode {
            inner.view_mode = mode;
            let _ = self.events.send(ClientEvent::SessionChanged(mode));
        }
    }
}

fn default_configs() -> HashMap<String, String> {
    DEFAULT_CONFIGS
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
