use super::*;
use chrono::Utc;

struct RecordingNavStore {
    tree: Mutex<Vec<GroupWithSites>>,
    group_batches: Mutex<Vec<Vec<OrderUpdate>>>,
    site_batches: Mutex<Vec<Vec<OrderUpdate>>>,
    fail_with: Mutex<Option<String>>,
    reject_order: Mutex<bool>,
    authenticated: bool,
}

impl RecordingNavStore {
    fn editor(tree: Vec<GroupWithSites>) -> Self {
        Self {
            tree: Mutex::new(tree),
            group_batches: Mutex::new(Vec::new()),
            site_batches: Mutex::new(Vec::new()),
            fail_with: Mutex::new(None),
            reject_order: Mutex::new(false),
            authenticated: true,
        }
    }

    fn guest(tree: Vec<GroupWithSites>) -> Self {
        Self {
            authenticated: false,
            ..Self::editor(tree)
        }
    }

    async fn fail_order_updates(&self, message: &str) {
        *self.fail_with.lock().await = Some(message.to_string());
    }

    async fn clear_failure(&self) {
        self.fail_with.lock().await.take();
    }

    async fn reject_order_updates(&self, value: bool) {
        *self.reject_order.lock().await = value;
    }

    async fn order_gate(&self) -> Result<bool> {
        if let Some(message) = self.fail_with.lock().await.as_ref() {
            return Err(anyhow!(message.clone()));
        }
        Ok(!*self.reject_order.lock().await)
    }
}

#[async_trait]
impl NavStore for RecordingNavStore {
    async fn check_auth(&self) -> Result<bool> {
        Ok(self.authenticated)
    }

    async fn login(&self, _request: LoginRequest) -> Result<LoginResponse> {
        Ok(LoginResponse {
            success: true,
            token: Some("test-session".to_string()),
            message: None,
        })
    }

    async fn logout(&self) -> Result<()> {
        Ok(())
    }

    async fn fetch_groups_with_sites(&self) -> Result<Vec<GroupWithSites>> {
        Ok(self.tree.lock().await.clone())
    }

    async fn update_group_order(&self, updates: &[OrderUpdate]) -> Result<bool> {
        let accepted = self.order_gate().await?;
        if accepted {
            self.group_batches.lock().await.push(updates.to_vec());
        }
        Ok(accepted)
    }

    async fn update_site_order(&self, updates: &[OrderUpdate]) -> Result<bool> {
        let accepted = self.order_gate().await?;
        if accepted {
            self.site_batches.lock().await.push(updates.to_vec());
        }
        Ok(accepted)
    }

    async fn create_group(&self, _group: NewGroup) -> Result<Group> {
        Err(anyhow!("create_group is not exercised by this double"))
    }

    async fn update_group(&self, _group: Group) -> Result<Group> {
        Err(anyhow!("update_group is not exercised by this double"))
    }

    async fn delete_group(&self, _group_id: GroupId) -> Result<()> {
        Err(anyhow!("delete_group is not exercised by this double"))
    }

    async fn create_site(&self, _site: NewSite) -> Result<Site> {
        Err(anyhow!("create_site is not exercised by this double"))
    }

    async fn update_site(&self, _site: Site) -> Result<Site> {
        Err(anyhow!("update_site is not exercised by this double"))
    }

    async fn delete_site(&self, _site_id: SiteId) -> Result<()> {
        Err(anyhow!("delete_site is not exercised by this double"))
    }

    async fn get_configs(&self) -> Result<HashMap<String, String>> {
        Ok(HashMap::new())
    }

    async fn set_config(&self, _key: &str, _value: &str) -> Result<()> {
        Ok(())
    }

    async fn import_data(&self, _payload: ExportPayload) -> Result<ImportOutcome> {
        Err(anyhow!("import_data is not exercised by this double"))
    }
}

fn sample_group(id: i64, name: &str, order_num: i64) -> GroupWithSites {
    let now = Utc::now();
    GroupWithSites {
        group: Group {
            id: GroupId(id),
            name: name.to_string(),
            order_num,
            is_public: true,
            created_at: now,
            updated_at: now,
        },
        sites: Vec::new(),
    }
}

fn sample_site(id: i64, group_id: i64, name: &str, order_num: i64) -> Site {
    let now = Utc::now();
    Site {
        id: SiteId(id),
        group_id: GroupId(group_id),
        name: name.to_string(),
        url: format!("https://example.com/{name}"),
        icon: String::new(),
        description: String::new(),
        notes: String::new(),
        order_num,
        is_public: true,
        created_at: now,
        updated_at: now,
    }
}

fn three_groups() -> Vec<GroupWithSites> {
    vec![
        sample_group(1, "a", 0),
        sample_group(2, "b", 1),
        sample_group(3, "c", 2),
    ]
}

fn grouped_sites() -> Vec<GroupWithSites> {
    let mut first = sample_group(1, "a", 0);
    first.sites = vec![
        sample_site(10, 1, "one", 0),
        sample_site(11, 1, "two", 1),
        sample_site(12, 1, "three", 2),
    ];
    let mut second = sample_group(2, "b", 1);
    second.sites = vec![sample_site(20, 2, "four", 0), sample_site(21, 2, "five", 1)];
    vec![first, second]
}

async fn editor_client(
    tree: Vec<GroupWithSites>,
) -> (Arc<DashboardClient>, Arc<RecordingNavStore>) {
    let store = Arc::new(RecordingNavStore::editor(tree));
    let client = DashboardClient::new(store.clone());
    let mode = client.initialize().await.expect("initialize");
    assert_eq!(mode, ViewMode::Edit);
    (client, store)
}

fn group_order(client_groups: &[GroupWithSites]) -> Vec<i64> {
    client_groups.iter().map(|entry| entry.group.id.0).collect()
}

#[tokio::test]
async fn guest_has_no_path_into_a_sorting_state() {
    let store = Arc::new(RecordingNavStore::guest(three_groups()));
    let client = DashboardClient::new(store);
    let mode = client.initialize().await.expect("initialize");
    assert_eq!(mode, ViewMode::ReadOnly);

    assert_eq!(
        client.start_group_sort().await,
        Err(SortError::EditorRequired)
    );
    assert_eq!(
        client.start_site_sort(GroupId(1)).await,
        Err(SortError::EditorRequired)
    );
    assert!(client.sort_scope().await.is_idle());
}

#[tokio::test]
async fn second_sort_session_is_rejected() {
    let (client, _store) = editor_client(three_groups()).await;

    client.start_group_sort().await.expect("enter group sort");
    assert_eq!(
        client.start_group_sort().await,
        Err(SortError::SessionActive("group sort"))
    );
    assert_eq!(
        client.start_site_sort(GroupId(1)).await,
        Err(SortError::SessionActive("group sort"))
    );

    client.cancel_sort().await.expect("cancel");
    assert!(client.sort_scope().await.is_idle());
}

#[tokio::test]
async fn site_sort_requires_an_existing_group() {
    let (client, _store) = editor_client(three_groups()).await;
    assert_eq!(
        client.start_site_sort(GroupId(99)).await,
        Err(SortError::UnknownGroup(GroupId(99)))
    );
    assert!(client.sort_scope().await.is_idle());
}

#[tokio::test]
async fn empty_collections_cannot_enter_sorting() {
    let (client, _store) = editor_client(vec![sample_group(1, "empty", 0)]).await;
    assert_eq!(
        client.start_site_sort(GroupId(1)).await,
        Err(SortError::EmptyCollection)
    );

    let store = Arc::new(RecordingNavStore::editor(Vec::new()));
    let client = DashboardClient::new(store);
    client.initialize().await.expect("initialize");
    assert_eq!(
        client.start_group_sort().await,
        Err(SortError::EmptyCollection)
    );
}

#[tokio::test]
async fn move_group_is_a_pure_permutation() {
    let (client, _store) = editor_client(three_groups()).await;
    client.start_group_sort().await.expect("enter group sort");

    client
        .move_group(GroupId(3), GroupId(1))
        .await
        .expect("move");

    let groups = client.groups().await;
    assert_eq!(group_order(&groups), vec![3, 1, 2]);
    let mut ids = group_order(&groups);
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[tokio::test]
async fn same_position_and_unknown_ids_are_silent_noops() {
    let (client, _store) = editor_client(three_groups()).await;
    client.start_group_sort().await.expect("enter group sort");

    client
        .move_group(GroupId(2), GroupId(2))
        .await
        .expect("self move");
    client
        .move_group(GroupId(2), GroupId(42))
        .await
        .expect("unknown dest");
    client
        .move_group(GroupId(42), GroupId(2))
        .await
        .expect("unknown source");

    assert_eq!(group_order(&client.groups().await), vec![1, 2, 3]);
}

#[tokio::test]
async fn moving_requires_the_matching_scope() {
    let (client, _store) = editor_client(grouped_sites()).await;

    assert_eq!(
        client.move_group(GroupId(1), GroupId(2)).await,
        Err(SortError::NoActiveSession)
    );

    client
        .start_site_sort(GroupId(1))
        .await
        .expect("enter site sort");
    assert_eq!(
        client.move_group(GroupId(1), GroupId(2)).await,
        Err(SortError::NoActiveSession)
    );
}

#[tokio::test]
async fn save_submits_a_dense_zero_based_group_batch() {
    let (client, store) = editor_client(three_groups()).await;
    client.start_group_sort().await.expect("enter group sort");
    client
        .move_group(GroupId(3), GroupId(1))
        .await
        .expect("move");

    client.save_order().await.expect("save");

    let batches = store.group_batches.lock().await;
    assert_eq!(batches.len(), 1);
    assert_eq!(
        batches[0],
        vec![
            OrderUpdate { id: 3, order_num: 0 },
            OrderUpdate { id: 1, order_num: 1 },
            OrderUpdate { id: 2, order_num: 2 },
        ]
    );
    drop(batches);
    assert!(client.sort_scope().await.is_idle());
}

#[tokio::test]
async fn site_sort_leaves_every_other_collection_untouched() {
    let (client, store) = editor_client(grouped_sites()).await;
    client
        .start_site_sort(GroupId(1))
        .await
        .expect("enter site sort");

    client
        .move_site(SiteId(12), SiteId(10))
        .await
        .expect("move");

    let groups = client.groups().await;
    assert_eq!(group_order(&groups), vec![1, 2]);
    let first: Vec<i64> = groups[0].sites.iter().map(|site| site.id.0).collect();
    let second: Vec<i64> = groups[1].sites.iter().map(|site| site.id.0).collect();
    assert_eq!(first, vec![12, 10, 11]);
    assert_eq!(second, vec![20, 21]);

    client.save_order().await.expect("save");

    let site_batches = store.site_batches.lock().await;
    assert_eq!(
        site_batches[0],
        vec![
            OrderUpdate { id: 12, order_num: 0 },
            OrderUpdate { id: 10, order_num: 1 },
            OrderUpdate { id: 11, order_num: 2 },
        ]
    );
    assert!(store.group_batches.lock().await.is_empty());
}

#[tokio::test]
async fn failed_save_keeps_scope_and_optimistic_order_for_retry() {
    let (client, store) = editor_client(three_groups()).await;
    client.start_group_sort().await.expect("enter group sort");
    client
        .move_group(GroupId(3), GroupId(1))
        .await
        .expect("move");

    store.fail_order_updates("store unavailable").await;
    let err = client.save_order().await.expect_err("save must fail");
    assert!(err.to_string().contains("store unavailable"));

    // session and speculative order survive the failure
    assert!(!client.sort_scope().await.is_idle());
    assert_eq!(group_order(&client.groups().await), vec![3, 1, 2]);

    store.clear_failure().await;
    client.save_order().await.expect("retry succeeds");

    let batches = store.group_batches.lock().await;
    assert_eq!(batches.len(), 1);
    assert_eq!(
        batches[0],
        vec![
            OrderUpdate { id: 3, order_num: 0 },
            OrderUpdate { id: 1, order_num: 1 },
            OrderUpdate { id: 2, order_num: 2 },
        ]
    );
    drop(batches);
    assert!(client.sort_scope().await.is_idle());
}

#[tokio::test]
async fn rejected_save_is_surfaced_and_retryable() {
    let (client, store) = editor_client(three_groups()).await;
    client.start_group_sort().await.expect("enter group sort");
    client
        .move_group(GroupId(2), GroupId(1))
        .await
        .expect("move");

    store.reject_order_updates(true).await;
    let err = client.save_order().await.expect_err("save must be rejected");
    assert_eq!(
        err.downcast_ref::<SortError>(),
        Some(&SortError::SaveRejected)
    );
    assert!(!client.sort_scope().await.is_idle());

    store.reject_order_updates(false).await;
    client.save_order().await.expect("retry succeeds");
}

#[tokio::test]
async fn cancel_restores_the_pre_session_order() {
    let (client, _store) = editor_client(three_groups()).await;
    client.start_group_sort().await.expect("enter group sort");
    client
        .move_group(GroupId(3), GroupId(1))
        .await
        .expect("move");
    assert_eq!(group_order(&client.groups().await), vec![3, 1, 2]);

    client.cancel_sort().await.expect("cancel");

    assert!(client.sort_scope().await.is_idle());
    assert_eq!(group_order(&client.groups().await), vec![1, 2, 3]);
}

#[tokio::test]
async fn cancel_restores_site_order_within_the_sorted_group_only() {
    let (client, _store) = editor_client(grouped_sites()).await;
    client
        .start_site_sort(GroupId(1))
        .await
        .expect("enter site sort");
    client
        .move_site(SiteId(10), SiteId(12))
        .await
        .expect("move");

    client.cancel_sort().await.expect("cancel");

    let groups = client.groups().await;
    let first: Vec<i64> = groups[0].sites.iter().map(|site| site.id.0).collect();
    assert_eq!(first, vec![10, 11, 12]);
}

#[tokio::test]
async fn save_and_cancel_require_an_active_session() {
    let (client, _store) = editor_client(three_groups()).await;

    let err = client.save_order().await.expect_err("save must fail");
    assert_eq!(
        err.downcast_ref::<SortError>(),
        Some(&SortError::NoActiveSession)
    );
    assert_eq!(client.cancel_sort().await, Err(SortError::NoActiveSession));
}

#[tokio::test]
async fn save_emits_events_for_success_and_failure() {
    let (client, store) = editor_client(three_groups()).await;
    let mut events = client.subscribe_events();
    client.start_group_sort().await.expect("enter group sort");

    store.fail_order_updates("boom").await;
    let _ = client.save_order().await;
    store.clear_failure().await;
    client.save_order().await.expect("save");

    let mut saw_error = false;
    let mut saw_saved = false;
    while let Ok(event) = events.try_recv() {
        match event {
            ClientEvent::Error(message) => saw_error |= message.contains("boom"),
            ClientEvent::SortSaved => saw_saved = true,
            _ => {}
        }
    }
    assert!(saw_error, "expected an error event for the failed save");
    assert!(saw_saved, "expected a saved event for the retry");
}

#[tokio::test]
async fn logout_abandons_an_active_sort_session() {
    let (client, _store) = editor_client(three_groups()).await;
    client.start_group_sort().await.expect("enter group sort");
    client
        .move_group(GroupId(3), GroupId(1))
        .await
        .expect("move");

    client.logout().await.expect("logout");

    assert_eq!(client.view_mode().await, ViewMode::ReadOnly);
    assert!(client.sort_scope().await.is_idle());
}

#[tokio::test]
async fn reorder_scenario_reconciles_against_an_honest_store() {
    // groups [a, b, c]; drag c before a; the saved order survives the
    // canonical refetch and the controller returns to idle
    let store = Arc::new(MemoryNavStore::new());
    let a = store.seed_group("a", true).await;
    let b = store.seed_group("b", true).await;
    let c = store.seed_group("c", true).await;
    store.force_authenticated(true).await;

    let client = DashboardClient::new(store);
    client.initialize().await.expect("initialize");
    client.start_group_sort().await.expect("enter group sort");
    client.move_group(c, a).await.expect("move");
    client.save_order().await.expect("save");

    let groups = client.groups().await;
    assert_eq!(group_order(&groups), vec![c.0, a.0, b.0]);
    let ranks: Vec<i64> = groups.iter().map(|entry| entry.group.order_num).collect();
    assert_eq!(ranks, vec![0, 1, 2]);
    assert!(client.sort_scope().await.is_idle());
}

#[tokio::test]
async fn create_site_ranks_after_existing_siblings() {
    let store = Arc::new(MemoryNavStore::new());
    let group_id = store.seed_group("tools", true).await;
    store.seed_site(group_id, "first", "https://one.example", true).await;
    store.seed_site(group_id, "second", "https://two.example", true).await;
    store.force_authenticated(true).await;

    let client = DashboardClient::new(store);
    client.initialize().await.expect("initialize");

    let site = client
        .create_site(NewSite {
            group_id,
            name: "third".to_string(),
            url: "https://three.example".to_string(),
            icon: String::new(),
            description: String::new(),
            notes: String::new(),
            order_num: 0,
            is_public: true,
        })
        .await
        .expect("create site");

    assert_eq!(site.order_num, 2);
    let groups = client.groups().await;
    assert_eq!(groups[0].sites.len(), 3);
}

#[tokio::test]
async fn export_reflects_the_entity_store() {
    let store = Arc::new(MemoryNavStore::new());
    let group_id = store.seed_group("news", true).await;
    store.seed_site(group_id, "wire", "https://wire.example", true).await;
    store.force_authenticated(true).await;

    let client = DashboardClient::new(store);
    client.initialize().await.expect("initialize");

    let payload = client.export_data().await.expect("export");
    assert_eq!(payload.groups.len(), 1);
    assert_eq!(payload.groups[0].name, "news");
    assert_eq!(payload.sites.len(), 1);
    assert_eq!(payload.version, EXPORT_FORMAT_VERSION);
    assert!(payload.configs.contains_key("site.title"));
}

#[tokio::test]
async fn import_merges_and_reports_stats() {
    let source = Arc::new(MemoryNavStore::new());
    let group_id = source.seed_group("docs", true).await;
    source.seed_site(group_id, "manual", "https://manual.example", true).await;
    source.force_authenticated(true).await;
    let exporter = DashboardClient::new(source);
    exporter.initialize().await.expect("initialize exporter");
    let payload = exporter.export_data().await.expect("export");

    let target = Arc::new(MemoryNavStore::new());
    target.seed_group("docs", true).await;
    target.force_authenticated(true).await;
    let importer = DashboardClient::new(target);
    importer.initialize().await.expect("initialize importer");

    let stats = importer.import_data(payload).await.expect("import");
    assert_eq!(stats.groups.merged, 1);
    assert_eq!(stats.groups.created, 0);
    assert_eq!(stats.sites.created, 1);

    let groups = importer.groups().await;
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].sites.len(), 1);
}
