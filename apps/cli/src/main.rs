use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use client_core::{DashboardClient, HttpNavStore, MemoryNavStore, NavStore};
use shared::domain::ViewMode;

/// Dashboard client demo. Points at a running server when `--server-url` is
/// given, otherwise runs against a seeded in-memory store.
#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    username: Option<String>,
    #[arg(long)]
    password: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let store: Arc<dyn NavStore> = match &args.server_url {
        Some(url) => Arc::new(HttpNavStore::new(url)?),
        None => Arc::new(seeded_demo_store().await),
    };

    let client = DashboardClient::new(store);
    let mode = client.initialize().await?;
    println!("Session mode: {mode:?}");

    if let (Some(username), Some(password)) = (&args.username, &args.password) {
        client.login(username, password, false).await?;
        println!("Logged in as {username}");
    }

    print_tree(&client).await;

    if client.view_mode().await == ViewMode::Edit {
        let groups = client.groups().await;
        if let (Some(first), Some(last)) = (groups.first(), groups.last()) {
            let (first, last) = (first.group.id, last.group.id);
            println!("Moving the last group to the front and saving...");
            client.start_group_sort().await?;
            client.move_group(last, first).await?;
            client.save_order().await?;
            print_tree(&client).await;
        }
    } else {
        println!("Read-only session; pass --username/--password to reorder.");
    }

    println!(
        "Configs: {}",
        serde_json::to_string_pretty(&client.configs().await)?
    );
    Ok(())
}

async fn seeded_demo_store() -> MemoryNavStore {
    let store = MemoryNavStore::with_credentials("admin", "admin");
    let news = store.seed_group("News", true).await;
    let tools = store.seed_group("Tools", true).await;
    store.seed_site(news, "Wire", "https://wire.example", true).await;
    store.seed_site(news, "Herald", "https://herald.example", true).await;
    store.seed_site(tools, "Grep", "https://grep.example", true).await;
    store.force_authenticated(true).await;
    store
}

async fn print_tree(client: &DashboardClient) {
    for entry in client.groups().await {
        println!("[{}] {}", entry.group.order_num, entry.group.name);
        for site in &entry.sites {
            println!("  [{}] {} -> {}", site.order_num, site.name, site.url);
        }
    }
}
