//! Command handlers for the sentiwatch CLI.

use crate::coordinator::DashboardCoordinator;
use crate::fetcher::TransportFetcher;
use anyhow::Context;
use sentiwatch_core::{Config, Paths};
use sentiwatch_linking::{ConsentLinkFlow, LinkSettings};
use sentiwatch_polling::PollingEngine;
use sentiwatch_store::{DraftStore, FileStore, KeyValueStore, TokenStore};
use sentiwatch_transport::AuthTransport;
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

fn build_transport(config: &Config, paths: &Paths) -> anyhow::Result<(Arc<AuthTransport>, DraftStore)> {
    // Reject malformed configuration up front, not at the first request.
    config.api_url().context("invalid api_url in config")?;
    config
        .authorize_url()
        .context("invalid authorize_url in config")?;
    paths.ensure_dirs()?;
    let store: Arc<dyn KeyValueStore> =
        Arc::new(FileStore::open(paths.store_file()).context("opening client store")?);
    let tokens = TokenStore::new(Arc::clone(&store));
    let drafts = DraftStore::new(store);
    Ok((Arc::new(AuthTransport::new(&config.api_url, tokens)), drafts))
}

fn prompt(message: &str) -> anyhow::Result<String> {
    eprint!("{}", message);
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// `sentiwatch login <username>`
pub async fn login(config: &Config, paths: &Paths, username: &str) -> anyhow::Result<()> {
    let (transport, _) = build_transport(config, paths)?;

    let password = prompt("Password: ")?;
    let meta = transport
        .login(username, &password)
        .await
        .context("login failed")?;

    println!("Logged in as {}", meta.username);
    Ok(())
}

/// `sentiwatch logout`
pub fn logout(config: &Config, paths: &Paths) -> anyhow::Result<()> {
    let (transport, _) = build_transport(config, paths)?;
    transport.logout();
    println!("Logged out.");
    Ok(())
}

/// `sentiwatch status`
pub async fn status(config: &Config, paths: &Paths) -> anyhow::Result<()> {
    let (transport, _) = build_transport(config, paths)?;

    let Some(meta) = transport.tokens().session_meta()? else {
        println!("Not logged in.");
        return Ok(());
    };
    println!("Logged in as {}", meta.username);
    if transport.tokens().is_expired()? {
        println!("Access token expired (will refresh on next request).");
    }

    match transport.list_linked_accounts().await {
        Ok(accounts) if accounts.is_empty() => println!("No linked accounts."),
        Ok(accounts) => {
            println!("Linked accounts:");
            for account in accounts {
                println!("  {}  (linked {})", account.username, account.created_at);
            }
        }
        Err(e) => println!("Could not list linked accounts: {}", e),
    }
    Ok(())
}

/// `sentiwatch link <identifier>`
///
/// Runs the whole consent flow in one sitting: consent entry, the provider
/// authorization URL, and the pasted-back callback URL.
pub async fn link(config: &Config, paths: &Paths, identifier: &str) -> anyhow::Result<()> {
    let (transport, drafts) = build_transport(config, paths)?;
    let flow = ConsentLinkFlow::new(
        Arc::clone(&transport),
        drafts,
        LinkSettings {
            authorize_url: config.authorize_url.clone(),
            client_id: config.client_id.clone(),
            redirect_uri: config.redirect_uri.clone(),
            scopes: config.permission_scopes.clone(),
            debounce_ms: config.debounce_ms,
        },
    );

    // Advisory pre-check; submit_draft re-checks authoritatively.
    if let Some(Ok(true)) = flow.check_identifier(identifier).await {
        println!("'{}' is already linked.", identifier);
        return Ok(());
    }

    let answer = prompt(&format!(
        "Has the owner of '{}' given their consent to monitoring? [y/N] ",
        identifier
    ))?;
    let consent_given = matches!(answer.to_lowercase().as_str(), "y" | "yes");

    flow.submit_draft(identifier, consent_given).await?;
    let authorize_url = flow.begin_redirect()?;

    println!("Open this URL in a browser and authorize the account:");
    println!("  {}", authorize_url);
    let callback_url = prompt("Paste the full callback URL here: ")?;

    let request = flow.resume(&callback_url)?;
    let account = flow.exchange(request).await?;
    println!("Linked account '{}'.", account.username);
    Ok(())
}

/// `sentiwatch watch`
pub async fn watch(config: &Config, paths: &Paths) -> anyhow::Result<()> {
    let (transport, _) = build_transport(config, paths)?;

    let accounts = transport
        .list_linked_accounts()
        .await
        .context("listing linked accounts")?;
    if accounts.is_empty() {
        println!("No linked accounts to watch. Run `sentiwatch link` first.");
        return Ok(());
    }

    let fetcher = Arc::new(TransportFetcher::new(Arc::clone(&transport)));
    let engine = Arc::new(PollingEngine::new(fetcher));
    let coordinator =
        DashboardCoordinator::new(engine, Duration::from_millis(config.poll_interval_ms));

    let source_ids: Vec<String> = accounts.iter().map(|a| a.id.clone()).collect();
    coordinator.start(&source_ids)?;
    let session_watch = coordinator.watch_session(transport.subscribe_session_events());
    let mut session_events = transport.subscribe_session_events();
    let mut updates = coordinator.subscribe_updates();

    println!(
        "Watching {} account(s), polling every {}ms. Ctrl-C to stop.",
        accounts.len(),
        config.poll_interval_ms
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("Stopping.");
                coordinator.stop();
                break;
            }
            _ = session_events.recv() => {
                println!("Session terminated; please log in again.");
                break;
            }
            update = updates.recv() => match update {
                Ok(update) => {
                    if let Some(error) = update.error {
                        println!("[{}] fetch failed: {}", update.source_id, error);
                    } else {
                        println!(
                            "[{}] {} new item(s) ({} unread, {} total across accounts)",
                            update.source_id,
                            update.new_item_count,
                            update.unread_for_source,
                            update.total_unread
                        );
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "update stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    session_watch.abort();
    Ok(())
}
