use std::io::BufRead;

use anyhow::{bail, Context, Result};
use clap::Parser;
use inquire::error::InquireResult;
use tracing_subscriber::EnvFilter;

mod ai;
mod app;
mod auth;
mod backup;
mod blocks;
mod cli;
mod config;
mod debounce;
mod events;
mod id;
mod scope;
mod search_text;
mod storage;
mod sync;
#[cfg(test)]
mod tests;

use app::{App, Audience};
use blocks::{BlockKind, BlockStore, BlockUpdate, ContentBlock};
use cli::Command;
use config::Config;
use id::BlockId;
use scope::{Scope, ScopeType};

fn main() -> Result<()> {
    let args = cli::Args::parse();

    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if args.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let base_path = config::resolve_base_path()?;
    let config = Config::load_with(&base_path)?;
    let app = App::open(config)?;

    match args.command {
        Command::Day { id } => show_scope(&app, ScopeType::Day, id),
        Command::Week { id } => show_scope(&app, ScopeType::Week, id),
        Command::Month { id } => show_scope(&app, ScopeType::Month, id),
        Command::Year { id } => show_scope(&app, ScopeType::Year, id),

        Command::Update {
            id,
            title,
            content,
            item,
            data,
        } => {
            let items = if item.is_empty() {
                None
            } else {
                Some(item.iter().map(|t| ContentBlock::text(t)).collect())
            };
            let data = if data.is_empty() {
                None
            } else {
                Some(parse_data_fields(&data)?)
            };

            let update = BlockUpdate {
                title,
                content,
                items,
                data,
            };
            let block = app.store.update(&BlockId::from(id.as_str()), update)?;
            println!("{}", serde_json::to_string_pretty(&block)?);
            Ok(())
        }

        Command::Journal { date } => run_journal(&app, date),

        Command::Search { query, kind } => {
            let kind: Option<BlockKind> = match kind {
                Some(k) => Some(k.parse().map_err(anyhow::Error::msg)?),
                None => None,
            };
            let results = app.store.search_keyword(&query);
            for block in results
                .iter()
                .filter(|b| kind.map_or(true, |k| b.kind == k))
            {
                println!(
                    "{}  {}  {}  {}",
                    block.id,
                    block.scope,
                    block.kind,
                    block.title.as_deref().unwrap_or("-")
                );
            }
            Ok(())
        }

        Command::Recall {
            query,
            private,
            from,
            to,
            top_k,
        } => {
            let filters = ai::SearchFilters {
                include_private: private,
                date_range: from.zip(to),
            };
            let top_k = top_k.unwrap_or(app.config.ai.top_k);
            let results = app.retrieval().search(&query, &filters, top_k)?;

            if results.is_empty() {
                println!("no matches (is the index built? try `weekly index`)");
                return Ok(());
            }
            for result in results {
                println!(
                    "{:.3}  [{} - {}]  {}",
                    result.score,
                    result.doc.scope_id,
                    result.doc.kind,
                    snippet(&result.doc.text, 100)
                );
            }
            Ok(())
        }

        Command::Ask { question, private } => {
            let answer = app.ask(&question, private, app.config.ai.top_k)?;
            println!("{}", answer.text);
            if !answer.evidence.is_empty() {
                println!("\n--- evidence ---");
                for result in &answer.evidence {
                    println!(
                        "{:.3}  [{} - {}]",
                        result.score, result.doc.scope_id, result.doc.kind
                    );
                }
            }
            Ok(())
        }

        Command::Summarize { scope_id, private } => {
            let scope = Scope::infer(&scope_id)?;
            let audience = if private {
                Audience::Private
            } else {
                Audience::Public
            };
            let block = app.generate_summary(&scope, audience)?;
            println!("{}", serde_json::to_string_pretty(&block)?);
            Ok(())
        }

        Command::Index { scope } => {
            let indexer = app.indexer();
            match scope {
                Some(day) => {
                    let scope = Scope::new(ScopeType::Day, &day)?;
                    indexer.index_day_context(&scope.id)?;
                    println!("indexed day context for {day}");
                }
                None => {
                    let bar = indicatif::ProgressBar::new(indexer.planned_items() as u64);
                    let report = indexer.reindex_all_with(|_| bar.inc(1));
                    bar.finish_and_clear();
                    println!(
                        "{} indexed, {} skipped, {} failed",
                        report.indexed, report.skipped, report.failed
                    );
                }
            }
            Ok(())
        }

        Command::Sync {
            push_only,
            pull_only,
        } => {
            if app.sessions.load().is_none() {
                println!("not logged in, nothing to sync (see `weekly login`)");
                return Ok(());
            }
            let reconciler = app.reconciler()?;
            if push_only {
                let pushed = reconciler.push_changes()?;
                println!("pushed {pushed} blocks");
            } else if pull_only {
                let pulled = reconciler.pull_changes()?;
                println!("pulled {pulled} blocks");
            } else {
                let (pulled, pushed) = reconciler.sync()?;
                println!("pulled {pulled}, pushed {pushed} blocks");
            }
            Ok(())
        }

        Command::Login { email } => {
            auth_client(&app)?.request_code(&email)?;
            println!("code sent to {email}; finish with `weekly verify {email} <code>`");
            Ok(())
        }

        Command::Verify { email, code } => {
            let session = auth_client(&app)?.verify_code(&email, &code)?;
            app.sessions.save(&session)?;
            println!("logged in as {}", session.email);
            Ok(())
        }

        Command::Logout => {
            app.sessions.clear()?;
            println!("logged out");
            Ok(())
        }

        Command::Backup { path } => {
            let written = backup::write_backup(app.store.as_ref(), path)?;
            if written.as_os_str() != "-" {
                println!("backup written to {}", written.display());
            }
            Ok(())
        }

        Command::Restore { path, yes } => {
            let text = backup::read_backup_text(path.as_deref())?;

            if !yes {
                match inquire::prompt_confirmation(format!(
                    "Restore will overwrite blocks that share ids with the snapshot \
                     ({} currently stored). Continue?",
                    app.store.total()
                )) {
                    InquireResult::Ok(true) => {}
                    InquireResult::Ok(false) => return Ok(()),
                    InquireResult::Err(err) => bail!("An error occurred: {}", err),
                }
            }

            let count = backup::import_data(app.store.as_ref(), &text)?;
            println!("restored {count} blocks");
            Ok(())
        }

        Command::Status => {
            println!("data dir:   {}", app.config.base_path().display());
            println!("blocks:     {}", app.store.total());
            println!("documents:  {}", app.docs.len());
            match app.sessions.load() {
                Some(session) => println!("session:    {}", session.email),
                None => println!("session:    (logged out)"),
            }

            let ollama = ai::ollama::OllamaClient::new(
                &app.config.ai.ollama_url,
                &app.config.ai.embedding_model,
                &app.config.ai.local_model,
            );
            match ollama.list_models() {
                Ok(models) => {
                    let has_embedding = models
                        .iter()
                        .any(|m| m.contains(&app.config.ai.embedding_model));
                    println!(
                        "ollama:     online ({} models{})",
                        models.len(),
                        if has_embedding {
                            ""
                        } else {
                            ", embedding model missing"
                        }
                    );
                }
                Err(_) => println!("ollama:     offline"),
            }
            println!(
                "completion: {}",
                if app.config.ai.use_cloud {
                    &app.config.ai.cloud_model
                } else {
                    &app.config.ai.local_model
                }
            );
            Ok(())
        }
    }
}

fn auth_client(app: &App) -> Result<auth::AuthClient> {
    let url = app
        .config
        .sync
        .url
        .as_deref()
        .context("sync.url is not configured")?;
    let api_key = app
        .config
        .sync
        .api_key
        .as_deref()
        .context("sync.api_key is not configured")?;
    Ok(auth::AuthClient::new(url, api_key))
}

fn show_scope(app: &App, scope_type: ScopeType, id: Option<String>) -> Result<()> {
    let scope = match id {
        Some(id) => Scope::new(scope_type, &id)?,
        None => scope_type.current(),
    };
    let blocks = app.ensure_scope(&scope)?;
    println!("{}", serde_json::to_string_pretty(&blocks)?);
    Ok(())
}

/// `key=value` pairs into a data map. Values that parse as JSON
/// scalars (numbers, booleans) are stored typed; everything else stays
/// a string.
fn parse_data_fields(pairs: &[String]) -> Result<serde_json::Map<String, serde_json::Value>> {
    let mut map = serde_json::Map::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("expected key=value, got {pair:?}"))?;
        let value = match serde_json::from_str::<serde_json::Value>(value) {
            Ok(v) if v.is_number() || v.is_boolean() => v,
            _ => serde_json::Value::String(value.to_string()),
        };
        map.insert(key.to_string(), value);
    }
    Ok(map)
}

/// Interactive journal: each entered line updates the day's journal
/// block after a quiet second, collapsing bursts into one write.
fn run_journal(app: &App, date: Option<String>) -> Result<()> {
    let scope = match date {
        Some(id) => Scope::new(ScopeType::Day, &id)?,
        None => ScopeType::Day.current(),
    };
    let blocks = app.ensure_scope(&scope)?;
    let journal = blocks
        .into_iter()
        .find(|b| b.kind == BlockKind::DailyJournal)
        .context("day scope is missing its journal block")?;

    let _worker = if app.config.ai.auto_index {
        Some(app.spawn_index_worker())
    } else {
        None
    };

    let store = app.store();
    let journal_id = journal.id.clone();
    let debouncer = debounce::Debouncer::new(debounce::DEFAULT_WINDOW, move |content: String| {
        let update = BlockUpdate {
            content: Some(content),
            ..Default::default()
        };
        if let Err(err) = store.update(&journal_id, update) {
            log::error!("failed to persist journal: {err}");
        }
    });

    let mut content = journal.content.unwrap_or_default();
    if !content.is_empty() {
        println!("{content}");
    }
    println!("-- journaling for {}; Ctrl-D to finish --", scope.id);

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        if !content.is_empty() {
            content.push('\n');
        }
        content.push_str(&line);
        debouncer.submit(content.clone());
    }

    // drop drains the pending write before the worker stops
    drop(debouncer);
    println!("saved.");
    Ok(())
}

fn snippet(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{cut}…")
}
