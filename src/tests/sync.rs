use std::sync::Arc;

use crate::auth::Session;
use crate::blocks::{Block, BlockKind, BlockStore, BlockUpdate};
use crate::scope::{Scope, ScopeType};
use crate::sync::{MemoryRemote, RemoteRow, SyncReconciler};
use crate::tests::store::create_store;

fn session(user_id: &str) -> Session {
    Session {
        user_id: user_id.to_string(),
        email: format!("{user_id}@example.com"),
        access_token: "token".to_string(),
    }
}

fn journal(scope_id: &str, content: &str) -> Block {
    let mut block = Block::new(
        Scope::new(ScopeType::Day, scope_id).unwrap(),
        BlockKind::DailyJournal,
        Some("Journal"),
    );
    block.content = Some(content.to_string());
    block
}

#[test]
fn push_then_pull_reproduces_the_block_set_on_a_second_device() {
    let (local, _tmp) = create_store();
    local.upsert(journal("2025-01-01", "first entry")).unwrap();
    local.upsert(journal("2025-01-02", "second entry")).unwrap();

    let remote = Arc::new(MemoryRemote::new());
    let uploader = SyncReconciler::new(local.clone(), remote.clone(), Some(session("u1")));
    assert_eq!(uploader.push_changes().unwrap(), 2);
    assert_eq!(remote.row_count(), 2);

    let (other, _tmp2) = create_store();
    let downloader = SyncReconciler::new(other.clone(), remote, Some(session("u1")));
    assert_eq!(downloader.pull_changes().unwrap(), 2);

    let mut original = local.all();
    let mut replica = other.all();
    original.sort_by(|a, b| a.id.cmp(&b.id));
    replica.sort_by(|a, b| a.id.cmp(&b.id));
    assert_eq!(original, replica);
}

#[test]
fn without_a_session_both_directions_are_no_ops() {
    let (store, _tmp) = create_store();
    store.upsert(journal("2025-01-01", "unsynced")).unwrap();

    let remote = Arc::new(MemoryRemote::new());
    let reconciler = SyncReconciler::new(store.clone(), remote.clone(), None);

    assert_eq!(reconciler.push_changes().unwrap(), 0);
    assert_eq!(reconciler.pull_changes().unwrap(), 0);
    assert_eq!(remote.row_count(), 0);
    assert_eq!(store.total(), 1);
}

#[test]
fn pull_overwrites_local_edits_on_id_conflict() {
    let (store, _tmp) = create_store();
    let block = journal("2025-01-01", "local edit");
    store.upsert(block.clone()).unwrap();

    let mut remote_copy = block.clone();
    remote_copy.content = Some("remote edit".to_string());
    let remote = Arc::new(MemoryRemote::new());
    remote.insert_row(RemoteRow::from_block(&remote_copy, "u1"));

    let reconciler = SyncReconciler::new(store.clone(), remote, Some(session("u1")));
    assert_eq!(reconciler.pull_changes().unwrap(), 1);

    // whichever direction ran last wins, even if local was newer
    let stored = store.get(&block.id).unwrap();
    assert_eq!(stored.content.as_deref(), Some("remote edit"));
    assert_eq!(store.total(), 1);
}

#[test]
fn repeated_pushes_do_not_duplicate_remote_rows() {
    let (store, _tmp) = create_store();
    let block = journal("2025-01-01", "v1");
    store.upsert(block.clone()).unwrap();

    let remote = Arc::new(MemoryRemote::new());
    let reconciler = SyncReconciler::new(store.clone(), remote.clone(), Some(session("u1")));
    reconciler.push_changes().unwrap();

    store
        .update(
            &block.id,
            BlockUpdate {
                content: Some("v2".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    reconciler.push_changes().unwrap();

    assert_eq!(remote.row_count(), 1);
    let rows = {
        use crate::sync::RemoteStore;
        remote.fetch_rows("u1").unwrap()
    };
    assert_eq!(rows[0].content.as_deref(), Some("v2"));
}

#[test]
fn identities_do_not_see_each_other_s_rows() {
    let (store_a, _tmp_a) = create_store();
    store_a.upsert(journal("2025-01-01", "alice only")).unwrap();

    let remote = Arc::new(MemoryRemote::new());
    SyncReconciler::new(store_a, remote.clone(), Some(session("alice")))
        .push_changes()
        .unwrap();

    let (store_b, _tmp_b) = create_store();
    let pulled = SyncReconciler::new(store_b.clone(), remote, Some(session("bob")))
        .pull_changes()
        .unwrap();
    assert_eq!(pulled, 0);
    assert_eq!(store_b.total(), 0);
}

#[test]
fn full_sync_pulls_before_pushing() {
    let (store, _tmp) = create_store();
    let local_only = journal("2025-01-02", "written offline");
    store.upsert(local_only.clone()).unwrap();

    let remote = Arc::new(MemoryRemote::new());
    let from_other_device = journal("2025-01-01", "from the phone");
    remote.insert_row(RemoteRow::from_block(&from_other_device, "u1"));

    let reconciler = SyncReconciler::new(store.clone(), remote.clone(), Some(session("u1")));
    let (pulled, pushed) = reconciler.sync().unwrap();

    assert_eq!(pulled, 1);
    // push runs after pull, so it re-uploads the pulled block too
    assert_eq!(pushed, 2);
    assert_eq!(store.total(), 2);
    assert_eq!(remote.row_count(), 2);
}
