use rustfiledb::{Record, RecordMeta, Store, StoreConfig, impl_record};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tempfile::TempDir;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Note {
    #[serde(flatten)]
    meta: RecordMeta,
    slug: String,
    body: String,
}

impl_record!(Note, meta, slug: String);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Tag {
    #[serde(flatten)]
    meta: RecordMeta,
    code: u32,
}

impl_record!(Tag, meta, code: u32);

fn note(slug: &str, body: &str) -> Note {
    Note {
        meta: RecordMeta::new(),
        slug: slug.to_string(),
        body: body.to_string(),
    }
}

fn config(dir: &TempDir) -> StoreConfig {
    StoreConfig::new("archived", dir.path())
        .table_for::<Note>()
        .table_for::<Tag>()
}

fn read_archive(dir: &TempDir) -> HashMap<Uuid, serde_json::Value> {
    let path = dir.path().join("archived").join("archive.db");
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[tokio::test]
async fn test_archive_keeps_last_written_version() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(config(&dir)).await.unwrap();

    let mut draft = note("intro", "first draft");
    store.upsert_one(&mut draft, false).await;
    let mut edit = note("intro", "second draft");
    store.upsert_one(&mut edit, false).await;

    let archived: Note = store.archived(draft.id()).await.unwrap();
    assert_eq!(archived.body, "second draft");
    assert_eq!(archived, edit);

    let on_disk = read_archive(&dir);
    assert_eq!(on_disk.len(), 1);
    assert_eq!(on_disk[&draft.id()]["body"], "second draft");
}

#[tokio::test]
async fn test_archive_spans_tables() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(config(&dir)).await.unwrap();

    let mut notes = vec![note("a", "A"), note("b", "B")];
    let mut tags = vec![Tag {
        meta: RecordMeta::new(),
        code: 42,
    }];
    store.upsert_many(&mut notes, false).await;
    store.upsert_many(&mut tags, false).await;

    let on_disk = read_archive(&dir);
    assert_eq!(on_disk.len(), 3);
    assert_eq!(on_disk[&tags[0].id()]["code"], 42);

    let tag: Tag = store.archived(tags[0].id()).await.unwrap();
    assert_eq!(tag.code, 42);
}

#[tokio::test]
async fn test_archive_keeps_hard_deleted_records() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(config(&dir)).await.unwrap();

    let mut gone = note("gone", "soon deleted");
    store.upsert_one(&mut gone, false).await;
    store.delete::<Note>(gone.id(), false).await;

    assert!(store.get_all::<Note>(true).await.is_empty());
    let archived: Option<Note> = store.archived(gone.id()).await;
    assert_eq!(archived.map(|n| n.body), Some("soon deleted".to_string()));
}

#[tokio::test]
async fn test_archive_history_survives_restart() {
    let dir = TempDir::new().unwrap();
    let first_id = {
        let store = Store::open(config(&dir)).await.unwrap();
        let mut first = note("one", "from the first session");
        store.upsert_one(&mut first, false).await;
        store.release_all().await;
        first.id()
    };

    let store = Store::open(config(&dir)).await.unwrap();
    let mut second = note("two", "from the second session");
    store.upsert_one(&mut second, false).await;

    let on_disk = read_archive(&dir);
    assert_eq!(on_disk.len(), 2);
    assert!(on_disk.contains_key(&first_id));
    assert!(on_disk.contains_key(&second.id()));
}

#[tokio::test]
async fn test_archive_lookup_before_any_write_reads_disk() {
    let dir = TempDir::new().unwrap();
    let id = {
        let store = Store::open(config(&dir)).await.unwrap();
        let mut kept = note("kept", "on disk");
        store.upsert_one(&mut kept, false).await;
        store.release_all().await;
        kept.id()
    };

    let store = Store::open(config(&dir)).await.unwrap();
    let archived: Option<Note> = store.archived(id).await;
    assert_eq!(archived.map(|n| n.slug), Some("kept".to_string()));
    assert!(store.archived::<Note>(Uuid::new_v4()).await.is_none());
}
