use sav_engine::{Savable, SavableError};
use sav_testkit::{MemoryStore, RecordingSink};
use serde_json::json;

/// scenario_has_changes_tracks_edits
///
/// Validates:
/// 1) A fresh session (Current == Saved) has no changes.
/// 2) Editing any field to a different value flips has_changes on.
/// 3) Editing it back to the saved value flips it off again.
/// 4) reset() discards edits: Current equals a fresh provider read.

#[test]
fn fresh_session_has_no_changes_and_edits_flip_it() -> anyhow::Result<()> {
    let store = MemoryStore::new(json!({"title": "draft", "meta": {"tags": ["a"], "pinned": false}}));
    let session = Savable::new(store.clone(), RecordingSink::new())?;

    assert!(!session.has_changes());
    assert!(!session.changes().is_changed());

    session.edit(|doc| doc["meta"]["pinned"] = json!(true))?;
    assert!(session.has_changes());
    assert_eq!(session.changes().into_patch().unwrap().leaf_pointers(), vec!["/meta/pinned"]);

    session.edit(|doc| doc["meta"]["pinned"] = json!(false))?;
    assert!(!session.has_changes(), "restoring the saved value clears the change");

    Ok(())
}

#[test]
fn reset_discards_edits_and_rereads_provider() -> anyhow::Result<()> {
    let store = MemoryStore::new(json!({"title": "draft", "count": 1}));
    let session = Savable::new(store.clone(), RecordingSink::new())?;

    session.set_field("title", json!("edited"))?;
    assert!(session.has_changes());

    // Another writer changes the backing document before the reset.
    store.replace(json!({"title": "upstream", "count": 2}));
    session.reset()?;

    assert_eq!(session.current(), store.document());
    assert_eq!(session.saved(), store.document());
    assert!(!session.has_changes());
    assert_eq!(store.reads(), 2, "construction + reset");

    Ok(())
}

#[test]
fn unknown_top_level_field_is_rejected() -> anyhow::Result<()> {
    let store = MemoryStore::new(json!({"title": "draft"}));
    let session = Savable::new(store, RecordingSink::new())?;

    let err = session.set_field("subtitle", json!("x")).unwrap_err();
    assert!(matches!(err, SavableError::UnknownField(ref k) if k == "subtitle"));
    assert!(!session.has_changes());

    Ok(())
}
