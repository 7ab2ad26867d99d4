use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use sav_diff::{structural_diff, structural_diff_with_additions, Diff, Structural};
use tracing::{debug, info, warn};

use crate::gate::{check_discard_gate, DiscardGate};
use crate::{
    DiffMode, PersistenceSink, SavableError, SavableOptions, SaveOutcome, SaveState,
    SnapshotProvider,
};

/// Editing session over one persisted entity.
///
/// All operations take `&self`, so a session can be shared (`Arc`) between
/// the code that edits it and the code that saves it. The snapshot state is
/// behind a mutex that is never held across an `.await`; the only suspension
/// point is the sink call inside [`Savable::save`].
pub struct Savable<P, S>
where
    P: SnapshotProvider,
    S: PersistenceSink<Value = P::Value>,
{
    provider: P,
    sink: S,
    options: SavableOptions,
    state: Mutex<EditState<P::Value>>,
    saving: AtomicBool,
}

struct EditState<V> {
    saved: V,
    current: V,
    /// Top-level key set established at construction.
    shape: BTreeSet<String>,
    /// Bumped on every mutation of `saved` or `current`.
    version: u64,
    memo: Option<(u64, Diff<V>)>,
}

impl<V: Structural> EditState<V> {
    fn touch(&mut self) {
        self.version += 1;
    }

    fn changes(&mut self, mode: DiffMode) -> &Diff<V> {
        if self.memo.as_ref().map_or(false, |(v, _)| *v != self.version) {
            self.memo = None;
        }
        let version = self.version;
        let (saved, current) = (&self.saved, &self.current);
        &self
            .memo
            .get_or_insert_with(|| {
                let diff = match mode {
                    DiffMode::BaselineKeys => structural_diff(saved, current),
                    DiffMode::WithAdditions => structural_diff_with_additions(saved, current),
                };
                (version, diff)
            })
            .1
    }
}

/// An `edit` in progress. Current is put back on drop unless committed, so a
/// panicking closure leaves the session as it was.
struct PendingEdit<'a, V> {
    st: MutexGuard<'a, EditState<V>>,
    before: Option<V>,
}

impl<'a, V: Structural> PendingEdit<'a, V> {
    fn begin(st: MutexGuard<'a, EditState<V>>) -> Self {
        let before = Some(st.current.clone());
        Self { st, before }
    }

    fn commit(&mut self) {
        self.before = None;
        self.st.touch();
    }
}

impl<V> Drop for PendingEdit<'_, V> {
    fn drop(&mut self) {
        if let Some(before) = self.before.take() {
            self.st.current = before;
        }
    }
}

/// Released on every exit path of `save`, including a dropped future.
struct SavingGuard<'a>(&'a AtomicBool);

impl<'a> SavingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for SavingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn key_set<V: Structural>(v: &V) -> BTreeSet<String> {
    v.keys().into_iter().map(str::to_string).collect()
}

fn check_shape<V: Structural>(expected: &BTreeSet<String>, v: &V) -> Result<(), SavableError> {
    let actual = key_set(v);
    if &actual == expected {
        return Ok(());
    }
    Err(SavableError::ShapeMismatch {
        missing: expected.difference(&actual).cloned().collect(),
        unexpected: actual.difference(expected).cloned().collect(),
    })
}

impl<P, S> Savable<P, S>
where
    P: SnapshotProvider,
    S: PersistenceSink<Value = P::Value>,
{
    /// Open a session with default options.
    pub fn new(provider: P, sink: S) -> Result<Self, SavableError> {
        Self::with_options(provider, sink, SavableOptions::default())
    }

    /// Open a session: read Saved once from the provider, Current := copy.
    pub fn with_options(provider: P, sink: S, options: SavableOptions) -> Result<Self, SavableError> {
        let saved = provider.snapshot().map_err(SavableError::Provider)?;
        if !saved.is_mapping() {
            return Err(SavableError::NotAMapping);
        }
        let shape = key_set(&saved);
        let current = saved.clone();

        debug!(fields = shape.len(), ?options, "editing session opened");

        Ok(Self {
            provider,
            sink,
            options,
            state: Mutex::new(EditState {
                saved,
                current,
                shape,
                version: 0,
                memo: None,
            }),
            saving: AtomicBool::new(false),
        })
    }

    fn lock(&self) -> MutexGuard<'_, EditState<P::Value>> {
        // Poisoning only happens when an `edit` closure panics, and
        // `PendingEdit` has restored Current by then.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn options(&self) -> &SavableOptions {
        &self.options
    }

    pub fn state(&self) -> SaveState {
        if self.is_saving() {
            SaveState::Saving
        } else {
            SaveState::Idle
        }
    }

    pub fn is_saving(&self) -> bool {
        self.saving.load(Ordering::Acquire)
    }

    /// Copy of the Saved snapshot.
    pub fn saved(&self) -> P::Value {
        self.lock().saved.clone()
    }

    /// Copy of the Current working snapshot.
    pub fn current(&self) -> P::Value {
        self.lock().current.clone()
    }

    /// Mutation counter; changes whenever Saved or Current changes.
    pub fn version(&self) -> u64 {
        self.lock().version
    }

    /// Top-level fields `set_field` accepts: the key set established at
    /// construction, or Current's key set when `enforce_shape` is off.
    pub fn fields(&self) -> Vec<String> {
        self.lock().shape.iter().cloned().collect()
    }

    /// Patch Saved -> Current. Memoized until the next mutation.
    pub fn changes(&self) -> Diff<P::Value> {
        self.lock().changes(self.options.diff_mode).clone()
    }

    pub fn has_changes(&self) -> bool {
        self.lock().changes(self.options.diff_mode).is_changed()
    }

    /// Check before tearing the session down.
    pub fn discard_gate(&self) -> DiscardGate {
        let saving = self.is_saving();
        let mut st = self.lock();
        let changes = st.changes(self.options.diff_mode);
        check_discard_gate(saving, changes)
    }

    /// Set one top-level field of Current.
    ///
    /// Unknown keys are rejected: the key set is fixed for the session.
    pub fn set_field(&self, key: &str, value: P::Value) -> Result<(), SavableError> {
        let mut st = self.lock();
        if !st.shape.contains(key) {
            return Err(SavableError::UnknownField(key.to_string()));
        }
        st.current.set_field(key, value);
        st.touch();
        debug!(field = key, version = st.version, "field edited");
        Ok(())
    }

    /// Mutate Current in place.
    ///
    /// The closure runs under the session lock and must not call back into
    /// this session. If the edit leaves a non-mapping root, or changes the
    /// top-level key set while `enforce_shape` is on, it is rolled back and
    /// an error is returned. A panicking closure is rolled back too.
    pub fn edit<R>(&self, f: impl FnOnce(&mut P::Value) -> R) -> Result<R, SavableError> {
        let mut pending = PendingEdit::begin(self.lock());
        let out = f(&mut pending.st.current);

        let verdict = if !pending.st.current.is_mapping() {
            Err(SavableError::NotAMapping)
        } else if self.options.enforce_shape {
            check_shape(&pending.st.shape, &pending.st.current)
        } else {
            pending.st.shape = key_set(&pending.st.current);
            Ok(())
        };
        if let Err(e) = verdict {
            drop(pending);
            warn!(error = %e, "edit rolled back");
            return Err(e);
        }

        pending.commit();
        debug!(version = pending.st.version, "current edited");
        Ok(out)
    }

    /// Persist the pending patch.
    ///
    /// - A save already in flight makes this call a no-op
    ///   ([`SaveOutcome::AlreadySaving`]); it is not queued.
    /// - An empty patch never reaches the sink ([`SaveOutcome::NoChanges`]).
    /// - Otherwise the sink is called exactly once. On failure Saved is left
    ///   untouched and the sink's error is returned.
    /// - On success Saved is only re-read when `refresh_after_save` is set.
    ///   Edits made while the sink was running stay pending either way.
    pub async fn save(&self) -> Result<SaveOutcome, SavableError> {
        let Some(_guard) = SavingGuard::acquire(&self.saving) else {
            debug!("save already in flight; request dropped");
            return Ok(SaveOutcome::AlreadySaving);
        };

        let pending = self.changes().into_patch();
        let Some(patch) = pending else {
            debug!("no changes; sink not called");
            return Ok(SaveOutcome::NoChanges);
        };

        let fields = patch.len();
        let pointers = patch.leaf_pointers();
        debug!(fields, ?pointers, "persisting patch");

        if let Err(err) = self.sink.persist(patch).await {
            warn!(error = %err, fields, "persist failed; saved snapshot untouched");
            return Err(SavableError::Sink(err));
        }

        if self.options.refresh_after_save {
            if let Err(e) = self.refresh() {
                warn!(error = %e, "patch persisted but baseline refresh failed");
                return Err(e);
            }
        }

        info!(fields, ?pointers, "patch persisted");
        Ok(SaveOutcome::Saved { fields })
    }

    /// Discard all edits: Saved and Current := a fresh provider read.
    ///
    /// Allowed while a save is in flight.
    pub fn reset(&self) -> Result<(), SavableError> {
        let fresh = self.fetch()?;
        let mut st = self.lock();
        if !self.options.enforce_shape {
            st.shape = key_set(&fresh);
        }
        st.current = fresh.clone();
        st.saved = fresh;
        st.touch();
        debug!(version = st.version, "session reset");
        Ok(())
    }

    /// Re-sync the baseline only: Saved := a fresh provider read.
    ///
    /// Current keeps its edits (and so its key set); changes are recomputed
    /// against the new baseline, so edits the backing store already holds
    /// stop being pending.
    pub fn refresh(&self) -> Result<(), SavableError> {
        let fresh = self.fetch()?;
        let mut st = self.lock();
        st.saved = fresh;
        st.touch();
        debug!(version = st.version, "baseline refreshed");
        Ok(())
    }

    fn fetch(&self) -> Result<P::Value, SavableError> {
        let fresh = self.provider.snapshot().map_err(|e| {
            warn!(error = %e, "snapshot provider failed");
            SavableError::Provider(e)
        })?;
        if !fresh.is_mapping() {
            return Err(SavableError::NotAMapping);
        }
        if self.options.enforce_shape {
            check_shape(&self.lock().shape, &fresh)?;
        }
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sav_diff::Patch;
    use serde_json::{json, Value};
    use std::sync::Arc;

    /// Sink that records every patch it receives.
    #[derive(Clone, Default)]
    struct Spy {
        calls: Arc<Mutex<Vec<Patch<Value>>>>,
        fail: bool,
    }

    #[async_trait]
    impl PersistenceSink for Spy {
        type Value = Value;

        async fn persist(&self, patch: Patch<Value>) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(patch);
            if self.fail {
                anyhow::bail!("write refused");
            }
            Ok(())
        }
    }

    fn fixed(v: Value) -> impl Fn() -> anyhow::Result<Value> + Send + Sync {
        move || Ok(v.clone())
    }

    fn doc() -> Value {
        json!({"name": "pack", "meta": {"tags": ["a"], "public": false}, "downloads": 0})
    }

    #[test]
    fn fresh_session_has_no_changes() {
        let s = Savable::new(fixed(doc()), Spy::default()).unwrap();
        assert!(!s.has_changes());
        assert_eq!(s.changes(), Diff::Unchanged);
        assert_eq!(s.current(), s.saved());
        assert_eq!(s.state(), SaveState::Idle);
        assert_eq!(s.fields(), vec!["downloads", "meta", "name"]);
    }

    #[test]
    fn non_mapping_root_is_rejected() {
        let err = Savable::new(fixed(json!([1, 2])), Spy::default()).err().unwrap();
        assert!(matches!(err, SavableError::NotAMapping));
    }

    #[test]
    fn provider_failure_fails_construction() {
        let provider = || -> anyhow::Result<Value> { anyhow::bail!("offline") };
        let err = Savable::new(provider, Spy::default()).err().unwrap();
        assert!(matches!(err, SavableError::Provider(_)));
    }

    #[test]
    fn set_field_flips_has_changes_and_back() {
        let s = Savable::new(fixed(doc()), Spy::default()).unwrap();
        s.set_field("name", json!("renamed")).unwrap();
        assert!(s.has_changes());

        s.set_field("name", json!("pack")).unwrap();
        assert!(!s.has_changes());
    }

    #[test]
    fn editing_current_never_touches_saved() {
        let s = Savable::new(fixed(doc()), Spy::default()).unwrap();
        s.edit(|v| v["meta"]["tags"].as_array_mut().unwrap().push(json!("b")))
            .unwrap();
        assert_eq!(s.saved(), doc());
        assert_eq!(
            serde_json::to_value(s.changes()).unwrap(),
            json!({"meta": {"tags": ["a", "b"]}})
        );
    }

    #[test]
    fn unknown_field_is_rejected() {
        let s = Savable::new(fixed(doc()), Spy::default()).unwrap();
        let err = s.set_field("nope", json!(1)).unwrap_err();
        assert!(matches!(err, SavableError::UnknownField(k) if k == "nope"));
        assert!(!s.has_changes());
    }

    #[test]
    fn shape_changing_edit_is_rolled_back() {
        let s = Savable::new(fixed(doc()), Spy::default()).unwrap();
        let err = s
            .edit(|v| {
                v.as_object_mut().unwrap().insert("extra".into(), json!(1));
                v["name"] = json!("changed");
            })
            .unwrap_err();
        assert!(matches!(err, SavableError::ShapeMismatch { .. }));
        assert_eq!(s.current(), doc());

        let err = s.edit(|v| *v = json!(null)).unwrap_err();
        assert!(matches!(err, SavableError::NotAMapping));
        assert_eq!(s.current(), doc());
    }

    #[test]
    fn panicking_edit_is_rolled_back() {
        let s = Savable::new(fixed(json!({"a": 1})), Spy::default()).unwrap();
        assert!(!s.has_changes());

        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            s.edit(|v| {
                v["a"] = json!(2);
                panic!("edit aborted");
            })
        }));
        assert!(res.is_err());

        assert_eq!(s.current(), s.saved());
        assert!(!s.has_changes());

        // The session stays usable after the poisoned lock.
        s.set_field("a", json!(3)).unwrap();
        assert!(s.has_changes());
    }

    #[test]
    fn additions_are_visible_when_shape_is_not_enforced() {
        let options = SavableOptions {
            diff_mode: DiffMode::WithAdditions,
            enforce_shape: false,
            ..SavableOptions::default()
        };
        let s = Savable::with_options(fixed(doc()), Spy::default(), options).unwrap();
        s.edit(|v| v["added"] = json!(true)).unwrap();
        assert_eq!(
            serde_json::to_value(s.changes()).unwrap(),
            json!({"added": true})
        );
        assert!(!s.options().enforce_shape);

        // The key set follows Current when shape is not enforced.
        assert!(s.fields().contains(&"added".to_string()));
        s.set_field("added", json!(false)).unwrap();
        assert_eq!(s.current()["added"], json!(false));
    }

    #[test]
    fn version_moves_on_every_mutation() {
        let s = Savable::new(fixed(doc()), Spy::default()).unwrap();
        let v0 = s.version();
        s.set_field("downloads", json!(1)).unwrap();
        let v1 = s.version();
        assert!(v1 > v0);

        // Reads do not mutate.
        let _ = s.changes();
        let _ = s.has_changes();
        assert_eq!(s.version(), v1);

        s.reset().unwrap();
        assert!(s.version() > v1);
    }

    #[tokio::test]
    async fn save_without_changes_skips_sink() {
        let spy = Spy::default();
        let s = Savable::new(fixed(doc()), spy.clone()).unwrap();
        assert_eq!(s.save().await.unwrap(), SaveOutcome::NoChanges);
        assert!(spy.calls.lock().unwrap().is_empty());
        assert!(!s.is_saving());
    }

    #[tokio::test]
    async fn save_sends_only_changed_fields() {
        let spy = Spy::default();
        let s = Savable::new(fixed(doc()), spy.clone()).unwrap();
        s.edit(|v| v["meta"]["public"] = json!(true)).unwrap();

        assert_eq!(s.save().await.unwrap(), SaveOutcome::Saved { fields: 1 });
        let calls = spy.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].leaf_pointers(), vec!["/meta/public"]);

        // Saved is not refreshed by default.
        assert_eq!(s.saved(), doc());
        assert!(s.has_changes());
    }

    #[tokio::test]
    async fn sink_failure_propagates_and_clears_saving() {
        let spy = Spy {
            fail: true,
            ..Spy::default()
        };
        let s = Savable::new(fixed(doc()), spy).unwrap();
        s.set_field("downloads", json!(5)).unwrap();

        let err = s.save().await.unwrap_err();
        assert!(matches!(&err, SavableError::Sink(e) if e.to_string() == "write refused"));
        assert!(!s.is_saving());
        assert_eq!(s.saved(), doc());
        assert!(s.has_changes());
    }

    #[tokio::test]
    async fn discard_gate_reports_pending_edits() {
        let s = Savable::new(fixed(doc()), Spy::default()).unwrap();
        assert!(s.discard_gate().is_clear());
        s.set_field("name", json!("x")).unwrap();
        assert_eq!(
            s.discard_gate(),
            DiscardGate::PendingChanges {
                pointers: vec!["/name".to_string()]
            }
        );
    }
}
