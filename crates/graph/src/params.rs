//! Per-object parameter storage.
//!
//! Nodes and ports keep a bag of identified parameter blobs together with a
//! fixed array of info slots for the well-known ids. The info slots carry the
//! change protocol: every mutation toggles the SERIAL bit and bumps the user
//! counter, and the owning object's change mask gains the params bit until
//! the info is re-emitted.

use core::fmt;

use anyhow::{Context as _, Result, bail};
use pod::Value;
use runtime::flags::{ParamBlobFlag, ParamFlag};
use runtime::id;

/// A single stored parameter value.
#[derive(Debug, Clone)]
pub struct ParamBlob {
    pub id: id::Param,
    pub flags: ParamBlobFlag,
    pub value: Value,
}

/// Availability information of one parameter id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamInfo {
    pub id: id::Param,
    pub flags: ParamFlag,
    /// Change counter, bumped on every mutation of the id.
    pub user: u32,
    /// The store holds every enumerable value of this id.
    pub cached: bool,
}

impl ParamInfo {
    /// Construct info for the given id.
    pub fn new(id: id::Param, flags: ParamFlag) -> Self {
        Self {
            id,
            flags,
            user: 0,
            cached: false,
        }
    }
}

/// An ordered bag of parameter blobs with per-id info slots.
pub struct ParamStore {
    params: Vec<ParamBlob>,
    infos: Vec<ParamInfo>,
    /// Results of an in-flight delegated enumeration.
    pending: Vec<ParamBlob>,
    pending_id: Option<id::Param>,
    changed: bool,
}

impl ParamStore {
    /// Construct a new store advertising the given ids.
    pub fn new(infos: impl IntoIterator<Item = ParamInfo>) -> Self {
        Self {
            params: Vec::new(),
            infos: infos.into_iter().collect(),
            pending: Vec::new(),
            pending_id: None,
            changed: false,
        }
    }

    /// The advertised info slots.
    pub fn infos(&self) -> &[ParamInfo] {
        &self.infos
    }

    /// Find the info slot of an id.
    pub fn info(&self, id: id::Param) -> Option<&ParamInfo> {
        self.infos.iter().find(|i| i.id == id)
    }

    fn info_mut(&mut self, id: id::Param) -> Option<&mut ParamInfo> {
        self.infos.iter_mut().find(|i| i.id == id)
    }

    /// Declare an id, keeping an existing slot.
    pub fn declare(&mut self, id: id::Param, flags: ParamFlag) {
        if let Some(info) = self.info_mut(id) {
            info.flags = flags;
        } else {
            self.infos.push(ParamInfo::new(id, flags));
        }
    }

    /// Take the accumulated change state.
    pub fn take_changed(&mut self) -> bool {
        core::mem::take(&mut self.changed)
    }

    /// Add a parameter blob.
    ///
    /// With `id::Param::INVALID` the id embedded in the param object is used;
    /// a non-object value fails then.
    pub fn add(&mut self, id: id::Param, flags: ParamBlobFlag, value: Value) -> Result<id::Param> {
        let id = if id == id::Param::INVALID {
            let Some(obj) = value.as_object() else {
                bail!("Cannot derive a param id from a non-object value");
            };

            id::Param::from_id(obj.object_id)
        } else {
            id
        };

        self.params.push(ParamBlob { id, flags, value });
        self.mark_changed(id);
        Ok(id)
    }

    /// Clear blobs of one id, or all of them.
    ///
    /// Blobs flagged `LOCKED` survive a bulk clear.
    pub fn clear(&mut self, id: Option<id::Param>) {
        let mut touched = Vec::new();

        self.params.retain(|p| {
            let remove = match id {
                Some(id) => p.id == id,
                None => !p.flags.contains(ParamBlobFlag::LOCKED),
            };

            if remove && !touched.contains(&p.id) {
                touched.push(p.id);
            }

            !remove
        });

        for id in touched {
            self.mark_changed(id);

            if let Some(info) = self.info_mut(id) {
                info.cached = false;
                info.flags &= !ParamFlag::READ;
            }
        }
    }

    /// Iterate the stored blobs of one id.
    pub fn iter(&self, id: id::Param) -> impl Iterator<Item = &ParamBlob> {
        self.params.iter().filter(move |p| p.id == id)
    }

    /// Test whether enumeration of `id` is served locally.
    pub fn is_cached(&self, id: id::Param) -> bool {
        self.info(id).is_some_and(|i| i.cached)
    }

    /// Mark an id as completely enumerated.
    pub fn set_cached(&mut self, id: id::Param) {
        if let Some(info) = self.info_mut(id) {
            info.cached = true;
            info.flags |= ParamFlag::READ;
        }
    }

    /// Enumerate matching params of `id` from the local store.
    ///
    /// Skips indexes below `start`, applies the structural filter, and stops
    /// after `count` matches. The callback receives `(index, next, value)`.
    pub fn enumerate(
        &self,
        id: id::Param,
        start: u32,
        count: u32,
        filter: Option<&Value>,
        mut callback: impl FnMut(u32, u32, Value),
    ) -> Result<u32> {
        self.info(id)
            .with_context(|| format!("Unknown param id {id:?}"))?;

        let count = if count == 0 { u32::MAX } else { count };
        let mut index = 0;
        let mut matched = 0;

        for blob in self.iter(id) {
            let current = index;
            index += 1;

            if current < start {
                continue;
            }

            // A blob the filter rejects is skipped, not an error.
            let Ok(value) = pod::filter(&blob.value, filter) else {
                continue;
            };

            callback(current, index, value);
            matched += 1;

            if matched == count {
                break;
            }
        }

        Ok(matched)
    }

    /// Begin collecting the results of a delegated enumeration.
    pub fn begin_pending(&mut self, id: id::Param) {
        self.pending.clear();
        self.pending_id = Some(id);
    }

    /// Record one result of a delegated enumeration.
    pub fn push_pending(&mut self, id: id::Param, value: Value) {
        if self.pending_id == Some(id) {
            self.pending.push(ParamBlob {
                id,
                flags: ParamBlobFlag::NONE,
                value,
            });
        }
    }

    /// Atomically replace the cache of the pending id with the collected
    /// results and mark it complete.
    pub fn commit_pending(&mut self) {
        let Some(id) = self.pending_id.take() else {
            return;
        };

        self.params.retain(|p| p.id != id);
        self.params.append(&mut self.pending);
        self.set_cached(id);
        self.mark_changed(id);
    }

    /// Drop an in-flight pending collection.
    pub fn abort_pending(&mut self) {
        self.pending.clear();
        self.pending_id = None;
    }

    fn mark_changed(&mut self, id: id::Param) {
        self.changed = true;

        if let Some(info) = self.info_mut(id) {
            info.flags ^= ParamFlag::SERIAL;
            info.user = info.user.wrapping_add(1);
        }
    }
}

impl fmt::Debug for ParamStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamStore")
            .field("params", &self.params.len())
            .field("infos", &self.infos)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pod::ObjectBuilder;
    use runtime::flags::ParamFlag;

    fn store() -> ParamStore {
        ParamStore::new([
            ParamInfo::new(id::Param::ENUM_FORMAT, ParamFlag::READ),
            ParamInfo::new(id::Param::FORMAT, ParamFlag::READWRITE),
        ])
    }

    fn format(rate: i32) -> Value {
        ObjectBuilder::new(
            id::ObjectType::FORMAT.into_id(),
            id::Param::ENUM_FORMAT.into_id(),
        )
        .property(id::Format::AUDIO_RATE.into_id(), rate)
        .build_value()
    }

    #[test]
    fn add_assigns_embedded_id() {
        let mut store = store();

        let id = store
            .add(id::Param::INVALID, ParamBlobFlag::NONE, format(48000))
            .unwrap();

        assert_eq!(id, id::Param::ENUM_FORMAT);
        assert_eq!(store.iter(id::Param::ENUM_FORMAT).count(), 1);
    }

    #[test]
    fn add_non_object_without_id_fails() {
        let mut store = store();

        assert!(
            store
                .add(id::Param::INVALID, ParamBlobFlag::NONE, Value::Int(1))
                .is_err()
        );
    }

    #[test]
    fn clear_updates_change_protocol() {
        let mut store = store();

        store
            .add(id::Param::FORMAT, ParamBlobFlag::NONE, format(48000))
            .unwrap();
        store.take_changed();

        let before = store.info(id::Param::FORMAT).unwrap().user;
        store.clear(Some(id::Param::FORMAT));

        assert!(store.take_changed());
        let info = store.info(id::Param::FORMAT).unwrap();
        assert_eq!(info.user, before.wrapping_add(1));
        assert!(!info.flags.contains(ParamFlag::READ));
        assert_eq!(store.iter(id::Param::FORMAT).count(), 0);
    }

    #[test]
    fn serial_flag_toggles() {
        let mut store = store();

        let s0 = store.info(id::Param::FORMAT).unwrap().flags;
        store
            .add(id::Param::FORMAT, ParamBlobFlag::NONE, format(48000))
            .unwrap();
        let s1 = store.info(id::Param::FORMAT).unwrap().flags;

        assert_ne!(
            s0.contains(ParamFlag::SERIAL),
            s1.contains(ParamFlag::SERIAL)
        );
    }

    #[test]
    fn locked_blobs_survive_bulk_clear() {
        let mut store = store();

        store
            .add(id::Param::FORMAT, ParamBlobFlag::LOCKED, format(48000))
            .unwrap();
        store
            .add(id::Param::ENUM_FORMAT, ParamBlobFlag::NONE, format(44100))
            .unwrap();

        store.clear(None);

        assert_eq!(store.iter(id::Param::FORMAT).count(), 1);
        assert_eq!(store.iter(id::Param::ENUM_FORMAT).count(), 0);
    }

    #[test]
    fn enumerate_indexes_monotonically() {
        let mut store = store();

        for rate in [8000, 44100, 48000] {
            store
                .add(id::Param::ENUM_FORMAT, ParamBlobFlag::NONE, format(rate))
                .unwrap();
        }

        let mut seen = Vec::new();
        store
            .enumerate(id::Param::ENUM_FORMAT, 0, 0, None, |index, next, _| {
                seen.push((index, next));
            })
            .unwrap();

        assert_eq!(seen, [(0, 1), (1, 2), (2, 3)]);
    }

    #[test]
    fn enumerate_start_and_count() {
        let mut store = store();

        for rate in [8000, 44100, 48000] {
            store
                .add(id::Param::ENUM_FORMAT, ParamBlobFlag::NONE, format(rate))
                .unwrap();
        }

        let mut seen = Vec::new();
        store
            .enumerate(id::Param::ENUM_FORMAT, 1, 1, None, |index, _, value| {
                seen.push((index, value));
            })
            .unwrap();

        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, 1);
    }

    #[test]
    fn pending_replaces_cache() {
        let mut store = store();

        store
            .add(id::Param::ENUM_FORMAT, ParamBlobFlag::NONE, format(8000))
            .unwrap();

        store.begin_pending(id::Param::ENUM_FORMAT);
        store.push_pending(id::Param::ENUM_FORMAT, format(44100));
        store.push_pending(id::Param::ENUM_FORMAT, format(48000));
        store.commit_pending();

        assert!(store.is_cached(id::Param::ENUM_FORMAT));

        let mut rates = Vec::new();
        store
            .enumerate(id::Param::ENUM_FORMAT, 0, 0, None, |_, _, value| {
                let rate = value
                    .as_object()
                    .unwrap()
                    .value(id::Format::AUDIO_RATE.into_id())
                    .unwrap()
                    .as_int()
                    .unwrap();
                rates.push(rate);
            })
            .unwrap();

        assert_eq!(rates, [44100, 48000]);
    }
}
