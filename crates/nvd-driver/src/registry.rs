//! Typed handle table for every client-visible object (Config, Context,
//! Surface, Buffer, Image).
//!
//! Mirrors the teacher's `DecoderPool` shape — a `Mutex<HashMap<Id, Entry>>`
//! plus a monotonically increasing id counter — generalized from "one file
//! keyed by generated id" to "any typed object keyed by generated id",
//! since the driver needs one handle space shared across five object kinds
//! rather than one keyed by caller-supplied file id.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// `id == 0` is reserved to mean "no object" (`INVALID_ID`).
pub const INVALID_ID: u32 = 0;

/// The kind of object behind a handle. Every lookup checks this against the
/// caller's expected kind — a lookup for a Surface id that happens to
/// collide with a Buffer id's bit pattern can never occur (ids are unique
/// across all kinds), but a caller asking for the wrong kind on a valid id
/// must still fail.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Config,
    Context,
    Surface,
    Buffer,
    Image,
}

struct Entry {
    kind: ObjectKind,
    payload: Arc<dyn Any + Send + Sync>,
}

/// The registry itself. One instance lives per Driver Instance.
///
/// Lookups never allocate and never suspend; all mutation — insertion and
/// removal — is serialized by the same mutex that protects the map, so a
/// `lookup` racing an `allocate`/`delete` always observes a consistent
/// snapshot.
#[derive(Default)]
pub struct Registry {
    inner: Mutex<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    objects: HashMap<u32, Entry>,
    next_id: u32,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                objects: HashMap::new(),
                next_id: 1,
            }),
        }
    }

    /// Allocate a new object of `kind` wrapping `payload`, returning its id.
    /// Ids are assigned monotonically and never reused within one Registry's
    /// lifetime (never wraps in practice — `u32` headroom vastly exceeds any
    /// session's handle churn).
    pub fn allocate<T: Send + Sync + 'static>(&self, kind: ObjectKind, payload: T) -> u32 {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.objects.insert(
            id,
            Entry {
                kind,
                payload: Arc::new(payload),
            },
        );
        id
    }

    /// Look up an object by id and expected kind. Returns `None` for
    /// `INVALID_ID`, an unknown id, or a kind mismatch.
    pub fn lookup<T: Send + Sync + 'static>(&self, id: u32, kind: ObjectKind) -> Option<Arc<T>> {
        if id == INVALID_ID {
            return None;
        }
        let inner = self.inner.lock();
        let entry = inner.objects.get(&id)?;
        if entry.kind != kind {
            return None;
        }
        entry.payload.clone().downcast::<T>().ok()
    }

    /// Allocate a new object of `kind` wrapping an already-constructed `Arc`,
    /// rather than wrapping a fresh one around an owned payload. Used where
    /// the caller needs to keep its own strong reference to the exact same
    /// allocation the registry stores (e.g. `Image` holding the `Buffer` it
    /// owns), so [`Registry::lookup_by_inner_pointer`] can find it later.
    pub fn allocate_arc<T: Send + Sync + 'static>(&self, kind: ObjectKind, payload: Arc<T>) -> u32 {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.objects.insert(id, Entry { kind, payload });
        id
    }

    /// Reverse lookup: find the object whose payload address matches `ptr`.
    /// Used by Image destruction to find the Buffer it implicitly owns.
    pub fn lookup_by_inner_pointer<T: Send + Sync + 'static>(&self, ptr: *const T) -> Option<u32> {
        let inner = self.inner.lock();
        let target = ptr as *const ();
        inner.objects.iter().find_map(|(id, entry)| {
            // `Arc::as_ptr` on a `dyn Any` trait object yields a fat pointer;
            // casting to `*const ()` truncates to the data address, which is
            // what we want to compare against `ptr`.
            let addr = Arc::as_ptr(&entry.payload) as *const ();
            if addr == target {
                Some(*id)
            } else {
                None
            }
        })
    }

    /// Remove and free an object. No-op on `INVALID_ID` or an unknown id.
    pub fn delete(&self, id: u32) {
        if id == INVALID_ID {
            return;
        }
        self.inner.lock().objects.remove(&id);
    }

    /// Remove every object of `kind`. The caller is responsible for running
    /// any per-object teardown (e.g. `destroyContext`) against the ids this
    /// returns *before* they're gone — so this returns the removed ids
    /// rather than silently dropping their payloads.
    pub fn delete_all_matching(&self, kind: ObjectKind) -> Vec<u32> {
        let mut inner = self.inner.lock();
        let ids: Vec<u32> = inner
            .objects
            .iter()
            .filter(|(_, e)| e.kind == kind)
            .map(|(id, _)| *id)
            .collect();
        for id in &ids {
            inner.objects.remove(id);
        }
        ids
    }

    /// Number of live objects of `kind`. Used for `surfaceCount`-style
    /// bookkeeping and tests.
    pub fn count(&self, kind: ObjectKind) -> usize {
        self.inner.lock().objects.values().filter(|e| e.kind == kind).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_then_lookup_round_trips() {
        let reg = Registry::new();
        let id = reg.allocate(ObjectKind::Surface, 42u32);
        assert_ne!(id, INVALID_ID);
        let got = reg.lookup::<u32>(id, ObjectKind::Surface).unwrap();
        assert_eq!(*got, 42);
    }

    #[test]
    fn wrong_kind_fails_lookup() {
        let reg = Registry::new();
        let id = reg.allocate(ObjectKind::Surface, 42u32);
        assert!(reg.lookup::<u32>(id, ObjectKind::Context).is_none());
    }

    #[test]
    fn invalid_id_is_never_found() {
        let reg = Registry::new();
        assert!(reg.lookup::<u32>(INVALID_ID, ObjectKind::Surface).is_none());
    }

    #[test]
    fn delete_then_lookup_is_none() {
        let reg = Registry::new();
        let id = reg.allocate(ObjectKind::Buffer, 7u32);
        reg.delete(id);
        assert!(reg.lookup::<u32>(id, ObjectKind::Buffer).is_none());
    }

    #[test]
    fn delete_all_matching_only_touches_one_kind() {
        let reg = Registry::new();
        let s1 = reg.allocate(ObjectKind::Surface, 1u32);
        let s2 = reg.allocate(ObjectKind::Surface, 2u32);
        let c1 = reg.allocate(ObjectKind::Context, 3u32);

        let removed = reg.delete_all_matching(ObjectKind::Surface);
        assert_eq!(removed.len(), 2);
        assert!(removed.contains(&s1));
        assert!(removed.contains(&s2));
        assert!(reg.lookup::<u32>(c1, ObjectKind::Context).is_some());
        assert_eq!(reg.count(ObjectKind::Surface), 0);
    }

    #[test]
    fn allocate_arc_is_findable_by_its_own_pointer() {
        let reg = Registry::new();
        let payload = Arc::new(42u32);
        let id = reg.allocate_arc(ObjectKind::Buffer, payload.clone());
        let found = reg.lookup_by_inner_pointer(Arc::as_ptr(&payload));
        assert_eq!(found, Some(id));
    }

    #[test]
    fn ids_are_monotonic_and_unique() {
        let reg = Registry::new();
        let a = reg.allocate(ObjectKind::Buffer, 1u32);
        let b = reg.allocate(ObjectKind::Buffer, 2u32);
        assert!(b > a);
    }
}
