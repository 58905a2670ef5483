use foldhash::{fast::RandomState, HashSet};
use parking_lot::RwLock;
use std::{
    fmt::{Debug, Error as FmtError, Formatter},
    hash::{BuildHasher, Hash, Hasher},
    ops::Deref,
    sync::Arc,
};

const SHARD_COUNT: usize = 16;

/// A set of canonical values, specialized to hash-consing definitions that are compared far more
/// often than they are created.
///
/// Interning a value returns the single shared instance that is structurally equal to it, so that
/// equality of two interned values is a pointer comparison. Entries are never removed, which
/// means that a [`Canonical`] stays valid for the lifetime of the process and that its address is
/// never reused for a different value.
///
/// The set is split into shards, each guarded by its own lock. Readers never block each other,
/// except when an entry is vacant. In that case it gets written to once and then never again.
pub struct Dictionary<T> {
    shards: Box<[RwLock<HashSet<Arc<T>>>]>,
    hasher: RandomState,
}

impl<T> Default for Dictionary<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Dictionary<T> {
    /// Creates a new, empty `Dictionary`.
    pub fn new() -> Self {
        Self {
            shards: (0..SHARD_COUNT)
                .map(|_| RwLock::new(HashSet::default()))
                .collect(),
            hasher: RandomState::default(),
        }
    }

    /// Returns the number of distinct values that have been interned.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }
}

impl<T> Dictionary<T>
where
    T: Eq + Hash,
{
    /// Returns the canonical instance of `value`, inserting `value` if no structurally equal
    /// value has been interned yet.
    ///
    /// Concurrent calls with equal values all return the same instance: if another thread wins
    /// the race to insert, its value is returned and `value` is dropped.
    pub fn intern(&self, value: T) -> Canonical<T> {
        let shard = &self.shards[self.shard_index(&value)];

        if let Some(existing) = shard.read().get(&value) {
            return Canonical(existing.clone());
        }

        let mut shard = shard.write();

        if let Some(existing) = shard.get(&value) {
            return Canonical(existing.clone());
        }

        let value = Arc::new(value);
        shard.insert(value.clone());

        Canonical(value)
    }

    /// Returns the canonical instance that is structurally equal to `value`, if one exists.
    pub fn get(&self, value: &T) -> Option<Canonical<T>> {
        self.shards[self.shard_index(value)]
            .read()
            .get(value)
            .cloned()
            .map(Canonical)
    }

    fn shard_index(&self, value: &T) -> usize {
        (self.hasher.hash_one(value) % SHARD_COUNT as u64) as usize
    }
}

impl<T> Debug for Dictionary<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.debug_struct("Dictionary")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

/// A shared handle to a value that was interned in a [`Dictionary`].
///
/// Two `Canonical`s from the same dictionary compare equal exactly when the values they point to
/// are structurally equal, and the comparison only looks at the address.
pub struct Canonical<T>(Arc<T>);

impl<T> Canonical<T> {
    /// Returns the address of the canonical value, which identifies it for the lifetime of the
    /// process.
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        Arc::as_ptr(&self.0)
    }
}

impl<T> Clone for Canonical<T> {
    #[inline]
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Canonical<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> PartialEq for Canonical<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T> Eq for Canonical<T> {}

impl<T> Hash for Canonical<T> {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_ptr().hash(state);
    }
}

impl<T: Debug> Debug for Canonical<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        Debug::fmt(&*self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::Dictionary;
    use std::sync::Barrier;

    #[test]
    fn intern_is_idempotent() {
        let dictionary = Dictionary::new();

        let a = dictionary.intern(vec![1u32, 2, 3]);
        let b = dictionary.intern(vec![1u32, 2, 3]);
        let c = dictionary.intern(vec![3u32, 2, 1]);

        assert_eq!(a, b);
        assert_eq!(a.as_ptr(), b.as_ptr());
        assert_ne!(a, c);
        assert_eq!(dictionary.len(), 2);
        assert_eq!(dictionary.get(&vec![3, 2, 1]), Some(c));
        assert_eq!(dictionary.get(&vec![4]), None);
    }

    #[test]
    fn concurrent_intern_yields_one_instance() {
        const THREADS: usize = 8;

        let dictionary = Dictionary::new();
        let barrier = Barrier::new(THREADS);

        let results: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();

                        (0..64u32)
                            .map(|i| dictionary.intern((i, "binding")))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .collect()
        });

        for per_thread in &results[1..] {
            assert_eq!(per_thread, &results[0]);
        }

        assert_eq!(dictionary.len(), 64);
    }
}
