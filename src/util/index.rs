// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! A small stand-in for `rustc_index::newtype_index!`, which needs the `rustc_private`
//! nightly feature to mint cheap, `Copy` identifiers for interned entities. This crate
//! has no `rustc_private` access, so it hand-rolls the same shape: a `u32`-backed
//! newtype with the handful of trait impls the rest of the crate expects from an index
//! type.

/// Declares a `u32`-backed index newtype with the usual `Copy`/`Eq`/`Hash`/`Debug` impls
/// plus conversions to and from `usize`, mirroring `rustc_index::newtype_index!`.
macro_rules! newtype_index {
    ($(#[$meta:meta])* $vis:vis struct $name:ident;) => {
        $(#[$meta])*
        #[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        $vis struct $name(u32);

        impl $name {
            #[inline]
            $vis fn new(index: usize) -> Self {
                $name(index as u32)
            }

            #[inline]
            $vis fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl From<usize> for $name {
            #[inline]
            fn from(index: usize) -> Self {
                $name::new(index)
            }
        }

        impl From<$name> for usize {
            #[inline]
            fn from(id: $name) -> Self {
                id.index()
            }
        }
    };
}

pub(crate) use newtype_index;

/// A bidirectional interning table: given a value, returns a stable, small `Copy` id;
/// given the id, returns the value back. Every canonicalization table in `cs` is one
/// of these, generalizing the per-entity `ContextCache`/`func_nodes` interning pattern
/// to every entity kind.
pub struct InternTable<K, V> {
    by_id: Vec<K>,
    ids: std::collections::HashMap<K, V>,
}

impl<K, V> InternTable<K, V>
where
    K: Clone + Eq + std::hash::Hash,
    V: Copy + From<usize> + Into<usize>,
{
    pub fn new() -> Self {
        InternTable {
            by_id: Vec::new(),
            ids: std::collections::HashMap::new(),
        }
    }

    /// Returns the canonical id for `key`, interning it if this is the first time it's seen.
    pub fn intern(&mut self, key: K) -> V {
        if let Some(id) = self.ids.get(&key) {
            return *id;
        }
        let id = V::from(self.by_id.len());
        self.by_id.push(key.clone());
        self.ids.insert(key, id);
        id
    }

    pub fn get(&self, id: V) -> &K {
        &self.by_id[id.into()]
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn iter_ids(&self) -> impl Iterator<Item = V> + '_ {
        (0..self.by_id.len()).map(V::from)
    }
}

impl<K, V> Default for InternTable<K, V>
where
    K: Clone + Eq + std::hash::Hash,
    V: Copy + From<usize> + Into<usize>,
{
    fn default() -> Self {
        Self::new()
    }
}
