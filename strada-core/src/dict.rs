//! DictBody: the payload behind a Value of kind `Hash`.
//!
//! Hand-rolled open-chaining hash table rather than a wrapper over
//! `std::collections::HashMap`: the spec contracts both the hash function
//! (DJB2) and the resize threshold as testable properties, so the table
//! shape itself is part of the surface under test, not an implementation
//! detail we're free to delegate.

use crate::value::{ValuePtr, decref, strada_incref};

/// Default initial bucket count per §9.
pub const DEFAULT_BUCKETS: usize = 16;

/// DJB2 hash, the classic `hash = hash*33 + byte` recurrence seeded at 5381.
fn djb2(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 5381;
    for &b in bytes {
        hash = hash.wrapping_mul(33).wrapping_add(b as u64);
    }
    hash
}

struct Entry {
    key: Vec<u8>,
    value: ValuePtr,
}

pub struct DictBody {
    buckets: Vec<Vec<Entry>>,
    count: usize,
}

impl DictBody {
    pub fn new() -> Self {
        DictBody::with_buckets(DEFAULT_BUCKETS)
    }

    fn with_buckets(n: usize) -> Self {
        let n = n.max(1);
        DictBody {
            buckets: (0..n).map(|_| Vec::new()).collect(),
            count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn reserve(&mut self, additional: usize) {
        let needed = self.count + additional;
        // Keep the 3/4 load-factor headroom the resize threshold targets.
        let target_buckets = (needed * 4 / 3).next_power_of_two().max(self.buckets.len());
        if target_buckets > self.buckets.len() {
            self.rehash(target_buckets);
        }
    }

    fn bucket_index(&self, key: &[u8]) -> usize {
        (djb2(key) as usize) % self.buckets.len()
    }

    /// Resize when `entries * 4 > buckets * 3` (load factor exceeds 0.75),
    /// doubling the bucket count.
    fn maybe_grow(&mut self) {
        if self.count * 4 > self.buckets.len() * 3 {
            self.rehash(self.buckets.len() * 2);
        }
    }

    fn rehash(&mut self, new_bucket_count: usize) {
        let old = std::mem::replace(
            &mut self.buckets,
            (0..new_bucket_count).map(|_| Vec::new()).collect(),
        );
        for bucket in old {
            for entry in bucket {
                let idx = self.bucket_index(&entry.key);
                self.buckets[idx].push(entry);
            }
        }
    }

    /// Insert or replace. If `take_ownership` is false the value is
    /// borrowed and incref'd; the previous value at this key (if any) is
    /// decref'd after replacement.
    pub fn set(&mut self, key: &[u8], value: ValuePtr, take_ownership: bool) {
        if !take_ownership {
            unsafe { strada_incref(value) };
        }
        let idx = self.bucket_index(key);
        if let Some(entry) = self.buckets[idx].iter_mut().find(|e| e.key.as_slice() == key) {
            let prev = entry.value;
            entry.value = value;
            unsafe { decref(prev) };
            return;
        }
        self.buckets[idx].push(Entry {
            key: key.to_vec(),
            value,
        });
        self.count += 1;
        self.maybe_grow();
    }

    /// Borrowing get: does not incref.
    pub fn get(&self, key: &[u8]) -> Option<ValuePtr> {
        if self.buckets.is_empty() {
            return None;
        }
        let idx = self.bucket_index(key);
        self.buckets[idx].iter().find(|e| e.key.as_slice() == key).map(|e| e.value)
    }

    pub fn exists(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Remove a key, handing ownership of its value's refcount to the
    /// caller (no decref performed here).
    pub fn delete(&mut self, key: &[u8]) -> Option<ValuePtr> {
        if self.buckets.is_empty() {
            return None;
        }
        let idx = self.bucket_index(key);
        let bucket = &mut self.buckets[idx];
        if let Some(pos) = bucket.iter().position(|e| e.key.as_slice() == key) {
            let entry = bucket.remove(pos);
            self.count -= 1;
            Some(entry.value)
        } else {
            None
        }
    }

    pub fn keys(&self) -> Vec<Vec<u8>> {
        self.buckets
            .iter()
            .flat_map(|b| b.iter().map(|e| e.key.clone()))
            .collect()
    }

    /// Borrowing: values are not incref'd.
    pub fn values(&self) -> Vec<ValuePtr> {
        self.buckets.iter().flat_map(|b| b.iter().map(|e| e.value)).collect()
    }

    /// Consumes the body, handing every (key, value) pair's value ownership
    /// to the caller (used by the release cascade).
    pub fn into_entries(self) -> Vec<(Vec<u8>, ValuePtr)> {
        self.buckets
            .into_iter()
            .flat_map(|b| b.into_iter().map(|e| (e.key, e.value)))
            .collect()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

impl Default for DictBody {
    fn default() -> Self {
        DictBody::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{strada_decref, strada_new_int};

    #[test]
    fn set_get_round_trips() {
        let mut d = DictBody::new();
        let v = strada_new_int(1);
        d.set(b"a", v, true);
        assert_eq!(d.get(b"a"), Some(v));
        unsafe { strada_decref(v) };
    }

    #[test]
    fn set_replaces_and_drops_previous() {
        let mut d = DictBody::new();
        let v1 = strada_new_int(1);
        let v2 = strada_new_int(2);
        d.set(b"k", v1, true);
        d.set(b"k", v2, true);
        assert_eq!(d.len(), 1);
        assert_eq!(d.get(b"k"), Some(v2));
        unsafe { strada_decref(v2) };
    }

    #[test]
    fn delete_transfers_ownership() {
        let mut d = DictBody::new();
        let v = strada_new_int(9);
        d.set(b"x", v, true);
        let taken = d.delete(b"x").unwrap();
        assert_eq!(taken, v);
        assert!(!d.exists(b"x"));
        unsafe { strada_decref(v) };
    }

    #[test]
    fn grows_past_three_quarters_load_factor() {
        let mut d = DictBody::new();
        let initial_buckets = d.bucket_count();
        for i in 0..((initial_buckets * 3 / 4) + 1) {
            let key = format!("k{i}").into_bytes();
            d.set(&key, strada_new_int(i as i64), true);
        }
        assert!(d.bucket_count() > initial_buckets);
        for (_, v) in d.into_entries() {
            unsafe { strada_decref(v) };
        }
    }

    #[test]
    fn djb2_matches_known_vector() {
        // djb2("") == 5381 is the canonical sanity check for the recurrence.
        assert_eq!(djb2(b""), 5381);
    }
}
