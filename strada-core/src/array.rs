//! ArrayBody: the payload behind a Value of kind `Array`.
//!
//! Backed by a `Vec<ValuePtr>`, each element an owned (incref'd) handle.
//! Every mutator here assumes the caller already holds whatever
//! synchronization the container needs (§5: "access to mutable container
//! bodies is not internally synchronized").

use crate::value::{ValuePtr, decref, strada_incref};

/// Default initial capacity per §9's implementation pragmatics.
pub const DEFAULT_CAPACITY: usize = 8;

pub struct ArrayBody {
    elems: Vec<ValuePtr>,
}

impl ArrayBody {
    pub fn new() -> Self {
        ArrayBody {
            elems: Vec::with_capacity(DEFAULT_CAPACITY),
        }
    }

    pub fn with_capacity(cap: usize) -> Self {
        ArrayBody {
            elems: Vec::with_capacity(cap),
        }
    }

    pub fn len(&self) -> usize {
        self.elems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    pub fn reserve(&mut self, additional: usize) {
        self.elems.reserve(additional);
    }

    /// Push `elem` onto the end. If `take_ownership` is false, the caller
    /// is lending a borrowed reference and the array takes its own incref;
    /// if true, the caller's existing refcount is adopted (no incref).
    pub fn push(&mut self, elem: ValuePtr, take_ownership: bool) {
        if !take_ownership {
            unsafe { strada_incref(elem) };
        }
        self.elems.push(elem);
    }

    /// Pop the last element, handing ownership of its refcount to the
    /// caller (no decref performed here).
    pub fn pop(&mut self) -> Option<ValuePtr> {
        self.elems.pop()
    }

    /// Remove and return the first element, shifting everything else down.
    pub fn shift(&mut self) -> Option<ValuePtr> {
        if self.elems.is_empty() {
            None
        } else {
            Some(self.elems.remove(0))
        }
    }

    /// Insert at the front, shifting everything else up.
    pub fn unshift(&mut self, elem: ValuePtr, take_ownership: bool) {
        if !take_ownership {
            unsafe { strada_incref(elem) };
        }
        self.elems.insert(0, elem);
    }

    fn resolve_index(&self, index: i64) -> Option<usize> {
        let len = self.elems.len() as i64;
        let idx = if index < 0 { index + len } else { index };
        if idx < 0 || idx >= len { None } else { Some(idx as usize) }
    }

    /// Borrowing get: does not incref. Negative indices count from the end.
    pub fn get(&self, index: i64) -> Option<ValuePtr> {
        self.resolve_index(index).map(|i| self.elems[i])
    }

    /// Set an index, padding with Undef as needed. Negative indices that
    /// resolve within bounds are honored; negative indices past the start
    /// are out of range and ignored (there is nothing sensible to pad
    /// backwards from).
    ///
    /// # Safety
    /// Relies on `strada_new_undef` from `value`, which has no unsafe
    /// preconditions of its own; kept as a regular fn.
    pub fn set(&mut self, index: i64, elem: ValuePtr, take_ownership: bool) {
        if index >= 0 {
            let idx = index as usize;
            if idx >= self.elems.len() {
                self.elems.resize_with(idx + 1, || crate::value::strada_new_undef());
            }
            let prev = self.elems[idx];
            if !take_ownership {
                unsafe { strada_incref(elem) };
            }
            self.elems[idx] = elem;
            unsafe { decref(prev) };
        } else if let Some(idx) = self.resolve_index(index) {
            let prev = self.elems[idx];
            if !take_ownership {
                unsafe { strada_incref(elem) };
            }
            self.elems[idx] = elem;
            unsafe { decref(prev) };
        }
    }

    pub fn reverse(&mut self) {
        self.elems.reverse();
    }

    /// Lexical (byte) sort on Str elements; Int/Num compare numerically.
    /// Mixed-kind arrays sort by a stable tag-then-value ordering so the
    /// operation never panics on heterogeneous content. Per §4.5, `sort`
    /// returns a new array rather than mutating in place (unlike
    /// `reverse`); `qsort`'s instability in the original C source is not
    /// carried forward — this port specifies a stable sort.
    pub fn sort(&self) -> ArrayBody {
        let mut elems = self.elems.clone();
        elems.sort_by(|a, b| lexical_cmp(*a, *b));
        for &e in &elems {
            unsafe { strada_incref(e) };
        }
        ArrayBody { elems }
    }

    /// Numeric sort, also returning a new array. Coerces each element to a
    /// number for comparison (full §4.2 coercion rules live in
    /// `strada-runtime::coercion`; elements that are already Int/Num are
    /// compared directly, everything else sorts as 0).
    pub fn nsort(&self) -> ArrayBody {
        let mut elems = self.elems.clone();
        elems.sort_by(|a, b| numeric_cmp(*a, *b));
        for &e in &elems {
            unsafe { strada_incref(e) };
        }
        ArrayBody { elems }
    }

    /// Build a fresh array of Int values `[start, end)` (or `(end, start]`
    /// descending if `start > end`), matching typical range-constructor
    /// semantics.
    pub fn range(start: i64, end: i64) -> ArrayBody {
        let mut body = ArrayBody::new();
        if start <= end {
            for i in start..end {
                body.push(crate::value::strada_new_int(i), true);
            }
        } else {
            let mut i = start;
            while i > end {
                body.push(crate::value::strada_new_int(i), true);
                i -= 1;
            }
        }
        body
    }

    /// Consumes the body, handing every element's ownership to the caller
    /// (used by the release cascade, which decrefs each one).
    pub fn into_elements(self) -> Vec<ValuePtr> {
        self.elems
    }

    pub fn iter(&self) -> impl Iterator<Item = ValuePtr> + '_ {
        self.elems.iter().copied()
    }
}

impl Default for ArrayBody {
    fn default() -> Self {
        ArrayBody::new()
    }
}

fn lexical_cmp(a: ValuePtr, b: ValuePtr) -> std::cmp::Ordering {
    use crate::value::ValueKind::*;
    let (ka, kb) = unsafe { ((*a).kind(), (*b).kind()) };
    match (ka, kb) {
        (Str(x), Str(y)) => x.cmp(y),
        (Int(x), Int(y)) => x.cmp(y),
        (Num(x), Num(y)) => x.partial_cmp(y).unwrap_or(std::cmp::Ordering::Equal),
        _ => ka.tag().cmp_tag(kb.tag()),
    }
}

fn numeric_cmp(a: ValuePtr, b: ValuePtr) -> std::cmp::Ordering {
    use crate::value::ValueKind::*;
    let na = match unsafe { (*a).kind() } {
        Int(i) => *i as f64,
        Num(n) => *n,
        _ => 0.0,
    };
    let nb = match unsafe { (*b).kind() } {
        Int(i) => *i as f64,
        Num(n) => *n,
        _ => 0.0,
    };
    na.partial_cmp(&nb).unwrap_or(std::cmp::Ordering::Equal)
}

impl crate::value::Tag {
    fn cmp_tag(self, other: Self) -> std::cmp::Ordering {
        (self as u8).cmp(&(other as u8))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{strada_decref, strada_new_int, strada_new_str_len};

    #[test]
    fn push_pop_round_trips() {
        let mut arr = ArrayBody::new();
        let v = strada_new_int(1);
        arr.push(v, true);
        assert_eq!(arr.len(), 1);
        let popped = arr.pop().unwrap();
        assert_eq!(popped, v);
        unsafe { strada_decref(v) };
    }

    #[test]
    fn negative_index_counts_from_end() {
        let mut arr = ArrayBody::new();
        arr.push(strada_new_int(10), true);
        arr.push(strada_new_int(20), true);
        arr.push(strada_new_int(30), true);
        let last = arr.get(-1).unwrap();
        let last_int = match unsafe { (*last).kind() } {
            crate::value::ValueKind::Int(i) => *i,
            _ => panic!("expected Int"),
        };
        assert_eq!(last_int, 30);
        for e in arr.into_elements() {
            unsafe { strada_decref(e) };
        }
    }

    #[test]
    fn set_past_end_pads_with_undef() {
        let mut arr = ArrayBody::new();
        arr.set(2, strada_new_int(99), true);
        assert_eq!(arr.len(), 3);
        assert!(matches!(unsafe { (*arr.get(0).unwrap()).kind() }, crate::value::ValueKind::Undef));
        assert!(matches!(unsafe { (*arr.get(1).unwrap()).kind() }, crate::value::ValueKind::Undef));
        for e in arr.into_elements() {
            unsafe { strada_decref(e) };
        }
    }

    #[test]
    fn sort_returns_new_lexically_ordered_array() {
        let mut arr = ArrayBody::new();
        arr.push(unsafe { strada_new_str_len(b"banana".as_ptr(), 6) }, true);
        arr.push(unsafe { strada_new_str_len(b"apple".as_ptr(), 5) }, true);
        let sorted = arr.sort();
        let first = sorted.get(0).unwrap();
        match unsafe { (*first).kind() } {
            crate::value::ValueKind::Str(b) => assert_eq!(b, b"apple"),
            _ => panic!(),
        }
        // original order is untouched
        let orig_first = arr.get(0).unwrap();
        match unsafe { (*orig_first).kind() } {
            crate::value::ValueKind::Str(b) => assert_eq!(b, b"banana"),
            _ => panic!(),
        }
        for e in sorted.into_elements() {
            unsafe { strada_decref(e) };
        }
        for e in arr.into_elements() {
            unsafe { strada_decref(e) };
        }
    }
}
