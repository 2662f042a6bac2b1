//! Byte views over a shared, growable backing store.
//!
//! ```text
//!   offset    len
//! |<------>|<------>|
//! |........(........).....|  <~ backing store
//!          |<------------>|
//!              capacity
//! ```
//!
//! A [`Span`] is a window `(offset, len)` into a backing store that may be
//! shared by many spans. Cloning a span or slicing it never copies bytes.
//!
//! # Aliasing
//!
//! [`Span::grow`] may compact the content to the front of the store or move
//! it into a larger allocation. Either way it rewrites the shared store in
//! place, so sibling views created before the grow stay in bounds (the store
//! never shrinks) but may observe relocated bytes. Re-slice from the grown
//! span instead of holding on to old siblings.

use std::fmt;
use std::ops::{Bound, RangeBounds};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Error, Result};

/// Default capacity for [`Span::make`] when none is given.
pub const SMALL_BUFFER_SIZE: usize = 64;

type Store = Arc<RwLock<Vec<u8>>>;

/// A window over a shared byte store.
#[derive(Clone)]
pub struct Span {
    store: Store,
    offset: usize,
    len: usize,
}

impl Span {
    /// Allocate a span of `len` zero bytes.
    ///
    /// The store holds `cap` bytes when given, otherwise the greater of `len`
    /// and [`SMALL_BUFFER_SIZE`]. Fails with `InvalidArgument` if `len > cap`.
    pub fn make(len: usize, cap: Option<usize>) -> Result<Self> {
        let cap = match cap {
            Some(cap) if len > cap => {
                return Err(Error::invalid_argument(format!(
                    "length {len} exceeds capacity {cap}"
                )));
            }
            Some(cap) => cap,
            None => len.max(SMALL_BUFFER_SIZE),
        };
        Ok(Self {
            store: Arc::new(RwLock::new(vec![0; cap])),
            offset: 0,
            len,
        })
    }

    /// Allocate a span of `len` zero bytes with default capacity.
    pub fn new(len: usize) -> Self {
        Self {
            store: Arc::new(RwLock::new(vec![0; len.max(SMALL_BUFFER_SIZE)])),
            offset: 0,
            len,
        }
    }

    /// View `store[offset..offset + len]`, or to the end of the store when
    /// `len` is `None`.
    pub fn from_store(store: Vec<u8>, offset: usize, len: Option<usize>) -> Result<Self> {
        if offset > store.len() {
            return Err(Error::out_of_range(format!(
                "start offset {offset} is outside the bounds of the buffer"
            )));
        }
        let cap = store.len() - offset;
        let len = match len {
            Some(len) if len > cap => {
                return Err(Error::out_of_range(format!(
                    "span bounds out of range {len} with capacity {cap}"
                )));
            }
            Some(len) => len,
            None => cap,
        };
        Ok(Self {
            store: Arc::new(RwLock::new(store)),
            offset,
            len,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Start of this view within the backing store.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes available from `offset` to the end of the backing store.
    pub fn capacity(&self) -> usize {
        self.store.read().len() - self.offset
    }

    /// Whether both spans view the same backing store.
    pub fn shares_store(&self, other: &Span) -> bool {
        Arc::ptr_eq(&self.store, &other.store)
    }

    /// Run `f` over the visible bytes.
    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let store = self.store.read();
        f(&store[self.offset..self.offset + self.len])
    }

    /// Run `f` over the visible bytes, mutably.
    pub fn with_bytes_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut store = self.store.write();
        f(&mut store[self.offset..self.offset + self.len])
    }

    /// Copy the visible bytes out.
    pub fn to_vec(&self) -> Vec<u8> {
        self.with_bytes(<[u8]>::to_vec)
    }

    /// Copy from `src` into the front of this span. Returns bytes copied.
    pub fn copy_from_slice(&self, src: &[u8]) -> usize {
        self.with_bytes_mut(|dst| {
            let n = dst.len().min(src.len());
            dst[..n].copy_from_slice(&src[..n]);
            n
        })
    }

    /// Copy the front of this span into `dst`. Returns bytes copied.
    pub fn copy_to_slice(&self, dst: &mut [u8]) -> usize {
        self.with_bytes(|src| {
            let n = dst.len().min(src.len());
            dst[..n].copy_from_slice(&src[..n]);
            n
        })
    }

    /// Copy `min(self.len, src.len)` bytes from `src` into this span.
    ///
    /// Overlapping views of one store behave like `memmove`.
    pub fn copy_from(&self, src: &Span) -> usize {
        let n = self.len.min(src.len);
        if n == 0 {
            return 0;
        }

        if self.shares_store(src) {
            let mut store = self.store.write();
            store.copy_within(src.offset..src.offset + n, self.offset);
            return n;
        }

        // Lock in address order so two opposite copies cannot deadlock.
        let (dst_addr, src_addr) = (Arc::as_ptr(&self.store), Arc::as_ptr(&src.store));
        if dst_addr < src_addr {
            let mut d = self.store.write();
            let s = src.store.read();
            d[self.offset..self.offset + n].copy_from_slice(&s[src.offset..src.offset + n]);
        } else {
            let s = src.store.read();
            let mut d = self.store.write();
            d[self.offset..self.offset + n].copy_from_slice(&s[src.offset..src.offset + n]);
        }
        n
    }

    /// Python-style slice of the visible bytes over the same store.
    ///
    /// Negative indices count from the end, out-of-range indices clamp to
    /// `[0, len]` and an inverted range yields an empty span. Never fails.
    pub fn subarray(&self, range: impl RangeBounds<isize>) -> Span {
        let len = self.len as isize;
        let resolve = |i: isize| -> isize {
            if i < 0 { (len + i).max(0) } else { i.min(len) }
        };

        let begin = match range.start_bound() {
            Bound::Included(&b) => resolve(b),
            Bound::Excluded(&b) => (resolve(b) + 1).min(len),
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(&e) => (resolve(e) + 1).min(len),
            Bound::Excluded(&e) => resolve(e),
            Bound::Unbounded => len,
        };
        let end = end.max(begin);

        Span {
            store: self.store.clone(),
            offset: self.offset + begin as usize,
            len: (end - begin) as usize,
        }
    }

    /// Clamped slice with unsigned indices; see [`Span::subarray`].
    pub fn slice(&self, range: impl RangeBounds<usize>) -> Span {
        let begin = match range.start_bound() {
            Bound::Included(&b) => b,
            Bound::Excluded(&b) => b.saturating_add(1),
            Bound::Unbounded => 0,
        }
        .min(self.len);
        let end = match range.end_bound() {
            Bound::Included(&e) => e.saturating_add(1),
            Bound::Excluded(&e) => e,
            Bound::Unbounded => self.len,
        }
        .clamp(begin, self.len);

        Span {
            store: self.store.clone(),
            offset: self.offset + begin,
            len: end - begin,
        }
    }

    /// Exact slice anchored to capacity rather than length.
    ///
    /// Reaches into allocated but not yet visible bytes. The end defaults to
    /// the current length. Fails with `OutOfRange` if `begin > end` or
    /// `end > capacity`.
    pub fn subbuff(&self, range: impl RangeBounds<usize>) -> Result<Span> {
        let cap = self.capacity();
        let begin = match range.start_bound() {
            Bound::Included(&b) => b,
            Bound::Excluded(&b) => b.saturating_add(1),
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(&e) => e.saturating_add(1),
            Bound::Excluded(&e) => e,
            Bound::Unbounded => self.len,
        };

        if begin > end {
            return Err(Error::out_of_range(format!(
                "invalid span indices: {begin} > {end}"
            )));
        }
        if end > cap {
            return Err(Error::out_of_range(format!(
                "span bounds out of range {end} with capacity {cap}"
            )));
        }

        Ok(Span {
            store: self.store.clone(),
            offset: self.offset + begin,
            len: end - begin,
        })
    }

    /// Shrink the visible length to `n`.
    pub fn truncate(&mut self, n: usize) -> Result<()> {
        if n > self.len {
            return Err(Error::out_of_range(format!(
                "truncate to {n} exceeds length {}",
                self.len
            )));
        }
        self.len = n;
        Ok(())
    }

    /// Consume `n` bytes from the front. Callers check `n <= len`.
    pub(crate) fn advance(&mut self, n: usize) {
        self.offset += n;
        self.len -= n;
    }

    /// Extend the visible length by `n`, returning the length before growth.
    ///
    /// Spare capacity is used first. Otherwise, if the content plus `n` fits
    /// in half the store, the content is moved to the front of the same
    /// store; failing that the store is reallocated to
    /// `max(len + n, 2 * store_len)`. Content bytes are preserved.
    pub fn grow(&mut self, n: usize) -> usize {
        let m = self.len;
        let mut store = self.store.write();
        let c = store.len();

        if n <= c - self.offset - m {
            self.len += n;
            return m;
        }

        if 2 * (m + n) <= c {
            store.copy_within(self.offset..self.offset + m, 0);
        } else {
            let mut next = vec![0; (m + n).max(2 * c)];
            next[..m].copy_from_slice(&store[self.offset..self.offset + m]);
            *store = next;
        }

        self.offset = 0;
        self.len += n;
        m
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Span")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .finish()
    }
}

impl From<Vec<u8>> for Span {
    fn from(v: Vec<u8>) -> Self {
        let len = v.len();
        Self {
            store: Arc::new(RwLock::new(v)),
            offset: 0,
            len,
        }
    }
}

impl From<&[u8]> for Span {
    fn from(v: &[u8]) -> Self {
        Self::from(v.to_vec())
    }
}

impl From<&str> for Span {
    fn from(s: &str) -> Self {
        Self::from(s.as_bytes())
    }
}

impl FromIterator<u8> for Span {
    fn from_iter<I: IntoIterator<Item = u8>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<Vec<u8>>())
    }
}

impl PartialEq<[u8]> for Span {
    fn eq(&self, other: &[u8]) -> bool {
        self.with_bytes(|b| b == other)
    }
}

impl PartialEq<&[u8]> for Span {
    fn eq(&self, other: &&[u8]) -> bool {
        self.with_bytes(|b| b == *other)
    }
}
