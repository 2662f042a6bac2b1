//! Growable byte buffer with reader/writer semantics.

use async_trait::async_trait;
use std::ops::{Deref, DerefMut};

use crate::error::{Error, Result};
use crate::ops::{Reader, Writer};
use crate::span::Span;

/// Variable sized buffer of bytes.
///
/// Reading drains from the front, writing grows at the back. Derefs to
/// [`Span`] for slicing and capacity queries.
#[derive(Clone, Debug)]
pub struct Buff {
    span: Span,
}

impl Buff {
    /// See [`Span::make`].
    pub fn make(len: usize, cap: Option<usize>) -> Result<Self> {
        Ok(Self {
            span: Span::make(len, cap)?,
        })
    }

    /// Empty buffer with default capacity.
    pub fn new() -> Self {
        Self { span: Span::new(0) }
    }

    /// Consume `n` bytes from the front.
    pub fn drain(&mut self, n: usize) -> Result<()> {
        if n > self.span.len() {
            return Err(Error::out_of_range(format!(
                "drain of {n} exceeds length {}",
                self.span.len()
            )));
        }
        self.span.advance(n);
        Ok(())
    }

    /// Split off up to `n` bytes from the front as a view over the same store.
    pub fn next(&mut self, n: usize) -> Span {
        let n = n.min(self.span.len());
        let head = self.span.slice(..n);
        self.span.advance(n);
        head
    }

    pub fn into_span(self) -> Span {
        self.span
    }
}

impl Default for Buff {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Span> for Buff {
    fn from(span: Span) -> Self {
        Self { span }
    }
}

impl From<Vec<u8>> for Buff {
    fn from(v: Vec<u8>) -> Self {
        Self { span: v.into() }
    }
}

impl Deref for Buff {
    type Target = Span;

    fn deref(&self) -> &Span {
        &self.span
    }
}

impl DerefMut for Buff {
    fn deref_mut(&mut self) -> &mut Span {
        &mut self.span
    }
}

#[async_trait]
impl Reader for Buff {
    async fn read(&mut self, dst: &Span) -> Result<Option<usize>> {
        if self.span.is_empty() {
            return Ok(None);
        }
        let n = dst.copy_from(&self.span);
        self.span.advance(n);
        Ok(Some(n))
    }
}

#[async_trait]
impl Writer for Buff {
    /// Always accepts all of `src`.
    async fn write(&mut self, src: &Span) -> Result<usize> {
        // Growing may relocate bytes a source over our own store points at.
        let src = if src.shares_store(&self.span) {
            Span::from(src.to_vec())
        } else {
            src.clone()
        };

        let m = self.span.grow(src.len());
        self.span.slice(m..).copy_from(&src);
        Ok(src.len())
    }
}
