//! Capability traits.
//!
//! Every transfer goes through a [`Span`]: readers fill the destination
//! span, writers drain the source span. Methods take `&mut self`, so one
//! handle never runs two operations at once and calls against it complete
//! in the order they were made.

use async_trait::async_trait;
use std::io::SeekFrom;

use crate::Result;
use crate::span::Span;

/// Source of bytes.
#[async_trait]
pub trait Reader: Send {
    /// Read up to `dst.len()` bytes into `dst`.
    ///
    /// Returns `None` at end-of-data. End-of-data is not an error.
    async fn read(&mut self, dst: &Span) -> Result<Option<usize>>;
}

/// Sink for bytes.
#[async_trait]
pub trait Writer: Send {
    /// Write bytes from `src`, returning how many were accepted.
    ///
    /// Bounded sinks may accept fewer bytes than given.
    async fn write(&mut self, src: &Span) -> Result<usize>;
}

/// Cursor positioning.
#[async_trait]
pub trait Seeker: Send {
    /// Move the cursor and return the new absolute position.
    ///
    /// Fails with `OutOfRange` when the target lies outside the stream.
    async fn seek(&mut self, pos: SeekFrom) -> Result<u64>;
}

/// Resource release. Closing twice is a no-op.
#[async_trait]
pub trait Closer: Send {
    async fn close(&mut self) -> Result<()>;
}

// ============================================================================
// Forwarding impls
// ============================================================================

#[async_trait]
impl<R: Reader + ?Sized> Reader for &mut R {
    async fn read(&mut self, dst: &Span) -> Result<Option<usize>> {
        (**self).read(dst).await
    }
}

#[async_trait]
impl<R: Reader + ?Sized> Reader for Box<R> {
    async fn read(&mut self, dst: &Span) -> Result<Option<usize>> {
        (**self).read(dst).await
    }
}

#[async_trait]
impl<W: Writer + ?Sized> Writer for &mut W {
    async fn write(&mut self, src: &Span) -> Result<usize> {
        (**self).write(src).await
    }
}

#[async_trait]
impl<W: Writer + ?Sized> Writer for Box<W> {
    async fn write(&mut self, src: &Span) -> Result<usize> {
        (**self).write(src).await
    }
}

#[async_trait]
impl<S: Seeker + ?Sized> Seeker for &mut S {
    async fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        (**self).seek(pos).await
    }
}

#[async_trait]
impl<S: Seeker + ?Sized> Seeker for Box<S> {
    async fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        (**self).seek(pos).await
    }
}

#[async_trait]
impl<C: Closer + ?Sized> Closer for &mut C {
    async fn close(&mut self) -> Result<()> {
        (**self).close().await
    }
}

#[async_trait]
impl<C: Closer + ?Sized> Closer for Box<C> {
    async fn close(&mut self) -> Result<()> {
        (**self).close().await
    }
}
