//! Reader and writer combinators.
//!
//! Everything here is written against [`Reader`] and [`Writer`] alone and
//! knows nothing about buffers, blocks or backends.

use async_trait::async_trait;
use futures::Stream;

use crate::error::{Error, Result};
use crate::ops::{Reader, Writer};
use crate::span::Span;

/// Buffer size used by [`copy`].
pub const COPY_BUFFER_SIZE: usize = 32 * 1024;

/// Initial capacity used by [`read_all`].
const READ_ALL_INITIAL: usize = 512;

/// Consecutive empty reads tolerated before failing with `NoProgress`.
pub const MAX_EMPTY_READS: usize = 100;

/// Reader that stops after a fixed number of bytes.
///
/// It does not track or reset the position of the wrapped reader.
#[derive(Debug)]
pub struct LimitedReader<R> {
    inner: R,
    remaining: u64,
}

/// Wrap `r` so at most `n` bytes are read from it in total.
pub fn limit<R: Reader>(r: R, n: u64) -> LimitedReader<R> {
    LimitedReader {
        inner: r,
        remaining: n,
    }
}

impl<R> LimitedReader<R> {
    /// Bytes still allowed through.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

#[async_trait]
impl<R: Reader> Reader for LimitedReader<R> {
    async fn read(&mut self, dst: &Span) -> Result<Option<usize>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        let cap = usize::try_from(self.remaining).unwrap_or(usize::MAX);
        let dst = dst.slice(..cap);

        let n = self.inner.read(&dst).await?;
        if let Some(n) = n {
            self.remaining = self.remaining.saturating_sub(n as u64);
        }
        Ok(n)
    }
}

/// Reader that writes everything it reads to a sink.
#[derive(Debug)]
pub struct TeeReader<R, W> {
    reader: R,
    writer: W,
}

/// Mirror every successful read from `r` into `w`.
pub fn tee<R: Reader, W: Writer>(r: R, w: W) -> TeeReader<R, W> {
    TeeReader {
        reader: r,
        writer: w,
    }
}

impl<R, W> TeeReader<R, W> {
    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }
}

#[async_trait]
impl<R: Reader, W: Writer> Reader for TeeReader<R, W> {
    async fn read(&mut self, dst: &Span) -> Result<Option<usize>> {
        let n = self.reader.read(dst).await?;
        if let Some(n @ 1..) = n {
            write_exact(&mut self.writer, &dst.slice(..n)).await?;
        }
        Ok(n)
    }
}

/// Write all of `src` in one call, mapping miscounts to errors.
async fn write_exact<W: Writer + ?Sized>(w: &mut W, src: &Span) -> Result<usize> {
    let n = w.write(src).await?;
    if n > src.len() {
        return Err(Error::InvalidWrite);
    }
    if n < src.len() {
        return Err(Error::ShortWrite);
    }
    Ok(n)
}

/// Read into `dst` until at least `min` bytes have been collected.
///
/// Fails with `ShortBuffer` if `dst` is smaller than `min`. Reaching
/// end-of-data first is not an error: the short count is returned.
pub async fn read_at_least<R: Reader + ?Sized>(r: &mut R, dst: &Span, min: usize) -> Result<usize> {
    if dst.len() < min {
        return Err(Error::ShortBuffer);
    }

    let mut pos = 0;
    let mut empty = 0;
    while pos < min {
        match r.read(&dst.slice(pos..)).await? {
            Some(0) => {
                empty += 1;
                if empty >= MAX_EMPTY_READS {
                    return Err(Error::NoProgress);
                }
            }
            Some(n) => {
                pos += n;
                empty = 0;
            }
            None => break,
        }
    }
    Ok(pos)
}

/// Fill `dst`, or as much of it as the reader has.
pub async fn read_full<R: Reader + ?Sized>(r: &mut R, dst: &Span) -> Result<usize> {
    read_at_least(r, dst, dst.len()).await
}

/// Read until end-of-data and return everything read.
pub async fn read_all<R: Reader + ?Sized>(r: &mut R) -> Result<Span> {
    let mut acc = Span::make(0, Some(READ_ALL_INITIAL))?;
    let mut empty = 0;
    loop {
        if acc.len() == acc.capacity() {
            // Double the store, keep the length.
            let m = acc.grow(1);
            acc.truncate(m)?;
        }

        let dst = acc.subbuff(acc.len()..acc.capacity())?;
        match r.read(&dst).await? {
            Some(0) => {
                empty += 1;
                if empty >= MAX_EMPTY_READS {
                    return Err(Error::NoProgress);
                }
            }
            Some(n) => {
                acc.grow(n);
                empty = 0;
            }
            None => return Ok(acc),
        }
    }
}

/// Copy `src` to `dst` until end-of-data, returning bytes moved.
pub async fn copy<W, R>(dst: &mut W, src: &mut R) -> Result<u64>
where
    W: Writer + ?Sized,
    R: Reader + ?Sized,
{
    copy_buffer(dst, src, None).await
}

/// Like [`copy`], staging through `buf` instead of a fresh 32 KiB buffer.
pub async fn copy_buffer<W, R>(dst: &mut W, src: &mut R, buf: Option<Span>) -> Result<u64>
where
    W: Writer + ?Sized,
    R: Reader + ?Sized,
{
    let buf = match buf {
        Some(buf) if buf.is_empty() => {
            return Err(Error::invalid_argument("empty buffer in copy_buffer"));
        }
        Some(buf) => buf,
        None => Span::new(COPY_BUFFER_SIZE),
    };

    let mut written = 0u64;
    let mut empty = 0;
    while let Some(n) = src.read(&buf).await? {
        if n == 0 {
            empty += 1;
            if empty >= MAX_EMPTY_READS {
                return Err(Error::NoProgress);
            }
            continue;
        }
        empty = 0;
        written += write_exact(dst, &buf.slice(..n)).await? as u64;
    }
    Ok(written)
}

/// Stream the byte counts of successive reads from `r` into `buf`.
///
/// Each item says how many bytes of `buf` are valid; the next poll
/// overwrites them. The stream ends at end-of-data.
pub fn gulp<'a, R: Reader + ?Sized>(
    r: &'a mut R,
    buf: &'a Span,
) -> impl Stream<Item = Result<usize>> + Send + 'a {
    futures::stream::try_unfold(r, move |r| async move {
        let n = r.read(buf).await?;
        Ok::<_, Error>(n.map(|n| (n, r)))
    })
}
