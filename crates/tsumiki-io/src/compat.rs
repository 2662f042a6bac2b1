//! Adapters from tokio's `AsyncRead`/`AsyncWrite` to [`Reader`]/[`Writer`].

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::Result;
use crate::ops::{Closer, Reader, Writer};
use crate::span::Span;

/// [`Reader`] over any tokio `AsyncRead`.
#[derive(Debug)]
pub struct ReadCompat<R> {
    inner: R,
}

impl<R> ReadCompat<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> Reader for ReadCompat<R> {
    async fn read(&mut self, dst: &Span) -> Result<Option<usize>> {
        if dst.is_empty() {
            return Ok(Some(0));
        }

        // The span's lock cannot be held across the await.
        let mut tmp = vec![0; dst.len()];
        let n = self.inner.read(&mut tmp).await?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(dst.copy_from_slice(&tmp[..n])))
    }
}

/// [`Writer`] over any tokio `AsyncWrite`. Closing shuts the sink down.
#[derive(Debug)]
pub struct WriteCompat<W> {
    inner: W,
}

impl<W> WriteCompat<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> Writer for WriteCompat<W> {
    async fn write(&mut self, src: &Span) -> Result<usize> {
        let data = src.to_vec();
        self.inner.write_all(&data).await?;
        Ok(data.len())
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> Closer for WriteCompat<W> {
    async fn close(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }
}
