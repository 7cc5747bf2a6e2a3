//! Response tee: pass the body through while keeping a bounded copy

use std::{
    pin::Pin,
    task::{ready, Context, Poll},
};

use axum::{body::Bytes, http::StatusCode};
use http_body::{Body as HttpBody, Frame, SizeHint};

/// Side copy of what a response sent to the client
///
/// Holds at most `limit` bytes; anything beyond is forwarded but not copied,
/// and the copy is flagged as truncated.
#[derive(Debug)]
pub struct ResponseTee {
    buf: Vec<u8>,
    limit: usize,
    truncated: bool,
    status: Option<StatusCode>,
}

impl ResponseTee {
    pub fn new(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            limit,
            truncated: false,
            status: None,
        }
    }

    /// Record the status code; only the first call has an effect
    pub fn set_status(&mut self, status: StatusCode) -> bool {
        if self.status.is_some() {
            return false;
        }
        self.status = Some(status);
        true
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn mirror(&mut self, chunk: &[u8]) {
        let room = self.limit.saturating_sub(self.buf.len());
        if chunk.len() > room {
            self.truncated = true;
        }
        self.buf.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }
}

/// Body decorator that feeds every data frame into a [`ResponseTee`]
///
/// Frames reach the client unchanged and in the same order. `on_complete`
/// runs exactly once with the tee: when the inner body ends or errors, or
/// when the body is dropped early (client went away).
pub struct TeeBody<B, F>
where
    F: FnOnce(ResponseTee),
{
    inner: B,
    tee: Option<ResponseTee>,
    on_complete: Option<F>,
}

impl<B, F> TeeBody<B, F>
where
    F: FnOnce(ResponseTee),
{
    pub fn new(inner: B, tee: ResponseTee, on_complete: F) -> Self {
        Self {
            inner,
            tee: Some(tee),
            on_complete: Some(on_complete),
        }
    }

    fn finish(&mut self) {
        if let (Some(tee), Some(on_complete)) = (self.tee.take(), self.on_complete.take()) {
            on_complete(tee);
        }
    }
}

impl<B, F> HttpBody for TeeBody<B, F>
where
    B: HttpBody<Data = Bytes> + Unpin,
    F: FnOnce(ResponseTee) + Unpin,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let polled = ready!(Pin::new(&mut this.inner).poll_frame(cx));

        match &polled {
            Some(Ok(frame)) => {
                if let (Some(data), Some(tee)) = (frame.data_ref(), this.tee.as_mut()) {
                    tee.mirror(data);
                }
                // Servers stop polling once the body reports its end.
                if this.inner.is_end_stream() {
                    this.finish();
                }
            },
            Some(Err(_)) | None => this.finish(),
        }

        Poll::Ready(polled)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl<B, F> Drop for TeeBody<B, F>
where
    F: FnOnce(ResponseTee),
{
    fn drop(&mut self) {
        self.finish();
    }
}
