//! A byte-bounded sink that merges stdout and stderr.
//!
//! Unlike `moltis-tools::exec::truncate_output_for_display` (which collects
//! the full output and trims the string afterward), this sink caps memory
//! *during* the run: once the ceiling is reached it appends a single
//! truncation marker and silently drops every subsequent write while the
//! subprocess keeps running to completion.

use std::sync::Mutex;

const TRUNCATION_MARKER: &str = "\n... [output truncated]";

struct Inner {
    buf: Vec<u8>,
    cap: usize,
    truncated: bool,
}

impl Inner {
    fn push(&mut self, data: &[u8]) {
        if self.truncated {
            return;
        }
        let remaining = self.cap.saturating_sub(self.buf.len());
        if data.len() <= remaining {
            self.buf.extend_from_slice(data);
            return;
        }
        self.buf.extend_from_slice(&data[..remaining]);
        self.buf.extend_from_slice(TRUNCATION_MARKER.as_bytes());
        self.truncated = true;
    }
}

/// Thread-safe handle shared between the stdout and stderr reader tasks.
pub struct RingSink {
    inner: Mutex<Inner>,
}

impl RingSink {
    #[must_use]
    pub fn new(cap_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                buf: Vec::with_capacity(cap_bytes.min(64 * 1024)),
                cap: cap_bytes,
                truncated: false,
            }),
        }
    }

    pub fn push(&self, data: &[u8]) {
        #[allow(clippy::unwrap_used)]
        self.inner.lock().unwrap().push(data);
    }

    /// Consume the sink, returning the merged output as a lossily-decoded
    /// string and whether truncation occurred.
    #[must_use]
    pub fn into_output(self) -> (String, bool) {
        #[allow(clippy::unwrap_used)]
        let inner = self.inner.into_inner().unwrap();
        (String::from_utf8_lossy(&inner.buf).into_owned(), inner.truncated)
    }
}
