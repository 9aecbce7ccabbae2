//! Reassembles newline-delimited lines from arbitrary socket chunks

use super::WatchError;

/// Initial capacity of the line buffer
pub const INITIAL_CAPACITY: usize = 4096;

/// Growable byte buffer that splits an incoming byte stream into lines
///
/// Bytes are accumulated until a `\n` arrives; the bytes before it form one
/// line. The buffer is then cleared but keeps its allocation, so a long-lived
/// stream of similar-sized messages settles at a single allocation.
#[derive(Debug)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Append `chunk`, returning every line it completes in arrival order
    ///
    /// The newline itself is not part of the returned line. Invalid UTF-8 is
    /// replaced lossily; the JSON decoder rejects such lines later.
    ///
    /// # Errors
    ///
    /// Returns `WatchError::BufferAllocation` if the buffer cannot grow. Lines
    /// completed earlier in the same chunk are lost in that case, but the
    /// session ends anyway.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, WatchError> {
        let mut lines = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.append(&rest[..pos])?;
            lines.push(String::from_utf8_lossy(&self.buf).into_owned());
            self.buf.clear();
            rest = &rest[pos + 1..];
        }

        self.append(rest)?;
        Ok(lines)
    }

    /// Bytes of the incomplete line buffered so far
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    fn append(&mut self, bytes: &[u8]) -> Result<(), WatchError> {
        let needed = self.buf.len() + bytes.len();
        if needed > self.buf.capacity() {
            // Double until the bytes fit
            let mut target = self.buf.capacity().max(1);
            while target < needed {
                target = target.saturating_mul(2);
            }
            self.buf
                .try_reserve_exact(target - self.buf.len())
                .map_err(|source| WatchError::BufferAllocation {
                    requested: target,
                    source,
                })?;
        }
        self.buf.extend_from_slice(bytes);
        Ok(())
    }
}
