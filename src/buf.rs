//! Fixed-capacity packet buffer with in-place header push/pop.
//!
//! Every layer in this stack prepends or strips its own header in
//! place, so the buffer keeps a logical window `[start, start+len)`
//! inside a backing allocation that never moves or reallocates once
//! created — headers go on and come off by sliding the window, never
//! by copying the payload.

use alloc::vec::Vec;

use crate::NetError;

/// Backing capacity for a [`Buffer`]. Sized for one full Ethernet frame
/// (MTU + header) plus headroom for every header this stack can push
/// in front of a maximum-size payload (Ethernet + IP + UDP/ICMP).
pub const BUF_CAPACITY: usize = 2048;

/// A contiguous byte buffer with a movable active window.
///
/// `data` is a fixed-size, zero-initialized allocation; `start` and
/// `len` track the active window within it. Headroom is
/// `start`, tailroom is `data.len() - start - len`.
pub struct Buffer {
    data: Vec<u8>,
    start: usize,
    len: usize,
}

impl Buffer {
    /// Allocate a new buffer whose active window holds `payload_len`
    /// zeroed bytes, placed as far toward the front of the backing
    /// allocation's tail as possible so callers get maximal headroom
    /// for header pushes (mirrors the C implementation seeding `data`
    /// at `payload + (BUF_MAX_LEN - len)`).
    pub fn new(payload_len: usize) -> Result<Self, NetError> {
        if payload_len > BUF_CAPACITY {
            return Err(NetError::BufferFull);
        }
        Ok(Buffer {
            data: alloc::vec![0u8; BUF_CAPACITY],
            start: BUF_CAPACITY - payload_len,
            len: payload_len,
        })
    }

    /// Build a buffer whose active window is an exact copy of `src`.
    pub fn from_slice(src: &[u8]) -> Result<Self, NetError> {
        let mut buf = Buffer::new(src.len())?;
        buf.as_mut_slice().copy_from_slice(src);
        Ok(buf)
    }

    /// Length of the active window.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the active window is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Backing capacity (read-only; never changes after `new`).
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Immutable view of the active window.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.start..self.start + self.len]
    }

    /// Mutable view of the active window.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data[self.start..self.start + self.len]
    }

    /// Extend the window forward by `n` bytes, i.e. make room for a
    /// header of size `n` at the front. The new bytes are zeroed.
    /// Fails if there isn't `n` bytes of headroom.
    pub fn add_header(&mut self, n: usize) -> Result<(), NetError> {
        if n > self.start {
            return Err(NetError::BufferFull);
        }
        self.start -= n;
        self.len += n;
        self.data[self.start..self.start + n].fill(0);
        Ok(())
    }

    /// Retract the front by `n` bytes, i.e. strip a header already
    /// consumed by the caller. Fails if the window is shorter than
    /// `n`.
    pub fn remove_header(&mut self, n: usize) -> Result<(), NetError> {
        if n > self.len {
            return Err(NetError::BufferFull);
        }
        self.start += n;
        self.len -= n;
        Ok(())
    }

    /// Extend the window backward by `n` zeroed bytes (trailing
    /// padding). Fails if there isn't `n` bytes of tailroom.
    pub fn add_padding(&mut self, n: usize) -> Result<(), NetError> {
        let tailroom = self.data.len() - self.start - self.len;
        if n > tailroom {
            return Err(NetError::BufferFull);
        }
        let pad_start = self.start + self.len;
        self.data[pad_start..pad_start + n].fill(0);
        self.len += n;
        Ok(())
    }

    /// Retract the back by `n` bytes. Fails if the window is shorter
    /// than `n`.
    pub fn remove_padding(&mut self, n: usize) -> Result<(), NetError> {
        if n > self.len {
            return Err(NetError::BufferFull);
        }
        self.len -= n;
        Ok(())
    }
}

impl Clone for Buffer {
    /// Deep copy of the active window, used as the value-clone hook
    /// when a [`crate::timedmap::TimedMap`] stores buffers (the ARP
    /// pending map) so the caller's original buffer can be reused the
    /// moment `Arp::send` returns.
    ///
    /// `self.len` is already `<= BUF_CAPACITY` since `self` exists, so
    /// `from_slice` on it can never hit the capacity check.
    fn clone(&self) -> Self {
        match Buffer::from_slice(self.as_slice()) {
            Ok(buf) => buf,
            Err(_) => unreachable!("an existing buffer's length cannot exceed BUF_CAPACITY"),
        }
    }
}
