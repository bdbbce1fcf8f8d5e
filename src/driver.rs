//! The link driver boundary.
//!
//! The physical or virtual NIC is an external collaborator: this crate
//! only needs a place to call into it and a place to be called from
//! it. `NetDevice` is the Rust expression of the C implementation's
//! `driver_send`/`driver_recv` contract. No concrete hardware driver
//! (register-level E1000/VirtIO programming) lives here — that is the
//! embedding kernel's job.

use crate::NetError;

/// A network device capable of transmitting and receiving whole
/// Ethernet frames (FCS stripped on receive, computed on send, by the
/// device itself).
pub trait NetDevice {
    /// Transmit one complete Ethernet frame.
    fn transmit(&mut self, frame: &[u8]) -> Result<(), NetError>;

    /// Fill `buf` with the next received frame, if any. Returns the
    /// number of bytes written, or `0` if no frame is pending. Mirrors
    /// `driver_recv`'s `>0` / `0` contract rather than returning
    /// `Option<usize>`, since "no frame ready" is the overwhelmingly
    /// common case on every `NetStack::poll` call, not an error.
    fn receive(&mut self, buf: &mut [u8]) -> usize;
}
