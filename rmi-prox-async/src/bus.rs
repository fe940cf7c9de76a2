//! The register access capability supplied by the host.

use core::fmt::Debug;

/// Register read/write and attention-gating primitives for one controller.
///
/// The host supplies an implementation bound to whatever transport the
/// controller sits on. Calls may suspend for the duration of a bus
/// transaction and are never retried here; every failure is handed back to
/// the caller untouched.
#[allow(async_fn_in_trait)]
pub trait RegisterBus {
    /// The transport error type.
    type Error: Debug;

    /// Reads `buf.len()` bytes starting at register `addr`.
    async fn read(&mut self, addr: u16, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Writes `buf` starting at register `addr`.
    async fn write(&mut self, addr: u16, buf: &[u8]) -> Result<(), Self::Error>;

    /// Masks or unmasks attention delivery for this controller.
    async fn enable_attn(&mut self, enable: bool) -> Result<(), Self::Error>;
}
