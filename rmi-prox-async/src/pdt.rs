//! Discovery of the proximity function in the paged descriptor table.
//!
//! Every 256-byte register page may carry a table of fixed-size function
//! descriptors, walked downward from [`PDT_START`]. Each entry names one
//! on-chip function, its four register base addresses within the page and
//! the number of attention sources it owns.

use log::{debug, error};

use crate::bus::RegisterBus;
use crate::error::ProxError;

/// First (highest) descriptor entry address within a page.
pub const PDT_START: u16 = 0x00e9;
/// Lower bound of the descriptor region; entries never start at or below
/// it.
pub const PDT_END: u16 = 0x000a;
/// Size of one descriptor entry.
pub const PDT_ENTRY_SIZE: u16 = 6;
/// Number of register pages serviced during a scan.
pub const PAGES_TO_SERVICE: u8 = 10;

/// Attention source counts occupy the low three bits of their field.
const MASK_3BIT: u8 = 0x07;

/// One raw descriptor table entry, page-relative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdtEntry {
    /// Query register base within the page.
    pub query_base: u8,
    /// Command register base within the page.
    pub command_base: u8,
    /// Control register base within the page.
    pub control_base: u8,
    /// Data register base within the page.
    pub data_base: u8,
    /// Attention source count field, unmasked.
    pub interrupt_sources: u8,
    /// Function number; zero marks the end of a page's table.
    pub function_number: u8,
}

impl PdtEntry {
    /// Maps the six descriptor bytes as laid out on the device.
    pub fn parse(raw: &[u8; PDT_ENTRY_SIZE as usize]) -> Self {
        Self {
            query_base: raw[0],
            command_base: raw[1],
            control_base: raw[2],
            data_base: raw[3],
            interrupt_sources: raw[4],
            function_number: raw[5],
        }
    }
}

/// A located function: absolute base addresses and its share of the
/// attention mask.
///
/// Immutable once captured; the addresses stay valid until the controller
/// is reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionDescriptor {
    /// Function number as enumerated in the table.
    pub function_number: u8,
    /// Query register base, page folded in.
    pub query_base: u16,
    /// Command register base, page folded in.
    pub command_base: u16,
    /// Control register base, page folded in.
    pub control_base: u16,
    /// Data register base, page folded in.
    pub data_base: u16,
    /// Number of attention sources owned by the function.
    pub interrupt_sources: u8,
    /// Attention bits assigned to the function. Never overlaps bits
    /// claimed by functions enumerated before it.
    pub interrupt_mask: u8,
}

/// Walks the descriptor table until `function` is found.
///
/// Pages are serviced in order; within a page, entries are read downward
/// from [`PDT_START`] and a zero function number ends that page. The
/// attention sources of every function enumerated before the match decide
/// which attention bits the match is assigned. Exhausting all pages is
/// [`ProxError::FunctionNotFound`].
pub async fn scan<TBUS: RegisterBus>(
    bus: &mut TBUS,
    function: u8,
) -> Result<FunctionDescriptor, ProxError<TBUS::Error>> {
    let mut interrupt_count: u16 = 0;

    for page in 0..u16::from(PAGES_TO_SERVICE) {
        let mut addr = PDT_START;
        while addr > PDT_END {
            let entry_addr = addr | (page << 8);
            let mut raw = [0u8; PDT_ENTRY_SIZE as usize];
            bus.read(entry_addr, &mut raw).await.map_err(|err| {
                error!("descriptor read at {entry_addr:#06x} failed: {err:?}");
                ProxError::Bus(err)
            })?;

            let entry = PdtEntry::parse(&raw);
            if entry.function_number == 0x00 {
                // End of this page's table.
                break;
            }
            debug!("found F{:02x} on page {page}", entry.function_number);

            if entry.function_number == function {
                return Ok(locate(&entry, page, interrupt_count));
            }

            interrupt_count += u16::from(entry.interrupt_sources & MASK_3BIT);
            addr -= PDT_ENTRY_SIZE;
        }
    }

    error!("function F{function:02x} not present in the descriptor table");
    Err(ProxError::FunctionNotFound)
}

/// Folds the page into the entry's base addresses and assigns its slice of
/// the attention mask.
fn locate(entry: &PdtEntry, page: u16, interrupt_count: u16) -> FunctionDescriptor {
    let sources = entry.interrupt_sources & MASK_3BIT;
    let offset = (interrupt_count % 8) as u8;

    let mut interrupt_mask = 0u8;
    // Bits past bit 7 are not representable in the one-byte mask.
    for bit in offset..(offset + sources).min(8) {
        interrupt_mask |= 1 << bit;
    }

    FunctionDescriptor {
        function_number: entry.function_number,
        query_base: u16::from(entry.query_base) | (page << 8),
        command_base: u16::from(entry.command_base) | (page << 8),
        control_base: u16::from(entry.control_base) | (page << 8),
        data_base: u16::from(entry.data_base) | (page << 8),
        interrupt_sources: sources,
        interrupt_mask,
    }
}
