//! An asynchronous, `no_std` driver for the proximity/hover function of
//! paged register-mapped touch controllers.
//!
//! Controllers of this family enumerate their on-chip functions in a paged
//! descriptor table. This driver locates the proximity function in that
//! table, takes ownership of its feature-enable and general-control
//! registers, decodes the packed proximity data block on every attention
//! interrupt, and debounces the raw hover detections into stable
//! down/move/lift input events.
//!
//! The host supplies two capabilities: a [`RegisterBus`] bound to the
//! controller's transport, and an [`EventSink`] accepting the decoded input
//! events. Attention dispatch, the debounce timer service and control
//! surface calls may arrive from independent tasks; the driver serializes
//! them internally.
//!
//! # Usage
//!
//! Implement the two capability traits for your platform, attach the
//! device, and drive its timer service next to your dispatch loop.
//!
//! ```no_run
//! use rmi_prox_async::{
//!     Config, EventSink, LifecycleEvent, ProximityDevice, RegisterBus, TouchAxis, TouchKey,
//! };
//!
//! // Wraps whatever transport the controller sits on.
//! struct HostBus;
//!
//! impl RegisterBus for HostBus {
//!     type Error = core::convert::Infallible;
//!
//!     async fn read(&mut self, _addr: u16, _buf: &mut [u8]) -> Result<(), Self::Error> {
//!         Ok(())
//!     }
//!
//!     async fn write(&mut self, _addr: u16, _buf: &[u8]) -> Result<(), Self::Error> {
//!         Ok(())
//!     }
//!
//!     async fn enable_attn(&mut self, _enable: bool) -> Result<(), Self::Error> {
//!         Ok(())
//!     }
//! }
//!
//! // Forwards reports to the host input layer.
//! struct HostSink;
//!
//! impl EventSink for HostSink {
//!     fn set_abs_range(&mut self, _axis: TouchAxis, _min: u16, _max: u16) {}
//!     fn report_key(&mut self, _key: TouchKey, _pressed: bool) {}
//!     fn report_abs(&mut self, _axis: TouchAxis, _value: u16) {}
//!     fn sync(&mut self) {}
//! }
//!
//! async fn bring_up() {
//!     let config = Config::new(1439, 2559);
//!     let device = ProximityDevice::attach(HostBus, HostSink, config)
//!         .await
//!         .unwrap();
//!
//!     // Drive the debounce timer service; it completes after `remove`.
//!     let service = device.run();
//!
//!     // From the host's interrupt dispatch:
//!     //     device.attn(asserted_mask).await?;
//!     //
//!     // On controller reset or suspend:
//!     //     device.lifecycle(LifecycleEvent::Reset).await?;
//!     let _ = service;
//! }
//! ```

#![no_std]

#[cfg(test)]
extern crate std;

pub mod bus;
pub mod conf;
pub mod error;
pub mod event;
pub mod frame;
pub mod hover;
pub mod pdt;
pub mod prox;

#[cfg(test)]
pub(crate) mod mock;

pub use bus::RegisterBus;
pub use conf::Config;
pub use error::ProxError;
pub use event::{EventSink, TouchAxis, TouchKey};
pub use frame::{ProximityFrame, HOVER_Z_MAX, PROXIMITY_FRAME_LEN};
pub use hover::{HoverDebounce, HoverEvent, TimerOp};
pub use pdt::{FunctionDescriptor, PdtEntry};
pub use prox::{
    ControlAttr, GeneralControlBit, LifecycleEvent, ProximityDevice, ProximityEnable,
    DEFAULT_GENERAL_CONTROL, DEFAULT_PROXIMITY_ENABLES, FN_PROXIMITY,
};
