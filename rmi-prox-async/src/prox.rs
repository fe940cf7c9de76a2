//! The proximity function device: attention dispatch, enable/control
//! state, lifecycle handling and the debounce timer service.

use core::fmt::Write as _;

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer};
use log::{debug, error, warn};

use crate::bus::RegisterBus;
use crate::conf::Config;
use crate::error::ProxError;
use crate::event::{EventSink, TouchAxis, TouchKey};
use crate::frame::{ProximityFrame, HOVER_Z_MAX, PROXIMITY_FRAME_LEN};
use crate::hover::{HoverDebounce, HoverEvent, TimerOp};
use crate::pdt::{self, FunctionDescriptor};

/// Function number of the proximity sensing block.
pub const FN_PROXIMITY: u8 = 0x51;

/// Offset of the feature-enable byte within the control block.
const PROXIMITY_ENABLES_OFFSET: u16 = 0;
/// Offset of the general-control byte within the control block.
const GENERAL_CONTROL_OFFSET: u16 = 1;

/// How long the finger may go unreported before a lift pass runs.
const FINGER_LIFT_TIME: Duration = Duration::from_millis(50);

/// Feature bits of the proximity enables register.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProximityEnable {
    /// Finger hover detection.
    FingerHover = 1 << 0,
    /// Air swipe detection.
    AirSwipe = 1 << 1,
    /// Large object detection.
    LargeObject = 1 << 2,
    /// Hover pinch detection.
    HoverPinch = 1 << 3,
}

/// Bits of the general control register.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneralControlBit {
    /// Suppress proximity reporting while the surface is touched.
    NoProximityOnTouch = 1 << 2,
    /// Report load continuously.
    ContinuousLoadReport = 1 << 3,
    /// Allow host-issued rezero.
    HostRezero = 1 << 4,
    /// Edge swipe detection.
    EdgeSwipe = 1 << 5,
}

/// Feature-enable value written on attach.
pub const DEFAULT_PROXIMITY_ENABLES: u8 = ProximityEnable::FingerHover as u8;

/// General-control value written on attach.
pub const DEFAULT_GENERAL_CONTROL: u8 =
    GeneralControlBit::NoProximityOnTouch as u8 | GeneralControlBit::HostRezero as u8;

/// Host lifecycle notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The controller was reset; register addresses may have moved.
    Reset,
    /// The controller firmware was reinitialized in place.
    Reinit,
    /// The system is about to suspend.
    EarlySuspend,
    /// The system is suspending.
    Suspend,
}

/// Attributes exposed through the text control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAttr {
    /// The feature-enable byte.
    ProximityEnables,
    /// The general-control byte.
    GeneralControl,
}

/// Commands consumed by the lift timer service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerCmd {
    Arm,
    Cancel,
    Stop,
}

struct Inner<TBUS, TSINK> {
    bus: TBUS,
    sink: TSINK,
    config: Config,
    descriptor: FunctionDescriptor,
    proximity_enables_addr: u16,
    general_control_addr: u16,
    proximity_enables: u8,
    general_control: u8,
    debounce: HoverDebounce,
    removed: bool,
}

impl<TBUS: RegisterBus, TSINK: EventSink> Inner<TBUS, TSINK> {
    fn apply_descriptor(&mut self, descriptor: FunctionDescriptor) {
        self.proximity_enables_addr = descriptor.control_base + PROXIMITY_ENABLES_OFFSET;
        self.general_control_addr = descriptor.control_base + GENERAL_CONTROL_OFFSET;
        self.descriptor = descriptor;
    }

    fn publish_abs_ranges(&mut self) {
        self.sink
            .set_abs_range(TouchAxis::X, 0, self.config.sensor_max_x);
        self.sink
            .set_abs_range(TouchAxis::Y, 0, self.config.sensor_max_y);
        self.sink
            .set_abs_range(TouchAxis::Distance, 0, u16::from(HOVER_Z_MAX));
    }

    async fn set_enables(&mut self, enables: u8) -> Result<(), ProxError<TBUS::Error>> {
        self.bus
            .write(self.proximity_enables_addr, &[enables])
            .await
            .map_err(|err| {
                error!("failed to write proximity enables: {err:?}");
                ProxError::Bus(err)
            })?;
        self.proximity_enables = enables;
        Ok(())
    }

    async fn set_general_control(&mut self, flags: u8) -> Result<(), ProxError<TBUS::Error>> {
        self.bus
            .write(self.general_control_addr, &[flags])
            .await
            .map_err(|err| {
                error!("failed to write general control: {err:?}");
                ProxError::Bus(err)
            })?;
        self.general_control = flags;
        Ok(())
    }

    /// Rewrites both control bytes from their mirrors.
    async fn reapply_controls(&mut self) -> Result<(), ProxError<TBUS::Error>> {
        let enables = self.proximity_enables;
        self.set_enables(enables).await?;
        let flags = self.general_control;
        self.set_general_control(flags).await
    }

    fn report(&mut self, event: HoverEvent) {
        match event {
            HoverEvent::Down { x, y, distance } => {
                self.sink.report_key(TouchKey::Touch, false);
                self.sink.report_key(TouchKey::ToolFinger, true);
                self.report_position(x, y, distance);
            }
            HoverEvent::Move { x, y, distance } => {
                self.report_position(x, y, distance);
            }
            HoverEvent::Lift => {
                self.sink.report_key(TouchKey::Touch, false);
                self.sink.report_key(TouchKey::ToolFinger, false);
                self.sink.sync();
            }
        }
    }

    fn report_position(&mut self, x: u16, y: u16, distance: u8) {
        let x = x.min(self.config.sensor_max_x);
        let y = y.min(self.config.sensor_max_y);
        debug!("hover x = {x} y = {y} distance = {distance}");
        self.sink.report_abs(TouchAxis::X, x);
        self.sink.report_abs(TouchAxis::Y, y);
        self.sink.report_abs(TouchAxis::Distance, u16::from(distance));
        self.sink.sync();
    }

    fn force_lift(&mut self) {
        if let Some(event) = self.debounce.force_lift() {
            self.report(event);
        }
    }
}

/// One attached proximity function.
///
/// All entry points serialize on one internal lock: attention dispatch,
/// timer expiry and control calls never interleave. Register I/O runs with
/// the lock held, so callers must tolerate blocking for a bus transaction.
pub struct ProximityDevice<TBUS: RegisterBus, TSINK: EventSink> {
    inner: Mutex<CriticalSectionRawMutex, Inner<TBUS, TSINK>>,
    // Latest-value channel to the timer service: a re-arm simply replaces
    // a pending command, which is the re-arm semantic the debounce wants.
    // Only ever signalled with the state lock held, so a Stop cannot be
    // overwritten by a stale Arm.
    lift_timer: Signal<CriticalSectionRawMutex, TimerCmd>,
}

impl<TBUS: RegisterBus, TSINK: EventSink> ProximityDevice<TBUS, TSINK> {
    /// Locates the proximity function and brings it up.
    ///
    /// Scans the descriptor table, writes the enable and control bytes
    /// from `config`, publishes the axis ranges to the sink and unmasks
    /// attention delivery. On failure everything acquired so far is
    /// released again, in reverse order, before the error is returned; a
    /// scan miss is the fatal [`ProxError::FunctionNotFound`].
    pub async fn attach(
        mut bus: TBUS,
        sink: TSINK,
        config: Config,
    ) -> Result<Self, ProxError<TBUS::Error>> {
        let descriptor = pdt::scan(&mut bus, FN_PROXIMITY).await?;
        debug!(
            "proximity function found: control {:#06x} data {:#06x} attn mask {:#04x}",
            descriptor.control_base, descriptor.data_base, descriptor.interrupt_mask
        );

        let mut inner = Inner {
            bus,
            sink,
            proximity_enables: config.proximity_enables,
            general_control: config.general_control,
            config,
            descriptor,
            proximity_enables_addr: descriptor.control_base + PROXIMITY_ENABLES_OFFSET,
            general_control_addr: descriptor.control_base + GENERAL_CONTROL_OFFSET,
            debounce: HoverDebounce::new(),
            removed: false,
        };
        inner.reapply_controls().await?;
        inner.publish_abs_ranges();
        inner.bus.enable_attn(true).await.map_err(|err| {
            error!("failed to unmask attention delivery: {err:?}");
            ProxError::Bus(err)
        })?;

        Ok(Self {
            inner: Mutex::new(inner),
            lift_timer: Signal::new(),
        })
    }

    /// Dispatches one host attention.
    ///
    /// Returns without touching the bus when none of the asserted bits
    /// belong to this function. A transport failure aborts processing with
    /// no event and no timer change.
    pub async fn attn(&self, intr_mask: u8) -> Result<(), ProxError<TBUS::Error>> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        if inner.removed {
            return Ok(());
        }
        if inner.descriptor.interrupt_mask & intr_mask == 0 {
            return Ok(());
        }

        let mut raw = [0u8; PROXIMITY_FRAME_LEN];
        let data_base = inner.descriptor.data_base;
        inner.bus.read(data_base, &mut raw).await.map_err(|err| {
            error!("failed to read proximity data block: {err:?}");
            ProxError::Bus(err)
        })?;

        let Some(frame) = ProximityFrame::parse(&raw) else {
            return Ok(());
        };

        let (event, op) = inner.debounce.on_frame(&frame);
        if let Some(event) = event {
            inner.report(event);
        }
        if op == TimerOp::Arm {
            self.lift_timer.signal(TimerCmd::Arm);
        }

        if frame.air_swipe {
            debug!("air swipe, direction bits {:#04b}", frame.swipe_dir);
        }
        if frame.large_object {
            debug!("large object, activity {}", frame.large_object_activity);
        }
        if frame.hover_pinch {
            debug!("hover pinch, direction {}", frame.pinch_dir as u8);
        }
        if frame.object_present {
            debug!("object presence detected");
        }

        Ok(())
    }

    /// Runs the lift timer service.
    ///
    /// The host drives this future next to its dispatch loop; it completes
    /// once the device has been removed.
    pub async fn run(&self) {
        loop {
            match self.lift_timer.wait().await {
                TimerCmd::Stop => return,
                TimerCmd::Cancel => continue,
                TimerCmd::Arm => {}
            }

            // Armed: wait out the debounce window, letting a fresh command
            // push the expiry further out, cancel it, or stop the service.
            loop {
                match select(Timer::after(FINGER_LIFT_TIME), self.lift_timer.wait()).await {
                    Either::First(()) => {
                        self.on_lift_timer().await;
                        break;
                    }
                    Either::Second(TimerCmd::Arm) => continue,
                    Either::Second(TimerCmd::Cancel) => break,
                    Either::Second(TimerCmd::Stop) => return,
                }
            }
        }
    }

    /// One expiry of the lift timer.
    pub(crate) async fn on_lift_timer(&self) {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        if inner.removed {
            return;
        }

        let (event, op) = inner.debounce.on_timer();
        if let Some(event) = event {
            inner.report(event);
        }
        if op == TimerOp::Arm {
            self.lift_timer.signal(TimerCmd::Arm);
        }
    }

    /// Handles a host lifecycle notification.
    ///
    /// Every event lifts immediately and cancels the pending lift pass.
    /// [`LifecycleEvent::Reset`] then rediscovers the function and rewrites
    /// both control bytes; [`LifecycleEvent::Reinit`] rewrites the control
    /// bytes only.
    pub async fn lifecycle(&self, event: LifecycleEvent) -> Result<(), ProxError<TBUS::Error>> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        if inner.removed {
            return Ok(());
        }

        inner.force_lift();
        self.lift_timer.signal(TimerCmd::Cancel);

        match event {
            LifecycleEvent::Reset => {
                let descriptor = pdt::scan(&mut inner.bus, FN_PROXIMITY).await?;
                inner.apply_descriptor(descriptor);
                inner.reapply_controls().await?;
                inner.publish_abs_ranges();
            }
            LifecycleEvent::Reinit => {
                inner.reapply_controls().await?;
            }
            LifecycleEvent::EarlySuspend | LifecycleEvent::Suspend => {}
        }

        Ok(())
    }

    /// Tears the device down.
    ///
    /// Lifts, masks attention delivery and stops the timer service. Taking
    /// the state lock here waits out any expiry that is mid-flight, and
    /// afterwards every entry point is a no-op, so calling this twice is
    /// safe.
    pub async fn remove(&self) {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        if inner.removed {
            return;
        }

        inner.force_lift();
        if let Err(err) = inner.bus.enable_attn(false).await {
            warn!("failed to mask attention delivery: {err:?}");
        }
        inner.removed = true;
        self.lift_timer.signal(TimerCmd::Stop);
    }

    /// Writes the feature-enable byte; the mirror follows only on success.
    pub async fn set_enables(&self, enables: u8) -> Result<(), ProxError<TBUS::Error>> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        if inner.removed {
            return Err(ProxError::Detached);
        }
        inner.set_enables(enables).await
    }

    /// Last successfully written feature-enable byte.
    pub async fn enables(&self) -> u8 {
        self.inner.lock().await.proximity_enables
    }

    /// Writes the general-control byte; the mirror follows only on
    /// success.
    pub async fn set_general_control(&self, flags: u8) -> Result<(), ProxError<TBUS::Error>> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        if inner.removed {
            return Err(ProxError::Detached);
        }
        inner.set_general_control(flags).await
    }

    /// Last successfully written general-control byte.
    pub async fn general_control(&self) -> u8 {
        self.inner.lock().await.general_control
    }

    /// Turns one feature on, preserving the rest of the enable mask.
    pub async fn enable_feature(
        &self,
        feature: ProximityEnable,
    ) -> Result<(), ProxError<TBUS::Error>> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        if inner.removed {
            return Err(ProxError::Detached);
        }
        let enables = inner.proximity_enables | feature as u8;
        inner.set_enables(enables).await
    }

    /// Turns one feature off, preserving the rest of the enable mask.
    pub async fn disable_feature(
        &self,
        feature: ProximityEnable,
    ) -> Result<(), ProxError<TBUS::Error>> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        if inner.removed {
            return Err(ProxError::Detached);
        }
        let enables = inner.proximity_enables & !(feature as u8);
        inner.set_enables(enables).await
    }

    /// Renders an attribute as two-digit hexadecimal text.
    pub async fn attr_show(
        &self,
        attr: ControlAttr,
    ) -> Result<heapless::String<8>, ProxError<TBUS::Error>> {
        let guard = self.inner.lock().await;
        if guard.removed {
            return Err(ProxError::Detached);
        }
        let value = match attr {
            ControlAttr::ProximityEnables => guard.proximity_enables,
            ControlAttr::GeneralControl => guard.general_control,
        };

        let mut out = heapless::String::new();
        // Cannot fail: the rendered text is at most five bytes.
        let _ = writeln!(out, "0x{value:02x}");
        Ok(out)
    }

    /// Parses a control surface write and applies it.
    ///
    /// The text is hexadecimal, case-insensitive, with an optional `0x`
    /// prefix; anything else is rejected as
    /// [`ProxError::InvalidArgument`] without touching any register.
    pub async fn attr_store(
        &self,
        attr: ControlAttr,
        text: &str,
    ) -> Result<(), ProxError<TBUS::Error>> {
        let Some(value) = parse_hex_byte(text) else {
            return Err(ProxError::InvalidArgument);
        };
        match attr {
            ControlAttr::ProximityEnables => self.set_enables(value).await,
            ControlAttr::GeneralControl => self.set_general_control(value).await,
        }
    }
}

/// Parses unsigned hexadecimal text, truncating to the low byte.
fn parse_hex_byte(text: &str) -> Option<u8> {
    let text = text.trim();
    let text = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u32::from_str_radix(text, 16).ok().map(|value| value as u8)
}
