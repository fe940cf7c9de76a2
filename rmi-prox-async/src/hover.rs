//! The hover debounce state machine.
//!
//! Raw detections flicker while a finger drifts at the edge of sensing
//! range, so a lift is only reported after the lift timer runs out twice in
//! a row with no fresh qualifying frame: one pass to confirm, one to lift.
//! Any qualifying frame in between restarts the window.

use crate::frame::ProximityFrame;

/// Debounce phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HoverPhase {
    /// No finger near the sensor.
    Idle,
    /// A finger is hovering and the lift timer is armed.
    Hovering,
    /// The lift timer ran out once; one more quiet expiry lifts.
    LiftPending,
}

/// A state change to be delivered to the input-event sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoverEvent {
    /// A finger entered hover range.
    Down { x: u16, y: u16, distance: u8 },
    /// The hovering finger moved.
    Move { x: u16, y: u16, distance: u8 },
    /// The finger left hover range.
    Lift,
}

/// What the caller must do with the lift timer after feeding the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOp {
    /// Leave the timer alone.
    None,
    /// Start the timer, or push a pending expiry out by a full window.
    Arm,
}

/// Turns noisy per-frame hover detections into stable down/move/lift
/// events.
///
/// Owned by one device instance and only ever driven with its state lock
/// held.
#[derive(Debug)]
pub struct HoverDebounce {
    phase: HoverPhase,
    lift_reported: bool,
}

impl HoverDebounce {
    pub const fn new() -> Self {
        Self {
            phase: HoverPhase::Idle,
            lift_reported: false,
        }
    }

    /// Whether a finger is currently considered present.
    pub fn finger_present(&self) -> bool {
        self.phase != HoverPhase::Idle
    }

    /// Feeds one decoded frame.
    ///
    /// A frame qualifies when its finger hover flag is set and its raw
    /// depth is nonzero; anything else leaves both the phase and the timer
    /// untouched.
    pub fn on_frame(&mut self, frame: &ProximityFrame) -> (Option<HoverEvent>, TimerOp) {
        if !frame.finger_hover || frame.hover_z == 0 {
            return (None, TimerOp::None);
        }

        let x = frame.hover_x;
        let y = frame.hover_y;
        let distance = frame.distance();

        let event = match self.phase {
            HoverPhase::Idle => HoverEvent::Down { x, y, distance },
            // A frame during LiftPending means the finger never left.
            HoverPhase::Hovering | HoverPhase::LiftPending => HoverEvent::Move { x, y, distance },
        };

        self.phase = HoverPhase::Hovering;
        self.lift_reported = false;
        (Some(event), TimerOp::Arm)
    }

    /// Feeds one lift timer expiry.
    pub fn on_timer(&mut self) -> (Option<HoverEvent>, TimerOp) {
        match self.phase {
            // Stale expiry, nothing to do.
            HoverPhase::Idle => (None, TimerOp::None),
            // First quiet window: confirmation pass, run the timer once
            // more before lifting.
            HoverPhase::Hovering => {
                self.phase = HoverPhase::LiftPending;
                (None, TimerOp::Arm)
            }
            HoverPhase::LiftPending => {
                self.phase = HoverPhase::Idle;
                self.lift_reported = true;
                (Some(HoverEvent::Lift), TimerOp::None)
            }
        }
    }

    /// Lifts immediately, regardless of phase.
    ///
    /// Repeated calls collapse into a single lift report.
    pub fn force_lift(&mut self) -> Option<HoverEvent> {
        let already_lifted = self.phase == HoverPhase::Idle && self.lift_reported;
        self.phase = HoverPhase::Idle;
        if already_lifted {
            return None;
        }
        self.lift_reported = true;
        Some(HoverEvent::Lift)
    }
}

impl Default for HoverDebounce {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hover_frame(x: u16, y: u16, z: u8) -> ProximityFrame {
        ProximityFrame {
            finger_hover: true,
            air_swipe: false,
            large_object: false,
            hover_pinch: false,
            object_present: false,
            hover_x: x,
            hover_y: y,
            hover_z: z,
            swipe_dir: 0,
            large_object_activity: 0,
            pinch_dir: false,
        }
    }

    #[test]
    fn first_frame_is_down_later_frames_are_moves() {
        let mut debounce = HoverDebounce::new();

        let (event, op) = debounce.on_frame(&hover_frame(100, 50, 200));
        assert_eq!(
            event,
            Some(HoverEvent::Down {
                x: 100,
                y: 50,
                distance: 55
            })
        );
        assert_eq!(op, TimerOp::Arm);
        assert!(debounce.finger_present());

        let (event, op) = debounce.on_frame(&hover_frame(110, 60, 190));
        assert_eq!(
            event,
            Some(HoverEvent::Move {
                x: 110,
                y: 60,
                distance: 65
            })
        );
        assert_eq!(op, TimerOp::Arm);
    }

    #[test]
    fn zero_depth_does_not_qualify() {
        let mut debounce = HoverDebounce::new();

        let (event, op) = debounce.on_frame(&hover_frame(100, 50, 0));
        assert_eq!(event, None);
        assert_eq!(op, TimerOp::None);
        assert!(!debounce.finger_present());
    }

    #[test]
    fn missing_hover_flag_does_not_qualify() {
        let mut debounce = HoverDebounce::new();
        let mut frame = hover_frame(100, 50, 200);
        frame.finger_hover = false;

        let (event, op) = debounce.on_frame(&frame);
        assert_eq!(event, None);
        assert_eq!(op, TimerOp::None);
    }

    #[test]
    fn lift_takes_two_quiet_expiries() {
        let mut debounce = HoverDebounce::new();
        debounce.on_frame(&hover_frame(100, 50, 200));

        // First expiry confirms; nothing is reported yet.
        let (event, op) = debounce.on_timer();
        assert_eq!(event, None);
        assert_eq!(op, TimerOp::Arm);
        assert!(debounce.finger_present());

        let (event, op) = debounce.on_timer();
        assert_eq!(event, Some(HoverEvent::Lift));
        assert_eq!(op, TimerOp::None);
        assert!(!debounce.finger_present());
    }

    #[test]
    fn frame_during_lift_pending_resumes_hovering() {
        let mut debounce = HoverDebounce::new();
        debounce.on_frame(&hover_frame(100, 50, 200));
        debounce.on_timer();

        let (event, op) = debounce.on_frame(&hover_frame(120, 70, 180));
        assert_eq!(
            event,
            Some(HoverEvent::Move {
                x: 120,
                y: 70,
                distance: 75
            })
        );
        assert_eq!(op, TimerOp::Arm);

        // The window starts over: confirmation pass, then lift.
        assert_eq!(debounce.on_timer(), (None, TimerOp::Arm));
        assert_eq!(debounce.on_timer(), (Some(HoverEvent::Lift), TimerOp::None));
    }

    #[test]
    fn stale_expiry_in_idle_does_nothing() {
        let mut debounce = HoverDebounce::new();
        assert_eq!(debounce.on_timer(), (None, TimerOp::None));
    }

    #[test]
    fn force_lift_reports_once() {
        let mut debounce = HoverDebounce::new();

        assert_eq!(debounce.force_lift(), Some(HoverEvent::Lift));
        assert_eq!(debounce.force_lift(), None);
    }

    #[test]
    fn force_lift_while_hovering_then_again() {
        let mut debounce = HoverDebounce::new();
        debounce.on_frame(&hover_frame(100, 50, 200));

        assert_eq!(debounce.force_lift(), Some(HoverEvent::Lift));
        assert!(!debounce.finger_present());
        assert_eq!(debounce.force_lift(), None);

        // A new qualifying frame rearms lift reporting.
        debounce.on_frame(&hover_frame(100, 50, 200));
        assert_eq!(debounce.force_lift(), Some(HoverEvent::Lift));
    }

    #[test]
    fn timer_lift_suppresses_following_force_lift() {
        let mut debounce = HoverDebounce::new();
        debounce.on_frame(&hover_frame(100, 50, 200));
        debounce.on_timer();
        debounce.on_timer();

        assert_eq!(debounce.force_lift(), None);
    }
}
