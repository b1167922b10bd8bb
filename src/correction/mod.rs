//! Converts averaged drift into hardware register corrections.
//!
//! Vertical and rotational corrections are each split across a
//! reference-side and a comparison-side register: a positive value goes to
//! the reference register with the comparison register zeroed, anything else
//! goes negated to the comparison register. Register values are in 1/16
//! pixel units; rotations use the family's slope width as lever arm.

mod io;

pub use io::{
    MemoryRegisterBank, RegisterCallbacks, RegisterIo, RegisterWrite, EEPROM_COMMIT_BIT,
};
pub(crate) use io::RegisterBus;

use crate::camera::{CameraFamily, LogicalRegister};
use crate::config::Criteria;
use crate::queue::AverageDifference;
use crate::trace::{trace_event, trace_span, trace_warn};
use crate::util::math::round_to_units;
use crate::util::{SelfCalError, SelfCalResult};
use std::thread;
use std::time::Duration;

/// Register units per pixel.
pub const UNITS_PER_PIXEL: f64 = 16.0;

/// Mask applied to values persisted in the base-position registers.
pub const BASE_REGISTER_MASK: i32 = 0x1FF;

/// Correction currently programmed into the camera.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CorrectionState {
    /// Reference minus comparison vertical shift, in 1/16 pixel.
    pub vertical_register: i32,
    /// Vertical shift in pixels.
    pub vertical_pixels: f64,
    /// Reference minus comparison rotation register.
    pub rotation_register: i32,
    /// Rotation in radians.
    pub rotation_radians: f64,
}

/// Register deltas applied by one correction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CorrectionOutcome {
    /// Subtracted from the vertical register.
    pub vertical_delta: i32,
    /// Subtracted from the rotation register, when rotation correction ran.
    pub rotation_delta: Option<i32>,
    /// State read back after writing.
    pub state: CorrectionState,
}

/// Timing for the EEPROM commit handshake.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EepromTiming {
    pub poll_interval: Duration,
    pub max_polls: u32,
}

/// Reads, writes and persists correction registers.
pub struct CorrectionApplier {
    bus: RegisterBus,
    slope_width: i32,
    eeprom: EepromTiming,
    state: CorrectionState,
}

impl CorrectionApplier {
    pub(crate) fn new(bus: RegisterBus, family: CameraFamily, eeprom: EepromTiming) -> Self {
        Self {
            bus,
            slope_width: family.rotation_slope_width(),
            eeprom,
            state: CorrectionState::default(),
        }
    }

    /// The correction cached at the last refresh.
    pub fn state(&self) -> CorrectionState {
        self.state
    }

    /// Re-reads the four correction registers from the camera.
    pub fn refresh(&mut self) -> SelfCalResult<CorrectionState> {
        let ref_v = self.bus.read(LogicalRegister::ReferenceVerticalShift)? as i32;
        let cmp_v = self.bus.read(LogicalRegister::ComparisonVerticalShift)? as i32;
        let ref_r = self.bus.read(LogicalRegister::ReferenceRotation)? as i32;
        let cmp_r = self.bus.read(LogicalRegister::ComparisonRotation)? as i32;

        let vertical_register = ref_v - cmp_v;
        let rotation_register = ref_r - cmp_r;
        let lever = (self.slope_width as f64) * UNITS_PER_PIXEL;
        self.state = CorrectionState {
            vertical_register,
            vertical_pixels: vertical_register as f64 / UNITS_PER_PIXEL,
            rotation_register,
            rotation_radians: (rotation_register as f64 / lever).atan(),
        };
        Ok(self.state)
    }

    fn write_split(
        &mut self,
        reference: LogicalRegister,
        comparison: LogicalRegister,
        value: i32,
    ) -> SelfCalResult<()> {
        let (ref_value, cmp_value) = if value > 0 { (value, 0) } else { (0, -value) };
        self.bus.write(reference, ref_value)?;
        self.bus.write(comparison, cmp_value)
    }

    /// Programs an absolute vertical shift in 1/16 pixel.
    pub fn write_vertical(&mut self, value: i32) -> SelfCalResult<()> {
        self.write_split(
            LogicalRegister::ReferenceVerticalShift,
            LogicalRegister::ComparisonVerticalShift,
            value,
        )
    }

    /// Programs an absolute rotation register value.
    pub fn write_rotation(&mut self, value: i32) -> SelfCalResult<()> {
        self.write_split(
            LogicalRegister::ReferenceRotation,
            LogicalRegister::ComparisonRotation,
            value,
        )
    }

    /// Applies a correction for `average` under `criteria`.
    ///
    /// The caller decides whether the criteria are met; this only performs
    /// the register traffic.
    pub fn apply(
        &mut self,
        average: &AverageDifference,
        criteria: &Criteria,
    ) -> SelfCalResult<CorrectionOutcome> {
        let _span = trace_span!("correction").entered();
        let current = self.refresh()?;

        let vertical_delta = round_to_units(average.vertical_difference * UNITS_PER_PIXEL);
        let vertical = current.vertical_register - vertical_delta;
        self.write_vertical(vertical)?;

        let mut rotation_delta = None;
        if criteria.rotation_correction {
            let lever = self.slope_width as f64 * UNITS_PER_PIXEL;
            let delta = round_to_units(average.rotation.tan() * lever);
            self.write_rotation(current.rotation_register - delta)?;
            rotation_delta = Some(delta);
        }

        let state = self.refresh()?;
        trace_event!(
            "correction_applied",
            vertical_delta = vertical_delta,
            vertical_register = state.vertical_register,
            rotation_register = state.rotation_register
        );

        if criteria.auto_save {
            self.save(state.vertical_register, state.rotation_register)?;
        }

        Ok(CorrectionOutcome {
            vertical_delta,
            rotation_delta,
            state,
        })
    }

    /// Persists the cached correction to the base registers and EEPROM.
    pub fn save_latest(&mut self) -> SelfCalResult<()> {
        let state = self.state;
        self.save(state.vertical_register, state.rotation_register)
    }

    fn save(&mut self, vertical: i32, rotation: i32) -> SelfCalResult<()> {
        self.bus
            .write(LogicalRegister::BaseVertical, vertical & BASE_REGISTER_MASK)?;
        self.bus
            .write(LogicalRegister::BaseRotation, rotation & BASE_REGISTER_MASK)?;
        self.commit_eeprom()
    }

    /// Requests an EEPROM commit and polls until the busy bit clears.
    pub fn commit_eeprom(&mut self) -> SelfCalResult<()> {
        self.bus
            .write(LogicalRegister::EepromControl, EEPROM_COMMIT_BIT as i32)?;
        for _ in 0..self.eeprom.max_polls {
            let value = self.bus.read(LogicalRegister::EepromControl)?;
            if value & EEPROM_COMMIT_BIT == 0 {
                return Ok(());
            }
            if !self.eeprom.poll_interval.is_zero() {
                thread::sleep(self.eeprom.poll_interval);
            }
        }
        trace_warn!("eeprom_timeout", polls = self.eeprom.max_polls);
        Err(SelfCalError::EepromTimeout {
            polls: self.eeprom.max_polls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{CorrectionApplier, EepromTiming, MemoryRegisterBank, RegisterBus};
    use crate::camera::{CameraFamily, LogicalRegister};
    use crate::config::Criteria;
    use crate::queue::AverageDifference;
    use crate::util::SelfCalError;
    use std::time::Duration;

    fn applier(bank: &MemoryRegisterBank) -> CorrectionApplier {
        let bus = RegisterBus::new(bank.family(), Box::new(bank.clone()), Duration::ZERO);
        CorrectionApplier::new(
            bus,
            bank.family(),
            EepromTiming {
                poll_interval: Duration::ZERO,
                max_polls: 10,
            },
        )
    }

    #[test]
    fn refresh_converts_registers_to_physical_units() {
        let bank = MemoryRegisterBank::new(CameraFamily::Xc);
        bank.set(LogicalRegister::ComparisonVerticalShift, 8);
        bank.set(LogicalRegister::ReferenceRotation, 256 * 16);
        let state = applier(&bank).refresh().unwrap();
        assert_eq!(state.vertical_register, -8);
        assert!((state.vertical_pixels + 0.5).abs() < 1e-12);
        assert_eq!(state.rotation_register, 4096);
        assert!((state.rotation_radians - std::f64::consts::FRAC_PI_4).abs() < 1e-12);
    }

    #[test]
    fn negative_average_moves_reference_side() {
        let bank = MemoryRegisterBank::new(CameraFamily::Vm);
        let mut applier = applier(&bank);
        let average = AverageDifference {
            frame_count: 120,
            vertical_difference: -0.4,
            rotation: 0.0,
            std_dev: 0.01,
        };
        let criteria = Criteria {
            auto_save: false,
            ..Criteria::default()
        };
        let outcome = applier.apply(&average, &criteria).unwrap();
        assert_eq!(outcome.vertical_delta, -6);
        assert_eq!(bank.writes_to(LogicalRegister::ReferenceVerticalShift), vec![6]);
        assert_eq!(bank.writes_to(LogicalRegister::ComparisonVerticalShift), vec![0]);
        assert!(bank.writes_to(LogicalRegister::ReferenceRotation).is_empty());
        assert_eq!(outcome.state.vertical_register, 6);
    }

    #[test]
    fn rotation_correction_uses_slope_width() {
        let bank = MemoryRegisterBank::new(CameraFamily::Xc);
        let mut applier = applier(&bank);
        let average = AverageDifference {
            frame_count: 120,
            vertical_difference: 0.0,
            rotation: 0.002,
            std_dev: 0.01,
        };
        let criteria = Criteria {
            rotation_correction: true,
            auto_save: false,
            ..Criteria::default()
        };
        let outcome = applier.apply(&average, &criteria).unwrap();
        // tan(0.002) * 256 * 16 = 8.19
        assert_eq!(outcome.rotation_delta, Some(8));
        assert_eq!(bank.writes_to(LogicalRegister::ComparisonRotation), vec![8]);
        assert_eq!(bank.writes_to(LogicalRegister::ReferenceRotation), vec![0]);
    }

    #[test]
    fn save_masks_base_registers_and_commits() {
        let bank = MemoryRegisterBank::new(CameraFamily::Xc);
        bank.set(LogicalRegister::ComparisonVerticalShift, 3);
        let mut applier = applier(&bank);
        applier.refresh().unwrap();
        applier.save_latest().unwrap();
        assert_eq!(bank.writes_to(LogicalRegister::BaseVertical), vec![0x1FD]);
        assert_eq!(bank.writes_to(LogicalRegister::BaseRotation), vec![0]);
        assert_eq!(bank.writes_to(LogicalRegister::EepromControl), vec![0x0004]);
    }

    #[test]
    fn eeprom_poll_is_bounded() {
        let bank = MemoryRegisterBank::new(CameraFamily::Vm);
        bank.hold_eeprom_busy(true);
        let err = applier(&bank).commit_eeprom().unwrap_err();
        assert_eq!(err, SelfCalError::EepromTimeout { polls: 10 });
        assert_eq!(bank.reads(), 10);
    }
}
