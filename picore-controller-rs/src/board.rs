//! Board wiring: GPIO inputs and the four H-bridge PWM slices.
//!
//! Implements the engine's [`InputPins`] and [`PwmSink`] over Embassy RP
//! peripherals.

use core::convert::Infallible;

use embassy_rp::gpio::Input;
use embassy_rp::pwm::{self, Pwm};
use picore::register_bank::map::INPUT_COUNT;
use picore_io_engine_rs::{InputPins, PwmChannel, PwmSink};

// ── PwmConfig ────────────────────────────────────────────────────────────

/// Carrier settings shared by every H-bridge slice.
///
/// [`PwmConfig::default()`] gives an 8-bit duty (`top = 254`, so a compare
/// of 255 is fully on) at about 1 kHz from the 125 MHz system clock in
/// phase-correct mode: `125 MHz / (2 × 255 × 245) ≈ 1000 Hz`.
#[derive(Clone, Copy)]
pub struct PwmConfig {
    /// Integer clock divider. Default: 245.
    pub divider: u8,
    /// Counter wrap value. Default: 254.
    pub top: u16,
    /// Count up then down, halving the carrier frequency. Default: true.
    pub phase_correct: bool,
}

impl Default for PwmConfig {
    fn default() -> Self {
        Self {
            divider: 245,
            top: 254,
            phase_correct: true,
        }
    }
}

impl PwmConfig {
    /// Slice configuration with both outputs at zero duty.
    pub fn slice_config(&self) -> pwm::Config {
        let mut config = pwm::Config::default();
        config.divider = self.divider.into();
        config.top = self.top;
        config.phase_correct = self.phase_correct;
        config.compare_a = 0;
        config.compare_b = 0;
        config
    }
}

// ── Outputs ──────────────────────────────────────────────────────────────

struct Slice {
    pwm: Pwm<'static>,
    config: pwm::Config,
}

/// The four H-bridge slices in [`PwmChannel`] order: VU left, VU right,
/// backlight, tape motor. Channel A of each slice is IN1, channel B is IN2.
pub struct BoardPwm {
    slices: [Slice; 4],
}

impl BoardPwm {
    pub fn new(slices: [Pwm<'static>; 4], config: &PwmConfig) -> Self {
        Self {
            slices: slices.map(|pwm| Slice {
                pwm,
                config: config.slice_config(),
            }),
        }
    }
}

impl PwmSink for BoardPwm {
    // Compare writes to an enabled slice cannot fail.
    type Error = Infallible;

    fn set_duty(&mut self, channel: PwmChannel, duty: u8) -> Result<(), Infallible> {
        let index = channel.index();
        let slice = &mut self.slices[index / 2];
        if index % 2 == 0 {
            slice.config.compare_a = u16::from(duty);
        } else {
            slice.config.compare_b = u16::from(duty);
        }
        slice.pwm.set_config(&slice.config);
        Ok(())
    }
}

// ── Inputs ───────────────────────────────────────────────────────────────

/// Contact inputs 1-12 and the encoder push-button, all behind pull-ups.
pub struct BoardInputs {
    contacts: [Input<'static>; INPUT_COUNT],
    button: Input<'static>,
}

impl BoardInputs {
    pub fn new(contacts: [Input<'static>; INPUT_COUNT], button: Input<'static>) -> Self {
        Self { contacts, button }
    }
}

impl InputPins for BoardInputs {
    fn contact_level(&mut self, channel: usize) -> bool {
        self.contacts[channel].is_high()
    }

    fn button_level(&mut self) -> bool {
        self.button.is_high()
    }
}
