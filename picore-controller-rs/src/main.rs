//! picore-controller
//!
//! Firmware for the PiCore peripheral controller on a Raspberry Pi Pico
//! (RP2040). The host talks to a 128-byte register bank over I2C; this
//! firmware keeps that bank in step with the hardware:
//!
//! 1. The I2C slave task applies host writes to the bank and streams reads
//!    out of it through the address-pointer endpoint.
//! 2. The encoder task wakes on every A/B edge and steps the shared
//!    quadrature counters.
//! 3. The tick task runs at 100 Hz: it debounces the contacts, drains the
//!    encoder, classifies the button, publishes all of it into the bank,
//!    then sets the H-bridge duty cycles from the bank.
//! 4. The heartbeat task blinks the on-board LED.

#![no_std]
#![no_main]

mod board;

use defmt::*;
use embassy_executor::Spawner;
use embassy_futures::select::select;
use embassy_rp::bind_interrupts;
use embassy_rp::gpio::{Input, Level, Output, Pull};
use embassy_rp::i2c;
use embassy_rp::i2c_slave::{self, I2cSlave, ReadStatus};
use embassy_rp::peripherals::I2C1;
use embassy_rp::pwm::Pwm;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::Timer;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use picore::endpoint::{I2cEndpoint, BUFFER_SIZE, SLAVE_ADDRESS};
use picore::register_bank::map::FIRMWARE_VERSION;
use picore::register_bank::RegisterBank;
use picore_io_engine_rs::{run_ticks, EngineConfig, SharedEncoder};

use crate::board::{BoardInputs, BoardPwm, PwmConfig};

// ---------------------------------------------------------------------------
// Interrupt binding
// ---------------------------------------------------------------------------

// Wire the I2C1 peripheral interrupt to Embassy's async handler.
bind_interrupts!(struct Irqs {
    I2C1_IRQ => i2c::InterruptHandler<I2C1>;
});

// ---------------------------------------------------------------------------
// Static storage
// ---------------------------------------------------------------------------

type SharedBank = Mutex<CriticalSectionRawMutex, RegisterBank>;

/// Register bank shared by the I2C slave task and the tick task. Neither
/// holds the lock across an await on the bus or the ticker.
static BANK: StaticCell<SharedBank> = StaticCell::new();

/// Quadrature counters, stepped by the encoder task and drained by the tick.
static ENCODER: SharedEncoder = SharedEncoder::new();

/// Status LED toggle interval.
const HEARTBEAT_MS: u64 = 500;

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// I2C slave loop.
///
/// Write payloads go to the endpoint in one piece, and an encoder reset they
/// request is applied before the bank lock is released. Reads are answered
/// one byte at a time so register side effects happen only for bytes the
/// host actually asks for.
#[embassy_executor::task]
async fn i2c_task(mut device: I2cSlave<'static, I2C1>, bank: &'static SharedBank) {
    info!("I2C slave listening at {=u8:#x}", SLAVE_ADDRESS);

    let mut endpoint = I2cEndpoint::new();
    let mut buf = [0u8; BUFFER_SIZE];

    loop {
        match device.listen(&mut buf).await {
            Ok(i2c_slave::Command::Write(len)) => {
                apply_write(&mut endpoint, &mut *bank.lock().await, &buf[..len]);
            }
            Ok(i2c_slave::Command::WriteRead(len)) => {
                apply_write(&mut endpoint, &mut *bank.lock().await, &buf[..len]);
                serve_read(&mut device, &mut endpoint, bank).await;
            }
            Ok(i2c_slave::Command::Read) => {
                serve_read(&mut device, &mut endpoint, bank).await;
            }
            Ok(i2c_slave::Command::GeneralCall(len)) => {
                debug!("ignoring general call ({} bytes)", len);
            }
            Err(i2c_slave::Error::PartialWrite(len)) => {
                let mut bank = bank.lock().await;
                apply_write(&mut endpoint, &mut bank, &buf[..len]);
                endpoint.report_overflow(&mut bank);
            }
            Err(e) => error!("I2C slave error: {}", e),
        }
    }
}

fn apply_write(endpoint: &mut I2cEndpoint, bank: &mut RegisterBank, bytes: &[u8]) {
    endpoint.receive(bank, bytes);
    ENCODER.apply_pending_reset(bank);
}

async fn serve_read(
    device: &mut I2cSlave<'static, I2C1>,
    endpoint: &mut I2cEndpoint,
    bank: &'static SharedBank,
) {
    loop {
        let byte = endpoint.respond(&mut *bank.lock().await);

        match device.respond_to_read(&[byte]).await {
            Ok(ReadStatus::NeedMoreBytes) => {}
            Ok(ReadStatus::Done) => break,
            Ok(ReadStatus::LeftoverBytes(count)) => {
                endpoint.rewind(count as u8);
                break;
            }
            Err(e) => {
                error!("I2C read aborted: {}", e);
                break;
            }
        }
    }

    endpoint.finish_read();
}

/// Steps the shared counters on every edge of either encoder channel.
#[embassy_executor::task]
async fn encoder_task(mut pin_a: Input<'static>, mut pin_b: Input<'static>) {
    ENCODER.prime(pin_a.is_high(), pin_b.is_high());
    info!("Encoder task started");

    loop {
        select(pin_a.wait_for_any_edge(), pin_b.wait_for_any_edge()).await;
        ENCODER.on_edge(pin_a.is_high(), pin_b.is_high());
    }
}

/// Thin wrapper that monomorphises the generic `run_ticks` so it can be
/// spawned as a concrete Embassy task.
#[embassy_executor::task]
async fn tick_task(inputs: BoardInputs, pwm: BoardPwm, bank: &'static SharedBank, config: EngineConfig) {
    run_ticks(inputs, pwm, bank, &ENCODER, config).await
}

#[embassy_executor::task]
async fn heartbeat_task(mut led: Output<'static>) {
    loop {
        led.toggle();
        Timer::after_millis(HEARTBEAT_MS).await;
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let p = embassy_rp::init(Default::default());

    let (major, minor, patch) = FIRMWARE_VERSION;
    info!("picore-controller v{}.{}.{} starting", major, minor, patch);

    // ── Pin assignments ──────────────────────────────────────────────────
    // I2C1 SDA / SCL      -> GP2 / GP3
    // VU left IN1 / IN2   -> GP0 / GP1   (PWM slice 0)
    // VU right IN1 / IN2  -> GP4 / GP5   (PWM slice 2)
    // Backlight IN1 / IN2 -> GP6 / GP7   (PWM slice 3)
    // Tape IN1 / IN2      -> GP8 / GP9   (PWM slice 4)
    // Encoder A / B / SW  -> GP10 / GP11 / GP12
    // Contacts 1-12       -> GP13-GP22, GP26, GP27
    // Status LED          -> GP25
    // All inputs use the internal pull-ups.
    // ─────────────────────────────────────────────────────────────────────

    let mut i2c_config = i2c_slave::Config::default();
    i2c_config.addr = u16::from(SLAVE_ADDRESS);
    let device = I2cSlave::new(p.I2C1, p.PIN_3, p.PIN_2, Irqs, i2c_config);
    info!("I2C1 slave configured");

    let pwm_config = PwmConfig::default();
    let slice_config = pwm_config.slice_config();
    let pwm = BoardPwm::new(
        [
            Pwm::new_output_ab(p.PWM_SLICE0, p.PIN_0, p.PIN_1, slice_config.clone()),
            Pwm::new_output_ab(p.PWM_SLICE2, p.PIN_4, p.PIN_5, slice_config.clone()),
            Pwm::new_output_ab(p.PWM_SLICE3, p.PIN_6, p.PIN_7, slice_config.clone()),
            Pwm::new_output_ab(p.PWM_SLICE4, p.PIN_8, p.PIN_9, slice_config),
        ],
        &pwm_config,
    );
    info!("PWM slices configured (top {}, divider {})", pwm_config.top, pwm_config.divider);

    let contacts = [
        Input::new(p.PIN_13, Pull::Up),
        Input::new(p.PIN_14, Pull::Up),
        Input::new(p.PIN_15, Pull::Up),
        Input::new(p.PIN_16, Pull::Up),
        Input::new(p.PIN_17, Pull::Up),
        Input::new(p.PIN_18, Pull::Up),
        Input::new(p.PIN_19, Pull::Up),
        Input::new(p.PIN_20, Pull::Up),
        Input::new(p.PIN_21, Pull::Up),
        Input::new(p.PIN_22, Pull::Up),
        Input::new(p.PIN_26, Pull::Up),
        Input::new(p.PIN_27, Pull::Up),
    ];
    let button = Input::new(p.PIN_12, Pull::Up);
    let inputs = BoardInputs::new(contacts, button);

    let pin_a = Input::new(p.PIN_10, Pull::Up);
    let pin_b = Input::new(p.PIN_11, Pull::Up);

    let led = Output::new(p.PIN_25, Level::Low);

    let bank = BANK.init(Mutex::new(RegisterBank::new()));

    // ── Spawn tasks ──────────────────────────────────────────────────────

    spawner.spawn(i2c_task(device, bank)).unwrap();
    spawner.spawn(encoder_task(pin_a, pin_b)).unwrap();
    spawner.spawn(tick_task(inputs, pwm, bank, EngineConfig::default())).unwrap();
    spawner.spawn(heartbeat_task(led)).unwrap();

    info!("All tasks spawned");
}
