use cortex_m::asm;
use embassy_stm32::gpio::{AnyPin, Level, Output, Speed};

/// DShot throttle range; 0 is the disarmed/stop command.
const THROTTLE_MIN: u16 = 48;
const THROTTLE_MAX: u16 = 2047;

/// Maps a 10-bit duty onto DShot throttle. Zero duty stops the motor.
pub fn duty_to_throttle(duty: u16) -> u16 {
    if duty == 0 {
        return 0;
    }
    let duty = duty.min(1023) as u32;
    let span = (THROTTLE_MAX - THROTTLE_MIN) as u32;
    THROTTLE_MIN + (duty * span / 1023) as u16
}

/// Core cycles per DShot300 bit at 168 MHz, as (high, low).
const ONE: (u32, u32) = (420, 140);
const ZERO: (u32, u32) = (210, 350);
const FRAME_GAP: u32 = 5200;

/// Bit-banged DShot300 output.
pub struct Dshot300 {
    pin: Output<'static, AnyPin>,
}

impl Dshot300 {
    pub fn new(pin: AnyPin) -> Self {
        Self {
            pin: Output::new(pin, Level::Low, Speed::VeryHigh),
        }
    }

    pub fn send_throttle(&mut self, throttle: u16) {
        let frame = dshot_frame(throttle, false);
        // Bit timing must not be stretched by USB interrupts
        critical_section::with(|_| {
            for bit in (0..16).rev() {
                let (high, low) = if frame & (1 << bit) != 0 { ONE } else { ZERO };
                self.pin.set_high();
                asm::delay(high);
                self.pin.set_low();
                asm::delay(low);
            }
            asm::delay(FRAME_GAP);
        });
    }
}

/// 11-bit value, telemetry bit, 4-bit XOR checksum.
pub fn dshot_frame(value: u16, telemetry: bool) -> u16 {
    let packet = ((value & 0x07ff) << 1) | telemetry as u16;
    let csum = (packet ^ (packet >> 4) ^ (packet >> 8)) & 0x000f;
    (packet << 4) | csum
}
