//! STM32F405 flight board: clock tree and the [`Hal`] implementation.

pub mod dshot;
pub mod flash;
pub mod icm42688;
pub mod usb;

use embassy_stm32::adc::Adc;
use embassy_stm32::gpio::{Output, AnyPin};
use embassy_stm32::peripherals::{ADC1, PC2, SPI1};
use embassy_stm32::rcc::*;
use embassy_stm32::time::Hertz as TimeHertz;
use embassy_stm32::Config;

use quadlink::hal::{AxisRemap, BatteryGauge, Hal, Indicator};
use quadlink::HalError;

use self::dshot::Dshot300;
use self::icm42688::Icm42688;

pub struct Board {
    pub p: embassy_stm32::Peripherals,
}

impl Board {
    pub fn init() -> Self {
        let mut config = Config::default();
        config.rcc.hse = Some(Hse {
            freq: TimeHertz(8_000_000),
            mode: HseMode::Oscillator,
        });
        config.rcc.pll_src = PllSource::HSE;
        config.rcc.pll = Some(Pll {
            prediv: PllPreDiv::DIV4,
            mul: PllMul::MUL168,
            divp: Some(PllPDiv::DIV2), // 168 MHz
            divq: Some(PllQDiv::DIV7), // 48 MHz USB
            divr: None,
        });
        config.rcc.sys = Sysclk::PLL1_P;
        config.rcc.ahb_pre = AHBPrescaler::DIV1;
        config.rcc.apb1_pre = APBPrescaler::DIV4;
        config.rcc.apb2_pre = APBPrescaler::DIV2;

        let p = embassy_stm32::init(config);

        Self { p }
    }
}

/// Gyro LSB per deg/s at ±2000 dps.
const GYRO_LSB_PER_DPS: f32 = 16.4;
/// Accel LSB per g at ±16 g.
const ACCEL_LSB_PER_G: f32 = 2048.0;

/// VBAT sense: 12-bit ADC at 3.3 V behind a 10k/1k divider.
pub const GAUGE: BatteryGauge = BatteryGauge {
    slope: 3300.0 / 4095.0 * 11.0,
    offset: 0.0,
};

pub struct FlightBoard {
    pub motors: [Dshot300; 4],
    pub imu: Icm42688<'static, SPI1>,
    pub adc: Adc<'static, ADC1>,
    pub vbat: PC2,
    pub led: Output<'static, AnyPin>,
    /// Accel half of the last burst read, until consumed.
    accel: Option<[i16; 3]>,
}

impl FlightBoard {
    pub fn new(
        motors: [Dshot300; 4],
        imu: Icm42688<'static, SPI1>,
        adc: Adc<'static, ADC1>,
        vbat: PC2,
        led: Output<'static, AnyPin>,
    ) -> Self {
        Self {
            motors,
            imu,
            adc,
            vbat,
            led,
            accel: None,
        }
    }
}

impl Hal for FlightBoard {
    // IMU mounted with the board arrow pointing forward
    const AXIS_REMAP: AxisRemap = AxisRemap::IDENTITY;

    fn output_duty(&mut self, motor: usize, duty: u16) {
        if let Some(esc) = self.motors.get_mut(motor) {
            esc.send_throttle(dshot::duty_to_throttle(duty));
        }
    }

    fn battery_raw(&mut self) -> u16 {
        self.adc.read(&mut self.vbat)
    }

    fn set_indicator(&mut self, state: Indicator) {
        match state {
            Indicator::Ready => self.led.set_high(),
            Indicator::Calibrating => self.led.set_low(),
        }
    }

    /// Burst-reads both sensors; the accel half is served by the next
    /// [`Hal::read_accel`].
    fn read_gyro(&mut self) -> Result<[f32; 3], HalError> {
        let (accel, gyro) = self.imu.read_all().map_err(|_| HalError::Bus)?;
        self.accel = Some(accel);
        Ok(gyro.map(|v| v as f32 / GYRO_LSB_PER_DPS))
    }

    fn read_accel(&mut self) -> Result<[f32; 3], HalError> {
        let accel = self.accel.take().ok_or(HalError::NotReady)?;
        Ok(accel.map(|v| v as f32 / ACCEL_LSB_PER_G))
    }
}
