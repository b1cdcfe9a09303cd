use embassy_stm32::dma::NoDma;
use embassy_stm32::gpio::{AnyPin, Output};
use embassy_stm32::spi::{Error, Instance, Spi};
use embassy_time::{Duration, Timer};

const REG_DEVICE_CONFIG: u8 = 0x11;
const REG_ACCEL_DATA_X1: u8 = 0x1F;
const REG_PWR_MGMT0: u8 = 0x4E;
const REG_WHO_AM_I: u8 = 0x75;

const READ: u8 = 0x80;
const WHO_AM_I: u8 = 0x47;
/// Accel XYZ then gyro XYZ, big-endian.
const BURST_LEN: usize = 12;

/// ICM-42688-P on SPI, default ranges (±2000 dps, ±16 g).
pub struct Icm42688<'d, T: Instance> {
    spi: Spi<'d, T, NoDma, NoDma>,
    cs: Output<'d, AnyPin>,
}

impl<'d, T: Instance> Icm42688<'d, T> {
    pub fn new(spi: Spi<'d, T, NoDma, NoDma>, cs: Output<'d, AnyPin>) -> Self {
        Self { spi, cs }
    }

    /// Full-duplex transfer with chip select held low.
    fn transfer(&mut self, rx: &mut [u8], tx: &[u8]) -> Result<(), Error> {
        self.cs.set_low();
        let res = self.spi.blocking_transfer(rx, tx);
        self.cs.set_high();
        res
    }

    fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), Error> {
        let mut rx = [0u8; 2];
        self.transfer(&mut rx, &[reg & !READ, value])
    }

    fn read_reg(&mut self, reg: u8) -> Result<u8, Error> {
        let mut rx = [0u8; 2];
        self.transfer(&mut rx, &[reg | READ, 0])?;
        Ok(rx[1])
    }

    pub async fn init(&mut self) -> Result<(), Error> {
        // Soft reset
        self.write_reg(REG_DEVICE_CONFIG, 0x01)?;
        Timer::after(Duration::from_millis(10)).await;

        let id = self.read_reg(REG_WHO_AM_I)?;
        if id != WHO_AM_I {
            defmt::warn!("icm42688: unexpected WHO_AM_I {=u8:#x}", id);
        }

        // Gyro and accel in low noise mode
        self.write_reg(REG_PWR_MGMT0, 0x0F)?;
        Timer::after(Duration::from_millis(50)).await;

        Ok(())
    }

    /// One burst read: (accel, gyro) raw counts.
    pub fn read_all(&mut self) -> Result<([i16; 3], [i16; 3]), Error> {
        let mut tx = [0u8; BURST_LEN + 1];
        tx[0] = REG_ACCEL_DATA_X1 | READ;
        let mut rx = [0u8; BURST_LEN + 1];
        self.transfer(&mut rx, &tx)?;

        let word = |i: usize| i16::from_be_bytes([rx[1 + 2 * i], rx[2 + 2 * i]]);
        Ok(([word(0), word(1), word(2)], [word(3), word(4), word(5)]))
    }
}
