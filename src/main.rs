#![no_std]
#![no_main]

mod board;

use embassy_executor::Spawner;
use embassy_stm32::adc::Adc;
use embassy_stm32::dma::NoDma;
use embassy_stm32::gpio::{Level, Output, Pin, Speed};
use embassy_stm32::spi::{Config as SpiConfig, Spi};
use embassy_stm32::time::Hertz as TimeHertz;
use embassy_time::{Delay, Duration, Timer};
use {defmt_rtt as _, panic_probe as _};

use quadlink::config::FlightConfig;
use quadlink::drivers::ahrs::Madgwick;
use quadlink::drivers::storage::WifiConfig;
use quadlink::tasks::{self, ControlLoop, LinkMonitor};
use quadlink::RegisterBank;

use crate::board::dshot::Dshot300;
use crate::board::flash::W25qxx;
use crate::board::icm42688::Icm42688;
use crate::board::{Board, FlightBoard};

// ── Shared state ──────────────────────────────────────────────────────────────
static REGISTERS: RegisterBank = RegisterBank::new();
static LINK: LinkMonitor = LinkMonitor::new();

#[embassy_executor::task]
async fn control_task(hal: FlightBoard) -> ! {
    let control = ControlLoop::new(FlightConfig::default(), board::GAUGE, Madgwick::new());
    tasks::run(control, hal, &REGISTERS, &LINK).await
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    // 1. Board init (168 MHz PLL)
    let board = Board::init();
    let p = board.p;
    REGISTERS.reset();

    // 2. USB CDC-ACM transport
    let (usb_dev, usb_serial) = board::usb::init(p.USB_OTG_FS, p.PA12, p.PA11);
    spawner.spawn(board::usb::usb_task(usb_dev)).unwrap();
    spawner
        .spawn(board::usb::transport_task(usb_serial, &REGISTERS, &LINK))
        .unwrap();

    // 3. SPI1 @ 10 MHz: ICM-42688 (SCK=PA5, MOSI=PA7, MISO=PA6, CS=PB12)
    let mut spi_config = SpiConfig::default();
    spi_config.frequency = TimeHertz(10_000_000);
    let spi = Spi::new(p.SPI1, p.PA5, p.PA7, p.PA6, NoDma, NoDma, spi_config);
    let cs_gyro = Output::new(p.PB12.degrade(), Level::High, Speed::VeryHigh);
    let mut imu = Icm42688::new(spi, cs_gyro);

    Timer::after(Duration::from_millis(100)).await;
    if imu.init().await.is_err() {
        defmt::error!("icm42688 init failed");
    }

    // 4. SPI3: W25Q config flash (SCK=PC10, MOSI=PB5, MISO=PC11, CS=PA15)
    let mut flash_spi_config = SpiConfig::default();
    flash_spi_config.frequency = TimeHertz(20_000_000);
    let flash_spi = Spi::new(p.SPI3, p.PC10, p.PB5, p.PC11, NoDma, NoDma, flash_spi_config);
    let flash_cs = Output::new(p.PA15.degrade(), Level::High, Speed::VeryHigh);
    let mut flash = W25qxx::new(flash_spi, flash_cs);
    match flash.read_id() {
        Ok(id) => defmt::info!("flash JEDEC id {:#x}", id),
        Err(_) => defmt::warn!("flash not responding"),
    }
    let wifi = WifiConfig::load(&mut flash);
    if wifi.is_empty() {
        defmt::info!("no wifi credentials stored");
    } else {
        defmt::info!("wifi ssid: {=[u8]:a}", wifi.ssid());
    }

    // 5. DShot300 motors M1..M4 (PB0, PB1, PA3, PA2)
    let motors = [
        Dshot300::new(p.PB0.degrade()),
        Dshot300::new(p.PB1.degrade()),
        Dshot300::new(p.PA3.degrade()),
        Dshot300::new(p.PA2.degrade()),
    ];

    // 6. Battery sense on PC2, status LED on PC13
    let adc = Adc::new(p.ADC1, &mut Delay);
    let led = Output::new(p.PC13.degrade(), Level::Low, Speed::Low);

    let hal = FlightBoard::new(motors, imu, adc, p.PC2, led);
    spawner.spawn(control_task(hal)).unwrap();
}
