use embassy_stm32::gpio::{AnyPin, Output};
use embassy_stm32::spi::{Error, Instance, Spi};

use quadlink::drivers::storage::{ConfigStore, IMAGE_SIZE};
use quadlink::StorageError;

const CMD_WRITE_ENABLE: u8 = 0x06;
const CMD_READ_STATUS1: u8 = 0x05;
const CMD_READ_DATA: u8 = 0x03;
const CMD_PAGE_PROGRAM: u8 = 0x02;
const CMD_SECTOR_ERASE: u8 = 0x20;
const CMD_JEDEC_ID: u8 = 0x9F;

const STATUS_BUSY: u8 = 0x01;
const PAGE_SIZE: usize = 256;

/// First 4 KiB sector holds the persisted config.
const CONFIG_ADDR: u32 = 0x0000_0000;

/// Winbond W25Qxx SPI NOR flash.
pub struct W25qxx<'d, T: Instance, Tx, Rx> {
    spi: Spi<'d, T, Tx, Rx>,
    cs: Output<'d, AnyPin>,
}

impl<'d, T: Instance, Tx, Rx> W25qxx<'d, T, Tx, Rx> {
    pub fn new(spi: Spi<'d, T, Tx, Rx>, cs: Output<'d, AnyPin>) -> Self {
        Self { spi, cs }
    }

    /// Sends `header` then runs `f` with chip select held low.
    fn transaction(
        &mut self,
        header: &[u8],
        f: impl FnOnce(&mut Spi<'d, T, Tx, Rx>) -> Result<(), Error>,
    ) -> Result<(), Error> {
        self.cs.set_low();
        let res = self.spi.blocking_write(header).and_then(|()| f(&mut self.spi));
        self.cs.set_high();
        res
    }

    pub fn read_id(&mut self) -> Result<[u8; 3], Error> {
        let mut id = [0u8; 3];
        self.transaction(&[CMD_JEDEC_ID], |spi| spi.blocking_read(&mut id))?;
        Ok(id)
    }

    fn wait_idle(&mut self) -> Result<(), Error> {
        loop {
            let mut status = [0u8; 1];
            self.transaction(&[CMD_READ_STATUS1], |spi| spi.blocking_read(&mut status))?;
            if status[0] & STATUS_BUSY == 0 {
                return Ok(());
            }
        }
    }

    fn write_enable(&mut self) -> Result<(), Error> {
        self.transaction(&[CMD_WRITE_ENABLE], |_| Ok(()))
    }

    pub fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), Error> {
        let [_, a2, a1, a0] = addr.to_be_bytes();
        self.transaction(&[CMD_READ_DATA, a2, a1, a0], |spi| spi.blocking_read(buf))
    }

    pub fn erase_sector(&mut self, addr: u32) -> Result<(), Error> {
        let [_, a2, a1, a0] = addr.to_be_bytes();
        self.write_enable()?;
        self.transaction(&[CMD_SECTOR_ERASE, a2, a1, a0], |_| Ok(()))?;
        self.wait_idle()
    }

    /// `data` must not cross a page boundary.
    pub fn program_page(&mut self, addr: u32, data: &[u8]) -> Result<(), Error> {
        let [_, a2, a1, a0] = addr.to_be_bytes();
        self.write_enable()?;
        self.transaction(&[CMD_PAGE_PROGRAM, a2, a1, a0], |spi| spi.blocking_write(data))?;
        self.wait_idle()
    }
}

impl<'d, T: Instance, Tx, Rx> ConfigStore for W25qxx<'d, T, Tx, Rx> {
    fn read_image(&mut self, buf: &mut [u8; IMAGE_SIZE]) -> Result<(), StorageError> {
        self.read(CONFIG_ADDR, buf).map_err(|_| StorageError::Backend)
    }

    fn write_image(&mut self, image: &[u8; IMAGE_SIZE]) -> Result<(), StorageError> {
        const _: () = assert!(IMAGE_SIZE <= PAGE_SIZE);
        self.erase_sector(CONFIG_ADDR)
            .and_then(|()| self.program_page(CONFIG_ADDR, image))
            .map_err(|_| StorageError::Backend)
    }
}
