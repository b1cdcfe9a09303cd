//! USB CDC-ACM transport for the register protocol.
//!
//! A datagram is one USB bulk transfer: packets are collected until a short
//! (or zero-length) packet ends the transfer. Replies are framed the same way.

use embassy_stm32::usb_otg::{self, Driver};
use embassy_stm32::{bind_interrupts, peripherals};
use embassy_time::Instant;
use embassy_usb::class::cdc_acm::{CdcAcmClass, State};
use embassy_usb::driver::EndpointError;
use embassy_usb::{Builder, Config, UsbDevice};
use heapless::Vec;
use static_cell::StaticCell;

use quadlink::drivers::protocol::MAX_RESPONSE;
use quadlink::tasks::{CommandServer, DatagramHandler, LinkMonitor};
use quadlink::RegisterBank;

bind_interrupts!(pub struct Irqs {
    OTG_FS => usb_otg::InterruptHandler<peripherals::USB_OTG_FS>;
});

pub type UsbDriver = Driver<'static, peripherals::USB_OTG_FS>;
pub type UsbSerial = CdcAcmClass<'static, UsbDriver>;

const MAX_PACKET: usize = 64;

struct UsbResources {
    config_desc: [u8; 256],
    bos_desc: [u8; 256],
    control_buf: [u8; 64],
    ep_out_buffer: [u8; 256],
}

static RESOURCES: StaticCell<UsbResources> = StaticCell::new();
static STATE: StaticCell<State<'static>> = StaticCell::new();

pub fn init(
    usb_periph: peripherals::USB_OTG_FS,
    pa12: peripherals::PA12,
    pa11: peripherals::PA11,
) -> (UsbDevice<'static, UsbDriver>, UsbSerial) {
    let res = RESOURCES.init(UsbResources {
        config_desc: [0; 256],
        bos_desc: [0; 256],
        control_buf: [0; 64],
        ep_out_buffer: [0; 256],
    });

    let mut usb_config = usb_otg::Config::default();
    usb_config.vbus_detection = false;
    let driver = Driver::new_fs(usb_periph, Irqs, pa12, pa11, &mut res.ep_out_buffer, usb_config);

    let mut config = Config::new(0xc0de, 0xcafe);
    config.manufacturer = Some("quadlink");
    config.product = Some("quadlink flight controller");
    config.serial_number = Some("00000001");

    let mut builder = Builder::new(
        driver,
        config,
        &mut res.config_desc,
        &mut res.bos_desc,
        &mut [], // msos_descs
        &mut res.control_buf,
    );

    let state = STATE.init(State::new());
    let class = CdcAcmClass::new(&mut builder, state, MAX_PACKET as u16);
    let usb = builder.build();

    (usb, class)
}

#[embassy_executor::task]
pub async fn usb_task(mut device: UsbDevice<'static, UsbDriver>) -> ! {
    device.run().await
}

#[embassy_executor::task]
pub async fn transport_task(
    mut class: UsbSerial,
    regs: &'static RegisterBank,
    link: &'static LinkMonitor,
) -> ! {
    let server = CommandServer::new(regs, link);
    loop {
        class.wait_connection().await;
        defmt::info!("usb: host connected");
        let _ = serve(&mut class, &server).await;
        defmt::info!("usb: host disconnected");
    }
}

async fn serve(class: &mut UsbSerial, handler: &impl DatagramHandler) -> Result<(), EndpointError> {
    let mut packet = [0u8; MAX_PACKET];
    let mut datagram: Vec<u8, MAX_RESPONSE> = Vec::new();
    let mut overflow = false;

    loop {
        let n = class.read_packet(&mut packet).await?;
        if datagram.extend_from_slice(&packet[..n]).is_err() {
            overflow = true;
        }
        if n == MAX_PACKET {
            continue;
        }

        if overflow {
            defmt::warn!("usb: oversized datagram dropped");
        } else if let Some(response) = handler.handle(Instant::now(), &datagram) {
            write_datagram(class, &response).await?;
        }
        datagram.clear();
        overflow = false;
    }
}

async fn write_datagram(class: &mut UsbSerial, data: &[u8]) -> Result<(), EndpointError> {
    for chunk in data.chunks(MAX_PACKET) {
        class.write_packet(chunk).await?;
    }
    if data.len() % MAX_PACKET == 0 {
        class.write_packet(&[]).await?;
    }
    Ok(())
}
