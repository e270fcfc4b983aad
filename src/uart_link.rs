use std::thread;
use std::time::{Duration, Instant};

use esp_idf_hal::delay;
use esp_idf_hal::uart::UartDriver;
use esp_idf_hal::units::Hertz;

use crate::transport::{log_bytes, LinTransport};

/// esp-idf UART 驱动之上的 LIN 传输实现。
/// 驱动在 main 里按引脚建好后整体移交进来。
pub struct EspUartTransport<'d> {
    uart: UartDriver<'d>,
    started_at: Instant,
    pending: Option<u8>,
    verbose: bool,
}

impl<'d> EspUartTransport<'d> {
    pub fn new(uart: UartDriver<'d>, verbose: bool) -> Self {
        Self {
            uart,
            started_at: Instant::now(),
            pending: None,
            verbose,
        }
    }

    fn read_nonblocking(&mut self) -> Option<u8> {
        let mut buf = [0u8; 1];
        match self.uart.read(&mut buf, delay::NON_BLOCK) {
            Ok(1) => Some(buf[0]),
            Ok(_) => None,
            Err(err) => {
                log::warn!("UART RX error: {:?}", err);
                None
            }
        }
    }
}

impl LinTransport for EspUartTransport<'_> {
    fn configure(&mut self, baud: u32) {
        if let Err(err) = self.uart.change_baudrate(Hertz(baud)) {
            log::warn!("UART reconfigure failed: {:?}", err);
        }
        // 丢弃上一次交换遗留的陈旧字节
        self.pending = None;
        while self.read_nonblocking().is_some() {}
    }

    fn write_byte(&mut self, byte: u8) -> usize {
        self.write_bytes(&[byte])
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> usize {
        if self.verbose {
            log_bytes("UART TX:", bytes);
        }
        match self.uart.write(bytes) {
            Ok(count) => count,
            Err(err) => {
                log::warn!("UART TX error: {:?}", err);
                0
            }
        }
    }

    fn byte_available(&mut self) -> bool {
        if self.pending.is_none() {
            self.pending = self.read_nonblocking();
        }
        self.pending.is_some()
    }

    fn read_byte(&mut self) -> u8 {
        self.pending.take().unwrap_or(0)
    }

    fn flush_output(&mut self) {
        if let Err(err) = self.uart.wait_tx_done(delay::BLOCK) {
            log::warn!("UART TX flush failed: {:?}", err);
        }
    }

    fn set_baud_rate(&mut self, baud: u32) {
        if let Err(err) = self.uart.change_baudrate(Hertz(baud)) {
            log::warn!("UART baud change failed: {:?}", err);
        }
    }

    fn close(&mut self) {
        // 驱动的生命周期跟随所有权,逐帧之间保持打开;
        // 只需丢掉尚未消费的预读字节
        self.pending = None;
    }

    fn monotonic_millis(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    fn sleep_millis(&mut self, ms: u32) {
        thread::sleep(Duration::from_millis(ms as u64));
    }
}
