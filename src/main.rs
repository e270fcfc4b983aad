// 模块划分：协议编解码、接收状态机、总线控制器、传输与设备接线
mod bus;
mod model;
mod proto;
mod receiver;
mod smart_led;
mod status;
mod transport;
mod uart_link;

use std::sync::{Arc, Mutex};

use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::gpio::{AnyInputPin, AnyOutputPin};
use esp_idf_hal::prelude::*;
use esp_idf_hal::uart;

use bus::LinBus;
use model::LinSettings;
use status::BusStatus;
use uart_link::EspUartTransport;

fn main() {
    // ESP-IDF 运行时初始化（链接补丁 & 日志）
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    log::info!("LIN gateway booting (ESP-IDF)...");

    // 编译期配置:波特率与可选的轮询帧标识符
    let baud = option_env!("LIN_BAUD")
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(19_200);
    let poll_id = option_env!("LIN_POLL_ID").and_then(parse_frame_id);

    // 外设初始化：UART1 接 LIN 收发器，RMT 驱动状态灯
    let peripherals = Peripherals::take().unwrap();
    let pins = peripherals.pins;
    let rmt_channel = peripherals.rmt.channel0;
    let uart_config = uart::config::Config::new().baudrate(Hertz(baud));
    let uart = uart::UartDriver::new(
        peripherals.uart1,
        pins.gpio17,
        pins.gpio18,
        AnyInputPin::none(),
        AnyOutputPin::none(),
        &uart_config,
    )
    .unwrap();

    // 状态灯任务：反映最近一次帧交换的结果
    let status = Arc::new(Mutex::new(BusStatus::new()));
    smart_led::spawn_led_task(rmt_channel, pins.gpio48, status.clone());

    let settings = LinSettings::with_baud(baud);
    let verbose = settings.verbose;
    let mut lin = LinBus::new(EspUartTransport::new(uart, verbose), settings);

    match poll_id {
        Some(id) => log::info!("polling frame {:02X} at {} baud", id, baud),
        None => log::info!("passive monitor mode at {} baud", baud),
    }

    loop {
        let valid = match poll_id {
            Some(id) => lin.request_frame(id),
            None => lin.listen(),
        };
        if let Ok(mut status) = status.lock() {
            status.record(lin.last_outcome);
        }
        if valid {
            transport::log_bytes(
                &format!("frame {:02X}:", lin.message_id),
                &lin.message[..lin.message_len],
            );
        }
        if poll_id.is_some() {
            // 轮询间隔,避免同一请求打满总线
            FreeRtos::delay_ms(1000);
        }
    }
}

/// 解析 .env 下发的帧标识符（支持 0x 前缀十六进制或十进制）。
fn parse_frame_id(value: &str) -> Option<u8> {
    let value = value.trim();
    let parsed = if let Some(hex) = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        u8::from_str_radix(hex, 16).ok()
    } else {
        value.parse::<u8>().ok()
    };
    parsed.filter(|id| *id <= 0x3F)
}
