use std::fmt::Write as _;

/// LIN 核心所依赖的串口传输能力，单次帧交换期间独占使用。
pub trait LinTransport {
    /// （重新）初始化链路，可重复调用。
    fn configure(&mut self, baud: u32);
    /// 写入单个字节，返回实际写入数。
    fn write_byte(&mut self, byte: u8) -> usize;
    /// 写入字节序列，返回实际写入数。
    fn write_bytes(&mut self, bytes: &[u8]) -> usize;
    /// 接收方向是否有待读字节。
    fn byte_available(&mut self) -> bool;
    /// 读取一个字节，调用前必须先确认有数据。
    fn read_byte(&mut self) -> u8;
    /// 阻塞直到所有已写字节离开发送器。
    fn flush_output(&mut self);
    /// 在已打开的链路上切换波特率，帧格式不变。
    fn set_baud_rate(&mut self, baud: u32);
    /// 释放链路。
    fn close(&mut self);
    /// 单调毫秒时钟。
    fn monotonic_millis(&self) -> u64;
    /// 毫秒级延时。
    fn sleep_millis(&mut self, ms: u32);
}

/// 以十六进制输出一段字节（收发跟踪用）。
pub fn log_bytes(prefix: &str, bytes: &[u8]) {
    if bytes.is_empty() {
        return;
    }
    let mut line = String::with_capacity(prefix.len() + bytes.len() * 3);
    line.push_str(prefix);
    line.push(' ');
    for (idx, byte) in bytes.iter().enumerate() {
        if idx > 0 {
            line.push(' ');
        }
        let _ = write!(line, "{:02X}", byte);
    }
    log::info!("{}", line);
}
