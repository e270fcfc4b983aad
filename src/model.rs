/// 写帧后的回读校验策略。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EchoPolicy {
    /// 回读字节数不符仅告警，仍按逐字节比较结果返回。
    Lenient,
    /// 回读字节数不符直接判失败。
    Strict,
}

/// LIN 总线运行参数（构造控制器时一次性传入）。
#[derive(Clone, Debug)]
pub struct LinSettings {
    pub baud: u32,
    /// 等待首个响应字节的窗口。
    pub response_timeout_ms: u32,
    /// 突发中字节间隙的宽限等待。
    pub inter_byte_delay_ms: u32,
    /// 一次交换结束后的总线静默时间。
    pub settle_delay_ms: u32,
    /// 写帧后等待收发器回环字节的时间。
    pub echo_delay_ms: u32,
    pub echo_policy: EchoPolicy,
    /// 逐帧打印收发内容。
    pub verbose: bool,
}

impl LinSettings {
    /// 以指定波特率构建默认参数。
    pub fn with_baud(baud: u32) -> Self {
        Self {
            baud,
            response_timeout_ms: 500,
            inter_byte_delay_ms: 2,
            settle_delay_ms: 20,
            echo_delay_ms: 10,
            echo_policy: EchoPolicy::Lenient,
            verbose: false,
        }
    }
}

impl Default for LinSettings {
    fn default() -> Self {
        Self::with_baud(19_200)
    }
}
