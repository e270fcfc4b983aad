/// LIN 帧同步字节（Break 之后固定出现）。
pub const SYNC_BYTE: u8 = 0x55;
/// Break 场在接收方向上呈现为一个 0x00 字节。
pub const BREAK_BYTE: u8 = 0x00;
/// 帧标识符掩码（受保护标识符的低 6 位）。
pub const FRAME_ID_MASK: u8 = 0x3F;
/// 单帧最大数据字节数。
pub const MAX_DATA_LEN: usize = 8;
/// 数据加校验和的最大字节数。
pub const MAX_FRAME_LEN: usize = MAX_DATA_LEN + 1;
/// 报文缓冲长度：最大帧 + 回读余量（多从机或噪声多发的场合）。
pub const FRAME_BUF_LEN: usize = MAX_FRAME_LEN + 4;
/// 诊断/保留帧标识符下界，0x3C 起强制经典校验和。
pub const DIAGNOSTIC_ID_MIN: u8 = 0x3C;

/// 校验和模式（LIN 1.x 经典 / LIN 2.0 增强）。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChecksumMode {
    Classic,
    Enhanced,
}

/// 由 6 位帧标识符计算受保护标识符（低 6 位不变，附加两个奇偶位）。
pub fn protected_id(frame_id: u8) -> u8 {
    let id = frame_id & FRAME_ID_MASK;
    let bit = |n: u8| (id >> n) & 1;
    let p0 = bit(0) ^ bit(1) ^ bit(2) ^ bit(4);
    let p1 = (bit(1) ^ bit(3) ^ bit(4) ^ bit(5)) ^ 1;
    (p1 << 7) | (p0 << 6) | id
}

/// 计算 LIN 校验和：带进位回卷的字节累加，取反后输出。
/// 增强模式把受保护标识符计入累加；保留帧（0x3C 及以上）无条件走经典模式。
pub fn checksum(mode: ChecksumMode, protected_id: u8, data: &[u8]) -> u8 {
    let mut sum: u16 = match mode {
        ChecksumMode::Enhanced if (protected_id & FRAME_ID_MASK) < DIAGNOSTIC_ID_MIN => {
            protected_id as u16
        }
        _ => 0,
    };
    for &byte in data {
        sum += byte as u16;
    }
    // 高字节（进位）折回低字节，直到无进位为止
    while sum >> 8 != 0 {
        sum = (sum & 0xFF) + (sum >> 8);
    }
    !(sum as u8)
}

/// 校验接收到的校验和字节。
pub fn checksum_valid(mode: ChecksumMode, protected_id: u8, data: &[u8], received: u8) -> bool {
    received == checksum(mode, protected_id, data)
}
