use crate::proto::{self, ChecksumMode, BREAK_BYTE, FRAME_ID_MASK, MAX_FRAME_LEN, SYNC_BYTE};
use crate::transport::LinTransport;

/// 单次接收尝试的结果。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReceptionOutcome {
    /// 截止前始终没有字节到达。
    TimedOut,
    /// 有字节到达，但没有凑出合法的 Break+Sync+PID 头。
    NoValidHeader,
    /// 头部完整；data_len 为数据字节数，不含校验和。
    Received {
        frame_id: u8,
        pid: u8,
        data_len: usize,
        checksum_valid: bool,
    },
}

/// 头部扫描与数据收集的阶段。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RxState {
    AwaitBreak,
    AwaitSync,
    AwaitPid,
    CollectData,
    Done,
}

/// 把无结构的串口字节流重组为一个 LIN 帧的状态机。
pub struct FrameReceiver {
    state: RxState,
    pid: u8,
    count: usize,
}

impl FrameReceiver {
    pub fn new() -> Self {
        Self {
            state: RxState::AwaitBreak,
            pid: 0,
            count: 0,
        }
    }

    /// 驱动循环：等首字节到截止、逐字节喂状态机、字节间隙给一次
    /// 宽限等待，收满后排空多余字节再给出结果。
    pub fn run(
        mut self,
        transport: &mut impl LinTransport,
        buf: &mut [u8],
        timeout_ms: u32,
        inter_byte_delay_ms: u32,
    ) -> ReceptionOutcome {
        let deadline = transport.monotonic_millis() + timeout_ms as u64;
        while !transport.byte_available() {
            if transport.monotonic_millis() > deadline {
                return ReceptionOutcome::TimedOut;
            }
            transport.sleep_millis(1);
        }

        let mut drained = 0usize;
        while transport.byte_available() {
            let byte = transport.read_byte();
            if self.state == RxState::Done {
                // 帧已收满，后续字节只排空不入缓冲
                drained += 1;
            } else {
                self.push(byte, buf);
            }
            if !transport.byte_available() {
                transport.sleep_millis(inter_byte_delay_ms);
            }
        }
        if drained > 0 {
            log::debug!("discarded {} trailing byte(s) after full frame", drained);
        }
        self.outcome(buf)
    }

    fn push(&mut self, byte: u8, buf: &mut [u8]) {
        match self.state {
            RxState::AwaitBreak => {
                // Break 之前的非零字节一律视为总线噪声
                if byte == BREAK_BYTE {
                    self.state = RxState::AwaitSync;
                }
            }
            RxState::AwaitSync => {
                if byte == SYNC_BYTE {
                    self.state = RxState::AwaitPid;
                } else if byte != BREAK_BYTE {
                    self.state = RxState::AwaitBreak;
                }
                // 0x00 当作新的 Break，继续等同步字节
            }
            RxState::AwaitPid => {
                self.pid = byte;
                self.count = 0;
                self.state = RxState::CollectData;
            }
            RxState::CollectData => {
                buf[self.count] = byte;
                self.count += 1;
                if self.count >= MAX_FRAME_LEN {
                    self.state = RxState::Done;
                }
            }
            RxState::Done => {}
        }
    }

    fn outcome(&self, buf: &[u8]) -> ReceptionOutcome {
        if !matches!(self.state, RxState::CollectData | RxState::Done) {
            return ReceptionOutcome::NoValidHeader;
        }
        let frame_id = self.pid & FRAME_ID_MASK;
        if self.count == 0 {
            // 头完整但从机未应答
            return ReceptionOutcome::Received {
                frame_id,
                pid: self.pid,
                data_len: 0,
                checksum_valid: false,
            };
        }
        let data_len = self.count - 1;
        let checksum_valid =
            proto::checksum_valid(ChecksumMode::Enhanced, self.pid, &buf[..data_len], buf[data_len]);
        ReceptionOutcome::Received {
            frame_id,
            pid: self.pid,
            data_len,
            checksum_valid,
        }
    }
}
