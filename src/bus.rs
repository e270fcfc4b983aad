use crate::model::{EchoPolicy, LinSettings};
use crate::proto::{self, ChecksumMode, FRAME_BUF_LEN, MAX_DATA_LEN, SYNC_BYTE};
use crate::receiver::{FrameReceiver, ReceptionOutcome};
use crate::transport::{log_bytes, LinTransport};

/// LIN 主节点控制器：独占传输与报文缓冲，完成一次单帧交换。
pub struct LinBus<T: LinTransport> {
    transport: T,
    settings: LinSettings,
    /// 报文缓冲：8 数据 + 1 校验和 + 回读余量；每次交换从 0 重写。
    pub message: [u8; FRAME_BUF_LEN],
    /// 最近一次交换的帧标识符（已去掉奇偶位）。
    pub message_id: u8,
    /// 最近一次交换收到的字节数（数据 + 校验和）。
    pub message_len: usize,
    /// 最近一次接收的完整结果。
    pub last_outcome: ReceptionOutcome,
}

impl<T: LinTransport> LinBus<T> {
    pub fn new(transport: T, settings: LinSettings) -> Self {
        Self {
            transport,
            settings,
            message: [0; FRAME_BUF_LEN],
            message_id: 0,
            message_len: 0,
            last_outcome: ReceptionOutcome::TimedOut,
        }
    }

    /// 被动监听总线上的一次交换（不发头），返回校验和是否有效。
    /// 用于旁听主机发起、从机应答的完整帧。
    pub fn listen(&mut self) -> bool {
        self.transport.configure(self.settings.baud);
        let outcome = self.receive_into_message();
        self.transport.close();
        self.record(outcome)
    }

    /// 发出请求头并读取从机响应，返回校验和是否有效。
    /// 收发器会把头回环到接收线，接收状态机顺带消费掉。
    pub fn request_frame(&mut self, frame_id: u8) -> bool {
        self.transport.configure(self.settings.baud);
        self.start_frame(frame_id);
        self.transport.flush_output();
        let outcome = self.receive_into_message();
        self.transport.close();
        self.transport.sleep_millis(self.settings.settle_delay_ms);
        self.record(outcome)
    }

    /// 写出一帧（增强校验和）并通过收发器回环自检。
    pub fn write_frame(&mut self, frame_id: u8, data_len: usize) -> bool {
        self.write_with_mode(frame_id, data_len, ChecksumMode::Enhanced)
    }

    /// 写出一帧（经典校验和，面向 LIN 1.x 从机）并回环自检。
    pub fn write_frame_classic(&mut self, frame_id: u8, data_len: usize) -> bool {
        self.write_with_mode(frame_id, data_len, ChecksumMode::Classic)
    }

    fn write_with_mode(&mut self, frame_id: u8, data_len: usize, mode: ChecksumMode) -> bool {
        let data_len = data_len.min(MAX_DATA_LEN);
        let pid = proto::protected_id(frame_id);
        // 经典模式下 checksum() 自行忽略种子
        let cksum = proto::checksum(mode, pid, &self.message[..data_len]);

        self.transport.configure(self.settings.baud);
        self.start_frame(frame_id);
        let sent = self.transport.write_bytes(&self.message[..data_len]);
        if sent < data_len {
            log::warn!("short write: {} of {} data byte(s)", sent, data_len);
        }
        self.transport.write_byte(cksum);
        self.transport.flush_output();
        if self.settings.verbose {
            log_bytes(
                &format!("LIN frame {:02X} ({:02X}) out:", frame_id & proto::FRAME_ID_MASK, pid),
                &self.message[..data_len],
            );
        }

        // 等收发器把回环字节送回接收缓冲，再用接收状态机收整一帧
        self.transport.sleep_millis(self.settings.echo_delay_ms);
        let mut echo = [0u8; FRAME_BUF_LEN];
        let outcome = FrameReceiver::new().run(
            &mut self.transport,
            &mut echo,
            self.settings.echo_delay_ms,
            self.settings.inter_byte_delay_ms,
        );
        self.transport.close();

        self.last_outcome = outcome;
        self.verify_echo(frame_id, pid, data_len, cksum, &echo, outcome)
    }

    /// 将回读到的帧与刚写出的内容逐字节比较。
    fn verify_echo(
        &self,
        frame_id: u8,
        pid: u8,
        data_len: usize,
        cksum: u8,
        echo: &[u8],
        outcome: ReceptionOutcome,
    ) -> bool {
        let (echo_pid, echo_len) = match outcome {
            ReceptionOutcome::Received { pid, data_len, .. } => (pid, data_len),
            _ => {
                log::warn!("no echo received for frame {:02X}", frame_id);
                return false;
            }
        };

        let mut ok = true;
        if echo_pid != pid {
            log::warn!("echoed PID {:02X} != sent {:02X}", echo_pid, pid);
            ok = false;
        }
        if echo_len != data_len {
            log::warn!(
                "echoed {} data byte(s) for frame {:02X}, sent {}",
                echo_len,
                frame_id,
                data_len
            );
            if self.settings.echo_policy == EchoPolicy::Strict {
                ok = false;
            }
        }
        for i in 0..echo_len.min(data_len) {
            if echo[i] != self.message[i] {
                log::warn!("echo mismatch at byte {}: {:02X} != {:02X}", i, echo[i], self.message[i]);
                ok = false;
            }
        }
        if echo[echo_len] != cksum {
            log::warn!("echoed checksum {:02X} != sent {:02X}", echo[echo_len], cksum);
            ok = false;
        }
        ok
    }

    /// 发出帧头：Break + 同步字节 + 受保护标识符。
    /// 头部没有总线应答，短写只记日志不上抛。
    fn start_frame(&mut self, frame_id: u8) {
        let pid = proto::protected_id(frame_id);
        if self.send_break() == 0 {
            log::warn!("break byte was not accepted by the transport");
        }
        self.transport.write_byte(SYNC_BYTE);
        self.transport.write_byte(pid);
    }

    /// 以半波特率写出 0x00，产生跨约两个位时的 Break 场。
    fn send_break(&mut self) -> usize {
        self.transport.flush_output();
        // 半速期间是临界区:不做任何其他读写
        self.transport.set_baud_rate(self.settings.baud / 2);
        let written = self.transport.write_byte(proto::BREAK_BYTE);
        self.transport.flush_output();
        // 写入结果如何都要恢复额定速率,两次切换必须成对
        self.transport.set_baud_rate(self.settings.baud);
        written
    }

    fn receive_into_message(&mut self) -> ReceptionOutcome {
        self.message.fill(0);
        FrameReceiver::new().run(
            &mut self.transport,
            &mut self.message,
            self.settings.response_timeout_ms,
            self.settings.inter_byte_delay_ms,
        )
    }

    /// 记录接收结果到公开字段，返回校验和有效性。
    fn record(&mut self, outcome: ReceptionOutcome) -> bool {
        self.last_outcome = outcome;
        match outcome {
            ReceptionOutcome::Received {
                frame_id,
                pid,
                data_len,
                checksum_valid,
            } => {
                self.message_id = frame_id;
                self.message_len = if data_len == 0 { 0 } else { data_len + 1 };
                if self.settings.verbose {
                    if data_len == 0 {
                        log::info!("frame {:02X} ({:02X}): no response", frame_id, pid);
                    } else {
                        log_bytes(
                            &format!("LIN frame {:02X} ({:02X}) in:", frame_id, pid),
                            &self.message[..self.message_len],
                        );
                        if !checksum_valid {
                            log::warn!("checksum failed for frame {:02X}", frame_id);
                        }
                    }
                }
                checksum_valid
            }
            ReceptionOutcome::TimedOut => {
                self.message_len = 0;
                if self.settings.verbose {
                    log::info!("listen window elapsed with no traffic");
                }
                false
            }
            ReceptionOutcome::NoValidHeader => {
                self.message_len = 0;
                if self.settings.verbose {
                    log::info!("no valid 0x00 0x55 PID header detected");
                }
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{checksum, protected_id};
    use crate::transport::sim::SimTransport;

    fn bus_with(sim: SimTransport) -> LinBus<SimTransport> {
        LinBus::new(sim, LinSettings::with_baud(19_200))
    }

    #[test]
    fn listen_captures_passive_frame() {
        let pid = protected_id(0x17);
        let data = [0xDE, 0xAD];
        let cksum = checksum(ChecksumMode::Enhanced, pid, &data);
        let sim = SimTransport::with_rx(&[0x00, 0x55, pid, data[0], data[1], cksum]);

        let mut bus = bus_with(sim);
        assert!(bus.listen());
        assert_eq!(bus.message_id, 0x17);
        assert_eq!(bus.message_len, 3);
        assert_eq!(&bus.message[..2], &data);
        assert_eq!(bus.transport.configures, 1);
        assert_eq!(bus.transport.closes, 1);
        assert!(bus.transport.tx.is_empty());
    }

    #[test]
    fn listen_bad_checksum_still_records_identifier() {
        let pid = protected_id(0x17);
        let sim = SimTransport::with_rx(&[0x00, 0x55, pid, 0x01, 0xFF]);
        let mut bus = bus_with(sim);
        assert!(!bus.listen());
        assert_eq!(bus.message_id, 0x17);
        assert_eq!(bus.message_len, 2);
    }

    #[test]
    fn listen_empty_bus_times_out() {
        let mut bus = bus_with(SimTransport::new());
        assert!(!bus.listen());
        assert_eq!(bus.last_outcome, ReceptionOutcome::TimedOut);
        assert_eq!(bus.message_len, 0);
    }

    #[test]
    fn request_frame_sends_header_and_reads_response() {
        let pid = protected_id(0x10);
        let data = [0x44, 0x55, 0x66];
        let cksum = checksum(ChecksumMode::Enhanced, pid, &data);
        let mut sim = SimTransport::new();
        sim.loopback = true;
        let mut response = data.to_vec();
        response.push(cksum);
        sim.stage_response(&response);

        let mut bus = bus_with(sim);
        assert!(bus.request_frame(0x10));
        assert_eq!(bus.message_id, 0x10);
        assert_eq!(&bus.message[..3], &data);
        // 帧头:Break(半速 0x00) + Sync + PID
        assert_eq!(bus.transport.tx, vec![0x00, SYNC_BYTE, pid]);
        // Break 期间半速,随后恢复额定速率
        assert_eq!(bus.transport.baud_log, vec![9_600, 19_200]);
        assert_eq!(bus.transport.closes, 1);
    }

    #[test]
    fn request_frame_without_response_reports_empty() {
        let mut sim = SimTransport::new();
        sim.loopback = true;
        let mut bus = bus_with(sim);
        assert!(!bus.request_frame(0x23));
        assert_eq!(
            bus.last_outcome,
            ReceptionOutcome::Received {
                frame_id: 0x23,
                pid: protected_id(0x23),
                data_len: 0,
                checksum_valid: false,
            }
        );
        assert_eq!(bus.message_len, 0);
    }

    #[test]
    fn write_frame_verifies_clean_echo() {
        let mut sim = SimTransport::new();
        sim.loopback = true;
        let mut bus = bus_with(sim);
        bus.message[..3].copy_from_slice(&[0x0A, 0x0B, 0x0C]);

        assert!(bus.write_frame(0x2A, 3));

        let pid = protected_id(0x2A);
        let cksum = checksum(ChecksumMode::Enhanced, pid, &[0x0A, 0x0B, 0x0C]);
        assert_eq!(
            bus.transport.tx,
            vec![0x00, SYNC_BYTE, pid, 0x0A, 0x0B, 0x0C, cksum]
        );
        // 回读校验不得破坏调用方写入的数据
        assert_eq!(&bus.message[..3], &[0x0A, 0x0B, 0x0C]);
    }

    #[test]
    fn write_frame_flags_corrupted_echo() {
        // 写出序列下标:0 Break,1 Sync,2 PID,3 起数据
        for corrupt_at in [3usize, 4, 6] {
            let mut sim = SimTransport::new();
            sim.loopback = true;
            sim.corrupt_at = Some(corrupt_at);
            let mut bus = bus_with(sim);
            bus.message[..3].copy_from_slice(&[0x0A, 0x0B, 0x0C]);
            assert!(!bus.write_frame(0x2A, 3), "corrupt_at {}", corrupt_at);
        }
    }

    #[test]
    fn write_frame_without_echo_fails() {
        let mut bus = bus_with(SimTransport::new());
        bus.message[0] = 0x99;
        assert!(!bus.write_frame(0x05, 1));
    }

    #[test]
    fn write_frame_classic_seeds_zero() {
        let mut sim = SimTransport::new();
        sim.loopback = true;
        let mut bus = bus_with(sim);
        bus.message[..2].copy_from_slice(&[0x11, 0x22]);

        assert!(bus.write_frame_classic(0x08, 2));
        let expected = checksum(ChecksumMode::Classic, 0x00, &[0x11, 0x22]);
        assert_eq!(*bus.transport.tx.last().unwrap(), expected);
    }

    #[test]
    fn echo_policy_governs_length_mismatch() {
        // 丢掉最后一个数据字节的回环:前缀与校验和仍一致
        for (policy, expected) in [(EchoPolicy::Lenient, true), (EchoPolicy::Strict, false)] {
            let mut sim = SimTransport::new();
            sim.loopback = true;
            sim.drop_at = Some(5); // 0 Break,1 Sync,2 PID,3..5 数据
            let mut settings = LinSettings::with_baud(19_200);
            settings.echo_policy = policy;
            let mut bus = LinBus::new(sim, settings);
            bus.message[..3].copy_from_slice(&[0x0A, 0x0B, 0x0C]);
            assert_eq!(bus.write_frame(0x2A, 3), expected, "{:?}", policy);
        }
    }
}
