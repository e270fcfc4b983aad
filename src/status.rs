use crate::receiver::ReceptionOutcome;

/// 总线健康计数与最近一次交换的记录，供 LED 任务等线程共享。
pub struct BusStatus {
    pub frames_valid: u32,
    pub checksum_errors: u32,
    pub no_response: u32,
    pub header_noise: u32,
    pub timeouts: u32,
    pub last_outcome: Option<ReceptionOutcome>,
    /// 每次值得提示的事件递增，LED 任务据此感知新事件。
    pub event_nonce: u32,
}

impl BusStatus {
    pub fn new() -> Self {
        Self {
            frames_valid: 0,
            checksum_errors: 0,
            no_response: 0,
            header_noise: 0,
            timeouts: 0,
            last_outcome: None,
            event_nonce: 0,
        }
    }

    /// 记录一次交换结果。监听超时属于总线静默，不触发事件提示。
    pub fn record(&mut self, outcome: ReceptionOutcome) {
        match outcome {
            ReceptionOutcome::TimedOut => self.timeouts += 1,
            ReceptionOutcome::NoValidHeader => {
                self.header_noise += 1;
                self.bump(outcome);
            }
            ReceptionOutcome::Received { data_len: 0, .. } => {
                self.no_response += 1;
                self.bump(outcome);
            }
            ReceptionOutcome::Received {
                checksum_valid: true,
                ..
            } => {
                self.frames_valid += 1;
                self.bump(outcome);
            }
            ReceptionOutcome::Received { .. } => {
                self.checksum_errors += 1;
                self.bump(outcome);
            }
        }
    }

    fn bump(&mut self, outcome: ReceptionOutcome) {
        self.last_outcome = Some(outcome);
        self.event_nonce = self.event_nonce.wrapping_add(1);
    }
}
