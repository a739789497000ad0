use std::time::Duration;

/// 需要写入进度日志的完成比例。
pub const MILESTONES: [f64; 6] = [0.05, 0.25, 0.50, 0.75, 0.90, 0.95];

/// 只有分片数达到该值的文件才会输出里程碑进度。
pub const MILESTONE_MIN_PARTS: u64 = 100;

/// 里程碑进度事件。
#[derive(Clone, Debug, PartialEq)]
pub struct ProgressEvent {
    pub file_name: String,
    pub bytes_transferred: u64,
    /// 最近一个分片的瞬时速度（字节/秒）。
    pub part_throughput: f64,
    pub part_elapsed: Duration,
    pub percent: f64,
}

/// 进度接收方：每个被确认分片的字节数与里程碑事件，渲染由调用方决定。
/// 被重试的分片只在最终成功后计数一次。
pub trait ProgressSink: Send + Sync {
    fn on_bytes(&self, _bytes: u64) {}
    fn on_milestone(&self, _event: &ProgressEvent) {}
}

/// 每次上传独立的一组里程碑标记。
#[derive(Clone, Debug)]
pub(crate) struct Milestones {
    fired: [bool; MILESTONES.len()],
}

impl Milestones {
    pub(crate) fn new() -> Self {
        Self {
            fired: [false; MILESTONES.len()],
        }
    }

    /// 返回本次新触发的里程碑比例；分片数不足时永远为空。
    pub(crate) fn advance(&mut self, completed: u64, total: u64) -> Vec<f64> {
        if total < MILESTONE_MIN_PARTS {
            return Vec::new();
        }
        let current = completed as f64 / total as f64;
        let mut newly_fired = Vec::new();
        for (idx, threshold) in MILESTONES.iter().enumerate() {
            if !self.fired[idx] && current >= *threshold {
                self.fired[idx] = true;
                newly_fired.push(*threshold);
            }
        }
        newly_fired
    }
}

const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

/// 把字节数格式化为人类可读的大小，保留两位小数。
pub fn format_file_size(bytes: f64) -> String {
    if !bytes.is_finite() || bytes < 0.0 {
        return "0 B".to_string();
    }
    let mut value = bytes;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{value:.0} {}", UNITS[unit])
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}
