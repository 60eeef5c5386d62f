//! 프레임 타이밍 집계
//!
//! 한 프레임은 스트림 수만큼 피드백이 따로 도착한다.
//! 작은 원형 버퍼에 프레임별로 모아서 모든 스트림이 보고하면 완료로 본다.

use std::cmp::Ordering;

use crate::message::FeedbackMessage;

/// 동시에 집계할 수 있는 프레임 수
///
/// 피드백은 최대 두 프레임까지만 겹쳐서 도착한다고 가정한다.
pub const TIMING_SLOTS: usize = 2;

/// 시간 구간 [begin, end] (마이크로초)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Interval {
    pub begin: i64,
    pub end: i64,
}

impl Interval {
    pub fn new(begin: i64, end: i64) -> Self {
        Self { begin, end }
    }

    /// 구간 길이 (피드백 값이 비정상이어도 포화 연산으로 overflow 없음)
    pub fn duration(&self) -> i64 {
        self.end.saturating_sub(self.begin)
    }
}

/// 한 프레임의 집계된 타이밍
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTiming {
    /// 이 기록이 나타내는 프레임 번호
    pub frame_id: u64,

    pub encode: Interval,
    pub network: Interval,
    pub decode: Interval,

    /// 지금까지 보고한 스트림 수
    pub contributions: u32,
}

impl FrameTiming {
    fn seed(feedback: &FeedbackMessage, decode: Interval) -> Self {
        Self {
            frame_id: feedback.frame_index,
            encode: feedback.encode_interval(),
            network: feedback.network_interval(),
            decode,
            contributions: 1,
        }
    }

    /// 같은 프레임의 다른 스트림 보고 합치기
    ///
    /// 시작 시각은 모두 가장 이른 값. encode 종료는 가장 늦은 값이지만
    /// network/decode 종료는 가장 이른 값을 쓴다 (기존 컨트롤러와 같은 동작).
    fn merge(&mut self, feedback: &FeedbackMessage, decode: Interval) {
        let encode = feedback.encode_interval();
        let network = feedback.network_interval();

        self.encode.begin = self.encode.begin.min(encode.begin);
        self.encode.end = self.encode.end.max(encode.end);
        self.network.begin = self.network.begin.min(network.begin);
        self.network.end = self.network.end.min(network.end);
        self.decode.begin = self.decode.begin.min(decode.begin);
        self.decode.end = self.decode.end.min(decode.end);
        self.contributions += 1;
    }

    /// 가장 오래 걸린 단계의 길이
    pub fn critical_path(&self) -> i64 {
        self.encode
            .duration()
            .max(self.network.duration())
            .max(self.decode.duration())
    }
}

/// `frame_id % TIMING_SLOTS` 로 인덱싱하는 고정 크기 집계 버퍼
#[derive(Debug, Default)]
pub struct TimingBuffer {
    slots: [Option<FrameTiming>; TIMING_SLOTS],
}

impl TimingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot_index(frame_id: u64) -> usize {
        (frame_id % TIMING_SLOTS as u64) as usize
    }

    /// 피드백을 해당 슬롯에 반영
    ///
    /// 슬롯이 더 새로운 프레임을 들고 있으면 None (오래된 보고).
    /// 더 오래된 프레임이면 슬롯을 버리고 이 보고로 다시 시작한다.
    pub fn record(&mut self, feedback: &FeedbackMessage) -> Option<&FrameTiming> {
        let decode = feedback.decode_interval()?;
        let slot = &mut self.slots[Self::slot_index(feedback.frame_index)];

        match slot.as_ref().map(|t| t.frame_id.cmp(&feedback.frame_index)) {
            Some(Ordering::Greater) => None,
            Some(Ordering::Equal) => {
                let timing = slot.as_mut()?;
                timing.merge(feedback, decode);
                Some(&*timing)
            }
            _ => Some(&*slot.insert(FrameTiming::seed(feedback, decode))),
        }
    }

    /// 프레임 기록 조회 (해당 슬롯이 그 프레임을 들고 있을 때만)
    #[cfg(test)]
    pub(crate) fn get(&self, frame_id: u64) -> Option<&FrameTiming> {
        self.slots[Self::slot_index(frame_id)]
            .as_ref()
            .filter(|t| t.frame_id == frame_id)
    }
}
