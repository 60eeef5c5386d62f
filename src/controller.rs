//! 비트레이트 컨트롤러
//!
//! 프레임마다 encode → network → decode 중 가장 긴 단계(critical path)를 구해
//! 지수 이동 평균을 내고, 일정 샘플마다 목표 구간과 비교해 전체 비트레이트를 조정한다.
//!
//! ## 스레드 모델
//! - `on_feedback` 은 `&mut self` 라서 한 번에 한 곳에서만 호출된다.
//!   피드백 소스가 여럿이면 [`crate::queue`] 로 앞단에서 직렬화할 것.
//! - alpha 플래그만 원자적이며 다른 스레드에서 [`AlphaSwitch`] 로 바꿀 수 있다.
//!   집계 도중 바뀌면 그 프레임 기록은 완료되지 못하고 다음 프레임에 덮어써진다.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, trace};

use crate::encoder::{EncoderHandle, EncoderSettings};
use crate::message::FeedbackMessage;
use crate::timing::{FrameTiming, TimingBuffer};
use crate::Config;

/// 스트림별 인코더 항목
struct EncoderEntry {
    encoder: EncoderHandle,

    /// 전체 비트레이트 중 이 스트림의 몫 (전체 합 1.0)
    bitrate_fraction: f64,

    /// alpha 채널 스트림 여부
    alpha: bool,
}

/// 평가 구간 결과
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Adjustment {
    Decrease,
    Increase,
    Hold,
}

/// alpha 플래그 공유 핸들
///
/// 렌더 루프 등 피드백 처리와 다른 스레드에서 쓰기 위한 용도.
#[derive(Debug, Clone)]
pub struct AlphaSwitch {
    flag: Arc<AtomicBool>,
}

impl AlphaSwitch {
    pub fn set(&self, active: bool) {
        self.flag.store(active, Ordering::Relaxed);
    }

    pub fn get(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// 프레임 타이밍 기반 비트레이트 컨트롤러
pub struct RateController {
    config: Config,
    encoders: Vec<EncoderEntry>,
    timings: TimingBuffer,

    /// 전체 비트레이트 (bits/sec), 조정 단계에서만 변경
    current_bitrate: f64,

    /// critical path 지수 이동 평균 (마이크로초)
    average_time: f64,

    /// 현재 평가 구간의 샘플 수
    frame_samples: u64,

    alpha: Arc<AtomicBool>,

    /// 이 프레임 번호 이하의 피드백은 무시
    frame_index_backoff: u64,
}

impl RateController {
    /// 새 컨트롤러 생성
    ///
    /// `encoders` 와 `settings` 는 같은 길이여야 한다 (다르면 panic).
    /// 인코더에는 아무 값도 설정하지 않는다. 호출자가 이미 설정했다고 본다.
    pub fn new(config: Config, encoders: Vec<EncoderHandle>, settings: &[EncoderSettings]) -> Self {
        assert_eq!(
            encoders.len(),
            settings.len(),
            "encoder handles and settings must have the same length"
        );
        debug_assert!(config.frame_period_us > 0, "frame period must be positive");

        let current_bitrate: f64 = settings.iter().map(|s| s.bitrate as f64).sum();

        let encoders = encoders
            .into_iter()
            .zip(settings)
            .map(|(encoder, s)| EncoderEntry {
                encoder,
                bitrate_fraction: if current_bitrate > 0.0 {
                    s.bitrate as f64 / current_bitrate
                } else {
                    0.0
                },
                alpha: s.is_alpha(),
            })
            .collect();

        Self {
            frame_index_backoff: config.initial_backoff,
            config,
            encoders,
            timings: TimingBuffer::new(),
            current_bitrate,
            average_time: 0.0,
            frame_samples: 0,
            alpha: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 프레임 주기와 목표 점유율만으로 생성 (나머지는 기본값)
    pub fn from_frame_period(
        frame_period_us: i64,
        encoders: Vec<EncoderHandle>,
        settings: &[EncoderSettings],
        target_occupancy: f64,
    ) -> Self {
        Self::new(Config::new(frame_period_us, target_occupancy), encoders, settings)
    }

    /// alpha 채널 활성 여부 설정
    pub fn set_alpha(&self, active: bool) {
        self.alpha.store(active, Ordering::Relaxed);
    }

    /// 다른 스레드로 넘길 alpha 스위치
    pub fn alpha_switch(&self) -> AlphaSwitch {
        AlphaSwitch {
            flag: self.alpha.clone(),
        }
    }

    /// 현재 alpha 설정에서 한 프레임당 기대하는 보고 수
    fn expected_contributions(&self) -> u32 {
        let alpha = self.alpha.load(Ordering::Relaxed);
        self.encoders.iter().filter(|e| e.alpha == alpha).count() as u32
    }

    /// 디코더 피드백 처리
    ///
    /// 오래된 프레임, 범위 밖 스트림, 디코딩 미완료 보고는 조용히 버린다.
    pub fn on_feedback(&mut self, feedback: &FeedbackMessage) {
        if feedback.frame_index <= self.frame_index_backoff {
            trace!(
                frame = feedback.frame_index,
                backoff = self.frame_index_backoff,
                "feedback in backoff window"
            );
            return;
        }
        if feedback.stream_index as usize >= self.encoders.len() {
            trace!(stream = feedback.stream_index, "feedback for unknown stream");
            return;
        }
        if !feedback.is_decoded() {
            trace!(frame = feedback.frame_index, "frame not decoded");
            return;
        }

        let expected = self.expected_contributions();

        let timing = match self.timings.record(feedback) {
            Some(timing) if timing.contributions == expected => *timing,
            Some(_) => return,
            None => {
                trace!(frame = feedback.frame_index, "stale feedback");
                return;
            }
        };

        self.on_frame_complete(&timing);
    }

    fn on_frame_complete(&mut self, timing: &FrameTiming) {
        let t = timing.critical_path() as f64;

        self.average_time = if self.frame_samples == 0 {
            t
        } else {
            self.average_time + self.config.smoothing * (t - self.average_time)
        };
        self.frame_samples += 1;

        debug!(
            frame = timing.frame_id,
            encode_us = timing.encode.duration(),
            network_us = timing.network.duration(),
            decode_us = timing.decode.duration(),
            "frame timing"
        );

        if self.frame_samples > self.config.sample_window {
            self.evaluate(timing.frame_id);
            self.frame_samples = 0;
            self.average_time = 0.0;
        }
    }

    /// 평가 구간 종료: 평균을 목표 구간과 비교해 비트레이트 조정
    fn evaluate(&mut self, frame_id: u64) -> Adjustment {
        let (low, high) = self.config.target_band();

        info!(
            "target {:.0} - {:.0} us, average {:.0} us",
            low, high, self.average_time
        );

        let adjustment = if self.average_time > high {
            Adjustment::Decrease
        } else if self.average_time < low {
            Adjustment::Increase
        } else {
            Adjustment::Hold
        };

        let change = match adjustment {
            Adjustment::Decrease => self.config.decrease_factor,
            Adjustment::Increase => self.config.increase_factor,
            Adjustment::Hold => return adjustment,
        };

        let previous = self.current_bitrate;
        self.current_bitrate *= change;
        for entry in &self.encoders {
            entry
                .encoder
                .set_bitrate((self.current_bitrate * entry.bitrate_fraction).round() as u64);
        }
        self.frame_index_backoff = frame_id.saturating_add(self.config.backoff_frames);

        info!(
            "bitrate {:?}: {:.0} -> {:.0} bps, backoff until frame {}",
            adjustment, previous, self.current_bitrate, self.frame_index_backoff
        );

        adjustment
    }
}

#[cfg(test)]
impl RateController {
    pub(crate) fn current_bitrate(&self) -> f64 {
        self.current_bitrate
    }

    pub(crate) fn average_time(&self) -> f64 {
        self.average_time
    }

    pub(crate) fn frame_samples(&self) -> u64 {
        self.frame_samples
    }

    pub(crate) fn backoff(&self) -> u64 {
        self.frame_index_backoff
    }

    pub(crate) fn bitrate_fractions(&self) -> Vec<f64> {
        self.encoders.iter().map(|e| e.bitrate_fraction).collect()
    }
}
