//! 컨트롤러 설정

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// 비트레이트 컨트롤러 설정
///
/// 기본값은 실서비스 컨트롤러에서 쓰던 상수와 같다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// 한 프레임의 길이 (마이크로초)
    pub frame_period_us: i64,

    /// 가장 느린 단계(encode/network/decode)가 차지해도 되는 프레임 시간 비율
    pub target_occupancy: f64,

    /// 목표 구간 폭 (target_occupancy ± band_margin)
    #[serde(default = "default_band_margin")]
    pub band_margin: f64,

    /// 평균이 구간 위일 때 곱하는 비율
    #[serde(default = "default_decrease_factor")]
    pub decrease_factor: f64,

    /// 평균이 구간 아래일 때 곱하는 비율
    #[serde(default = "default_increase_factor")]
    pub increase_factor: f64,

    /// 지수 이동 평균 가중치
    #[serde(default = "default_smoothing")]
    pub smoothing: f64,

    /// 판단 전에 모아야 하는 샘플 수 (이 값을 넘는 순간 판단)
    #[serde(default = "default_sample_window")]
    pub sample_window: u64,

    /// 비트레이트 변경 후 무시할 프레임 수
    #[serde(default = "default_backoff_frames")]
    pub backoff_frames: u64,

    /// 세션 시작 시 backoff 값 (이 프레임 이하의 피드백은 무시)
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff: u64,
}

fn default_band_margin() -> f64 {
    0.1
}

fn default_decrease_factor() -> f64 {
    0.9
}

fn default_increase_factor() -> f64 {
    1.1
}

fn default_smoothing() -> f64 {
    0.1
}

fn default_sample_window() -> u64 {
    200
}

fn default_backoff_frames() -> u64 {
    300
}

fn default_initial_backoff() -> u64 {
    300
}

impl Default for Config {
    fn default() -> Self {
        Self {
            frame_period_us: 16_667, // 60fps
            target_occupancy: 0.5,
            band_margin: default_band_margin(),
            decrease_factor: default_decrease_factor(),
            increase_factor: default_increase_factor(),
            smoothing: default_smoothing(),
            sample_window: default_sample_window(),
            backoff_frames: default_backoff_frames(),
            initial_backoff: default_initial_backoff(),
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new(frame_period_us: i64, target_occupancy: f64) -> Self {
        Self {
            frame_period_us,
            target_occupancy,
            ..Self::default()
        }
    }

    /// 프레임레이트로부터 설정 생성
    pub fn for_framerate(fps: f64, target_occupancy: f64) -> Self {
        let frame_period_us = if fps > 0.0 {
            (1_000_000.0 / fps).round() as i64
        } else {
            0
        };
        Self::new(frame_period_us, target_occupancy)
    }

    /// 목표 구간 [하한, 상한] (마이크로초)
    pub fn target_band(&self) -> (f64, f64) {
        let period = self.frame_period_us as f64;
        (
            period * (self.target_occupancy - self.band_margin),
            period * (self.target_occupancy + self.band_margin),
        )
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.frame_period_us <= 0 {
            return Err(Error::InvalidConfig(format!(
                "frame_period_us must be > 0, got {}",
                self.frame_period_us
            )));
        }
        if !(self.target_occupancy > 0.0 && self.target_occupancy <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "target_occupancy must be in (0, 1], got {}",
                self.target_occupancy
            )));
        }
        if !(self.band_margin >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "band_margin must be >= 0, got {}",
                self.band_margin
            )));
        }
        if !(self.decrease_factor > 0.0 && self.decrease_factor < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "decrease_factor must be in (0, 1), got {}",
                self.decrease_factor
            )));
        }
        if !(self.increase_factor > 1.0) {
            return Err(Error::InvalidConfig(format!(
                "increase_factor must be > 1, got {}",
                self.increase_factor
            )));
        }
        if !(self.smoothing > 0.0 && self.smoothing <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "smoothing must be in (0, 1], got {}",
                self.smoothing
            )));
        }
        if self.sample_window == 0 {
            return Err(Error::InvalidConfig("sample_window must be > 0".into()));
        }
        Ok(())
    }

    /// 보수적 설정 (작은 스텝, 긴 관찰)
    pub fn conservative(frame_period_us: i64, target_occupancy: f64) -> Self {
        Self {
            decrease_factor: 0.95,
            increase_factor: 1.05,
            sample_window: 400,
            backoff_frames: 600,
            ..Self::new(frame_period_us, target_occupancy)
        }
    }

    /// 공격적 설정 (큰 스텝, 빠른 반응)
    pub fn aggressive(frame_period_us: i64, target_occupancy: f64) -> Self {
        Self {
            decrease_factor: 0.8,
            increase_factor: 1.2,
            smoothing: 0.2,
            sample_window: 100,
            backoff_frames: 150,
            ..Self::new(frame_period_us, target_occupancy)
        }
    }
}
