//! 인코더 제어 인터페이스
//!
//! 컨트롤러는 인코더 전체가 아니라 "목표 비트레이트 설정" 기능만 필요로 한다.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// 인코더 비트레이트 제어 표면
///
/// 같은 값으로 여러 번 호출되어도 안전해야 한다.
pub trait BitrateSink: Send + Sync {
    /// 목표 비트레이트 설정 (bits/sec)
    fn set_bitrate(&self, bits_per_second: u64);
}

/// 컨트롤러가 공유하는 인코더 핸들
pub type EncoderHandle = Arc<dyn BitrateSink>;

/// 스트림 채널 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Channels {
    /// 일반 색상 스트림
    #[default]
    Colour,

    /// 투명도(alpha) 스트림
    Alpha,
}

/// 스트림별 인코더 설정 (생성 시에만 사용)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderSettings {
    /// 설정된 비트레이트 (bits/sec)
    pub bitrate: u64,

    /// 채널 종류
    #[serde(default)]
    pub channels: Channels,
}

impl EncoderSettings {
    pub fn new(bitrate: u64, channels: Channels) -> Self {
        Self { bitrate, channels }
    }

    pub fn colour(bitrate: u64) -> Self {
        Self::new(bitrate, Channels::Colour)
    }

    pub fn alpha(bitrate: u64) -> Self {
        Self::new(bitrate, Channels::Alpha)
    }

    pub fn is_alpha(&self) -> bool {
        self.channels == Channels::Alpha
    }
}

/// 원자적 비트레이트 저장소
///
/// 실제 인코더 대신 쓰거나, 인코더 앞에 두고 마지막 값을 관찰할 때 사용.
#[derive(Debug, Default)]
pub struct SharedBitrate {
    bitrate: AtomicU64,
    updates: AtomicU64,
}

impl SharedBitrate {
    pub fn new(initial: u64) -> Self {
        Self {
            bitrate: AtomicU64::new(initial),
            updates: AtomicU64::new(0),
        }
    }

    /// 마지막으로 설정된 비트레이트
    pub fn get(&self) -> u64 {
        self.bitrate.load(Ordering::Relaxed)
    }

    /// set_bitrate 호출 횟수
    pub fn update_count(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }
}

impl BitrateSink for SharedBitrate {
    fn set_bitrate(&self, bits_per_second: u64) {
        self.bitrate.store(bits_per_second, Ordering::Relaxed);
        self.updates.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_bitrate() {
        let sink = Arc::new(SharedBitrate::new(5_000_000));
        let handle: EncoderHandle = sink.clone();

        assert_eq!(sink.get(), 5_000_000);
        assert_eq!(sink.update_count(), 0);

        handle.set_bitrate(4_500_000);
        handle.set_bitrate(4_500_000);

        assert_eq!(sink.get(), 4_500_000);
        assert_eq!(sink.update_count(), 2);
    }

    #[test]
    fn test_settings_channels() {
        assert!(EncoderSettings::alpha(1_000).is_alpha());
        assert!(!EncoderSettings::colour(1_000).is_alpha());
        assert_eq!(EncoderSettings::new(1, Channels::default()).channels, Channels::Colour);
    }
}
