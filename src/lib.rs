//! # ABRC (Adaptive BitRate Controller)
//!
//! 실시간 영상 스트리밍용 인코더 비트레이트 컨트롤러
//!
//! ## 핵심 특징
//! - **프레임 타이밍 기반**: encode / network / decode 중 가장 긴 단계를 프레임 시간의 목표 비율 안에 유지
//! - **멀티 스트림 집계**: 한 프레임의 스트림별 피드백을 모아서 한 샘플로 처리
//! - **히스테리시스**: 목표 구간 안이면 아무것도 하지 않음
//! - **backoff**: 조정 후 효과가 나타날 때까지 피드백 무시
//! - **alpha 토글**: 투명도 스트림 on/off 를 다른 스레드에서 원자적으로 전환

pub mod config;
pub mod controller;
pub mod encoder;
pub mod error;
pub mod listener;
pub mod message;
pub mod queue;
pub mod timing;

pub use config::Config;
pub use controller::{AlphaSwitch, RateController};
pub use encoder::{BitrateSink, Channels, EncoderHandle, EncoderSettings, SharedBitrate};
pub use error::{Error, Result};
pub use listener::{FeedbackListener, ListenerStats};
pub use message::{FeedbackMessage, Message};
pub use queue::{feedback_queue, FeedbackQueue, FeedbackSender};
pub use timing::{FrameTiming, Interval, TimingBuffer, TIMING_SLOTS};

/// 프로토콜 버전
pub const PROTOCOL_VERSION: u8 = 1;

/// 매직 넘버 (피드백 패킷 식별용)
pub const MAGIC_NUMBER: u32 = 0x41425243; // "ABRC"

/// 기본 피드백 포트
pub const DEFAULT_FEEDBACK_PORT: u16 = 9100;
