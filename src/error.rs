//! 에러 타입 정의

use thiserror::Error;

/// ABRC 에러 타입
///
/// 컨트롤러 자체는 피드백 처리 중 에러를 내지 않는다.
/// 코덱, 큐, 리스너, 설정 검증에서만 사용.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("직렬화 에러: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("유효하지 않은 매직 넘버: expected {expected:08X}, got {got:08X}")]
    InvalidMagicNumber { expected: u32, got: u32 },

    #[error("유효하지 않은 프로토콜 버전: expected {expected}, got {got}")]
    InvalidVersion { expected: u8, got: u8 },

    #[error("메시지 타입 불일치: expected {expected}, got {got}")]
    MessageTypeMismatch { expected: String, got: String },

    #[error("메시지 길이 부족: need {need} bytes, got {got}")]
    Truncated { need: usize, got: usize },

    #[error("유효하지 않은 설정: {0}")]
    InvalidConfig(String),

    #[error("피드백 큐 가득 참")]
    QueueFull,

    #[error("채널 에러")]
    ChannelClosed,
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
