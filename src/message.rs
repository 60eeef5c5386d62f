//! 피드백 메시지 정의
//!
//! 디코더 쪽이 프레임/스트림마다 보내는 타이밍 보고.
//! 와이어 포맷: bincode 헤더 + bincode 페이로드

use serde::{Deserialize, Serialize};

use crate::timing::Interval;
use crate::{Error, Result, MAGIC_NUMBER, PROTOCOL_VERSION};

/// 메시지 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    /// 프레임 타이밍 피드백 (디코더 → 서버)
    Feedback = 1,

    /// 세션 종료
    Close = 2,
}

/// 메시지 헤더
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageHeader {
    /// 매직 넘버
    pub magic: u32,

    /// 프로토콜 버전
    pub version: u8,

    /// 메시지 타입
    pub msg_type: MessageType,

    /// 메시지 길이 (헤더 제외)
    pub payload_len: u32,
}

impl MessageHeader {
    pub fn new(msg_type: MessageType, payload_len: u32) -> Self {
        Self {
            magic: MAGIC_NUMBER,
            version: PROTOCOL_VERSION,
            msg_type,
            payload_len,
        }
    }

    /// 바이트 앞부분에서 헤더 파싱 + 검증, (헤더, 헤더 크기) 반환
    pub fn parse(bytes: &[u8]) -> Result<(Self, usize)> {
        let header: MessageHeader = bincode::deserialize(bytes)?;

        if header.magic != MAGIC_NUMBER {
            return Err(Error::InvalidMagicNumber {
                expected: MAGIC_NUMBER,
                got: header.magic,
            });
        }
        if header.version != PROTOCOL_VERSION {
            return Err(Error::InvalidVersion {
                expected: PROTOCOL_VERSION,
                got: header.version,
            });
        }

        let header_size = bincode::serialized_size(&header)? as usize;
        let need = header_size + header.payload_len as usize;
        if bytes.len() < need {
            return Err(Error::Truncated {
                need,
                got: bytes.len(),
            });
        }

        Ok((header, header_size))
    }
}

fn encode_frame<T: Serialize>(msg_type: MessageType, payload: &T) -> Result<Vec<u8>> {
    let payload = bincode::serialize(payload)?;
    let header = MessageHeader::new(msg_type, payload.len() as u32);
    let header_bytes = bincode::serialize(&header)?;

    let mut buf = Vec::with_capacity(header_bytes.len() + payload.len());
    buf.extend_from_slice(&header_bytes);
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// 프레임 타이밍 피드백
///
/// 모든 타임스탬프는 같은 단조 시계 기준 마이크로초.
/// 송신측/수신측 시계 오차가 있어서 네트워크 구간은 양쪽 관측을 모두 덮도록 잡는다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackMessage {
    /// 프레임 번호
    pub frame_index: u64,

    /// 스트림 번호 (인코더 인덱스)
    pub stream_index: u8,

    pub encode_begin: i64,
    pub encode_end: i64,
    pub send_begin: i64,
    pub send_end: i64,
    pub received_first_packet: i64,
    pub received_last_packet: i64,
    pub sent_to_decoder: i64,

    /// 디코더에서 프레임을 돌려받은 시각, 디코딩이 끝나지 않았으면 None
    pub received_from_decoder: Option<i64>,
}

impl FeedbackMessage {
    /// 디코더가 프레임을 끝까지 처리했는지
    pub fn is_decoded(&self) -> bool {
        self.received_from_decoder.is_some()
    }

    pub fn encode_interval(&self) -> Interval {
        Interval::new(self.encode_begin, self.encode_end)
    }

    /// 송신측/수신측 관측을 모두 포함하는 가장 넓은 구간
    pub fn network_interval(&self) -> Interval {
        Interval::new(
            self.send_begin.min(self.received_first_packet),
            self.send_end.max(self.received_last_packet),
        )
    }

    pub fn decode_interval(&self) -> Option<Interval> {
        self.received_from_decoder
            .map(|end| Interval::new(self.sent_to_decoder, end))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        encode_frame(MessageType::Feedback, self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        match Message::from_bytes(bytes)? {
            Message::Feedback(feedback) => Ok(feedback),
            other => Err(Error::MessageTypeMismatch {
                expected: format!("{:?}", MessageType::Feedback),
                got: format!("{:?}", other.msg_type()),
            }),
        }
    }
}

/// 통합 메시지 enum
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Feedback(FeedbackMessage),
    Close,
}

impl Message {
    /// 메시지 타입 반환
    pub fn msg_type(&self) -> MessageType {
        match self {
            Message::Feedback(_) => MessageType::Feedback,
            Message::Close => MessageType::Close,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            Message::Feedback(feedback) => feedback.to_bytes(),
            Message::Close => encode_frame(MessageType::Close, &()),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (header, header_size) = MessageHeader::parse(bytes)?;
        let payload = &bytes[header_size..header_size + header.payload_len as usize];

        match header.msg_type {
            MessageType::Feedback => Ok(Message::Feedback(bincode::deserialize(payload)?)),
            MessageType::Close => Ok(Message::Close),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FeedbackMessage {
        FeedbackMessage {
            frame_index: 1234,
            stream_index: 1,
            encode_begin: 1_000,
            encode_end: 4_000,
            send_begin: 4_100,
            send_end: 6_000,
            received_first_packet: 4_050,
            received_last_packet: 6_500,
            sent_to_decoder: 6_600,
            received_from_decoder: Some(9_000),
        }
    }

    #[test]
    fn test_feedback_serialization() {
        let feedback = sample();
        let bytes = feedback.to_bytes().unwrap();
        let restored = FeedbackMessage::from_bytes(&bytes).unwrap();

        assert_eq!(feedback, restored);
    }

    #[test]
    fn test_network_interval_covers_both_sides() {
        let feedback = sample();
        let network = feedback.network_interval();

        assert_eq!(network.begin, 4_050);
        assert_eq!(network.end, 6_500);
        assert_eq!(feedback.encode_interval().duration(), 3_000);
        assert_eq!(feedback.decode_interval().unwrap().duration(), 2_400);
    }

    #[test]
    fn test_undecoded_feedback() {
        let feedback = FeedbackMessage {
            received_from_decoder: None,
            ..sample()
        };
        assert!(!feedback.is_decoded());
        assert!(feedback.decode_interval().is_none());
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes[0] ^= 0xFF;

        assert!(matches!(
            FeedbackMessage::from_bytes(&bytes),
            Err(Error::InvalidMagicNumber { .. })
        ));
    }

    #[test]
    fn test_truncated_rejected() {
        let bytes = sample().to_bytes().unwrap();
        let result = FeedbackMessage::from_bytes(&bytes[..bytes.len() - 4]);

        assert!(matches!(result, Err(Error::Truncated { .. })));
    }

    #[test]
    fn test_close_is_not_feedback() {
        let bytes = Message::Close.to_bytes().unwrap();

        assert_eq!(Message::from_bytes(&bytes).unwrap(), Message::Close);
        assert!(matches!(
            FeedbackMessage::from_bytes(&bytes),
            Err(Error::MessageTypeMismatch { .. })
        ));
    }
}
