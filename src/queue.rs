//! 피드백 직렬화 큐
//!
//! 컨트롤러는 단일 호출자 전제라서 피드백 소스가 여럿이면 여기로 모은다.
//! 생산자는 여럿, 소비자는 하나.

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};
use tracing::debug;

use crate::controller::RateController;
use crate::message::FeedbackMessage;
use crate::{Error, Result};

/// 큐 생성
///
/// `capacity` 가 0이면 무제한 큐.
pub fn feedback_queue(capacity: usize) -> (FeedbackSender, FeedbackQueue) {
    let (tx, rx) = if capacity == 0 {
        crossbeam_channel::unbounded()
    } else {
        crossbeam_channel::bounded(capacity)
    };
    (FeedbackSender { tx }, FeedbackQueue { rx })
}

/// 피드백 생산자 핸들 (복제 가능)
#[derive(Debug, Clone)]
pub struct FeedbackSender {
    tx: Sender<FeedbackMessage>,
}

impl FeedbackSender {
    /// 피드백 넣기 (블로킹 없음)
    ///
    /// 큐가 가득 차면 메시지를 버리고 `Error::QueueFull`.
    pub fn push(&self, feedback: FeedbackMessage) -> Result<()> {
        self.tx.try_send(feedback).map_err(|e| match e {
            TrySendError::Full(_) => Error::QueueFull,
            TrySendError::Disconnected(_) => Error::ChannelClosed,
        })
    }
}

/// 피드백 소비자 (컨트롤러 쪽)
#[derive(Debug)]
pub struct FeedbackQueue {
    rx: Receiver<FeedbackMessage>,
}

impl FeedbackQueue {
    /// 쌓인 피드백을 모두 컨트롤러에 전달, 처리 개수 반환
    pub fn drain(&self, controller: &mut RateController) -> usize {
        let mut count = 0;
        loop {
            match self.rx.try_recv() {
                Ok(feedback) => {
                    controller.on_feedback(&feedback);
                    count += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        count
    }

    /// 모든 생산자가 사라질 때까지 블로킹하며 처리
    pub fn run(self, controller: &mut RateController) -> usize {
        let mut count = 0;
        for feedback in self.rx.iter() {
            controller.on_feedback(&feedback);
            count += 1;
        }
        debug!("피드백 큐 종료: {} 개 처리", count);
        count
    }

    /// 대기 중인 피드백 수
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{EncoderHandle, EncoderSettings, SharedBitrate};
    use crate::Config;
    use std::sync::Arc;

    fn feedback(frame_index: u64, critical: i64) -> FeedbackMessage {
        FeedbackMessage {
            frame_index,
            stream_index: 0,
            encode_begin: 0,
            encode_end: 500,
            send_begin: 500,
            send_end: 1_000,
            received_first_packet: 600,
            received_last_packet: 1_100,
            sent_to_decoder: 1_100,
            received_from_decoder: Some(1_100 + critical),
        }
    }

    fn controller(sink: &Arc<SharedBitrate>) -> RateController {
        let config = Config {
            sample_window: 4,
            initial_backoff: 0,
            ..Config::new(16_667, 0.5)
        };
        RateController::new(
            config,
            vec![sink.clone() as EncoderHandle],
            &[EncoderSettings::colour(8_000_000)],
        )
    }

    #[test]
    fn test_bounded_queue_full() {
        let (tx, rx) = feedback_queue(1);

        assert!(tx.push(feedback(1, 2_000)).is_ok());
        assert!(matches!(tx.push(feedback(2, 2_000)), Err(Error::QueueFull)));
        assert_eq!(rx.len(), 1);
    }

    #[test]
    fn test_closed_queue() {
        let (tx, rx) = feedback_queue(0);
        drop(rx);

        assert!(matches!(tx.push(feedback(1, 2_000)), Err(Error::ChannelClosed)));
    }

    #[test]
    fn test_drain_feeds_controller() {
        let sink = Arc::new(SharedBitrate::new(8_000_000));
        let mut controller = controller(&sink);
        let (tx, rx) = feedback_queue(0);

        for frame in 1..=5 {
            tx.push(feedback(frame, 2_000)).unwrap();
        }

        assert_eq!(rx.drain(&mut controller), 5);
        assert!(rx.is_empty());
        assert_eq!(sink.get(), 8_800_000);
    }

    #[test]
    fn test_run_serializes_many_producers() {
        let sink = Arc::new(SharedBitrate::new(8_000_000));
        let mut controller = controller(&sink);
        let (tx, rx) = feedback_queue(0);

        let producers: Vec<_> = (0..4u64)
            .map(|p| {
                let tx = tx.clone();
                std::thread::spawn(move || {
                    for i in 0..10u64 {
                        tx.push(feedback(1 + p * 10 + i, 12_000)).unwrap();
                    }
                })
            })
            .collect();
        drop(tx);

        for producer in producers {
            producer.join().unwrap();
        }

        assert_eq!(rx.run(&mut controller), 40);
        assert!(sink.update_count() >= 1);
    }
}
