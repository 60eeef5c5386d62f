//! UDP 피드백 리스너
//!
//! 디코더 쪽에서 오는 피드백 데이터그램을 받아 디코딩한 뒤 피드백 큐로 넘긴다.
//! 컨트롤러는 건드리지 않는다 (큐 소비자 쪽 책임).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::message::Message;
use crate::queue::FeedbackSender;
use crate::{Error, Result};

/// 리스너 카운터 스냅샷
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerStats {
    /// 큐로 넘긴 피드백 수
    pub forwarded: u64,

    /// 디코딩 실패로 버린 데이터그램 수
    pub malformed: u64,

    /// 큐가 가득 차서 버린 피드백 수
    pub dropped: u64,
}

/// 피드백 수신기
pub struct FeedbackListener {
    socket: UdpSocket,
    sender: FeedbackSender,

    /// 실행 중 플래그
    running: AtomicBool,

    /// 마지막으로 피드백을 보낸 주소
    peer_addr: RwLock<Option<SocketAddr>>,

    forwarded: AtomicU64,
    malformed: AtomicU64,
    dropped: AtomicU64,
}

impl FeedbackListener {
    /// 소켓 바인딩
    pub async fn bind(addr: SocketAddr, sender: FeedbackSender) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        info!("피드백 리스너 시작: {}", socket.local_addr()?);

        Ok(Self {
            socket,
            sender,
            running: AtomicBool::new(false),
            peer_addr: RwLock::new(None),
            forwarded: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// 마지막 피드백 송신 주소
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        *self.peer_addr.read()
    }

    pub fn stats(&self) -> ListenerStats {
        ListenerStats {
            forwarded: self.forwarded.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    /// 수신 루프
    ///
    /// `stop()` 이 호출되거나 큐 소비자가 사라지면 종료.
    /// Close 메시지를 받아도 루프는 계속 돈다 (다음 세션 대기).
    pub async fn run(&self) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        let mut buf = vec![0u8; 2048];

        while self.running.load(Ordering::SeqCst) {
            tokio::select! {
                result = self.socket.recv_from(&mut buf) => {
                    match result {
                        Ok((len, addr)) => {
                            if let Err(Error::ChannelClosed) = self.handle_datagram(&buf[..len], addr) {
                                info!("피드백 큐 닫힘, 리스너 종료");
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("수신 에러: {}", e);
                        }
                    }
                }
                _ = tokio::time::sleep(Duration::from_millis(50)) => {
                    // stop 플래그 확인용
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn handle_datagram(&self, data: &[u8], addr: SocketAddr) -> Result<()> {
        let message = match Message::from_bytes(data) {
            Ok(message) => message,
            Err(e) => {
                self.malformed.fetch_add(1, Ordering::Relaxed);
                debug!("잘못된 데이터그램 ({}): {}", addr, e);
                return Ok(());
            }
        };

        match message {
            Message::Feedback(feedback) => {
                *self.peer_addr.write() = Some(addr);
                match self.sender.push(feedback) {
                    Ok(()) => {
                        self.forwarded.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(Error::QueueFull) => {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => return Err(e),
                }
            }
            Message::Close => {
                info!("피드백 송신측 종료: {}", addr);
                *self.peer_addr.write() = None;
            }
        }

        Ok(())
    }

    /// 정지
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
