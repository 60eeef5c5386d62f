//! ABRC 클라이언트 - 합성 피드백 송신기
//!
//! 디코더 쪽 피드백을 흉내 내어 서버로 보낸다.
//! 스트림별 보고 순서를 섞고, 일부는 디코딩 미완료로 보내 집계 로직을 흔든다.
//!
//! 사용법:
//!   cargo run --release --bin abrc-client -- [OPTIONS]
//!
//! 예시:
//!   # 60fps, decode 12ms (목표 구간 초과 → 서버가 비트레이트를 낮춤)
//!   cargo run --release --bin abrc-client -- --fps 60 --decode-us 12000
//!
//!   # 색상 + alpha 두 스트림, 10% 미완료 보고
//!   cargo run --release --bin abrc-client -- --streams 2 --incomplete 0.1

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;
use rand::Rng;
use tokio::net::UdpSocket;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use abrc::{FeedbackMessage, Message, DEFAULT_FEEDBACK_PORT};

/// 클라이언트 설정
struct ClientConfig {
    bind_addr: SocketAddr,
    server_addr: SocketAddr,
    fps: f64,
    frames: u64,
    streams: u8,
    encode_us: i64,
    network_us: i64,
    decode_us: i64,
    jitter: f64,
    incomplete_ratio: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:0".parse().unwrap(),
            server_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_FEEDBACK_PORT)),
            fps: 60.0,
            frames: 3_000,
            streams: 1,
            encode_us: 4_000,
            network_us: 5_000,
            decode_us: 6_000,
            jitter: 0.1,
            incomplete_ratio: 0.0,
        }
    }
}

fn parse_args() -> ClientConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = ClientConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" | "-b" => {
                if i + 1 < args.len() {
                    config.bind_addr = args[i + 1].parse().expect("유효한 주소 필요");
                    i += 1;
                }
            }
            "--server" | "-s" => {
                if i + 1 < args.len() {
                    config.server_addr = args[i + 1].parse().expect("유효한 주소 필요");
                    i += 1;
                }
            }
            "--fps" => {
                if i + 1 < args.len() {
                    config.fps = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--frames" | "-n" => {
                if i + 1 < args.len() {
                    config.frames = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--streams" => {
                if i + 1 < args.len() {
                    config.streams = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--encode-us" => {
                if i + 1 < args.len() {
                    config.encode_us = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--network-us" => {
                if i + 1 < args.len() {
                    config.network_us = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--decode-us" => {
                if i + 1 < args.len() {
                    config.decode_us = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--jitter" => {
                if i + 1 < args.len() {
                    config.jitter = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--incomplete" => {
                if i + 1 < args.len() {
                    config.incomplete_ratio = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!(
                    r#"ABRC Client - 합성 프레임 타이밍 피드백 송신기

사용법:
  cargo run --release --bin abrc-client -- [OPTIONS]

옵션:
  -b, --bind <ADDR>      로컬 바인드 주소 (기본: 0.0.0.0:0 = 자동 할당)
  -s, --server <ADDR>    서버 주소 (기본: 127.0.0.1:9100)
  --fps <FPS>            프레임레이트 (기본: 60)
  -n, --frames <N>       보낼 프레임 수 (기본: 3000)
  --streams <N>          프레임당 스트림 수 (기본: 1)
  --encode-us <US>       평균 encode 시간 (기본: 4000)
  --network-us <US>      평균 network 시간 (기본: 5000)
  --decode-us <US>       평균 decode 시간 (기본: 6000)
  --jitter <RATIO>       시간 흔들림 비율 (기본: 0.1)
  --incomplete <RATIO>   디코딩 미완료로 보낼 비율 (기본: 0.0)
  -h, --help             이 도움말 출력
"#
                );
                std::process::exit(0);
            }
            _ => {}
        }
        i += 1;
    }

    config
}

/// 난수 범위로 쓰이는 값 검증 (NaN/무한대 거부)
fn check_config(config: &ClientConfig) -> Result<(), String> {
    if !(config.fps.is_finite() && config.fps > 0.0) {
        return Err(format!("fps must be a finite value > 0, got {}", config.fps));
    }
    if !(config.jitter.is_finite() && config.jitter >= 0.0) {
        return Err(format!("jitter must be a finite value >= 0, got {}", config.jitter));
    }
    if !(0.0..=1.0).contains(&config.incomplete_ratio) {
        return Err(format!(
            "incomplete ratio must be in [0, 1], got {}",
            config.incomplete_ratio
        ));
    }
    Ok(())
}

/// 평균값에 ±jitter 비율만큼 흔들린 길이
fn jittered<R: Rng>(rng: &mut R, mean: i64, jitter: f64) -> i64 {
    if jitter <= 0.0 || mean <= 0 {
        return mean.max(0);
    }
    let factor = rng.gen_range(1.0 - jitter..=1.0 + jitter);
    ((mean as f64) * factor).round().max(0.0) as i64
}

fn synth_feedback<R: Rng>(
    rng: &mut R,
    config: &ClientConfig,
    frame_index: u64,
    stream_index: u8,
    frame_start: i64,
) -> FeedbackMessage {
    let encode_begin = frame_start;
    let encode_end = encode_begin + jittered(rng, config.encode_us, config.jitter);

    // 송신측/수신측 시계가 조금 어긋난 것처럼 수신측 관측을 흔든다
    let send_begin = encode_end;
    let send_end = send_begin + jittered(rng, config.network_us, config.jitter);
    let skew = rng.gen_range(-200..=200);
    let received_first_packet = send_begin + skew;
    let received_last_packet = send_end + skew;

    let sent_to_decoder = send_end.max(received_last_packet);
    let decoded = !rng.gen_bool(config.incomplete_ratio);
    let received_from_decoder =
        decoded.then(|| sent_to_decoder + jittered(rng, config.decode_us, config.jitter));

    FeedbackMessage {
        frame_index,
        stream_index,
        encode_begin,
        encode_end,
        send_begin,
        send_end,
        received_first_packet,
        received_last_packet,
        sent_to_decoder,
        received_from_decoder,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = parse_args();
    check_config(&config)?;

    let socket = UdpSocket::bind(config.bind_addr).await?;
    socket.connect(config.server_addr).await?;

    info!("ABRC Client starting...");
    info!("Server: {}", config.server_addr);
    info!(
        "{} frames @ {} fps, {} stream(s), encode {} / network {} / decode {} us",
        config.frames, config.fps, config.streams, config.encode_us, config.network_us, config.decode_us
    );

    let frame_period = Duration::from_secs_f64(1.0 / config.fps);
    let frame_period_us = frame_period.as_micros() as i64;
    let mut interval = tokio::time::interval(frame_period);
    let mut rng = rand::thread_rng();
    let mut stream_order: Vec<u8> = (0..config.streams).collect();
    let start = Instant::now();
    let mut sent = 0u64;

    for frame_index in 0..config.frames {
        interval.tick().await;
        let frame_start = frame_index as i64 * frame_period_us;

        // 스트림 보고 순서는 매 프레임 섞는다
        stream_order.shuffle(&mut rng);
        for &stream_index in &stream_order {
            let feedback = synth_feedback(&mut rng, &config, frame_index, stream_index, frame_start);
            match socket.send(&feedback.to_bytes()?).await {
                Ok(_) => sent += 1,
                Err(e) => warn!("송신 실패: {}", e),
            }
        }

        if frame_index % 600 == 0 {
            info!("Progress: frame {}/{}", frame_index, config.frames);
        }
    }

    socket.send(&Message::Close.to_bytes()?).await?;

    info!("Done: {} feedback messages in {:.2}s", sent, start.elapsed().as_secs_f64());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_config_rejects_non_finite() {
        assert!(check_config(&ClientConfig::default()).is_ok());

        let config = ClientConfig {
            jitter: f64::NAN,
            ..ClientConfig::default()
        };
        assert!(check_config(&config).is_err());

        let config = ClientConfig {
            jitter: f64::INFINITY,
            ..ClientConfig::default()
        };
        assert!(check_config(&config).is_err());

        let config = ClientConfig {
            fps: f64::NAN,
            ..ClientConfig::default()
        };
        assert!(check_config(&config).is_err());

        let config = ClientConfig {
            incomplete_ratio: f64::NAN,
            ..ClientConfig::default()
        };
        assert!(check_config(&config).is_err());
    }

    #[test]
    fn test_synth_feedback_with_checked_config() {
        let config = ClientConfig {
            jitter: 0.5,
            incomplete_ratio: 1.0,
            ..ClientConfig::default()
        };
        assert!(check_config(&config).is_ok());

        let mut rng = rand::thread_rng();
        let feedback = synth_feedback(&mut rng, &config, 7, 0, 1_000);
        assert_eq!(feedback.frame_index, 7);
        assert!(feedback.encode_end >= feedback.encode_begin);
        assert!(!feedback.is_decoded());
    }
}
