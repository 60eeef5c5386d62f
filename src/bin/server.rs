//! ABRC 서버 - 피드백을 받아 인코더 비트레이트를 조정
//!
//! 실제 인코더 대신 `SharedBitrate` 를 스트림마다 두고 조정 결과를 로그로 출력한다.
//!
//! 사용법:
//!   cargo run --release --bin abrc-server -- [OPTIONS]
//!
//! 예시:
//!   # 60fps, 단일 스트림 20Mbps
//!   cargo run --release --bin abrc-server -- --fps 60 --bitrate 20000000
//!
//!   # 90fps, alpha 스트림 포함
//!   cargo run --release --bin abrc-server -- --fps 90 --bitrate 30000000 --alpha-bitrate 8000000 --alpha

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use abrc::{
    feedback_queue, Config, EncoderHandle, EncoderSettings, FeedbackListener, RateController,
    SharedBitrate, DEFAULT_FEEDBACK_PORT,
};

/// 서버 설정
struct ServerConfig {
    bind_addr: SocketAddr,
    fps: f64,
    target_occupancy: f64,
    bitrate: u64,
    alpha_bitrate: Option<u64>,
    alpha_active: bool,
    queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_FEEDBACK_PORT)),
            fps: 60.0,
            target_occupancy: 0.5,
            bitrate: 20_000_000,
            alpha_bitrate: None,
            alpha_active: false,
            queue_capacity: 4096,
        }
    }
}

fn parse_args() -> ServerConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = ServerConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" | "-b" => {
                if i + 1 < args.len() {
                    config.bind_addr = args[i + 1].parse().expect("유효한 주소 필요");
                    i += 1;
                }
            }
            "--fps" => {
                if i + 1 < args.len() {
                    config.fps = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--occupancy" => {
                if i + 1 < args.len() {
                    config.target_occupancy = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--bitrate" => {
                if i + 1 < args.len() {
                    config.bitrate = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--alpha-bitrate" => {
                if i + 1 < args.len() {
                    config.alpha_bitrate = Some(args[i + 1].parse().expect("유효한 숫자 필요"));
                    i += 1;
                }
            }
            "--alpha" | "-a" => {
                config.alpha_active = true;
            }
            "--queue" => {
                if i + 1 < args.len() {
                    config.queue_capacity = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!(
                    r#"ABRC Server - 프레임 타이밍 기반 비트레이트 컨트롤러

디코더 피드백(UDP)을 받아 encode/network/decode 중 가장 긴 단계가
프레임 시간의 목표 비율 안에 들어오도록 인코더 비트레이트를 조정

사용법:
  cargo run --release --bin abrc-server -- [OPTIONS]

옵션:
  -b, --bind <ADDR>         피드백 수신 주소 (기본: 0.0.0.0:9100)
  --fps <FPS>               프레임레이트 (기본: 60)
  --occupancy <RATIO>       목표 점유율 0.0~1.0 (기본: 0.5)
  --bitrate <BPS>           색상 스트림 비트레이트 (기본: 20000000)
  --alpha-bitrate <BPS>     alpha 스트림 비트레이트 (지정 시 스트림 추가)
  -a, --alpha               alpha 채널 활성 상태로 시작
  --queue <N>               피드백 큐 크기, 0 = 무제한 (기본: 4096)
  -h, --help                이 도움말 출력

로그 레벨은 RUST_LOG 로 조정 (예: RUST_LOG=abrc=debug)
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

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let server_config = parse_args();

    let config = Config::for_framerate(server_config.fps, server_config.target_occupancy);
    config.validate()?;

    let (low, high) = config.target_band();
    info!("ABRC Server starting...");
    info!("Frame period: {} us", config.frame_period_us);
    info!("Target band: {:.0} - {:.0} us", low, high);

    // 스트림 구성
    let mut settings = vec![EncoderSettings::colour(server_config.bitrate)];
    if let Some(alpha_bitrate) = server_config.alpha_bitrate {
        settings.push(EncoderSettings::alpha(alpha_bitrate));
    }
    let sinks: Vec<Arc<SharedBitrate>> = settings
        .iter()
        .map(|s| Arc::new(SharedBitrate::new(s.bitrate)))
        .collect();
    let handles: Vec<EncoderHandle> = sinks.iter().map(|s| s.clone() as EncoderHandle).collect();

    for (i, s) in settings.iter().enumerate() {
        info!("  Stream {}: {:?} {} bps", i, s.channels, s.bitrate);
    }

    let mut controller = RateController::new(config, handles, &settings);
    controller.set_alpha(server_config.alpha_active);

    // 피드백 큐: 리스너 → 컨트롤러 (단일 소비자)
    let (tx, queue) = feedback_queue(server_config.queue_capacity);
    let listener = Arc::new(FeedbackListener::bind(server_config.bind_addr, tx).await?);

    let consumer = tokio::task::spawn_blocking(move || queue.run(&mut controller));

    let listen_task = {
        let listener = listener.clone();
        tokio::spawn(async move { listener.run().await })
    };

    // 주기적 상태 출력
    let report_sinks = sinks.clone();
    let report_listener = listener.clone();
    let report_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        let mut last: Vec<u64> = report_sinks.iter().map(|s| s.get()).collect();
        loop {
            interval.tick().await;
            let current: Vec<u64> = report_sinks.iter().map(|s| s.get()).collect();
            let stats = report_listener.stats();
            if current != last {
                info!("Bitrate changed: {:?} -> {:?}", last, current);
                last = current;
            }
            info!(
                "Feedback: forwarded={} malformed={} dropped={} peer={:?}",
                stats.forwarded,
                stats.malformed,
                stats.dropped,
                report_listener.peer_addr()
            );
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    listener.stop();
    report_task.abort();
    let _ = report_task.await;
    listen_task.await??;
    // 리스너가 사라지면 큐 송신측이 닫혀서 소비자도 끝난다
    drop(listener);
    let processed = consumer.await?;

    info!("Processed {} feedback messages", processed);
    for (i, sink) in sinks.iter().enumerate() {
        info!("  Stream {} final bitrate: {} bps ({} updates)", i, sink.get(), sink.update_count());
    }

    Ok(())
}
