//! RFT - Reliable File Transfer over UDP
//!
//! 인자 없이 실행하면 수신자(서버), 주소와 파일을 주면 송신자(클라이언트)
//!
//! 사용법:
//!   cargo run --release --bin rft -- [OPTIONS]                  # 수신 대기
//!   cargo run --release --bin rft -- [OPTIONS] <IPv4> <FILE>    # 파일 송신

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use rft::chunk::FileSource;
use rft::{Config, DatagramSocket, Node, NodeStatus};

/// 실행 역할
enum Role {
    Server,
    Client { server: Ipv4Addr, path: PathBuf },
}

struct Cli {
    role: Role,
    config: Config,
}

const USAGE: &str = r#"RFT - Reliable File Transfer

UDP 위의 순서 번호/ACK 신뢰성 계층 + RTT 기반 흐름 제어 + CRC32 검증 파일 전송

사용법:
  rft [OPTIONS]                    수신자: UDP 30000 포트에서 대기
  rft [OPTIONS] <IPv4> <FILE>      송신자: <IPv4>:30000 으로 <FILE> 전송

옵션:
  -o, --output-dir <DIR>   수신 파일 저장 디렉터리 (기본: .)
  --lan                    LAN 설정 (1400 bytes 패킷, 짧은 타임아웃)
  --lossy                  불안정한 네트워크 설정 (긴 타임아웃)
  -h, --help               이 도움말 출력

로그 레벨은 RUST_LOG 로 조정 (예: RUST_LOG=rft=debug)
"#;

fn parse_args() -> Result<Cli, String> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut config = Config::default();
    let mut output_dir = None;
    let mut positional = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--output-dir" | "-o" => {
                let dir = args.get(i + 1).ok_or("--output-dir 에 디렉터리 필요")?;
                output_dir = Some(PathBuf::from(dir));
                i += 1;
            }
            "--lan" => config = Config::lan(),
            "--lossy" => config = Config::lossy(),
            "--help" | "-h" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            other if other.starts_with('-') => return Err(format!("알 수 없는 옵션: {other}")),
            other => positional.push(other.to_string()),
        }
        i += 1;
    }

    if let Some(dir) = output_dir {
        config.output_dir = dir;
    }

    let role = match positional.as_slice() {
        [] => Role::Server,
        [address, path] => Role::Client {
            server: address
                .parse()
                .map_err(|_| format!("유효한 IPv4 주소 필요: {address}"))?,
            path: PathBuf::from(path),
        },
        _ => return Err("인자는 없거나 <IPv4> <FILE> 두 개여야 함".into()),
    };

    Ok(Cli { role, config })
}

#[tokio::main]
async fn main() -> ExitCode {
    // 로깅 설정
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("로깅 초기화 실패: {e}");
    }

    let cli = match parse_args() {
        Ok(cli) => cli,
        Err(message) => {
            eprintln!("{message}\n\n{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("fatal: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> rft::Result<ExitCode> {
    let config = cli.config;
    config.validate()?;

    info!("RFT starting...");
    info!("Packet size: {} bytes (payload {})", config.packet_size, config.payload_size());
    info!("Timestep: {:.1}ms, timeout: {:.1}s", config.delta_time * 1000.0, config.timeout);

    match cli.role {
        Role::Server => {
            let socket = UdpSocket::bind(SocketAddr::from(([0, 0, 0, 0], config.server_port))).await?;
            info!("Receiver listening on {}", DatagramSocket::local_addr(&socket)?);
            info!("Output: {}/{}<name>", config.output_dir.display(), config.output_prefix);

            let node = Node::server(socket, config)?;
            drive(node).await
        }
        Role::Client { server, path } => {
            let source = FileSource::load(&path)?;
            info!("Loaded file: {} ({} bytes)", source.name(), source.len());

            let server = SocketAddr::from((server, config.server_port));
            let socket = UdpSocket::bind(SocketAddr::from(([0, 0, 0, 0], config.client_port))).await?;
            info!("Sender bound on {}, target {}", DatagramSocket::local_addr(&socket)?, server);

            let node = Node::client(socket, config, server, source)?;
            drive(node).await
        }
    }
}

/// 고정 타임스텝 루프. 완료 후 ACK 지평선만큼 더 돌려 마지막 ACK 를 주고받음
async fn drive<S: DatagramSocket>(mut node: Node<S>) -> rft::Result<ExitCode> {
    let dt = node.config().delta_time;
    let linger_ticks = (node.config().rtt_maximum / dt).ceil() as u32;

    let mut ticker = tokio::time::interval(Duration::from_secs_f64(dt));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut linger: Option<u32> = None;
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("interrupted, stopping");
                node.stop();
                return Ok(ExitCode::SUCCESS);
            }
            _ = ticker.tick() => {}
        }

        match node.tick(dt)? {
            NodeStatus::Running => {}
            NodeStatus::Completed(report) => {
                let remaining = linger.get_or_insert_with(|| {
                    info!("{}", report.summary());
                    linger_ticks
                });
                if *remaining == 0 {
                    info!("final stats: {}", node.connection().stats().summary());
                    node.stop();
                    return Ok(ExitCode::SUCCESS);
                }
                *remaining -= 1;
            }
            NodeStatus::ConnectFailed => {
                error!("{}: no response from server", rft::Error::ConnectFailed);
                return Ok(ExitCode::FAILURE);
            }
            NodeStatus::Disconnected => {
                error!("connection lost before transfer completed");
                return Ok(ExitCode::FAILURE);
            }
        }
    }
}
