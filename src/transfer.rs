//! 역할별 전송 상태 기계
//!
//! 시작 시 역할에 따라 송신자 또는 수신자 하나만 선택됨

use bytes::Bytes;
use tracing::trace;

use crate::connection::ReliableConnection;
use crate::receiver::FileReceiver;
use crate::sender::FileSender;
use crate::socket::DatagramSocket;
use crate::stats::TransferReport;
use crate::Result;

/// 파일 계층이 패킷을 내보내는 대상
pub trait PacketSink {
    fn send_packet(&mut self, payload: &[u8]) -> Result<()>;
}

impl<S: DatagramSocket> PacketSink for ReliableConnection<S> {
    fn send_packet(&mut self, payload: &[u8]) -> Result<()> {
        ReliableConnection::send_packet(self, payload)
    }
}

/// 송신 페이로드 기록용
impl PacketSink for Vec<Bytes> {
    fn send_packet(&mut self, payload: &[u8]) -> Result<()> {
        self.push(Bytes::copy_from_slice(payload));
        Ok(())
    }
}

/// 역할별 전송
#[derive(Debug)]
pub enum Transfer {
    Send(FileSender),
    Receive(FileReceiver),
}

impl Transfer {
    /// 전송률 틱마다 호출
    pub fn on_send_tick(&mut self, sink: &mut impl PacketSink) -> Result<()> {
        match self {
            Transfer::Send(sender) => sender.tick(sink),
            Transfer::Receive(_) => Ok(()),
        }
    }

    /// 수신 페이로드마다 호출
    pub fn on_packet(&mut self, payload: &[u8]) -> Result<()> {
        match self {
            Transfer::Send(_) => {
                trace!("송신자는 페이로드 무시: {} bytes", payload.len());
                Ok(())
            }
            Transfer::Receive(receiver) => receiver.on_packet(payload),
        }
    }

    /// 연결이 끊겼을 때: 수신자는 미완료 전송을 버리고 처음부터 대기
    pub fn on_disconnect(&mut self) {
        if let Transfer::Receive(receiver) = self {
            if !receiver.is_completed() {
                receiver.restart();
            }
        }
    }

    pub fn is_completed(&self) -> bool {
        match self {
            Transfer::Send(sender) => sender.is_completed(),
            Transfer::Receive(receiver) => receiver.is_completed(),
        }
    }

    pub fn report(&self) -> Option<&TransferReport> {
        match self {
            Transfer::Send(sender) => sender.report(),
            Transfer::Receive(receiver) => receiver.report(),
        }
    }

    pub fn role(&self) -> &'static str {
        match self {
            Transfer::Send(_) => "sender",
            Transfer::Receive(_) => "receiver",
        }
    }
}
