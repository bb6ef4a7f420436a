//! 데이터그램 소켓 추상화
//!
//! 연결 계층은 논블로킹 송수신만 사용. 받을 데이터가 없으면 즉시 `Ok(None)`

use std::io;
use std::net::SocketAddr;

/// 논블로킹 데이터그램 소켓
pub trait DatagramSocket {
    /// 데이터그램 송신
    fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize>;

    /// 데이터그램 수신. 대기 중인 데이터가 없으면 `Ok(None)`
    fn recv_from(&self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>>;

    /// 로컬 바인드 주소
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

fn would_block<T>(result: io::Result<T>) -> io::Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
        Err(e) => Err(e),
    }
}

impl DatagramSocket for tokio::net::UdpSocket {
    fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
        // 송신 버퍼가 가득 찬 경우는 UDP 손실과 동일하게 취급
        Ok(would_block(self.try_send_to(buf, addr))?.unwrap_or(0))
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        would_block(self.try_recv_from(buf))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        tokio::net::UdpSocket::local_addr(self)
    }
}

/// `set_nonblocking(true)` 상태여야 함
impl DatagramSocket for std::net::UdpSocket {
    fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
        Ok(would_block(std::net::UdpSocket::send_to(self, buf, addr))?.unwrap_or(0))
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        would_block(std::net::UdpSocket::recv_from(self, buf))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        std::net::UdpSocket::local_addr(self)
    }
}

impl<T: DatagramSocket + ?Sized> DatagramSocket for std::sync::Arc<T> {
    fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
        (**self).send_to(buf, addr)
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        (**self).recv_from(buf)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        (**self).local_addr()
    }
}
