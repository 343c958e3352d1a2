use std::time::Duration;

use log::debug;
use tokio::net::UdpSocket;
use tokio::time::timeout;

use mcws_protocol::management::minecraft::{
    handshake_packet, parse_challenge, parse_full_stat, stat_packet, PingResponse, QueryError,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1500);
const MAX_TIMEOUT: Duration = Duration::from_secs(5);

/// Stateless client for the UDP full-stat query protocol. One ephemeral
/// socket per call, no retries; retrying is the caller's decision.
#[derive(Debug, Clone, Copy)]
pub struct QueryClient {
    timeout: Duration,
}

impl Default for QueryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryClient {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: timeout.min(MAX_TIMEOUT),
        }
    }

    /// Runs the two-phase handshake + full-stat exchange. One shared timer
    /// guards the whole exchange, so a late phase-one reply cannot leave
    /// phase two waiting past the deadline.
    pub async fn query(&self, host: &str, port: u16) -> Result<PingResponse, QueryError> {
        match timeout(self.timeout, Self::exchange(host, port)).await {
            Ok(result) => result,
            Err(_) => Err(QueryError::Timeout {
                host: host.to_string(),
                port,
            }),
        }
    }

    // The socket stays unconnected on purpose: a connected UDP socket
    // surfaces ICMP port-unreachable as an I/O error, and "nothing is
    // listening" must read as a timeout, the signal callers use to tell a
    // down process from a misbehaving one.
    async fn exchange(host: &str, port: u16) -> Result<PingResponse, QueryError> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let target = format!("{}:{}", host, port);

        socket.send_to(&handshake_packet(), &target).await?;
        let mut reply = [0u8; 2048];
        let (received, _) = socket.recv_from(&mut reply).await?;
        let token = parse_challenge(&reply[..received])?;
        debug!("challenge token {} from {}:{}", token, host, port);

        socket.send_to(&stat_packet(token), &target).await?;
        let mut reply = [0u8; 8192];
        let (received, _) = socket.recv_from(&mut reply).await?;
        parse_full_stat(&reply[..received], host, port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A scripted query responder bound to an ephemeral localhost port.
    async fn spawn_responder(challenge: &'static [u8], stat: &'static [u8]) -> u16 {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = socket.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let (_, peer) = socket.recv_from(&mut buf).await.unwrap();
            socket.send_to(challenge, peer).await.unwrap();
            let (_, peer) = socket.recv_from(&mut buf).await.unwrap();
            socket.send_to(stat, peer).await.unwrap();
        });
        port
    }

    fn stat_reply() -> &'static [u8] {
        // Type + zero session id, then the field sequence from field 5 on:
        // filler up to the fixed offsets, count 2 and two names at 30.
        const REPLY: &[u8] = b"\x00\x00\x00\x00\x00splitnum\0\x50\0hostname\0motd\0gametype\0SMP\0\
game_id\0MINECRAFT\0version\01.20.4\0plugins\0\0map\0world\0numplayers\02\0maxplayers\020\0\
hostport\025565\0hostip\0127.0.0.1\0\0\x01player_\0\0alice\0bob";
        REPLY
    }

    #[tokio::test]
    async fn full_exchange_parses_the_player_list() {
        let port = spawn_responder(b"\x09\x00\x00\x00\x0012345\0", stat_reply()).await;
        let client = QueryClient::new();

        let response = client.query("127.0.0.1", port).await.unwrap();
        assert_eq!(response.players, vec!["alice", "bob"]);
        assert_eq!(response.game_version, "1.20.4");
        assert_eq!(response.port, port);
    }

    #[tokio::test]
    async fn no_reply_resolves_to_timeout() {
        // Bound but silent socket.
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = socket.local_addr().unwrap().port();
        let client = QueryClient::with_timeout(Duration::from_millis(50));

        let err = client.query("127.0.0.1", port).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn wrong_challenge_type_is_a_protocol_error_not_a_timeout() {
        let port = spawn_responder(b"\xff\x00\x00\x00\x0012345\0", stat_reply()).await;
        let client = QueryClient::new();

        let err = client.query("127.0.0.1", port).await.unwrap_err();
        assert!(matches!(err, QueryError::Protocol(_)));
        assert!(!err.is_timeout());
    }
}
