//! Minimal HTTP/1.1 request handling over a raw TCP stream.
//!
//! Parses just enough of a request head to route it: method, path, query
//! parameters and the handful of headers the server cares about (Host,
//! proxy-forwarded client IPs, WebSocket upgrade fields). Responses are
//! written directly; on the upgrade path the stream is handed to
//! tokio-tungstenite afterwards.

use std::collections::HashMap;
use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;

use crate::{MAX_REQUEST_HEAD, ServerError};

/// A parsed HTTP request head.
#[derive(Debug)]
pub struct RequestHead {
    pub method: String,
    /// Path component only, query string stripped.
    pub path: String,
    pub query: HashMap<String, String>,
    /// Header names lowercased; first occurrence wins.
    pub headers: HashMap<String, String>,
}

impl RequestHead {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Integer query parameter; malformed values read as absent.
    pub fn query_int<T: std::str::FromStr>(&self, name: &str) -> Option<T> {
        self.query.get(name).and_then(|v| v.parse().ok())
    }

    /// Whether this request asks for a WebSocket upgrade.
    pub fn is_upgrade(&self) -> bool {
        self.header("upgrade")
            .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
    }
}

/// Reads the request head off the stream, byte by byte up to the
/// `\r\n\r\n` terminator.
///
/// Single-byte reads keep any bytes that follow the head (none for GET,
/// but a fast client's first frames on the upgrade path) inside the
/// kernel buffer for whoever owns the stream next.
pub async fn read_request_head(stream: &mut TcpStream) -> Result<RequestHead, ServerError> {
    let mut head = Vec::with_capacity(512);
    let mut byte = [0u8; 1];

    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_REQUEST_HEAD {
            return Err(ServerError::HeadTooLarge);
        }
        let n = stream.read(&mut byte).await?;
        if n == 0 {
            return Err(ServerError::BadRequest("connection closed mid-head".into()));
        }
        head.push(byte[0]);
    }

    parse_head(&head)
}

fn parse_head(head: &[u8]) -> Result<RequestHead, ServerError> {
    let text = std::str::from_utf8(head)
        .map_err(|_| ServerError::BadRequest("request head is not UTF-8".into()))?;
    let mut lines = text.split("\r\n");

    let request_line = lines
        .next()
        .ok_or_else(|| ServerError::BadRequest("empty request".into()))?;
    let mut parts = request_line.split(' ');
    let method = parts
        .next()
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ServerError::BadRequest("missing method".into()))?
        .to_string();
    let target = parts
        .next()
        .ok_or_else(|| ServerError::BadRequest("missing request target".into()))?;
    let version = parts
        .next()
        .ok_or_else(|| ServerError::BadRequest("missing HTTP version".into()))?;
    if !version.starts_with("HTTP/") {
        return Err(ServerError::BadRequest(format!(
            "bad HTTP version {version:?}"
        )));
    }

    let (path, query) = match target.split_once('?') {
        Some((p, q)) => (p.to_string(), parse_query(q)),
        None => (target.to_string(), HashMap::new()),
    };

    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers
                .entry(name.trim().to_ascii_lowercase())
                .or_insert_with(|| value.trim().to_string());
        }
    }

    Ok(RequestHead {
        method,
        path,
        query,
        headers,
    })
}

fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Resolves the client identity for position tracking.
///
/// Reverse proxies are honored first (`X-Real-Ip`, then the first entry of
/// `X-Forwarded-For`), falling back to the peer address. Ports are
/// stripped so reconnects from new ephemeral ports map to the same entry.
pub fn client_ip(head: &RequestHead, peer: SocketAddr) -> String {
    if let Some(ip) = head.header("x-real-ip") {
        return strip_port(ip);
    }
    if let Some(forwarded) = head.header("x-forwarded-for") {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return strip_port(first);
            }
        }
    }
    peer.ip().to_string()
}

fn strip_port(addr: &str) -> String {
    match addr.parse::<SocketAddr>() {
        Ok(sock) => sock.ip().to_string(),
        Err(_) => addr.trim().to_string(),
    }
}

/// Writes a plain response with the given status line and HTML body.
pub async fn write_response(
    stream: &mut TcpStream,
    status: &str,
    extra_headers: &str,
    body: &str,
) -> Result<(), ServerError> {
    let response = format!(
        "HTTP/1.1 {status}\r\n\
         Content-Type: text/html; charset=utf-8\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         {extra_headers}\r\n\
         {body}",
        body.len(),
    );
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}

pub async fn write_method_not_allowed(stream: &mut TcpStream) -> Result<(), ServerError> {
    write_response(
        stream,
        "405 Method Not Allowed",
        "Allow: GET\r\n",
        "Method not allowed\n",
    )
    .await
}

pub async fn write_bad_request(stream: &mut TcpStream) -> Result<(), ServerError> {
    write_response(stream, "400 Bad Request", "", "Bad request\n").await
}

/// Completes the WebSocket handshake on a request already read off the
/// stream, replying 101 with the derived accept key.
pub async fn write_upgrade_response(
    stream: &mut TcpStream,
    head: &RequestHead,
) -> Result<(), ServerError> {
    if !head.is_upgrade() {
        return Err(ServerError::NotAnUpgrade);
    }
    let key = head
        .header("sec-websocket-key")
        .ok_or(ServerError::NotAnUpgrade)?;
    let accept = derive_accept_key(key.as_bytes());

    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept}\r\n\
         \r\n"
    );
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> RequestHead {
        parse_head(raw.as_bytes()).unwrap()
    }

    #[test]
    fn parses_request_line_and_headers() {
        let head = parse(
            "GET /logs?lastPos=42&lastMod=1700000000 HTTP/1.1\r\n\
             Host: example.com:8080\r\n\
             Upgrade: websocket\r\n\
             Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n",
        );
        assert_eq!(head.method, "GET");
        assert_eq!(head.path, "/logs");
        assert_eq!(head.query_int::<u64>("lastPos"), Some(42));
        assert_eq!(head.query_int::<i64>("lastMod"), Some(1_700_000_000));
        assert_eq!(head.header("host"), Some("example.com:8080"));
        assert!(head.is_upgrade());
    }

    #[test]
    fn malformed_query_values_read_as_absent() {
        let head = parse("GET /?lastPos=abc&lastMod= HTTP/1.1\r\n\r\n");
        assert_eq!(head.query_int::<u64>("lastPos"), None);
        assert_eq!(head.query_int::<i64>("lastMod"), None);
        assert_eq!(head.query_int::<u64>("missing"), None);
    }

    #[test]
    fn negative_offset_fails_u64_parse() {
        let head = parse("GET /?lastPos=-7 HTTP/1.1\r\n\r\n");
        assert_eq!(head.query_int::<u64>("lastPos"), None);
    }

    #[test]
    fn header_names_are_case_insensitive() {
        let head = parse("GET / HTTP/1.1\r\nUPGRADE: WebSocket\r\n\r\n");
        assert!(head.is_upgrade());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_head(b"not http at all\r\n\r\n").is_err());
        assert!(parse_head(b"\r\n\r\n").is_err());
    }

    #[test]
    fn client_ip_prefers_real_ip_header() {
        let peer: SocketAddr = "127.0.0.1:5555".parse().unwrap();
        let head = parse(
            "GET / HTTP/1.1\r\n\
             X-Real-Ip: 203.0.113.7\r\n\
             X-Forwarded-For: 10.0.0.1, 10.0.0.2\r\n\r\n",
        );
        assert_eq!(client_ip(&head, peer), "203.0.113.7");
    }

    #[test]
    fn client_ip_falls_back_to_forwarded_for_then_peer() {
        let peer: SocketAddr = "192.0.2.1:9999".parse().unwrap();

        let head = parse("GET / HTTP/1.1\r\nX-Forwarded-For: 10.1.2.3, 10.0.0.9\r\n\r\n");
        assert_eq!(client_ip(&head, peer), "10.1.2.3");

        let head = parse("GET / HTTP/1.1\r\n\r\n");
        assert_eq!(client_ip(&head, peer), "192.0.2.1");
    }

    #[test]
    fn client_ip_strips_ports() {
        let peer: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let head = parse("GET / HTTP/1.1\r\nX-Real-Ip: 198.51.100.4:31337\r\n\r\n");
        assert_eq!(client_ip(&head, peer), "198.51.100.4");
    }
}
