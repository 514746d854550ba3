//! Filtering HTTP/HTTPS proxy (§4.G).
//!
//! Binds loopback, port 0, and accepts connections in a background thread.
//! Each connection goes through REQ_LINE → AUTHORIZE → TUNNEL (CONNECT) or
//! FORWARD (plain HTTP). All connection-level errors are swallowed so one
//! bad client can't take the proxy down.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use agentcage_core::observability;

use crate::allowlist::NetworkAllowlist;

const REQ_LINE_DEADLINE: Duration = Duration::from_secs(10);
const TUNNEL_TIMEOUT: Duration = Duration::from_secs(120);
const DIAL_TIMEOUT: Duration = Duration::from_secs(30);
const TUNNEL_BUF_SIZE: usize = 32 * 1024;

/// A running filtering proxy bound to loopback on an OS-assigned port.
pub struct FilteringProxy {
    port: u16,
    running: Arc<AtomicBool>,
}

impl FilteringProxy {
    /// Bind and start accepting connections in a background thread.
    pub fn start(allowlist: NetworkAllowlist) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        listener.set_nonblocking(true)?;
        let port = listener.local_addr()?.port();

        let running = Arc::new(AtomicBool::new(true));
        let running_for_thread = Arc::clone(&running);
        let allowlist = Arc::new(allowlist);

        thread::spawn(move || {
            while running_for_thread.load(Ordering::SeqCst) {
                match listener.accept() {
                    Ok((stream, _addr)) => {
                        let allowlist = Arc::clone(&allowlist);
                        thread::spawn(move || {
                            let _ = handle_connection(stream, &allowlist);
                        });
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(Duration::from_millis(10));
                    }
                    Err(_) => {
                        thread::sleep(Duration::from_millis(10));
                    }
                }
            }
        });

        Ok(Self { port, running })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Stop accepting new connections. Outstanding connections are not
    /// forcibly closed; their threads unwind on their own as streams error
    /// out or complete.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// The four proxy environment variables pointing at this instance.
    pub fn env_vars(&self) -> Vec<(&'static str, String)> {
        let value = format!("http://127.0.0.1:{}", self.port);
        vec![
            ("HTTP_PROXY", value.clone()),
            ("HTTPS_PROXY", value.clone()),
            ("http_proxy", value.clone()),
            ("https_proxy", value),
        ]
    }
}

impl Drop for FilteringProxy {
    fn drop(&mut self) {
        self.stop();
    }
}

fn handle_connection(mut client: TcpStream, allowlist: &NetworkAllowlist) -> std::io::Result<()> {
    client.set_read_timeout(Some(REQ_LINE_DEADLINE))?;
    let mut reader = BufReader::new(client.try_clone()?);

    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;
    let (method, target) = match parse_request_line(&request_line) {
        Some(pair) => pair,
        None => return send_error(&mut client, 400, "Bad Request"),
    };

    let host = extract_host(&method, &target);
    if !allowlist.matches(&host) {
        observability::security_blocked_network(&host, "domain not in allowlist");
        return send_error(&mut client, 403, "Domain not in allowlist");
    }

    if method.eq_ignore_ascii_case("CONNECT") {
        tunnel(&mut client, &mut reader, &target)
    } else {
        forward(&mut client, &mut reader, &method, &target, &request_line)
    }
}

fn parse_request_line(line: &str) -> Option<(String, String)> {
    let mut parts = line.trim_end().split_whitespace();
    let method = parts.next()?.to_string();
    let target = parts.next()?.to_string();
    parts.next()?; // VERSION, required but unused
    Some((method, target))
}

/// CONNECT: host is the substring of TARGET before `:`. Plain HTTP: strip
/// an optional scheme, then read up to the next `/` or `:`.
fn extract_host(method: &str, target: &str) -> String {
    if method.eq_ignore_ascii_case("CONNECT") {
        return target.split(':').next().unwrap_or(target).to_string();
    }

    let stripped = target
        .strip_prefix("http://")
        .or_else(|| target.strip_prefix("https://"))
        .unwrap_or(target);

    stripped
        .split(['/', ':'])
        .next()
        .unwrap_or(stripped)
        .to_string()
}

fn tunnel(
    client: &mut TcpStream,
    reader: &mut BufReader<TcpStream>,
    target: &str,
) -> std::io::Result<()> {
    let (host, port) = parse_host_port(target, 443);

    // Drain remaining header lines before replying.
    loop {
        let mut line = String::new();
        reader.read_line(&mut line)?;
        if line.trim().is_empty() {
            break;
        }
    }

    let mut remote = match dial(&host, port) {
        Ok(stream) => stream,
        Err(_) => return Ok(()), // dial failures abort silently
    };

    client.write_all(b"HTTP/1.1 200 Connection Established\r\n\r\n")?;
    client.flush()?;

    tunnel_bytes(client, &mut remote)
}

fn forward(
    client: &mut TcpStream,
    reader: &mut BufReader<TcpStream>,
    method: &str,
    target: &str,
    _request_line: &str,
) -> std::io::Result<()> {
    let (host, _) = parse_host_port(&strip_scheme(target), 80);

    let mut remote = match dial(&host, 80) {
        Ok(stream) => stream,
        Err(_) => return Ok(()),
    };

    let path = request_path(target);
    remote.write_all(format!("{method} {path} HTTP/1.1\r\n").as_bytes())?;

    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line)?;
        if n == 0 || line.trim().is_empty() {
            break;
        }
        remote.write_all(line.as_bytes())?;
    }
    remote.write_all(b"\r\n")?;
    remote.flush()?;

    let mut buf = [0u8; TUNNEL_BUF_SIZE];
    loop {
        let n = remote.read(&mut buf)?;
        if n == 0 {
            break;
        }
        if client.write_all(&buf[..n]).is_err() {
            break;
        }
    }
    Ok(())
}

fn strip_scheme(target: &str) -> String {
    target
        .strip_prefix("http://")
        .or_else(|| target.strip_prefix("https://"))
        .unwrap_or(target)
        .to_string()
}

fn request_path(target: &str) -> String {
    let stripped = strip_scheme(target);
    match stripped.find('/') {
        Some(pos) => stripped[pos..].to_string(),
        None => "/".to_string(),
    }
}

fn parse_host_port(s: &str, default_port: u16) -> (String, u16) {
    let host_port = s.split('/').next().unwrap_or(s);
    match host_port.rfind(':') {
        Some(pos) => {
            let port = host_port[pos + 1..].parse().unwrap_or(default_port);
            (host_port[..pos].to_string(), port)
        }
        None => (host_port.to_string(), default_port),
    }
}

fn dial(host: &str, port: u16) -> std::io::Result<TcpStream> {
    let addr = format!("{host}:{port}")
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "unresolvable host"))?;
    TcpStream::connect_timeout(&addr, DIAL_TIMEOUT)
}

fn send_error(client: &mut TcpStream, code: u16, message: &str) -> std::io::Result<()> {
    let body = format!(
        "HTTP/1.1 {code} {message}\r\nConnection: close\r\nContent-Length: {}\r\n\r\n{message}",
        message.len()
    );
    client.write_all(body.as_bytes())?;
    client.flush()
}

fn tunnel_bytes(a: &mut TcpStream, b: &mut TcpStream) -> std::io::Result<()> {
    let mut a_read = a.try_clone()?;
    let mut a_write = a.try_clone()?;
    let mut b_read = b.try_clone()?;
    let mut b_write = b.try_clone()?;

    a_read.set_read_timeout(Some(TUNNEL_TIMEOUT))?;
    b_read.set_read_timeout(Some(TUNNEL_TIMEOUT))?;

    let forward_a_to_b = thread::spawn(move || {
        copy_until_closed(&mut a_read, &mut b_write);
    });
    let forward_b_to_a = thread::spawn(move || {
        copy_until_closed(&mut b_read, &mut a_write);
    });

    let _ = forward_a_to_b.join();
    let _ = forward_b_to_a.join();
    Ok(())
}

fn copy_until_closed(read_from: &mut TcpStream, write_to: &mut TcpStream) {
    let mut buf = [0u8; TUNNEL_BUF_SIZE];
    loop {
        match read_from.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if write_to.write_all(&buf[..n]).is_err() {
                    break;
                }
            }
            Err(ref e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(_) => break,
        }
    }
    let _ = write_to.shutdown(Shutdown::Write);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_connect_host_before_colon() {
        assert_eq!(extract_host("CONNECT", "example.com:443"), "example.com");
    }

    #[test]
    fn extracts_plain_http_host_stripping_scheme() {
        assert_eq!(extract_host("GET", "http://example.com/path"), "example.com");
        assert_eq!(extract_host("GET", "https://example.com:8443/path"), "example.com");
        assert_eq!(extract_host("GET", "example.com/path"), "example.com");
    }

    #[test]
    fn parses_host_port_with_and_without_explicit_port() {
        assert_eq!(parse_host_port("example.com:8080", 443), ("example.com".to_string(), 8080));
        assert_eq!(parse_host_port("example.com", 443), ("example.com".to_string(), 443));
    }

    #[test]
    fn request_path_defaults_to_root() {
        assert_eq!(request_path("http://example.com"), "/");
        assert_eq!(request_path("http://example.com/foo/bar"), "/foo/bar");
    }

    #[test]
    fn env_vars_cover_all_four_variants() {
        let proxy = FilteringProxy::start(NetworkAllowlist::new()).expect("bind loopback proxy");
        let vars = proxy.env_vars();
        let names: Vec<_> = vars.iter().map(|(k, _)| *k).collect();
        assert_eq!(names, vec!["HTTP_PROXY", "HTTPS_PROXY", "http_proxy", "https_proxy"]);
        for (_, v) in &vars {
            assert!(v.starts_with("http://127.0.0.1:"));
        }
    }

    #[test]
    fn connect_to_allowed_but_unreachable_target_is_swallowed_not_panicking() {
        // Bind a throwaway listener to learn a loopback port, then drop it
        // so the port is refused on connect — exercising the dial-failure
        // path without depending on external DNS or network reachability.
        let closed_port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let allowlist = NetworkAllowlist::from_patterns(["127.0.0.1"]);
        let proxy = FilteringProxy::start(allowlist).expect("bind loopback proxy");
        let mut client = TcpStream::connect(("127.0.0.1", proxy.port())).expect("connect to proxy");
        client
            .write_all(format!("CONNECT 127.0.0.1:{closed_port} HTTP/1.1\r\n\r\n").as_bytes())
            .unwrap();
        client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let mut buf = [0u8; 64];
        // The remote refuses the connection; the proxy swallows the dial
        // error and closes without replying, rather than hanging or panicking.
        let _ = client.read(&mut buf);
    }

    #[test]
    fn connect_to_disallowed_host_gets_403() {
        let allowlist = NetworkAllowlist::from_patterns(["allowed.example"]);
        let proxy = FilteringProxy::start(allowlist).expect("bind loopback proxy");
        let mut client = TcpStream::connect(("127.0.0.1", proxy.port())).expect("connect to proxy");
        client
            .write_all(b"CONNECT blocked.example:443 HTTP/1.1\r\n\r\n")
            .unwrap();
        client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let mut response = String::new();
        let mut buf_reader = BufReader::new(client);
        buf_reader.read_line(&mut response).unwrap();
        assert!(response.starts_with("HTTP/1.1 403"));
    }
}
