/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
  /// Bind address (default: `127.0.0.1`).
  pub host: String,
  /// Bind port (default: `48008`).
  pub port: u16,
  /// Request timeout in seconds (default: `30`).
  pub request_timeout_secs: u64,
  /// Largest accepted request body in bytes (default: 64 MiB).
  pub max_body_bytes: usize,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host: "127.0.0.1".to_string(),
      port: 48008,
      request_timeout_secs: 30,
      max_body_bytes: 64 * 1024 * 1024,
    }
  }
}

impl ServerConfig {
  /// `host:port` string to bind to.
  pub fn bind_addr(&self) -> String {
    format!("{}:{}", self.host, self.port)
  }
}
