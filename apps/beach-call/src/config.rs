use std::env;
#[cfg(test)]
use std::sync::Mutex;

use call_signaling::PeerId;

pub const DEFAULT_SIGNALING_URL: &str = "ws://127.0.0.1:881";
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// Call client configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Rendezvous server address; bare `host:port` is accepted
    pub signaling_url: String,
    /// STUN/TURN urls handed to every peer connection
    pub ice_servers: Vec<String>,
    /// Peer to call as soon as it shows up in the user list
    pub call_on_join: Option<PeerId>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let signaling_url = env::var("BEACH_CALL_SIGNALING_URL")
            .unwrap_or_else(|_| DEFAULT_SIGNALING_URL.to_string());
        // Normalize localhost to IPv4 to avoid IPv6 (::1) preference on macOS
        let signaling_url = normalize_localhost(&signaling_url);

        let localhost_only = env::var("BEACH_CALL_LOCALHOST_ONLY")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let ice_servers = if localhost_only {
            Vec::new()
        } else {
            env::var("BEACH_CALL_ICE_SERVERS")
                .map(|value| parse_list(&value))
                .unwrap_or_else(|_| vec![DEFAULT_STUN_SERVER.to_string()])
        };
        let call_on_join = env::var("BEACH_CALL_PEER")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(|value| PeerId::new(value.trim()));

        Self {
            signaling_url,
            ice_servers,
            call_on_join,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            signaling_url: DEFAULT_SIGNALING_URL.to_string(),
            ice_servers: vec![DEFAULT_STUN_SERVER.to_string()],
            call_on_join: None,
        }
    }
}

/// Rewrites `localhost` to 127.0.0.1, with or without a scheme in front.
pub fn normalize_localhost(url: &str) -> String {
    if url.starts_with("localhost:") {
        url.replacen("localhost", "127.0.0.1", 1)
    } else {
        url.replacen("//localhost:", "//127.0.0.1:", 1)
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
