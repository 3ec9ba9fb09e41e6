//! Runtime configuration loaded from the environment

use std::net::SocketAddr;

use crate::types::Protocol;

const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 8000);
const DEFAULT_HISTORY_PAGE_SIZE: usize = 50;

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address the HTTP/WebSocket server listens on
    pub bind_addr: SocketAddr,
    /// Envelope shape spoken on every connection
    pub protocol: Protocol,
    /// Maximum messages returned by one `fetch_messages`
    pub history_page_size: usize,
    /// Users created at start-up so `new_message` has authors to resolve
    pub seed_users: Vec<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(DEFAULT_BIND_ADDR),
            protocol: Protocol::Command,
            history_page_size: DEFAULT_HISTORY_PAGE_SIZE,
            seed_users: Vec::new(),
        }
    }
}

impl RelayConfig {
    /// Load config from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let bind_addr = match non_empty_var("RELAY_BIND_ADDR") {
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                tracing::warn!("Invalid RELAY_BIND_ADDR {:?}: {}", raw, e);
                defaults.bind_addr
            }),
            None => defaults.bind_addr,
        };

        let protocol = match non_empty_var("RELAY_PROTOCOL").map(|v| v.to_lowercase()) {
            Some(v) if v == "simple" => Protocol::Simple,
            Some(v) if v == "command" => Protocol::Command,
            Some(v) => {
                tracing::warn!("Unknown RELAY_PROTOCOL {:?}, using command", v);
                defaults.protocol
            }
            None => defaults.protocol,
        };

        let history_page_size = non_empty_var("RELAY_HISTORY_PAGE_SIZE")
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|size| *size > 0)
            .unwrap_or(defaults.history_page_size);

        let seed_users = non_empty_var("RELAY_SEED_USERS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        tracing::info!(
            %bind_addr,
            ?protocol,
            history_page_size,
            "Relay config loaded"
        );

        Self {
            bind_addr,
            protocol,
            history_page_size,
            seed_users,
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}
