use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration settings for the application.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub realtime: RealtimeSettings,
    pub storage: StorageSettings,
    pub log: LogSettings,
}

/// Where the server listens and which request path is upgraded to a WebSocket.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub websocket_path: String,
}

/// Tuning for the realtime hub and the per-connection pumps.
///
/// `ping_period_ms` must stay below `pong_wait_ms`, otherwise an idle but
/// healthy peer would trip the read deadline between two pings.
#[derive(Debug, Deserialize, Clone)]
pub struct RealtimeSettings {
    pub queue_capacity: usize,
    pub write_wait_ms: u64,
    pub pong_wait_ms: u64,
    pub ping_period_ms: u64,
    pub max_message_size: Option<usize>,
}

impl RealtimeSettings {
    pub fn write_wait(&self) -> Duration {
        Duration::from_millis(self.write_wait_ms)
    }

    pub fn pong_wait(&self) -> Duration {
        Duration::from_millis(self.pong_wait_ms)
    }

    pub fn ping_period(&self) -> Duration {
        Duration::from_millis(self.ping_period_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageSettings {
    pub data_dir: PathBuf,
    pub media_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Missing values are filled from `Settings::default()`.
#[derive(Debug, Default, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub realtime: Option<PartialRealtimeSettings>,
    pub storage: Option<PartialStorageSettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub websocket_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialRealtimeSettings {
    pub queue_capacity: Option<usize>,
    pub write_wait_ms: Option<u64>,
    pub pong_wait_ms: Option<u64>,
    pub ping_period_ms: Option<u64>,
    pub max_message_size: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialStorageSettings {
    pub data_dir: Option<PathBuf>,
    pub media_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

/// Default pong window, matching what browser clients of the legacy protocol expect.
pub const DEFAULT_PONG_WAIT_MS: u64 = 60_000;

/// Ping period derived from a pong window: nine tenths of it.
pub fn ping_period_for(pong_wait_ms: u64) -> u64 {
    pong_wait_ms * 9 / 10
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "0.0.0.0".to_string(),
                port: 8000,
                websocket_path: "/realtime/v1/websocket".to_string(),
            },
            realtime: RealtimeSettings {
                queue_capacity: 256,
                write_wait_ms: 10_000,
                pong_wait_ms: DEFAULT_PONG_WAIT_MS,
                ping_period_ms: ping_period_for(DEFAULT_PONG_WAIT_MS),
                max_message_size: None,
            },
            storage: StorageSettings {
                data_dir: PathBuf::from("data"),
                media_dir: PathBuf::from("storage/chat-media"),
            },
            log: LogSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl PartialSettings {
    /// Merge with defaults. An unset ping period follows the (possibly
    /// overridden) pong window rather than the default one.
    pub fn merge(self, default: Settings) -> Settings {
        let server = self.server.unwrap_or_default();
        let realtime = self.realtime.unwrap_or_default();
        let storage = self.storage.unwrap_or_default();
        let log = self.log.unwrap_or_default();

        let pong_wait_ms = realtime
            .pong_wait_ms
            .unwrap_or(default.realtime.pong_wait_ms);

        Settings {
            server: ServerSettings {
                host: server.host.unwrap_or(default.server.host),
                port: server.port.unwrap_or(default.server.port),
                websocket_path: server
                    .websocket_path
                    .unwrap_or(default.server.websocket_path),
            },
            realtime: RealtimeSettings {
                queue_capacity: realtime
                    .queue_capacity
                    .unwrap_or(default.realtime.queue_capacity),
                write_wait_ms: realtime
                    .write_wait_ms
                    .unwrap_or(default.realtime.write_wait_ms),
                pong_wait_ms,
                ping_period_ms: realtime
                    .ping_period_ms
                    .unwrap_or_else(|| ping_period_for(pong_wait_ms)),
                max_message_size: realtime
                    .max_message_size
                    .or(default.realtime.max_message_size),
            },
            storage: StorageSettings {
                data_dir: storage.data_dir.unwrap_or(default.storage.data_dir),
                media_dir: storage.media_dir.unwrap_or(default.storage.media_dir),
            },
            log: LogSettings {
                level: log.level.unwrap_or(default.log.level),
            },
        }
    }
}
