//! Hub configuration.

use std::time::Duration;

use thiserror::Error;

/// Domain event kinds the broadcaster subscribes to by default
pub const DEFAULT_EVENT_TYPES: &[&str] = &[
    "message.sent",
    "message.created",
    "message.updated",
    "message.deleted",
    "chat.created",
    "chat.updated",
    "chat.deleted",
    "chat.member_added",
    "chat.member_removed",
    "task.created",
    "task.updated",
    "task.status_changed",
    "task.assigned",
    "notification.created",
];

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("pong_wait ({pong_wait:?}) must be longer than ping_interval ({ping_interval:?})")]
    PongWaitTooShort {
        ping_interval: Duration,
        pong_wait: Duration,
    },
}

/// Options recognized by the hub, its connections and the broadcaster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    /// WebSocket read buffer size in bytes
    pub read_buffer_size: usize,
    /// WebSocket write buffer size in bytes
    pub write_buffer_size: usize,
    /// Interval between liveness pings
    pub ping_interval: Duration,
    /// How long a peer may stay silent before the read deadline fires
    pub pong_wait: Duration,
    /// Deadline for every single transport write
    pub write_wait: Duration,
    /// Largest inbound message accepted, in bytes
    pub max_message_size: usize,
    /// Per-connection outbound queue capacity, in frames
    pub send_buffer: usize,
    /// Capacity of the hub's broadcast command channel, in frames
    pub broadcast_buffer: usize,
    /// Domain event kinds the broadcaster subscribes to
    pub event_types: Vec<String>,
    /// Upper bound on draining pending commands during shutdown
    pub shutdown_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: 1024,
            write_buffer_size: 1024,
            ping_interval: Duration::from_secs(30),
            pong_wait: Duration::from_secs(60),
            write_wait: Duration::from_secs(10),
            max_message_size: 64 * 1024,
            send_buffer: 256,
            broadcast_buffer: 256,
            event_types: DEFAULT_EVENT_TYPES.iter().map(|s| s.to_string()).collect(),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl HubConfig {
    /// Check the configuration for values the hub cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sizes = [
            ("read_buffer_size", self.read_buffer_size),
            ("write_buffer_size", self.write_buffer_size),
            ("max_message_size", self.max_message_size),
            ("send_buffer", self.send_buffer),
            ("broadcast_buffer", self.broadcast_buffer),
        ];
        if let Some((name, _)) = sizes.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Zero(name));
        }

        let durations = [
            ("ping_interval", self.ping_interval),
            ("pong_wait", self.pong_wait),
            ("write_wait", self.write_wait),
            ("shutdown_timeout", self.shutdown_timeout),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, value)| value.is_zero()) {
            return Err(ConfigError::Zero(name));
        }

        if self.pong_wait <= self.ping_interval {
            return Err(ConfigError::PongWaitTooShort {
                ping_interval: self.ping_interval,
                pong_wait: self.pong_wait,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        // テスト項目: デフォルト値が仕様どおりである
        // given (前提条件):

        // when (操作):
        let config = HubConfig::default();

        // then (期待する結果):
        assert_eq!(config.read_buffer_size, 1024);
        assert_eq!(config.write_buffer_size, 1024);
        assert_eq!(config.ping_interval, Duration::from_secs(30));
        assert_eq!(config.pong_wait, Duration::from_secs(60));
        assert_eq!(config.write_wait, Duration::from_secs(10));
        assert_eq!(config.max_message_size, 65536);
        assert_eq!(config.send_buffer, 256);
        assert_eq!(config.broadcast_buffer, 256);
        assert_eq!(config.event_types.len(), DEFAULT_EVENT_TYPES.len());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_buffer() {
        // テスト項目: バッファサイズ 0 は拒否される
        // given (前提条件):
        let config = HubConfig {
            send_buffer: 0,
            ..HubConfig::default()
        };

        // when (操作):
        let result = config.validate();

        // then (期待する結果):
        assert_eq!(result, Err(ConfigError::Zero("send_buffer")));
    }

    #[test]
    fn test_validate_rejects_pong_wait_not_longer_than_ping_interval() {
        // テスト項目: pong_wait が ping_interval 以下の場合は拒否される
        // given (前提条件):
        let config = HubConfig {
            ping_interval: Duration::from_secs(30),
            pong_wait: Duration::from_secs(30),
            ..HubConfig::default()
        };

        // when (操作):
        let result = config.validate();

        // then (期待する結果):
        assert!(matches!(result, Err(ConfigError::PongWaitTooShort { .. })));
    }

    #[test]
    fn test_validate_rejects_zero_duration() {
        // テスト項目: 0 の時間設定は拒否される
        // given (前提条件):
        let config = HubConfig {
            write_wait: Duration::ZERO,
            ..HubConfig::default()
        };

        // when (操作):
        let result = config.validate();

        // then (期待する結果):
        assert_eq!(result, Err(ConfigError::Zero("write_wait")));
    }
}
