use serde::Deserialize;

/// Top-level configuration settings for the application.
///
/// Includes settings for the HTTP server, the broadcaster, the demo account
/// ledger and logging.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub broker: BrokerSettings,
    pub accounts: AccountSettings,
    pub log: LogSettings,
}

/// Configuration settings for the server.
///
/// Defines the address the server binds to and the origin allowed by CORS.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub allowed_origin: String,
}

/// Configuration settings for the broker.
///
/// Controls per-subscriber queue size, the write deadline of the drain loop,
/// the publish rate limit and whether empty topics are pruned.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct BrokerSettings {
    /// Messages that can be queued for a subscriber before it is kicked.
    pub subscriber_buffer: usize,
    pub write_timeout_ms: u64,
    /// One publish token is released per interval. `0` disables the limiter.
    pub publish_interval_ms: u64,
    pub publish_burst: u32,
    pub prune_empty_topics: bool,
}

/// Configuration for the in-memory account ledger.
#[derive(Debug, Deserialize, Clone)]
pub struct AccountSettings {
    /// Account served by `/balance`, `/deposit/{deposit}` and `/ws`.
    pub default_account: String,
    pub initial_balance: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub broker: Option<PartialBrokerSettings>,
    pub accounts: Option<PartialAccountSettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub allowed_origin: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PartialBrokerSettings {
    pub subscriber_buffer: Option<usize>,
    pub write_timeout_ms: Option<u64>,
    pub publish_interval_ms: Option<u64>,
    pub publish_burst: Option<u32>,
    pub prune_empty_topics: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct PartialAccountSettings {
    pub default_account: Option<String>,
    pub initial_balance: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            allowed_origin: "http://localhost:3000".to_string(),
        }
    }
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            subscriber_buffer: 16,
            write_timeout_ms: 5000,
            publish_interval_ms: 100,
            publish_burst: 8,
            prune_empty_topics: true,
        }
    }
}

impl Default for AccountSettings {
    fn default() -> Self {
        Self {
            default_account: "42".to_string(),
            initial_balance: 42,
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Provides default values for `Settings`.
///
/// Ensures the application has sensible defaults if no configuration is provided.
impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            broker: BrokerSettings::default(),
            accounts: AccountSettings::default(),
            log: LogSettings::default(),
        }
    }
}

impl PartialSettings {
    /// Fills every missing value from `default`.
    pub fn merge(self, default: Settings) -> Settings {
        let server = self.server;
        let broker = self.broker;
        let accounts = self.accounts;
        let log = self.log;

        Settings {
            server: ServerSettings {
                host: server
                    .as_ref()
                    .and_then(|s| s.host.clone())
                    .unwrap_or(default.server.host),
                port: server
                    .as_ref()
                    .and_then(|s| s.port)
                    .unwrap_or(default.server.port),
                allowed_origin: server
                    .as_ref()
                    .and_then(|s| s.allowed_origin.clone())
                    .unwrap_or(default.server.allowed_origin),
            },
            broker: BrokerSettings {
                subscriber_buffer: broker
                    .as_ref()
                    .and_then(|b| b.subscriber_buffer)
                    .unwrap_or(default.broker.subscriber_buffer),
                write_timeout_ms: broker
                    .as_ref()
                    .and_then(|b| b.write_timeout_ms)
                    .unwrap_or(default.broker.write_timeout_ms),
                publish_interval_ms: broker
                    .as_ref()
                    .and_then(|b| b.publish_interval_ms)
                    .unwrap_or(default.broker.publish_interval_ms),
                publish_burst: broker
                    .as_ref()
                    .and_then(|b| b.publish_burst)
                    .unwrap_or(default.broker.publish_burst),
                prune_empty_topics: broker
                    .as_ref()
                    .and_then(|b| b.prune_empty_topics)
                    .unwrap_or(default.broker.prune_empty_topics),
            },
            accounts: AccountSettings {
                default_account: accounts
                    .as_ref()
                    .and_then(|a| a.default_account.clone())
                    .unwrap_or(default.accounts.default_account),
                initial_balance: accounts
                    .as_ref()
                    .and_then(|a| a.initial_balance)
                    .unwrap_or(default.accounts.initial_balance),
            },
            log: LogSettings {
                level: log
                    .and_then(|l| l.level)
                    .unwrap_or(default.log.level),
            },
        }
    }
}
