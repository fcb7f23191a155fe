//! Redis connection settings

use serde::{Deserialize, Serialize};

/// Default Redis port
pub const DEFAULT_PORT: u16 = 6379;

/// Connection settings for a Redis server
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    /// Database index (0-15 on a default server)
    pub database: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Connect over TLS
    pub tls: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            database: 0,
            username: None,
            password: None,
            tls: false,
        }
    }
}

impl RedisConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_database(mut self, database: u16) -> Self {
        self.database = database;
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    /// Connection parameters for the redis client
    ///
    /// Built field by field rather than as a URL, so credentials are passed
    /// through verbatim. An empty host or a zero port falls back to the
    /// defaults; empty credentials are treated as absent.
    pub fn connection_info(&self) -> redis::ConnectionInfo {
        let host = if self.host.is_empty() {
            "127.0.0.1".to_string()
        } else {
            self.host.clone()
        };
        let port = if self.port == 0 { DEFAULT_PORT } else { self.port };
        let username = self.username.clone().filter(|s| !s.is_empty());
        let password = self.password.clone().filter(|s| !s.is_empty());

        tracing::debug!(
            host = %host,
            port = port,
            database = self.database,
            has_username = username.is_some(),
            has_password = password.is_some(),
            use_tls = self.tls,
            "building Redis connection info"
        );

        let addr = if self.tls {
            redis::ConnectionAddr::TcpTls {
                host,
                port,
                insecure: false,
                tls_params: None,
            }
        } else {
            redis::ConnectionAddr::Tcp(host, port)
        };

        redis::ConnectionInfo {
            addr,
            redis: redis::RedisConnectionInfo {
                db: i64::from(self.database),
                username,
                password,
                ..Default::default()
            },
        }
    }
}

impl std::fmt::Debug for RedisConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("tls", &self.tls)
            .finish()
    }
}
