//! Konfiguration für Calls und Relay
//!
//! Werte kommen aus Defaults oder Umgebungsvariablen:
//! - `SIGNALING_URL` - WebSocket-URL des Relays
//! - `ICE_SERVERS` - JSON im Format `{ "iceServers": [{ "urls": [...] }] }`
//! - `NEGOTIATION_TIMEOUT_SECS` - Timeout für asynchrone Schritte
//! - `RELAY_ADDR` - Bind-Adresse des Relay-Servers

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use url::Url;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Standard-Relay für lokale Entwicklung
pub const DEFAULT_SIGNALING_URL: &str = "ws://127.0.0.1:8787";

/// Standard Bind-Adresse des Relays
pub const DEFAULT_RELAY_ADDR: &str = "0.0.0.0:8787";

/// Obergrenze für Media-Zugriff, Join, Offer/Answer und Descriptions
pub const DEFAULT_NEGOTIATION_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid signaling URL '{url}': {reason}")]
    InvalidSignalingUrl { url: String, reason: String },

    #[error("Invalid ICE server configuration: {0}")]
    InvalidIceServers(#[from] serde_json::Error),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

// ============================================================================
// ICE SERVER CONFIGURATION
// ============================================================================

/// Ein STUN/TURN-Eintrag, wie ihn auch der Browser erwartet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServerConfig {
    pub fn stun(urls: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            urls: urls.into_iter().map(Into::into).collect(),
            username: None,
            credential: None,
        }
    }
}

/// Konfigurationsoberfläche `{ iceServers: [{ urls: [...] }] }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtcConfiguration {
    #[serde(rename = "iceServers")]
    pub ice_servers: Vec<IceServerConfig>,
}

impl RtcConfiguration {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Standard STUN Server (dieselben wie im Browser-Demo)
pub fn default_ice_servers() -> Vec<IceServerConfig> {
    vec![IceServerConfig::stun([
        "stun:stun.stunprotocol.org",
        "stun:stun.l.google.com:19302",
    ])]
}

// ============================================================================
// CALL CONFIG
// ============================================================================

/// Konfiguration einer Call-Session
#[derive(Debug, Clone)]
pub struct CallConfig {
    pub signaling_url: String,
    pub ice_servers: Vec<IceServerConfig>,
    pub negotiation_timeout: Duration,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            signaling_url: DEFAULT_SIGNALING_URL.to_string(),
            ice_servers: default_ice_servers(),
            negotiation_timeout: DEFAULT_NEGOTIATION_TIMEOUT,
        }
    }
}

impl CallConfig {
    /// Lädt die Konfiguration aus der Umgebung, fehlende Werte bleiben Default
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(url) = lookup("SIGNALING_URL") {
            config.signaling_url = url;
        }

        if let Some(json) = lookup("ICE_SERVERS") {
            config.ice_servers = RtcConfiguration::from_json(&json)?.ice_servers;
        }

        if let Some(value) = lookup("NEGOTIATION_TIMEOUT_SECS") {
            let secs: u64 = value
                .trim()
                .parse()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or(ConfigError::InvalidValue {
                    name: "NEGOTIATION_TIMEOUT_SECS",
                    value,
                })?;
            config.negotiation_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Setzt optionale TURN-Server Credentials
    pub fn with_turn_server(mut self, url: String, username: String, credential: String) -> Self {
        self.ice_servers.push(IceServerConfig {
            urls: vec![url],
            username: Some(username),
            credential: Some(credential),
        });
        self
    }

    pub fn with_negotiation_timeout(mut self, timeout: Duration) -> Self {
        self.negotiation_timeout = timeout;
        self
    }

    /// Prüft die Signaling-URL (nur ws:// und wss://)
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.signaling_url).map_err(|e| ConfigError::InvalidSignalingUrl {
            url: self.signaling_url.clone(),
            reason: e.to_string(),
        })?;

        match url.scheme() {
            "ws" | "wss" => Ok(()),
            other => Err(ConfigError::InvalidSignalingUrl {
                url: self.signaling_url.clone(),
                reason: format!("unsupported scheme '{}'", other),
            }),
        }
    }

    pub fn rtc_configuration(&self) -> RtcConfiguration {
        RtcConfiguration {
            ice_servers: self.ice_servers.clone(),
        }
    }
}

// ============================================================================
// RELAY CONFIG
// ============================================================================

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub bind_addr: SocketAddr,
}

impl RelayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let value = std::env::var("RELAY_ADDR").unwrap_or_else(|_| DEFAULT_RELAY_ADDR.to_string());
        let bind_addr = value
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                name: "RELAY_ADDR",
                value,
            })?;
        Ok(Self { bind_addr })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_match_demo_stun_servers() {
        let config = CallConfig::default();
        assert_eq!(config.ice_servers.len(), 1);
        assert_eq!(
            config.ice_servers[0].urls,
            vec!["stun:stun.stunprotocol.org", "stun:stun.l.google.com:19302"]
        );
        assert_eq!(config.negotiation_timeout, Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rtc_configuration_json_shape() {
        let json = r#"{"iceServers":[{"urls":["stun:a.example:3478"]},{"urls":["turn:b.example"],"username":"u","credential":"p"}]}"#;
        let rtc = RtcConfiguration::from_json(json).unwrap();
        assert_eq!(rtc.ice_servers.len(), 2);
        assert_eq!(rtc.ice_servers[1].username.as_deref(), Some("u"));

        // Optionale Felder werden nicht serialisiert
        let out = serde_json::to_value(RtcConfiguration {
            ice_servers: vec![IceServerConfig::stun(["stun:x"])],
        })
        .unwrap();
        assert_eq!(out, serde_json::json!({"iceServers": [{"urls": ["stun:x"]}]}));
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = CallConfig::from_lookup(lookup(&[
            ("SIGNALING_URL", "wss://relay.example/ws"),
            ("ICE_SERVERS", r#"{"iceServers":[{"urls":["stun:only"]}]}"#),
            ("NEGOTIATION_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();

        assert_eq!(config.signaling_url, "wss://relay.example/ws");
        assert_eq!(config.ice_servers, vec![IceServerConfig::stun(["stun:only"])]);
        assert_eq!(config.negotiation_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            CallConfig::from_lookup(lookup(&[("SIGNALING_URL", "https://relay.example")])),
            Err(ConfigError::InvalidSignalingUrl { .. })
        ));
        assert!(matches!(
            CallConfig::from_lookup(lookup(&[("NEGOTIATION_TIMEOUT_SECS", "0")])),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            CallConfig::from_lookup(lookup(&[("ICE_SERVERS", "[not json")])),
            Err(ConfigError::InvalidIceServers(_))
        ));
    }

    #[test]
    fn test_with_turn_server() {
        let config = CallConfig::default().with_turn_server(
            "turn:turn.example:3478".to_string(),
            "user".to_string(),
            "secret".to_string(),
        );
        assert_eq!(config.ice_servers.len(), 2);
        assert_eq!(config.ice_servers[1].credential.as_deref(), Some("secret"));
    }
}
