use crate::config::LinkSettings;
use crate::error::LinkError;
use crate::transport::{Channel, Network};
use pulse_lib::io::record::RemoteRequest;
use pulse_lib::time::Clock;
use serde::Serialize;
use serde_json::Value;

/// Fixed broker port of the remote analysis service.
pub const REMOTE_PORT: u16 = 21883;
pub const REQUEST_TOPIC: &str = "kubios-request";
pub const RESPONSE_TOPIC: &str = "kubios-response";
/// Telemetry mirror topic on the remote analysis broker.
pub const MIRROR_TOPIC: &str = "hr-data";

const LOCAL_CLIENT_ID: &str = "local";
const REMOTE_CLIENT_ID: &str = "kubios";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy)]
enum Endpoint {
    Local,
    Remote,
}

impl Endpoint {
    fn name(self) -> &'static str {
        match self {
            Endpoint::Local => "local",
            Endpoint::Remote => "remote analysis",
        }
    }
}

/// Dual-channel broker session with single-slot response correlation.
///
/// Every call returns immediately; `connect` is polled until it reports
/// success. The connected flag is the last known state only, nothing pings
/// the brokers.
pub struct MessagingClient {
    settings: LinkSettings,
    network: Box<dyn Network>,
    local: Option<Box<dyn Channel>>,
    remote: Option<Box<dyn Channel>>,
    state: SessionState,
    response: Option<Value>,
    outstanding: Option<i64>,
}

impl MessagingClient {
    /// Starts joining the configured access point.
    pub fn new(settings: LinkSettings, mut network: Box<dyn Network>) -> Self {
        if let Err(err) = network.join(&settings.ssid, &settings.password) {
            log::warn!("could not start joining {}: {}", settings.ssid, err);
        }
        Self {
            settings,
            network,
            local: None,
            remote: None,
            state: SessionState::Disconnected,
            response: None,
            outstanding: None,
        }
    }

    pub fn settings(&self) -> &LinkSettings {
        &self.settings
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    /// Id of the request whose response is still awaited.
    pub fn outstanding_request(&self) -> Option<i64> {
        self.outstanding
    }

    /// One non-blocking connection attempt. Safe to call again after a
    /// partial failure.
    pub fn connect(&mut self, clock: &dyn Clock) -> bool {
        if !self.network.link_up() {
            self.state = SessionState::Connecting;
            return false;
        }
        match self.network.sync_time() {
            Ok(utc) => {
                let local = utc + i64::from(self.settings.timezone_hours) * 3600;
                clock.set_epoch(local);
                log::info!("wall clock synchronized to {}", local);
            }
            Err(err) => log::warn!("time service not reached, clock not in sync: {}", err),
        }
        self.drop_channels();
        match self.open_channels() {
            Ok(()) => {
                self.state = SessionState::Connected;
                log::info!(
                    "connected to {} (local port {}, remote port {})",
                    self.settings.broker,
                    self.settings.port,
                    REMOTE_PORT
                );
                true
            }
            Err(err) => {
                log::warn!("broker connection failed: {}", err);
                self.state = SessionState::Connecting;
                false
            }
        }
    }

    fn open_channels(&mut self) -> Result<(), LinkError> {
        let broker = self.settings.broker.clone();
        self.local = Some(
            self.network
                .open_channel(LOCAL_CLIENT_ID, &broker, self.settings.port)?,
        );
        let mut remote = self
            .network
            .open_channel(REMOTE_CLIENT_ID, &broker, REMOTE_PORT)?;
        remote.subscribe(RESPONSE_TOPIC)?;
        self.remote = Some(remote);
        Ok(())
    }

    fn drop_channels(&mut self) {
        for (mut channel, endpoint) in [
            (self.local.take(), Endpoint::Local),
            (self.remote.take(), Endpoint::Remote),
        ] {
            if let Some(channel) = channel.as_mut() {
                if let Err(err) = channel.disconnect() {
                    log::debug!("{} channel already disconnected: {}", endpoint.name(), err);
                }
            }
        }
    }

    /// Closes both channels and marks the session disconnected.
    pub fn disconnect(&mut self) {
        self.drop_channels();
        self.state = SessionState::Disconnected;
        self.outstanding = None;
        self.response = None;
    }

    /// Publishes `record` on the local telemetry topic and mirrors it to the
    /// remote broker.
    pub fn send_local<T: Serialize>(&mut self, record: &T) -> Result<(), LinkError> {
        let payload = serde_json::to_vec(record)?;
        let topic = self.settings.topic.clone();
        self.publish(Endpoint::Local, &topic, &payload)?;
        self.publish(Endpoint::Remote, MIRROR_TOPIC, &payload)
    }

    /// Submits an analysis request. Any earlier unread response is dropped.
    pub fn send_remote_request(&mut self, request: &RemoteRequest) -> Result<(), LinkError> {
        let payload = serde_json::to_vec(request)?;
        self.response = None;
        self.publish(Endpoint::Remote, REQUEST_TOPIC, &payload)?;
        self.outstanding = Some(request.id);
        log::debug!("analysis request {} sent ({} intervals)", request.id, request.data.len());
        Ok(())
    }

    fn publish(&mut self, endpoint: Endpoint, topic: &str, payload: &[u8]) -> Result<(), LinkError> {
        let slot = match endpoint {
            Endpoint::Local => &mut self.local,
            Endpoint::Remote => &mut self.remote,
        };
        let channel = slot
            .as_mut()
            .ok_or(LinkError::NotConnected(endpoint.name()))?;
        if let Err(err) = channel.publish(topic, payload) {
            log::error!("publish to {} on {} channel failed: {}", topic, endpoint.name(), err);
            self.state = SessionState::Disconnected;
            return Err(err);
        }
        Ok(())
    }

    /// Drives the remote channel once and returns the response to the
    /// outstanding request if one arrived.
    pub fn poll_remote_response(&mut self) -> Option<Value> {
        let Some(channel) = self.remote.as_mut() else {
            self.state = SessionState::Disconnected;
            return None;
        };
        match channel.poll() {
            Ok(Some(message)) if message.topic == RESPONSE_TOPIC => {
                self.response = match serde_json::from_slice(&message.payload) {
                    Ok(value) => Some(value),
                    Err(err) => {
                        log::warn!("undecodable analysis response: {}", err);
                        None
                    }
                };
            }
            Ok(Some(message)) => log::debug!("ignoring message on {}", message.topic),
            Ok(None) => {}
            Err(err) => {
                log::warn!("remote channel poll failed: {}", err);
                self.state = SessionState::Disconnected;
                return None;
            }
        }

        let response = self.response.take()?;
        let id = response.get("id").and_then(Value::as_i64);
        match (self.outstanding, id) {
            (Some(want), Some(got)) if want != got => {
                log::debug!("discarding response {} while awaiting {}", got, want);
                None
            }
            _ => {
                self.outstanding = None;
                Some(response)
            }
        }
    }
}

impl Drop for MessagingClient {
    fn drop(&mut self) {
        self.drop_channels();
    }
}
