use crate::error::LinkError;

/// One payload received on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// A publish/subscribe session with one broker endpoint.
pub trait Channel: Send {
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), LinkError>;
    fn subscribe(&mut self, topic: &str) -> Result<(), LinkError>;
    /// Checks for one incoming message without blocking.
    fn poll(&mut self) -> Result<Option<Message>, LinkError>;
    fn disconnect(&mut self) -> Result<(), LinkError>;
}

/// The wireless link plus the services reachable over it.
pub trait Network: Send {
    /// Starts joining the access point. Completion is observed via `link_up`.
    fn join(&mut self, ssid: &str, password: &str) -> Result<(), LinkError>;
    /// Non-blocking link status poll.
    fn link_up(&mut self) -> bool;
    /// UTC seconds since the Unix epoch from a time service.
    fn sync_time(&mut self) -> Result<i64, LinkError>;
    fn open_channel(
        &mut self,
        client_id: &str,
        broker: &str,
        port: u16,
    ) -> Result<Box<dyn Channel>, LinkError>;
}
