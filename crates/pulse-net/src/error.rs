use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("{0} channel is not connected")]
    NotConnected(&'static str),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("payload codec error")]
    Decode(#[from] serde_json::Error),
}

impl LinkError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }
}
