use crate::client::{REMOTE_PORT, REQUEST_TOPIC, RESPONSE_TOPIC};
use crate::error::LinkError;
use crate::transport::{Channel, Message, Network};
use parking_lot::Mutex;
use pulse_lib::io::record::RemoteRequest;
use pulse_lib::metrics::hrv;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// How the in-process analysis broker answers `kubios-request` publications.
#[derive(Debug, Clone)]
pub enum Responder {
    /// Never answers.
    Silent,
    /// Computes a readiness-style analysis from the submitted intervals.
    Analysis,
    /// Replies with a fixed body; its `id` is replaced by the request's.
    Fixed(Value),
}

/// A payload some channel published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub port: u16,
    pub topic: String,
    pub payload: Vec<u8>,
}

#[derive(Debug)]
struct Subscriber {
    port: u16,
    topics: Vec<String>,
    inbox: VecDeque<Message>,
}

#[derive(Debug)]
struct Broker {
    joined: Option<String>,
    link_delay: u32,
    link_forced_down: bool,
    utc: Option<i64>,
    fail_open: bool,
    fail_publish: bool,
    fail_poll: bool,
    responder: Responder,
    published: Vec<Published>,
    channels: HashMap<u64, Subscriber>,
    next_id: u64,
}

impl Broker {
    fn deliver(&mut self, port: u16, topic: &str, payload: &[u8]) {
        for sub in self.channels.values_mut() {
            if sub.port == port && sub.topics.iter().any(|t| t == topic) {
                sub.inbox.push_back(Message {
                    topic: topic.to_string(),
                    payload: payload.to_vec(),
                });
            }
        }
    }

    fn respond(&mut self, request: &[u8]) {
        let reply = match &self.responder {
            Responder::Silent => return,
            Responder::Analysis => analysis_reply(request),
            Responder::Fixed(body) => {
                let mut body = body.clone();
                if let (Some(obj), Ok(req)) = (
                    body.as_object_mut(),
                    serde_json::from_slice::<RemoteRequest>(request),
                ) {
                    obj.insert("id".into(), json!(req.id));
                }
                body
            }
        };
        match serde_json::to_vec(&reply) {
            Ok(bytes) => self.deliver(REMOTE_PORT, RESPONSE_TOPIC, &bytes),
            Err(err) => log::error!("loopback responder could not encode reply: {}", err),
        }
    }
}

/// Rough stand-in for the vendor's readiness analysis. Index and age formulas
/// only need to be plausible, not clinically meaningful.
fn analysis_reply(request: &[u8]) -> Value {
    let request: RemoteRequest = match serde_json::from_slice(request) {
        Ok(req) => req,
        Err(err) => return json!({ "data": { "status": "error", "error": err.to_string() } }),
    };
    let summary = match hrv::summarize(&request.data) {
        Ok(summary) => summary,
        Err(err) => {
            return json!({ "id": request.id, "data": { "status": "error", "error": err.to_string() } })
        }
    };
    let pns = ((summary.mean_ppi - 926.0) / 90.0 + (summary.rmssd - 42.0) / 15.0) / 2.0;
    let sns = ((summary.mean_hr - 66.0) / 9.0 - (summary.sdnn - 50.0) / 20.0) / 2.0;
    let age = (60.0 - summary.rmssd / 2.0).clamp(18.0, 90.0).round() as i64;
    json!({
        "id": request.id,
        "type": request.analysis.kind,
        "data": {
            "status": "ok",
            "analysis": {
                "mean_hr_bpm": summary.mean_hr,
                "mean_rr_ms": summary.mean_ppi,
                "rmssd_ms": summary.rmssd,
                "sdnn_ms": summary.sdnn,
                "sns_index": sns,
                "pns_index": pns,
                "physiological_age": age,
            }
        }
    })
}

/// In-process link, time service and brokers. Clones share one broker, so a
/// test keeps a handle while the client owns another.
#[derive(Debug, Clone)]
pub struct LoopbackNetwork {
    inner: Arc<Mutex<Broker>>,
}

impl Default for LoopbackNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Broker {
                joined: None,
                link_delay: 0,
                link_forced_down: false,
                utc: None,
                fail_open: false,
                fail_publish: false,
                fail_poll: false,
                responder: Responder::Silent,
                published: Vec::new(),
                channels: HashMap::new(),
                next_id: 0,
            })),
        }
    }

    /// Number of `link_up` polls that report the link as down first.
    pub fn with_link_delay(self, polls: u32) -> Self {
        self.inner.lock().link_delay = polls;
        self
    }

    /// Enables the time service, answering with `utc` seconds.
    pub fn with_time(self, utc: i64) -> Self {
        self.inner.lock().utc = Some(utc);
        self
    }

    pub fn with_responder(self, responder: Responder) -> Self {
        self.inner.lock().responder = responder;
        self
    }

    pub fn set_responder(&self, responder: Responder) {
        self.inner.lock().responder = responder;
    }

    /// Holds the link down regardless of the remaining delay.
    pub fn set_link_down(&self, down: bool) {
        self.inner.lock().link_forced_down = down;
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.inner.lock().fail_open = fail;
    }

    pub fn set_fail_publish(&self, fail: bool) {
        self.inner.lock().fail_publish = fail;
    }

    pub fn set_fail_poll(&self, fail: bool) {
        self.inner.lock().fail_poll = fail;
    }

    /// SSID of the last join request.
    pub fn joined(&self) -> Option<String> {
        self.inner.lock().joined.clone()
    }

    pub fn published(&self) -> Vec<Published> {
        self.inner.lock().published.clone()
    }

    pub fn published_on(&self, topic: &str) -> Vec<Published> {
        self.inner
            .lock()
            .published
            .iter()
            .filter(|p| p.topic == topic)
            .cloned()
            .collect()
    }

    /// Channels currently open against any endpoint.
    pub fn open_channels(&self) -> usize {
        self.inner.lock().channels.len()
    }

    /// Delivers `payload` to subscribers of `topic` on `port` as if a remote
    /// peer had published it.
    pub fn inject(&self, port: u16, topic: &str, payload: &[u8]) {
        self.inner.lock().deliver(port, topic, payload);
    }
}

impl Network for LoopbackNetwork {
    fn join(&mut self, ssid: &str, _password: &str) -> Result<(), LinkError> {
        self.inner.lock().joined = Some(ssid.to_string());
        Ok(())
    }

    fn link_up(&mut self) -> bool {
        let mut broker = self.inner.lock();
        if broker.joined.is_none() || broker.link_forced_down {
            return false;
        }
        if broker.link_delay > 0 {
            broker.link_delay -= 1;
            return false;
        }
        true
    }

    fn sync_time(&mut self) -> Result<i64, LinkError> {
        self.inner
            .lock()
            .utc
            .ok_or_else(|| LinkError::transport("time service unreachable"))
    }

    fn open_channel(
        &mut self,
        client_id: &str,
        _broker: &str,
        port: u16,
    ) -> Result<Box<dyn Channel>, LinkError> {
        let mut broker = self.inner.lock();
        if broker.fail_open {
            return Err(LinkError::transport(format!(
                "broker on port {port} refused {client_id}"
            )));
        }
        let id = broker.next_id;
        broker.next_id += 1;
        broker.channels.insert(
            id,
            Subscriber {
                port,
                topics: Vec::new(),
                inbox: VecDeque::new(),
            },
        );
        Ok(Box::new(LoopbackChannel {
            id,
            port,
            broker: Arc::clone(&self.inner),
        }))
    }
}

struct LoopbackChannel {
    id: u64,
    port: u16,
    broker: Arc<Mutex<Broker>>,
}

impl LoopbackChannel {
    fn closed(&self) -> LinkError {
        LinkError::transport(format!("channel {} is closed", self.id))
    }
}

impl Channel for LoopbackChannel {
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), LinkError> {
        let mut broker = self.broker.lock();
        if !broker.channels.contains_key(&self.id) {
            return Err(self.closed());
        }
        if broker.fail_publish {
            return Err(LinkError::transport("publish rejected"));
        }
        broker.published.push(Published {
            port: self.port,
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
        broker.deliver(self.port, topic, payload);
        if self.port == REMOTE_PORT && topic == REQUEST_TOPIC {
            broker.respond(payload);
        }
        Ok(())
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), LinkError> {
        let mut broker = self.broker.lock();
        let sub = broker.channels.get_mut(&self.id).ok_or_else(|| self.closed())?;
        if !sub.topics.iter().any(|t| t == topic) {
            sub.topics.push(topic.to_string());
        }
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<Message>, LinkError> {
        let mut broker = self.broker.lock();
        if broker.fail_poll {
            return Err(LinkError::transport("connection reset"));
        }
        let sub = broker.channels.get_mut(&self.id).ok_or_else(|| self.closed())?;
        Ok(sub.inbox.pop_front())
    }

    fn disconnect(&mut self) -> Result<(), LinkError> {
        match self.broker.lock().channels.remove(&self.id) {
            Some(_) => Ok(()),
            None => Err(self.closed()),
        }
    }
}

impl Drop for LoopbackChannel {
    fn drop(&mut self) {
        self.broker.lock().channels.remove(&self.id);
    }
}
