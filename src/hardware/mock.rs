//! Simulated ICE Bloc
//!
//! A loopback TCP peer that speaks the envelope protocol, for tests and the
//! `--simulate` CLI flag. Uses async-safe operations only (`tokio::time::sleep`,
//! never `std::thread::sleep`).
//!
//! - Default behaviour: `ping` inverts the case of `text_in`, every other
//!   request gets `<op>_reply` with `status:[0]` under the request's id.
//! - [`SimulatedIceBloc::with_responder`] plugs in custom behaviour, including
//!   scripted silence, delays, raw bytes and dropped connections.
//! - [`SimulatedIceBloc::push`] injects unsolicited frames (TeraScan telemetry,
//!   final reports) into every open connection.
//!
//! # Example
//!
//! ```
//! # tokio_test::block_on(async {
//! use msquared_daq::hardware::mock::SimulatedIceBloc;
//! use msquared_daq::{CallOptions, Module, Solstis};
//!
//! let sim = SimulatedIceBloc::start().await?;
//! let solstis = Solstis::connect("127.0.0.1", sim.port(), CallOptions::default()).await?;
//! assert_eq!(solstis.ping("Hello World").await?, "hELLO wORLD");
//! # Ok::<(), msquared_daq::IceBlocError>(())
//! # }).unwrap();
//! ```

use crate::error::{IceBlocError, Result};
use crate::protocol::codec::{self, Envelope, Parameters, MAX_FRAME_BYTES};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What the simulated module does with one request.
#[derive(Debug, Clone)]
pub enum Response {
    /// Answer `<op>_reply` with this parameter bag under the request's id.
    Reply(Parameters),
    /// Send this exact envelope (wrong ids, wrong ops, final reports...).
    Envelope(Envelope),
    /// Write these bytes verbatim.
    Raw(Vec<u8>),
    /// Several responses back to back, each in its own write.
    Sequence(Vec<Response>),
    /// Wait, then respond.
    Delayed(Duration, Box<Response>),
    /// Never answer.
    Silence,
    /// Drop the connection.
    Disconnect,
}

impl Response {
    /// `<op>_reply` with a bag built from a JSON object literal.
    pub fn json(value: Value) -> Self {
        match value {
            Value::Object(map) => Response::Reply(map),
            _ => Response::Reply(Parameters::new()),
        }
    }

    /// `<op>_reply` with `status:[code]`.
    pub fn status(code: i64) -> Self {
        Response::json(json!({ "status": [code] }))
    }
}

/// Request handler.
pub type Responder = Arc<dyn Fn(&Envelope) -> Response + Send + Sync>;

/// The default responder.
pub fn default_response(request: &Envelope) -> Response {
    match request.op.as_str() {
        "ping" => {
            let text = request
                .parameters
                .as_ref()
                .and_then(|p| p.get("text_in"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            Response::json(json!({ "text_out": invert_case(text) }))
        }
        "start_link" => Response::json(json!({ "status": "ok", "ip_address": "127.0.0.1" })),
        _ => Response::status(0),
    }
}

/// Swap upper and lower case, the way the modules answer `ping`.
pub fn invert_case(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_uppercase() {
                c.to_lowercase().collect::<String>()
            } else {
                c.to_uppercase().collect::<String>()
            }
        })
        .collect()
}

/// Reply envelope answering `request`.
pub fn reply_to(request: &Envelope, parameters: Parameters) -> Envelope {
    Envelope {
        transmission_id: request.transmission_id.clone(),
        op: format!("{}_reply", request.op),
        parameters: Some(parameters),
    }
}

/// Loopback ICE Bloc peer.
pub struct SimulatedIceBloc {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<Envelope>>>,
    pushes: broadcast::Sender<Vec<u8>>,
    accept: JoinHandle<()>,
}

impl SimulatedIceBloc {
    /// Start with the default responder on an ephemeral port.
    pub async fn start() -> Result<Self> {
        Self::with_responder(default_response).await
    }

    /// Start with a custom responder on an ephemeral port.
    pub async fn with_responder<F>(responder: F) -> Result<Self>
    where
        F: Fn(&Envelope) -> Response + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| IceBlocError::io("127.0.0.1:0", "simulator bind failed", e))?;
        let addr = listener
            .local_addr()
            .map_err(|e| IceBlocError::io("127.0.0.1:0", "simulator address unavailable", e))?;
        let requests = Arc::new(Mutex::new(Vec::new()));
        let (pushes, _) = broadcast::channel(64);
        let responder: Responder = Arc::new(responder);

        let accept = tokio::spawn(accept_loop(
            listener,
            responder,
            Arc::clone(&requests),
            pushes.clone(),
        ));
        info!(%addr, "Simulated ICE Bloc listening");

        Ok(Self {
            addr,
            requests,
            pushes,
            accept,
        })
    }

    /// Listening address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Listening port.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<Envelope> {
        self.requests.lock().clone()
    }

    /// Send an unsolicited envelope to every open connection.
    ///
    /// Returns how many connections it was queued for.
    pub fn push(&self, envelope: &Envelope) -> Result<usize> {
        self.push_raw(codec::encode(envelope)?)
    }

    /// Send raw bytes to every open connection.
    pub fn push_raw(&self, bytes: Vec<u8>) -> Result<usize> {
        // no receiver only means no client is connected yet
        Ok(self.pushes.send(bytes).unwrap_or(0))
    }
}

impl Drop for SimulatedIceBloc {
    fn drop(&mut self) {
        self.accept.abort();
    }
}

async fn accept_loop(
    listener: TcpListener,
    responder: Responder,
    requests: Arc<Mutex<Vec<Envelope>>>,
    pushes: broadcast::Sender<Vec<u8>>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!(%peer, "Simulator accepted client");
                tokio::spawn(serve(
                    stream,
                    Arc::clone(&responder),
                    Arc::clone(&requests),
                    pushes.subscribe(),
                ));
            }
            Err(e) => {
                warn!(error = %e, "Simulator accept failed");
                return;
            }
        }
    }
}

async fn serve(
    mut stream: TcpStream,
    responder: Responder,
    requests: Arc<Mutex<Vec<Envelope>>>,
    mut pushes: broadcast::Receiver<Vec<u8>>,
) {
    let mut buf = vec![0_u8; MAX_FRAME_BYTES];
    loop {
        tokio::select! {
            read = stream.read(&mut buf) => {
                let n = match read {
                    Ok(0) | Err(_) => return,
                    Ok(n) => n,
                };
                let frames = match codec::split_frames(&buf[..n]) {
                    Ok(frames) => frames,
                    Err(e) => {
                        warn!(error = %e, "Simulator received undecodable request");
                        continue;
                    }
                };
                for request in frames {
                    requests.lock().push(request.clone());
                    let response = responder(&request);
                    if !respond(&mut stream, &request, response).await {
                        return;
                    }
                }
            }
            pushed = pushes.recv() => match pushed {
                Ok(bytes) => {
                    if stream.write_all(&bytes).await.is_err() {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return,
            },
        }
    }
}

/// Carry out `response`. Returns false once the connection should end.
async fn respond(stream: &mut TcpStream, request: &Envelope, response: Response) -> bool {
    let mut queue = vec![response];
    while let Some(next) = queue.pop() {
        match next {
            Response::Reply(parameters) => {
                if !write_envelope(stream, &reply_to(request, parameters)).await {
                    return false;
                }
            }
            Response::Envelope(envelope) => {
                if !write_envelope(stream, &envelope).await {
                    return false;
                }
            }
            Response::Raw(bytes) => {
                if stream.write_all(&bytes).await.is_err() {
                    return false;
                }
            }
            Response::Sequence(items) => queue.extend(items.into_iter().rev()),
            Response::Delayed(wait, inner) => {
                tokio::time::sleep(wait).await;
                queue.push(*inner);
            }
            Response::Silence => {}
            Response::Disconnect => return false,
        }
    }
    true
}

async fn write_envelope(stream: &mut TcpStream, envelope: &Envelope) -> bool {
    let Ok(bytes) = codec::encode(envelope) else {
        return false;
    };
    stream.write_all(&bytes).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invert_case_swaps_letters_only() {
        assert_eq!(invert_case("Hello World 42"), "hELLO wORLD 42");
    }

    #[test]
    fn default_ping_response() {
        let mut params = Parameters::new();
        params.insert("text_in".into(), json!("AbC"));
        let request = Envelope::new(901, "ping", Some(params));
        match default_response(&request) {
            Response::Reply(bag) => assert_eq!(bag["text_out"], json!("aBc")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn reply_keeps_request_id() {
        let request = Envelope::new(22, "get_status", None);
        let reply = reply_to(&request, Parameters::new());
        assert_eq!(reply.id(), Some(22));
        assert_eq!(reply.op, "get_status_reply");
    }

    #[tokio::test]
    async fn serves_default_replies() {
        let sim = SimulatedIceBloc::start().await.unwrap();
        let mut client = TcpStream::connect(sim.addr()).await.unwrap();
        let request = codec::encode(&Envelope::new(2, "poll_wave_m", None)).unwrap();
        client.write_all(&request).await.unwrap();

        let mut buf = vec![0_u8; MAX_FRAME_BYTES];
        let n = client.read(&mut buf).await.unwrap();
        let reply = codec::decode_envelope(&buf[..n]).unwrap();
        assert_eq!(reply.op, "poll_wave_m_reply");
        assert_eq!(reply.parameters.unwrap()["status"], json!([0]));
        assert_eq!(sim.requests().len(), 1);
    }
}
