//! RTP receive path
//!
//! One receiver per call. Datagrams land in a jitter buffer keyed by the
//! 16-bit RTP sequence number; a 20 ms playout tick drains the buffer in
//! modular sequence order with a bounded tolerance for loss. Depending on the
//! delivery mode, drained payloads either accumulate in a circular pre-buffer
//! or go to a live sink.
//!
//! Mode only ever moves forward: discard → pre-buffer → live.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use voice_gateway_core::{GatewayError, Result, RtpEvent, FRAME_MS};

/// Fixed RTP header length; the gateway does not negotiate extensions.
const RTP_HEADER_LEN: usize = 12;

/// Consecutive empty ticks tolerated before skipping ahead.
const MAX_MISSES: u32 = 5;

/// How many ports are probed upward from the configured start before the
/// bind is declared failed.
const MAX_PORT_PROBES: u16 = 100;

/// Live sink capacity in frames (~5 s of audio).
const LIVE_SINK_DEPTH: usize = 256;

/// Where drained payloads go.
enum DeliveryMode {
    /// Before voice detection is armed: payloads are dropped.
    Discard,
    /// Circular buffer of the most recent `capacity` frames.
    PreBuffer {
        ring: VecDeque<Vec<u8>>,
        capacity: usize,
    },
    /// Frames stream to the registered sink.
    Live { sink: Option<mpsc::Sender<Vec<u8>>> },
}

struct JitterState {
    buffer: HashMap<u16, Vec<u8>>,
    last_played: Option<u16>,
    miss_count: u32,
    mode: DeliveryMode,
}

impl JitterState {
    fn new() -> Self {
        Self {
            buffer: HashMap::new(),
            last_played: None,
            miss_count: 0,
            mode: DeliveryMode::Discard,
        }
    }

    /// One playout tick: return the next in-order payload if the buffer owns
    /// it, advancing the skip logic otherwise.
    fn playout_step(&mut self) -> Option<Vec<u8>> {
        if self.buffer.is_empty() {
            return None;
        }

        // First arrival: anchor just behind the earliest sequence we hold.
        let last = match self.last_played {
            Some(last) => last,
            None => {
                let min = *self.buffer.keys().min().expect("buffer not empty");
                let anchor = min.wrapping_sub(1);
                self.last_played = Some(anchor);
                anchor
            }
        };

        let next = last.wrapping_add(1);
        if let Some(payload) = self.buffer.remove(&next) {
            self.last_played = Some(next);
            self.miss_count = 0;
            return Some(payload);
        }

        self.miss_count += 1;
        if self.miss_count > MAX_MISSES {
            // Skip to the sequence with the smallest forward modular distance.
            let next_available = *self
                .buffer
                .keys()
                .min_by_key(|&&k| k.wrapping_sub(next))
                .expect("buffer not empty");
            warn!(
                expected = next,
                skipped_to = next_available,
                "jitter buffer skipping lost packets"
            );
            self.last_played = Some(next_available.wrapping_sub(1));
            self.miss_count = 0;
        }
        None
    }

    /// Route a drained payload per the current mode. Returns the payload back
    /// when it must go to a live sink (sends happen outside the lock).
    fn route(&mut self, payload: Vec<u8>) -> Option<(mpsc::Sender<Vec<u8>>, Vec<u8>)> {
        match &mut self.mode {
            DeliveryMode::Discard => None,
            DeliveryMode::PreBuffer { ring, capacity } => {
                if ring.len() == *capacity {
                    ring.pop_front();
                }
                ring.push_back(payload);
                None
            }
            DeliveryMode::Live { sink } => sink.clone().map(|s| (s, payload)),
        }
    }
}

/// UDP media receiver with jitter-buffered playout.
pub struct RtpReceiver {
    state: Arc<Mutex<JitterState>>,
    /// Sink registered ahead of the pre-buffer flush; installed into the
    /// live mode when the flush flips it.
    pending_sink: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
}

impl RtpReceiver {
    /// Bind on `start_port`, probing upward on address-in-use, and start the
    /// receive and playout tasks. Yields the receiver plus its event feed;
    /// [`RtpEvent::Listening`] with the actually bound endpoint is the first
    /// event delivered.
    pub async fn bind(ip: &str, start_port: u16) -> Result<(Self, mpsc::Receiver<RtpEvent>)> {
        let socket = Self::bind_probing(ip, start_port).await?;
        let local_addr = socket
            .local_addr()
            .map_err(|e| GatewayError::Socket(e.to_string()))?;

        let (event_tx, event_rx) = mpsc::channel(LIVE_SINK_DEPTH);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let state = Arc::new(Mutex::new(JitterState::new()));

        let receiver = Self {
            state: state.clone(),
            pending_sink: Mutex::new(None),
            local_addr,
            shutdown,
        };

        let _ = event_tx.send(RtpEvent::Listening(local_addr)).await;

        tokio::spawn(recv_loop(
            socket,
            state.clone(),
            event_tx.clone(),
            shutdown_rx.clone(),
        ));
        tokio::spawn(playout_loop(state, shutdown_rx));

        Ok((receiver, event_rx))
    }

    async fn bind_probing(ip: &str, start_port: u16) -> Result<UdpSocket> {
        for offset in 0..MAX_PORT_PROBES {
            let Some(port) = start_port.checked_add(offset) else {
                break;
            };
            match UdpSocket::bind((ip, port)).await {
                Ok(socket) => {
                    if offset > 0 {
                        debug!(port, tried = offset + 1, "bound after probing");
                    }
                    return Ok(socket);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => continue,
                Err(e) => return Err(GatewayError::Socket(e.to_string())),
            }
        }
        Err(GatewayError::Bind { start_port })
    }

    /// The endpoint the switch should point its external media channel at.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Enter pre-buffer mode with a ring of `capacity_frames` entries.
    pub fn start_pre_buffering(&self, capacity_frames: usize) {
        let mut state = self.state.lock();
        if matches!(state.mode, DeliveryMode::Discard) {
            state.mode = DeliveryMode::PreBuffer {
                ring: VecDeque::with_capacity(capacity_frames),
                capacity: capacity_frames.max(1),
            };
        } else {
            warn!("pre-buffering requested twice; keeping current mode");
        }
    }

    /// Register the sink that receives frames once the receiver is live.
    /// Call before [`RtpReceiver::stop_pre_buffering_and_flush`] so no frame
    /// can fall between flush and subscription.
    pub fn subscribe_live(&self, sink: mpsc::Sender<Vec<u8>>) {
        let mut state = self.state.lock();
        if let DeliveryMode::Live { sink: existing } = &mut state.mode {
            *existing = Some(sink);
        } else {
            // Stashed until flush flips the mode.
            self.pending_sink.lock().replace(sink);
        }
    }

    /// Concatenate and clear the pre-buffer, switch to live mode, and return
    /// the buffered bytes in arrival order.
    pub fn stop_pre_buffering_and_flush(&self) -> Vec<u8> {
        let mut state = self.state.lock();
        let flushed = match &mut state.mode {
            DeliveryMode::PreBuffer { ring, .. } => {
                let mut out = Vec::with_capacity(ring.iter().map(Vec::len).sum());
                for frame in ring.drain(..) {
                    out.extend_from_slice(&frame);
                }
                out
            }
            _ => {
                warn!("flush requested outside pre-buffer mode");
                Vec::new()
            }
        };
        state.mode = DeliveryMode::Live {
            sink: self.pending_sink.lock().take(),
        };
        flushed
    }

    /// Stop the playout timer and close the socket.
    pub fn close(&self) {
        let _ = self.shutdown.send(true);
    }
}

impl Drop for RtpReceiver {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

async fn recv_loop(
    socket: UdpSocket,
    state: Arc<Mutex<JitterState>>,
    event_tx: mpsc::Sender<RtpEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut buf = vec![0u8; 2048];
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            res = socket.recv_from(&mut buf) => match res {
                Ok((len, _peer)) if len > RTP_HEADER_LEN => {
                    let seq = u16::from_be_bytes([buf[2], buf[3]]);
                    let payload = buf[RTP_HEADER_LEN..len].to_vec();
                    state.lock().buffer.insert(seq, payload);
                }
                Ok((len, peer)) => {
                    debug!(len, %peer, "ignoring runt datagram");
                }
                Err(e) => {
                    warn!(error = %e, "udp receive failed; closing receiver");
                    let _ = event_tx.send(RtpEvent::SocketError(e.to_string())).await;
                    break;
                }
            }
        }
    }
}

async fn playout_loop(state: Arc<Mutex<JitterState>>, mut shutdown: watch::Receiver<bool>) {
    let mut tick = tokio::time::interval(Duration::from_millis(FRAME_MS as u64));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            _ = tick.tick() => {
                let delivery = {
                    let mut guard = state.lock();
                    guard.playout_step().and_then(|payload| guard.route(payload))
                };
                if let Some((sink, payload)) = delivery {
                    // Keep the tick cadence; a full sink sheds the frame.
                    if sink.try_send(payload).is_err() {
                        debug!("live sink full or closed; dropping frame");
                    }
                }
            }
        }
    }
}
