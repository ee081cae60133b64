//! V8 debugger client over a byte stream.
//!
//! Owns a writer task that drains outgoing frames and a reader task that
//! decodes incoming frames, routes responses through the [`Dispatcher`],
//! tracks the debuggee's running flag and broadcasts events.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};
use v8bridge_protocol::{
    commands, decode_message, encode_message, events, parse_incoming, BacktraceArguments,
    BreakEventBody, ChangeBreakpointArguments, ClearBreakpointArguments, ContinueArguments, Event,
    Frame, IncomingMessage, ListBreakpointsBody, LookupArguments, Mirror, Request, Response,
    ScriptsArguments, SetBreakpointArguments, SetBreakpointBody,
};

use crate::dispatcher::Dispatcher;
use crate::error::BridgeError;
use crate::record::Handle;
use crate::transport::{Backtrace, DebuggerEvent, DebuggerTransport};

/// Default deadline for a single request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const READ_CHUNK: usize = 8 * 1024;

/// Tuning for a [`V8Client`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Per-request deadline; `None` waits forever.
    pub request_timeout: Option<Duration>,
    /// Running flag assumed until the first reply says otherwise.
    pub initially_running: bool,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
            initially_running: true,
            event_capacity: 64,
        }
    }
}

/// A connected V8 debugger client.
pub struct V8Client {
    next_seq: AtomicI64,
    dispatcher: Arc<Mutex<Dispatcher>>,
    writer_tx: mpsc::Sender<Vec<u8>>,
    running: Arc<AtomicBool>,
    events: broadcast::Sender<DebuggerEvent>,
    options: ClientOptions,
    tasks: Vec<JoinHandle<()>>,
}

impl V8Client {
    /// Connect to a debuggee listening on `host:port`.
    pub async fn connect(
        host: &str,
        port: u16,
        options: ClientOptions,
    ) -> Result<Self, BridgeError> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        info!(host, port, "connected to debugger");
        let (reader, writer) = stream.into_split();
        Ok(Self::from_stream(reader, writer, options))
    }

    /// Run the client over an already-open stream pair.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_stream<R, W>(reader: R, writer: W, options: ClientOptions) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let dispatcher = Arc::new(Mutex::new(Dispatcher::new()));
        let running = Arc::new(AtomicBool::new(options.initially_running));
        let (events, _) = broadcast::channel(options.event_capacity.max(1));
        let (writer_tx, writer_rx) = mpsc::channel::<Vec<u8>>(64);

        let incoming = Incoming {
            dispatcher: dispatcher.clone(),
            running: running.clone(),
            events: events.clone(),
        };
        let tasks = vec![
            tokio::spawn(write_loop(writer, writer_rx)),
            tokio::spawn(read_loop(reader, incoming)),
        ];

        Self {
            next_seq: AtomicI64::new(1),
            dispatcher,
            writer_tx,
            running,
            events,
            options,
            tasks,
        }
    }

    /// Send a request and wait for its successful response.
    pub async fn request(
        &self,
        command: &str,
        arguments: Option<serde_json::Value>,
    ) -> Result<Response, BridgeError> {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let request = Request::new(seq, command, arguments);
        let frame = encode_message(&serde_json::to_value(&request)?);

        let rx = {
            let mut dispatcher = self.dispatcher.lock().await;
            if dispatcher.is_closed() {
                return Err(BridgeError::Disconnected);
            }
            dispatcher.register(seq)
        };
        debug!(seq, command, "sending request");
        if self.writer_tx.send(frame).await.is_err() {
            self.dispatcher.lock().await.cancel(seq);
            return Err(BridgeError::Disconnected);
        }

        let reply = match self.options.request_timeout {
            Some(limit) => match timeout(limit, rx).await {
                Ok(reply) => reply,
                Err(_) => {
                    self.dispatcher.lock().await.cancel(seq);
                    warn!(seq, command, "request timed out");
                    return Err(BridgeError::Timeout {
                        command: command.to_string(),
                    });
                }
            },
            None => rx.await,
        };
        let response = reply.map_err(|_| BridgeError::Disconnected)?;

        if !response.success {
            return Err(BridgeError::Rejected {
                command: command.to_string(),
                message: response.message.unwrap_or_default(),
            });
        }
        Ok(response)
    }

    /// Number of requests still waiting for a reply.
    pub async fn pending_requests(&self) -> usize {
        self.dispatcher.lock().await.pending_count()
    }
}

impl Drop for V8Client {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[async_trait]
impl DebuggerTransport for V8Client {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<DebuggerEvent> {
        self.events.subscribe()
    }

    async fn scripts(&self, args: ScriptsArguments) -> Result<Vec<Mirror>, BridgeError> {
        let response = self
            .request(commands::SCRIPTS, Some(serde_json::to_value(args)?))
            .await?;
        body_or_default(&response)
    }

    async fn backtrace(&self, args: BacktraceArguments) -> Result<Backtrace, BridgeError> {
        let response = self
            .request(commands::BACKTRACE, Some(serde_json::to_value(args)?))
            .await?;
        let body = body_or_default(&response)?;
        Ok(Backtrace {
            body,
            refs: response.refs,
        })
    }

    async fn lookup(&self, args: LookupArguments) -> Result<HashMap<Handle, Mirror>, BridgeError> {
        let response = self
            .request(commands::LOOKUP, Some(serde_json::to_value(args)?))
            .await?;
        let by_key: HashMap<String, Mirror> = body_or_default(&response)?;
        Ok(by_key
            .into_iter()
            .filter_map(|(key, mirror)| match key.parse::<Handle>() {
                Ok(handle) => Some((handle, mirror)),
                Err(_) => {
                    warn!(key, "lookup reply has a non-numeric handle");
                    None
                }
            })
            .collect())
    }

    async fn set_breakpoint(
        &self,
        args: SetBreakpointArguments,
    ) -> Result<SetBreakpointBody, BridgeError> {
        let response = self
            .request(commands::SET_BREAKPOINT, Some(serde_json::to_value(args)?))
            .await?;
        body_required(&response)
    }

    async fn change_breakpoint(&self, args: ChangeBreakpointArguments) -> Result<(), BridgeError> {
        self.request(commands::CHANGE_BREAKPOINT, Some(serde_json::to_value(args)?))
            .await?;
        Ok(())
    }

    async fn clear_breakpoint(&self, args: ClearBreakpointArguments) -> Result<(), BridgeError> {
        self.request(commands::CLEAR_BREAKPOINT, Some(serde_json::to_value(args)?))
            .await?;
        Ok(())
    }

    async fn list_breakpoints(&self) -> Result<ListBreakpointsBody, BridgeError> {
        let response = self.request(commands::LIST_BREAKPOINTS, None).await?;
        body_or_default(&response)
    }

    async fn continue_script(&self, args: ContinueArguments) -> Result<(), BridgeError> {
        let arguments = if args == ContinueArguments::default() {
            None
        } else {
            Some(serde_json::to_value(args)?)
        };
        self.request(commands::CONTINUE, arguments).await?;
        Ok(())
    }

    async fn suspend(&self) -> Result<(), BridgeError> {
        self.request(commands::SUSPEND, None).await?;
        Ok(())
    }
}

fn body_or_default<T: DeserializeOwned + Default>(response: &Response) -> Result<T, BridgeError> {
    match &response.body {
        None | Some(serde_json::Value::Null) => Ok(T::default()),
        Some(body) => decode_body(response, body),
    }
}

fn body_required<T: DeserializeOwned>(response: &Response) -> Result<T, BridgeError> {
    let body = response.body.as_ref().ok_or_else(|| {
        BridgeError::InvalidResponse(format!("{} reply has no body", response.command))
    })?;
    decode_body(response, body)
}

fn decode_body<T: DeserializeOwned>(
    response: &Response,
    body: &serde_json::Value,
) -> Result<T, BridgeError> {
    T::deserialize(body)
        .map_err(|e| BridgeError::InvalidResponse(format!("{} reply: {e}", response.command)))
}

/// State shared with the reader task.
struct Incoming {
    dispatcher: Arc<Mutex<Dispatcher>>,
    running: Arc<AtomicBool>,
    events: broadcast::Sender<DebuggerEvent>,
}

impl Incoming {
    async fn handle_frame(&self, frame: Frame) {
        let Some(body) = frame.body else {
            debug!(
                v8_version = frame.header("V8-Version"),
                protocol_version = frame.header("Protocol-Version"),
                "debugger handshake"
            );
            return;
        };
        match parse_incoming(body) {
            Ok(IncomingMessage::Response(response)) => {
                trace!(
                    request_seq = response.request_seq,
                    command = %response.command,
                    success = response.success,
                    "response"
                );
                if let Some(running) = response.running {
                    self.set_running(running);
                }
                self.dispatcher.lock().await.dispatch(response);
            }
            Ok(IncomingMessage::Event(event)) => self.handle_event(event),
            Err(e) => warn!(error = %e, "ignoring message from debugger"),
        }
    }

    fn handle_event(&self, event: Event) {
        trace!(event = %event.event, "event");
        match event.event.as_str() {
            events::BREAK | events::EXCEPTION => {
                let body = match event.body {
                    Some(body) => BreakEventBody::deserialize(&body).unwrap_or_else(|e| {
                        warn!(error = %e, "malformed {} event body", event.event);
                        BreakEventBody::default()
                    }),
                    None => BreakEventBody::default(),
                };
                self.set_running(false);
                let notification = if event.event == events::BREAK {
                    DebuggerEvent::Break(body)
                } else {
                    DebuggerEvent::Exception(body)
                };
                let _ = self.events.send(notification);
            }
            _ => {
                let _ = self.events.send(DebuggerEvent::Other {
                    event: event.event,
                    body: event.body,
                });
            }
        }
    }

    fn set_running(&self, running: bool) {
        if self.running.swap(running, Ordering::SeqCst) != running {
            debug!(running, "running state changed");
            let _ = self.events.send(DebuggerEvent::ChangeRunning { running });
        }
    }
}

async fn write_loop<W: AsyncWrite + Unpin>(mut writer: W, mut rx: mpsc::Receiver<Vec<u8>>) {
    while let Some(frame) = rx.recv().await {
        if let Err(e) = writer.write_all(&frame).await {
            warn!(error = %e, "write to debugger failed");
            break;
        }
        if writer.flush().await.is_err() {
            break;
        }
    }
}

async fn read_loop<R: AsyncRead + Unpin>(mut reader: R, incoming: Incoming) {
    let mut buf: Vec<u8> = Vec::with_capacity(READ_CHUNK);
    let mut chunk = vec![0u8; READ_CHUNK];

    'read: loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => {
                debug!("debugger closed the connection");
                break;
            }
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "read from debugger failed");
                break;
            }
        };
        buf.extend_from_slice(&chunk[..n]);

        loop {
            match decode_message(&buf) {
                Ok(Some((frame, consumed))) => {
                    buf.drain(..consumed);
                    incoming.handle_frame(frame).await;
                }
                Ok(None) => break,
                Err(e) => {
                    // The stream cannot be resynchronised after a bad frame.
                    warn!(error = %e, "unreadable frame from debugger, closing");
                    break 'read;
                }
            }
        }
    }

    incoming.dispatcher.lock().await.close();
    let _ = incoming.events.send(DebuggerEvent::Disconnected);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tokio::io::{duplex, split, DuplexStream};
    use v8bridge_protocol::{ScriptId, StepAction, SCRIPT_TYPE_NORMAL};

    /// The debuggee side of a duplex pipe.
    struct FakeDebuggee {
        io: DuplexStream,
        buf: Vec<u8>,
    }

    impl FakeDebuggee {
        async fn next_request(&mut self) -> Value {
            loop {
                if let Some((frame, n)) = decode_message(&self.buf).unwrap() {
                    self.buf.drain(..n);
                    return frame.body.unwrap();
                }
                let mut chunk = [0u8; 1024];
                let n = self.io.read(&mut chunk).await.unwrap();
                assert!(n > 0, "client hung up");
                self.buf.extend_from_slice(&chunk[..n]);
            }
        }

        async fn send(&mut self, value: Value) {
            self.io.write_all(&encode_message(&value)).await.unwrap();
        }

        async fn reply(&mut self, request: &Value, body: Value, running: bool) {
            self.send(json!({
                "seq": 0,
                "type": "response",
                "request_seq": request["seq"],
                "command": request["command"],
                "success": true,
                "running": running,
                "body": body
            }))
            .await;
        }
    }

    fn pair(options: ClientOptions) -> (V8Client, FakeDebuggee) {
        let (client_io, server_io) = duplex(64 * 1024);
        let (r, w) = split(client_io);
        let client = V8Client::from_stream(r, w, options);
        (
            client,
            FakeDebuggee {
                io: server_io,
                buf: Vec::new(),
            },
        )
    }

    #[tokio::test]
    async fn client_scripts_round_trip() {
        let (client, mut debuggee) = pair(ClientOptions::default());
        let server = async {
            let req = debuggee.next_request().await;
            assert_eq!(req["command"], "scripts");
            assert_eq!(req["arguments"], json!({"types": 4, "includeSource": false}));
            debuggee
                .reply(&req, json!([{"type": "script", "id": 3, "name": "app.js"}]), true)
                .await;
        };
        let call = client.scripts(ScriptsArguments {
            types: SCRIPT_TYPE_NORMAL,
            ids: None,
            include_source: false,
        });
        let (scripts, ()) = tokio::join!(call, server);
        let scripts = scripts.unwrap();
        assert_eq!(scripts.len(), 1);
        assert_eq!(scripts[0].id, Some(ScriptId::Number(3)));
    }

    #[tokio::test]
    async fn client_skips_handshake() {
        let (client, mut debuggee) = pair(ClientOptions::default());
        debuggee
            .io
            .write_all(b"Type: connect\r\nV8-Version: 3.14.5\r\nContent-Length: 0\r\n\r\n")
            .await
            .unwrap();
        let server = async {
            let req = debuggee.next_request().await;
            debuggee.reply(&req, Value::Null, false).await;
        };
        let (result, ()) = tokio::join!(client.suspend(), server);
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn client_running_flag_follows_replies() {
        let (client, mut debuggee) = pair(ClientOptions::default());
        let mut events = client.subscribe();
        assert!(client.is_running());

        let server = async {
            let req = debuggee.next_request().await;
            debuggee.reply(&req, Value::Null, false).await;
        };
        let (result, ()) = tokio::join!(client.suspend(), server);
        result.unwrap();

        assert!(!client.is_running());
        assert_eq!(
            events.recv().await.unwrap(),
            DebuggerEvent::ChangeRunning { running: false }
        );
    }

    #[tokio::test]
    async fn client_break_event_pauses() {
        let (client, mut debuggee) = pair(ClientOptions::default());
        let mut events = client.subscribe();
        debuggee
            .send(json!({
                "seq": 9, "type": "event", "event": "break",
                "body": {"sourceLine": 14, "breakpoints": [2]}
            }))
            .await;

        assert_eq!(
            events.recv().await.unwrap(),
            DebuggerEvent::ChangeRunning { running: false }
        );
        match events.recv().await.unwrap() {
            DebuggerEvent::Break(body) => {
                assert_eq!(body.source_line, Some(14));
                assert_eq!(body.breakpoints, vec![2]);
            }
            other => panic!("expected break, got {other:?}"),
        }
        assert!(!client.is_running());
    }

    #[tokio::test]
    async fn client_other_events_pass_through() {
        let (client, mut debuggee) = pair(ClientOptions::default());
        let mut events = client.subscribe();
        debuggee
            .send(json!({
                "seq": 1, "type": "event", "event": "afterCompile",
                "body": {"script": {"id": 4}}
            }))
            .await;
        match events.recv().await.unwrap() {
            DebuggerEvent::Other { event, body } => {
                assert_eq!(event, "afterCompile");
                assert_eq!(body.unwrap()["script"]["id"], 4);
            }
            other => panic!("expected passthrough, got {other:?}"),
        }
        assert!(client.is_running());
    }

    #[tokio::test]
    async fn client_rejected_request() {
        let (client, mut debuggee) = pair(ClientOptions::default());
        let server = async {
            let req = debuggee.next_request().await;
            debuggee
                .send(json!({
                    "seq": 0,
                    "type": "response",
                    "request_seq": req["seq"],
                    "command": "setbreakpoint",
                    "success": false,
                    "message": "Invalid script"
                }))
                .await;
        };
        let call = client.set_breakpoint(SetBreakpointArguments::script_id(ScriptId::Number(1), 3));
        let (result, ()) = tokio::join!(call, server);
        match result.unwrap_err() {
            BridgeError::Rejected { command, message } => {
                assert_eq!(command, "setbreakpoint");
                assert_eq!(message, "Invalid script");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn client_request_times_out() {
        let (client, _debuggee) = pair(ClientOptions {
            request_timeout: Some(Duration::from_millis(50)),
            ..ClientOptions::default()
        });
        let err = client.suspend().await.unwrap_err();
        assert!(matches!(err, BridgeError::Timeout { ref command } if command == "suspend"));
        assert_eq!(client.pending_requests().await, 0);
    }

    #[tokio::test]
    async fn client_disconnect_fails_pending() {
        let (client, mut debuggee) = pair(ClientOptions {
            request_timeout: None,
            ..ClientOptions::default()
        });
        let server = async move {
            let _ = debuggee.next_request().await;
            drop(debuggee);
        };
        let (result, ()) = tokio::join!(client.suspend(), server);
        assert!(matches!(result.unwrap_err(), BridgeError::Disconnected));
    }

    #[tokio::test]
    async fn client_announces_disconnect() {
        let (client, debuggee) = pair(ClientOptions::default());
        let mut events = client.subscribe();
        drop(debuggee);

        let event = timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("no disconnect notification")
            .unwrap();
        assert_eq!(event, DebuggerEvent::Disconnected);
    }

    #[tokio::test]
    async fn client_lists_debuggee_breakpoints() {
        let (client, mut debuggee) = pair(ClientOptions::default());
        let server = async {
            let req = debuggee.next_request().await;
            assert_eq!(req["command"], "listbreakpoints");
            assert!(req.get("arguments").is_none());
            let body = json!({
                "breakpoints": [{"type": "scriptId", "script_id": 4, "number": 2, "line": 9}],
                "breakOnExceptions": false
            });
            debuggee.reply(&req, body, false).await;
        };
        let (listed, ()) = tokio::join!(client.list_breakpoints(), server);
        let listed = listed.unwrap();
        assert_eq!(listed.breakpoints.len(), 1);
        assert_eq!(listed.breakpoints[0].number, 2);
        assert_eq!(listed.breakpoints[0].script_id, Some(ScriptId::Number(4)));
    }

    #[tokio::test]
    async fn client_lookup_parses_handles() {
        let (client, mut debuggee) = pair(ClientOptions::default());
        let server = async {
            let req = debuggee.next_request().await;
            assert_eq!(req["arguments"]["handles"], json!([5, 6]));
            debuggee
                .reply(
                    &req,
                    json!({
                        "5": {"handle": 5, "type": "number", "value": 1},
                        "6": {"handle": 6, "type": "string", "value": "x"}
                    }),
                    false,
                )
                .await;
        };
        let call = client.lookup(LookupArguments {
            handles: vec![5, 6],
            include_source: false,
        });
        let (result, ()) = tokio::join!(call, server);
        let values = result.unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[&6].kind, "string");
    }

    #[tokio::test]
    async fn client_continue_arguments() {
        let (client, mut debuggee) = pair(ClientOptions::default());
        let server = async {
            let plain = debuggee.next_request().await;
            assert!(plain.get("arguments").is_none());
            debuggee.reply(&plain, Value::Null, true).await;

            let step = debuggee.next_request().await;
            assert_eq!(step["arguments"], json!({"stepaction": "out", "stepcount": 1}));
            debuggee.reply(&step, Value::Null, true).await;
        };
        let calls = async {
            client
                .continue_script(ContinueArguments::default())
                .await
                .unwrap();
            client
                .continue_script(ContinueArguments::step(StepAction::Out))
                .await
                .unwrap();
        };
        tokio::join!(calls, server);
    }

    #[tokio::test]
    async fn client_backtrace_keeps_refs() {
        let (client, mut debuggee) = pair(ClientOptions::default());
        let server = async {
            let req = debuggee.next_request().await;
            assert_eq!(req["arguments"], json!({"inlineRefs": true}));
            debuggee
                .send(json!({
                    "seq": 0,
                    "type": "response",
                    "request_seq": req["seq"],
                    "command": "backtrace",
                    "success": true,
                    "running": false,
                    "body": {
                        "fromFrame": 0, "toFrame": 1, "totalFrames": 1,
                        "frames": [{"index": 0, "script": {"ref": 2}}]
                    },
                    "refs": [{"handle": 2, "type": "script", "name": "app.js", "id": 8}]
                }))
                .await;
        };
        let call = client.backtrace(BacktraceArguments {
            inline_refs: true,
            ..Default::default()
        });
        let (result, ()) = tokio::join!(call, server);
        let backtrace = result.unwrap();
        assert_eq!(backtrace.body.frames.len(), 1);
        assert_eq!(backtrace.refs[0].handle, Some(2));
    }
}
