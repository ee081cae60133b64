use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{duplex, split, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;

use v8bridge_core::{
    BridgeError, BridgeOptions, ClientOptions, DebuggerBridge, DebuggerEvent, Document,
    DocumentModel, OutputFormat, PresentationSink, Toggle, V8Client,
};
use v8bridge_protocol::{decode_message, encode_message, ScriptId};

// ── Fake V8 debuggee ────────────────────────────────────────────

type Log = Arc<Mutex<Vec<Value>>>;

/// Breakpoints the debuggee holds; they outlive a single connection.
type Held = Arc<Mutex<Vec<Value>>>;

/// Answers requests the way a paused node process would.
async fn serve(mut io: DuplexStream, log: Log, held: Held) {
    let handshake = b"Type: connect\r\nV8-Version: 3.14.5.9\r\nProtocol-Version: 1\r\n\
Content-Length: 0\r\n\r\n";
    io.write_all(handshake).await.unwrap();

    let mut buf = Vec::new();
    loop {
        let request = loop {
            if let Some((frame, n)) = decode_message(&buf).unwrap() {
                buf.drain(..n);
                break frame.body;
            }
            let mut chunk = [0u8; 4096];
            let n = io.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
        };
        let Some(request) = request else { continue };
        log.lock().unwrap().push(request.clone());

        let args = &request["arguments"];
        let (success, message, body, refs, running) = match request["command"].as_str().unwrap() {
            "scripts" if args["includeSource"] == json!(true) => {
                let body = if args["ids"] == json!([7]) {
                    json!([{
                        "type": "script", "id": 7, "name": "server.js",
                        "source": "function add(a, b) {\n  return a + b;\n}\n"
                    }])
                } else {
                    json!([])
                };
                (true, None, body, json!([]), false)
            }
            "scripts" => (
                true,
                None,
                json!([
                    {
                        "type": "script", "id": 7, "name": "server.js",
                        "text": "server.js (lines: 3)", "lineOffset": 0
                    },
                    {
                        "type": "script", "id": 8, "name": "chrome-extension://x/bg.js",
                        "lineOffset": 0
                    },
                    {"type": "script", "id": 9, "name": "lib<&>.js", "lineOffset": 20}
                ]),
                json!([]),
                false,
            ),
            "backtrace" => (
                true,
                None,
                json!({
                    "fromFrame": 0, "toFrame": 1, "totalFrames": 1,
                    "frames": [{
                        "index": 0,
                        "receiver": {"ref": 1, "type": "object", "className": "global"},
                        "func": {"ref": 2, "type": "function", "name": "add", "inferredName": ""},
                        "script": {"ref": 3},
                        "arguments": [
                            {"name": "a", "value": {"ref": 4, "type": "number", "value": 1}},
                            {"name": "b", "value": {"ref": 5, "type": "string", "value": "<two>"}}
                        ],
                        "locals": [{
                            "name": ".arguments",
                            "value": {"ref": 6, "type": "object", "className": "Arguments"}
                        }],
                        "line": 1, "column": 2
                    }]
                }),
                json!([{"handle": 3, "type": "script", "name": "server.js", "id": 7}]),
                false,
            ),
            "lookup" => {
                let body = if args["handles"] == json!([1]) {
                    json!({"1": {
                        "handle": 1, "type": "object", "className": "global",
                        "properties": [
                            {"name": "process", "ref": 10},
                            {"name": "answer", "ref": 11}
                        ]
                    }})
                } else {
                    json!({
                        "10": {"handle": 10, "type": "object", "className": "process"},
                        "11": {"handle": 11, "type": "number", "value": 42}
                    })
                };
                (true, None, body, json!([]), false)
            }
            "setbreakpoint" if args["line"] == json!(99) => {
                (false, Some("Line out of range"), Value::Null, json!([]), false)
            }
            "setbreakpoint" => {
                let mut held = held.lock().unwrap();
                let id = held.iter().filter_map(|bp| bp["number"].as_i64()).max().unwrap_or(0) + 1;
                held.push(json!({
                    "type": "scriptId", "script_id": args["target"], "number": id,
                    "line": args["line"], "column": 0, "ignoreCount": 0, "active": true
                }));
                (
                    true,
                    None,
                    json!({"type": "scriptId", "breakpoint": id, "line": args["line"]}),
                    json!([]),
                    false,
                )
            }
            "listbreakpoints" => {
                let body = json!({
                    "breakpoints": held.lock().unwrap().clone(),
                    "breakOnExceptions": false
                });
                (true, None, body, json!([]), false)
            }
            "clearbreakpoint" => {
                held.lock().unwrap().retain(|bp| bp["number"] != args["breakpoint"]);
                (true, None, json!({"breakpoint": args["breakpoint"]}), json!([]), false)
            }
            "changebreakpoint" => {
                (true, None, json!({"breakpoint": args["breakpoint"]}), json!([]), false)
            }
            "continue" => (true, None, Value::Null, json!([]), true),
            "suspend" => {
                let response = json!({
                    "seq": 0, "type": "response", "request_seq": request["seq"],
                    "command": "suspend", "success": true, "running": false
                });
                io.write_all(&encode_message(&response)).await.unwrap();
                let event = json!({
                    "seq": 0, "type": "event", "event": "break",
                    "body": {"invocationText": "add(1, 2)", "sourceLine": 1, "sourceColumn": 2}
                });
                io.write_all(&encode_message(&event)).await.unwrap();
                continue;
            }
            other => panic!("unexpected command {other}"),
        };

        let mut response = json!({
            "seq": 0,
            "type": "response",
            "request_seq": request["seq"],
            "command": request["command"],
            "success": success,
            "refs": refs,
            "running": running,
        });
        if let Some(message) = message {
            response["message"] = json!(message);
        } else {
            response["body"] = body;
        }
        io.write_all(&encode_message(&response)).await.unwrap();
    }
}

fn connect() -> (DebuggerBridge<V8Client>, Log, JoinHandle<()>) {
    connect_to(Held::default())
}

/// Open a new session to a debuggee that already holds `held`.
fn connect_to(held: Held) -> (DebuggerBridge<V8Client>, Log, JoinHandle<()>) {
    let (client_io, server_io) = duplex(64 * 1024);
    let log: Log = Arc::default();
    let server = tokio::spawn(serve(server_io, log.clone(), held));
    let (r, w) = split(client_io);
    let client = V8Client::from_stream(r, w, ClientOptions::default());
    let bridge = DebuggerBridge::new(Arc::new(client), BridgeOptions::default());
    (bridge, log, server)
}

fn commands(log: &Log) -> Vec<String> {
    log.lock()
        .unwrap()
        .iter()
        .map(|r| r["command"].as_str().unwrap_or_default().to_string())
        .collect()
}

// ── Sessions ────────────────────────────────────────────────────

#[tokio::test]
async fn session_lists_scripts_and_renders_xml() {
    let (bridge, _log, _server) = connect();
    let scripts = bridge.list_scripts().await.unwrap();
    assert_eq!(scripts.len(), 2);
    assert!(!bridge.is_running(), "reply carried running=false");

    let mut model = DocumentModel::new();
    model.load(Document::Sources(scripts));
    assert_eq!(
        model.render(OutputFormat::Xml).unwrap(),
        "<sources>\
<file id='7' name='server.js' text='server.js (lines: 3)' lineoffset='0' debug='true' />\
<file id='9' name='lib&lt;&amp;&gt;.js' text='anonymous' lineoffset='20' debug='true' />\
</sources>"
    );
}

#[tokio::test]
async fn session_backtrace_and_expand() {
    let (bridge, log, _server) = connect();
    let frames = bridge.get_backtrace().await.unwrap();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].name, "add(a, b)");
    assert_eq!(frames[0].script, "server.js");
    let names: Vec<&str> = frames[0].vars.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, vec!["this", "a", "b"]);

    let receiver = frames[0].vars[0].reference.unwrap();
    let props = bridge.expand_object(receiver).await.unwrap();
    assert_eq!(props.len(), 2);
    assert_eq!(props[0].value.display(), "[process]");
    assert_eq!(props[1].value.display(), "42");
    assert_eq!(commands(&log), vec!["backtrace", "lookup", "lookup"]);

    let mut model = DocumentModel::new();
    model.load(Document::Frames(frames));
    let json: Value = serde_json::from_str(&model.render(OutputFormat::Json).unwrap()).unwrap();
    assert_eq!(json["frames"][0]["vars"][2]["value"], "<two>");
    assert_eq!(json["frames"][0]["scriptId"], 7);
}

#[tokio::test]
async fn session_loads_source_and_reports_missing_script() {
    let (bridge, _log, _server) = connect();
    let source = bridge.load_script_source(&ScriptId::Number(7)).await.unwrap();
    assert!(source.starts_with("function add(a, b)"));

    let err = bridge
        .load_script_source(&ScriptId::Number(1234))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::ScriptNotFound(_)));
}

#[tokio::test]
async fn session_breakpoint_toggle_update_and_detach() {
    let (mut bridge, log, _server) = connect();
    let mut model = DocumentModel::new();
    let scripts = bridge.list_scripts().await.unwrap();
    let lib = scripts.iter().find(|s| s.name == "lib<&>.js").unwrap().clone();

    let set = bridge.toggle_breakpoint(&lib, 2, &mut model).await.unwrap();
    let Toggle::Set(record) = set else {
        panic!("expected a new breakpoint");
    };
    assert_eq!(record.line, 22);
    assert_eq!(record.script_id, ScriptId::Number(9));

    let req = log.lock().unwrap().last().cloned().unwrap();
    assert_eq!(
        req["arguments"],
        json!({"type": "scriptId", "target": 9, "line": 22, "enabled": true})
    );

    let err = bridge.toggle_breakpoint(&lib, 79, &mut model).await.unwrap_err();
    assert!(matches!(
        err,
        BridgeError::Rejected { ref message, .. } if message == "Line out of range"
    ));
    assert_eq!(model.breakpoints().len(), 1);

    let updated = bridge
        .update_breakpoint(
            record.id,
            v8bridge_core::BreakpointUpdate {
                condition: Some("a > 1".into()),
                ..Default::default()
            },
            &mut model,
        )
        .await
        .unwrap();
    assert_eq!(updated.condition, "a > 1");
    assert_eq!(
        model.render(OutputFormat::Xml).unwrap(),
        "<breakpoint id='1' text='lib&lt;&amp;&gt;.js:22' script='lib&lt;&amp;&gt;.js' \
scriptid='9' lineoffset='20' line='22' condition='a &gt; 1' ignorecount='0' enabled='true' />"
    );

    bridge.detach(&mut model).await.unwrap();
    assert!(model.breakpoints().is_empty());
    assert_eq!(
        commands(&log),
        vec!["scripts", "setbreakpoint", "setbreakpoint", "changebreakpoint", "clearbreakpoint"]
    );
    assert!(matches!(
        bridge.get_backtrace().await,
        Err(BridgeError::Detached)
    ));
}

#[tokio::test]
async fn session_execution_control_and_pause_notification() {
    let (bridge, log, _server) = connect();
    let mut events = bridge.subscribe();
    assert!(bridge.is_running());

    bridge.suspend().await.unwrap();
    assert_eq!(
        events.recv().await.unwrap(),
        DebuggerEvent::ChangeRunning { running: false }
    );
    match events.recv().await.unwrap() {
        DebuggerEvent::Break(pause) => assert_eq!(pause.source_line, Some(1)),
        other => panic!("expected break, got {other:?}"),
    }
    assert!(!bridge.is_running());

    bridge.resume().await.unwrap();
    assert!(bridge.is_running());
    assert_eq!(
        events.recv().await.unwrap(),
        DebuggerEvent::ChangeRunning { running: true }
    );

    bridge.step_over().await.unwrap();
    let last = log.lock().unwrap().last().cloned().unwrap();
    assert_eq!(last["arguments"], json!({"stepaction": "next", "stepcount": 1}));
}

#[tokio::test]
async fn session_fails_pending_requests_on_disconnect() {
    let (client_io, server_io) = duplex(1024);
    let (r, w) = split(client_io);
    let client = V8Client::from_stream(r, w, ClientOptions::default());
    let bridge = DebuggerBridge::new(Arc::new(client), BridgeOptions::default());
    drop(server_io);

    let err = bridge.list_scripts().await.unwrap_err();
    assert!(matches!(err, BridgeError::Disconnected));
}

#[tokio::test]
async fn session_announces_debuggee_going_away() {
    let (client_io, server_io) = duplex(1024);
    let (r, w) = split(client_io);
    let client = V8Client::from_stream(r, w, ClientOptions::default());
    let bridge = DebuggerBridge::new(Arc::new(client), BridgeOptions::default());
    let mut events = bridge.subscribe();
    drop(server_io);

    let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("watchers were never told the debuggee left")
        .unwrap();
    assert_eq!(event, DebuggerEvent::Disconnected);
}

#[tokio::test]
async fn session_break_in_a_later_run_clears_earlier_breakpoint() {
    let held = Held::default();

    // First run sets the breakpoint and ends without detaching.
    {
        let (mut bridge, _log, _server) = connect_to(held.clone());
        let mut model = DocumentModel::new();
        let scripts = bridge.list_scripts().await.unwrap();
        assert_eq!(bridge.load_breakpoints(&scripts, &mut model).await.unwrap(), 0);
        let toggle = bridge.toggle_breakpoint(&scripts[0], 1, &mut model).await.unwrap();
        assert!(matches!(toggle, Toggle::Set(ref record) if record.id == 1));
    }
    assert_eq!(held.lock().unwrap().len(), 1);

    // Second run starts empty, adopts the breakpoint, and the same toggle clears it.
    let (mut bridge, log, _server) = connect_to(held.clone());
    let mut model = DocumentModel::new();
    let scripts = bridge.list_scripts().await.unwrap();
    assert_eq!(bridge.load_breakpoints(&scripts, &mut model).await.unwrap(), 1);
    assert_eq!(model.breakpoints()[0].text, "server.js:1");

    let toggle = bridge.toggle_breakpoint(&scripts[0], 1, &mut model).await.unwrap();
    assert_eq!(toggle, Toggle::Cleared(1));
    assert!(model.breakpoints().is_empty());
    assert!(held.lock().unwrap().is_empty());
    assert_eq!(commands(&log), vec!["scripts", "listbreakpoints", "clearbreakpoint"]);
}
