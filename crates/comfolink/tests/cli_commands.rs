#![cfg(feature = "cli")]

use std::net::{TcpListener, UdpSocket};
use std::process::Command;
use std::thread;
use std::time::Duration;

use comfolink_frame::{DeviceId, Envelope, FrameReader, FrameWriter};

const GATEWAY_ID: DeviceId = DeviceId::from_bytes([0x6A; 16]);
const PHONE_ID: DeviceId = DeviceId::from_bytes([0x11; 16]);

fn comfolink() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_comfolink"));
    command.arg("--log-level").arg("error");
    command
}

/// Length-delimited protobuf field.
fn field(tag: u8, value: &[u8]) -> Vec<u8> {
    let mut out = vec![(tag << 3) | 2, value.len() as u8];
    out.extend_from_slice(value);
    out
}

fn discovery_response(address: &str, device_id: DeviceId) -> Vec<u8> {
    let mut inner = field(1, address.as_bytes());
    inner.extend(field(2, device_id.as_bytes()));
    inner.extend([0x18, 0x01]);
    field(2, &inner)
}

/// Operation header with a single-byte kind and an OK result.
fn operation(kind: u8) -> Vec<u8> {
    vec![0x08, kind, 0x10, 0x00]
}

fn registered_apps() -> Vec<u8> {
    let mut app = field(1, PHONE_ID.as_bytes());
    app.extend(field(2, b"phone"));
    field(1, &app)
}

#[test]
fn version_prints_package_version() {
    let output = comfolink().arg("version").output().expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.trim(),
        format!("comfolink {}", env!("CARGO_PKG_VERSION"))
    );
}

#[test]
fn extended_version_as_json() {
    let output = comfolink()
        .args(["--format", "json", "version", "--extended"])
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let payload: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("version should emit json");
    assert_eq!(payload["name"], "comfolink");
    assert_eq!(payload["version"], env!("CARGO_PKG_VERSION"));
}

#[test]
fn discover_reports_the_answering_gateway() {
    let device = UdpSocket::bind("127.0.0.1:0").expect("device socket");
    let port = device.local_addr().unwrap().port();

    let responder = thread::spawn(move || {
        let mut buf = [0u8; 64];
        let (len, from) = device.recv_from(&mut buf).expect("search request");
        assert_eq!(&buf[..len], &[0x0A, 0x00]);
        device
            .send_to(&discovery_response("127.0.0.1", GATEWAY_ID), from)
            .expect("send response");
    });

    let output = comfolink()
        .args(["--format", "json", "discover", "--broadcast", "127.0.0.1"])
        .args(["--port", &port.to_string(), "--bind", "127.0.0.1:0", "--timeout", "3s"])
        .output()
        .expect("discover should run");
    responder.join().unwrap();

    assert!(output.status.success(), "{output:?}");
    let payload: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("discover should emit json");
    assert_eq!(payload["address"], "127.0.0.1");
    assert_eq!(payload["port"], port);
    assert_eq!(payload["device_id"], GATEWAY_ID.to_string());
    assert_eq!(payload["version"], 1);
}

#[test]
fn discover_without_answer_returns_124() {
    let silent = UdpSocket::bind("127.0.0.1:0").expect("device socket");
    let port = silent.local_addr().unwrap().port();

    let output = comfolink()
        .args(["discover", "--broadcast", "127.0.0.1", "--bind", "127.0.0.1:0"])
        .args(["--port", &port.to_string(), "--timeout", "200ms"])
        .output()
        .expect("discover should run");

    assert_eq!(output.status.code(), Some(124));
    drop(silent);
}

#[test]
fn listen_against_closed_port_returns_3() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let output = comfolink()
        .args(["listen", "--host", "127.0.0.1", "--port", &port.to_string()])
        .args(["--device-id", &GATEWAY_ID.to_string(), "--timeout", "1s"])
        .output()
        .expect("listen should run");

    assert_eq!(output.status.code(), Some(3));
    assert!(String::from_utf8_lossy(&output.stderr).contains("session start failed"));
}

#[test]
fn apps_lists_registrations_and_closes() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let gateway = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("client connects");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let mut reader = FrameReader::new(stream.try_clone().unwrap());
        let mut writer = FrameWriter::new(stream);
        let mut seen = Vec::new();

        while let Ok(request) = reader.read_envelope() {
            let kind = request.operation[1];
            seen.push(kind);
            let reply = match kind {
                3 => Some((53, Vec::new())),
                5 => Some((55, registered_apps())),
                4 => Some((54, Vec::new())),
                _ => None,
            };
            if let Some((kind, body)) = reply {
                let envelope = Envelope::new(GATEWAY_ID, request.source, operation(kind), body);
                if writer.write_envelope(&envelope).is_err() {
                    break;
                }
            }
        }
        seen
    });

    let output = comfolink()
        .args(["--format", "json", "apps", "--host", "127.0.0.1"])
        .args(["--port", &port.to_string(), "--device-id", &GATEWAY_ID.to_string()])
        .output()
        .expect("apps should run");

    assert!(output.status.success(), "{output:?}");
    let payload: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("apps should emit json");
    assert_eq!(payload[0]["id"], PHONE_ID.to_string());
    assert_eq!(payload[0]["device_name"], "phone");

    let seen = gateway.join().unwrap();
    assert_eq!(&seen[..3], &[3, 5, 4]);
}
