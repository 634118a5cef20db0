#![cfg(all(unix, feature = "cli"))]

use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/flcli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn accept(listener: &UnixListener) -> UnixStream {
    let (stream, _) = listener.accept().expect("bridge should connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("read timeout should be settable");
    stream
}

fn interrupt(child: &Child) {
    let pid = libc::pid_t::try_from(child.id()).expect("pid fits in pid_t");
    // SAFETY: signalling a child process we spawned and still own.
    let rc = unsafe { libc::kill(pid, libc::SIGINT) };
    assert_eq!(rc, 0, "SIGINT should be delivered");
}

fn wait_with_deadline(child: &mut Child, timeout: Duration) -> std::process::ExitStatus {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().expect("child status") {
            return status;
        }
        if start.elapsed() >= timeout {
            let _ = child.kill();
            panic!("bridge did not exit after SIGINT");
        }
        thread::sleep(Duration::from_millis(25));
    }
}

#[test]
fn bridge_fans_out_and_relays_back() {
    let dir = unique_temp_dir("bridge");
    let primary_path = dir.join("primary.sock");
    let s1_path = dir.join("s1.sock");
    let s2_path = dir.join("s2.sock");
    let primary_listener = UnixListener::bind(&primary_path).unwrap();
    let s1_listener = UnixListener::bind(&s1_path).unwrap();
    let s2_listener = UnixListener::bind(&s2_path).unwrap();

    let mut child = Command::new(env!("CARGO_BIN_EXE_framelink"))
        .arg("--log-level")
        .arg("error")
        .arg("--format")
        .arg("json")
        .arg("bridge")
        .arg(format!("unix:{}", primary_path.display()))
        .arg(format!("unix:{}", s1_path.display()))
        .arg(format!("unix:{}", s2_path.display()))
        .stdout(Stdio::piped())
        .spawn()
        .expect("bridge should start");

    let mut primary = accept(&primary_listener);
    let mut s1 = accept(&s1_listener);
    let mut s2 = accept(&s2_listener);
    // Let the bridge finish discarding stale input on every endpoint.
    thread::sleep(Duration::from_millis(300));

    // Raw bytes, not a frame: the bridge must not care.
    primary.write_all(b"\xAA\x01raw").unwrap();
    for secondary in [&mut s1, &mut s2] {
        let mut got = [0u8; 5];
        secondary.read_exact(&mut got).expect("fan-out bytes");
        assert_eq!(&got, b"\xAA\x01raw");
    }

    s2.write_all(b"reply").unwrap();
    let mut got = [0u8; 5];
    primary.read_exact(&mut got).expect("upstream bytes");
    assert_eq!(&got, b"reply");

    // s1 never sees what s2 sent.
    s1.set_read_timeout(Some(Duration::from_millis(200))).unwrap();
    let mut stray = [0u8; 1];
    assert!(s1.read(&mut stray).is_err());

    interrupt(&child);
    let status = wait_with_deadline(&mut child, Duration::from_secs(5));
    assert!(status.success());

    let mut stdout = String::new();
    child
        .stdout
        .take()
        .expect("stdout piped")
        .read_to_string(&mut stdout)
        .unwrap();
    let stats: serde_json::Value =
        serde_json::from_str(stdout.trim()).expect("stats should be one JSON line");
    assert_eq!(stats["bytes_downstream"], 5);
    assert_eq!(stats["bytes_upstream"], 5);
    assert_eq!(stats["secondaries"].as_array().map(Vec::len), Some(2));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn bridge_gives_up_on_unreachable_primary() {
    let dir = unique_temp_dir("bridge-missing");
    let s1_path = dir.join("s1.sock");
    let _s1_listener = UnixListener::bind(&s1_path).unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_framelink"))
        .arg("bridge")
        .arg(format!("unix:{}", dir.join("absent.sock").display()))
        .arg(format!("unix:{}", s1_path.display()))
        .arg("--open-attempts")
        .arg("2")
        .arg("--open-backoff")
        .arg("10ms")
        .output()
        .expect("bridge should run");

    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("after 2 attempt(s)"), "stderr: {stderr}");

    let _ = std::fs::remove_dir_all(&dir);
}
