use std::net::TcpListener;
use std::process::Command;
use std::thread;
use std::time::{Duration, Instant};

use assert_cmd::prelude::*;
use kvs::control_request;
use predicates::str::contains;

// `kvs-server` with no args should exit with a non-zero code and print its usage
#[test]
fn server_cli_no_args() {
    Command::cargo_bin("kvs-server")
        .unwrap()
        .assert()
        .failure()
        .stderr(contains("USAGE"));
}

// `kvs-server` with only a control port should fail the same way
#[test]
fn server_cli_missing_data_port() {
    Command::cargo_bin("kvs-server")
        .unwrap()
        .args(&["4000"])
        .assert()
        .failure()
        .stderr(contains("DATA_PORT"));
}

#[test]
fn server_cli_invalid_port() {
    Command::cargo_bin("kvs-server")
        .unwrap()
        .args(&["not-a-port", "4001"])
        .assert()
        .failure()
        .stderr(contains("could not parse CONTROL_PORT"));
}

#[test]
fn server_cli_zero_workers() {
    Command::cargo_bin("kvs-server")
        .unwrap()
        .args(&["4000", "4001", "--workers", "0"])
        .assert()
        .failure()
        .stderr(contains("worker count"));
}

#[test]
fn client_cli_invalid_addr() {
    Command::cargo_bin("kvs-client")
        .unwrap()
        .args(&["get", "key", "--addr", "invalid-addr"])
        .assert()
        .failure();
}

#[test]
fn client_cli_no_subcommand() {
    Command::cargo_bin("kvs-client").unwrap().assert().failure();
}

// picks a port that is free right now
fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

// starts the server binary, drives it with the client binary, then shuts it down
#[test]
fn client_and_server_binaries() {
    let cport = free_port();
    let mut dport = free_port();
    while dport == cport {
        dport = free_port();
    }
    let (cport, dport) = (cport.to_string(), dport.to_string());
    let control = format!("127.0.0.1:{}", cport);
    let data = format!("127.0.0.1:{}", dport);

    let mut server = Command::cargo_bin("kvs-server")
        .unwrap()
        .args(&[cport.as_str(), dport.as_str(), "--host", "127.0.0.1"])
        .spawn()
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while control_request(&control, "count").is_err() {
        assert!(Instant::now() < deadline, "server did not start");
        thread::sleep(Duration::from_millis(50));
    }

    Command::cargo_bin("kvs-client")
        .unwrap()
        .args(&["put", "key1", "value1", "--addr", data.as_str()])
        .assert()
        .success()
        .stdout(contains("created"));
    Command::cargo_bin("kvs-client")
        .unwrap()
        .args(&["get", "key1", "--addr", data.as_str()])
        .assert()
        .success()
        .stdout(contains("value1"));
    Command::cargo_bin("kvs-client")
        .unwrap()
        .args(&["get", "key2", "--addr", data.as_str()])
        .assert()
        .success()
        .stdout(contains("Key not found"));
    Command::cargo_bin("kvs-client")
        .unwrap()
        .args(&["delete", "key2", "--addr", data.as_str()])
        .assert()
        .failure();
    Command::cargo_bin("kvs-client")
        .unwrap()
        .args(&["ctl", "count", "--control-addr", control.as_str()])
        .assert()
        .success()
        .stdout(contains("1"));
    Command::cargo_bin("kvs-client")
        .unwrap()
        .args(&["ctl", "shutdown", "--control-addr", control.as_str()])
        .assert()
        .success()
        .stdout(contains("Shutting down"));

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(status) = server.try_wait().unwrap() {
            assert!(status.success());
            break;
        }
        assert!(Instant::now() < deadline, "server did not shut down");
        thread::sleep(Duration::from_millis(50));
    }
}
