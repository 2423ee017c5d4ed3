mod common;

use std::net::TcpListener;
use std::time::Duration;

use bytes::Bytes;
use ssdb_client::{Arg, ClientError, Commands, ConnectOptions, Connection};

use common::{blocks, MockServer, Reply};

fn options() -> ConnectOptions {
    ConnectOptions {
        connect_timeout: Some(Duration::from_secs(2)),
        read_timeout: Some(Duration::from_secs(2)),
        write_timeout: Some(Duration::from_secs(2)),
    }
}

fn connect(server: &MockServer) -> Connection {
    Connection::connect(&server.addr(), &options()).expect("connect")
}

/// Answers `ok` followed by every block it received, command name included.
fn echo_handler(cmd: &[Vec<u8>]) -> Reply {
    let mut out = vec![b"ok".to_vec()];
    out.extend(cmd.iter().cloned());
    Reply::Blocks(out)
}

#[test]
fn arguments_of_every_kind_reach_the_server() {
    let server = MockServer::spawn(echo_handler);
    let mut conn = connect(&server);

    let pairs = vec!["k1".to_string(), "v\n1".to_string()];
    let raw: &[u8] = &[0, 255, b'\n', 7];
    let response = conn
        .execute(
            "mixed",
            &[
                Arg::from(-12i32),
                Arg::from(9_000_000_000i64),
                Arg::from("text"),
                Arg::from(b'z'),
                Arg::from(raw),
                Arg::from(&pairs),
            ],
        )
        .expect("execute");

    let payload = response.payload().expect("ok status");
    let expected: [&[u8]; 8] = [
        b"mixed",
        b"-12",
        b"9000000000",
        b"text",
        b"z",
        raw,
        b"k1",
        b"v\n1",
    ];
    assert_eq!(payload.len(), expected.len());
    for (got, want) in payload.iter().zip(expected) {
        assert_eq!(got.as_ref(), want);
    }
    assert_eq!(server.commands()[0].len(), 8);
}

#[test]
fn payload_with_newlines_is_read_by_length() {
    let server = MockServer::spawn(|_| blocks(&["ok", "first\nsecond\n\nthird"]));
    let mut conn = connect(&server);

    assert_eq!(conn.get("key").expect("get"), "first\nsecond\n\nthird");
    // The stream stays in sync for the next exchange.
    assert_eq!(conn.get("key").expect("get"), "first\nsecond\n\nthird");
}

#[test]
fn carriage_returns_in_size_lines_are_tolerated() {
    let server = MockServer::spawn(|_| Reply::Raw(b"2\r\nok\r\n5\r\nhello\r\n\r\n".to_vec()));
    let mut conn = connect(&server);

    assert_eq!(conn.get("key").expect("get"), "hello");
    assert!(conn.is_connected());
}

#[test]
fn block_split_across_writes_is_completed() {
    let server = MockServer::spawn(|cmd| match cmd[0].as_slice() {
        b"get" => Reply::Trickle(vec![
            b"2\nok\n1".to_vec(),
            b"1\nhello ".to_vec(),
            b"wor".to_vec(),
            b"ld\n".to_vec(),
            b"\n".to_vec(),
        ]),
        _ => blocks(&["ok", "1"]),
    });
    let mut conn = connect(&server);

    assert_eq!(conn.get("key").expect("get"), "hello world");
    assert!(conn.is_connected());
    assert!(conn.exists("key").expect("exists"));
    assert_eq!(conn.get("key").expect("get"), "hello world");
}

#[test]
fn bare_terminator_is_an_empty_response() {
    let server = MockServer::spawn(|cmd| match cmd[0].as_slice() {
        b"empty" => Reply::Raw(b"\n".to_vec()),
        _ => blocks(&["ok", "after"]),
    });
    let mut conn = connect(&server);

    let response = conn.execute("empty", &[]).expect("execute");
    assert!(response.is_empty());
    assert!(matches!(response.ok(), Err(ClientError::UnexpectedResponse(_))));

    assert!(conn.is_connected());
    assert_eq!(conn.get("key").expect("get"), "after");
}

#[test]
fn error_status_keeps_connection_usable() {
    let server = MockServer::spawn(|cmd| match cmd[0].as_slice() {
        b"get" => blocks(&["not_found"]),
        _ => blocks(&["ok", "1"]),
    });
    let mut conn = connect(&server);

    match conn.get("missing") {
        Err(ClientError::Server(message)) => assert_eq!(message, "not_found"),
        other => panic!("expected server error, got {:?}", other),
    }
    assert!(conn.is_connected());
    assert!(conn.err().is_none());
    assert!(conn.exists("present").expect("exists"));
}

#[test]
fn peer_hangup_breaks_connection_for_good() {
    let server = MockServer::spawn(|cmd| match cmd[0].as_slice() {
        b"boom" => Reply::Close,
        _ => blocks(&["ok"]),
    });
    let mut conn = connect(&server);

    conn.set("a", "b").expect("set");
    let err = conn.execute("boom", &[]).unwrap_err();
    assert!(err.is_connection_error(), "{err:?}");
    assert!(conn.err().is_some());
    assert!(!conn.is_connected());

    let err = conn.set("a", "b").unwrap_err();
    assert!(matches!(err, ClientError::BrokenConnection(_)));
    // Only the set and the boom ever reached the server.
    assert_eq!(server.commands().len(), 2);
}

#[test]
fn malformed_size_line_breaks_connection() {
    let server = MockServer::spawn(|_| Reply::Raw(b"two\nok\n\n".to_vec()));
    let mut conn = connect(&server);

    let err = conn.get("key").unwrap_err();
    assert!(matches!(err, ClientError::Protocol(_)));
    assert!(matches!(
        conn.get("key").unwrap_err(),
        ClientError::BrokenConnection(_)
    ));
}

#[test]
fn send_and_flush_can_batch_requests() {
    let server = MockServer::spawn(echo_handler);
    let mut conn = connect(&server);

    conn.send("first", &[Arg::from(1i64)]).expect("send");
    conn.send("second", &[Arg::from(2i64)]).expect("send");
    conn.flush().expect("flush");

    let first = conn.receive().expect("receive");
    let second = conn.receive().expect("receive");
    assert_eq!(first.blocks()[1], Bytes::from_static(b"first"));
    assert_eq!(second.blocks()[1], Bytes::from_static(b"second"));
    assert_eq!(second.blocks()[2], Bytes::from_static(b"2"));
}

#[test]
fn closed_connection_rejects_commands() {
    let server = MockServer::spawn(common::ok_handler);
    let mut conn = connect(&server);

    conn.close();
    assert!(!conn.is_connected());
    assert!(matches!(
        conn.execute("get", &[Arg::from("k")]).unwrap_err(),
        ClientError::BrokenConnection(_)
    ));
}

#[test]
fn typed_commands_send_expected_blocks() {
    let server = MockServer::spawn(|cmd| match cmd[0].as_slice() {
        b"zscan" => blocks(&["ok", "a", "1", "b", "2"]),
        b"multi_get" => blocks(&["ok", "k1", "v1", "k2", "v2"]),
        b"incr" | b"qsize" => blocks(&["ok", "11"]),
        b"hkeys" => blocks(&["ok", "f1", "f2"]),
        _ => blocks(&["ok"]),
    });
    let mut conn = connect(&server);

    assert_eq!(conn.incr("counter", 10).expect("incr"), 11);
    let scores = conn.zscan("board", "", 0, 100, 10).expect("zscan");
    assert_eq!(scores["a"], 1);
    assert_eq!(scores["b"], 2);
    let values = conn.multi_get(&["k1", "k2"]).expect("multi_get");
    assert_eq!(values["k2"], "v2");
    assert_eq!(conn.hkeys("h", "", "", 5).expect("hkeys"), vec!["f1", "f2"]);
    conn.multi_zset("board", &[("a", 1), ("b", -2)]).expect("multi_zset");
    conn.setx("session", "token", 30).expect("setx");
    assert_eq!(conn.qsize("jobs").expect("qsize"), 11);

    let commands = server.commands();
    let as_text = |cmd: &Vec<Vec<u8>>| -> Vec<String> {
        cmd.iter().map(|b| String::from_utf8_lossy(b).into_owned()).collect()
    };
    assert_eq!(as_text(&commands[0]), ["incr", "counter", "10"]);
    assert_eq!(as_text(&commands[1]), ["zscan", "board", "", "0", "100", "10"]);
    assert_eq!(as_text(&commands[2]), ["multi_get", "k1", "k2"]);
    assert_eq!(as_text(&commands[3]), ["hkeys", "h", "", "", "5"]);
    assert_eq!(as_text(&commands[4]), ["multi_zset", "board", "a", "1", "b", "-2"]);
    assert_eq!(as_text(&commands[5]), ["setx", "session", "token", "30"]);
    assert_eq!(as_text(&commands[6]), ["qsize", "jobs"]);
}

#[test]
fn refused_dial_is_io_error() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr").port()
    };
    let err = Connection::connect(&format!("127.0.0.1:{port}"), &options()).unwrap_err();
    assert!(matches!(err, ClientError::Io(_)));
}

#[test]
fn unparsable_address_is_rejected() {
    let err = Connection::connect("not-an-address", &options()).unwrap_err();
    assert!(matches!(err, ClientError::InvalidAddress(_)));
}
