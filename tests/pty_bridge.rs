use std::sync::Arc;

use glasgow_web::pty::{self, PtyOutput, PtySize, Signal, Termios};
use parking_lot::Mutex;

fn drain(output: &mut PtyOutput) -> Vec<u8> {
    let mut bytes = Vec::new();
    while let Some(chunk) = output.try_recv() {
        bytes.extend_from_slice(&chunk);
    }
    bytes
}

#[tokio::test]
async fn keystrokes_are_echoed_and_delivered_per_line() {
    let (master, slave, mut output) = pty::open(PtySize::default());
    master.feed_input(b"build top");
    assert_eq!(drain(&mut output), b"build top");

    master.feed_input(b" s.json\r");
    assert_eq!(drain(&mut output), b" s.json\r\n");
    assert_eq!(slave.read().await, b"build top s.json\n");
}

#[tokio::test]
async fn line_editing_happens_before_delivery() {
    let (master, slave, mut output) = pty::open(PtySize::default());
    master.feed_input("lsx\x7f -é\x7fl\n".as_bytes());
    assert_eq!(slave.read().await, b"ls -l\n");
    let echoed = drain(&mut output);
    assert!(echoed.windows(3).any(|w| w == b"\x08 \x08"));
}

#[tokio::test]
async fn ctrl_c_discards_the_line_and_signals() {
    let (master, slave, mut output) = pty::open(PtySize::default());
    let signals = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&signals);
    slave.on_signal(move |signal| seen.lock().push(signal));

    master.feed_input(b"half a command\x03");
    assert_eq!(*signals.lock(), vec![Signal::Interrupt]);
    assert!(drain(&mut output).ends_with(b"^C\r\n"));

    master.feed_input(b"next\n");
    assert_eq!(slave.read().await, b"next\n");
}

#[tokio::test]
async fn program_output_gets_carriage_returns() {
    let (_master, slave, mut output) = pty::open(PtySize::default());
    assert_eq!(slave.write(b"one\ntwo\n"), 8);
    assert_eq!(drain(&mut output), b"one\r\ntwo\r\n");

    slave.set_termios(Termios {
        onlcr: false,
        ..slave.termios()
    });
    slave.write(b"raw\n");
    assert_eq!(drain(&mut output), b"raw\n");
}

#[tokio::test]
async fn non_canonical_mode_delivers_bytes_immediately() {
    let (master, slave, _output) = pty::open(PtySize::default());
    slave.set_termios(Termios {
        icanon: false,
        echo: false,
        ..Termios::default()
    });
    master.feed_input(b"q");
    assert_eq!(slave.read().await, b"q");
}

#[tokio::test]
async fn ctrl_d_on_empty_line_is_end_of_input() {
    let (master, slave, _output) = pty::open(PtySize::default());
    master.feed_input(b"\x04");
    assert!(slave.read().await.is_empty());
}

#[tokio::test]
async fn ending_the_session_wakes_readers_and_closes_output() {
    let (master, slave, mut output) = pty::open(PtySize::default());
    let reader = tokio::spawn(async move { slave.read().await });
    tokio::task::yield_now().await;

    master.end_session();
    assert!(reader.await.unwrap().is_empty());
    assert_eq!(output.recv().await, None);
}

#[test]
fn resize_is_visible_to_the_program() {
    let (master, slave, _output) = pty::open(PtySize { cols: 80, rows: 24 });
    assert_eq!(slave.columns(), 80);
    master.resize(PtySize { cols: 132, rows: 40 });
    assert_eq!(slave.columns(), 132);
    assert_eq!(master.size().rows, 40);
}
