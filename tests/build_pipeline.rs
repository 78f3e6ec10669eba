mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{eventually, script_tree, stub_registry};
use glasgow_web::builder::{BuildError, Builder, QueuedBuilder};
use glasgow_web::toolchain::Toolchain;

async fn ready_builder() -> Builder {
    let builder = Builder::spawn(stub_registry()).unwrap();
    builder.packages().await.unwrap();
    builder
}

fn text(lines: &[Vec<u8>]) -> Vec<String> {
    lines
        .iter()
        .map(|line| String::from_utf8_lossy(line).into_owned())
        .collect()
}

#[tokio::test]
async fn builder_is_busy_until_packages_arrive() {
    let builder = Builder::spawn(stub_registry()).unwrap();
    assert!(builder.is_busy());
    let early = builder
        .build(script_tree(&[&["echo-exit", "0"]]), "script.json", |_| {})
        .await;
    assert!(matches!(early, Err(BuildError::Busy)));

    let packages = builder.packages().await.unwrap();
    assert_eq!(packages.get("test-tools").map(String::as_str), Some("1.0"));
    assert!(!builder.is_busy());
}

#[tokio::test]
async fn all_commands_succeed_with_code_zero() {
    let builder = ready_builder().await;
    let mut lines = Vec::new();
    let result = builder
        .build(
            script_tree(&[&["echo-exit", "0", "hello"], &["write", "out/top.bin", "bits"]]),
            "script.json",
            |line| lines.push(line.to_vec()),
        )
        .await
        .unwrap();

    assert_eq!(result.code, 0);
    assert_eq!(result.files.get("out/top.bin"), Some(&b"bits"[..]));
    assert!(result.files.contains("script.json"));
    assert_eq!(
        text(&lines),
        vec![
            "+ echo-exit 0 hello\n",
            "hello\n",
            "+ write out/top.bin bits\n",
        ]
    );
}

#[tokio::test]
async fn controlled_exit_stops_the_script() {
    let builder = ready_builder().await;
    let mut lines = Vec::new();
    let result = builder
        .build(
            script_tree(&[
                &["write", "a.txt", "first"],
                &["echo-exit", "3", "stopping"],
                &["write", "b.txt", "never"],
            ]),
            "script.json",
            |line| lines.push(line.to_vec()),
        )
        .await
        .unwrap();

    assert_eq!(result.code, 3);
    assert!(result.files.contains("a.txt"));
    assert!(!result.files.contains("b.txt"));
    assert!(!text(&lines).iter().any(|line| line.starts_with("+ write b.txt")));
}

#[tokio::test]
async fn output_is_forwarded_in_whole_lines() {
    let builder = ready_builder().await;
    let mut lines = Vec::new();
    builder
        .build(script_tree(&[&["chunks"]]), "script.json", |line| {
            lines.push(line.to_vec())
        })
        .await
        .unwrap();

    assert_eq!(text(&lines), vec!["+ chunks\n", "partial\n", "second line\n"]);
    assert!(lines.iter().all(|line| line.ends_with(b"\n")));
}

#[tokio::test]
async fn unknown_command_fails_the_build() {
    let builder = ready_builder().await;
    let err = builder
        .build(
            script_tree(&[&["write", "a.txt", "x"], &["yosys", "-p", "synth"]]),
            "script.json",
            |_| {},
        )
        .await
        .unwrap_err();
    match err {
        BuildError::Fault(message) => assert!(message.contains("'yosys' is not available")),
        other => panic!("expected fault, got {:?}", other),
    }
}

#[tokio::test]
async fn missing_or_malformed_script_fails() {
    let builder = ready_builder().await;
    let missing = builder
        .build(script_tree(&[]), "other.json", |_| {})
        .await;
    assert!(matches!(missing, Err(BuildError::Fault(m)) if m.contains("not present")));

    let tree = glasgow_web::fs::FileTree::new().with("script.json", b"{not json".to_vec());
    let malformed = builder.build(tree, "script.json", |_| {}).await;
    assert!(matches!(malformed, Err(BuildError::Fault(m)) if m.contains("malformed")));
}

#[tokio::test]
async fn panicking_command_fails_and_worker_survives() {
    let builder = ready_builder().await;
    let err = builder
        .build(script_tree(&[&["panic"]]), "script.json", |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, BuildError::Fault(ref m) if m.contains("synthesis exploded")));

    let result = builder
        .build(script_tree(&[&["echo-exit", "0"]]), "script.json", |_| {})
        .await
        .unwrap();
    assert_eq!(result.code, 0);
}

#[tokio::test]
async fn second_concurrent_build_is_rejected() {
    let builder = Arc::new(ready_builder().await);
    let first = {
        let builder = Arc::clone(&builder);
        tokio::spawn(async move {
            builder
                .build(script_tree(&[&["slow", "200"]]), "script.json", |_| {})
                .await
        })
    };
    assert!(eventually(|| builder.is_busy()).await);

    let second = builder
        .build(script_tree(&[&["echo-exit", "0"]]), "script.json", |_| {})
        .await;
    assert!(matches!(second, Err(BuildError::Busy)));

    assert_eq!(first.await.unwrap().unwrap().code, 0);
    assert!(!builder.is_busy());
}

#[tokio::test]
async fn abandoned_build_does_not_leak_into_the_next() {
    let builder = ready_builder().await;
    let abandoned = tokio::time::timeout(
        Duration::from_millis(20),
        builder.build(
            script_tree(&[&["slow", "150"], &["echo-exit", "9", "stale"]]),
            "script.json",
            |_| {},
        ),
    )
    .await;
    assert!(abandoned.is_err());
    assert!(!builder.is_busy());

    let mut lines = Vec::new();
    let result = builder
        .build(
            script_tree(&[&["echo-exit", "4", "fresh"]]),
            "script.json",
            |line| lines.push(line.to_vec()),
        )
        .await
        .unwrap();
    assert_eq!(result.code, 4);
    assert_eq!(text(&lines), vec!["+ echo-exit 4 fresh\n", "fresh\n"]);
}

#[tokio::test]
async fn queued_builder_serializes_instead_of_failing() {
    let queued = QueuedBuilder::new(Arc::new(Builder::spawn(stub_registry()).unwrap()));
    let (a, b) = tokio::join!(
        queued.build(script_tree(&[&["slow", "30"], &["echo-exit", "1"]]), "script.json", |_| {}),
        queued.build(script_tree(&[&["echo-exit", "2"]]), "script.json", |_| {}),
    );
    assert_eq!(a.unwrap().code, 1);
    assert_eq!(b.unwrap().code, 2);
}

#[tokio::test]
async fn toolchain_reports_packages_and_text_output() {
    let toolchain = Toolchain::load(stub_registry()).await.unwrap();
    assert!(toolchain.available("test-tools"));
    assert!(!toolchain.available("yosys"));
    assert_eq!(toolchain.version("test-tools"), Some("1.0"));

    let mut lines = Vec::new();
    let result = toolchain
        .build(script_tree(&[&["echo-exit", "0", "ok"]]), "script.json", |line| {
            lines.push(line.to_string())
        })
        .await
        .unwrap();
    assert_eq!(result.code, 0);
    assert_eq!(lines, vec!["+ echo-exit 0 ok\n", "ok\n"]);
}
