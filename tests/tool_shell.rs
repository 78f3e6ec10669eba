mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{eventually, memory_mirror, stub_registry};
use glasgow_web::controller::{InterpreterError, SessionController, SessionError, SessionState};
use glasgow_web::fs::{FsMirror, MemoryStore};
use glasgow_web::pty::{self, PtyMaster, PtyOutput, PtySize};
use glasgow_web::shell::{ShellOptions, ToolShell};
use glasgow_web::toolchain::Toolchain;

struct Harness {
    master: PtyMaster,
    output: PtyOutput,
    seen: String,
    controller: SessionController,
    fs: FsMirror,
    store: Arc<MemoryStore>,
}

impl Harness {
    fn new(toolchain: Option<Arc<Toolchain>>, max_failures: u32) -> Self {
        let (master, slave, output) = pty::open(PtySize::default());
        let (fs, store) = memory_mirror(false);
        let shell = Arc::new(ToolShell::new(ShellOptions { max_failures }, toolchain));
        let controller = SessionController::new(shell, fs.clone());

        let interrupts = controller.clone();
        slave.on_signal(move |_| {
            interrupts.interrupt();
        });
        controller.setup_input_output(Arc::new(slave)).unwrap();

        Self {
            master,
            output,
            seen: String::new(),
            controller,
            fs,
            store,
        }
    }

    fn type_keys(&self, keys: &str) {
        self.master.feed_input(keys.as_bytes());
    }

    fn collect(&mut self) -> &str {
        while let Some(chunk) = self.output.try_recv() {
            self.seen.push_str(&String::from_utf8_lossy(&chunk));
        }
        &self.seen
    }

    async fn wait_for(&mut self, needle: &str) {
        let deadline = tokio::time::timeout(Duration::from_secs(5), async {
            while !self.seen.contains(needle) {
                match self.output.recv().await {
                    Some(chunk) => self.seen.push_str(&String::from_utf8_lossy(&chunk)),
                    None => break,
                }
            }
        })
        .await;
        assert!(
            deadline.is_ok() && self.seen.contains(needle),
            "never saw {:?} in {:?}",
            needle,
            self.seen
        );
    }

    fn start_repl(&self) -> tokio::task::JoinHandle<Result<Option<String>, SessionError>> {
        let controller = self.controller.clone();
        tokio::spawn(async move { controller.run_code("repl").await })
    }
}

#[tokio::test]
async fn run_code_executes_each_line() {
    let mut shell = Harness::new(None, 3);
    shell
        .controller
        .run_code("echo hello world\n\necho 'quoted  words'")
        .await
        .unwrap();
    let out = shell.collect();
    assert!(out.contains("hello world\r\n"));
    assert!(out.contains("quoted  words\r\n"));
}

#[tokio::test]
async fn each_command_is_one_execution_unit() {
    let shell = Harness::new(None, 3);
    let starts = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&starts);
    shell.controller.on_execution_start(move || {
        seen.fetch_add(1, Ordering::SeqCst);
    });

    shell.controller.run_code("echo a\necho b\n").await.unwrap();
    assert_eq!(starts.load(Ordering::SeqCst), 2);
    assert_eq!(shell.controller.state(), SessionState::Ready);
}

#[tokio::test]
async fn changes_are_pushed_after_each_command() {
    let shell = Harness::new(None, 3);
    shell.fs.mount_home().await.unwrap();
    shell.fs.write_file("/root/top.v", b"module top;".to_vec()).unwrap();
    assert!(shell.store.snapshot().is_empty());

    shell.controller.run_code("echo").await.unwrap();
    assert!(shell.store.snapshot().entries.contains_key("top.v"));
}

#[tokio::test]
async fn unknown_command_raises() {
    let shell = Harness::new(None, 3);
    let err = shell.controller.run_code("synthesize").await.unwrap_err();
    match err {
        SessionError::Interpreter(InterpreterError::Raised { kind, message }) => {
            assert_eq!(kind, "CommandNotFound");
            assert_eq!(message, "synthesize: command not found");
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn ls_and_cat_resolve_relative_to_home() {
    let mut shell = Harness::new(None, 3);
    shell.fs.write_file("/root/top.v", b"module top;\n".to_vec()).unwrap();
    shell.fs.write_file("/root/pins/board.pcf", Vec::new()).unwrap();

    shell.controller.run_code("ls\ncat top.v\nls /root/pins").await.unwrap();
    let out = shell.collect();
    assert!(out.contains("pins/"));
    assert!(out.contains("top.v"));
    assert!(out.contains("module top;\r\n"));
    assert!(out.contains("board.pcf\r\n"));
}

#[tokio::test]
async fn help_lists_commands() {
    let mut shell = Harness::new(None, 3);
    shell.controller.run_code("help").await.unwrap();
    let out = shell.collect();
    for command in ["build", "spin", "sleep", "exit"] {
        assert!(out.contains(command), "help is missing {}", command);
    }
}

#[tokio::test]
async fn build_runs_the_toolchain_and_writes_results_back() {
    let toolchain = Arc::new(Toolchain::load(stub_registry()).await.unwrap());
    let mut shell = Harness::new(Some(toolchain), 3);
    let script = r#"{"commands": [["write", "out.bin", "bits"], ["echo-exit", "0", "done"]]}"#;
    shell
        .fs
        .write_file("/root/proj/build.json", script.as_bytes().to_vec())
        .unwrap();

    shell.controller.run_code("build proj build.json").await.unwrap();
    assert_eq!(shell.fs.read_file("/root/proj/out.bin").unwrap(), b"bits");
    let out = shell.collect();
    assert!(out.contains("+ write out.bin bits\r\n"));
    assert!(out.contains("done\r\n"));
}

#[tokio::test]
async fn failing_build_reports_its_exit_code() {
    let toolchain = Arc::new(Toolchain::load(stub_registry()).await.unwrap());
    let shell = Harness::new(Some(toolchain), 3);
    shell
        .fs
        .write_file("/root/proj/s.json", br#"{"commands": [["echo-exit", "5"]]}"#.to_vec())
        .unwrap();

    let err = shell.controller.run_code("build proj s.json").await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Interpreter(InterpreterError::Raised { ref kind, ref message })
            if kind == "SystemExit" && message == "build exited with code 5"
    ));
}

#[tokio::test]
async fn build_without_toolchain_is_an_error() {
    let shell = Harness::new(None, 3);
    let err = shell.controller.run_code("build proj s.json").await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Interpreter(InterpreterError::Raised { ref kind, .. }) if kind == "RuntimeError"
    ));
}

#[tokio::test]
async fn packages_lists_toolchain_and_installed_locators() {
    let toolchain = Arc::new(Toolchain::load(stub_registry()).await.unwrap());
    let mut shell = Harness::new(Some(toolchain), 3);
    shell.controller.install("amaranth").await.unwrap();
    shell.controller.run_code("packages").await.unwrap();
    let out = shell.collect();
    assert!(out.contains("test-tools 1.0\r\n"));
    assert!(out.contains("amaranth (installed)\r\n"));
}

#[tokio::test]
async fn repl_prompts_runs_and_exits() {
    let mut shell = Harness::new(None, 3);
    let repl = shell.start_repl();

    shell.wait_for("\r\n> glasgow ").await;
    shell.type_keys("echo hi there\r");
    shell.wait_for("hi there\r\n\r\n> glasgow ").await;
    shell.type_keys("exit\r");

    let result = tokio::time::timeout(Duration::from_secs(5), repl).await;
    assert_eq!(result.unwrap().unwrap().unwrap(), None);
}

#[tokio::test]
async fn repl_gives_up_after_consecutive_failures() {
    let mut shell = Harness::new(None, 2);
    let repl = shell.start_repl();

    shell.type_keys("nope\rnope\r");
    shell.wait_for("Too many errors, giving up.").await;
    assert!(shell.seen.contains("\x1b[1;31mCommandNotFound: nope: command not found"));

    let result = tokio::time::timeout(Duration::from_secs(5), repl).await;
    assert!(result.unwrap().unwrap().is_ok());
}

#[tokio::test]
async fn success_resets_the_failure_count() {
    let mut shell = Harness::new(None, 2);
    let repl = shell.start_repl();

    shell.type_keys("\"unbalanced\recho ok\rnope\rexit\r");
    tokio::time::timeout(Duration::from_secs(5), repl)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let out = shell.collect();
    assert!(out.contains("SyntaxError: No closing quotation"));
    assert!(out.contains("CommandNotFound"));
    assert!(!out.contains("Too many errors, giving up."));
}

#[tokio::test]
async fn end_of_input_leaves_the_repl() {
    let mut shell = Harness::new(None, 3);
    let repl = shell.start_repl();
    shell.wait_for("> glasgow ").await;
    shell.type_keys("\x04");

    let result = tokio::time::timeout(Duration::from_secs(5), repl).await;
    assert!(result.unwrap().unwrap().is_ok());
    assert!(!shell.collect().contains("giving up"));
}

#[tokio::test]
async fn ctrl_c_cancels_a_sleep_without_counting_a_failure() {
    let mut shell = Harness::new(None, 1);
    let repl = shell.start_repl();

    shell.type_keys("sleep 30\r");
    let controller = shell.controller.clone();
    assert!(eventually(|| controller.state() == SessionState::Running).await);
    shell.type_keys("\x03");
    assert!(eventually(|| controller.state() == SessionState::Ready).await);

    shell.type_keys("exit\r");
    tokio::time::timeout(Duration::from_secs(5), repl)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let out = shell.collect();
    assert!(out.contains("^C"));
    assert!(!out.contains("giving up"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ctrl_c_stops_a_busy_loop_at_a_check_point() {
    let mut shell = Harness::new(None, 1);
    let repl = shell.start_repl();

    shell.type_keys("spin 100000000000\r");
    let controller = shell.controller.clone();
    assert!(eventually(|| controller.state() == SessionState::Running).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    shell.type_keys("\x03");
    assert!(eventually(|| controller.state() == SessionState::Ready).await);

    shell.type_keys("exit\r");
    tokio::time::timeout(Duration::from_secs(5), repl)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(!shell.collect().contains("giving up"));
}
