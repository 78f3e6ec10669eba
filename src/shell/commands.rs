use std::time::Duration;

use crate::controller::SessionHooks;
use crate::fs::{path, EntryKind, FileTree, FsError, FsMirror};

use super::{Flow, ShellError, ToolShell};

const HELP: &str = "\
commands:
  help                      show this message
  packages                  list toolchain packages and installed locators
  build <dir> <script>      run the build script found in <dir>
  ls [dir]                  list a directory (default: home)
  cat <file>                print a file
  echo [words...]           print words
  sleep <seconds>           wait, interruptibly
  spin <iterations>         busy loop with interrupt check points
  exit                      leave the shell
";

/// Iterations between interrupt-flag checks in `spin`.
const CHECK_INTERVAL: u64 = 4096;

impl ToolShell {
    pub(super) async fn dispatch(
        &self,
        hooks: &SessionHooks,
        words: &[String],
    ) -> Result<Flow, ShellError> {
        let (name, args) = match words.split_first() {
            Some((name, args)) => (name.as_str(), args),
            None => return Ok(Flow::Continue),
        };
        match name {
            "help" => self.write_stdout(HELP.as_bytes()),
            "packages" => self.packages(),
            "build" => self.build(hooks, args).await?,
            "ls" => self.ls(hooks, args)?,
            "cat" => self.cat(hooks, args)?,
            "echo" => {
                let mut text = args.join(" ");
                text.push('\n');
                self.write_stdout(text.as_bytes());
            }
            "sleep" => sleep(args).await?,
            "spin" => self.spin(hooks, args)?,
            "exit" => return Ok(Flow::Exit),
            other => return Err(ShellError::UnknownCommand(other.to_string())),
        }
        Ok(Flow::Continue)
    }

    fn packages(&self) {
        let mut listing = String::new();
        if let Some(toolchain) = self.toolchain.as_deref() {
            for (name, version) in toolchain.packages() {
                listing.push_str(&format!("{} {}\n", name, version));
            }
        }
        for locator in self.installed() {
            listing.push_str(&format!("{} (installed)\n", locator));
        }
        if listing.is_empty() {
            listing.push_str("no packages\n");
        }
        self.write_stdout(listing.as_bytes());
    }

    async fn build(&self, hooks: &SessionHooks, args: &[String]) -> Result<(), ShellError> {
        let [dir, script] = args else {
            return Err(ShellError::Usage("usage: build <dir> <script>".to_string()));
        };
        let toolchain = self.toolchain()?;
        let fs = filesystem(hooks)?;
        let dir = resolve(&fs, dir)?;

        let files = FileTree::from_fs(&fs, &dir)?;
        let result = toolchain
            .build(files, script, |line| self.write_stdout(line.as_bytes()))
            .await?;
        result.files.write_to_fs(&fs, &dir)?;

        if result.code != 0 {
            return Err(ShellError::ExitStatus { code: result.code });
        }
        Ok(())
    }

    fn ls(&self, hooks: &SessionHooks, args: &[String]) -> Result<(), ShellError> {
        let fs = filesystem(hooks)?;
        let dir = match args {
            [] => fs.layout().home_directory.clone(),
            [dir] => resolve(&fs, dir)?,
            _ => return Err(ShellError::Usage("usage: ls [dir]".to_string())),
        };

        let mut names = Vec::new();
        for name in fs.readdir(&dir)? {
            let child = path::join(&dir, &name);
            match fs.stat(&child) {
                Ok(EntryKind::Directory) => names.push(format!("{}/", name)),
                _ => names.push(name),
            }
        }
        let listing = columnize(&names, hooks.terminal_columns());
        self.write_stdout(listing.as_bytes());
        Ok(())
    }

    fn cat(&self, hooks: &SessionHooks, args: &[String]) -> Result<(), ShellError> {
        let [file] = args else {
            return Err(ShellError::Usage("usage: cat <file>".to_string()));
        };
        let fs = filesystem(hooks)?;
        let bytes = fs.read_file(&resolve(&fs, file)?)?;
        self.write_stdout(&bytes);
        Ok(())
    }

    /// Busy loop that only notices interrupts at its check points.
    fn spin(&self, hooks: &SessionHooks, args: &[String]) -> Result<(), ShellError> {
        let [count] = args else {
            return Err(ShellError::Usage("usage: spin <iterations>".to_string()));
        };
        let count: u64 = count
            .parse()
            .map_err(|_| ShellError::Usage(format!("spin: invalid iteration count '{}'", count)))?;

        // This loop never yields, so a pending waiter could not be observed.
        hooks.set_interrupt_waiter(None);
        let flag = self.interrupt_flag();
        let mut state = 0u64;
        for iteration in 0..count {
            if iteration % CHECK_INTERVAL == 0 && flag.take() {
                return Err(ShellError::Interrupted);
            }
            state = std::hint::black_box(state.wrapping_mul(6364136223846793005).wrapping_add(1));
        }
        Ok(())
    }
}

async fn sleep(args: &[String]) -> Result<(), ShellError> {
    let [seconds] = args else {
        return Err(ShellError::Usage("usage: sleep <seconds>".to_string()));
    };
    let duration = seconds
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .ok_or_else(|| ShellError::Usage(format!("sleep: invalid duration '{}'", seconds)))?;
    tokio::time::sleep(duration).await;
    Ok(())
}

fn filesystem(hooks: &SessionHooks) -> Result<FsMirror, ShellError> {
    hooks.filesystem().ok_or(ShellError::Detached)
}

/// Absolute arguments are taken as is; others are relative to home.
fn resolve(fs: &FsMirror, arg: &str) -> Result<String, FsError> {
    if arg.starts_with('/') {
        path::normalize(arg)
    } else {
        path::normalize(&path::join(&fs.layout().home_directory, arg))
    }
}

/// Lay names out row by row in equal-width columns fitting `width`.
fn columnize(names: &[String], width: u16) -> String {
    if names.is_empty() {
        return String::new();
    }
    let cell = names.iter().map(|name| name.chars().count()).max().unwrap_or(0) + 2;
    let per_row = (usize::from(width) / cell).max(1);

    let mut out = String::new();
    for row in names.chunks(per_row) {
        let last = row.len() - 1;
        for (index, name) in row.iter().enumerate() {
            if index == last {
                out.push_str(name);
            } else {
                out.push_str(&format!("{:<cell$}", name, cell = cell));
            }
        }
        out.push('\n');
    }
    out
}
