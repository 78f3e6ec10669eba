//! Line discipline between keystrokes and the reading side.

const CTRL_C: u8 = 0x03;
const CTRL_D: u8 = 0x04;
const BACKSPACE: u8 = 0x08;
const CTRL_U: u8 = 0x15;
const DELETE: u8 = 0x7f;

/// Terminal modes honored by the bridge. All enabled by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Termios {
    /// Canonical mode: input is delivered a line at a time, with editing.
    pub icanon: bool,
    pub echo: bool,
    /// `^C` raises [`Signal::Interrupt`] instead of being delivered.
    pub isig: bool,
    /// Output `\n` becomes `\r\n`.
    pub onlcr: bool,
}

impl Default for Termios {
    fn default() -> Self {
        Self {
            icanon: true,
            echo: true,
            isig: true,
            onlcr: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Interrupt,
}

/// What one batch of input produced.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct InputEffects {
    pub echo: Vec<u8>,
    pub signals: Vec<Signal>,
    pub readable: bool,
}

#[derive(Debug, Default)]
pub(crate) struct LineDiscipline {
    pub termios: Termios,
    line: Vec<u8>,
    readable: Vec<u8>,
    eof: bool,
}

impl LineDiscipline {
    pub fn input(&mut self, bytes: &[u8]) -> InputEffects {
        let mut effects = InputEffects::default();
        let echo = self.termios.echo;
        for &byte in bytes {
            if self.termios.isig && byte == CTRL_C {
                self.line.clear();
                if echo {
                    effects.echo.extend_from_slice(b"^C\r\n");
                }
                effects.signals.push(Signal::Interrupt);
                continue;
            }
            if !self.termios.icanon {
                self.readable.push(byte);
                if echo {
                    effects.echo.push(byte);
                }
                effects.readable = true;
                continue;
            }
            match byte {
                b'\r' | b'\n' => {
                    self.line.push(b'\n');
                    self.readable.append(&mut self.line);
                    if echo {
                        effects.echo.extend_from_slice(b"\r\n");
                    }
                    effects.readable = true;
                }
                BACKSPACE | DELETE => {
                    if pop_char(&mut self.line) && echo {
                        effects.echo.extend_from_slice(b"\x08 \x08");
                    }
                }
                CTRL_U => {
                    while pop_char(&mut self.line) {
                        if echo {
                            effects.echo.extend_from_slice(b"\x08 \x08");
                        }
                    }
                }
                CTRL_D => {
                    if self.line.is_empty() {
                        self.eof = true;
                    } else {
                        self.readable.append(&mut self.line);
                    }
                    effects.readable = true;
                }
                other => {
                    self.line.push(other);
                    if echo {
                        effects.echo.push(other);
                    }
                }
            }
        }
        effects
    }

    /// Drain what the reader may consume. An empty vector marks end of
    /// input; `None` means nothing is ready yet.
    pub fn take_readable(&mut self) -> Option<Vec<u8>> {
        if !self.readable.is_empty() {
            return Some(std::mem::take(&mut self.readable));
        }
        if std::mem::take(&mut self.eof) {
            return Some(Vec::new());
        }
        None
    }

    pub fn output(&self, bytes: &[u8]) -> Vec<u8> {
        if !self.termios.onlcr {
            return bytes.to_vec();
        }
        let mut out = Vec::with_capacity(bytes.len());
        for &byte in bytes {
            if byte == b'\n' {
                out.push(b'\r');
            }
            out.push(byte);
        }
        out
    }
}

/// Remove the last UTF-8 character. Returns false if the line was empty.
fn pop_char(line: &mut Vec<u8>) -> bool {
    let Some(mut last) = line.pop() else {
        return false;
    };
    while last & 0xC0 == 0x80 {
        match line.pop() {
            Some(byte) => last = byte,
            None => break,
        }
    }
    true
}
