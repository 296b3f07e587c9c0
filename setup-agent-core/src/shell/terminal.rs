//! Byte-level terminal backends.
//!
//! A [`Terminal`] accepts input bytes and delivers output chunks through a
//! channel. [`PtyTerminal`] runs a login shell under a pseudo-terminal;
//! [`FakeTerminal`] replays canned output for tests.

use portable_pty::{Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use setup_agent_error::{Error, Result};
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;

pub trait Terminal: Send {
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Output chunks; `None` once the terminal is closed
    fn output(&mut self) -> &mut mpsc::UnboundedReceiver<Vec<u8>>;

    fn close(&mut self);
}

#[derive(Debug, Clone)]
pub struct PtyOptions {
    /// Shell binary; defaults to `$SHELL`, then `/bin/zsh`
    pub shell: String,
    pub cols: u16,
    pub rows: u16,
    pub read_buffer_size: usize,
    pub cwd: Option<std::path::PathBuf>,
}

impl Default for PtyOptions {
    fn default() -> Self {
        Self {
            shell: std::env::var("SHELL").unwrap_or_else(|_| "/bin/zsh".to_string()),
            cols: 200,
            rows: 50,
            read_buffer_size: 65536,
            cwd: None,
        }
    }
}

/// A login shell under a PTY
pub struct PtyTerminal {
    // dropping the master closes the PTY
    _master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
    writer: Option<Box<dyn Write + Send>>,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

fn pty_error(message: &str, e: impl std::fmt::Display) -> Error {
    Error::shell_failed(format!("{}: {}", message, e)).with_operation("pty_terminal::spawn")
}

impl PtyTerminal {
    pub fn spawn(options: &PtyOptions) -> Result<Self> {
        let pty_system = portable_pty::native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: options.rows,
                cols: options.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| pty_error("failed to create PTY", e))?;

        let mut cmd = CommandBuilder::new(&options.shell);
        cmd.arg("-l");
        if let Some(cwd) = &options.cwd {
            cmd.cwd(cwd);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| pty_error("failed to spawn shell", e))?;
        tracing::debug!(shell = %options.shell, "spawned shell in PTY");

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| pty_error("failed to take PTY writer", e))?;
        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| pty_error("failed to clone PTY reader", e))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let buffer_size = options.read_buffer_size;
        thread::spawn(move || {
            let mut buf = vec![0u8; buffer_size];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => {
                        tracing::debug!("EOF on PTY reader");
                        break;
                    }
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(Duration::from_millis(10));
                    }
                    Err(e) => {
                        tracing::debug!("PTY read error: {}", e);
                        break;
                    }
                }
            }
        });

        Ok(Self {
            _master: pair.master,
            child,
            writer: Some(writer),
            rx,
        })
    }
}

impl Terminal for PtyTerminal {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            Error::shell_failed("shell is closed").with_operation("pty_terminal::write")
        })?;
        writer
            .write_all(bytes)
            .and_then(|_| writer.flush())
            .map_err(|e| {
                Error::shell_failed("failed to write to shell")
                    .with_operation("pty_terminal::write")
                    .set_source(e)
            })
    }

    fn output(&mut self) -> &mut mpsc::UnboundedReceiver<Vec<u8>> {
        &mut self.rx
    }

    fn close(&mut self) {
        self.writer.take();
        if let Err(e) = self.child.kill() {
            tracing::debug!("failed to kill shell: {}", e);
        }
    }
}

impl Drop for PtyTerminal {
    fn drop(&mut self) {
        self.close();
    }
}

/// Replays scripted output: every write releases the next queued response
pub struct FakeTerminal {
    responses: VecDeque<Vec<String>>,
    tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    written: Arc<Mutex<Vec<String>>>,
}

impl Default for FakeTerminal {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeTerminal {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            responses: VecDeque::new(),
            tx: Some(tx),
            rx,
            written: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A fake shell that answers its startup line with a prompt
    pub fn ready() -> Self {
        Self::new().respond(["$ "])
    }

    /// Output chunks emitted after the next write
    pub fn respond<I, S>(mut self, chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.responses
            .push_back(chunks.into_iter().map(Into::into).collect());
        self
    }

    /// Extra handle for pushing output that no write triggers
    pub fn sender(&self) -> Option<mpsc::UnboundedSender<Vec<u8>>> {
        self.tx.clone()
    }

    /// Everything written so far, shared so tests can inspect it after the
    /// terminal has moved into a shell
    pub fn written(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.written)
    }
}

impl Terminal for FakeTerminal {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let tx = self.tx.as_ref().ok_or_else(|| {
            Error::shell_failed("shell is closed").with_operation("fake_terminal::write")
        })?;
        if let Ok(mut written) = self.written.lock() {
            written.push(String::from_utf8_lossy(bytes).into_owned());
        }
        if let Some(chunks) = self.responses.pop_front() {
            for chunk in chunks {
                let _ = tx.send(chunk.into_bytes());
            }
        }
        Ok(())
    }

    fn output(&mut self) -> &mut mpsc::UnboundedReceiver<Vec<u8>> {
        &mut self.rx
    }

    fn close(&mut self) {
        self.tx.take();
    }
}
