use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

/// Scripted stand-in for the instrument's shell.
///
/// Every `\r`-terminated line written to it is recorded, echoed back with
/// `\r\n` (unless echo is disabled) and answered with the next scripted
/// response for that command, or with a bare prompt. Reads with nothing
/// queued stay pending until the next write queues a reply.
#[derive(Clone, Default)]
pub(crate) struct FakeInstrument {
    state: Arc<Mutex<FakeState>>,
}

#[derive(Default)]
struct FakeState {
    no_echo: bool,
    outgoing: VecDeque<u8>,
    incoming: Vec<u8>,
    commands: Vec<String>,
    responses: HashMap<String, VecDeque<Vec<u8>>>,
    reader: Option<Waker>,
}

impl FakeInstrument {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Bytes already waiting on the line before the first command.
    pub(crate) fn with_pending(self, bytes: &[u8]) -> Self {
        self.lock().outgoing.extend(bytes);
        self
    }

    pub(crate) fn without_echo(self) -> Self {
        self.lock().no_echo = true;
        self
    }

    /// Queues a raw reply (body and trailing prompt) for `cmd`.
    pub(crate) fn respond(self, cmd: &str, reply: &[u8]) -> Self {
        self.lock()
            .responses
            .entry(cmd.to_string())
            .or_default()
            .push_back(reply.to_vec());
        self
    }

    /// Command lines received so far, without terminator.
    pub(crate) fn commands(&self) -> Vec<String> {
        self.lock().commands.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }
}

impl FakeState {
    fn receive(&mut self, buf: &[u8]) {
        for &b in buf {
            if b != b'\r' {
                self.incoming.push(b);
                continue;
            }
            let line = String::from_utf8_lossy(&self.incoming).to_string();
            self.incoming.clear();
            if !self.no_echo {
                self.outgoing.extend(line.as_bytes());
                self.outgoing.extend(b"\r\n");
            }
            let reply = self
                .responses
                .get_mut(&line)
                .and_then(|queue| queue.pop_front())
                .unwrap_or_else(|| b"ch> ".to_vec());
            self.outgoing.extend(reply);
            self.commands.push(line);
        }
    }
}

impl tokio::io::AsyncRead for FakeInstrument {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let mut state = self.lock();
        if state.outgoing.is_empty() {
            state.reader = Some(cx.waker().clone());
            return Poll::Pending;
        }
        let n = buf.remaining().min(state.outgoing.len());
        let chunk: Vec<u8> = state.outgoing.drain(..n).collect();
        buf.put_slice(&chunk);
        Poll::Ready(Ok(()))
    }
}

impl tokio::io::AsyncWrite for FakeInstrument {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::result::Result<usize, std::io::Error>> {
        let mut state = self.lock();
        state.receive(buf);
        if !state.outgoing.is_empty() {
            if let Some(waker) = state.reader.take() {
                waker.wake();
            }
        }
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<std::result::Result<(), std::io::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<std::result::Result<(), std::io::Error>> {
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test(start_paused = true)]
    async fn test_pending_read_wakes_on_write() {
        let fake = FakeInstrument::new();
        let mut reader = fake.clone();
        let read = tokio::spawn(async move {
            let mut buf = [0u8; 32];
            let n = reader.read(&mut buf).await.unwrap();
            buf[..n].to_vec()
        });
        tokio::task::yield_now().await;

        let mut writer = fake.clone();
        writer.write_all(b"info\r").await.unwrap();

        let echoed = tokio::time::timeout(Duration::from_secs(1), read)
            .await
            .expect("reader not woken by write")
            .unwrap();
        assert!(echoed.starts_with(b"info\r\n"));
    }
}
