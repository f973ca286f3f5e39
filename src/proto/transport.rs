//! Command/response synchronisation on top of a [`Link`].
//!
//! The instrument echoes every byte it receives and prints a `ch> ` prompt
//! once a command has finished. A command exchange therefore is:
//!
//! 1. drain whatever is still pending on the line until a read comes back empty,
//! 2. send the command terminated by `\r`,
//! 3. wait for the echo `<cmd>\r\n`,
//! 4. for queries, collect everything up to `\r\nch> `.
//!
//! Waits are bounded by the link's inactivity timeout only. What happens when
//! a wait runs into the timeout is decided by [`TimeoutPolicy`].

use bytes::Bytes;
use tracing::{debug, trace, warn};

use super::codec::{CRLF, LF, PROMPT};
use super::command::Command;
use super::link::{Link, ReadOutcome};
use super::{ProtoError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeoutPolicy {
    /// A missing echo or prompt fails with [`ProtoError::TimeoutTruncated`].
    #[default]
    Strict,
    /// Hand back whatever arrived, like a plain serial read would.
    Lenient,
}

pub struct Transport {
    link: Link,
    policy: TimeoutPolicy,
}

impl Transport {
    pub fn new(link: Link, policy: TimeoutPolicy) -> Self {
        Self { link, policy }
    }

    pub fn policy(&self) -> TimeoutPolicy {
        self.policy
    }

    pub fn is_open(&self) -> bool {
        self.link.is_open()
    }

    /// Reads and discards until the line stays quiet for a full timeout
    /// period. Returns the number of discarded bytes.
    pub async fn drain(&mut self) -> Result<usize> {
        let mut discarded = 0;
        loop {
            let stale = self.link.read_until(LF).await?.into_bytes();
            if stale.is_empty() {
                break;
            }
            trace!("Discarding {:?}", String::from_utf8_lossy(&stale));
            discarded += stale.len();
        }
        if discarded > 0 {
            debug!("Drained {} stale bytes", discarded);
        }
        Ok(discarded)
    }

    /// Sends `cmd` and waits until the instrument has echoed it.
    pub async fn write(&mut self, cmd: Command) -> Result<()> {
        self.drain().await?;

        let echo = [cmd.to_string().as_bytes(), CRLF].concat();
        debug!("Sending {:?}", cmd.to_string());
        self.link.send(cmd).await?;

        let outcome = self.link.read_until(&echo).await?;
        self.settle(&echo, outcome)?;
        Ok(())
    }

    /// Sends `cmd` and returns the raw reply, including the trailing
    /// `\r\nch> `.
    pub async fn query(&mut self, cmd: Command) -> Result<Bytes> {
        self.write(cmd).await?;

        let end = [CRLF, PROMPT].concat();
        let outcome = self.link.read_until(&end).await?;
        self.settle(&end, outcome)
    }

    pub async fn close(&mut self) -> Result<()> {
        self.link.close().await
    }

    fn settle(&self, expected: &[u8], outcome: ReadOutcome) -> Result<Bytes> {
        match (outcome, self.policy) {
            (ReadOutcome::Complete(bytes), _) => Ok(bytes),
            (ReadOutcome::TimedOut(partial), TimeoutPolicy::Lenient) => {
                warn!(
                    "Timed out waiting for {:?}, continuing with {} bytes",
                    String::from_utf8_lossy(expected),
                    partial.len()
                );
                Ok(partial)
            }
            (ReadOutcome::TimedOut(partial), TimeoutPolicy::Strict) => {
                Err(ProtoError::TimeoutTruncated {
                    expected: String::from_utf8_lossy(expected).to_string(),
                    partial: partial.to_vec(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::fake::FakeInstrument;
    use std::time::Duration;

    fn transport(fake: &FakeInstrument, policy: TimeoutPolicy) -> Transport {
        Transport::new(
            Link::from_io(fake.clone(), Duration::from_secs(1)),
            policy,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_drains_stale_bytes_first() {
        let fake = FakeInstrument::new().with_pending(b"garbage\r\nch> ");
        let mut transport = transport(&fake, TimeoutPolicy::Strict);
        assert_eq!(transport.drain().await.unwrap(), 13);
        transport.write(Command::Pause).await.unwrap();
        assert_eq!(fake.commands(), vec!["pause"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_returns_body_with_prompt() {
        let fake = FakeInstrument::new()
            .with_pending(b"ch> ")
            .respond("info", b"NanoVNA-H\r\nVersion: 1.2\r\nch> ");
        let mut transport = transport(&fake, TimeoutPolicy::Strict);
        let reply = transport.query(Command::Info).await.unwrap();
        assert_eq!(&reply[..], b"NanoVNA-H\r\nVersion: 1.2\r\nch> ");
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_echo_is_bounded_strict() {
        let fake = FakeInstrument::new().without_echo();
        let mut transport = transport(&fake, TimeoutPolicy::Strict);
        assert_eq!(transport.policy(), TimeoutPolicy::default());
        let start = tokio::time::Instant::now();
        let err = transport.write(Command::Resume).await.unwrap_err();
        assert!(matches!(err, ProtoError::TimeoutTruncated { .. }));
        assert!(start.elapsed() < Duration::from_secs(10));
        transport.close().await.unwrap();
        assert!(!transport.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_echo_is_silent_lenient() {
        let fake = FakeInstrument::new().without_echo();
        let mut transport = transport(&fake, TimeoutPolicy::Lenient);
        assert_eq!(transport.policy(), TimeoutPolicy::Lenient);
        transport.write(Command::Resume).await.unwrap();
        transport.close().await.unwrap();
        assert_eq!(fake.commands(), vec!["resume"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lenient_query_returns_truncated_reply() {
        let fake = FakeInstrument::new().respond("help", b"commands: scan data");
        let mut transport = transport(&fake, TimeoutPolicy::Lenient);
        let reply = transport.query(Command::Help).await.unwrap();
        assert_eq!(&reply[..], b"commands: scan data");
    }
}
