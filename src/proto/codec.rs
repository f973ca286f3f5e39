use bytes::{Bytes, BytesMut};
use std::{
    fmt::{self, Write},
    io,
};
use tokio_util::codec::{Decoder, Encoder};

use crate::proto::command::Command;

pub const CR: &[u8] = b"\r";
pub const LF: &[u8] = b"\n";
pub const CRLF: &[u8] = b"\r\n";
/// Shell prompt printed by the instrument when it is ready for input.
pub const PROMPT: &[u8] = b"ch> ";

/// Splits the incoming byte stream on an arbitrary, possibly multi-byte,
/// delimiter. The delimiter stays part of the returned frame.
///
/// The delimiter can be swapped between frames, which is how the
/// command transport waits for an echo first and for the prompt afterwards.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    delimiter: Vec<u8>,
    // Bytes of the buffer already known not to contain the delimiter
    scanned: usize,
}

impl FrameCodec {
    pub fn new(delimiter: impl Into<Vec<u8>>) -> Self {
        Self {
            delimiter: delimiter.into(),
            scanned: 0,
        }
    }

    pub fn delimiter(&self) -> &[u8] {
        &self.delimiter
    }

    pub fn set_delimiter(&mut self, delimiter: impl Into<Vec<u8>>) {
        self.delimiter = delimiter.into();
        self.scanned = 0;
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(LF)
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.delimiter.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Frame delimiter must not be empty",
            ));
        }
        // A delimiter may straddle the previous scan boundary
        let start = self.scanned.saturating_sub(self.delimiter.len() - 1);
        match find(&src[start..], &self.delimiter) {
            Some(pos) => {
                self.scanned = 0;
                let end = start + pos + self.delimiter.len();
                Ok(Some(src.split_to(end).freeze()))
            }
            None => {
                self.scanned = src.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Partial data is left in the buffer, the link decides what to do with it.
        self.decode(src)
    }
}

fn write_fmt_guarded(dst: &mut BytesMut, args: fmt::Arguments<'_>) -> Result<(), io::Error> {
    dst.write_fmt(args)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
}

impl Encoder<Command> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Command, dst: &mut BytesMut) -> Result<(), Self::Error> {
        write_fmt_guarded(dst, format_args!("{}", item))?;
        dst.extend_from_slice(CR);
        Ok(())
    }
}
