use super::logging::emit_sse_parse_error;
use super::{ByteStream, ChunkStream};
use crate::types::{ChatChunk, CompletionChunk, RawChunk};
use anyhow::Result;
use futures::{stream, StreamExt};
use std::collections::VecDeque;

/// Shape of the JSON carried by each `data:` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChunkFormat {
    #[default]
    Chat,
    Completion,
}

/// Incremental server-sent-events parser. Frames are separated by a blank
/// line; `[DONE]` and unparseable frames are skipped.
///
/// Bytes are buffered undecoded until a frame is complete, so a character
/// split across network chunks survives.
#[derive(Default)]
pub struct StreamParser {
    buffer: Vec<u8>,
    format: ChunkFormat,
}

impl StreamParser {
    pub fn new(format: ChunkFormat) -> Self {
        Self {
            buffer: Vec::new(),
            format,
        }
    }

    pub fn process(&mut self, chunk: &[u8]) -> Result<Vec<RawChunk>> {
        self.buffer.extend_from_slice(chunk);
        let mut chunks = Vec::new();
        let mut start = 0;

        while let Some((end, separator_len)) = frame_end(&self.buffer[start..]) {
            let frame = String::from_utf8_lossy(&self.buffer[start..start + end]);
            if let Some(chunk) = parse_frame(&frame, self.format) {
                chunks.push(chunk);
            }
            start += end + separator_len;
        }

        if start > 0 {
            self.buffer.drain(..start);
        }

        Ok(chunks)
    }

    /// Parses whatever is left once the byte stream has ended.
    pub fn flush(&mut self) -> Vec<RawChunk> {
        let rest = std::mem::take(&mut self.buffer);
        parse_frame(&String::from_utf8_lossy(&rest), self.format)
            .into_iter()
            .collect()
    }
}

/// Finds the first blank line (`\n\n` or `\n\r\n`), returning where the frame
/// ends and how many separator bytes follow it.
fn frame_end(bytes: &[u8]) -> Option<(usize, usize)> {
    bytes
        .iter()
        .enumerate()
        .filter(|(_, byte)| **byte == b'\n')
        .find_map(|(index, _)| match &bytes[index + 1..] {
            [b'\n', ..] => Some((index, 2)),
            [b'\r', b'\n', ..] => Some((index, 3)),
            _ => None,
        })
}

fn parse_frame(frame: &str, format: ChunkFormat) -> Option<RawChunk> {
    let data = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n");
    if data.is_empty() || data == "[DONE]" {
        return None;
    }

    let parsed = match format {
        ChunkFormat::Chat => serde_json::from_str::<ChatChunk>(&data).map(RawChunk::Chat),
        ChunkFormat::Completion => {
            serde_json::from_str::<CompletionChunk>(&data).map(RawChunk::Completion)
        }
    };
    match parsed {
        Ok(chunk) => Some(chunk),
        Err(error) => {
            emit_sse_parse_error(&data, &error);
            None
        }
    }
}

/// Turns a raw SSE byte stream into a stream of parsed chunks.
pub fn chunk_stream(bytes: ByteStream, parser: StreamParser) -> ChunkStream {
    let state = (bytes, parser, VecDeque::<Result<RawChunk>>::new(), false);
    Box::pin(stream::unfold(
        state,
        |(mut bytes, mut parser, mut pending, mut finished)| async move {
            loop {
                if let Some(item) = pending.pop_front() {
                    return Some((item, (bytes, parser, pending, finished)));
                }
                if finished {
                    return None;
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => match parser.process(&chunk) {
                        Ok(chunks) => pending.extend(chunks.into_iter().map(Ok)),
                        Err(error) => pending.push_back(Err(error)),
                    },
                    Some(Err(error)) => pending.push_back(Err(error)),
                    None => {
                        finished = true;
                        pending.extend(parser.flush().into_iter().map(Ok));
                    }
                }
            }
        },
    ))
}
