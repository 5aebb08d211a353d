use bytes::Bytes;
use codeloop::api::stream::{chunk_stream, ChunkFormat, StreamParser};
use codeloop::api::ByteStream;
use codeloop::types::{FinishReason, RawChunk};
use futures::{stream, StreamExt};

fn chat_content(chunk: &RawChunk) -> Option<&str> {
    match chunk {
        RawChunk::Chat(chat) => chat.choices.first()?.delta.content.as_deref(),
        RawChunk::Completion(_) => None,
    }
}

#[test]
fn test_fragmented_frames() {
    let mut parser = StreamParser::new(ChunkFormat::Chat);

    let chunk1 = b"data: {\"choices\":[{\"delta\":{\"cont";
    let chunks1 = parser.process(chunk1).expect("first chunk parse");
    assert_eq!(chunks1.len(), 0);

    let chunk2 = b"ent\":\"Hi\"},\"finish_reason\":null}]}\n\n";
    let chunks2 = parser.process(chunk2).expect("second chunk parse");
    assert_eq!(chunks2.len(), 1);
    assert_eq!(chat_content(&chunks2[0]), Some("Hi"));
}

#[test]
fn test_parse_error_handling() {
    let mut parser = StreamParser::new(ChunkFormat::Chat);

    let chunk = b"data: {invalid json}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n\n";
    let chunks = parser
        .process(chunk)
        .expect("error handling should not fail parser");
    assert_eq!(chunks.len(), 1);
    assert_eq!(chat_content(&chunks[0]), Some("ok"));
}

#[test]
fn test_done_marker_and_crlf_frames() {
    let mut parser = StreamParser::new(ChunkFormat::Chat);

    let chunk = b"data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"function_call\"}]}\r\n\r\ndata: [DONE]\r\n\r\n";
    let chunks = parser.process(chunk).expect("crlf frames parse");
    assert_eq!(chunks.len(), 1);
    let RawChunk::Chat(chat) = &chunks[0] else {
        panic!("expected chat chunk");
    };
    assert_eq!(chat.choices[0].finish_reason, Some(FinishReason::FunctionCall));
}

#[test]
fn test_completion_frames() {
    let mut parser = StreamParser::new(ChunkFormat::Completion);

    let chunk = b"data: {\"choices\":[{\"text\":\"```python\\n\",\"finish_reason\":null}]}\n\n";
    let chunks = parser.process(chunk).expect("completion frame parse");
    match &chunks[..] {
        [RawChunk::Completion(completion)] => {
            assert_eq!(completion.choices[0].text, "```python\n");
        }
        other => panic!("unexpected chunks: {other:?}"),
    }
}

#[test]
fn test_character_split_across_chunks() {
    let mut parser = StreamParser::new(ChunkFormat::Completion);
    let frame = "data: {\"choices\":[{\"text\":\"café\",\"finish_reason\":null}]}\n\n";
    let split = frame.find('é').expect("accented char") + 1;

    let first = parser
        .process(&frame.as_bytes()[..split])
        .expect("first half parse");
    assert!(first.is_empty());
    let second = parser
        .process(&frame.as_bytes()[split..])
        .expect("second half parse");
    match &second[..] {
        [RawChunk::Completion(completion)] => assert_eq!(completion.choices[0].text, "café"),
        other => panic!("unexpected chunks: {other:?}"),
    }
}

#[tokio::test]
async fn test_chunk_stream_flushes_unterminated_frame() {
    let parts: Vec<anyhow::Result<Bytes>> = vec![
        Ok(Bytes::from_static(
            b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\ndata: {\"choices\":",
        )),
        Ok(Bytes::from_static(b"[{\"delta\":{\"content\":\"b\"}}]}")),
    ];
    let bytes: ByteStream = Box::pin(stream::iter(parts));
    let chunks: Vec<RawChunk> = chunk_stream(bytes, StreamParser::new(ChunkFormat::Chat))
        .map(|chunk| chunk.expect("chunk"))
        .collect()
        .await;

    let contents: Vec<Option<&str>> = chunks.iter().map(chat_content).collect();
    assert_eq!(contents, vec![Some("a"), Some("b")]);
}

#[tokio::test]
async fn test_chunk_stream_surfaces_transport_errors() {
    let parts: Vec<anyhow::Result<Bytes>> = vec![
        Ok(Bytes::from_static(
            b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\n",
        )),
        Err(anyhow::anyhow!("connection reset")),
    ];
    let bytes: ByteStream = Box::pin(stream::iter(parts));
    let mut chunks = chunk_stream(bytes, StreamParser::new(ChunkFormat::Chat));

    assert!(chunks.next().await.expect("first item").is_ok());
    let err = chunks.next().await.expect("second item").unwrap_err();
    assert!(err.to_string().contains("connection reset"));
    assert!(chunks.next().await.is_none());
}
