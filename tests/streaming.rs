//! Large bodies in both directions and backpressure toward the upstream.

use std::time::Duration;
use axum::http::StatusCode;
use bytes::Bytes;
use futures_util::{stream, StreamExt};

mod common;

// Integrity only. The proxy's memory bound (nothing buffered beyond socket
// buffers plus one chunk) is asserted by test_slow_reader_holds_back_upstream.
#[tokio::test]
async fn test_large_download_arrives_intact() {
    let reads = common::start_upstream("read").await;
    let writes = common::start_upstream("write").await;
    let (handle, sink) = common::start_proxy(common::proxy_config(&reads.url(), &writes.url())).await;

    let size: u64 = 100 * 1024 * 1024;
    let res = common::client()
        .get(common::proxy_url(&handle, &format!("/big/{}", size)))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().get("content-length").is_none());

    let mut offset = 0u64;
    let mut body = res.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.unwrap();
        for byte in chunk.iter() {
            assert_eq!(*byte, common::pattern_byte(offset), "offset {}", offset);
            offset += 1;
        }
    }
    assert_eq!(offset, size);
    assert!(sink.lines_starting_with("Stream aborted").is_empty());

    handle.stop().await;
}

#[tokio::test]
async fn test_chunked_upload_arrives_intact() {
    let reads = common::start_upstream("read").await;
    let writes = common::start_upstream("write").await;
    let (handle, _sink) = common::start_proxy(common::proxy_config(&reads.url(), &writes.url())).await;

    let chunk_count = 128u64;
    let chunk_len = 64 * 1024u64;
    let chunks = stream::iter(0..chunk_count).map(move |i| {
        let start = i * chunk_len;
        let data: Vec<u8> = (start..start + chunk_len).map(common::pattern_byte).collect();
        Ok::<_, std::io::Error>(Bytes::from(data))
    });

    let res = common::client()
        .put(common::proxy_url(&handle, "/uploads/blob.bin"))
        .body(reqwest::Body::wrap_stream(chunks))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let recorded = writes.recorded();
    assert_eq!(recorded.len(), 1);
    let body = &recorded[0].body;
    assert_eq!(body.len() as u64, chunk_count * chunk_len);
    assert!(body
        .iter()
        .enumerate()
        .all(|(i, b)| *b == common::pattern_byte(i as u64)));

    handle.stop().await;
}

#[tokio::test]
async fn test_slow_reader_holds_back_upstream() {
    let reads = common::start_upstream("read").await;
    let writes = common::start_upstream("write").await;
    let (handle, sink) = common::start_proxy(common::proxy_config(&reads.url(), &writes.url())).await;

    let res = common::client()
        .get(common::proxy_url(&handle, "/endless"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // Nobody reads the body: socket buffers fill and the relay stops pulling.
    tokio::time::sleep(Duration::from_millis(500)).await;
    let stalled_at = reads.produced();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(reads.produced() < 64 * 1024 * 1024, "produced {}", reads.produced());
    assert!(reads.produced() - stalled_at < 8 * 1024 * 1024);
    assert_eq!(handle.in_flight(), 1);

    // Walking away releases the upstream connection.
    drop(res);
    assert!(common::eventually(Duration::from_secs(5), || reads.generator_dropped()).await);
    assert!(common::eventually(Duration::from_secs(2), || handle.in_flight() == 0).await);
    assert!(sink.lines_starting_with("Stream aborted").is_empty());

    handle.stop().await;
}
