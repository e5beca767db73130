//! Event stream closure, backpressure and cancellation.

use futures::StreamExt;
use llmx::context::CallContext;
use llmx::stream::EventStream;
use llmx::types::StreamEvent;
use llmx::Error;
use std::time::Duration;

#[tokio::test]
async fn test_send_after_close_is_noop() {
    let (producer, mut stream) = EventStream::new(CallContext::new());
    producer.send(StreamEvent::text("before")).await.unwrap();
    producer.close();

    let sent = tokio::time::timeout(Duration::from_millis(100), producer.send(StreamEvent::text("after")))
        .await
        .expect("send after close must not block");
    assert!(sent.is_ok());

    assert_eq!(stream.next().await.unwrap().unwrap(), StreamEvent::text("before"));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_concurrent_close_is_idempotent() {
    let (producer, mut stream) = EventStream::new(CallContext::new());
    let mut tasks = Vec::new();
    for _ in 0..8 {
        let p = producer.clone();
        tasks.push(tokio::spawn(async move { p.close() }));
    }
    for t in tasks {
        t.await.unwrap();
    }
    producer.close();
    assert!(producer.is_closed());
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_full_queue_blocks_until_consumed() {
    let (producer, mut stream) = EventStream::with_capacity(CallContext::new(), 1, 1);
    producer.send(StreamEvent::text("a")).await.unwrap();

    let blocked = tokio::time::timeout(Duration::from_millis(30), producer.send(StreamEvent::text("b"))).await;
    assert!(blocked.is_err(), "second send should wait for queue space");

    let p = producer.clone();
    let sender = tokio::spawn(async move { p.send(StreamEvent::text("c")).await });
    assert_eq!(stream.next().await.unwrap().unwrap(), StreamEvent::text("a"));
    sender.await.unwrap().unwrap();
    assert_eq!(stream.next().await.unwrap().unwrap(), StreamEvent::text("c"));
}

#[tokio::test]
async fn test_blocked_send_observes_cancellation() {
    let ctx = CallContext::new();
    let (producer, _stream) = EventStream::with_capacity(ctx.clone(), 1, 1);
    producer.send(StreamEvent::text("fill")).await.unwrap();

    let c = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        c.cancel();
    });
    let res = producer.send(StreamEvent::text("stuck")).await;
    assert!(matches!(res, Err(Error::Cancelled)));
    assert!(producer.is_closed());
}

#[tokio::test]
async fn test_error_event_terminates_stream() {
    let (producer, mut stream) = EventStream::new(CallContext::new());
    producer.send(StreamEvent::text("partial")).await.unwrap();
    producer.send(StreamEvent::error("provider hiccup")).await.unwrap();
    producer.send(StreamEvent::text("ignored")).await.unwrap();

    assert_eq!(stream.next().await.unwrap().unwrap(), StreamEvent::text("partial"));
    assert!(stream.next().await.unwrap().unwrap().is_error());
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_send_error_is_delivered_after_events() {
    let (producer, mut stream) = EventStream::new(CallContext::new());
    producer.send(StreamEvent::text("one")).await.unwrap();
    producer.send_error(Error::provider("openai", 502, "bad gateway"));

    assert_eq!(stream.next().await.unwrap().unwrap(), StreamEvent::text("one"));
    let err = stream.next().await.unwrap().unwrap_err();
    assert_eq!(err.status_code(), 502);
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_from_source_accumulates_response() {
    let events = vec![
        Ok(StreamEvent::text("Hel")),
        Ok(StreamEvent::text("lo")),
        Ok(StreamEvent::ToolCallDelta {
            id: "call_1".into(),
            name: Some("weather".into()),
            arguments: "{\"city\":".into(),
        }),
        Ok(StreamEvent::ToolCallDelta {
            id: "call_1".into(),
            name: None,
            arguments: "\"Paris\"}".into(),
        }),
        Ok(StreamEvent::Finish {
            finish_reason: Some("tool_calls".into()),
            usage: None,
        }),
    ];
    let stream = EventStream::from_source(CallContext::new(), futures::stream::iter(events));
    let resp = stream.accumulate().await.unwrap();

    assert_eq!(resp.content, "Hello");
    assert_eq!(resp.finish_reason.as_deref(), Some("tool_calls"));
    assert_eq!(resp.tool_calls.len(), 1);
    assert_eq!(resp.tool_calls[0].arguments["city"], "Paris");
}

#[tokio::test]
async fn test_source_error_ends_stream() {
    let events: Vec<llmx::Result<StreamEvent>> = vec![
        Ok(StreamEvent::text("x")),
        Err(Error::internal("connection reset")),
        Ok(StreamEvent::text("never")),
    ];
    let items: Vec<_> = EventStream::from_source(CallContext::new(), futures::stream::iter(events))
        .into_stream()
        .collect()
        .await;

    assert_eq!(items.len(), 2);
    assert!(items[0].is_ok());
    assert!(items[1].is_err());
}

#[tokio::test]
async fn test_consumer_cancel_stops_producer() {
    let ctx = CallContext::new();
    let endless = futures::stream::repeat_with(|| Ok(StreamEvent::text("tick")));
    let mut stream = EventStream::from_source(ctx.clone(), endless);

    assert!(stream.next().await.unwrap().is_ok());
    ctx.cancel();
    let mut saw_cancel = false;
    while let Some(item) = stream.next().await {
        if let Err(e) = item {
            assert!(matches!(e, Error::Cancelled));
            saw_cancel = true;
        }
    }
    assert!(saw_cancel);
    assert!(stream.is_closed());
}

#[tokio::test]
async fn test_tokio_stream_source_is_forwarded_in_order() {
    let words = ["one ", "two ", "three"];
    let source = tokio_stream::iter(words.map(|w| Ok(StreamEvent::text(w))));
    let stream = EventStream::from_source(CallContext::new(), source);
    let resp = stream.accumulate().await.unwrap();
    assert_eq!(resp.content, "one two three");
}

/// Fill a one-slot queue and park a second send on it in its own task.
async fn blocked_sender(
    tx: llmx::stream::StreamProducer,
) -> tokio::task::JoinHandle<llmx::Result<()>> {
    tx.send(StreamEvent::text("fills queue")).await.unwrap();
    let handle = tokio::spawn(async move { tx.send(StreamEvent::text("parked")).await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!handle.is_finished());
    handle
}

#[tokio::test]
async fn test_blocked_send_released_by_consumer_close() {
    let (tx, mut rx) = EventStream::with_capacity(CallContext::new(), 1, 1);
    let parked = blocked_sender(tx).await;

    rx.close();
    let res = tokio::time::timeout(Duration::from_secs(1), parked)
        .await
        .expect("close must release the blocked send")
        .unwrap();
    assert!(res.is_ok());
    assert!(rx.is_closed());
}

#[tokio::test]
async fn test_blocked_send_released_by_consumer_drop() {
    let (tx, rx) = EventStream::with_capacity(CallContext::new(), 1, 1);
    let parked = blocked_sender(tx).await;

    drop(rx);
    let res = tokio::time::timeout(Duration::from_secs(1), parked)
        .await
        .expect("drop must release the blocked send")
        .unwrap();
    assert!(res.is_ok());
}

#[tokio::test]
async fn test_blocked_send_released_by_other_producer_close() {
    let (tx, mut rx) = EventStream::with_capacity(CallContext::new(), 1, 1);
    let closer = tx.clone();
    let parked = blocked_sender(tx).await;

    let closing = tokio::spawn(async move { closer.close() });
    tokio::time::timeout(Duration::from_secs(1), closing)
        .await
        .expect("close must not wait on the full queue")
        .unwrap();
    let res = tokio::time::timeout(Duration::from_secs(1), parked)
        .await
        .expect("producer close must release the blocked send")
        .unwrap();
    assert!(res.is_ok());

    assert_eq!(rx.next().await.unwrap().unwrap(), StreamEvent::text("fills queue"));
    assert!(rx.next().await.is_none());
}
