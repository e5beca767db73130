use super::*;
use crate::types::Message;
use std::sync::Mutex;

fn recording(log: Arc<Mutex<Vec<String>>>, name: &'static str) -> Arc<dyn Middleware> {
    middleware_fn(name, move |next: BoxHandler| {
        let log = log.clone();
        handler_fn(move |ctx, req| {
            let log = log.clone();
            let next = next.clone();
            async move {
                log.lock().unwrap().push(format!("{}-before", name));
                let res = next.call(&ctx, &req).await;
                log.lock().unwrap().push(format!("{}-after", name));
                res
            }
        })
    })
}

fn echo_handler() -> BoxHandler {
    handler_fn(|_ctx, req: ChatRequest| async move {
        Ok(ChatResponse::new(req.messages[0].text_content()))
    })
}

#[tokio::test]
async fn test_first_registered_is_outermost() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let pipeline = PipelineBuilder::new()
        .add_shared(recording(log.clone(), "m1"))
        .add_shared(recording(log.clone(), "m2"))
        .build(echo_handler());

    let req = ChatRequest::new("test").message(Message::user("ping"));
    let resp = pipeline.call(&CallContext::new(), &req).await.unwrap();
    assert_eq!(resp.content, "ping");

    let calls = log.lock().unwrap().clone();
    assert_eq!(calls, vec!["m1-before", "m2-before", "m2-after", "m1-after"]);
    assert_eq!(pipeline.names(), ["m1", "m2"]);
}

#[tokio::test]
async fn test_empty_pipeline_is_base_handler() {
    let pipeline = PipelineBuilder::new().build(echo_handler());
    let req = ChatRequest::new("test").message(Message::user("direct"));
    let resp = pipeline.call(&CallContext::new(), &req).await.unwrap();
    assert_eq!(resp.content, "direct");
    assert!(pipeline.names().is_empty());
}

#[tokio::test]
async fn test_chain_nests_as_single_middleware() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let inner = chain(vec![
        recording(log.clone(), "b"),
        recording(log.clone(), "c"),
    ]);
    let pipeline = PipelineBuilder::new()
        .add_shared(recording(log.clone(), "a"))
        .add_middleware(inner)
        .build(echo_handler());

    let req = ChatRequest::new("test").message(Message::user("x"));
    pipeline.call(&CallContext::new(), &req).await.unwrap();
    let calls = log.lock().unwrap().clone();
    assert_eq!(
        calls,
        vec!["a-before", "b-before", "c-before", "c-after", "b-after", "a-after"]
    );
}

#[tokio::test]
async fn test_pipeline_shared_across_tasks() {
    let pipeline = PipelineBuilder::new()
        .add_shared(middleware_fn("noop", |next| next))
        .build(echo_handler());

    let mut handles = Vec::new();
    for i in 0..16 {
        let p = pipeline.clone();
        handles.push(tokio::spawn(async move {
            let req = ChatRequest::new("test").message(Message::user(format!("n{}", i)));
            p.call(&CallContext::new(), &req).await.unwrap().content
        }));
    }
    for (i, h) in handles.into_iter().enumerate() {
        assert_eq!(h.await.unwrap(), format!("n{}", i));
    }
}
