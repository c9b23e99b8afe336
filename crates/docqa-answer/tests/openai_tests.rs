use std::sync::{Arc, Mutex};

use docqa_answer::{build_context, OpenAiGenerator};
use docqa_core::config::GenerationConfig;
use docqa_core::conversation::Turn;
use docqa_core::traits::Generator;
use docqa_core::types::{Chunk, FusedResult};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

#[derive(Debug, Default, Clone)]
struct Captured {
    head: String,
    body: String,
}

/// Serve exactly one HTTP request with a canned response.
async fn serve_once(status: &'static str, body: String) -> (String, Arc<Mutex<Captured>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let captured = Arc::new(Mutex::new(Captured::default()));
    let sink = captured.clone();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let (head_end, content_length) = loop {
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before headers");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..pos]).to_lowercase();
                let len = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                break (pos + 4, len);
            }
        };
        while buf.len() < head_end + content_length {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        *sink.lock().unwrap() = Captured {
            head: String::from_utf8_lossy(&buf[..head_end]).to_string(),
            body: String::from_utf8_lossy(&buf[head_end..]).to_string(),
        };
        let len = body.len();
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\n\
             Content-Length: {len}\r\nConnection: close\r\n\r\n{body}"
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
    });
    (format!("http://{addr}/v1"), captured)
}

fn config(base_url: String, key_env: &str) -> GenerationConfig {
    std::env::set_var("NO_PROXY", "127.0.0.1");
    GenerationConfig {
        base_url,
        model: "test-model".into(),
        api_key_env: key_env.into(),
        timeout_ms: 5_000,
        ..GenerationConfig::default()
    }
}

fn unauthenticated(base_url: String) -> OpenAiGenerator {
    OpenAiGenerator::from_config(&config(base_url, "DOCQA_TEST_KEY_UNSET")).unwrap()
}

fn result() -> FusedResult {
    FusedResult {
        chunk: Chunk {
            id: "doc:0".into(),
            doc_id: "doc".into(),
            source: "manual.pdf".into(),
            ordinal: 0,
            text: "Bleed the fuel line before starting the generator.".into(),
            page: 4,
            page_end: 4,
            start: 0,
            end: 50,
        },
        score: 1.0,
        rank: 1,
    }
}

#[tokio::test]
async fn sends_chat_completion_and_reads_first_choice() {
    let reply = r#"{"choices":[{"message":{"role":"assistant","content":"Bleed it first [1]."}}]}"#;
    let (base_url, captured) = serve_once("200 OK", reply.to_string()).await;
    std::env::set_var("DOCQA_TEST_KEY_OK", "secret-key");
    let generator = OpenAiGenerator::from_config(&config(base_url, "DOCQA_TEST_KEY_OK")).unwrap();

    let context = build_context(&[result()], 1_000);
    let history = vec![Turn::User("hello".into()), Turn::Assistant("hi".into())];
    let question = "how do I start the generator?";
    let text = generator.generate(&context, &history, question).await.unwrap();
    assert_eq!(text, "Bleed it first [1].");

    let captured = captured.lock().unwrap().clone();
    assert!(captured.head.starts_with("POST /v1/chat/completions HTTP/1.1"), "{}", captured.head);
    assert!(captured.head.to_lowercase().contains("authorization: bearer secret-key"));

    let body: Value = serde_json::from_str(&captured.body).unwrap();
    assert_eq!(body["model"], "test-model");
    assert_eq!(body["max_tokens"], 1024);
    assert!((body["temperature"].as_f64().unwrap() - 0.1).abs() < 1e-6);
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[0]["role"], "system");
    assert!(messages[0]["content"].as_str().unwrap().contains("[1] (manual.pdf, p. 4)"));
    assert_eq!(messages[1]["role"], "user");
    assert_eq!(messages[2]["content"], "hi");
    assert_eq!(messages[3]["content"], question);
}

#[tokio::test]
async fn error_status_is_reported_with_body() {
    let overloaded = r#"{"error":"overloaded"}"#.to_string();
    let (base_url, _) = serve_once("503 Service Unavailable", overloaded).await;
    let generator = unauthenticated(base_url);
    let err = generator.generate(&[], &[], "anything").await.unwrap_err();
    let msg = format!("{err:#}");
    assert!(msg.contains("503") && msg.contains("overloaded"), "{msg}");
}

#[tokio::test]
async fn malformed_response_is_an_error() {
    let (base_url, _) = serve_once("200 OK", r#"{"choices":[]}"#.to_string()).await;
    let generator = unauthenticated(base_url);
    let err = generator.generate(&[], &[], "anything").await.unwrap_err();
    assert!(err.to_string().contains("choices[0]"));
}
