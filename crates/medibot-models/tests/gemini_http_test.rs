//! HTTP-level tests for the Gemini clients against a mock server.

use medibot_abstraction::{ImageModel, Model, ModelError};
use medibot_models::{GeminiImageModel, GeminiModel};
use mockito::Matcher;

#[tokio::test]
async fn test_generate_text_success() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("POST", "/models/gemini-2.5-pro:generateContent")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{
                "candidates": [{
                    "content": {
                        "parts": [{"text": "**Step 1: Clean**\nWash the wound."}]
                    }
                }],
                "usageMetadata": {
                    "promptTokenCount": 12,
                    "candidatesTokenCount": 40,
                    "totalTokenCount": 52
                }
            }"#,
        )
        .create_async()
        .await;

    let model = GeminiModel::with_api_key("gemini-2.5-pro".to_string(), "test-key".to_string())
        .with_base_url(server.url());

    let answer = model.generate_text("How do I treat a cut?", None).await.unwrap();
    assert!(answer.content.starts_with("**Step 1: Clean**"));
    assert_eq!(answer.model_id.as_deref(), Some("gemini-2.5-pro"));
    let usage = answer.usage.unwrap();
    assert_eq!(usage.total_tokens, 52);

    mock.assert_async().await;
}

#[tokio::test]
async fn test_generate_text_empty_candidates_is_empty_response() {
    let mut server = mockito::Server::new_async().await;

    let _mock = server
        .mock("POST", "/models/gemini-2.5-pro:generateContent")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"candidates": []}"#)
        .create_async()
        .await;

    let model = GeminiModel::with_api_key("gemini-2.5-pro".to_string(), "test-key".to_string())
        .with_base_url(server.url());

    let result = model.generate_text("hello", None).await;
    assert!(matches!(result, Err(ModelError::EmptyResponse)));
}

#[tokio::test]
async fn test_generate_text_server_error_maps_to_model_response_error() {
    let mut server = mockito::Server::new_async().await;

    let _mock = server
        .mock("POST", "/models/gemini-2.5-pro:generateContent")
        .match_query(Matcher::Any)
        .with_status(500)
        .with_body("internal")
        .create_async()
        .await;

    let model = GeminiModel::with_api_key("gemini-2.5-pro".to_string(), "test-key".to_string())
        .with_base_url(server.url());

    let result = model.generate_text("hello", None).await;
    assert!(matches!(result, Err(ModelError::ModelResponseError(_))));
}

#[tokio::test]
async fn test_generate_image_decodes_inline_data() {
    let mut server = mockito::Server::new_async().await;

    // "hello" base64-encoded.
    let _mock = server
        .mock("POST", "/models/gemini-2.5-flash-image:generateContent")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{
                "candidates": [{
                    "content": {
                        "parts": [
                            {"text": "rendered"},
                            {"inlineData": {"mimeType": "image/png", "data": "aGVsbG8="}}
                        ]
                    }
                }]
            }"#,
        )
        .create_async()
        .await;

    let model = GeminiImageModel::with_api_key(
        "gemini-2.5-flash-image".to_string(),
        "test-key".to_string(),
    )
    .with_base_url(server.url());

    let bytes = model.generate_image("a bandaged hand").await.unwrap();
    assert_eq!(bytes, b"hello");
}

#[tokio::test]
async fn test_generate_image_text_only_response_is_empty() {
    let mut server = mockito::Server::new_async().await;

    let _mock = server
        .mock("POST", "/models/gemini-2.5-flash-image:generateContent")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"candidates": [{"content": {"parts": [{"text": "no can do"}]}}]}"#)
        .create_async()
        .await;

    let model = GeminiImageModel::with_api_key(
        "gemini-2.5-flash-image".to_string(),
        "test-key".to_string(),
    )
    .with_base_url(server.url());

    let result = model.generate_image("a bandaged hand").await;
    assert!(matches!(result, Err(ModelError::EmptyResponse)));
}
