use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use bikeforge_ai::image_provider::{GeneratedImage, ImageGenerationError, ImageProvider};
use bikeforge_ai::llm_provider::{GenerationConfig, LLMProvider, LLMResponse, LLMResult, Message};
use bikeforge_api::{create_router, AppState, ChatResponse, Oracles};
use bikeforge_core::catalog::QuestionCatalog;
use bikeforge_core::config_manager::BikeForgeConfig;
use bikeforge_dialogue::{CreditLedger, InMemoryCreditLedger};
use http_body_util::BodyExt;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use tower::ServiceExt;

#[derive(Default)]
struct CannedChat {
    replies: Mutex<VecDeque<Option<String>>>,
}

impl CannedChat {
    fn with(replies: Vec<Option<String>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
        })
    }
}

#[async_trait]
impl LLMProvider for CannedChat {
    async fn generate_chat(
        &self,
        _messages: &[Message],
        _config: &GenerationConfig,
    ) -> LLMResult<LLMResponse> {
        match self.replies.lock().pop_front().flatten() {
            Some(content) => Ok(LLMResponse {
                content,
                total_tokens: None,
                finish_reason: None,
                model: "canned".to_string(),
            }),
            None => anyhow::bail!("connection refused"),
        }
    }

    fn provider_name(&self) -> &str {
        "canned"
    }

    fn model_name(&self) -> &str {
        "canned"
    }
}

struct CannedImages {
    refuse: bool,
}

#[async_trait]
impl ImageProvider for CannedImages {
    async fn generate(&self, _prompt: &str) -> Result<GeneratedImage, ImageGenerationError> {
        if self.refuse {
            return Err(ImageGenerationError::ContentPolicy(
                "rejected by the safety system".to_string(),
            ));
        }
        Ok(GeneratedImage {
            b64_json: "aGVsbG8=".to_string(),
            revised_prompt: Some("a red bike".to_string()),
        })
    }

    fn model_name(&self) -> &str {
        "canned-image"
    }
}

fn test_config() -> BikeForgeConfig {
    let mut config = BikeForgeConfig::default();
    config.validation.semantic_enabled = false;
    config.dialogue.oracle_timeout_secs = 1;
    config
}

fn first_question() -> String {
    let def = QuestionCatalog::get(0);
    let options: Vec<_> = def
        .options_with_custom()
        .iter()
        .enumerate()
        .map(|(i, o)| json!({"number": i + 1, "text": o.text, "value": o.value}))
        .collect();
    json!({
        "type": "question",
        "content": {
            "question_type": def.id.as_str(),
            "question_text": def.prompt,
            "options": options,
            "current_step": 1,
            "total_steps": 15
        },
        "message": def.prompt
    })
    .to_string()
}

fn completion() -> String {
    let mut content = serde_json::Map::new();
    for def in QuestionCatalog::iter() {
        content.insert(def.id.as_str().to_string(), json!(def.options[0].value));
    }
    content.insert("custom_fields".to_string(), json!({}));
    json!({"type": "completion", "content": content, "message": "All done!"}).to_string()
}

fn app(
    chat: Vec<Option<String>>,
    refuse_images: bool,
    ledger: Option<Arc<dyn CreditLedger>>,
) -> Router {
    let chat = CannedChat::with(chat);
    let oracles = Oracles {
        chat: chat.clone(),
        validation: chat,
        images: Arc::new(CannedImages {
            refuse: refuse_images,
        }),
    };
    create_router(AppState::assemble(&test_config(), oracles, ledger))
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health() {
    let resp = app(vec![], false, None).oneshot(get("/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["status"], "healthy");
}

#[tokio::test]
async fn test_chat_returns_flattened_question() {
    let resp = app(vec![Some(first_question())], false, None)
        .oneshot(post_json(
            "/chat/complete",
            json!({"session_id": "s1", "user_message": "Hi"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body: ChatResponse = serde_json::from_value(body_json(resp).await).unwrap();
    assert!(!body.is_complete);
    assert_eq!(body.current_step, Some(1));
    assert_eq!(body.total_steps, Some(15));
    assert_eq!(
        body.options.len(),
        QuestionCatalog::get(0).options_with_custom().len()
    );
    assert_eq!(body.question_text.as_deref(), Some(QuestionCatalog::get(0).prompt));
}

#[tokio::test]
async fn test_chat_rejects_blank_session() {
    let resp = app(vec![], false, None)
        .oneshot(post_json(
            "/chat/complete",
            json!({"session_id": "  ", "user_message": "Hi"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unreachable_oracle_is_service_unavailable() {
    let resp = app(vec![None], false, None)
        .oneshot(post_json(
            "/chat/complete",
            json!({"session_id": "s1", "user_message": "Hi"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(resp).await["status"], 503);
}

#[tokio::test]
async fn test_specification_available_after_completion() {
    let router = app(vec![Some(completion())], false, None);

    let resp = router
        .clone()
        .oneshot(get("/chat/s1/specification"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = router
        .clone()
        .oneshot(post_json(
            "/chat/complete",
            json!({"session_id": "s1", "user_message": "done"}),
        ))
        .await
        .unwrap();
    let body: ChatResponse = serde_json::from_value(body_json(resp).await).unwrap();
    assert!(body.is_complete);
    assert!(body.specification.is_some());

    let resp = router.oneshot(get("/chat/s1/specification")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["session_id"], "s1");
    assert!(body["specification"].is_object());
}

#[tokio::test]
async fn test_generate_and_download_image() {
    let ledger = Arc::new(InMemoryCreditLedger::new());
    let router = app(vec![Some(completion())], false, Some(ledger.clone()));
    router
        .clone()
        .oneshot(post_json(
            "/chat/complete",
            json!({"session_id": "s1", "user_message": "done"}),
        ))
        .await
        .unwrap();

    let generate = || {
        let mut req = post_json("/image/generate", json!({"session_id": "s1"}));
        req.headers_mut()
            .insert("x-user-id", "rider".parse().unwrap());
        req
    };

    let resp = router.clone().oneshot(generate()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::PAYMENT_REQUIRED);

    ledger.grant("rider", 1);
    let resp = router.clone().oneshot(generate()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["image_base64"], "aGVsbG8=");
    assert!(body["prompt_used"]
        .as_str()
        .unwrap()
        .starts_with("Generate a photorealistic image"));
    assert_eq!(ledger.balance("rider"), 0);

    let resp = router
        .oneshot(get("/image/download/s1"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/png");
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"hello");
}

#[tokio::test]
async fn test_download_before_render_is_not_found() {
    let resp = app(vec![], false, None)
        .oneshot(get("/image/download/nobody"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_refused_render_is_unprocessable() {
    let router = app(vec![Some(completion())], true, None);
    router
        .clone()
        .oneshot(post_json(
            "/chat/complete",
            json!({"session_id": "s1", "user_message": "done"}),
        ))
        .await
        .unwrap();

    let resp = router
        .oneshot(post_json("/image/generate", json!({"session_id": "s1"})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(resp).await;
    assert_eq!(body["error"], "Content policy violation");
    assert!(body["suggestions"].is_array());
}

#[tokio::test]
async fn test_download_filename_is_sanitized() {
    let router = app(vec![Some(completion())], false, None);
    router
        .clone()
        .oneshot(post_json(
            "/chat/complete",
            json!({"session_id": "ride \"1\"", "user_message": "done"}),
        ))
        .await
        .unwrap();
    let resp = router
        .clone()
        .oneshot(post_json("/image/generate", json!({"session_id": "ride \"1\""})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = router
        .oneshot(get("/image/download/ride%20%221%22"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"bike_ride__1_.png\""
    );
}
