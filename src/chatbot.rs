use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub const EMPTY_MESSAGE_REPLY: &str = "Please type a message...";
pub const FALLBACK_REPLY: &str = "I specialize in potato and tomato diseases. Could you tell me more about your specific issue with these crops?";
pub const APOLOGY_REPLY: &str = "Sorry, I'm having trouble responding. Please try again.";

/// Scanned in order; the first keyword contained in the message wins.
const KEYWORD_REPLIES: &[(&str, &str)] = &[
    ("hi", "Hello! 👋 I'm Agri Doctor. How can I help with your potatoes or tomatoes today?"),
    ("hello", "Hi there! 🌾 Ask me about potato or tomato diseases, fertilizers, or pests."),
    ("potato", "For potatoes: Watch for Early Blight (dark spots) and Late Blight (white mold)."),
    ("potato blight", "For Potato Blight: Use copper-based fungicides and remove infected plants."),
    ("potato disease", "Common potato diseases: Early Blight, Late Blight. Upload an image for diagnosis!"),
    ("tomato", "For tomatoes: Common issues include Bacterial Spot, Early Blight, and Late Blight."),
    ("tomato spot", "For Tomato Bacterial Spot: Use copper sprays and avoid wet foliage."),
    ("tomato disease", "Common tomato diseases: Bacterial Spot, Early Blight, Late Blight. Send a photo for analysis!"),
    ("fertilizer", "Use balanced NPK fertilizer. For potatoes: higher potassium. For tomatoes: higher phosphorus."),
    ("pest", "For pests: Use neem oil or organic pesticides. Monitor regularly."),
    ("water", "Water early morning. Potatoes need consistent moisture, tomatoes prefer deep watering."),
    ("soil", "Well-draining soil with pH 5.5-6.5 for potatoes, 6.0-6.8 for tomatoes."),
    ("help", "I can help with: 🔍 Disease detection - upload plant images\n💬 Farming advice - ask about potatoes/tomatoes\n🌱 Organic solutions - natural remedies"),
    ("thanks", "You're welcome! 😊 Happy farming!"),
    ("bye", "Goodbye! 👋 Take care of your crops!"),
];

/// Expects `text` already lowercased and in English.
pub fn match_reply(text: &str) -> &'static str {
    KEYWORD_REPLIES
        .iter()
        .find(|(keyword, _)| text.contains(keyword))
        .map(|(_, reply)| *reply)
        .unwrap_or(FALLBACK_REPLY)
}

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("translation request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected translation response: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    pub text: String,
    pub source_language: String,
}

#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, target: &str) -> Result<Translation, TranslateError>;
}

/// Leaves text untouched and reports it as English.
pub struct PassthroughTranslator;

#[async_trait]
impl Translator for PassthroughTranslator {
    async fn translate(&self, text: &str, _target: &str) -> Result<Translation, TranslateError> {
        Ok(Translation {
            text: text.to_string(),
            source_language: "en".to_string(),
        })
    }
}

pub struct GoogleTranslator {
    client: reqwest::Client,
    endpoint: String,
}

impl GoogleTranslator {
    pub fn new(endpoint: impl Into<String>) -> Self {
        GoogleTranslator {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Translator for GoogleTranslator {
    async fn translate(&self, text: &str, target: &str) -> Result<Translation, TranslateError> {
        let body: Value = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("client", "gtx"),
                ("sl", "auto"),
                ("tl", target),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        parse_google_response(&body)
    }
}

/// Reads `[[["translated", "original", ...], ...], null, "detected", ...]`.
pub fn parse_google_response(body: &Value) -> Result<Translation, TranslateError> {
    let segments = body
        .get(0)
        .and_then(Value::as_array)
        .ok_or_else(|| TranslateError::Malformed("missing segment list".into()))?;

    let text: String = segments
        .iter()
        .filter_map(|segment| segment.get(0).and_then(Value::as_str))
        .collect();

    let source_language = body
        .get(2)
        .and_then(Value::as_str)
        .ok_or_else(|| TranslateError::Malformed("missing detected language".into()))?
        .to_string();

    Ok(Translation {
        text,
        source_language,
    })
}

pub struct Chatbot {
    translator: Arc<dyn Translator>,
}

impl Chatbot {
    pub fn new(translator: Arc<dyn Translator>) -> Self {
        Chatbot { translator }
    }

    /// Answers in the user's language. Translation failures degrade to an apology.
    pub async fn reply(&self, message: &str) -> String {
        let message = message.trim();
        if message.is_empty() {
            return EMPTY_MESSAGE_REPLY.to_string();
        }

        match self.translated_reply(message).await {
            Ok(reply) => reply,
            Err(err) => {
                tracing::warn!("Chat reply failed: {}", err);
                APOLOGY_REPLY.to_string()
            }
        }
    }

    async fn translated_reply(&self, message: &str) -> Result<String, TranslateError> {
        let english = self.translator.translate(message, "en").await?;
        let reply = match_reply(&english.text.to_lowercase());

        if english.source_language == "en" {
            return Ok(reply.to_string());
        }

        tracing::debug!(language = %english.source_language, "Translating reply back");
        let localized = self
            .translator
            .translate(reply, &english.source_language)
            .await?;
        Ok(localized.text)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        net::{SocketAddr, TcpListener},
        sync::Mutex,
    };

    use axum::{
        extract::{Query, State},
        http::StatusCode,
        routing::get,
        Json, Router,
    };
    use serde_json::json;

    use super::*;

    type SeenQueries = Arc<Mutex<Vec<HashMap<String, String>>>>;

    async fn fake_translate(
        State(seen): State<SeenQueries>,
        Query(params): Query<HashMap<String, String>>,
    ) -> Json<Value> {
        seen.lock().unwrap().push(params);
        Json(json!([[["Hello", "வணக்கம்", null, null, 10]], null, "ta"]))
    }

    async fn unavailable() -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    fn spawn_translate_server(seen: SeenQueries) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new()
            .route("/translate", get(fake_translate))
            .route("/down", get(unavailable))
            .with_state(seen);

        tokio::spawn(async move {
            axum::Server::from_tcp(listener)
                .unwrap()
                .serve(app.into_make_service())
                .await
                .unwrap();
        });
        addr
    }

    /// Pretends every non-English message is Tamil and wraps translations in markers.
    struct FakeTranslator {
        calls: Mutex<Vec<(String, String)>>,
    }

    impl FakeTranslator {
        fn new() -> Self {
            FakeTranslator {
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Translator for FakeTranslator {
        async fn translate(&self, text: &str, target: &str) -> Result<Translation, TranslateError> {
            self.calls
                .lock()
                .unwrap()
                .push((text.to_string(), target.to_string()));
            if let Some(english) = text.strip_prefix("[ta]") {
                return Ok(Translation {
                    text: english.to_string(),
                    source_language: "ta".to_string(),
                });
            }
            if target == "en" {
                return Ok(Translation {
                    text: text.to_string(),
                    source_language: "en".to_string(),
                });
            }
            Ok(Translation {
                text: format!("<{}>{}", target, text),
                source_language: "en".to_string(),
            })
        }
    }

    struct BrokenTranslator;

    #[async_trait]
    impl Translator for BrokenTranslator {
        async fn translate(&self, _text: &str, _target: &str) -> Result<Translation, TranslateError> {
            Err(TranslateError::Malformed("service down".into()))
        }
    }

    #[test]
    fn first_matching_keyword_wins() {
        assert_eq!(match_reply("potato blight on my field"), KEYWORD_REPLIES[2].1);
        assert_eq!(match_reply("which fertilizer"), KEYWORD_REPLIES[0].1);
        assert_eq!(match_reply("tomato spot"), KEYWORD_REPLIES[5].1);
        assert_eq!(match_reply("need some pest control"), KEYWORD_REPLIES[9].1);
    }

    #[test]
    fn unmatched_text_gets_fallback() {
        assert_eq!(match_reply("cucumber"), FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn empty_message_prompts_for_input() {
        let bot = Chatbot::new(Arc::new(PassthroughTranslator));
        assert_eq!(bot.reply("   ").await, EMPTY_MESSAGE_REPLY);
    }

    #[tokio::test]
    async fn english_message_is_matched_case_insensitively() {
        let translator = Arc::new(FakeTranslator::new());
        let bot = Chatbot::new(translator.clone());

        assert_eq!(bot.reply("  Tell me about SOIL  ").await, KEYWORD_REPLIES[11].1);
        assert_eq!(translator.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn foreign_message_is_answered_in_its_language() {
        let translator = Arc::new(FakeTranslator::new());
        let bot = Chatbot::new(translator.clone());

        let reply = bot.reply("[ta]thanks").await;
        assert_eq!(reply, format!("<ta>{}", KEYWORD_REPLIES[13].1));

        let calls = translator.calls.lock().unwrap();
        assert_eq!(calls[0], ("[ta]thanks".to_string(), "en".to_string()));
        assert_eq!(calls[1].1, "ta");
    }

    #[tokio::test]
    async fn translation_failure_apologizes() {
        let bot = Chatbot::new(Arc::new(BrokenTranslator));
        assert_eq!(bot.reply("hello").await, APOLOGY_REPLY);
    }

    #[tokio::test]
    async fn google_translator_sends_the_expected_query() {
        let seen = SeenQueries::default();
        let addr = spawn_translate_server(seen.clone());
        let translator = GoogleTranslator::new(format!("http://{}/translate", addr));

        let translation = translator.translate("வணக்கம்", "en").await.unwrap();
        assert_eq!(translation.text, "Hello");
        assert_eq!(translation.source_language, "ta");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let query = &seen[0];
        assert_eq!(query["client"], "gtx");
        assert_eq!(query["sl"], "auto");
        assert_eq!(query["tl"], "en");
        assert_eq!(query["dt"], "t");
        assert_eq!(query["q"], "வணக்கம்");
    }

    #[tokio::test]
    async fn translation_service_error_status_apologizes() {
        let addr = spawn_translate_server(SeenQueries::default());
        let translator = GoogleTranslator::new(format!("http://{}/down", addr));

        let err = translator.translate("hello", "en").await.unwrap_err();
        assert!(matches!(err, TranslateError::Request(_)));

        let bot = Chatbot::new(Arc::new(translator));
        assert_eq!(bot.reply("hello").await, APOLOGY_REPLY);
    }

    #[test]
    fn google_response_segments_are_joined() {
        let body = json!([
            [["Hello. ", "வணக்கம். ", null, null, 10], ["How are you?", "எப்படி இருக்கிறீர்கள்?", null, null, 10]],
            null,
            "ta"
        ]);
        let translation = parse_google_response(&body).unwrap();
        assert_eq!(translation.text, "Hello. How are you?");
        assert_eq!(translation.source_language, "ta");
    }

    #[test]
    fn google_response_without_language_is_malformed() {
        let err = parse_google_response(&json!([[["hi", "hi"]]])).unwrap_err();
        assert!(matches!(err, TranslateError::Malformed(_)));
    }
}
