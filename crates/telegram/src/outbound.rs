use std::{future::Future, time::Duration};

use {
    async_trait::async_trait,
    switchboard_channels::{ChatTransport, Error as ChannelError, Result},
    switchboard_common::MessageId,
    teloxide::{
        ApiError, RequestError,
        prelude::*,
        types::{ChatId, MessageId as TelegramMessageId},
    },
    tracing::{debug, warn},
};

/// [`ChatTransport`] over the Telegram Bot API.
///
/// Messages are sent as plain text so agent output is shown verbatim.
#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
    identity: String,
    max_retries: usize,
}

impl TelegramTransport {
    pub fn new(bot: Bot, identity: impl Into<String>, max_retries: usize) -> Self {
        Self {
            bot,
            identity: identity.into(),
            max_retries,
        }
    }

    async fn run_telegram_request_with_retry<T, F, Fut>(
        &self,
        to: &str,
        operation: &'static str,
        mut request: F,
    ) -> std::result::Result<T, RequestError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, RequestError>>,
    {
        let mut retries = 0usize;

        loop {
            match request().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let Some(wait) = retry_after_duration(&err) else {
                        return Err(err);
                    };

                    if retries >= self.max_retries {
                        warn!(
                            chat_id = to,
                            operation,
                            retries,
                            max_retries = self.max_retries,
                            retry_after_secs = wait.as_secs(),
                            "telegram rate limit persisted after retries"
                        );
                        return Err(err);
                    }

                    retries += 1;
                    warn!(
                        chat_id = to,
                        operation,
                        retries,
                        max_retries = self.max_retries,
                        retry_after_secs = wait.as_secs(),
                        "telegram rate limited, waiting before retry"
                    );
                    tokio::time::sleep(wait).await;
                },
            }
        }
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    fn identity(&self) -> &str {
        &self.identity
    }

    async fn send(&self, to: &str, text: &str) -> Result<MessageId> {
        let chat_id = parse_chat_id(to)?;
        let message = self
            .run_telegram_request_with_retry(to, "send message", || {
                let req = self.bot.send_message(chat_id, text);
                async move { req.await }
            })
            .await
            .map_err(|e| ChannelError::external("telegram send message", e))?;
        debug!(
            chat_id = to,
            message_id = message.id.0,
            text_len = text.len(),
            "telegram message sent"
        );
        Ok(MessageId(i64::from(message.id.0)))
    }

    async fn edit(&self, to: &str, message_id: MessageId, text: &str) -> Result<()> {
        let chat_id = parse_chat_id(to)?;
        let message_id = parse_message_id(message_id)?;
        match self
            .run_telegram_request_with_retry(to, "edit message", || {
                let req = self.bot.edit_message_text(chat_id, message_id, text);
                async move { req.await }
            })
            .await
        {
            Ok(_) => {
                debug!(
                    chat_id = to,
                    message_id = message_id.0,
                    text_len = text.len(),
                    "telegram message edited"
                );
                Ok(())
            },
            Err(e) if is_message_not_modified_error(&e) => Ok(()),
            Err(e) => Err(ChannelError::external("telegram edit message", e)),
        }
    }
}

fn parse_chat_id(to: &str) -> Result<ChatId> {
    Ok(ChatId(to.trim().parse::<i64>()?))
}

/// Telegram message ids are i32.
fn parse_message_id(id: MessageId) -> Result<TelegramMessageId> {
    i32::try_from(id.0)
        .map(TelegramMessageId)
        .map_err(|_| ChannelError::invalid_input(format!("message id out of range: {id}")))
}

fn retry_after_duration(error: &RequestError) -> Option<Duration> {
    match error {
        RequestError::RetryAfter(wait) => Some(wait.duration()),
        _ => None,
    }
}

fn is_message_not_modified_error(error: &RequestError) -> bool {
    matches!(error, RequestError::Api(ApiError::MessageNotModified))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        axum::{Json, Router, body::Bytes, extract::State, http::Uri, routing::post},
        serde_json::{Value, json},
        std::sync::{Arc, Mutex},
        teloxide::types::Seconds,
        tokio::sync::oneshot,
    };

    #[derive(Clone)]
    struct MockTelegramApi {
        requests: Arc<Mutex<Vec<(String, Value)>>>,
        edit_response: Value,
    }

    async fn telegram_api_handler(
        State(state): State<MockTelegramApi>,
        uri: Uri,
        body: Bytes,
    ) -> Json<Value> {
        let method = uri.path().rsplit('/').next().unwrap_or_default().to_string();
        let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        state
            .requests
            .lock()
            .expect("lock requests")
            .push((method.clone(), body.clone()));

        match method.as_str() {
            "SendMessage" => Json(json!({
                "ok": true,
                "result": {
                    "message_id": 77,
                    "date": 0,
                    "chat": { "id": body["chat_id"], "type": "private", "first_name": "A" },
                    "text": body["text"],
                }
            })),
            "EditMessageText" => Json(state.edit_response.clone()),
            _ => Json(json!({ "ok": true, "result": true })),
        }
    }

    async fn start_mock(
        edit_response: Value,
    ) -> (TelegramTransport, MockTelegramApi, oneshot::Sender<()>) {
        let mock_api = MockTelegramApi {
            requests: Arc::new(Mutex::new(Vec::new())),
            edit_response,
        };
        let app = Router::new()
            .route("/{*path}", post(telegram_api_handler))
            .with_state(mock_api.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("serve mock telegram api");
        });

        let api_url = reqwest::Url::parse(&format!("http://{addr}/")).expect("parse api url");
        let bot = Bot::new("test-token").set_api_url(api_url);
        (TelegramTransport::new(bot, "switchboard_bot", 0), mock_api, shutdown_tx)
    }

    #[tokio::test]
    async fn send_returns_platform_message_id() {
        let (transport, api, _shutdown) = start_mock(json!({ "ok": true, "result": true })).await;

        let id = transport.send("-100200", "hello").await.unwrap();
        assert_eq!(id, MessageId(77));

        let requests = api.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0, "SendMessage");
        assert_eq!(requests[0].1["chat_id"], -100200);
        assert_eq!(requests[0].1["text"], "hello");
        assert!(requests[0].1.get("parse_mode").is_none());
    }

    #[tokio::test]
    async fn edit_not_modified_is_success() {
        let (transport, api, _shutdown) = start_mock(json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: message is not modified: specified new message content and reply markup are exactly the same as a current content and reply markup of the message"
        }))
        .await;

        transport
            .edit("42", MessageId(77), "same text")
            .await
            .unwrap();
        assert_eq!(api.requests.lock().unwrap()[0].0, "EditMessageText");
    }

    #[tokio::test]
    async fn edit_failure_is_reported() {
        let (transport, _api, _shutdown) = start_mock(json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: message to edit not found"
        }))
        .await;

        let err = transport.edit("42", MessageId(77), "text").await.unwrap_err();
        assert!(matches!(err, ChannelError::External { .. }));
    }

    #[tokio::test]
    async fn non_numeric_chat_id_is_rejected_without_request() {
        let (transport, api, _shutdown) = start_mock(json!({ "ok": true, "result": true })).await;
        assert!(transport.send("ops-room", "hi").await.is_err());
        assert!(api.requests.lock().unwrap().is_empty());
    }

    #[test]
    fn retry_after_duration_extracts_wait() {
        let err = RequestError::RetryAfter(Seconds::from_seconds(42));
        assert_eq!(retry_after_duration(&err), Some(Duration::from_secs(42)));
    }

    #[test]
    fn retry_after_duration_ignores_other_errors() {
        let err = RequestError::Io(std::io::Error::other("boom"));
        assert_eq!(retry_after_duration(&err), None);
    }

    #[test]
    fn is_message_not_modified_error_detects_variant() {
        let err = RequestError::Api(ApiError::MessageNotModified);
        assert!(is_message_not_modified_error(&err));
    }

    #[test]
    fn message_id_out_of_range_is_invalid_input() {
        assert!(matches!(
            parse_message_id(MessageId(i64::MAX)),
            Err(ChannelError::InvalidInput { .. })
        ));
    }
}
