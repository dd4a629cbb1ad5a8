use std::time::Duration;

use {
    secrecy::ExposeSecret,
    switchboard_channels::InboundSender,
    teloxide::{
        ApiError, RequestError,
        prelude::*,
        types::{AllowedUpdate, UpdateKind},
    },
    tokio::task::JoinHandle,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{Result, config::TelegramAccountConfig, handlers, outbound::TelegramTransport};

/// A connected Telegram bot.
pub struct TelegramBot {
    bot: Bot,
    identity: String,
    username: Option<String>,
    config: TelegramAccountConfig,
}

impl TelegramBot {
    /// Verify the token with `getMe` and clear any webhook so long polling
    /// works.
    pub async fn connect(config: TelegramAccountConfig) -> Result<Self> {
        let client = teloxide::net::default_reqwest_settings()
            .timeout(config.client_timeout())
            .build()?;
        let bot = Bot::with_client(config.token.expose_secret(), client);

        let me = bot.get_me().await?;
        let username = me.user.username.clone();
        let identity = me.user.id.0.to_string();

        bot.delete_webhook().send().await?;

        info!(
            identity,
            username = ?username,
            "telegram bot connected (webhook cleared)"
        );

        Ok(Self {
            bot,
            identity,
            username,
            config,
        })
    }

    /// Bot user id, used to tell this bot's messages apart from other bots'.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn transport(&self) -> TelegramTransport {
        TelegramTransport::new(
            self.bot.clone(),
            self.identity.clone(),
            self.config.retry_after_max_retries,
        )
    }

    /// Poll for updates until `cancel` fires, forwarding each text message
    /// to `inbound` in arrival order.
    pub fn start_polling(
        &self,
        inbound: InboundSender,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let bot = self.bot.clone();
        let identity = self.identity.clone();
        let poll_timeout = self.config.poll_timeout_secs;
        let retry_delay = Duration::from_secs(self.config.poll_retry_secs);

        tokio::spawn(async move {
            info!(identity, "starting telegram polling loop");
            let mut offset: i32 = 0;

            loop {
                let request = bot
                    .get_updates()
                    .offset(offset)
                    .timeout(poll_timeout)
                    .allowed_updates(vec![AllowedUpdate::Message]);

                let result = tokio::select! {
                    () = cancel.cancelled() => break,
                    result = request.send() => result,
                };

                match result {
                    Ok(updates) => {
                        debug!(count = updates.len(), "got telegram updates");
                        for update in updates {
                            offset = update.id.as_offset();
                            let UpdateKind::Message(msg) = update.kind else {
                                debug!("ignoring non-message update");
                                continue;
                            };
                            let Some(message) = handlers::to_inbound(&msg, &identity) else {
                                debug!(chat_id = msg.chat.id.0, "ignoring non-text message");
                                continue;
                            };
                            debug!(chat_id = msg.chat.id.0, "received telegram message");
                            if inbound.send(message).await.is_err() {
                                info!("inbound receiver dropped, stopping polling");
                                return;
                            }
                        }
                    },
                    Err(RequestError::Api(ApiError::TerminatedByOtherGetUpdates)) => {
                        warn!(
                            "telegram polling stopped: another instance is already running with this token"
                        );
                        cancel.cancel();
                        break;
                    },
                    Err(e) => {
                        warn!(error = %e, "telegram getUpdates failed");
                        tokio::select! {
                            () = cancel.cancelled() => break,
                            () = tokio::time::sleep(retry_delay) => {},
                        }
                    },
                }
            }
            info!("telegram polling stopped");
        })
    }
}
