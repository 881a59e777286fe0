use std::sync::Arc;

use {
    secrecy::ExposeSecret,
    teloxide::{
        prelude::*,
        types::{
            AllowedUpdate, BotCommand, CallbackQuery, MediaKind, Message, MessageKind,
            MessageOrigin, UpdateKind,
        },
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use mediavault_store::SettingsStore;

use crate::{
    access::AdminSet,
    config::BotConfig,
    handlers::{self, InboundCallback, InboundMessage},
    ingestion::{ForwardOrigin, MediaSubmission},
    state::BotState,
    transport::TelegramTransport,
};

/// Supervisor state of the inbound stream.
///
/// Per-event handler errors are absorbed inside dispatch; only a failing
/// `getUpdates` round moves the machine to `Recovering`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollState {
    /// Consuming updates, dispatching them sequentially.
    Listening,
    /// Stream-level failure; pause, then listen again.
    Recovering,
}

/// Connect the bot and start the polling loop.
///
/// Spawns a background task that processes updates until the returned
/// `CancellationToken` is cancelled.
pub async fn start_polling(
    config: BotConfig,
    settings: Arc<dyn SettingsStore>,
) -> anyhow::Result<CancellationToken> {
    // Client timeout must exceed the long-polling timeout (30s) so the HTTP
    // client doesn't abort the request before Telegram responds.
    let client = teloxide::net::default_reqwest_settings()
        .timeout(std::time::Duration::from_secs(45))
        .build()?;
    let bot = Bot::with_client(config.token.expose_secret(), client);

    // Verify credentials and get the username used in deep links.
    let me = bot.get_me().await?;
    let bot_username = me.username.clone().unwrap_or_default();

    // Delete any existing webhook so long polling works.
    bot.delete_webhook().send().await?;

    // Register slash commands for autocomplete in Telegram clients.
    let commands = vec![
        BotCommand::new("start", "Receive a shared file"),
        BotCommand::new("status", "Show current settings"),
        BotCommand::new("setforce", "Set the force-join channel"),
        BotCommand::new("setdb", "Set the archive channel"),
        BotCommand::new("backup", "Bulk-copy an id range to another channel"),
    ];
    if let Err(e) = bot.set_my_commands(commands).await {
        warn!("failed to register bot commands: {e}");
    }

    info!(username = %bot_username, "telegram bot connected (webhook cleared)");

    let cancel = CancellationToken::new();
    let state = Arc::new(BotState {
        transport: Arc::new(TelegramTransport::new(bot.clone())),
        settings,
        admins: AdminSet::new(config.admin_ids.iter().copied()),
        bot_username,
        cancel: cancel.clone(),
        config,
    });

    tokio::spawn(poll_loop(bot, state));

    Ok(cancel)
}

async fn poll_loop(bot: Bot, state: Arc<BotState>) {
    info!("starting telegram polling loop");
    let pause = std::time::Duration::from_secs(state.config.recovery_pause_secs);
    let mut offset: i32 = 0;
    let mut poll_state = PollState::Listening;

    loop {
        if state.cancel.is_cancelled() {
            info!("telegram polling stopped");
            break;
        }

        match poll_state {
            PollState::Recovering => {
                tokio::time::sleep(pause).await;
                poll_state = PollState::Listening;
            }
            PollState::Listening => {
                let result = bot
                    .get_updates()
                    .offset(offset)
                    .timeout(30)
                    .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::CallbackQuery])
                    .await;

                match result {
                    Ok(updates) => {
                        debug!(count = updates.len(), "got telegram updates");
                        for update in updates {
                            offset = update.id.as_offset();
                            dispatch(&state, update.kind).await;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "telegram getUpdates failed, entering recovery");
                        poll_state = PollState::Recovering;
                    }
                }
            }
        }
    }
}

/// Route one update to its handler, absorbing the handler's error.
async fn dispatch(state: &BotState, kind: UpdateKind) {
    match kind {
        UpdateKind::Message(msg) => {
            let chat_id = msg.chat.id.0;
            let Some(inbound) = inbound_message(&msg) else {
                debug!(chat_id, "ignoring message without a sender");
                return;
            };
            if let Err(e) = handlers::handle_message(state, inbound).await {
                error!(chat_id, error = %e, "error handling telegram message");
            }
        }
        UpdateKind::CallbackQuery(query) => {
            debug!(callback_data = ?query.data, "received telegram callback query");
            let Some(inbound) = inbound_callback(&query) else {
                return;
            };
            if let Err(e) = handlers::handle_callback(state, inbound).await {
                error!(error = %e, "error handling telegram callback query");
            }
        }
        other => {
            debug!("ignoring non-message update: {other:?}");
        }
    }
}

fn inbound_message(msg: &Message) -> Option<InboundMessage> {
    let user_id = msg.from.as_ref()?.id.0;
    Some(InboundMessage {
        chat_id: msg.chat.id.0,
        user_id,
        text: msg.text().map(ToOwned::to_owned),
        media: media_submission(msg),
    })
}

/// Reduce a media message (video/document/audio class) to a submission,
/// carrying channel forward provenance when the platform reports it.
fn media_submission(msg: &Message) -> Option<MediaSubmission> {
    let MessageKind::Common(common) = &msg.kind else {
        return None;
    };
    match common.media_kind {
        MediaKind::Video(_) | MediaKind::Document(_) | MediaKind::Audio(_) => {}
        _ => return None,
    }
    let forwarded_from = match msg.forward_origin() {
        Some(MessageOrigin::Channel {
            chat, message_id, ..
        }) => Some(ForwardOrigin {
            chat_id: chat.id.0,
            message_id: message_id.0,
        }),
        _ => None,
    };
    Some(MediaSubmission {
        message_id: msg.id.0,
        forwarded_from,
    })
}

fn inbound_callback(query: &CallbackQuery) -> Option<InboundCallback> {
    let data = query.data.clone()?;
    // Without the originating message there is no chat to act on.
    let message = query.message.as_ref()?;
    Some(InboundCallback {
        callback_id: query.id.clone(),
        user_id: query.from.id.0,
        chat_id: message.chat().id.0,
        prompt_message_id: Some(message.id().0),
        data,
    })
}
