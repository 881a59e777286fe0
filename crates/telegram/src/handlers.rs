//! Inbound event dispatch: commands, media submissions, recheck callbacks.
//!
//! Every path here reports its own errors to the chat that triggered it;
//! nothing below this layer is allowed to take down the polling loop.

use std::{sync::Arc, time::Duration};

use {
    mediavault_store::SettingsKey,
    tracing::{debug, warn},
};

use crate::{
    access,
    backup::BackupJob,
    ingestion::{self, MediaSubmission},
    payload::{ACTIVATE_TOKEN, Payload},
    retrieval::{self, load_settings},
    state::BotState,
};

pub(crate) const USAGE_SETFORCE: &str = "Usage: /setforce <channel_id> <join_url>";
pub(crate) const USAGE_SETDB: &str = "Usage: /setdb <channel_id>";
pub(crate) const USAGE_BACKUP: &str = "Usage: /backup <target_channel_id> <start_id> <end_id>";
pub(crate) const MSG_GATE_PROMPT: &str =
    "⚠️ Join the channel below first, then press the recheck button.";
pub(crate) const MSG_BOT_CANNOT_SEE: &str =
    "⚠️ The bot cannot see that channel. Add the bot there first.";
pub(crate) const MSG_JOIN_CONFIRMED: &str = "✅ Membership confirmed.";
pub(crate) const MSG_NOT_JOINED: &str = "❌ You haven't joined the channel yet.";
pub(crate) const MSG_SAVE_FAILED: &str = "❌ Failed to save settings.";

/// An inbound Telegram message, reduced to what dispatch needs.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub chat_id: i64,
    pub user_id: u64,
    pub text: Option<String>,
    /// Present when the message carries a video, document or audio item.
    pub media: Option<MediaSubmission>,
}

/// An inline-button press.
#[derive(Debug, Clone)]
pub struct InboundCallback {
    pub callback_id: String,
    pub user_id: u64,
    pub chat_id: i64,
    /// Id of the message carrying the keyboard, when still accessible.
    pub prompt_message_id: Option<i32>,
    pub data: String,
}

/// Handle one inbound message.
pub async fn handle_message(state: &BotState, msg: InboundMessage) -> anyhow::Result<()> {
    if let Some(text) = msg.text.clone()
        && text.starts_with('/')
    {
        return handle_command(state, &msg, &text).await;
    }

    if let Some(media) = msg.media.clone() {
        if !state.admins.contains(msg.user_id) {
            debug!(user_id = msg.user_id, "ignoring media from non-admin");
            return Ok(());
        }
        ingestion::ingest(
            state.transport.as_ref(),
            state.settings.as_ref(),
            state.config.ingest_policy,
            &state.bot_username,
            msg.chat_id,
            media,
        )
        .await?;
    }

    Ok(())
}

async fn handle_command(state: &BotState, msg: &InboundMessage, text: &str) -> anyhow::Result<()> {
    let mut parts = text.split_whitespace();
    let Some(command) = parts.next() else {
        return Ok(());
    };
    // `/start@MyBot` arrives in groups; the suffix is noise here.
    let command = command.split('@').next().unwrap_or(command);
    let args: Vec<&str> = parts.collect();
    let is_admin = state.admins.contains(msg.user_id);

    match command {
        "/start" => {
            let token = args.first().copied().unwrap_or(ACTIVATE_TOKEN);
            start_flow(state, msg.chat_id, msg.user_id, token).await?;
        }
        "/setforce" if is_admin => set_force(state, msg, &args).await?,
        "/setdb" if is_admin => set_archive(state, msg, &args).await?,
        "/status" | "/admin" if is_admin => report_status(state, msg.chat_id).await?,
        "/backup" if is_admin => spawn_backup(state, msg, &args).await?,
        other => {
            debug!(command = other, is_admin, "ignoring unhandled command");
        }
    }
    Ok(())
}

/// `/start [payload]`: gate, then deliver.
async fn start_flow(
    state: &BotState,
    chat_id: i64,
    user_id: u64,
    token: &str,
) -> anyhow::Result<()> {
    let transport = state.transport.as_ref();
    let Some(payload) = Payload::parse(token) else {
        // Malformed deep link; same terminal outcome as a missing item.
        transport
            .send_text(chat_id, retrieval::MSG_NOT_FOUND)
            .await?;
        return Ok(());
    };

    let settings = load_settings(state.settings.as_ref()).await;
    let check = access::check_membership(transport, &settings, &state.admins, user_id).await;
    if check.allows() {
        retrieval::deliver(transport, state.settings.as_ref(), chat_id, payload).await?;
        return Ok(());
    }

    match settings.force_channel_link {
        Some(link) => {
            transport
                .send_gate_prompt(chat_id, MSG_GATE_PROMPT, &link, &payload.recheck_action())
                .await?;
        }
        None => {
            // Gate is on but no join link is stored; there is nothing to show
            // the user, so let the request through.
            retrieval::deliver(transport, state.settings.as_ref(), chat_id, payload).await?;
        }
    }
    Ok(())
}

/// `/setforce <channel_id> <join_url>`
async fn set_force(state: &BotState, msg: &InboundMessage, args: &[&str]) -> anyhow::Result<()> {
    let transport = state.transport.as_ref();
    let (Some(channel_id), Some(join_url)) =
        (args.first().and_then(|a| a.parse::<i64>().ok()), args.get(1))
    else {
        transport.send_text(msg.chat_id, USAGE_SETFORCE).await?;
        return Ok(());
    };

    // Probe the channel before saving; a gate the bot cannot query would
    // fail open for everyone.
    if let Err(e) = transport.chat_member_status(channel_id, msg.user_id).await {
        warn!(channel_id, error = %e, "force channel probe failed");
        transport.send_text(msg.chat_id, MSG_BOT_CANNOT_SEE).await?;
        return Ok(());
    }

    let store = state.settings.as_ref();
    let saved = store
        .set_channel(SettingsKey::ForceChannelId, channel_id)
        .await
        .and(
            store
                .set(
                    SettingsKey::ForceChannelLink,
                    Some((*join_url).to_string()),
                )
                .await,
        );
    match saved {
        Ok(()) => {
            transport
                .send_text(
                    msg.chat_id,
                    &format!("✅ Force channel saved.\nID: {channel_id}\nLink: {join_url}"),
                )
                .await?;
        }
        Err(e) => {
            warn!(error = %e, "failed to persist force channel");
            transport.send_text(msg.chat_id, MSG_SAVE_FAILED).await?;
        }
    }
    Ok(())
}

/// `/setdb <channel_id>`
async fn set_archive(state: &BotState, msg: &InboundMessage, args: &[&str]) -> anyhow::Result<()> {
    let transport = state.transport.as_ref();
    let Some(channel_id) = args.first().and_then(|a| a.parse::<i64>().ok()) else {
        transport.send_text(msg.chat_id, USAGE_SETDB).await?;
        return Ok(());
    };

    match state
        .settings
        .set_channel(SettingsKey::ArchiveChannelId, channel_id)
        .await
    {
        Ok(()) => {
            transport
                .send_text(msg.chat_id, &format!("✅ Archive channel saved.\nID: {channel_id}"))
                .await?;
        }
        Err(e) => {
            warn!(error = %e, "failed to persist archive channel");
            transport.send_text(msg.chat_id, MSG_SAVE_FAILED).await?;
        }
    }
    Ok(())
}

/// `/status`: report the current settings record.
async fn report_status(state: &BotState, chat_id: i64) -> anyhow::Result<()> {
    let settings = load_settings(state.settings.as_ref()).await;
    let fmt_id = |id: Option<i64>| id.map_or_else(|| "not set".to_string(), |v| v.to_string());
    let text = format!(
        "⚙️ Current settings\n\n\
         Force channel: {}\n\
         Join link: {}\n\
         Archive channel: {}",
        fmt_id(settings.force_channel_id),
        settings.force_channel_link.as_deref().unwrap_or("not set"),
        fmt_id(settings.archive_channel_id),
    );
    state.transport.send_text(chat_id, &text).await?;
    Ok(())
}

/// `/backup <target_channel_id> <start_id> <end_id>`: spawn the pipeline.
async fn spawn_backup(state: &BotState, msg: &InboundMessage, args: &[&str]) -> anyhow::Result<()> {
    let transport = state.transport.as_ref();
    let parsed = (
        args.first().and_then(|a| a.parse::<i64>().ok()),
        args.get(1).and_then(|a| a.parse::<i32>().ok()),
        args.get(2).and_then(|a| a.parse::<i32>().ok()),
    );
    let (Some(target_chat), Some(start_id), Some(end_id)) = parsed else {
        transport.send_text(msg.chat_id, USAGE_BACKUP).await?;
        return Ok(());
    };
    if start_id > end_id {
        transport.send_text(msg.chat_id, USAGE_BACKUP).await?;
        return Ok(());
    }

    let settings = load_settings(state.settings.as_ref()).await;
    let Some(source_chat) = settings.archive_channel_id else {
        transport
            .send_text(msg.chat_id, ingestion::MSG_NO_ARCHIVE)
            .await?;
        return Ok(());
    };

    BackupJob {
        requester_chat: msg.chat_id,
        target_chat,
        source_chat,
        start_id,
        end_id,
        delay: Duration::from_secs(state.config.backup_delay_secs),
    }
    .spawn(Arc::clone(&state.transport));
    Ok(())
}

/// Handle a recheck button press (or any other callback).
pub async fn handle_callback(state: &BotState, cb: InboundCallback) -> anyhow::Result<()> {
    let transport = state.transport.as_ref();
    let Some(payload) = Payload::parse_callback(&cb.data) else {
        // Unknown or malformed action; just dismiss the spinner.
        transport.answer_callback(&cb.callback_id, None, false).await?;
        return Ok(());
    };

    let settings = load_settings(state.settings.as_ref()).await;
    let check =
        access::check_membership(transport, &settings, &state.admins, cb.user_id).await;
    if check.allows() {
        transport.answer_callback(&cb.callback_id, None, false).await?;
        // Best effort: the gate prompt has served its purpose.
        if let Some(prompt_id) = cb.prompt_message_id
            && let Err(e) = transport.delete_message(cb.chat_id, prompt_id).await
        {
            warn!(chat_id = cb.chat_id, prompt_id, error = %e, "failed to delete gate prompt");
        }
        match payload {
            Payload::Activate => {
                transport.send_text(cb.chat_id, MSG_JOIN_CONFIRMED).await?;
            }
            Payload::Item(_) => {
                retrieval::deliver(transport, state.settings.as_ref(), cb.chat_id, payload)
                    .await?;
            }
        }
    } else {
        transport
            .answer_callback(&cb.callback_id, Some(MSG_NOT_JOINED), true)
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use {mediavault_store::Settings, tokio_util::sync::CancellationToken};

    use super::*;
    use crate::{
        access::AdminSet,
        config::BotConfig,
        ingestion::ForwardOrigin,
        transport::{
            MemberStatus,
            testing::{Membership, MemorySettings, MockTransport},
        },
    };

    const ADMIN: u64 = 1000;
    const USER: u64 = 7;
    const ARCHIVE: i64 = -100900;

    fn make_state(transport: Arc<MockTransport>, settings: Settings) -> BotState {
        BotState {
            transport,
            settings: Arc::new(MemorySettings::with(settings)),
            admins: AdminSet::new([ADMIN]),
            config: BotConfig {
                backup_delay_secs: 0,
                ..Default::default()
            },
            bot_username: "vaultbot".into(),
            cancel: CancellationToken::new(),
        }
    }

    fn text_msg(user_id: u64, text: &str) -> InboundMessage {
        InboundMessage {
            chat_id: user_id as i64,
            user_id,
            text: Some(text.into()),
            media: None,
        }
    }

    fn archived() -> Settings {
        Settings {
            archive_channel_id: Some(ARCHIVE),
            ..Default::default()
        }
    }

    fn gated_and_archived() -> Settings {
        Settings {
            force_channel_id: Some(-100500),
            force_channel_link: Some("https://t.me/somechannel".into()),
            archive_channel_id: Some(ARCHIVE),
        }
    }

    // Scenario: archive unset, `/start 5` → configuration-missing message,
    // no replication attempted.
    #[tokio::test]
    async fn start_without_archive_reports_missing_configuration() {
        let transport = Arc::new(MockTransport::default());
        let state = make_state(Arc::clone(&transport), Settings::default());
        handle_message(&state, text_msg(USER, "/start 5"))
            .await
            .expect("handle");
        assert_eq!(
            transport.sent_texts(),
            vec![retrieval::MSG_NOT_CONFIGURED.to_string()]
        );
        assert_eq!(transport.copy_count(), 0);
    }

    // Scenario: gated non-member gets the two-button prompt; pressing
    // recheck while still outside yields an alert, not a crash.
    #[tokio::test]
    async fn gated_non_member_gets_prompt_then_alert_on_recheck() {
        let transport = Arc::new(MockTransport::default());
        *transport.membership.lock().unwrap() = Membership::Status(MemberStatus::Left);
        let state = make_state(Arc::clone(&transport), gated_and_archived());

        handle_message(&state, text_msg(USER, "/start 5"))
            .await
            .expect("handle");
        {
            let prompts = transport.prompts.lock().unwrap();
            assert_eq!(prompts.len(), 1);
            assert_eq!(prompts[0].join_url, "https://t.me/somechannel");
            assert_eq!(prompts[0].recheck_action, "check_5");
        }
        assert_eq!(transport.copy_count(), 0);

        handle_callback(
            &state,
            InboundCallback {
                callback_id: "cb1".into(),
                user_id: USER,
                chat_id: USER as i64,
                prompt_message_id: Some(33),
                data: "check_5".into(),
            },
        )
        .await
        .expect("callback");
        let answers = transport.answers.lock().unwrap();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].text.as_deref(), Some(MSG_NOT_JOINED));
        assert!(answers[0].show_alert);
        assert_eq!(transport.copy_count(), 0);
    }

    #[tokio::test]
    async fn recheck_after_joining_deletes_prompt_and_delivers() {
        let transport = Arc::new(MockTransport::default());
        let state = make_state(Arc::clone(&transport), gated_and_archived());
        handle_callback(
            &state,
            InboundCallback {
                callback_id: "cb2".into(),
                user_id: USER,
                chat_id: USER as i64,
                prompt_message_id: Some(33),
                data: "check_5".into(),
            },
        )
        .await
        .expect("callback");
        assert_eq!(*transport.deleted.lock().unwrap(), vec![(USER as i64, 33)]);
        assert_eq!(transport.copy_count(), 1);
    }

    #[tokio::test]
    async fn recheck_with_activate_payload_confirms_without_delivery() {
        let transport = Arc::new(MockTransport::default());
        let state = make_state(Arc::clone(&transport), gated_and_archived());
        handle_callback(
            &state,
            InboundCallback {
                callback_id: "cb3".into(),
                user_id: USER,
                chat_id: USER as i64,
                prompt_message_id: None,
                data: "check_only".into(),
            },
        )
        .await
        .expect("callback");
        assert_eq!(transport.sent_texts(), vec![MSG_JOIN_CONFIRMED.to_string()]);
        assert_eq!(transport.copy_count(), 0);
    }

    // Scenario: an admin forwards archive message 77, gets a share link for
    // it; a joined user running `/start 77` receives a copy of message 77.
    #[tokio::test]
    async fn ingest_then_retrieve_round_trip() {
        let transport = Arc::new(MockTransport::default());
        let state = make_state(Arc::clone(&transport), gated_and_archived());

        handle_message(
            &state,
            InboundMessage {
                chat_id: ADMIN as i64,
                user_id: ADMIN,
                text: None,
                media: Some(MediaSubmission {
                    message_id: 9,
                    forwarded_from: Some(ForwardOrigin {
                        chat_id: ARCHIVE,
                        message_id: 77,
                    }),
                }),
            },
        )
        .await
        .expect("ingest");
        assert!(
            transport.sent_texts()[0].contains("https://t.me/vaultbot?start=77"),
            "admin should receive the share link"
        );

        handle_message(&state, text_msg(USER, "/start 77"))
            .await
            .expect("start");
        let copies = transport.copies.lock().unwrap();
        assert_eq!(copies.len(), 1);
        assert_eq!(copies[0].from_chat, ARCHIVE);
        assert_eq!(copies[0].message_id, 77);
        assert_eq!(copies[0].to_chat, USER as i64);
    }

    #[tokio::test]
    async fn media_from_non_admin_is_ignored() {
        let transport = Arc::new(MockTransport::default());
        let state = make_state(Arc::clone(&transport), archived());
        handle_message(
            &state,
            InboundMessage {
                chat_id: USER as i64,
                user_id: USER,
                text: None,
                media: Some(MediaSubmission {
                    message_id: 9,
                    forwarded_from: None,
                }),
            },
        )
        .await
        .expect("handle");
        assert!(transport.sent_texts().is_empty());
        assert_eq!(transport.copy_count(), 0);
    }

    #[tokio::test]
    async fn malformed_start_payload_reads_as_not_found() {
        let transport = Arc::new(MockTransport::default());
        let state = make_state(Arc::clone(&transport), archived());
        handle_message(&state, text_msg(USER, "/start beep_boop"))
            .await
            .expect("handle");
        assert_eq!(
            transport.sent_texts(),
            vec![retrieval::MSG_NOT_FOUND.to_string()]
        );
        assert_eq!(transport.copy_count(), 0);
    }

    #[tokio::test]
    async fn gate_without_stored_link_falls_through_to_delivery() {
        let transport = Arc::new(MockTransport::default());
        *transport.membership.lock().unwrap() = Membership::Status(MemberStatus::Left);
        let state = make_state(
            Arc::clone(&transport),
            Settings {
                force_channel_id: Some(-100500),
                force_channel_link: None,
                archive_channel_id: Some(ARCHIVE),
            },
        );
        handle_message(&state, text_msg(USER, "/start 5"))
            .await
            .expect("handle");
        assert!(transport.prompts.lock().unwrap().is_empty());
        assert_eq!(transport.copy_count(), 1);
    }

    #[tokio::test]
    async fn setforce_persists_both_keys() {
        let transport = Arc::new(MockTransport::default());
        let state = make_state(Arc::clone(&transport), Settings::default());
        handle_message(
            &state,
            text_msg(ADMIN, "/setforce -100500 https://t.me/somechannel"),
        )
        .await
        .expect("handle");
        let settings = state.settings.get().await.expect("get");
        assert_eq!(settings.force_channel_id, Some(-100500));
        assert_eq!(
            settings.force_channel_link.as_deref(),
            Some("https://t.me/somechannel")
        );
        assert!(transport.sent_texts()[0].contains("Force channel saved"));
    }

    #[tokio::test]
    async fn setforce_rejects_unreachable_channel() {
        let transport = Arc::new(MockTransport::default());
        *transport.membership.lock().unwrap() = Membership::QueryFails;
        let state = make_state(Arc::clone(&transport), Settings::default());
        handle_message(
            &state,
            text_msg(ADMIN, "/setforce -100500 https://t.me/somechannel"),
        )
        .await
        .expect("handle");
        assert_eq!(transport.sent_texts(), vec![MSG_BOT_CANNOT_SEE.to_string()]);
        let settings = state.settings.get().await.expect("get");
        assert_eq!(settings.force_channel_id, None);
    }

    #[tokio::test]
    async fn setforce_with_bad_args_shows_usage() {
        let transport = Arc::new(MockTransport::default());
        let state = make_state(Arc::clone(&transport), Settings::default());
        handle_message(&state, text_msg(ADMIN, "/setforce oops"))
            .await
            .expect("handle");
        assert_eq!(transport.sent_texts(), vec![USAGE_SETFORCE.to_string()]);
    }

    #[tokio::test]
    async fn setdb_persists_archive_channel() {
        let transport = Arc::new(MockTransport::default());
        let state = make_state(Arc::clone(&transport), Settings::default());
        handle_message(&state, text_msg(ADMIN, "/setdb -100900"))
            .await
            .expect("handle");
        let settings = state.settings.get().await.expect("get");
        assert_eq!(settings.archive_channel_id, Some(-100900));
    }

    #[tokio::test]
    async fn admin_commands_from_non_admins_are_ignored() {
        let transport = Arc::new(MockTransport::default());
        let state = make_state(Arc::clone(&transport), Settings::default());
        for cmd in ["/setdb -100900", "/setforce -1 https://t.me/x", "/status", "/backup 1 2 3"] {
            handle_message(&state, text_msg(USER, cmd))
                .await
                .expect("handle");
        }
        assert!(transport.sent_texts().is_empty());
        let settings = state.settings.get().await.expect("get");
        assert_eq!(settings, Settings::default());
    }

    #[tokio::test]
    async fn status_reports_current_record() {
        let transport = Arc::new(MockTransport::default());
        let state = make_state(Arc::clone(&transport), gated_and_archived());
        handle_message(&state, text_msg(ADMIN, "/status"))
            .await
            .expect("handle");
        let texts = transport.sent_texts();
        assert!(texts[0].contains("-100500"));
        assert!(texts[0].contains("https://t.me/somechannel"));
        assert!(texts[0].contains("-100900"));
    }

    #[tokio::test]
    async fn status_reports_unset_fields() {
        let transport = Arc::new(MockTransport::default());
        let state = make_state(Arc::clone(&transport), Settings::default());
        handle_message(&state, text_msg(ADMIN, "/admin"))
            .await
            .expect("handle");
        assert!(transport.sent_texts()[0].contains("not set"));
    }

    // Scenario: `/backup 200 10 12` with archive message 11 missing →
    // total=3, success=2, failed=1.
    #[tokio::test]
    async fn backup_command_runs_to_completion_with_tally() {
        let transport = Arc::new(MockTransport::default());
        transport.fail_copy_of(11);
        let state = make_state(Arc::clone(&transport), archived());
        handle_message(&state, text_msg(ADMIN, "/backup 200 10 12"))
            .await
            .expect("handle");

        // The job is detached; wait for its completion notification.
        for _ in 0..200 {
            if transport
                .sent_texts()
                .iter()
                .any(|t| t.contains("Backup finished"))
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let texts = transport.sent_texts();
        let report = texts
            .iter()
            .find(|t| t.contains("Backup finished"))
            .expect("completion notification");
        assert!(report.contains("Total: 3"));
        assert!(report.contains("Copied: 2"));
        assert!(report.contains("Failed: 1"));
        let copies = transport.copies.lock().unwrap();
        assert!(copies.iter().all(|c| c.to_chat == 200 && c.from_chat == ARCHIVE));
    }

    #[tokio::test]
    async fn backup_without_archive_is_a_configuration_error() {
        let transport = Arc::new(MockTransport::default());
        let state = make_state(Arc::clone(&transport), Settings::default());
        handle_message(&state, text_msg(ADMIN, "/backup 200 10 12"))
            .await
            .expect("handle");
        assert_eq!(
            transport.sent_texts(),
            vec![ingestion::MSG_NO_ARCHIVE.to_string()]
        );
    }

    #[tokio::test]
    async fn backup_with_bad_args_shows_usage() {
        let transport = Arc::new(MockTransport::default());
        let state = make_state(Arc::clone(&transport), archived());
        for cmd in ["/backup", "/backup 200 ten 12", "/backup 200 12 10"] {
            handle_message(&state, text_msg(ADMIN, cmd))
                .await
                .expect("handle");
        }
        assert_eq!(transport.sent_texts(), vec![USAGE_BACKUP.to_string(); 3]);
    }

    #[tokio::test]
    async fn unknown_callback_data_is_dismissed_quietly() {
        let transport = Arc::new(MockTransport::default());
        let state = make_state(Arc::clone(&transport), archived());
        handle_callback(
            &state,
            InboundCallback {
                callback_id: "cb4".into(),
                user_id: USER,
                chat_id: USER as i64,
                prompt_message_id: None,
                data: "sessions_switch:3".into(),
            },
        )
        .await
        .expect("callback");
        let answers = transport.answers.lock().unwrap();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].text, None);
        assert!(!answers[0].show_alert);
    }

    #[tokio::test]
    async fn bot_suffixed_command_is_recognized() {
        let transport = Arc::new(MockTransport::default());
        let state = make_state(Arc::clone(&transport), archived());
        handle_message(&state, text_msg(USER, "/start@vaultbot 77"))
            .await
            .expect("handle");
        assert_eq!(transport.copy_count(), 1);
    }
}
