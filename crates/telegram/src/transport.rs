use {
    async_trait::async_trait,
    teloxide::{
        payloads::{AnswerCallbackQuerySetters, SendMessageSetters},
        prelude::*,
        types::{ChatId, InlineKeyboardButton, InlineKeyboardMarkup, MessageId, UserId},
    },
};

use crate::error::{Error, Result};

/// Membership status of a user in a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberStatus {
    Owner,
    Administrator,
    Member,
    Restricted,
    Left,
    Banned,
}

impl MemberStatus {
    /// Statuses that count as "joined" for the gate.
    #[must_use]
    pub fn is_joined(self) -> bool {
        matches!(self, Self::Owner | Self::Administrator | Self::Member)
    }
}

impl From<teloxide::types::ChatMemberStatus> for MemberStatus {
    fn from(status: teloxide::types::ChatMemberStatus) -> Self {
        use teloxide::types::ChatMemberStatus;
        match status {
            ChatMemberStatus::Owner => Self::Owner,
            ChatMemberStatus::Administrator => Self::Administrator,
            ChatMemberStatus::Member => Self::Member,
            ChatMemberStatus::Restricted => Self::Restricted,
            ChatMemberStatus::Left => Self::Left,
            ChatMemberStatus::Banned => Self::Banned,
        }
    }
}

/// Capability interface over the messaging platform.
///
/// Every service goes through this trait; only [`TelegramTransport`] and the
/// polling loop in `bot.rs` speak teloxide. A single failed call must degrade
/// to a reported error at the call site, never tear down dispatch.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()>;

    /// Send the gate prompt: one join-link button, one recheck callback
    /// button carrying `recheck_action`.
    async fn send_gate_prompt(
        &self,
        chat_id: i64,
        text: &str,
        join_url: &str,
        recheck_action: &str,
    ) -> Result<()>;

    /// Replicate one message without a forward tag. Returns the id assigned
    /// to the copy in the destination chat.
    async fn copy_message(&self, to_chat: i64, from_chat: i64, message_id: i32) -> Result<i32>;

    async fn chat_member_status(&self, chat_id: i64, user_id: u64) -> Result<MemberStatus>;

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<()>;

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
        show_alert: bool,
    ) -> Result<()>;
}

/// The real transport, backed by a teloxide [`Bot`].
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        self.bot.send_message(ChatId(chat_id), text).await?;
        Ok(())
    }

    async fn send_gate_prompt(
        &self,
        chat_id: i64,
        text: &str,
        join_url: &str,
        recheck_action: &str,
    ) -> Result<()> {
        let join = url::Url::parse(join_url)
            .map_err(|e| Error::message(format!("invalid join link {join_url}: {e}")))?;
        let keyboard = InlineKeyboardMarkup::new(vec![
            vec![InlineKeyboardButton::url("📢 Join channel", join)],
            vec![InlineKeyboardButton::callback(
                "♻️ I have joined",
                recheck_action.to_string(),
            )],
        ]);
        self.bot
            .send_message(ChatId(chat_id), text)
            .reply_markup(keyboard)
            .await?;
        Ok(())
    }

    async fn copy_message(&self, to_chat: i64, from_chat: i64, message_id: i32) -> Result<i32> {
        let copied = self
            .bot
            .copy_message(ChatId(to_chat), ChatId(from_chat), MessageId(message_id))
            .await?;
        Ok(copied.0)
    }

    async fn chat_member_status(&self, chat_id: i64, user_id: u64) -> Result<MemberStatus> {
        let member = self
            .bot
            .get_chat_member(ChatId(chat_id), UserId(user_id))
            .await?;
        Ok(member.kind.status().into())
    }

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<()> {
        self.bot
            .delete_message(ChatId(chat_id), MessageId(message_id))
            .await?;
        Ok(())
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
        show_alert: bool,
    ) -> Result<()> {
        let mut req = self.bot.answer_callback_query(callback_id);
        if let Some(text) = text {
            req = req.text(text);
        }
        if show_alert {
            req = req.show_alert(true);
        }
        req.await?;
        Ok(())
    }
}
