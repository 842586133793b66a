//! Channel senders and the provider that assembles them from settings.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, bail};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::debug;

use strmforge_config::{
    EMBY_SETTINGS_KEY, EmbySettings, TELEGRAM_SETTINGS_KEY, TelegramSettings, WEWORK_SETTINGS_KEY,
    WeworkSettings,
};
use strmforge_core::NotificationEvent;
use strmforge_data::SettingsStore;

use crate::template::{default_template, render};

const TELEGRAM_API_HOST: &str = "https://api.telegram.org";

/// Channel key for Telegram deliveries.
pub const TELEGRAM_CHANNEL: &str = "telegram";
/// Channel key for WeWork deliveries.
pub const WEWORK_CHANNEL: &str = "wework";
/// Channel key for Emby library refreshes.
pub const EMBY_CHANNEL: &str = "emby";

/// One delivery backend; implementations must tolerate repeated delivery of
/// the same payload.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Stable channel key matching queue rows.
    fn kind(&self) -> &'static str;

    /// Deliver one rendered notification.
    async fn deliver(
        &self,
        event: NotificationEvent,
        payload: &Map<String, Value>,
    ) -> anyhow::Result<()>;
}

/// Source of the currently configured channel set.
#[async_trait]
pub trait ChannelProvider: Send + Sync {
    /// Assemble the channel map from current configuration.
    async fn channels(&self) -> anyhow::Result<HashMap<String, Arc<dyn NotificationChannel>>>;
}

/// Telegram Bot API sender.
pub struct TelegramChannel {
    http: reqwest::Client,
    settings: TelegramSettings,
}

impl TelegramChannel {
    /// Construct a sender over the shared HTTP client.
    #[must_use]
    pub const fn new(http: reqwest::Client, settings: TelegramSettings) -> Self {
        Self { http, settings }
    }
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    fn kind(&self) -> &'static str {
        TELEGRAM_CHANNEL
    }

    async fn deliver(
        &self,
        event: NotificationEvent,
        payload: &Map<String, Value>,
    ) -> anyhow::Result<()> {
        let template = self
            .settings
            .template
            .as_deref()
            .unwrap_or_else(|| default_template(event));
        let text = render(template, payload);
        let host = self
            .settings
            .api_host
            .as_deref()
            .unwrap_or(TELEGRAM_API_HOST)
            .trim_end_matches('/');
        let url = format!("{host}/bot{}/sendMessage", self.settings.bot_token);

        let response = self
            .http
            .post(&url)
            .json(&json!({
                "chat_id": self.settings.chat_id,
                "text": text,
            }))
            .send()
            .await
            .context("telegram request failed")?;
        if !response.status().is_success() {
            bail!("telegram answered status {}", response.status());
        }
        debug!(event = event.as_str(), "telegram notification delivered");
        Ok(())
    }
}

/// WeWork group-robot webhook sender.
pub struct WeworkChannel {
    http: reqwest::Client,
    settings: WeworkSettings,
}

impl WeworkChannel {
    /// Construct a sender over the shared HTTP client.
    #[must_use]
    pub const fn new(http: reqwest::Client, settings: WeworkSettings) -> Self {
        Self { http, settings }
    }
}

#[async_trait]
impl NotificationChannel for WeworkChannel {
    fn kind(&self) -> &'static str {
        WEWORK_CHANNEL
    }

    async fn deliver(
        &self,
        event: NotificationEvent,
        payload: &Map<String, Value>,
    ) -> anyhow::Result<()> {
        let template = self
            .settings
            .template
            .as_deref()
            .unwrap_or_else(|| default_template(event));
        let text = render(template, payload);

        let response = self
            .http
            .post(&self.settings.webhook_url)
            .json(&json!({
                "msgtype": "text",
                "text": { "content": text },
            }))
            .send()
            .await
            .context("wework request failed")?;
        if !response.status().is_success() {
            bail!("wework answered status {}", response.status());
        }
        debug!(event = event.as_str(), "wework notification delivered");
        Ok(())
    }
}

/// Emby sender; completed runs trigger a library refresh, other events are
/// acknowledged without a call.
pub struct EmbyChannel {
    http: reqwest::Client,
    settings: EmbySettings,
}

impl EmbyChannel {
    /// Construct a sender over the shared HTTP client.
    #[must_use]
    pub const fn new(http: reqwest::Client, settings: EmbySettings) -> Self {
        Self { http, settings }
    }
}

#[async_trait]
impl NotificationChannel for EmbyChannel {
    fn kind(&self) -> &'static str {
        EMBY_CHANNEL
    }

    async fn deliver(
        &self,
        event: NotificationEvent,
        _payload: &Map<String, Value>,
    ) -> anyhow::Result<()> {
        if event != NotificationEvent::TaskCompleted {
            return Ok(());
        }
        let url = format!(
            "{}/Library/Refresh?api_key={}",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.api_key
        );
        let response = self
            .http
            .post(&url)
            .send()
            .await
            .context("emby request failed")?;
        if !response.status().is_success() {
            bail!("emby answered status {}", response.status());
        }
        debug!("emby library refresh requested");
        Ok(())
    }
}

/// Provider assembling channels from the settings rows on every poll, so
/// credential changes apply without a restart.
pub struct SettingsChannelProvider {
    settings: SettingsStore,
    http: reqwest::Client,
}

impl SettingsChannelProvider {
    /// Construct a provider over the settings store.
    #[must_use]
    pub const fn new(settings: SettingsStore, http: reqwest::Client) -> Self {
        Self { settings, http }
    }

    /// Which channel keys are currently configured; used by the bridge to
    /// fan out queue rows.
    ///
    /// # Errors
    ///
    /// Returns an error when the settings store fails.
    pub async fn configured_kinds(&self) -> anyhow::Result<Vec<String>> {
        let mut kinds = Vec::new();
        if self
            .settings
            .get::<TelegramSettings>(TELEGRAM_SETTINGS_KEY)
            .await?
            .is_some()
        {
            kinds.push(TELEGRAM_CHANNEL.to_string());
        }
        if self
            .settings
            .get::<WeworkSettings>(WEWORK_SETTINGS_KEY)
            .await?
            .is_some()
        {
            kinds.push(WEWORK_CHANNEL.to_string());
        }
        if self
            .settings
            .get::<EmbySettings>(EMBY_SETTINGS_KEY)
            .await?
            .is_some()
        {
            kinds.push(EMBY_CHANNEL.to_string());
        }
        Ok(kinds)
    }
}

#[async_trait]
impl ChannelProvider for SettingsChannelProvider {
    async fn channels(&self) -> anyhow::Result<HashMap<String, Arc<dyn NotificationChannel>>> {
        let mut channels: HashMap<String, Arc<dyn NotificationChannel>> = HashMap::new();
        if let Some(telegram) = self
            .settings
            .get::<TelegramSettings>(TELEGRAM_SETTINGS_KEY)
            .await?
        {
            channels.insert(
                TELEGRAM_CHANNEL.to_string(),
                Arc::new(TelegramChannel::new(self.http.clone(), telegram)),
            );
        }
        if let Some(wework) = self
            .settings
            .get::<WeworkSettings>(WEWORK_SETTINGS_KEY)
            .await?
        {
            channels.insert(
                WEWORK_CHANNEL.to_string(),
                Arc::new(WeworkChannel::new(self.http.clone(), wework)),
            );
        }
        if let Some(emby) = self.settings.get::<EmbySettings>(EMBY_SETTINGS_KEY).await? {
            channels.insert(
                EMBY_CHANNEL.to_string(),
                Arc::new(EmbyChannel::new(self.http.clone(), emby)),
            );
        }
        Ok(channels)
    }
}
