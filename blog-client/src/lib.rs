//! Клиентская библиотека для хостингового бэкенда блога.
//!
//! [`BackendClient`] реализует все трейты хранилищ `blog-feed` поверх двух
//! транспортов:
//! - HTTP (`reqwest`): REST-таблицы, авторизация, файловое хранилище
//! - websocket (`tokio-tungstenite`): realtime-поток изменений таблиц
//!
//! Клиент хранит текущую сессию и автоматически подставляет её токен во все
//! запросы; без сессии используется анонимный ключ проекта.
#![warn(missing_docs)]

mod auth;
mod error;
mod http_client;
mod realtime;
mod stores;

use std::sync::Arc;
use std::time::Duration;

use blog_feed::domain::user::Session;
use blog_feed::infrastructure::access_token::session_from_access_token;
use blog_feed::infrastructure::settings::Settings;
use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, warn};

pub use error::{BackendError, BackendResult};

use http_client::HttpClient;
use realtime::RealtimeClient;

#[derive(Debug, Clone)]
/// Параметры подключения к бэкенду.
pub struct BackendConfig {
    /// Базовый URL проекта, например `https://abc.example.co`.
    pub base_url: String,
    /// Публичный (анонимный) ключ проекта.
    pub anon_key: String,
    /// Бакет файлового хранилища для изображений постов.
    pub media_bucket: String,
    /// Таймаут установки HTTP-соединения.
    pub connect_timeout: Duration,
    /// Таймаут HTTP-запроса и ожидания подписки realtime.
    pub request_timeout: Duration,
    /// Период heartbeat-сообщений realtime-сокета.
    pub heartbeat: Duration,
}

impl BackendConfig {
    /// Собирает параметры из настроек приложения.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            base_url: settings.backend_url.clone(),
            anon_key: settings.backend_anon_key.clone(),
            media_bucket: settings.media_bucket.clone(),
            connect_timeout: settings.http_connect_timeout(),
            request_timeout: settings.http_request_timeout(),
            heartbeat: settings.realtime_heartbeat(),
        }
    }
}

#[derive(Debug, Clone)]
/// Клиент бэкенда: хранилища, авторизация, медиа и поток изменений.
///
/// Клоны разделяют одну и ту же сессию.
pub struct BackendClient {
    config: BackendConfig,
    http: HttpClient,
    realtime: RealtimeClient,
    sessions: Arc<watch::Sender<Option<Session>>>,
}

impl BackendClient {
    /// Создаёт клиент без сессии.
    pub fn new(config: BackendConfig) -> BackendResult<Self> {
        let http = HttpClient::new(&config)?;
        let realtime = RealtimeClient::new(&config);
        let (sessions, _) = watch::channel(None);

        Ok(Self {
            config,
            http,
            realtime,
            sessions: Arc::new(sessions),
        })
    }

    /// Параметры, с которыми создан клиент.
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Токен текущей сессии, если пользователь вошёл.
    pub fn access_token(&self) -> Option<String> {
        self.sessions
            .borrow()
            .as_ref()
            .map(|session| session.access_token.clone())
    }

    /// Восстанавливает сессию из сохранённого токена.
    ///
    /// Просроченный или нечитаемый токен игнорируется: клиент остаётся
    /// анонимным и возвращает `None`.
    pub fn restore_session(&self, token: &str) -> Option<Session> {
        let session = match session_from_access_token(token.trim()) {
            Ok(session) => session,
            Err(err) => {
                warn!(error = %err, "stored access token is unreadable");
                return None;
            }
        };
        if session.is_expired_at(Utc::now()) {
            debug!(user_id = %session.user_id, "stored access token has expired");
            return None;
        }
        self.sessions.send_replace(Some(session.clone()));
        Some(session)
    }
}
