use blog_feed::DomainError;
use thiserror::Error;

#[derive(Debug, Error)]
/// Ошибки клиентской библиотеки `blog-client`.
pub enum BackendError {
    /// Ошибка HTTP-транспорта (`reqwest`).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Ошибка websocket-соединения realtime.
    #[error("websocket error: {0}")]
    WebSocket(#[source] Box<tokio_tungstenite::tungstenite::Error>),

    /// Нарушение протокола realtime (отказ в подписке, неожиданный ответ).
    #[error("realtime protocol error: {0}")]
    Protocol(String),

    /// Требуется авторизация (отсутствует/просрочен токен).
    #[error("unauthorized")]
    Unauthorized,

    /// Политика доступа бэкенда запретила операцию.
    #[error("forbidden")]
    Forbidden,

    /// Неверный e-mail или пароль.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Запрошенный ресурс не найден.
    #[error("not found")]
    NotFound,

    /// Нарушение уникальности (например, повторный slug).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Некорректный запрос или отказ бэкенда.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Ответ бэкенда не совпал с ожидаемой схемой.
    #[error("decode error: {0}")]
    Decode(String),
}

/// Результат операций `blog-client`.
pub type BackendResult<T> = Result<T, BackendError>;

/// Код PostgreSQL для нарушения уникального ограничения.
const UNIQUE_VIOLATION: &str = "23505";

impl BackendError {
    pub(crate) fn from_http_status(
        status: reqwest::StatusCode,
        code: Option<&str>,
        message: Option<String>,
    ) -> Self {
        let message = message.unwrap_or_else(|| format!("http status {status}"));
        if code == Some(UNIQUE_VIOLATION) {
            return Self::Conflict(message);
        }
        if matches!(code, Some("invalid_grant" | "invalid_credentials")) {
            return Self::InvalidCredentials;
        }
        match status {
            reqwest::StatusCode::UNAUTHORIZED => Self::Unauthorized,
            reqwest::StatusCode::FORBIDDEN => Self::Forbidden,
            reqwest::StatusCode::NOT_FOUND => Self::NotFound,
            reqwest::StatusCode::CONFLICT => Self::Conflict(message),
            _ => Self::InvalidRequest(message),
        }
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_http_status(status, None, None);
        }
        if err.is_decode() {
            return Self::Decode(err.to_string());
        }
        Self::Http(err)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for BackendError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}

impl From<BackendError> for DomainError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Unauthorized => DomainError::Unauthorized,
            BackendError::Forbidden => DomainError::Forbidden,
            BackendError::InvalidCredentials => DomainError::InvalidCredentials,
            BackendError::NotFound => DomainError::NotFound("backend resource".to_string()),
            BackendError::Conflict(message) => DomainError::AlreadyExists(message),
            BackendError::Decode(message) => DomainError::Unexpected(message),
            other => DomainError::Backend(other.to_string()),
        }
    }
}
