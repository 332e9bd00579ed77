use reqwest::header::{CONTENT_RANGE, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{Deserialize, de::DeserializeOwned};

use crate::BackendConfig;
use crate::error::{BackendError, BackendResult};

const REST_PREFIX: &str = "/rest/v1";

#[derive(Debug, Deserialize)]
struct ErrorResponseDto {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

impl ErrorResponseDto {
    fn code(&self) -> Option<&str> {
        self.code
            .as_deref()
            .or(self.error_code.as_deref())
            .or(self.error.as_deref())
    }

    fn into_message(self) -> Option<String> {
        self.message
            .or(self.error_description)
            .or(self.msg)
            .or(self.error)
    }
}

/// Как бэкенд должен ответить на запрос записи.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Prefer {
    None,
    CountExact,
    ReturnRepresentation,
    ReturnMinimal,
}

impl Prefer {
    fn header_value(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::CountExact => Some("count=exact"),
            Self::ReturnRepresentation => Some("return=representation"),
            Self::ReturnMinimal => Some("return=minimal"),
        }
    }
}

#[derive(Debug, Clone)]
/// HTTP-клиент для REST-, auth- и storage-эндпоинтов бэкенда.
pub(crate) struct HttpClient {
    base_url: String,
    anon_key: String,
    client: Client,
}

impl HttpClient {
    pub(crate) fn new(config: &BackendConfig) -> BackendResult<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            client,
        })
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Запрос с ключом проекта; без сессии авторизуется анонимным ключом.
    pub(crate) fn request(&self, method: Method, path: &str, token: Option<&str>) -> RequestBuilder {
        self.client
            .request(method, self.endpoint(path))
            .header("apikey", &self.anon_key)
            .bearer_auth(token.unwrap_or(&self.anon_key))
    }

    /// Запрос к таблице через REST-префикс.
    pub(crate) fn table(
        &self,
        method: Method,
        table: &str,
        token: Option<&str>,
        prefer: Prefer,
    ) -> RequestBuilder {
        let request = self.request(method, &format!("{REST_PREFIX}/{table}"), token);
        match prefer.header_value() {
            Some(value) => request.header("Prefer", value),
            None => request,
        }
    }

    async fn decode_error(response: Response) -> BackendError {
        let status = response.status();

        match response.json::<ErrorResponseDto>().await {
            Ok(body) => {
                let code = body.code().map(str::to_string);
                BackendError::from_http_status(status, code.as_deref(), body.into_message())
            }
            Err(_) => BackendError::from_http_status(status, None, None),
        }
    }

    async fn send_checked(request: RequestBuilder) -> BackendResult<Response> {
        let response = request.send().await.map_err(BackendError::from_reqwest)?;
        if !response.status().is_success() {
            return Err(Self::decode_error(response).await);
        }
        Ok(response)
    }

    /// универсальный helper: отправить запрос и разобрать json-ответ
    pub(crate) async fn send_json<TRes>(request: RequestBuilder) -> BackendResult<TRes>
    where
        TRes: DeserializeOwned,
    {
        Self::send_checked(request)
            .await?
            .json::<TRes>()
            .await
            .map_err(BackendError::from_reqwest)
    }

    /// Как `send_json`, но дополнительно читает общее число строк из
    /// заголовка `Content-Range`.
    pub(crate) async fn send_counted<TRes>(
        request: RequestBuilder,
    ) -> BackendResult<(TRes, Option<u64>)>
    where
        TRes: DeserializeOwned,
    {
        let response = Self::send_checked(request).await?;
        let total = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(content_range_total);
        let body = response
            .json::<TRes>()
            .await
            .map_err(BackendError::from_reqwest)?;
        Ok((body, total))
    }

    pub(crate) async fn send_empty(request: RequestBuilder) -> BackendResult<()> {
        Self::send_checked(request).await.map(|_| ())
    }

    pub(crate) fn upload_request(
        &self,
        path: &str,
        token: Option<&str>,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> RequestBuilder {
        self.request(Method::POST, path, token)
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(bytes)
    }
}

/// Разбирает `0-14/42` или `*/0`; `*/*` означает, что счёт не запрашивался.
pub(crate) fn content_range_total(header: &str) -> Option<u64> {
    let (_, total) = header.rsplit_once('/')?;
    total.trim().parse().ok()
}

/// Значение фильтра равенства, например `eq.rust`.
pub(crate) fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

/// Фильтр `in.(a,b,c)`.
pub(crate) fn any_of<T: std::fmt::Display>(values: &[T]) -> String {
    let joined = values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");
    format!("in.({joined})")
}

/// Шаблон `ilike` для подстрочного поиска.
///
/// Символы, которые ломают синтаксис фильтров (`,()*%:"\`), выбрасываются;
/// пустой результат означает, что искать нечего.
pub(crate) fn ilike_pattern(needle: &str) -> Option<String> {
    let clean: String = needle
        .trim()
        .chars()
        .filter(|c| !matches!(c, ',' | '(' | ')' | '*' | '%' | ':' | '"' | '\\'))
        .collect();
    let clean = clean.trim();
    if clean.is_empty() {
        return None;
    }
    Some(format!("*{clean}*"))
}
