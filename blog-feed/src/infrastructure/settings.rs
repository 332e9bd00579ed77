use std::time::Duration;

use anyhow::{Context, Result, anyhow};

/// Настройки из переменных окружения.
#[derive(Debug, Clone)]
pub struct Settings {
    pub backend_url: String,
    pub backend_anon_key: String,
    pub log_level: String,
    pub feed_page_size: u64,
    pub autosave_delay_ms: u64,
    pub media_bucket: String,
    pub media_max_bytes: u64,
    pub http_connect_timeout_secs: u64,
    pub http_request_timeout_secs: u64,
    pub realtime_heartbeat_secs: u64,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let backend_url = get_required(&lookup, "BACKEND_URL")?
            .trim_end_matches('/')
            .to_string();
        if !backend_url.starts_with("http://") && !backend_url.starts_with("https://") {
            return Err(anyhow!("BACKEND_URL must start with http:// or https://"));
        }
        let backend_anon_key = get_required(&lookup, "BACKEND_ANON_KEY")?;

        let log_level = lookup("LOG_LEVEL")
            .or_else(|| lookup("RUST_LOG"))
            .unwrap_or_else(|| "info".to_string());
        let media_bucket = lookup("MEDIA_BUCKET")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| "post-images".to_string());

        Ok(Self {
            backend_url,
            backend_anon_key,
            log_level,
            feed_page_size: parse_u64(&lookup, "FEED_PAGE_SIZE", 15)?,
            autosave_delay_ms: parse_u64(&lookup, "AUTOSAVE_DELAY_MS", 5000)?,
            media_bucket,
            media_max_bytes: parse_u64(&lookup, "MEDIA_MAX_BYTES", 5 * 1024 * 1024)?,
            http_connect_timeout_secs: parse_u64(&lookup, "HTTP_CONNECT_TIMEOUT_SECS", 5)?,
            http_request_timeout_secs: parse_u64(&lookup, "HTTP_REQUEST_TIMEOUT_SECS", 15)?,
            realtime_heartbeat_secs: parse_u64(&lookup, "REALTIME_HEARTBEAT_SECS", 30)?,
        })
    }

    pub fn autosave_delay(&self) -> Duration {
        Duration::from_millis(self.autosave_delay_ms)
    }

    pub fn http_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.http_connect_timeout_secs)
    }

    pub fn http_request_timeout(&self) -> Duration {
        Duration::from_secs(self.http_request_timeout_secs)
    }

    pub fn realtime_heartbeat(&self) -> Duration {
        Duration::from_secs(self.realtime_heartbeat_secs)
    }
}

fn get_required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    let value = lookup(key).with_context(|| format!("{key} is required"))?;
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(anyhow!("{key} must not be empty"));
    }
    Ok(value)
}

fn parse_u64(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Result<u64> {
    let value = match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .with_context(|| format!("Failed to parse {key}, expecting positive integer"))?,
        None => default,
    };

    if value == 0 {
        return Err(anyhow!("{key} must be > 0"));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::Settings;

    fn settings(pairs: &[(&str, &str)]) -> anyhow::Result<Settings> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_required_vars_are_set() {
        let settings = settings(&[
            ("BACKEND_URL", "https://example.supabase.co/"),
            ("BACKEND_ANON_KEY", "anon"),
        ])
        .expect("settings must load");

        assert_eq!(settings.backend_url, "https://example.supabase.co");
        assert_eq!(settings.feed_page_size, 15);
        assert_eq!(settings.autosave_delay_ms, 5000);
        assert_eq!(settings.media_bucket, "post-images");
        assert_eq!(settings.media_max_bytes, 5 * 1024 * 1024);
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.realtime_heartbeat().as_secs(), 30);
    }

    #[test]
    fn missing_required_var_is_reported_by_name() {
        let err = settings(&[("BACKEND_URL", "https://example.supabase.co")])
            .expect_err("anon key is required");
        assert!(err.to_string().contains("BACKEND_ANON_KEY"));
    }

    #[test]
    fn zero_and_garbage_numbers_are_rejected() {
        let base = [
            ("BACKEND_URL", "http://localhost:54321"),
            ("BACKEND_ANON_KEY", "anon"),
        ];

        let mut zero = base.to_vec();
        zero.push(("FEED_PAGE_SIZE", "0"));
        assert!(settings(&zero).is_err());

        let mut garbage = base.to_vec();
        garbage.push(("AUTOSAVE_DELAY_MS", "soon"));
        assert!(settings(&garbage).is_err());
    }

    #[test]
    fn backend_url_must_be_http() {
        assert!(settings(&[("BACKEND_URL", "ftp://x"), ("BACKEND_ANON_KEY", "anon")]).is_err());
    }
}
