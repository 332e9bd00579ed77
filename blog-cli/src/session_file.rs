use std::fs;
use std::io;
use std::path::Path;

pub const TOKEN_FILE: &str = ".blog_session";

pub fn parse_token_content(raw: &str) -> Option<String> {
    let token = raw.trim().to_string();
    if token.is_empty() {
        return None;
    }
    Some(token)
}

pub fn load_token(path: &Path) -> io::Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(path)?;
    Ok(parse_token_content(&raw))
}

pub fn persist_token(path: &Path, token: &str) -> io::Result<()> {
    fs::write(path, token)
}

pub fn clear_token(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
