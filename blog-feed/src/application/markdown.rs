use std::collections::HashMap;

use ammonia::Builder;
use pulldown_cmark::{CodeBlockKind, CowStr, Event, Options, Parser, Tag, TagEnd, html};

use crate::domain::slug::slugify;

const HEADINGS: [&str; 6] = ["h1", "h2", "h3", "h4", "h5", "h6"];

/// Markdown поста в безопасный HTML.
///
/// Заголовки получают якоря `id`, блоки кода размечаются классами
/// `hljs language-*` для подсветки на стороне читателя.
pub fn render_markdown(source: &str) -> String {
    let parser = Parser::new_ext(
        source,
        Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_FOOTNOTES,
    );
    let events = with_code_blocks(with_heading_anchors(parser.collect()));

    let mut raw = String::with_capacity(source.len() * 3 / 2);
    html::push_html(&mut raw, events.into_iter());
    sanitize(&raw)
}

fn sanitize(raw: &str) -> String {
    let mut builder = Builder::default();
    builder.add_tag_attributes("code", &["class"]);
    for heading in HEADINGS {
        builder.add_tag_attributes(heading, &["id"]);
    }
    builder.clean(raw).to_string()
}

fn with_heading_anchors(mut events: Vec<Event<'_>>) -> Vec<Event<'_>> {
    let mut used: HashMap<String, usize> = HashMap::new();
    for index in 0..events.len() {
        if !matches!(events[index], Event::Start(Tag::Heading { id: None, .. })) {
            continue;
        }
        let anchor = unique_anchor(&mut used, &heading_text(&events[index + 1..]));
        if let Event::Start(Tag::Heading { id, .. }) = &mut events[index] {
            *id = Some(CowStr::from(anchor));
        }
    }
    events
}

fn heading_text(events: &[Event<'_>]) -> String {
    let mut text = String::new();
    for event in events {
        match event {
            Event::End(TagEnd::Heading(_)) => break,
            Event::Text(part) | Event::Code(part) => text.push_str(part),
            _ => {}
        }
    }
    text
}

fn unique_anchor(used: &mut HashMap<String, usize>, text: &str) -> String {
    let mut base = slugify(text);
    if base.is_empty() {
        base = "section".to_string();
    }
    let seen = used.entry(base.clone()).or_insert(0);
    let anchor = match *seen {
        0 => base,
        n => format!("{base}-{n}"),
    };
    *seen += 1;
    anchor
}

fn with_code_blocks(events: Vec<Event<'_>>) -> Vec<Event<'_>> {
    let mut out = Vec::with_capacity(events.len());
    let mut block: Option<(Option<String>, String)> = None;

    for event in events {
        match event {
            Event::Start(Tag::CodeBlock(kind)) => {
                let language = match kind {
                    CodeBlockKind::Fenced(info) => code_language(&info),
                    CodeBlockKind::Indented => None,
                };
                block = Some((language, String::new()));
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some((language, code)) = block.take() {
                    let html = code_block_html(language.as_deref(), &code);
                    out.push(Event::Html(CowStr::from(html)));
                }
            }
            Event::Text(text) => match block.as_mut() {
                Some((_, code)) => code.push_str(&text),
                None => out.push(Event::Text(text)),
            },
            event => {
                if block.is_none() {
                    out.push(event);
                }
            }
        }
    }
    out
}

fn code_language(info: &str) -> Option<String> {
    let language: String = info
        .split_whitespace()
        .next()?
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '+' | '-' | '#' | '_'))
        .flat_map(char::to_lowercase)
        .collect();
    match language.as_str() {
        "" => None,
        "sol" => Some("solidity".to_string()),
        _ => Some(language),
    }
}

fn code_block_html(language: Option<&str>, code: &str) -> String {
    let class = match language {
        Some(language) => format!("hljs language-{language}"),
        None => "hljs".to_string(),
    };
    format!("<pre><code class=\"{class}\">{}</code></pre>\n", escape_html(code))
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
