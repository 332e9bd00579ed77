use std::collections::HashMap;

use blog_feed::application::autosave::AutosaveStatus;
use blog_feed::application::markdown::render_markdown;
use blog_feed::application::media_service::UploadedImage;
use blog_feed::application::reader_service::{CategoryPage, PostDetail, SearchResults};
use blog_feed::domain::post::Post;
use blog_feed::domain::taxonomy::{Category, Tag};
use blog_feed::domain::user::{Session, ViewerContext};
use blog_feed::feed::{CursorStatus, FeedSnapshot};
use uuid::Uuid;

pub fn print_session(title: &str, session: &Session) {
    println!("{title}");
    println!("user_id: {}", session.user_id);
    if let Some(email) = &session.email {
        println!("email: {email}");
    }
    if let Some(expires_at) = session.expires_at {
        println!("expires_at: {expires_at}");
    }
}

pub fn print_viewer(viewer: &ViewerContext) {
    match viewer.user_id {
        Some(user_id) => {
            println!("user_id: {user_id}");
            println!("admin: {}", viewer.privileged);
        }
        None => println!("Аноним (вход не выполнен)"),
    }
}

pub fn print_post(title: &str, post: &Post) {
    println!("{title}");
    println!("id: {}", post.id);
    println!("slug: {}", post.slug);
    println!("title: {}", post.title);
    println!("state: {}", post_state(post));
    if let Some(excerpt) = &post.excerpt {
        println!("excerpt: {excerpt}");
    }
    println!("author_id: {}", post.author_id);
    println!("created_at: {}", post.created_at);
    if let Some(updated_at) = post.updated_at {
        println!("updated_at: {updated_at}");
    }
}

pub fn print_post_detail(detail: &PostDetail, html: bool) {
    print_post("Пост", &detail.post);
    if !detail.categories.is_empty() {
        let names: Vec<&str> = detail.categories.iter().map(|c| c.name.as_str()).collect();
        println!("categories: {}", names.join(", "));
    }
    if !detail.tags.is_empty() {
        let names: Vec<String> = detail.tags.iter().map(|t| format!("#{}", t.name)).collect();
        println!("tags: {}", names.join(" "));
    }
    println!();
    if html {
        println!("{}", render_markdown(&detail.post.content));
    } else {
        println!("{}", detail.post.content);
    }
}

pub fn print_feed(snapshot: &FeedSnapshot<Post>) {
    println!(
        "Постов: {} из {} ({})",
        snapshot.rows.len(),
        snapshot.total,
        status_label(snapshot.status)
    );
    for post in &snapshot.rows {
        println!("- {}", post_line(post));
    }
    if let Some(error) = &snapshot.error {
        println!("Ошибка загрузки: {error}");
    }
}

pub fn print_category_feed(snapshot: &FeedSnapshot<Category>) {
    println!("Категорий: {}", snapshot.total);
    for category in &snapshot.rows {
        println!("- {} ({})", category.name, category.slug);
    }
}

pub fn print_categories(categories: &[Category], counts: &HashMap<Uuid, u64>) {
    println!("Категорий: {}", categories.len());
    for category in categories {
        let count = counts.get(&category.id).copied().unwrap_or(0);
        println!(
            "- [{}] {} ({}), постов: {count}",
            category.id, category.name, category.slug
        );
    }
}

pub fn print_category_page(page: &CategoryPage) {
    println!("Категория: {} ({})", page.category.name, page.category.slug);
    if let Some(description) = &page.category.description {
        println!("{description}");
    }
    println!("Постов: {}", page.posts.len());
    for post in &page.posts {
        println!("- {}", post_line(post));
    }
}

pub fn print_category(title: &str, category: &Category) {
    println!("{title}");
    println!("id: {}", category.id);
    println!("name: {}", category.name);
    println!("slug: {}", category.slug);
    if let Some(description) = &category.description {
        println!("description: {description}");
    }
}

pub fn print_tags(tags: &[Tag]) {
    println!("Тегов: {}", tags.len());
    for tag in tags {
        println!("- [{}] #{} ({}) {}", tag.id, tag.name, tag.slug, tag.color);
    }
}

pub fn print_search(results: &SearchResults) {
    if results.is_empty() {
        println!("Ничего не найдено");
        return;
    }
    if !results.posts.is_empty() {
        println!("Посты:");
        for post in &results.posts {
            println!("- {}", post_line(post));
        }
    }
    if !results.tags.is_empty() {
        println!("Теги:");
        for tag in &results.tags {
            println!("- #{}", tag.name);
        }
    }
}

pub fn print_upload(image: &UploadedImage) {
    println!("Изображение загружено");
    println!("path: {}", image.path);
    println!("url: {}", image.url);
    println!("markdown: {}", image.markdown);
}

pub fn print_autosave(status: &AutosaveStatus) {
    if status.saving {
        println!("Сохранение...");
    } else if let Some(error) = &status.error {
        println!("Не удалось сохранить черновик: {error}");
    } else if let (Some(draft_id), Some(saved_at)) = (status.draft_id, status.last_saved) {
        println!("Черновик сохранён: id={draft_id} в {}", saved_at.format("%H:%M:%S"));
    }
}

fn post_line(post: &Post) -> String {
    format!(
        "[{}] {} ({}, {})",
        post.slug,
        post.title,
        post.created_at.format("%Y-%m-%d"),
        post_state(post)
    )
}

fn post_state(post: &Post) -> &'static str {
    match (post.published, post.is_public) {
        (true, true) => "опубликован",
        (true, false) => "опубликован, скрыт",
        (false, _) => "черновик",
    }
}

fn status_label(status: CursorStatus) -> &'static str {
    match status {
        CursorStatus::Idle => "есть ещё",
        CursorStatus::Loading => "загрузка",
        CursorStatus::Exhausted => "все загружены",
    }
}
