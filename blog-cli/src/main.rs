mod draft;
mod output;
mod session_file;

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use blog_client::{BackendClient, BackendConfig};
use blog_feed::DomainError;
use blog_feed::application::media_service::{MediaService, content_type_for};
use blog_feed::application::publishing_service::PublishingService;
use blog_feed::application::reader_service::ReaderService;
use blog_feed::application::session::ViewerWatch;
use blog_feed::application::taxonomy_service::TaxonomyService;
use blog_feed::data::identity::IdentityProvider;
use blog_feed::domain::post::{Post, PostInput};
use blog_feed::domain::taxonomy::{Category, TaxonomyInput};
use blog_feed::domain::user::{Credentials, ViewerContext};
use blog_feed::feed::{CursorStatus, FeedConfig, FeedHandle, FeedRecord, open_feed};
use blog_feed::infrastructure::logging::init_logging;
use blog_feed::infrastructure::settings::Settings;
use clap::{Args, Parser, Subcommand};
use tokio::time::timeout;
use uuid::Uuid;

use draft::{DraftOptions, run_draft};
use output::*;
use session_file::{TOKEN_FILE, clear_token, load_token, persist_token};

#[derive(Debug, Parser)]
#[command(name = "blog-cli", version, about = "CLI клиент блога")]
struct Cli {
    /// Адрес бэкенда (по умолчанию BACKEND_URL из окружения).
    #[arg(long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Регистрация пользователя.
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Вход пользователя.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Выход и удаление сохранённой сессии.
    Logout,
    /// Текущий пользователь и его роль.
    Whoami,
    /// Лента постов.
    Feed {
        /// Сколько страниц загрузить.
        #[arg(long, default_value_t = 1)]
        pages: u32,
        /// Следить за изменениями до Ctrl-C.
        #[arg(long)]
        follow: bool,
        /// Вывести снимок ленты в JSON.
        #[arg(long)]
        json: bool,
    },
    /// Список категорий с количеством постов.
    Categories {
        /// Следить за изменениями до Ctrl-C.
        #[arg(long)]
        follow: bool,
    },
    /// Пост по slug.
    Show {
        #[arg(long)]
        slug: String,
        /// Вывести текст поста как HTML.
        #[arg(long)]
        html: bool,
    },
    /// Поиск по постам и тегам.
    Search { query: String },
    /// Работа с постами (требует вход).
    #[command(subcommand)]
    Post(PostCommand),
    /// Работа с категориями.
    #[command(subcommand)]
    Category(CategoryCommand),
    /// Работа с тегами.
    #[command(subcommand)]
    Tag(TagCommand),
    /// Загрузка изображения (требует вход).
    Upload {
        #[arg(long)]
        file: PathBuf,
    },
}

#[derive(Debug, Subcommand)]
enum PostCommand {
    /// Создание поста.
    Create(PostArgs),
    /// Обновление поста.
    ///
    /// Slug поста не меняется.
    Update {
        #[arg(long)]
        id: Uuid,
        #[command(flatten)]
        post: PostArgs,
    },
    /// Удаление поста.
    Delete {
        #[arg(long)]
        id: Uuid,
    },
    /// Черновик с автосохранением: следит за файлом до Ctrl-C.
    Draft {
        #[arg(long)]
        title: String,
        #[arg(long)]
        file: PathBuf,
        /// Продолжить существующий черновик.
        #[arg(long)]
        id: Option<Uuid>,
        #[arg(long = "category")]
        category_ids: Vec<Uuid>,
        #[arg(long = "tag")]
        tag_ids: Vec<Uuid>,
        /// Опубликовать при выходе.
        #[arg(long)]
        publish: bool,
        /// Публикация видна анонимным читателям.
        #[arg(long, requires = "publish")]
        public: bool,
    },
}

#[derive(Debug, Args)]
struct PostArgs {
    #[arg(long)]
    title: String,
    /// Текст поста (Markdown).
    #[arg(long, conflicts_with = "file")]
    content: Option<String>,
    /// Прочитать текст поста из файла.
    #[arg(long)]
    file: Option<PathBuf>,
    #[arg(long)]
    slug: Option<String>,
    #[arg(long)]
    excerpt: Option<String>,
    #[arg(long)]
    publish: bool,
    /// Показывать пост анонимным читателям (только вместе с --publish).
    #[arg(long)]
    public: bool,
    #[arg(long = "category")]
    category_ids: Vec<Uuid>,
    #[arg(long = "tag")]
    tag_ids: Vec<Uuid>,
}

#[derive(Debug, Subcommand)]
enum CategoryCommand {
    /// Категория и её видимые посты.
    Show {
        #[arg(long)]
        slug: String,
    },
    /// Создание категории (требует вход).
    Create(TaxonomyArgs),
    /// Обновление категории (только администратор).
    Update {
        #[arg(long)]
        id: Uuid,
        #[command(flatten)]
        taxonomy: TaxonomyArgs,
    },
    /// Удаление категории (только администратор).
    Delete {
        #[arg(long)]
        id: Uuid,
    },
}

#[derive(Debug, Subcommand)]
enum TagCommand {
    /// Создание тега (требует вход).
    Create(TaxonomyArgs),
    /// Список тегов.
    List,
}

#[derive(Debug, Args)]
struct TaxonomyArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    slug: Option<String>,
    #[arg(long)]
    description: Option<String>,
}

impl From<TaxonomyArgs> for TaxonomyInput {
    fn from(value: TaxonomyArgs) -> Self {
        Self {
            name: value.name,
            slug: value.slug,
            description: value.description,
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Ошибка: {err}");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let settings = load_settings(cli.server)?;
    init_logging(&settings.log_level)?;

    let client = BackendClient::new(BackendConfig::from_settings(&settings))
        .map_err(|err| map_domain_error(err.into()))?;
    let token_path = Path::new(TOKEN_FILE);
    if let Some(token) = load_token(token_path).context("не удалось прочитать .blog_session")? {
        if client.restore_session(&token).is_none() {
            clear_token(token_path).context("не удалось удалить .blog_session")?;
        }
    }

    let backend = Arc::new(client.clone());
    let viewers = ViewerWatch::start(backend.clone(), backend.clone()).await;
    let viewer = viewers.current();

    match cli.command {
        Command::Signup { email, password } => {
            let session = client
                .sign_up(Credentials { email, password })
                .await
                .map_err(map_domain_error)?;
            match session {
                Some(session) => {
                    persist_token(token_path, &session.access_token)
                        .context("не удалось сохранить сессию")?;
                    print_session("Регистрация успешна", &session);
                }
                None => println!("Регистрация успешна: подтвердите e-mail и выполните вход"),
            }
        }
        Command::Login { email, password } => {
            let session = client
                .sign_in(Credentials { email, password })
                .await
                .map_err(map_domain_error)?;
            persist_token(token_path, &session.access_token)
                .context("не удалось сохранить сессию")?;
            print_session("Вход выполнен", &session);
        }
        Command::Logout => {
            client.sign_out().await.map_err(map_domain_error)?;
            clear_token(token_path).context("не удалось удалить .blog_session")?;
            println!("Выход выполнен");
        }
        Command::Whoami => print_viewer(&viewer),
        Command::Feed {
            pages,
            follow,
            json,
        } => {
            let mut feed = open_feed::<Post, _, _>(
                backend.clone(),
                backend.as_ref(),
                viewers.subscribe(),
                FeedConfig {
                    page_size: settings.feed_page_size,
                },
            )
            .await
            .map_err(map_domain_error)?;
            load_pages(&mut feed, pages, settings.http_request_timeout()).await;

            if json {
                let snapshot = serde_json::to_string_pretty(&feed.snapshot())
                    .context("не удалось сериализовать ленту")?;
                println!("{snapshot}");
            } else {
                print_feed(&feed.snapshot());
            }
            if follow {
                follow_feed(&mut feed, print_feed).await;
            }
        }
        Command::Categories { follow } => {
            let taxonomy = TaxonomyService::new(client.clone());
            let categories = taxonomy.list_categories().await.map_err(map_domain_error)?;
            let ids: Vec<Uuid> = categories.iter().map(|category| category.id).collect();
            let counts = taxonomy
                .category_post_counts(&ids)
                .await
                .map_err(map_domain_error)?;
            print_categories(&categories, &counts);

            if follow {
                let mut feed = open_feed::<Category, _, _>(
                    backend.clone(),
                    backend.as_ref(),
                    viewers.subscribe(),
                    FeedConfig::default(),
                )
                .await
                .map_err(map_domain_error)?;
                follow_feed(&mut feed, print_category_feed).await;
            }
        }
        Command::Show { slug, html } => {
            let detail = ReaderService::new(client.clone())
                .post_by_slug(&viewer, &slug)
                .await
                .map_err(map_domain_error)?;
            print_post_detail(&detail, html);
        }
        Command::Search { query } => {
            let results = ReaderService::new(client.clone())
                .search(&viewer, &query)
                .await
                .map_err(map_domain_error)?;
            print_search(&results);
        }
        Command::Post(command) => {
            run_post_command(command, client.clone(), &viewer, &viewers, &settings).await?
        }
        Command::Category(command) => run_category_command(command, client.clone(), &viewer).await?,
        Command::Tag(command) => {
            let taxonomy = TaxonomyService::new(client.clone());
            match command {
                TagCommand::Create(args) => {
                    let tag = taxonomy
                        .create_tag(&viewer, args.into())
                        .await
                        .map_err(map_domain_error)?;
                    println!("Тег создан: #{} ({}) {}", tag.name, tag.slug, tag.color);
                }
                TagCommand::List => {
                    let tags = taxonomy.list_tags().await.map_err(map_domain_error)?;
                    print_tags(&tags);
                }
            }
        }
        Command::Upload { file } => {
            let file_name = file
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| anyhow!("некорректное имя файла: {}", file.display()))?
                .to_string();
            let content_type = content_type_for(&file_name)
                .ok_or_else(|| anyhow!("неподдерживаемый тип файла: {file_name}"))?;
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("не удалось прочитать {}", file.display()))?;

            let image = MediaService::new(client.clone(), settings.media_max_bytes)
                .upload_image(&viewer, &file_name, content_type, bytes)
                .await
                .map_err(map_domain_error)?;
            print_upload(&image);
        }
    }

    Ok(())
}

async fn run_post_command(
    command: PostCommand,
    client: BackendClient,
    viewer: &ViewerContext,
    viewers: &ViewerWatch,
    settings: &Settings,
) -> Result<()> {
    let publishing = PublishingService::new(client.clone());
    match command {
        PostCommand::Create(args) => {
            let input = post_input(args).await?;
            let post = publishing
                .create_post(viewer, input)
                .await
                .map_err(map_domain_error)?;
            print_post("Пост создан", &post);
        }
        PostCommand::Update { id, post } => {
            let input = post_input(post).await?;
            let post = publishing
                .update_post(viewer, id, input)
                .await
                .map_err(map_domain_error)?;
            print_post("Пост обновлён", &post);
        }
        PostCommand::Delete { id } => {
            publishing
                .delete_post(viewer, id)
                .await
                .map_err(map_domain_error)?;
            println!("Пост удалён: id={id}");
        }
        PostCommand::Draft {
            title,
            file,
            id,
            category_ids,
            tag_ids,
            publish,
            public,
        } => {
            viewer.require_user().map_err(map_domain_error)?;
            let options = DraftOptions {
                file: &file,
                title,
                draft_id: id,
                category_ids,
                tag_ids,
                publish,
                public,
            };
            run_draft(client, viewers.subscribe(), settings.autosave_delay(), options).await?;
        }
    }
    Ok(())
}

async fn run_category_command(
    command: CategoryCommand,
    client: BackendClient,
    viewer: &ViewerContext,
) -> Result<()> {
    match command {
        CategoryCommand::Show { slug } => {
            let page = ReaderService::new(client)
                .category_page(viewer, &slug)
                .await
                .map_err(map_domain_error)?;
            print_category_page(&page);
        }
        CategoryCommand::Create(args) => {
            let category = TaxonomyService::new(client)
                .create_category(viewer, args.into())
                .await
                .map_err(map_domain_error)?;
            print_category("Категория создана", &category);
        }
        CategoryCommand::Update { id, taxonomy } => {
            let category = TaxonomyService::new(client)
                .update_category(viewer, id, taxonomy.into())
                .await
                .map_err(map_domain_error)?;
            print_category("Категория обновлена", &category);
        }
        CategoryCommand::Delete { id } => {
            TaxonomyService::new(client)
                .delete_category(viewer, id)
                .await
                .map_err(map_domain_error)?;
            println!("Категория удалена: id={id}");
        }
    }
    Ok(())
}

fn load_settings(server: Option<String>) -> Result<Settings> {
    let server = server.map(normalize_server);
    Settings::from_lookup(|key| match (key, &server) {
        ("BACKEND_URL", Some(server)) => Some(server.clone()),
        _ => std::env::var(key).ok(),
    })
    .context("некорректная конфигурация (см. .env.example)")
}

fn normalize_server(server: String) -> String {
    if server.starts_with("http://") || server.starts_with("https://") {
        return server;
    }

    format!("http://{server}")
}

async fn post_input(args: PostArgs) -> Result<PostInput> {
    let content = match (args.content, &args.file) {
        (Some(content), _) => content,
        (None, Some(file)) => tokio::fs::read_to_string(file)
            .await
            .with_context(|| format!("не удалось прочитать {}", file.display()))?,
        (None, None) => String::new(),
    };
    Ok(PostInput {
        title: args.title,
        slug: args.slug,
        content,
        excerpt: args.excerpt,
        published: args.publish,
        is_public: args.publish && args.public,
        category_ids: args.category_ids,
        tag_ids: args.tag_ids,
    })
}

/// Догружает страницы, пока их не станет `pages` или лента не кончится.
async fn load_pages<R: FeedRecord>(feed: &mut FeedHandle<R>, pages: u32, wait: Duration) {
    for _ in 1..pages {
        let before = feed.snapshot();
        if before.status == CursorStatus::Exhausted {
            break;
        }
        feed.load_more();

        let loaded = timeout(wait, async {
            loop {
                let Ok(snapshot) = feed.changed().await else {
                    return;
                };
                let settled = snapshot.status != CursorStatus::Loading;
                let progressed = snapshot.rows.len() > before.rows.len()
                    || snapshot.status == CursorStatus::Exhausted
                    || snapshot.error.is_some();
                if settled && progressed {
                    return;
                }
            }
        })
        .await;
        if loaded.is_err() {
            break;
        }
    }
}

async fn follow_feed<R, F>(feed: &mut FeedHandle<R>, render: F)
where
    R: FeedRecord,
    F: Fn(&blog_feed::feed::FeedSnapshot<R>),
{
    println!("Слежение за изменениями, Ctrl-C для выхода");
    loop {
        tokio::select! {
            changed = feed.changed() => match changed {
                Ok(snapshot) => {
                    println!();
                    render(&snapshot);
                }
                Err(_) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }
}

pub(crate) fn map_domain_error(err: DomainError) -> anyhow::Error {
    let message = match err {
        DomainError::Unauthorized => {
            "требуется авторизация: выполните `blog-cli login ...` или `blog-cli signup ...`"
                .to_string()
        }
        DomainError::Forbidden => "недостаточно прав для операции".to_string(),
        DomainError::InvalidCredentials => "неверный e-mail или пароль".to_string(),
        DomainError::NotFound(what) => format!("не найдено: {what}"),
        DomainError::AlreadyExists(message) => format!("уже существует: {message}"),
        DomainError::Validation { field, message } => {
            format!("некорректное поле '{field}': {message}")
        }
        DomainError::Backend(message) => format!("ошибка бэкенда: {message}"),
        DomainError::Unexpected(message) => format!("внутренняя ошибка: {message}"),
    };
    anyhow!(message)
}
