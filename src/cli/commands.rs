use std::path::{Path, PathBuf};

use clap::CommandFactory;
use clap_complete::{generate, Shell};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use crate::admin::{AdminGate, AdminState, LoginOutcome};
use crate::cli::{Cli, CreateArgs, EditArgs, FeedbackArgs};
use crate::config::{Config, LoggingConfig};
use crate::engagement::EngagementCounter;
use crate::error::{Error, Result};
use crate::feedback::{Feedback, FeedbackSink, FeedbackSubject, FormFeedbackSink, MemoryFeedbackSink};
use crate::news::{ArticleDraft, ArticleUpdate, Category, ImageSource};
use crate::session::SessionContext;
use crate::storage::{ArticleRepository, HealthStatus, RepositoryFactory};

/// Everything a reader or admin command needs, wired from configuration.
pub struct App {
    config: Config,
    repository: ArticleRepository,
    session: SessionContext,
    engagement: EngagementCounter,
    admin: AdminGate,
}

impl App {
    /// Storage and uploads from `config`; session markers and admin flags in the data directory.
    pub fn from_config(config: Config) -> Result<Self> {
        let repository = RepositoryFactory::from_config(&config)?;
        let session = SessionContext::in_dir(Config::data_dir()?);
        Ok(Self::new(config, repository, session))
    }

    pub fn new(config: Config, repository: ArticleRepository, session: SessionContext) -> Self {
        let engagement = EngagementCounter::new(repository.clone(), session.markers.clone());
        let admin = AdminGate::from_settings(&config.admin, session.flags.clone());
        Self {
            config,
            repository,
            session,
            engagement,
            admin,
        }
    }

    pub fn repository(&self) -> &ArticleRepository {
        &self.repository
    }

    pub fn admin(&self) -> &AdminGate {
        &self.admin
    }

    pub async fn list(&self, category: Option<String>) -> Result<()> {
        let category = category.map(|c| c.parse::<Category>()).transpose()?;
        let articles = self.repository.by_category(category).await?;

        if articles.is_empty() {
            println!("📭 No articles yet.");
            if category.is_none() {
                println!("   Admins can publish one with: nairobi-tea create --title <title> --content <text> -C <category>");
            }
            return Ok(());
        }

        let heading = match category {
            Some(category) => format!("{} {}", category.icon(), category.label()),
            None => "📰 Latest".to_string(),
        };
        println!("{} | {}", self.config.site.name, heading);
        println!("========================");

        for article in &articles {
            println!("\n{} {}", article.category.icon(), article.title);
            println!("   ID: {}", article.id);
            println!(
                "   {} · {} · {} read · 👁️ {} ❤️ {}",
                article.author,
                article.display_date(),
                article.read_time,
                article.views,
                article.likes
            );
            println!("   {}", article.excerpt(120));
        }

        Ok(())
    }

    pub async fn show(&self, id: &str) -> Result<()> {
        if self.repository.get(id).await?.is_none() {
            return Err(Error::NotFound(format!("article {}", id)));
        }

        if let Err(e) = self.engagement.record_view(id).await {
            warn!("Could not record view of {}: {}", id, e);
        }

        let article = self
            .repository
            .articles()
            .into_iter()
            .find(|a| a.id == id)
            .ok_or_else(|| Error::NotFound(format!("article {}", id)))?;

        println!("{}", article.to_text());
        if self.engagement.has_liked(id) {
            println!("❤️ You liked this article");
        }
        println!("\nShare:\n{}", article.share_text(&self.config.site.base_url));
        Ok(())
    }

    pub async fn like(&self, id: &str) -> Result<()> {
        let result = self.engagement.record_like(id).await?;
        if result.accepted {
            println!("❤️ Liked! This article now has {} likes.", result.new_count);
        } else {
            println!("💛 You already liked this article ({} likes).", result.new_count);
        }
        Ok(())
    }

    pub fn login(&self, username: Option<&str>, password: &str) -> Result<()> {
        match self.admin.login(username, password)? {
            LoginOutcome::Success => {
                println!("✅ Logged in to the admin panel.");
                Ok(())
            }
            LoginOutcome::Invalid { remaining } => Err(Error::Unauthorized(format!(
                "invalid credentials, {} attempt(s) remaining",
                remaining
            ))),
            LoginOutcome::LockedOut { remaining_secs } => Err(Error::Locked { remaining_secs }),
        }
    }

    pub fn logout(&self) -> Result<()> {
        self.admin.logout()?;
        println!("👋 Logged out.");
        Ok(())
    }

    pub async fn status(&self) -> Result<()> {
        println!("📊 {} Status", self.config.site.name);
        println!("========================");

        let health = self.repository.health_check().await?;
        println!("Storage: {}", self.repository.storage_name());
        match &health {
            HealthStatus::Healthy => println!("   Health: ✅ healthy"),
            HealthStatus::Warning(msg) => println!("   Health: ⚠️ {}", msg),
            HealthStatus::Unavailable(msg) => println!("   Health: ❌ {}", msg),
        }

        match self.repository.list().await {
            Ok(articles) => {
                println!("   Articles: {}", articles.len());
                for category in Category::ALL {
                    let count = articles.iter().filter(|a| a.category == category).count();
                    println!("     {} {}: {}", category.icon(), category.label(), count);
                }
            }
            Err(e) => println!("   Articles: unavailable ({})", e),
        }

        println!("Images: {}", self.repository.uploader_name());

        match self.admin.state() {
            AdminState::LoggedIn => println!("Admin: 🔓 logged in"),
            AdminState::LoggedOut => {
                println!("Admin: 🔒 logged out");
                let attempts = self.admin.attempts();
                if attempts > 0 {
                    println!("   Failed attempts: {}/{}", attempts, self.config.admin.max_attempts);
                }
            }
            AdminState::Locked => {
                let secs = self.admin.lock_remaining().map(|d| d.as_secs()).unwrap_or(0);
                println!("Admin: ⛔ locked for another {}s", secs);
            }
        }

        Ok(())
    }

    pub async fn create(&self, args: CreateArgs) -> Result<()> {
        self.admin.require_admin()?;

        let content = read_content(args.content, args.content_file.as_deref())
            .await?
            .ok_or_else(|| Error::Validation("content is required".to_string()))?;
        let category: Category = args.category.parse()?;

        let mut draft = ArticleDraft::new(args.title, content, category)
            .with_author(args.author.unwrap_or_else(|| self.config.site.default_author.clone()))
            .with_read_time(
                args.read_time
                    .unwrap_or_else(|| self.config.site.default_read_time.clone()),
            );
        if let Some(image) = image_source(args.image.as_deref(), args.image_url).await? {
            draft = draft.with_image(image);
        }
        draft.validate()?;

        if draft.image.needs_upload() {
            println!("📤 Uploading image via {}...", self.repository.uploader_name());
        }
        let article = self.repository.create(draft).await?;

        println!("✅ Article published successfully!");
        println!("   ID: {}", article.id);
        println!("   Title: {}", article.title);
        println!("   Category: {} {}", article.category.icon(), article.category.label());
        Ok(())
    }

    pub async fn edit(&self, args: EditArgs) -> Result<()> {
        self.admin.require_admin()?;

        let mut update = ArticleUpdate {
            title: args.title,
            content: read_content(args.content, args.content_file.as_deref()).await?,
            category: args.category.map(|c| c.parse()).transpose()?,
            author: args.author,
            read_time: args.read_time,
            ..Default::default()
        };
        if args.clear_image {
            update.image = Some(ImageSource::None);
        } else {
            update.image = image_source(args.image.as_deref(), args.image_url).await?;
        }

        if update.is_empty() {
            return Err(Error::Validation("nothing to update".to_string()));
        }

        let article = self.repository.update(&args.id, update).await?;
        println!("✅ Article '{}' updated successfully!", article.title);
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.admin.require_admin()?;
        self.repository.delete(id).await?;
        println!("🗑️ Article {} deleted.", id);
        Ok(())
    }

    pub fn end_session(&self) -> Result<()> {
        self.session.end()?;
        println!("✅ Session ended. Views and likes will be counted again.");
        Ok(())
    }
}

async fn read_content(inline: Option<String>, file: Option<&Path>) -> Result<Option<String>> {
    match (inline, file) {
        (Some(content), _) => Ok(Some(content)),
        (None, Some(path)) => Ok(Some(tokio::fs::read_to_string(path).await?)),
        (None, None) => Ok(None),
    }
}

async fn image_source(path: Option<&Path>, url: Option<String>) -> Result<Option<ImageSource>> {
    if let Some(path) = path {
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        debug!("Read {} bytes of image data from {}", bytes.len(), path.display());
        return Ok(Some(ImageSource::Upload { bytes, filename }));
    }
    Ok(url.map(ImageSource::Url))
}

/// Submit feedback through the configured form endpoint.
pub async fn send_feedback(config: &Config, args: FeedbackArgs) -> Result<()> {
    let subject: FeedbackSubject = args.subject.parse()?;
    let feedback = Feedback::new(args.name, args.email, subject, args.message).with_rating(args.rating);
    feedback.validate()?;

    let sink: Box<dyn FeedbackSink> = match &config.feedback.endpoint {
        Some(endpoint) => Box::new(FormFeedbackSink::new(
            endpoint.as_str(),
            config.feedback.form_name.as_str(),
        )?),
        None => {
            warn!("No feedback endpoint configured, feedback is only recorded locally");
            Box::new(MemoryFeedbackSink::new())
        }
    };

    sink.submit(&feedback).await?;
    println!("🙏 Thanks for your feedback, {}!", feedback.name);
    Ok(())
}

/// Write a default configuration file and create the data directory
pub async fn init(config_path: Option<PathBuf>, force: bool) -> Result<()> {
    info!("Initializing nairobi-tea configuration");

    let config_file = match config_path {
        Some(path) => path,
        None => Config::default_config_file()?,
    };
    if write_default_config(&config_file, force)? {
        info!("Created default configuration: {}", config_file.display());
    } else {
        warn!("Configuration file already exists: {}", config_file.display());
    }

    let data_dir = Config::data_dir()?;
    if !data_dir.exists() {
        tokio::fs::create_dir_all(&data_dir).await?;
        info!("Created data directory: {}", data_dir.display());
    }

    println!("✅ nairobi-tea initialized successfully!");
    println!("   Config file: {}", config_file.display());
    println!("   Data directory: {}", data_dir.display());
    println!();
    println!("Next steps:");
    println!("   1. Set an admin password: export NAIROBI_TEA_ADMIN_PASSWORD=<password>");
    println!("   2. Log in: nairobi-tea login --password <password>");
    println!("   3. Publish: nairobi-tea create --title <title> --content <text> -C politics");

    Ok(())
}

/// Returns `false` when the file exists and `force` is not set.
fn write_default_config(path: &Path, force: bool) -> Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }
    Config::default().save(path)?;
    Ok(true)
}

/// Explicit path, else the default config file when present, else defaults.
/// Environment overrides apply in every case.
pub fn load_config(config_path: Option<&Path>, required: bool) -> Result<Config> {
    match config_path {
        Some(path) if path.exists() || required => Config::load_with_env(path),
        _ => match Config::default_config_file().ok().filter(|p| p.exists()) {
            Some(path) => Config::load_with_env(path),
            None => Config::from_env(),
        },
    }
}

/// Generate shell completions
pub fn generate_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let cmd_name = cmd.get_name().to_string();
    generate(shell, &mut cmd, cmd_name, &mut std::io::stdout());
}

/// Initialize logging. The returned guard must be held until exit so
/// buffered file output is flushed.
pub fn init_logging(debug: bool, verbose: bool, logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = if debug {
        EnvFilter::new("debug")
    } else if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_file(debug)
        .with_line_number(debug);

    let mut guard = None;
    let result = if logging.log_to_file {
        let path = Path::new(&logging.log_file);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let file_name = path
            .file_name()
            .ok_or_else(|| Error::Config(format!("Invalid log file path: {}", logging.log_file)))?;
        std::fs::create_dir_all(dir)?;

        let (writer, file_guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
        guard = Some(file_guard);
        if logging.json_format {
            builder.json().with_writer(writer).try_init()
        } else {
            builder.with_ansi(false).with_writer(writer).try_init()
        }
    } else if logging.json_format {
        builder.json().with_writer(std::io::stderr).try_init()
    } else {
        builder.with_writer(std::io::stderr).try_init()
    };

    if let Err(e) = result {
        debug!("Logging already initialized: {}", e);
    }
    debug!("Logging initialized (config level {})", logging.level);
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn app() -> App {
        let mut config = Config::default();
        config.admin.password = Some("chai-na-mandazi".to_string());
        App::new(config, RepositoryFactory::memory(), SessionContext::in_memory())
    }

    fn create_args(title: &str, category: &str) -> CreateArgs {
        CreateArgs {
            title: title.to_string(),
            content: Some("First paragraph\nSecond paragraph".to_string()),
            content_file: None,
            category: category.to_string(),
            author: None,
            read_time: None,
            image: None,
            image_url: None,
        }
    }

    fn edit_args(id: &str) -> EditArgs {
        EditArgs {
            id: id.to_string(),
            title: None,
            content: None,
            content_file: None,
            category: None,
            author: None,
            read_time: None,
            image: None,
            image_url: None,
            clear_image: false,
        }
    }

    #[tokio::test]
    async fn test_admin_commands_require_login() {
        let app = app();
        let err = app.create(create_args("Budget", "business")).await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
        assert!(app.repository().list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_edit_delete_flow() {
        let app = app();
        app.login(None, "chai-na-mandazi").unwrap();

        app.create(create_args("Budget", "business")).await.unwrap();
        let article = app.repository().list().await.unwrap().remove(0);
        assert_eq!(article.author, "Admin");
        assert_eq!(article.read_time, "2 min");

        let mut args = edit_args(&article.id);
        args.title = Some("Budget 2025".to_string());
        app.edit(args).await.unwrap();
        assert_eq!(app.repository().get(&article.id).await.unwrap().unwrap().title, "Budget 2025");

        app.delete(&article.id).await.unwrap();
        assert!(app.repository().list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_edit_without_fields_is_rejected() {
        let app = app();
        app.login(None, "chai-na-mandazi").unwrap();
        app.create(create_args("Derby", "sports")).await.unwrap();
        let id = app.repository().articles()[0].id.clone();

        assert!(matches!(app.edit(edit_args(&id)).await, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_category() {
        let app = app();
        app.login(None, "chai-na-mandazi").unwrap();
        assert!(app.create(create_args("Weather", "weather")).await.is_err());
    }

    #[tokio::test]
    async fn test_like_and_show() {
        let app = app();
        app.login(None, "chai-na-mandazi").unwrap();
        app.create(create_args("Matatu art", "life")).await.unwrap();
        let id = app.repository().articles()[0].id.clone();

        app.show(&id).await.unwrap();
        app.show(&id).await.unwrap();
        app.like(&id).await.unwrap();
        app.like(&id).await.unwrap();

        let article = app.repository().get(&id).await.unwrap().unwrap();
        assert_eq!(article.views, 1);
        assert_eq!(article.likes, 1);

        app.end_session().unwrap();
        app.like(&id).await.unwrap();
        assert_eq!(app.repository().get(&id).await.unwrap().unwrap().likes, 2);
    }

    #[tokio::test]
    async fn test_show_missing_article() {
        let app = app();
        assert!(matches!(app.show("nope").await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_login_failures_lock_the_panel() {
        let app = app();
        assert!(matches!(app.login(None, "wrong"), Err(Error::Unauthorized(_))));
        assert!(matches!(app.login(None, "wrong"), Err(Error::Unauthorized(_))));
        assert!(matches!(app.login(None, "wrong"), Err(Error::Locked { .. })));
        assert!(matches!(app.login(None, "chai-na-mandazi"), Err(Error::Locked { .. })));
    }

    #[tokio::test]
    async fn test_list_rejects_unknown_category() {
        let app = app();
        app.list(None).await.unwrap();
        assert!(app.list(Some("weather".to_string())).await.is_err());
    }

    #[tokio::test]
    async fn test_feedback_without_endpoint() {
        let args = FeedbackArgs {
            name: "Otieno".to_string(),
            email: "otieno@example.com".to_string(),
            subject: "feature".to_string(),
            message: "Dark mode please".to_string(),
            rating: 4,
        };
        send_feedback(&Config::default(), args).await.unwrap();
    }

    #[test]
    fn test_write_default_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        assert!(write_default_config(&path, false).unwrap());
        assert!(!write_default_config(&path, false).unwrap());
        assert!(write_default_config(&path, true).unwrap());

        let config = Config::load(&path).unwrap();
        assert_eq!(config.site.name, "NAIROBIAN TEA");
    }

    #[test]
    fn test_load_config_missing_explicit_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.toml");
        assert!(load_config(Some(&path), true).is_err());
    }

    #[test]
    fn test_init_logging() {
        let result = init_logging(false, false, &LoggingConfig::default());
        assert!(result.is_ok());
    }
}
