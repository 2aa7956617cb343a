//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use contributors_core::admin::{render_assignment_form, render_settings_fields};
use contributors_core::nonce::ASSIGNMENT_ACTION;
use contributors_core::{
    ArchiveAugmenter, AssignmentForm, NonceIssuer, RawDisplayOptions, RenderSettings,
    SaveContext, SaveOutcome, bootstrap, can_edit_post, get_assignment, get_display_options,
    list_author_archive, render_contributors, save_assignment, save_display_options,
};
use contributors_shared::{
    AppConfig, MatchStrategy, NewPost, NewUser, PostId, RawOrder, Role, UserId, init_config,
    load_config, load_config_from,
};
use contributors_storage::Storage;
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// contribs: attach contributor lists to posts and render them.
#[derive(Parser)]
#[command(
    name = "contribs",
    version,
    about = "Curate post contributors, render contributor boxes, and list author archives.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Database file (overrides `[storage] database_path`).
    #[arg(long, global = true, env = "CONTRIBUTORS_DB")]
    pub db: Option<PathBuf>,

    /// Config file (defaults to ~/.contributors/contributors.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Create the database, write default options, and rebuild the contributor index.
    Init,

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Manage the user directory.
    User {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Manage content items.
    Post {
        #[command(subcommand)]
        action: PostAction,
    },

    /// Show or change the global display options.
    Options {
        #[command(subcommand)]
        action: OptionsAction,
    },

    /// Edit and inspect per-post contributor assignments.
    Contributors {
        #[command(subcommand)]
        action: ContributorsAction,
    },

    /// Render a post's content with its contributor box.
    Render {
        /// Post id.
        post: i64,

        /// Render as a listing view instead of the single-post view.
        #[arg(long)]
        listing: bool,
    },

    /// Author archives.
    Archive {
        #[command(subcommand)]
        action: ArchiveAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

#[derive(Subcommand)]
pub(crate) enum UserAction {
    /// Add a user.
    Add(UserArgs),
    /// List all users.
    List,
}

#[derive(Args)]
pub(crate) struct UserArgs {
    /// Unique login name.
    login: String,

    #[arg(long)]
    display_name: Option<String>,

    #[arg(long, default_value = "")]
    email: String,

    /// Profile description (limited HTML allowed).
    #[arg(long, default_value = "")]
    bio: String,

    #[arg(long, default_value = "")]
    website: String,

    /// Explicit avatar image URL (Gravatar otherwise).
    #[arg(long)]
    avatar: Option<String>,

    /// administrator, editor, author, contributor, or subscriber.
    #[arg(long, default_value = "author")]
    role: String,
}

#[derive(Subcommand)]
pub(crate) enum PostAction {
    /// Add a content item.
    Add {
        /// Primary author id.
        #[arg(long)]
        author: i64,

        #[arg(long)]
        title: String,

        #[arg(long, default_value = "")]
        content: String,

        #[arg(long = "type", default_value = "post")]
        post_type: String,

        #[arg(long, default_value = "publish")]
        status: String,
    },
    /// Delete a content item with its metadata.
    Delete {
        post: i64,
    },
}

#[derive(Subcommand)]
pub(crate) enum OptionsAction {
    /// Print the stored display options.
    Show {
        /// Print the settings form fields instead.
        #[arg(long)]
        form: bool,
    },
    /// Replace the display options. Omitted flags are switched off.
    Set {
        #[arg(long)]
        show_avatar: bool,
        #[arg(long)]
        show_name: bool,
        #[arg(long)]
        show_bio: bool,
        #[arg(long)]
        show_website: bool,

        /// Comma-joined field order, e.g. `website,name,bio`.
        #[arg(long)]
        order: Option<String>,
    },
}

#[derive(Subcommand)]
pub(crate) enum ContributorsAction {
    /// Print the authoring form fields for a post.
    Form {
        post: i64,

        /// Editing user id; the form token is bound to them.
        #[arg(long = "as")]
        editor: i64,
    },
    /// Save a post's contributor list as the given editor.
    Save {
        post: i64,

        #[arg(long = "as")]
        editor: i64,

        /// Contributor ids in display order (repeatable).
        #[arg(long = "user")]
        users: Vec<String>,

        #[arg(long)]
        title: Option<String>,

        /// Token from `contributors form` or `contributors token`, bound to
        /// the editor. Saves are refused without a valid one.
        #[arg(long)]
        nonce: String,

        /// Treat the request as a background autosave.
        #[arg(long)]
        autosave: bool,
    },
    /// Print a fresh assignment token for an editor.
    Token {
        #[arg(long = "as")]
        editor: i64,
    },
    /// Print a post's stored assignment.
    Show {
        post: i64,
    },
}

#[derive(Subcommand)]
pub(crate) enum ArchiveAction {
    /// List an author's archive, including posts they contributed to.
    List {
        author: i64,

        #[arg(long, default_value = "1")]
        page: u32,

        #[arg(long, default_value = "10")]
        per_page: u32,

        /// Override `[archive] match_strategy` (index or serialized).
        #[arg(long)]
        strategy: Option<String>,
    },
    /// Rebuild the contributor index from stored assignments.
    Reindex,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "contributors=info",
        1 => "contributors=debug",
        _ => "contributors=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Resolved process-wide inputs, built once per invocation.
struct Env {
    config: AppConfig,
    db_path: PathBuf,
}

impl Env {
    fn load(cli: &Cli) -> Result<Self> {
        let config = match &cli.config {
            Some(path) => load_config_from(path)?,
            None => load_config()?,
        };
        let db_path = match &cli.db {
            Some(path) => path.clone(),
            None => config.storage.resolved_path()?,
        };
        Ok(Self { config, db_path })
    }

    async fn open(&self) -> Result<Storage> {
        Ok(Storage::open(&self.db_path).await?)
    }

    async fn open_readonly(&self) -> Result<Storage> {
        Ok(Storage::open_readonly(&self.db_path).await?)
    }
}

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    if let Command::Config { action } = &cli.command {
        return match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(cli.config.as_deref()).await,
        };
    }

    let env = Env::load(&cli)?;
    match cli.command {
        Command::Init => cmd_init(&env).await,
        Command::Config { .. } => Ok(()),
        Command::User { action } => match action {
            UserAction::Add(args) => cmd_user_add(&env, args).await,
            UserAction::List => cmd_user_list(&env).await,
        },
        Command::Post { action } => match action {
            PostAction::Add {
                author,
                title,
                content,
                post_type,
                status,
            } => cmd_post_add(&env, author, title, content, post_type, status).await,
            PostAction::Delete { post } => cmd_post_delete(&env, post).await,
        },
        Command::Options { action } => match action {
            OptionsAction::Show { form } => cmd_options_show(&env, form).await,
            OptionsAction::Set {
                show_avatar,
                show_name,
                show_bio,
                show_website,
                order,
            } => {
                let raw = RawDisplayOptions {
                    show_avatar,
                    show_name,
                    show_bio,
                    show_website,
                    element_order: order.map(RawOrder::Joined),
                };
                cmd_options_set(&env, &raw).await
            }
        },
        Command::Contributors { action } => match action {
            ContributorsAction::Form { post, editor } => cmd_contributors_form(&env, post, editor).await,
            ContributorsAction::Save {
                post,
                editor,
                users,
                title,
                nonce,
                autosave,
            } => {
                let form = AssignmentForm {
                    title,
                    selected_user_ids: users,
                    nonce: Some(nonce),
                };
                cmd_contributors_save(&env, post, editor, form, autosave).await
            }
            ContributorsAction::Token { editor } => cmd_contributors_token(&env, editor).await,
            ContributorsAction::Show { post } => cmd_contributors_show(&env, post).await,
        },
        Command::Render { post, listing } => cmd_render(&env, post, !listing).await,
        Command::Archive { action } => match action {
            ArchiveAction::List {
                author,
                page,
                per_page,
                strategy,
            } => cmd_archive_list(&env, author, page, per_page, strategy.as_deref()).await,
            ArchiveAction::Reindex => cmd_archive_reindex(&env).await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_init(env: &Env) -> Result<()> {
    let storage = env.open().await?;
    let report = bootstrap(&storage).await?;

    println!();
    println!("  Database ready: {}", env.db_path.display());
    println!("  Schema version:   {}", storage.get_schema_version().await);
    println!(
        "  Display options:  {}",
        if report.options_created { "defaults written" } else { "kept" }
    );
    println!(
        "  Nonce secret:     {}",
        if report.secret_created { "generated" } else { "kept" }
    );
    println!("  Posts indexed:    {}", report.posts_indexed);
    println!();
    Ok(())
}

async fn cmd_user_add(env: &Env, args: UserArgs) -> Result<()> {
    let storage = env.open().await?;
    let new_user = NewUser {
        login: args.login,
        display_name: args.display_name,
        email: args.email,
        bio: args.bio,
        website_url: args.website,
        avatar_url: args.avatar,
        role: args.role.parse::<Role>()?,
    };
    let user = storage.insert_user(&new_user).await?;
    info!(id = %user.id, login = %user.login, "user added");
    println!("{}", user.id);
    Ok(())
}

async fn cmd_user_list(env: &Env) -> Result<()> {
    let storage = env.open_readonly().await?;
    let users = storage.list_users().await?;
    if users.is_empty() {
        println!("No users.");
        return Ok(());
    }
    for user in users {
        println!(
            "{:>5}  {:<20} {:<12} {}",
            user.id.to_string(),
            user.login,
            user.role.as_str(),
            user.display_name
        );
    }
    Ok(())
}

async fn cmd_post_add(
    env: &Env,
    author: i64,
    title: String,
    content: String,
    post_type: String,
    status: String,
) -> Result<()> {
    let storage = env.open().await?;
    let author = UserId(author);
    if storage.get_user(author).await?.is_none() {
        return Err(eyre!("no user with id {author}"));
    }
    let post = storage
        .insert_post(&NewPost {
            author_id: author,
            post_type,
            status,
            title,
            content,
        })
        .await?;
    info!(id = %post.id, author = %author, "post added");
    println!("{}", post.id);
    Ok(())
}

async fn cmd_post_delete(env: &Env, post: i64) -> Result<()> {
    let storage = env.open().await?;
    let post = PostId(post);
    if storage.get_post(post).await?.is_none() {
        return Err(eyre!("no post with id {post}"));
    }
    storage.delete_post(post).await?;
    println!("Deleted post {post}.");
    Ok(())
}

async fn cmd_options_show(env: &Env, form: bool) -> Result<()> {
    let storage = env.open_readonly().await?;
    let options = get_display_options(&storage).await?;
    if form {
        println!("{}", render_settings_fields(&options));
    } else {
        println!("{}", serde_json::to_string_pretty(&options)?);
    }
    Ok(())
}

async fn cmd_options_set(env: &Env, raw: &RawDisplayOptions) -> Result<()> {
    let storage = env.open().await?;
    let options = save_display_options(&storage, raw).await?;
    println!("{}", serde_json::to_string_pretty(&options)?);
    Ok(())
}

async fn cmd_contributors_form(env: &Env, post: i64, editor: i64) -> Result<()> {
    let storage = env.open_readonly().await?;
    let nonces = NonceIssuer::from_storage(&storage, &env.config).await?;
    let html = render_assignment_form(&storage, &nonces, PostId(post), UserId(editor)).await?;
    println!("{html}");
    Ok(())
}

async fn cmd_contributors_save(
    env: &Env,
    post: i64,
    editor: i64,
    form: AssignmentForm,
    autosave: bool,
) -> Result<()> {
    let storage = env.open().await?;
    let nonces = NonceIssuer::from_storage(&storage, &env.config).await?;

    let post = storage
        .get_post(PostId(post))
        .await?
        .ok_or_else(|| eyre!("no post with id {post}"))?;
    let editor = storage
        .get_user(UserId(editor))
        .await?
        .ok_or_else(|| eyre!("no user with id {editor}"))?;

    let ctx = SaveContext {
        editor: editor.id,
        caller_authorized: can_edit_post(&editor, &post),
        is_autosave: autosave,
    };

    match save_assignment(&storage, &nonces, post.id, &form, ctx).await? {
        SaveOutcome::Saved(assignment) => {
            println!("{}", serde_json::to_string_pretty(&assignment)?);
        }
        SaveOutcome::Skipped(reason) => {
            println!("Nothing saved ({}).", reason.as_str());
        }
    }
    Ok(())
}

async fn cmd_contributors_token(env: &Env, editor: i64) -> Result<()> {
    let storage = env.open_readonly().await?;
    let nonces = NonceIssuer::from_storage(&storage, &env.config).await?;
    let editor = storage
        .get_user(UserId(editor))
        .await?
        .ok_or_else(|| eyre!("no user with id {editor}"))?;
    println!("{}", nonces.create(ASSIGNMENT_ACTION, editor.id));
    Ok(())
}

async fn cmd_contributors_show(env: &Env, post: i64) -> Result<()> {
    let storage = env.open_readonly().await?;
    let assignment = get_assignment(&storage, PostId(post)).await?;
    println!("{}", serde_json::to_string_pretty(&assignment)?);
    Ok(())
}

async fn cmd_render(env: &Env, post: i64, is_single_view: bool) -> Result<()> {
    let storage = env.open_readonly().await?;
    let settings = RenderSettings::from_config(&env.config)?;
    let post = storage
        .get_post(PostId(post))
        .await?
        .ok_or_else(|| eyre!("no post with id {post}"))?;

    let html =
        render_contributors(&storage, &settings, post.id, &post.content, is_single_view).await?;
    println!("{html}");
    Ok(())
}

async fn cmd_archive_list(
    env: &Env,
    author: i64,
    page: u32,
    per_page: u32,
    strategy: Option<&str>,
) -> Result<()> {
    let storage = env.open_readonly().await?;
    let strategy = match strategy {
        Some(raw) => parse_strategy(raw)?,
        None => env.config.archive.match_strategy,
    };
    let augmenter = ArchiveAugmenter::new(strategy);
    let posts = list_author_archive(&storage, &augmenter, UserId(author), page, per_page).await?;

    if posts.is_empty() {
        println!("No posts.");
        return Ok(());
    }
    for post in posts {
        let role = if post.author_id == UserId(author) {
            "author"
        } else {
            "contributor"
        };
        println!(
            "{:>5}  {}  {:<12} {}",
            post.id.to_string(),
            post.published_at.format("%Y-%m-%d"),
            role,
            post.title
        );
    }
    Ok(())
}

async fn cmd_archive_reindex(env: &Env) -> Result<()> {
    let storage = env.open().await?;
    let count = storage.rebuild_contributor_index().await?;
    println!("Indexed {count} posts.");
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config: AppConfig = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

fn parse_strategy(raw: &str) -> Result<MatchStrategy> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "index" => Ok(MatchStrategy::Index),
        "serialized" => Ok(MatchStrategy::Serialized),
        other => Err(eyre!(
            "invalid strategy '{other}': expected 'index' or 'serialized'"
        )),
    }
}
