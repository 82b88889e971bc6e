mod ui;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use artua::api::ApiClient;
use artua::api::models::{ConversationId, Page, ProductFilter, ProductId, Registration};
use artua::error::{Error, Result};
use artua::hub::{HubConfig, HubFactory};
use artua::messenger::Messenger;
use artua::session::Session;
use artua::storage::Cache;
use artua::utils::RUNTIME;

#[derive(Parser)]
#[command(name = "artua", version, about = "ArtUA marketplace client")]
struct Cli {
    /// Backend address, e.g. https://api.artua.example. Saved for later runs.
    #[arg(long, global = true, env = "ARTUA_API_URL")]
    server: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and store the session token
    Login {
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },
    /// Create an author account and sign in
    Register {
        #[arg(long, default_value = "")]
        first_name: String,
        #[arg(long, default_value = "")]
        last_name: String,
        #[arg(long, default_value = "")]
        email: String,
        /// PNG file to upload as the avatar
        #[arg(long)]
        avatar: Option<PathBuf>,
    },
    /// Forget the stored session
    Logout,
    /// Show the signed-in profile
    Whoami,
    /// List conversations
    Conversations,
    /// Start (or reopen) a conversation with a user and open it
    Start { user_id: String },
    /// Open the messenger; defaults to the first conversation
    Chat { conversation_id: Option<ConversationId> },
    /// Print app-wide notifications (new messages, likes) until Ctrl-C
    Notifications,
    /// Browse the catalog
    Products {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        page_size: u32,
        #[arg(long)]
        author: Option<String>,
        #[arg(long)]
        category: Option<String>,
        /// Most liked products instead of the filtered catalog
        #[arg(long, conflicts_with_all = ["liked", "viewed"])]
        top: bool,
        /// Products you liked
        #[arg(long, conflicts_with = "viewed")]
        liked: bool,
        /// Products you viewed
        #[arg(long)]
        viewed: bool,
    },
    /// Like or unlike a product
    Like { product_id: ProductId },
    /// Record that a product was viewed
    View { product_id: ProductId },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn open_cache() -> Option<Cache> {
    match Cache::open_default() {
        Ok(cache) => Some(cache),
        Err(e) => {
            log::warn!("conversation cache disabled: {e}");
            None
        }
    }
}

fn messenger(session: &Session, api: &ApiClient) -> ui::main_window::AppMessenger {
    let factory = HubFactory::new(api.clone(), HubConfig::default());
    Messenger::new(api.clone(), factory, session.clone())
}

async fn run(cli: Cli, session: Session) -> Result<()> {
    if let Some(server) = &cli.server {
        session.set_base_url(server)?;
    }
    let api = ApiClient::new(&session.base_url())
        .map_err(|_| Error::Config("no server configured; pass --server or set ARTUA_API_URL".into()))?;

    match cli.command {
        Command::Login { email, password } => ui::login::login(&session, &api, email, password).await,
        Command::Register { first_name, last_name, email, avatar } => {
            let avatar = avatar.map(std::fs::read).transpose()?;
            let form = Registration { first_name, last_name, email, password: String::new(), avatar };
            ui::login::register(&session, &api, form).await
        }
        Command::Logout => {
            session.sign_out()?;
            if let Some(cache) = open_cache() {
                cache.clear()?;
            }
            println!("Signed out.");
            Ok(())
        }
        Command::Whoami => {
            let token = session.require_token()?;
            let profile = match api.profile(&token).await {
                Err(Error::Unauthorized) => {
                    session.sign_out()?;
                    return Err(Error::Unauthorized);
                }
                other => other?,
            };
            println!("{} {} <{}>", profile.first_name, profile.last_name, profile.email);
            if let Some(country) = profile.my_country.filter(|c| !c.is_empty()) {
                println!("{country}");
            }
            Ok(())
        }
        Command::Conversations => {
            session.require_token()?;
            let mut cache = open_cache();
            ui::main_window::load_list(&mut messenger(&session, &api), cache.as_mut()).await
        }
        Command::Start { user_id } => {
            ui::login::ensure_signed_in(&session, &api).await?;
            let token = session.require_token()?;
            let id = api.start_conversation(&token, &user_id).await?;
            ui::main_window::run(messenger(&session, &api), open_cache(), Some(id)).await
        }
        Command::Chat { conversation_id } => {
            ui::login::ensure_signed_in(&session, &api).await?;
            ui::main_window::run(messenger(&session, &api), open_cache(), conversation_id).await
        }
        Command::Notifications => {
            let token = session.require_token()?;
            ui::main_window::notifications(HubFactory::new(api.clone(), HubConfig::default()), &token).await
        }
        Command::Products { page, page_size, author, category, top, liked, viewed } => {
            let result = if top {
                let items = api.top_liked().await?;
                Page { total_items: items.len() as u32, items, ..Default::default() }
            } else if liked {
                api.liked_products(&session.require_token()?, page, page_size).await?
            } else if viewed {
                api.viewed_products(&session.require_token()?, page, page_size).await?
            } else {
                let filter = ProductFilter { page, page_size, author_id: author, category, ..Default::default() };
                api.products(&filter, session.token().as_deref()).await?
            };
            for p in &result.items {
                let liked = if p.is_liked_by_current_user { "♥" } else { " " };
                println!("{liked} [{}] {} · {:.2} · {} likes · {} views", p.id, p.name, p.price, p.likes_count, p.views_count);
            }
            println!("page {} of {}", result.current_page, result.total_pages);
            Ok(())
        }
        Command::Like { product_id } => {
            let token = session.require_token()?;
            api.toggle_like(&token, product_id).await?;
            println!("Toggled like on product {product_id}.");
            Ok(())
        }
        Command::View { product_id } => {
            api.record_view(session.token().as_deref(), product_id).await?;
            println!("Recorded a view of product {product_id}.");
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();
    let session = Session::load();

    match RUNTIME.block_on(run(cli, session)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("artua: {e}");
            if matches!(e, Error::Unauthorized | Error::NotSignedIn) {
                eprintln!("run `artua login` to sign in");
            }
            ExitCode::FAILURE
        }
    }
}
