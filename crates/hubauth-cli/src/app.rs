//! Command handling for the hubauth CLI.
//!
//! `App` wires an `AuthSession` to the configured transport and store and
//! runs one command against it.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tracing::{error, info, warn};

use hubauth_core::auth::grant;
use hubauth_core::auth::session::AUTH_PARAMS_KEY;
use hubauth_core::{
    AppConfig, AuthError, AuthParams, AuthSession, FileStore, HttpTransport, KeyValueStore,
    KeyringStore, MemoryStore, ReqwestTransport, SessionState, StoreKind, TokenCheck, User,
    Verification,
};

pub const USAGE: &str = "\
Usage: hubauth <command>

Commands:
  login [username]   Log in with username and password
  authorize-url      Print the URL that starts the authorization-code flow
  code <code>        Exchange an authorization code for a token
  verify             Check the cached token, refreshing it once if expired
  whoami             Like verify, and print the current user as JSON
  refresh            Refresh the cached token
  status             Show the cached credential
  logout             Forget the cached credential
  help               Show this message

Environment:
  HUBAUTH_SERVER_URI, HUBAUTH_BACKEND_URL, HUBAUTH_CLIENT_ID,
  HUBAUTH_CLIENT_SECRET, HUBAUTH_SCOPES, HUBAUTH_LANDING_URL,
  HUBAUTH_STORE (file|keyring|memory), HUBAUTH_USERNAME, HUBAUTH_PASSWORD";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login { username: Option<String> },
    AuthorizeUrl,
    Code { code: String },
    Verify,
    WhoAmI,
    Refresh,
    Status,
    Logout,
    Help,
}

impl Command {
    pub fn parse(args: &[String]) -> Result<Self> {
        let mut args = args.iter().map(String::as_str);
        let command = match args.next() {
            None | Some("help") | Some("--help") | Some("-h") => Command::Help,
            Some("login") => Command::Login {
                username: args.next().map(str::to_string),
            },
            Some("authorize-url") => Command::AuthorizeUrl,
            Some("code") => Command::Code {
                code: args
                    .next()
                    .ok_or_else(|| anyhow!("`code` needs the authorization code"))?
                    .to_string(),
            },
            Some("verify") => Command::Verify,
            Some("whoami") => Command::WhoAmI,
            Some("refresh") => Command::Refresh,
            Some("status") => Command::Status,
            Some("logout") => Command::Logout,
            Some(other) => return Err(anyhow!("Unknown command `{}`", other)),
        };
        if let Some(extra) = args.next() {
            return Err(anyhow!("Unexpected argument `{}`", extra));
        }
        Ok(command)
    }
}

pub struct App {
    config: AppConfig,
    session: AuthSession,
    /// Set when the file store is in use, for cache age display
    file_store: Option<Arc<FileStore>>,
}

impl App {
    pub fn new(config: AppConfig) -> Result<Self> {
        config.validate()?;

        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new()?);
        let mut file_store = None;
        let store: Arc<dyn KeyValueStore> = match config.store {
            StoreKind::File => {
                let store = Arc::new(FileStore::new(config.cache_dir()?)?);
                file_store = Some(store.clone());
                store
            }
            StoreKind::Keyring => Arc::new(KeyringStore::new()),
            StoreKind::Memory => {
                warn!("Memory store selected - the credential will not outlive this run");
                Arc::new(MemoryStore::new())
            }
        };

        let session = AuthSession::new(config.clone(), transport, store);
        Ok(Self {
            config,
            session,
            file_store,
        })
    }

    pub async fn run(&self, command: Command) -> Result<()> {
        match command {
            Command::Login { username } => self.login(username).await,
            Command::AuthorizeUrl => {
                self.authorize_url();
                Ok(())
            }
            Command::Code { code } => self.exchange_code(&code).await,
            Command::Verify => self.verify(false).await,
            Command::WhoAmI => self.verify(true).await,
            Command::Refresh => self.refresh().await,
            Command::Status => self.status().await,
            Command::Logout => self.logout().await,
            Command::Help => {
                println!("{}", USAGE);
                Ok(())
            }
        }
    }

    // =========================================================================
    // Login
    // =========================================================================

    async fn login(&self, username: Option<String>) -> Result<()> {
        let username = match username
            .or_else(|| std::env::var("HUBAUTH_USERNAME").ok())
            .or_else(|| self.config.last_username.clone())
        {
            Some(username) => username,
            None => prompt_username()?,
        };
        let password = match std::env::var("HUBAUTH_PASSWORD") {
            Ok(password) => password,
            Err(_) => prompt_password(&username)?,
        };

        if username.is_empty() || password.is_empty() {
            return Err(anyhow!("Username and password required"));
        }

        eprintln!("Authenticating...");
        match self.session.login(&username, &password).await {
            Ok(params) => {
                if let Err(e) = AppConfig::remember_username(&username) {
                    warn!(error = %e, "Failed to save config");
                }
                info!("Login successful");
                println!("Login successful!");
                print_expiry(&params);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Login failed");
                Err(anyhow!(login_failure_message(&e)))
            }
        }
    }

    fn authorize_url(&self) {
        let state = grant::new_state();
        println!("{}", self.session.authorization_url(&state));
        eprintln!("state: {}", state);
    }

    async fn exchange_code(&self, code: &str) -> Result<()> {
        match self.session.login_with_code(code).await {
            Ok(params) => {
                println!("Authorization code accepted.");
                print_expiry(&params);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Code exchange failed");
                Err(anyhow!(login_failure_message(&e)))
            }
        }
    }

    // =========================================================================
    // Session maintenance
    // =========================================================================

    async fn cached_or_bail(&self) -> Result<AuthParams> {
        self.session
            .load_from_cache()
            .await?
            .ok_or_else(|| anyhow!("Not logged in. Run `hubauth login` first."))
    }

    async fn verify(&self, print_user: bool) -> Result<()> {
        let params = self.cached_or_bail().await?;

        match self.session.verify_token(&params).await {
            Ok(Verification::Valid(user)) => {
                println!("Token valid for {} ({})", user.display_name(), user.id);
                if print_user {
                    println!("{}", serde_json::to_string_pretty(&user)?);
                }
                Ok(())
            }
            Ok(Verification::Refreshed(params)) => {
                println!("Token had expired and was refreshed.");
                print_expiry(&params);
                if print_user {
                    let user = fetch_user(&self.session, &params).await?;
                    println!("{}", serde_json::to_string_pretty(&user)?);
                }
                Ok(())
            }
            Err(e @ (AuthError::Refresh { .. } | AuthError::MissingRefreshToken)) => {
                error!(error = %e, "Session could not be renewed");
                Err(anyhow!("Session expired. Please log in again."))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn refresh(&self) -> Result<()> {
        // The session falls back to the store itself; loading here only fills memory
        if let Err(e) = self.session.load_from_cache().await {
            warn!(error = %e, "Failed to load cached credential");
        }
        let params = self.session.refresh_token().await?;
        println!("Token refreshed.");
        print_expiry(&params);
        Ok(())
    }

    async fn status(&self) -> Result<()> {
        let cached = self.session.load_from_cache().await?;
        let state = match self.session.state().await {
            SessionState::Unauthenticated => "not logged in",
            SessionState::Authenticated => "logged in",
            SessionState::Refreshing => "refreshing",
        };
        println!("Hub:     {}", self.config.auth.server_uri);
        println!("Backend: {}", self.config.backend_url);
        println!("Store:   {:?}", self.config.store);
        println!("Session: {}", state);

        if let Some(params) = cached {
            println!("Token:   {}", params.token_type);
            println!(
                "Refresh: {}",
                if params.refresh_token.is_some() { "available" } else { "none" }
            );
            print_expiry(&params);
        }
        if let Some(ref store) = self.file_store {
            if let Some(cached) = store.load(AUTH_PARAMS_KEY).await? {
                println!("Cached:  {}", cached.age_display());
            }
        }
        Ok(())
    }

    async fn logout(&self) -> Result<()> {
        self.session.logout().await?;
        println!("Logged out.");
        Ok(())
    }
}

/// Load the user with a just-refreshed credential. A second 401 is an error.
async fn fetch_user(session: &AuthSession, params: &AuthParams) -> Result<User> {
    match session.check_token(params).await? {
        TokenCheck::Valid(user) => Ok(user),
        TokenCheck::Expired => Err(anyhow!("Refreshed token was rejected. Please log in again.")),
    }
}

fn print_expiry(params: &AuthParams) {
    match params.minutes_until_expiry() {
        Some(_) if params.is_expired() => println!("Expires: expired"),
        Some(minutes) if params.needs_refresh() => println!("Expires: in {}m (refresh soon)", minutes),
        Some(minutes) => println!("Expires: in {}m", minutes),
        None => println!("Expires: no expiry hint"),
    }
}

/// User-facing message for a failed grant
fn login_failure_message(err: &AuthError) -> String {
    match err {
        AuthError::AuthServer { status, details } if status.is_client_error() => {
            format!("Login rejected: {}", details)
        }
        AuthError::Network(_) => {
            "Unable to connect to server. Check your internet connection.".to_string()
        }
        other => format!("Login failed: {}", other),
    }
}

fn prompt_username() -> Result<String> {
    print!("Username: ");
    io::stdout().flush()?;

    let mut username = String::new();
    io::stdin().read_line(&mut username)?;
    Ok(username.trim().to_string())
}

fn prompt_password(username: &str) -> Result<String> {
    let password = rpassword::prompt_password(format!("Password for {}: ", username))?;
    Ok(password)
}
