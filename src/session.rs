//! Project selection and login for one invocation

use dialoguer::Input;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use lokicli_client::{AppCatalog, LokiClient, OAuth2ProxyAuth, TokenStore};
use lokicli_types::time::UtcRange;
use lokicli_types::{LokiError, Result};

use crate::config::{Config, StatePaths};

/// A failed session check is followed by at most one fresh login
const MAX_LOGIN_ATTEMPTS: usize = 2;

/// Probing a session token and obtaining a fresh one
#[allow(async_fn_in_trait)]
pub trait Authenticator {
    /// Whether the gateway accepts `token`
    async fn check(&self, token: &str) -> Result<bool>;

    /// Run a fresh login and return the new token
    async fn login(&self) -> Result<String>;
}

/// oauth2-proxy login with the callback URL pasted at the terminal
struct ProxyLogin {
    auth: OAuth2ProxyAuth,
    cancel: CancellationToken,
}

impl Authenticator for ProxyLogin {
    async fn check(&self, token: &str) -> Result<bool> {
        self.auth.check(token).await
    }

    async fn login(&self) -> Result<String> {
        let challenge = self.auth.begin().await?;
        eprintln!(
            "Please login and authorize access at: {}",
            challenge.authorize_url
        );
        eprintln!("Once authorized, copy and paste the callback URL here: ");

        let prompt = tokio::task::spawn_blocking(|| {
            Input::<String>::new()
                .with_prompt("Callback URL")
                .interact_text()
        });
        let callback_url = tokio::select! {
            _ = self.cancel.cancelled() => return Err(LokiError::Cancelled),
            result = prompt => result
                .map_err(|e| LokiError::Auth(format!("Prompt failed: {}", e)))?
                .map_err(|e| LokiError::Auth(format!("Cannot read callback URL: {}", e)))?,
        };

        self.auth.complete(&challenge, &callback_url).await
    }
}

/// Try the saved token for `project`, then fresh logins, up to
/// `MAX_LOGIN_ATTEMPTS` checks in total. Accepted tokens are saved and
/// rejected ones removed.
pub async fn authenticate<A: Authenticator>(
    auth: &A,
    store: &mut TokenStore,
    project: &str,
) -> Result<String> {
    let mut saved = store.get(project).map(str::to_string);

    for attempt in 1..=MAX_LOGIN_ATTEMPTS {
        let token = match saved.take() {
            Some(token) => token,
            None => auth.login().await?,
        };

        if auth.check(&token).await? {
            store.set(project, &token);
            store.save()?;
            eprintln!("Login successful.");
            return Ok(token);
        }

        warn!(attempt, project, "session rejected by gateway");
        store.remove(project);
        store.save()?;
        if attempt < MAX_LOGIN_ATTEMPTS {
            eprintln!("Login failed. Please login again. Loading login URL...");
        }
    }

    Err(LokiError::Auth(format!(
        "Login to {} failed after {} attempts.",
        project, MAX_LOGIN_ATTEMPTS
    )))
}

pub struct Session {
    config: Config,
    paths: StatePaths,
    project: Option<String>,
    cancel: CancellationToken,
}

impl Session {
    pub fn open(config: Config, paths: StatePaths, cancel: CancellationToken) -> Result<Self> {
        let project = paths.load_project()?;
        Ok(Self {
            config,
            paths,
            project,
            cancel,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn current_project(&self) -> Option<&str> {
        self.project.as_deref()
    }

    /// Validate and persist the selected project
    pub fn set_project(&mut self, project: &str) -> Result<()> {
        self.config.check_project(project)?;
        self.paths.save_project(project)?;
        info!(project, "project set");
        self.project = Some(project.to_string());
        Ok(())
    }

    /// Switch to `project` if given, otherwise use the saved selection
    pub fn select(&mut self, project: Option<&str>) -> Result<String> {
        if let Some(project) = project {
            self.set_project(project)?;
        }
        self.project
            .clone()
            .ok_or_else(|| LokiError::Config("Project not set.".to_string()))
    }

    fn gateway_url(&self) -> Result<String> {
        let project = self
            .project
            .as_deref()
            .ok_or_else(|| LokiError::Config("Project not set.".to_string()))?;
        self.config.gateway_url(project)
    }

    /// Return a session token the gateway accepts, logging in if needed
    pub async fn login(&self) -> Result<String> {
        let project = self
            .project
            .as_deref()
            .ok_or_else(|| LokiError::Config("Project not set.".to_string()))?;
        let auth = ProxyLogin {
            auth: OAuth2ProxyAuth::new(self.gateway_url()?, self.cancel.clone())?,
            cancel: self.cancel.clone(),
        };
        let mut store = TokenStore::load(self.paths.tokens());
        authenticate(&auth, &mut store, project).await
    }

    /// Authenticated client for the current project
    pub fn client(&self, token: &str) -> Result<LokiClient> {
        LokiClient::new(self.gateway_url()?, token, self.cancel.clone())
    }

    /// Apps that logged within `range`
    pub async fn catalog(&self, client: &LokiClient, range: &UtcRange) -> Result<AppCatalog> {
        let series = client.series(range).await?;
        let catalog = AppCatalog::from_series(&series);
        info!(apps = catalog.len(), "resolved app catalog");
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    use super::*;

    fn session(dir: &std::path::Path) -> Session {
        let config = Config {
            url_suffix: "example.com".to_string(),
            ..Config::default()
        };
        Session::open(config, StatePaths::new(dir.to_path_buf()), CancellationToken::new()).unwrap()
    }

    #[test]
    fn test_select_without_project_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path());
        assert!(matches!(session.select(None), Err(LokiError::Config(_))));
    }

    #[test]
    fn test_select_persists_project() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path());
        assert_eq!(session.select(Some("ao3")).unwrap(), "ao3");
        assert_eq!(session.gateway_url().unwrap(), "https://loki-gateway.ao3.example.com");

        let reopened = self::session(dir.path());
        assert_eq!(reopened.current_project(), Some("ao3"));
    }

    /// Answers checks from a script and hands out numbered fresh tokens
    struct ScriptedAuth {
        verdicts: RefCell<VecDeque<bool>>,
        checked: RefCell<Vec<String>>,
        logins: Cell<usize>,
    }

    impl ScriptedAuth {
        fn new(verdicts: &[bool]) -> Self {
            Self {
                verdicts: RefCell::new(verdicts.iter().copied().collect()),
                checked: RefCell::new(Vec::new()),
                logins: Cell::new(0),
            }
        }
    }

    impl Authenticator for ScriptedAuth {
        async fn check(&self, token: &str) -> Result<bool> {
            self.checked.borrow_mut().push(token.to_string());
            Ok(self.verdicts.borrow_mut().pop_front().unwrap_or(false))
        }

        async fn login(&self) -> Result<String> {
            self.logins.set(self.logins.get() + 1);
            Ok(format!("fresh-{}", self.logins.get()))
        }
    }

    fn store_with(dir: &std::path::Path, saved: Option<&str>) -> TokenStore {
        let mut store = TokenStore::load(dir.join("tokens.json"));
        if let Some(token) = saved {
            store.set("ao3", token);
        }
        store
    }

    #[tokio::test]
    async fn test_saved_token_accepted_without_login() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with(dir.path(), Some("saved"));
        let auth = ScriptedAuth::new(&[true]);

        assert_eq!(authenticate(&auth, &mut store, "ao3").await.unwrap(), "saved");
        assert_eq!(auth.logins.get(), 0);
    }

    #[tokio::test]
    async fn test_rejected_saved_token_then_fresh_login() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with(dir.path(), Some("stale"));
        let auth = ScriptedAuth::new(&[false, true]);

        assert_eq!(authenticate(&auth, &mut store, "ao3").await.unwrap(), "fresh-1");
        assert_eq!(*auth.checked.borrow(), vec!["stale", "fresh-1"]);

        let reloaded = TokenStore::load(dir.path().join("tokens.json"));
        assert_eq!(reloaded.get("ao3"), Some("fresh-1"));
    }

    #[tokio::test]
    async fn test_login_gives_up_after_one_retry() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with(dir.path(), Some("stale"));
        let auth = ScriptedAuth::new(&[false, false, true]);

        let result = authenticate(&auth, &mut store, "ao3").await;
        assert!(matches!(result, Err(LokiError::Auth(_))));
        assert_eq!(auth.logins.get(), 1);
        assert_eq!(auth.checked.borrow().len(), MAX_LOGIN_ATTEMPTS);
        assert_eq!(store.get("ao3"), None);
    }

    #[tokio::test]
    async fn test_without_saved_token_two_fresh_logins_at_most() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with(dir.path(), None);
        let auth = ScriptedAuth::new(&[false, false]);

        assert!(authenticate(&auth, &mut store, "ao3").await.is_err());
        assert_eq!(auth.logins.get(), 2);
        assert_eq!(*auth.checked.borrow(), vec!["fresh-1", "fresh-2"]);
    }

    #[test]
    fn test_unknown_project_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path());
        assert!(session.set_project("prod-eu").is_err());
        assert_eq!(session.current_project(), None);
    }
}
