//! Everything a sentence needs besides the state it acts on.

use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;

use crate::api::MusicService;
use crate::config::{Config, SearchConfig};
use crate::error::{Error, Result};
use crate::interaction::Interaction;
use crate::liked::{LikedCache, LikedSongs};
use crate::mob::User;
use crate::storage::Catalog;

/// A logged-in shell session.
pub struct Session {
    service: Arc<dyn MusicService>,
    interaction: Arc<dyn Interaction>,
    user: User,
    search: SearchConfig,
    liked_cache: LikedCache,
    liked: OnceCell<LikedSongs>,
    catalog: Option<Mutex<Catalog>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.user.id)
            .field("search", &self.search)
            .field("liked_cache", &self.liked_cache)
            .field("catalog", &self.catalog.is_some())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Start a session for the user the service is logged in as.
    ///
    /// # Errors
    ///
    /// Returns an error if the current user cannot be fetched.
    pub async fn start(
        config: &Config,
        service: Arc<dyn MusicService>,
        interaction: Arc<dyn Interaction>,
    ) -> Result<Self> {
        service.login().await?;
        let user = service.current_user().await?;
        Ok(Self {
            service,
            interaction,
            user,
            search: config.search.clone(),
            liked_cache: LikedCache::new(config.liked_songs_path(), config.liked_songs_max_age()),
            liked: OnceCell::new(),
            catalog: None,
        })
    }

    /// Attach a catalog for the `backup` sentence.
    #[must_use]
    pub fn with_catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = Some(Mutex::new(catalog));
        self
    }

    /// The music service.
    #[must_use]
    pub fn service(&self) -> &dyn MusicService {
        self.service.as_ref()
    }

    /// The logged-in user.
    #[must_use]
    pub fn user(&self) -> &User {
        &self.user
    }

    /// Search settings.
    #[must_use]
    pub fn search_config(&self) -> &SearchConfig {
        &self.search
    }

    /// Tell the user something.
    pub fn notify(&self, message: &str) {
        self.interaction.notify(message);
    }

    /// Ask the user a yes/no question.
    #[must_use]
    pub fn confirm(&self, message: &str) -> bool {
        self.interaction.confirm(message)
    }

    /// Read a line from the user.
    #[must_use]
    pub fn read_line(&self, prompt: &str) -> Option<String> {
        self.interaction.read_line(prompt)
    }

    /// The liked songs, checked against Spotify once per session.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be checked.
    pub async fn liked(&self) -> Result<&LikedSongs> {
        self.liked
            .get_or_try_init(|| self.liked_cache.check(self.service.as_ref()))
            .await
    }

    /// Log in again, refresh the current user and forget the liked songs
    /// checked for the previous login.
    ///
    /// # Errors
    ///
    /// Returns an error if login fails.
    pub async fn relogin(&mut self) -> Result<()> {
        self.service.login().await?;
        self.user = self.service.current_user().await?;
        self.liked = OnceCell::new();
        Ok(())
    }

    /// Forget stored credentials. Returns whether they were removed.
    #[must_use]
    pub fn logout(&self) -> bool {
        self.service.logout()
    }

    /// Run `f` with the catalog locked.
    ///
    /// # Errors
    ///
    /// Returns an error if no catalog is attached, or whatever `f` returns.
    pub fn with_catalog_locked<R>(&self, f: impl FnOnce(&Catalog) -> Result<R>) -> Result<R> {
        let catalog = self
            .catalog
            .as_ref()
            .ok_or_else(|| Error::internal("no catalog is open in this session"))?;
        let guard = catalog
            .lock()
            .map_err(|_| Error::internal("catalog lock poisoned"))?;
        f(&guard)
    }
}
