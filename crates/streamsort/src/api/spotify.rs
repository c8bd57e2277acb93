//! [`MusicService`] backed by the Spotify Web API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::auth::Authenticator;
use super::{MusicService, PlaybackRequest, SavedTrack, SearchResults, EDIT_BATCH, FOLLOW_BATCH};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::mob::{Album, Artist, Mob, MobKind, Page, Playlist, Track, User};

/// Attempts made for a rate-limited request.
const MAX_ATTEMPTS: u32 = 3;

/// Wait used when a 429 carries no `Retry-After`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 1;

/// Albums requested per page of an artist's discography.
const ARTIST_ALBUMS_LIMIT: u32 = 50;

/// Spotify Web API client.
#[derive(Debug)]
pub struct SpotifyClient {
    http: reqwest::Client,
    api_url: String,
    auth: Authenticator,
}

impl SpotifyClient {
    /// Create a client using the given authenticator.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &Config, auth: Authenticator) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("streamsort/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            http,
            api_url: config.spotify.api_url.trim_end_matches('/').to_string(),
            auth,
        })
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{path}", self.api_url)
        }
    }

    /// Send a request, refreshing the token once on 401 and waiting out 429s.
    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Option<Value>> {
        let url = self.url(path);
        let mut token = self.auth.access_token().await?;
        let mut refreshed = false;
        let mut attempt = 1;
        loop {
            debug!(method = %method, url = %url, attempt, "Spotify request");
            let mut request = self
                .http
                .request(method.clone(), &url)
                .bearer_auth(&token)
                .query(query);
            if let Some(body) = body {
                request = request.json(body);
            }
            let response = request.send().await?;
            match next_step(response.status(), refreshed, attempt, retry_after(&response)) {
                Step::Refresh => {
                    debug!("Access token rejected, refreshing");
                    token = self.auth.force_refresh().await?;
                    refreshed = true;
                }
                Step::Wait(wait) => {
                    warn!(url = %url, wait_secs = wait, "Rate limited by Spotify");
                    tokio::time::sleep(Duration::from_secs(wait)).await;
                    attempt += 1;
                }
                Step::Finish => return read_body(response).await,
            }
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let value = self
            .send(Method::GET, path, query, None)
            .await?
            .ok_or_else(|| Error::UnexpectedResponse(format!("empty response from {path}")))?;
        Ok(serde_json::from_value(value)?)
    }
}

/// What to do after a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// Refresh the token and send again.
    Refresh,
    /// Wait this many seconds and send again.
    Wait(u64),
    /// Hand the response to the caller.
    Finish,
}

/// A rejected token is refreshed once; a rate limit is waited out until
/// the last attempt.
fn next_step(status: StatusCode, refreshed: bool, attempt: u32, retry_after: Option<u64>) -> Step {
    if status == StatusCode::UNAUTHORIZED && !refreshed {
        Step::Refresh
    } else if status == StatusCode::TOO_MANY_REQUESTS && attempt < MAX_ATTEMPTS {
        Step::Wait(retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS))
    } else {
        Step::Finish
    }
}

fn retry_after(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Turn a response into JSON, or into an error for non-success statuses.
async fn read_body(response: Response) -> Result<Option<Value>> {
    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        let message = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
            .unwrap_or(text);
        return Err(Error::Api {
            status: status.as_u16(),
            message,
        });
    }
    if text.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(&text)?))
}

#[async_trait]
impl MusicService for SpotifyClient {
    async fn current_user(&self) -> Result<User> {
        self.get("/me", &[]).await
    }

    async fn fetch(&self, kind: MobKind, id: &str) -> Result<Mob> {
        let mob = match kind {
            MobKind::Track => Mob::Track(self.get::<Track>(&format!("/tracks/{id}"), &[]).await?),
            MobKind::Album => Mob::Album(self.get::<Album>(&format!("/albums/{id}"), &[]).await?),
            MobKind::Artist => {
                Mob::Artist(self.get::<Artist>(&format!("/artists/{id}"), &[]).await?)
            }
            MobKind::Playlist => {
                Mob::Playlist(self.get::<Playlist>(&format!("/playlists/{id}"), &[]).await?)
            }
            MobKind::User => Mob::User(self.get::<User>(&format!("/users/{id}"), &[]).await?),
            MobKind::Collection => {
                return Err(Error::internal("collections cannot be fetched from Spotify"))
            }
        };
        Ok(mob)
    }

    async fn search(&self, query: &str, kinds: &[MobKind], limit: u32) -> Result<SearchResults> {
        let types = kinds.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(",");
        let response: Value = self
            .get(
                "/search",
                &[
                    ("q", query.to_string()),
                    ("type", types),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        SearchResults::from_response(response, kinds)
    }

    async fn page(&self, url: &str) -> Result<Value> {
        self.get(url, &[]).await
    }

    async fn following_artists(&self, ids: &[String]) -> Result<Vec<bool>> {
        let mut following = Vec::with_capacity(ids.len());
        for batch in ids.chunks(FOLLOW_BATCH) {
            let answer: Vec<bool> = self
                .get(
                    "/me/following/contains",
                    &[("type", "artist".to_string()), ("ids", batch.join(","))],
                )
                .await?;
            following.extend(answer);
        }
        Ok(following)
    }

    async fn following_playlist(&self, playlist_id: &str, user_id: &str) -> Result<bool> {
        let answer: Vec<bool> = self
            .get(
                &format!("/playlists/{playlist_id}/followers/contains"),
                &[("ids", user_id.to_string())],
            )
            .await?;
        Ok(answer.first().copied().unwrap_or(false))
    }

    async fn saved_tracks(&self, limit: u32) -> Result<Page<SavedTrack>> {
        self.get("/me/tracks", &[("limit", limit.to_string())]).await
    }

    async fn artist_albums(&self, artist_id: &str) -> Result<Page<Album>> {
        self.get(
            &format!("/artists/{artist_id}/albums"),
            &[
                ("include_groups", "album,single".to_string()),
                ("limit", ARTIST_ALBUMS_LIMIT.to_string()),
            ],
        )
        .await
    }

    async fn create_playlist(&self, user_id: &str, name: &str) -> Result<Playlist> {
        let body = json!({ "name": name, "public": true });
        let value = self
            .send(Method::POST, &format!("/users/{user_id}/playlists"), &[], Some(&body))
            .await?
            .ok_or_else(|| Error::UnexpectedResponse("playlist creation returned nothing".to_string()))?;
        Ok(serde_json::from_value(value)?)
    }

    async fn add_items(&self, playlist_id: &str, uris: &[String]) -> Result<()> {
        let path = format!("/playlists/{playlist_id}/tracks");
        for batch in uris.chunks(EDIT_BATCH) {
            let body = json!({ "uris": batch });
            self.send(Method::POST, &path, &[], Some(&body)).await?;
        }
        debug!(playlist_id, count = uris.len(), "Added items");
        Ok(())
    }

    async fn remove_all_items(&self, playlist_id: &str, uris: &[String]) -> Result<()> {
        let path = format!("/playlists/{playlist_id}/tracks");
        for batch in uris.chunks(EDIT_BATCH) {
            let tracks: Vec<Value> = batch.iter().map(|uri| json!({ "uri": uri })).collect();
            let body = json!({ "tracks": tracks });
            self.send(Method::DELETE, &path, &[], Some(&body)).await?;
        }
        debug!(playlist_id, count = uris.len(), "Removed items");
        Ok(())
    }

    async fn start_playback(&self, request: &PlaybackRequest) -> Result<()> {
        self.send(Method::PUT, "/me/player/play", &[], Some(&request.body()))
            .await?;
        Ok(())
    }

    async fn login(&self) -> Result<()> {
        self.auth.access_token().await.map(drop)
    }

    fn logout(&self) -> bool {
        self.auth.logout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::auth::Token;
    use crate::interaction::scripted::ScriptedInteraction;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn client() -> SpotifyClient {
        let config = Config::default();
        let auth = Authenticator::new(&config, Arc::new(ScriptedInteraction::default())).unwrap();
        SpotifyClient::new(&config, auth).unwrap()
    }

    fn reply(status: &str, headers: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n{headers}\r\n{body}",
            body.len()
        )
    }

    async fn read_request(stream: &mut TcpStream) -> String {
        let mut buffer = Vec::new();
        let mut chunk = [0_u8; 1024];
        loop {
            let read = stream.read(&mut chunk).await.unwrap();
            if read == 0 {
                break;
            }
            buffer.extend_from_slice(&chunk[..read]);
            let text = String::from_utf8_lossy(&buffer).to_string();
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buffer.len() >= end + 4 + length {
                    return text;
                }
            }
        }
        String::from_utf8_lossy(&buffer).to_string()
    }

    /// A local server answering each connection with the next canned reply.
    async fn serve(replies: Vec<String>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        tokio::spawn(async move {
            for reply in replies {
                let (mut stream, _) = listener.accept().await.unwrap();
                let request = read_request(&mut stream).await;
                log.lock().unwrap().push(request);
                stream.write_all(reply.as_bytes()).await.unwrap();
                stream.shutdown().await.ok();
            }
        });
        (base, seen)
    }

    /// A client for `base` holding a cached, unexpired token.
    fn local_client(base: &str, name: &str) -> (SpotifyClient, PathBuf) {
        let dir = std::env::temp_dir().join(format!("streamsort_spotify_{name}_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let mut config = Config::default();
        config.cache.directory = Some(dir.clone());
        config.spotify.api_url = format!("{base}/v1");
        config.spotify.accounts_url = base.to_string();
        let token = Token {
            access_token: "stale".to_string(),
            refresh_token: Some("refresh-me".to_string()),
            expires_at: chrono::Utc::now().timestamp() + 3600,
            scope: String::new(),
        };
        std::fs::write(config.token_path(), serde_json::to_string(&token).unwrap()).unwrap();
        let auth = Authenticator::new(&config, Arc::new(ScriptedInteraction::default())).unwrap();
        (SpotifyClient::new(&config, auth).unwrap(), dir)
    }

    const ME: &str = r#"{"id": "me", "uri": "spotify:user:me", "display_name": "Me"}"#;

    #[test]
    fn test_url_joins_relative_paths() {
        let client = client();
        assert_eq!(client.url("/me"), "https://api.spotify.com/v1/me");
        assert_eq!(
            client.url("https://api.spotify.com/v1/me/tracks?offset=50"),
            "https://api.spotify.com/v1/me/tracks?offset=50"
        );
    }

    #[test]
    fn test_custom_api_url() {
        let mut config = Config::default();
        config.spotify.api_url = "http://127.0.0.1:9000/v1/".to_string();
        let auth = Authenticator::new(&config, Arc::new(ScriptedInteraction::default())).unwrap();
        let client = SpotifyClient::new(&config, auth).unwrap();
        assert_eq!(client.url("/search"), "http://127.0.0.1:9000/v1/search");
    }

    #[test]
    fn test_next_step_refreshes_once() {
        assert_eq!(next_step(StatusCode::UNAUTHORIZED, false, 1, None), Step::Refresh);
        assert_eq!(next_step(StatusCode::UNAUTHORIZED, true, 1, None), Step::Finish);
    }

    #[test]
    fn test_next_step_waits_out_rate_limits() {
        let limited = StatusCode::TOO_MANY_REQUESTS;
        assert_eq!(next_step(limited, false, 1, Some(4)), Step::Wait(4));
        assert_eq!(next_step(limited, false, 2, None), Step::Wait(DEFAULT_RETRY_AFTER_SECS));
        assert_eq!(next_step(limited, false, MAX_ATTEMPTS, Some(4)), Step::Finish);
    }

    #[test]
    fn test_next_step_finishes_other_statuses() {
        assert_eq!(next_step(StatusCode::OK, false, 1, None), Step::Finish);
        assert_eq!(next_step(StatusCode::NOT_FOUND, false, 1, Some(2)), Step::Finish);
    }

    #[tokio::test]
    async fn test_rejected_token_is_refreshed_and_retried() {
        let (base, seen) = serve(vec![
            reply("401 Unauthorized", "", r#"{"error": {"status": 401, "message": "expired"}}"#),
            reply("200 OK", "", r#"{"access_token": "fresh", "expires_in": 3600}"#),
            reply("200 OK", "", ME),
        ])
        .await;
        let (client, dir) = local_client(&base, "refresh");

        let user = client.current_user().await.unwrap();
        assert_eq!(user.id, "me");

        let requests = seen.lock().unwrap().clone();
        assert_eq!(requests.len(), 3);
        assert!(requests[0].starts_with("GET /v1/me "));
        assert!(requests[0].to_lowercase().contains("bearer stale"));
        assert!(requests[1].starts_with("POST /api/token "));
        assert!(requests[1].contains("refresh_token=refresh-me"));
        assert!(requests[2].to_lowercase().contains("bearer fresh"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_rate_limit_retries_then_gives_up() {
        let limited = reply("429 Too Many Requests", "Retry-After: 0\r\n", "{}");
        let (base, seen) = serve(vec![limited.clone(), limited.clone(), reply("200 OK", "", ME)]).await;
        let (client, dir) = local_client(&base, "retry");
        assert_eq!(client.current_user().await.unwrap().id, "me");
        assert_eq!(seen.lock().unwrap().len(), 3);
        let _ = std::fs::remove_dir_all(&dir);

        let (base, seen) = serve(vec![limited.clone(), limited.clone(), limited]).await;
        let (client, dir) = local_client(&base, "limited");
        let err = client.current_user().await.unwrap_err();
        assert_eq!(err.status(), Some(429));
        assert_eq!(seen.lock().unwrap().len(), 3);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_truncated_body_is_a_connection_error() {
        let truncated = "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 500\r\nConnection: close\r\n\r\n{\"id\"".to_string();
        let (base, _seen) = serve(vec![truncated]).await;
        let (client, dir) = local_client(&base, "truncated");
        let err = client.current_user().await.unwrap_err();
        assert!(err.is_connection_error(), "{err:?}");
        let _ = std::fs::remove_dir_all(&dir);
    }
}
