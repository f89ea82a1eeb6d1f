//! API client for the minigame admin backend.
//!
//! `ApiClient` logs admins in against the Express API and attaches the
//! bearer token held by the `SessionStore` to every authenticated call.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{header, Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::auth::{Principal, PrincipalId, PrincipalPatch, SessionStore};

use super::ApiError;

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

const LOGIN_PATH: &str = "/api/auth/login";
const PROFILE_PATH: &str = "/api/auth/me";
const LOGOUT_PATH: &str = "/api/auth/logout";

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    admin: Principal,
    token: String,
}

/// Client for the admin API.
/// Clone is cheap - reqwest::Client and the store are both shared.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    session: Arc<SessionStore>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, session: Arc<SessionStore>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
        })
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn auth_headers(&self) -> Result<header::HeaderMap, ApiError> {
        let token = self.session.token().ok_or(ApiError::NotAuthenticated)?;
        let mut headers = header::HeaderMap::new();
        let value = header::HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| ApiError::InvalidResponse("stored token is not a valid header value".to_string()))?;
        headers.insert(header::AUTHORIZATION, value);
        Ok(headers)
    }

    async fn check_response(response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_status(status, &body))
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    /// Authenticated GET. A 401 means the token is dead, so the session is
    /// dropped before the error is returned.
    async fn get_authed<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self
            .client
            .get(self.url(path))
            .headers(self.auth_headers()?)
            .send()
            .await?;

        match Self::check_response(response).await {
            Ok(response) => Self::parse(response).await,
            Err(e) if e.is_session_rejected() => {
                warn!(path, "Token rejected, clearing session");
                self.session.clear_session();
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Log in and store the returned admin and token in the session.
    pub async fn login(&self, username: &str, password: &str) -> Result<Principal, ApiError> {
        let response = self
            .client
            .post(self.url(LOGIN_PATH))
            .header(header::ACCEPT, "application/json")
            .json(&LoginRequest { username, password })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_login_status(status, &body));
        }
        let login: LoginResponse = Self::parse(response).await?;

        if login.token.is_empty() {
            return Err(ApiError::InvalidResponse("login returned an empty token".to_string()));
        }

        info!(admin = %login.admin.id, "Login successful");
        self.session.set_session(login.admin.clone(), login.token);
        Ok(login.admin)
    }

    /// Fetch the current profile and fold it into the session. Only keys
    /// the backend actually sent are changed; an explicit null name clears it.
    pub async fn refresh_profile(&self) -> Result<Principal, ApiError> {
        let profile: Value = self.get_authed(PROFILE_PATH).await?;

        let fetched_id = profile
            .get("id")
            .cloned()
            .and_then(|id| serde_json::from_value::<PrincipalId>(id).ok());
        debug!(admin = ?fetched_id, "Profile fetched");
        if let (Some(current), Some(fetched)) = (self.session.principal(), fetched_id) {
            if current.id != fetched {
                warn!(current = %current.id, %fetched, "Profile id differs from session, keeping session id");
            }
        }

        let patch = PrincipalPatch::try_from(profile)
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
        self.session.update_session(patch);

        self.session.principal().ok_or(ApiError::NotAuthenticated)
    }

    /// Tell the backend we are leaving, then drop the local session no
    /// matter what the backend said.
    pub async fn logout(&self) {
        if let Ok(headers) = self.auth_headers() {
            let result = self
                .client
                .post(self.url(LOGOUT_PATH))
                .headers(headers)
                .send()
                .await;
            match result {
                Ok(response) if !response.status().is_success() => {
                    debug!(status = %response.status(), "Backend logout returned an error");
                }
                Err(e) => debug!(error = %e, "Backend logout failed"),
                Ok(_) => {}
            }
        }
        self.session.clear_session();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemorySlot;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    /// Read one HTTP/1.1 request (head plus Content-Length body).
    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(head_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..head_end]).to_lowercase();
                let body_len = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= head_end + 4 + body_len {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    /// Serve a single canned response; the handle yields the raw request.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            request
        });
        (format!("http://{}", addr), handle)
    }

    fn client(base: &str) -> ApiClient {
        let store = Arc::new(SessionStore::new(Arc::new(MemorySlot::new())));
        ApiClient::new(base, store).unwrap()
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let api = client("http://localhost:4000/");
        assert_eq!(api.url(LOGIN_PATH), "http://localhost:4000/api/auth/login");
    }

    #[test]
    fn test_auth_headers_need_a_session() {
        let api = client("http://localhost:4000");
        assert!(matches!(api.auth_headers(), Err(ApiError::NotAuthenticated)));

        api.session().set_session(Principal::new(1i64), "abc.def");
        let headers = api.auth_headers().unwrap();
        assert_eq!(headers[header::AUTHORIZATION], "Bearer abc.def");
    }

    #[test]
    fn test_login_response_shape() {
        let login: LoginResponse = serde_json::from_str(
            r#"{"admin":{"id":1,"name":"Root","role":"admin","createdAt":"2024-01-01"},"token":"jwt"}"#,
        )
        .unwrap();
        assert_eq!(login.admin.name.as_deref(), Some("Root"));
        assert_eq!(login.token, "jwt");
        assert!(login.admin.extra.contains_key("createdAt"));
    }

    #[tokio::test]
    async fn test_authed_call_without_session_fails_fast() {
        let api = client("http://127.0.0.1:9");
        let result = api.refresh_profile().await;
        assert!(matches!(result, Err(ApiError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn test_logout_clears_even_when_backend_unreachable() {
        let api = client("http://127.0.0.1:9");
        api.session().set_session(Principal::new(1i64), "tok");
        api.logout().await;
        assert!(!api.session().is_authenticated());
    }

    #[tokio::test]
    async fn test_login_stores_session() {
        let (base, server) = serve_once(
            "200 OK",
            r#"{"admin":{"id":1,"name":"Root","role":"admin"},"token":"jwt-1"}"#,
        )
        .await;
        let api = client(&base);

        let admin = api.login("root", "pw").await.unwrap();
        assert_eq!(admin.name.as_deref(), Some("Root"));

        let state = api.session().state();
        assert!(state.is_authenticated());
        assert_eq!(state.token(), Some("jwt-1"));
        assert_eq!(state.principal().map(|p| p.id.clone()), Some(PrincipalId::Int(1)));

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/auth/login "));
        assert!(request.contains(r#""username":"root""#));
        assert!(request.contains(r#""password":"pw""#));
    }

    #[tokio::test]
    async fn test_login_rejected_credentials() {
        let (base, server) = serve_once("401 Unauthorized", r#"{"error":"bad password"}"#).await;
        let api = client(&base);

        let result = api.login("root", "wrong").await;
        assert!(matches!(result, Err(ApiError::InvalidCredentials)));
        assert!(!api.session().is_authenticated());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_token_clears_session() {
        let (base, server) = serve_once("401 Unauthorized", r#"{"error":"expired"}"#).await;
        let api = client(&base);
        api.session().set_session(Principal::new(1i64), "stale-token");

        let result = api.refresh_profile().await;
        assert!(matches!(result, Err(ApiError::Unauthorized)));
        assert!(!api.session().is_authenticated());
        assert_eq!(api.session().token(), None);

        let request = server.await.unwrap().to_lowercase();
        assert!(request.starts_with("get /api/auth/me "));
        assert!(request.contains("authorization: bearer stale-token"));
    }

    #[tokio::test]
    async fn test_refresh_merges_only_sent_fields() {
        let (base, server) = serve_once("200 OK", r#"{"id":5,"avatar":"a.png"}"#).await;
        let api = client(&base);
        api.session()
            .set_session(Principal::new(5i64).with_name("Old").with_role("editor"), "tok");

        let principal = api.refresh_profile().await.unwrap();
        assert_eq!(principal.name.as_deref(), Some("Old"));
        assert_eq!(principal.role.as_deref(), Some("editor"));
        assert_eq!(principal.extra["avatar"], json!("a.png"));
        assert_eq!(api.session().token().as_deref(), Some("tok"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_refresh_explicit_null_name_clears_it() {
        let (base, server) = serve_once("200 OK", r#"{"id":5,"name":null,"role":"owner"}"#).await;
        let api = client(&base);
        api.session().set_session(Principal::new(5i64).with_name("Old"), "tok");

        let principal = api.refresh_profile().await.unwrap();
        assert_eq!(principal.name, None);
        assert_eq!(principal.role.as_deref(), Some("owner"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_refresh_keeps_session_id() {
        let (base, server) = serve_once("200 OK", r#"{"id":99,"name":"New"}"#).await;
        let api = client(&base);
        api.session().set_session(Principal::new(5i64), "tok");

        let principal = api.refresh_profile().await.unwrap();
        assert_eq!(principal.id, PrincipalId::Int(5));
        assert_eq!(principal.name.as_deref(), Some("New"));
        server.await.unwrap();
    }
}
