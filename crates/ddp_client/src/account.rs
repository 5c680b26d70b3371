//! Password accounts on top of method calls.
//!
//! Passwords never leave the client in clear text: they are sent as
//! `{"digest": <hex>, "algorithm": "sha-256"}`.

use crate::connection::Connection;
use crate::error::{ClientError, ClientResult};
use crate::registry::MethodCall;
use ddp_protocol::ejson;
use ddp_protocol::{DdpError, ErrorKind};
use parking_lot::RwLock;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Hashes passwords before they are sent.
pub trait PasswordHasher: Send + Sync {
    /// Name sent in the `algorithm` field.
    fn algorithm(&self) -> &'static str;

    /// Lowercase hex digest of `password`.
    fn digest(&self, password: &str) -> String;
}

/// SHA-256 password hashing.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256Hasher;

impl PasswordHasher for Sha256Hasher {
    fn algorithm(&self) -> &'static str {
        "sha-256"
    }

    fn digest(&self, password: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(password.as_bytes());
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }
}

/// Login state of an [`Account`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountState {
    /// Whether the last login, resume or user creation succeeded.
    pub logged_in: bool,
    /// Server-side user id.
    pub user_id: Option<String>,
    /// Resume token.
    pub token: Option<String>,
    /// When the resume token expires.
    pub token_expires: Option<SystemTime>,
    /// The error of the last failed operation.
    pub error: Option<DdpError>,
}

impl AccountState {
    fn logged_in(user_id: String, token: String, token_expires: SystemTime) -> Self {
        Self {
            logged_in: true,
            user_id: Some(user_id),
            token: Some(token),
            token_expires: Some(token_expires),
            error: None,
        }
    }

    fn failed(error: DdpError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }
}

/// Parses the `{id, token, tokenExpires}` object returned by login methods.
fn parse_login_result(result: &Value) -> Result<(String, String, SystemTime), DdpError> {
    let malformed = |what: &str| {
        DdpError::new(
            ErrorKind::Application,
            "unexpected-response",
            format!("login result is missing {what}"),
        )
    };

    let id = result
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("id"))?;
    let token = result
        .get("token")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("token"))?;
    let expires = result
        .get("tokenExpires")
        .and_then(ejson::date_from_value)
        .ok_or_else(|| malformed("tokenExpires"))?;
    Ok((id.to_string(), token.to_string(), expires))
}

/// User accounts over a [`Connection`].
///
/// The state is updated when the corresponding `result` arrives; the
/// `begin_*` methods return the call so callers can observe it, and the
/// async methods wait for it.
#[derive(Clone)]
pub struct Account {
    connection: Connection,
    state: Arc<RwLock<AccountState>>,
    hasher: Arc<dyn PasswordHasher>,
}

impl Account {
    /// Creates an account helper using SHA-256 password hashing.
    pub fn new(connection: Connection) -> Self {
        Self::with_hasher(connection, Arc::new(Sha256Hasher))
    }

    /// Creates an account helper with a custom password hasher.
    pub fn with_hasher(connection: Connection, hasher: Arc<dyn PasswordHasher>) -> Self {
        Self {
            connection,
            state: Arc::new(RwLock::new(AccountState::default())),
            hasher,
        }
    }

    /// A snapshot of the login state.
    pub fn state(&self) -> AccountState {
        self.state.read().clone()
    }

    /// Whether a user is logged in.
    pub fn is_logged_in(&self) -> bool {
        self.state.read().logged_in
    }

    /// The logged-in user's id.
    pub fn user_id(&self) -> Option<String> {
        self.state.read().user_id.clone()
    }

    /// The current resume token.
    pub fn token(&self) -> Option<String> {
        self.state.read().token.clone()
    }

    /// When the resume token expires.
    pub fn token_expires(&self) -> Option<SystemTime> {
        self.state.read().token_expires
    }

    /// The error of the last failed operation.
    pub fn error(&self) -> Option<DdpError> {
        self.state.read().error.clone()
    }

    fn password(&self, password: &str) -> Value {
        json!({
            "digest": self.hasher.digest(password),
            "algorithm": self.hasher.algorithm(),
        })
    }

    /// Calls `createUser`. A successful result logs the new user in.
    pub fn begin_create_user(&self, username: &str, password: &str) -> Arc<MethodCall> {
        debug!(%username, "creating user");
        let params = json!({
            "username": username,
            "password": self.password(password),
        });
        self.login_call("createUser", params)
    }

    /// Calls `login` with a username and password.
    pub fn begin_login(&self, username: &str, password: &str) -> Arc<MethodCall> {
        debug!(%username, "logging in");
        let params = json!({
            "user": {"username": username},
            "password": self.password(password),
        });
        self.login_call("login", params)
    }

    /// Calls `login` with a resume token from an earlier session.
    pub fn begin_resume_session(&self, token: &str) -> Arc<MethodCall> {
        debug!("resuming login session");
        self.login_call("login", json!({ "resume": token }))
    }

    /// Calls `logout`. Success clears the login state; failure only records
    /// the error.
    pub fn begin_logout(&self) -> Arc<MethodCall> {
        debug!("logging out");
        let call = self.connection.call("logout", Vec::new());
        let state = Arc::clone(&self.state);
        call.on_result(move |call| match call.error() {
            None => {
                *state.write() = AccountState::default();
                info!("logged out");
            }
            Some(error) => {
                // The server still considers the session live.
                warn!(%error, "logout failed");
                state.write().error = Some(error);
            }
        });
        call
    }

    fn login_call(&self, method: &str, params: Value) -> Arc<MethodCall> {
        let call = self.connection.call(method, vec![params]);
        let state = Arc::clone(&self.state);
        call.on_result(move |call| {
            let outcome = match call.error() {
                Some(error) => Err(error),
                None => parse_login_result(&call.result()),
            };
            match outcome {
                Ok((user_id, token, expires)) => {
                    info!(%user_id, "logged in");
                    *state.write() = AccountState::logged_in(user_id, token, expires);
                }
                Err(error) => {
                    warn!(%error, "login failed");
                    *state.write() = AccountState::failed(error);
                }
            }
        });
        call
    }

    /// Creates a user and waits for the outcome.
    pub async fn create_user(&self, username: &str, password: &str) -> ClientResult<()> {
        let call = self.begin_create_user(username, password);
        Self::finish_login(&call).await
    }

    /// Logs in and waits for the outcome.
    pub async fn login(&self, username: &str, password: &str) -> ClientResult<()> {
        let call = self.begin_login(username, password);
        Self::finish_login(&call).await
    }

    /// Resumes a session and waits for the outcome.
    pub async fn resume_session(&self, token: &str) -> ClientResult<()> {
        let call = self.begin_resume_session(token);
        Self::finish_login(&call).await
    }

    /// Logs out and waits for the outcome.
    pub async fn logout(&self) -> ClientResult<()> {
        let call = self.begin_logout();
        call.wait_result().await.map_err(ClientError::Call)?;
        Ok(())
    }

    /// Waits for a login-style call.
    ///
    /// A server error is a [`ClientError::Call`]; a result without the
    /// expected fields is a [`ClientError::UnexpectedResponse`].
    async fn finish_login(call: &MethodCall) -> ClientResult<()> {
        let result = call.wait_result().await.map_err(ClientError::Call)?;
        parse_login_result(&result)
            .map(|_| ())
            .map_err(|error| ClientError::UnexpectedResponse(error.to_string()))
    }
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("Account")
            .field("logged_in", &state.logged_in)
            .field("user_id", &state.user_id)
            .finish()
    }
}
