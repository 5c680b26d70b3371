//! Login command implementation.

use super::{open_session, ConnectOptions};
use ddp_client::Account;
use std::time::{SystemTime, UNIX_EPOCH};

/// What to log in with.
#[derive(Debug, Clone)]
pub enum Credentials {
    /// Username and clear-text password; only the digest is sent.
    Password {
        /// Username.
        user: String,
        /// Password.
        password: String,
    },
    /// A resume token from an earlier login.
    Resume(String),
}

/// Runs the login command.
pub async fn run(
    options: &ConnectOptions,
    credentials: Credentials,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = open_session(options).await?;
    let account = Account::new(session.connection.clone());

    let attempt = async {
        match &credentials {
            Credentials::Password { user, password } => account.login(user, password).await,
            Credentials::Resume(token) => account.resume_session(token).await,
        }
    };
    let outcome = tokio::time::timeout(options.timeout, attempt)
        .await
        .map_err(|_| format!("no login result within {:?}", options.timeout))?;

    if outcome.is_ok() {
        let state = account.state();
        println!("Logged in");
        println!("  User:    {}", state.user_id.unwrap_or_default());
        println!("  Token:   {}", state.token.unwrap_or_default());
        if let Some(expires) = state.token_expires {
            let seconds = expires
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default();
            let remaining = expires
                .duration_since(SystemTime::now())
                .map(|d| d.as_secs() / 3600)
                .unwrap_or_default();
            println!("  Expires: {seconds} (unix seconds, ~{remaining} h from now)");
        }
    }

    session.close(options.timeout).await;
    outcome.map_err(Into::into)
}
