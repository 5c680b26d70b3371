//! Ping command implementation.

use super::{open_session, ConnectOptions};
use std::time::Instant;

/// Runs the ping command.
pub async fn run(options: &ConnectOptions) -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();
    let session = open_session(options).await?;
    let elapsed = start.elapsed();

    session.connection.ping(Some("ddp-cli".to_string()))?;

    println!("Connected to {}", options.url);
    println!("  Session:   {}", session.session_id);
    println!("  Handshake: {:.1} ms", elapsed.as_secs_f64() * 1000.0);

    session.close(options.timeout).await;
    Ok(())
}
