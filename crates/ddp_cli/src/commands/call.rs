//! Call command implementation.

use super::{open_session, parse_param, render, ConnectOptions};
use ddp_client::ClientError;
use serde::Serialize;
use serde_json::Value;

/// Outcome of a method call.
#[derive(Debug, Serialize)]
pub struct CallOutput {
    /// Method name.
    pub method: String,
    /// Call id.
    pub id: String,
    /// The result, if the call succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The error, if the call failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ddp_client::DdpError>,
    /// Whether `updated` arrived before the command exited.
    pub updated: bool,
}

/// Runs the call command.
pub async fn run(
    options: &ConnectOptions,
    method: &str,
    params: &[String],
    wait_updated: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = open_session(options).await?;
    let params: Vec<Value> = params.iter().map(|p| parse_param(p)).collect();
    let call = session.connection.call(method, params);

    let outcome = tokio::time::timeout(options.timeout, call.wait_result())
        .await
        .map_err(|_| format!("no result for {method} within {:?}", options.timeout))?;
    if wait_updated {
        let _ = tokio::time::timeout(options.timeout, call.wait_updated()).await;
    }

    let output = CallOutput {
        method: method.to_string(),
        id: call.id(),
        result: outcome.as_ref().ok().cloned(),
        error: outcome.as_ref().err().cloned(),
        updated: call.has_updated(),
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&output)?),
        _ => match (&output.result, &output.error) {
            (Some(result), _) => println!("{}", render(result)),
            (_, Some(error)) => eprintln!("error: {error}"),
            _ => {}
        },
    }

    session.close(options.timeout).await;
    match outcome {
        Ok(_) => Ok(()),
        Err(error) => Err(ClientError::Call(error).into()),
    }
}
