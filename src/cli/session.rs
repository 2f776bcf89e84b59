//! CLI handlers for token, session, and request commands.

use std::path::Path;
use std::sync::Arc;

use crate::auth::{FileTokenStore, TokenCodec};
use crate::config::ClientConfig;
use crate::pipeline::RequestPipeline;
use crate::session::{HeadlessNavigator, Termination};
use crate::transport::{HttpRequest, Method};

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn pipeline(config_path: Option<&Path>) -> Result<(RequestPipeline, Arc<HeadlessNavigator>), Box<dyn std::error::Error>> {
    let config = ClientConfig::load(config_path)?;
    let store = Arc::new(FileTokenStore::new(config.token_store_config()));
    let navigator = Arc::new(HeadlessNavigator::at("/cli"));
    let pipeline = RequestPipeline::builder(config)
        .store(store)
        .navigator(navigator.clone())
        .build()?;
    Ok((pipeline, navigator))
}

/// Handle `gatehouse token inspect [TOKEN]`.
pub fn handle_inspect(config_path: Option<&Path>, token: Option<String>) -> CliResult {
    let token = match token {
        Some(token) => token,
        None => {
            let (pipeline, _) = pipeline(config_path)?;
            pipeline.current_token().ok_or("no token given and no session stored")?
        }
    };
    let codec = TokenCodec::default();
    match TokenCodec::decode(&token) {
        Ok(claims) => {
            println!("subject: {}", claims.subject_id.as_deref().unwrap_or("-"));
            println!("kind:    {}", claims.kind.as_deref().unwrap_or("-"));
            match claims.expires_at {
                Some(at) => println!("expires: {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
                None => println!("expires: - (treated as expired)"),
            }
            println!("expired: {}", codec.is_expired(Some(&token)));
        }
        Err(e) => println!("malformed token: {e}"),
    }
    Ok(())
}

/// Handle `gatehouse session status`.
pub fn handle_status(config_path: Option<&Path>) -> CliResult {
    let (pipeline, _) = pipeline(config_path)?;
    match pipeline.current_token() {
        Some(token) => match pipeline.codec().time_remaining(&token) {
            Some(left) => println!("Logged in (expires in {}m)", left.num_minutes()),
            None => println!("Token expired (refreshed on next request)"),
        },
        None => println!("Not logged in"),
    }
    if let Some(user) = pipeline.user_context() {
        println!("User: {user}");
    }
    Ok(())
}

/// Handle `gatehouse session login --token <T>`.
pub fn handle_login(config_path: Option<&Path>, token: &str) -> CliResult {
    let (pipeline, _) = pipeline(config_path)?;
    pipeline.establish_session(token, None)?;
    println!("Session stored");
    Ok(())
}

/// Handle `gatehouse session logout`.
pub fn handle_logout(config_path: Option<&Path>) -> CliResult {
    let (pipeline, _) = pipeline(config_path)?;
    let had_session = pipeline.current_token().is_some();
    match pipeline.logout() {
        Termination::AlreadyTerminated => println!("No session to clear"),
        _ if !had_session => println!("No session to clear"),
        _ => println!("Session cleared"),
    }
    Ok(())
}

/// Handle `gatehouse request <METHOD> <PATH>`.
pub async fn handle_request(
    config_path: Option<&Path>,
    method: &str,
    path: &str,
    data: Option<&str>,
) -> CliResult {
    let method: Method = method
        .parse()
        .map_err(|_| format!("unsupported method: {method}"))?;
    let mut request = HttpRequest::new(method, path);
    if let Some(data) = data {
        request = request.with_json(serde_json::from_str(data)?);
    }

    let (pipeline, navigator) = pipeline(config_path)?;
    match pipeline.send(request).await {
        Ok(response) => {
            eprintln!("HTTP {}", response.status);
            match response.json_body() {
                Some(json) => println!("{}", serde_json::to_string_pretty(&json)?),
                None => println!("{}", response.body),
            }
            Ok(())
        }
        Err(e) => {
            let normalized = e.to_normalized();
            eprintln!("{}", serde_json::to_string_pretty(&normalized)?);
            if !navigator.redirects().is_empty() {
                eprintln!("Session ended; run `gatehouse session login --token <TOKEN>`");
            }
            Err(e.into())
        }
    }
}
