use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use crate::agent::ScheduleStore;
use crate::cli::RequestKind;
use crate::config::AkerConfig;
use crate::protocol::{
    Handled, MessageKind, ProtocolDispatcher, RequestMessage, WireRequest, WireResponse,
};

use super::utils::load_persisted;

/// Request arguments
#[derive(Debug, Clone)]
pub struct RequestArgs {
    pub kind: RequestKind,
    pub dest: String,
    pub source: String,
    pub body: Option<PathBuf>,
    pub transaction_uuid: Option<String>,
}

/// Send one request and print the response
///
/// Goes to the running agent when its socket exists, otherwise the request
/// is handled in-process over the configured files.
pub fn request(config: &AkerConfig, args: RequestArgs) -> Result<()> {
    let request = build(args)?;
    let runtime = tokio::runtime::Runtime::new()?;
    let response = runtime.block_on(dispatch(config, request))?;

    println!("Transaction: {}", response.transaction_uuid);
    println!("Source:      {}", response.source);
    println!("Dest:        {}", response.dest);
    println!("Status:      {}", response.status);
    if let Some(content_type) = &response.content_type {
        println!("Type:        {}", content_type);
    }
    if let Some(payload) = &response.payload {
        println!();
        println!("{}", payload);
    }

    match response.error {
        Some(error) => anyhow::bail!("Request failed: {}", error),
        None => Ok(()),
    }
}

async fn dispatch(config: &AkerConfig, request: WireRequest) -> Result<WireResponse> {
    #[cfg(unix)]
    {
        let socket = &config.server.socket_path;
        if socket.exists() {
            tracing::debug!("Sending request to agent at {}", socket.display());
            return crate::protocol::server::send_request(socket, &request)
                .await
                .context("Failed to reach the running agent");
        }
        tracing::info!(
            "No agent socket at {}; handling request locally",
            socket.display()
        );
    }

    Ok(WireResponse::from(send(config, request.into()).await))
}

fn build(args: RequestArgs) -> Result<WireRequest> {
    let payload = match &args.body {
        Some(path) => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read request body: {}", path.display()))?,
        ),
        None => None,
    };

    Ok(WireRequest {
        kind: MessageKind::from(args.kind).to_string().to_lowercase(),
        transaction_uuid: args
            .transaction_uuid
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        source: args.source,
        dest: args.dest,
        path: String::new(),
        payload,
    })
}

/// Hand the request to a dispatcher over the configured files
///
/// The persisted schedule is installed first so "now" queries answer against
/// it, the same way the running agent would.
async fn send(config: &AkerConfig, request: RequestMessage) -> Handled {
    let store = Arc::new(ScheduleStore::new());
    if let Err(e) = load_persisted(&config.schedule.data_file, &store).await {
        tracing::warn!("Persisted schedule not loaded: {}", e);
    }

    let dispatcher = ProtocolDispatcher::new(store, config.schedule.clone());
    dispatcher.handle(request).await
}
