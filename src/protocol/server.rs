use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};

use super::dispatcher::ProtocolDispatcher;
use super::wire::{WireRequest, WireResponse};
use crate::agent::Shutdown;
use crate::error::{AkerError, io_err};
use crate::persist;

/// Serve protocol requests on a Unix socket until `shutdown` fires
///
/// Each line on a connection is one JSON request; each gets one JSON line
/// back. The socket file is removed on exit.
pub async fn serve(
    socket: PathBuf,
    dispatcher: Arc<ProtocolDispatcher>,
    mut shutdown: Shutdown,
) -> Result<(), AkerError> {
    let prepared = socket.clone();
    persist::blocking(move || {
        if let Some(dir) = prepared.parent() {
            persist::ensure_directory_exists(dir)?;
        }
        prepare_socket_for_bind(&prepared)
    })
    .await?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    let bound = socket.clone();
    persist::blocking(move || set_socket_permissions(&bound)).await?;
    tracing::info!("Listening for requests on {}", socket.display());

    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, dispatcher).await {
                        tracing::error!("Request connection failed: {}", e);
                    }
                });
            }
        }
    }

    drop(listener);
    persist::blocking(move || match std::fs::remove_file(&socket) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_err(&socket, e)),
    })
    .await
}

async fn handle_client(
    stream: UnixStream,
    dispatcher: Arc<ProtocolDispatcher>,
) -> Result<(), AkerError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("request socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<WireRequest>(&line) {
            Ok(request) => WireResponse::from(dispatcher.handle(request.into()).await),
            Err(e) => WireResponse::malformed(format!("invalid request JSON: {}", e)),
        };

        write_response(&mut writer, &response).await?;
    }

    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &WireResponse,
) -> Result<(), AkerError> {
    let mut line = serde_json::to_string(response)?;
    line.push('\n');
    writer
        .write_all(line.as_bytes())
        .await
        .map_err(|e| io_err("request socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("request socket flush", e))
}

/// Send one request to a running agent and wait for its response
pub async fn send_request(socket: &Path, request: &WireRequest) -> Result<WireResponse, AkerError> {
    let stream = UnixStream::connect(socket).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused => {
            AkerError::AgentNotRunning {
                socket: socket.to_path_buf(),
            }
        }
        _ => io_err(socket, e),
    })?;

    let (reader, mut writer) = stream.into_split();
    let mut line = serde_json::to_string(request)?;
    line.push('\n');
    writer
        .write_all(line.as_bytes())
        .await
        .map_err(|e| io_err(socket, e))?;
    writer.flush().await.map_err(|e| io_err(socket, e))?;

    let reply = BufReader::new(reader)
        .lines()
        .next_line()
        .await
        .map_err(|e| io_err(socket, e))?
        .ok_or_else(|| {
            io_err(
                socket,
                std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "agent closed the connection without a response",
                ),
            )
        })?;

    Ok(serde_json::from_str(&reply)?)
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), AkerError> {
    if !socket.exists() {
        return Ok(());
    }

    if std::os::unix::net::UnixStream::connect(socket).is_ok() {
        return Err(io_err(
            socket,
            std::io::Error::new(
                std::io::ErrorKind::AddrInUse,
                "another agent is already listening",
            ),
        ));
    }

    tracing::warn!("Removing stale socket {}", socket.display());
    match std::fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_err(socket, e)),
    }
}

fn set_socket_permissions(path: &Path) -> Result<(), AkerError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
