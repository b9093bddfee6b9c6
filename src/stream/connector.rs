use std::fmt::Display;
use std::future::Future;

use futures::{Stream, StreamExt};
use tracing::{info, warn};

use crate::app::{Result, WeirError};
use crate::fetcher::http_fetcher::{render_request, render_response};
use crate::fetcher::ReqwestClient;
use crate::stream::session::{Handshake, StreamSession, StreamStats};

/// Connects to the session's URL and captures until the server hangs up,
/// the transport fails, or the process is asked to stop. The final series
/// is flushed on every one of those paths.
pub async fn run_stream(session: &mut StreamSession, client: &ReqwestClient) -> Result<StreamStats> {
    let url = session.config().url.clone();
    let outcome = connect_and_pump(session, client, &url).await;
    let closed = session.close();
    outcome.and(closed)?;
    Ok(session.stats())
}

async fn connect_and_pump(
    session: &mut StreamSession,
    client: &ReqwestClient,
    url: &str,
) -> Result<()> {
    let request = client
        .inner()
        .get(url)
        .headers(client.headers().clone())
        .build()?;
    let request_header = render_request(&request);

    info!(url, "Opening stream");
    let response = match client.inner().execute(request).await {
        Ok(response) => response,
        Err(e) => {
            session.on_error(&e.to_string())?;
            return Err(e.into());
        }
    };

    let status = response.status();
    if !status.is_success() {
        let reason = format!("{} answered {}", url, status);
        session.on_disconnect(&reason)?;
        return Err(WeirError::Stream(reason));
    }

    let handshake = Handshake::new(
        response.url().as_str(),
        request_header,
        render_response(&response),
    );
    session.on_connect(handshake)?;
    pump(session, response.bytes_stream(), shutdown_signal()).await
}

/// Splits `body` into newline-delimited units and hands them to the
/// session until the body ends, fails, or `shutdown` resolves.
pub async fn pump<S, B, E, F>(session: &mut StreamSession, body: S, shutdown: F) -> Result<()>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
    F: Future<Output = ()>,
{
    tokio::pin!(body);
    tokio::pin!(shutdown);
    let mut lines = LineBuffer::default();

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!(stream = %session.config().stream_name, "Stopping stream");
                break;
            }
            chunk = body.next() => match chunk {
                Some(Ok(bytes)) => {
                    for unit in lines.push(bytes.as_ref()) {
                        session.on_data(&unit)?;
                    }
                }
                Some(Err(e)) => {
                    if let Some(unit) = lines.finish() {
                        session.on_data(&unit)?;
                    }
                    let reason = e.to_string();
                    session.on_error(&reason)?;
                    return Err(WeirError::Stream(reason));
                }
                None => {
                    if let Some(unit) = lines.finish() {
                        session.on_data(&unit)?;
                    }
                    session.on_disconnect("server closed the stream")?;
                    return Ok(());
                }
            }
        }
    }

    if let Some(unit) = lines.finish() {
        session.on_data(&unit)?;
    }
    Ok(())
}

/// Resolves on SIGINT or SIGTERM (Ctrl-C elsewhere). Never resolves if the
/// handlers cannot be installed.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {},
                    _ = sigint.recv() => {},
                }
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!("Failed to install signal handlers: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl-C handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

/// Carries partial lines across chunk boundaries.
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.pending.extend_from_slice(chunk);
        let mut units = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            units.push(line);
        }
        units
    }

    fn finish(&mut self) -> Option<Vec<u8>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }
}
