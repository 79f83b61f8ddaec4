//! TCP accept loop: one task per connection, each driving its own
//! `ConnectionHandler` over line-delimited JSON (spec.md §6).

use crate::auth::AuthMatcher;
use crate::pipeline::Pipeline;
use crate::server::connection::ConnectionHandler;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

pub async fn serve(
    bind_addr: &str,
    pipeline: Arc<Pipeline>,
    matcher: Arc<AuthMatcher>,
    window_size: usize,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    log::info!("listening on {bind_addr}");

    loop {
        let (stream, peer) = listener.accept().await?;
        log::debug!("accepted connection from {peer}");
        let pipeline = Arc::clone(&pipeline);
        let matcher = Arc::clone(&matcher);
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, pipeline, matcher, window_size).await {
                log::debug!("connection from {peer} closed: {err}");
            }
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    pipeline: Arc<Pipeline>,
    matcher: Arc<AuthMatcher>,
    window_size: usize,
) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let mut handler = ConnectionHandler::new(pipeline, matcher, window_size);

    write_line(&mut writer, &handler.welcome()).await?;

    while let Some(line) = lines.next_line().await? {
        if let Some(response) = handler.handle_line(&line) {
            write_line(&mut writer, &response).await?;
        }
    }
    Ok(())
}

async fn write_line(writer: &mut (impl AsyncWriteExt + Unpin), value: &serde_json::Value) -> std::io::Result<()> {
    let mut text = serde_json::to_string(value)?;
    text.push('\n');
    writer.write_all(text.as_bytes()).await
}
