use research_assistant::{config::AppConfig, context::OrchestratorContext};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::task::JoinSet;
use tracing::info;
use tracing_subscriber::EnvFilter;

const TYPING_DELAY: Duration = Duration::from_millis(12);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs on stderr, conversation on stdout
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let typing = !std::env::args().any(|arg| arg == "--no-typing");

    let config = AppConfig::from_env()?;
    let context = Arc::new(OrchestratorContext::from_config(&config)?);

    info!("Research assistant ready");

    chat(
        context,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        typing,
    )
    .await
}

/// Read queries line by line until `exit` or end of input. Queries run in
/// the background while the next one is typed; answers are printed in
/// completion order, and the ones still running at end of input are
/// awaited.
async fn chat<R, W>(
    context: Arc<OrchestratorContext>,
    input: R,
    mut out: W,
    typing: bool,
) -> Result<(), Box<dyn std::error::Error>>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut pending: JoinSet<String> = JoinSet::new();
    let mut reading = true;

    out.write_all(b"Ask me anything (exit to quit).\n\nUser: ").await?;
    out.flush().await?;

    loop {
        tokio::select! {
            line = lines.next_line(), if reading => {
                let Some(line) = line? else {
                    reading = false;
                    continue;
                };
                let query = line.trim().to_string();
                if query == "exit" || query == "quit" {
                    break;
                }
                if query.is_empty() {
                    out.write_all(b"User: ").await?;
                    out.flush().await?;
                    continue;
                }

                let worker = context.clone();
                pending.spawn(async move { worker.answer(&query).await });
            }
            Some(joined) = pending.join_next() => {
                render(&mut out, &joined?, typing).await?;
                out.write_all(b"User: ").await?;
                out.flush().await?;
            }
            else => break,
        }
    }

    Ok(())
}

/// Print the reply, one character at a time when typing is on.
async fn render<W>(out: &mut W, answer: &str, typing: bool) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let text = format!("Bot: {}\n\n", answer);

    if !typing {
        out.write_all(text.as_bytes()).await?;
        return out.flush().await;
    }

    let mut buf = [0u8; 4];
    for ch in text.chars() {
        out.write_all(ch.encode_utf8(&mut buf).as_bytes()).await?;
        out.flush().await?;
        tokio::time::sleep(TYPING_DELAY).await;
    }
    Ok(())
}
