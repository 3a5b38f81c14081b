//! Line-oriented command prompt.

use anyhow::Result;
use dapper_command::{CommandError, DispatcherHandle, Outcome};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

const PROMPT: &str = "(dapper) ";

/// Why the prompt loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplExit {
    /// `quit` was entered.
    Quit,
    /// Input reached end of file.
    EndOfInput,
    /// The dispatcher stopped underneath the prompt.
    DispatcherClosed,
}

/// Read lines from `input`, submit each to `dispatcher` and print the
/// outcome to `output`. Command failures are printed and the loop goes on.
pub async fn run<R, W>(input: R, output: &mut W, dispatcher: &DispatcherHandle) -> Result<ReplExit>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    loop {
        output.write_all(PROMPT.as_bytes()).await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            output.write_all(b"\n").await?;
            return Ok(ReplExit::EndOfInput);
        };

        match dispatcher.submit(line).await {
            Ok(Outcome::Message(text)) => {
                output.write_all(text.as_bytes()).await?;
                output.write_all(b"\n").await?;
            }
            Ok(Outcome::Silent) => {}
            Ok(Outcome::Exit) => return Ok(ReplExit::Quit),
            Err(CommandError::DispatcherClosed) => return Ok(ReplExit::DispatcherClosed),
            Err(e) => {
                output.write_all(format!("error: {e}\n").as_bytes()).await?;
            }
        }
    }
}
