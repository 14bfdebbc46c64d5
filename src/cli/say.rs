//! TUI-less "say" command

use std::error::Error;
use std::io::{self, Write};

use crate::core::controller::{ChatController, ChatObserver};
use crate::core::stream_client::{ClientConfig, StreamClient, StreamError};

/// Prints fragments as they arrive.
pub struct PrintObserver<W: Write> {
    out: W,
    wrote_any: bool,
}

impl<W: Write> PrintObserver<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            wrote_any: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ChatObserver for PrintObserver<W> {
    fn fragment_received(&mut self, text: &str) {
        self.wrote_any = true;
        let _ = self.out.write_all(text.as_bytes());
        let _ = self.out.flush();
    }

    fn message_completed(&mut self) {
        let _ = writeln!(self.out);
        let _ = self.out.flush();
    }

    fn error_occurred(&mut self, _error: &StreamError) {
        if self.wrote_any {
            let _ = writeln!(self.out);
            let _ = self.out.flush();
        }
    }
}

/// Sends one prompt and streams the answer to `out`.
pub async fn say_to<W: Write>(
    config: ClientConfig,
    prompt: &str,
    out: W,
) -> Result<W, Box<dyn Error>> {
    let client = StreamClient::new(config)?;
    let mut controller = ChatController::with_observer(client, PrintObserver::new(out));
    controller.submit(prompt)?;
    controller.finish_active_session().await;

    if let Some(err) = controller.last_error() {
        return Err(err.clone().into());
    }
    Ok(controller.into_observer().into_inner())
}

pub async fn run_say(config: ClientConfig, prompt: Vec<String>) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    say_to(config, &prompt, io::stdout()).await?;
    Ok(())
}
