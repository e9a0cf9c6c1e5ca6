use crate::{CaptureRequest, EngineConfig, Error, Launcher, Result, Viewport};
use log::{debug, warn};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::oneshot;

enum Command {
    Goto(String, Duration, oneshot::Sender<Result<()>>),
    SetViewport(Viewport, oneshot::Sender<Result<()>>),
    Capture(CaptureRequest, oneshot::Sender<Result<Vec<u8>>>),
    Close(oneshot::Sender<Result<()>>),
}

/// An async-friendly browser abstraction backed by a dedicated worker thread.
///
/// The worker thread owns the synchronous [`crate::Engine`] and executes commands
/// sent from async tasks, so callers await replies instead of blocking the
/// runtime. The browser is released when [`Browser::close`] is called or,
/// failing that, when the last handle is dropped: the command channel closes,
/// the worker loop ends and the engine is closed on the worker thread.
#[derive(Clone)]
pub struct Browser {
    cmd_tx: Sender<Command>,
}

/// A handle representing a page in the browser.
#[derive(Clone)]
pub struct Page {
    cmd_tx: Sender<Command>,
}

impl Browser {
    /// Launch a browser through `launcher` on a new worker thread.
    pub async fn launch(launcher: Arc<dyn Launcher>, config: EngineConfig) -> Result<Self> {
        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();
        let (init_tx, init_rx) = oneshot::channel::<Result<()>>();

        thread::Builder::new()
            .name("htmlcap-browser".into())
            .spawn(move || {
                let mut engine = match launcher.launch(&config) {
                    Ok(e) => e,
                    Err(err) => {
                        let _ = init_tx.send(Err(err));
                        return;
                    }
                };

                if init_tx.send(Ok(())).is_err() {
                    // Caller went away while we were launching.
                    let _ = engine.close();
                    return;
                }

                let mut closed = false;
                while let Ok(cmd) = cmd_rx.recv() {
                    match cmd {
                        Command::Goto(url, timeout, resp) => {
                            let _ = resp.send(engine.load_url(&url, timeout));
                        }
                        Command::SetViewport(viewport, resp) => {
                            let _ = resp.send(engine.set_viewport(viewport));
                        }
                        Command::Capture(request, resp) => {
                            let _ = resp.send(engine.capture(&request));
                        }
                        Command::Close(resp) => {
                            closed = true;
                            let _ = resp.send(engine.close());
                            break;
                        }
                    }
                }

                if !closed {
                    debug!("browser handle dropped without close; shutting engine down");
                    if let Err(e) = engine.close() {
                        warn!("Failed to close browser after handle drop: {}", e);
                    }
                }
            })
            .map_err(|e| Error::InitializationError(format!("Failed to spawn browser worker: {}", e)))?;

        init_rx
            .await
            .map_err(|e| Error::InitializationError(format!("Browser worker exited during launch: {}", e)))??;

        Ok(Self { cmd_tx })
    }

    /// Open a page handle backed by the same worker thread.
    pub async fn new_page(&self) -> Result<Page> {
        Ok(Page {
            cmd_tx: self.cmd_tx.clone(),
        })
    }

    /// Shut down the worker and close the browser.
    pub async fn close(self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        let _ = self.cmd_tx.send(Command::Close(tx));
        rx.await
            .map_err(|e| Error::Other(format!("Close canceled: {}", e)))?
    }
}

impl Page {
    /// Navigate and wait for network idle, failing after `timeout`.
    pub async fn goto(&self, url: &str, timeout: Duration) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        let _ = self.cmd_tx.send(Command::Goto(url.to_string(), timeout, tx));
        rx.await
            .map_err(|e| Error::Other(format!("Goto canceled: {}", e)))?
    }

    pub async fn set_viewport(&self, viewport: Viewport) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        let _ = self.cmd_tx.send(Command::SetViewport(viewport, tx));
        rx.await
            .map_err(|e| Error::Other(format!("SetViewport canceled: {}", e)))?
    }

    /// Take a screenshot and return the encoded bytes.
    pub async fn capture(&self, request: CaptureRequest) -> Result<Vec<u8>> {
        let (tx, rx) = oneshot::channel();
        let _ = self.cmd_tx.send(Command::Capture(request, tx));
        rx.await
            .map_err(|e| Error::Other(format!("Capture canceled: {}", e)))?
    }
}
