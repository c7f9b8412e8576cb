use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::process::Child;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::channel::{self, Disconnect};
use super::launcher;
use crate::config::TetherConfig;
use crate::error::TetherError;
use crate::event::{names, Dispatcher, Event};
use crate::provision::{
    provision, FallbackRetriever, FileRetriever, Finalize, Retrieve, RuntimeBundle, UrlRetriever,
};

/// Supervises one session with the companion shell.
///
/// Construction provisions the runtime bundle; [`start`](Self::start)
/// launches the shell and establishes the event channel; the session ends
/// through [`shutdown`](Self::shutdown) or any of its internal triggers
/// (rendezvous timeout, shell exit, peer disconnect). [`wait`](Self::wait)
/// blocks until the session has fully ended.
///
/// Clones share the same session.
#[derive(Clone)]
pub struct Tether {
    inner: Arc<Inner>,
}

struct Inner {
    config: TetherConfig,
    program: PathBuf,
    dispatcher: Dispatcher,
    conn: Mutex<Option<OwnedWriteHalf>>,
    cancel: CancellationToken,
    done: CancellationToken,
    shutdown_started: AtomicBool,
}

impl Tether {
    /// Provision the runtime bundle and assemble a controller with the
    /// default archive sources from `config`.
    pub async fn new(config: TetherConfig) -> Result<Self, TetherError> {
        Self::builder(config).build().await
    }

    /// Customize archive retrieval or finalization before building.
    pub fn builder(config: TetherConfig) -> TetherBuilder {
        TetherBuilder {
            config,
            retrievers: Vec::new(),
            finalizer: None,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    /// Launch the shell and wait for it to connect back.
    ///
    /// The loopback listener is bound before the shell starts and its
    /// address is appended to the shell's arguments. Whichever comes first
    /// wins: the shell's connection, or the configured timeout. A timeout,
    /// or a shutdown fired while waiting (e.g. because the shell exited),
    /// aborts startup with nothing left running.
    pub async fn start(&self) -> Result<(), TetherError> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let child = launcher::spawn_shell(
            &self.inner.program,
            &self.inner.config.args,
            &addr.to_string(),
            &self.inner.config.app_name,
        )?;
        self.spawn_exit_watch(child);

        debug!(%addr, "Waiting for the shell to connect");
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = tokio::time::sleep(self.inner.config.connect_timeout) => {
                error!("Timed out waiting for the shell to connect");
                self.shutdown().await;
                return Err(TetherError::ConnectTimeout);
            }
            _ = self.inner.done.cancelled() => {
                return Err(TetherError::StartupAborted);
            }
        };
        let (stream, peer) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                error!("Failed to accept the shell connection: {}", e);
                self.shutdown().await;
                return Err(e.into());
            }
        };
        info!(%peer, "Shell connected");
        // Single-peer protocol: nothing else will ever connect.
        drop(listener);

        let (read_half, write_half) = stream.into_split();
        *self.inner.conn.lock().await = Some(write_half);
        self.spawn_read_loop(read_half);
        Ok(())
    }

    /// Write an event to the shell.
    pub async fn send(&self, event: &Event) -> Result<(), TetherError> {
        channel::write_frame(&self.inner.conn, event).await
    }

    /// End the session. Safe to call any number of times, from any task;
    /// the shutdown sequence runs exactly once, and every caller returns
    /// only after it has completed.
    pub async fn shutdown(&self) {
        self.inner.run_shutdown().await;
        self.inner.done.cancelled().await;
    }

    /// Block until the session has fully shut down.
    pub async fn wait(&self) {
        self.inner.done.cancelled().await;
    }

    fn spawn_exit_watch(&self, mut child: Child) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let exited = tokio::select! {
                status = child.wait() => Some(status),
                _ = inner.cancel.cancelled() => None,
            };
            match exited {
                Some(Ok(status)) if status.success() => {
                    debug!("{} exited", inner.config.app_name);
                }
                Some(Ok(status)) => error!("{} exited with {}", inner.config.app_name, status),
                Some(Err(e)) => error!("Failed to await {}: {}", inner.config.app_name, e),
                // Session cancelled while the shell was still up.
                None => {
                    if let Err(e) = child.kill().await {
                        debug!("Failed to kill {}: {}", inner.config.app_name, e);
                    }
                    return;
                }
            }
            inner.run_shutdown().await;
        });
    }

    fn spawn_read_loop(&self, read_half: OwnedReadHalf) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            match channel::read_events(read_half, &inner.dispatcher, &inner.cancel).await {
                Disconnect::Peer => {
                    debug!("Shell disconnected");
                    inner.run_shutdown().await;
                }
                Disconnect::Cancelled => {}
            }
        });
    }
}

impl Inner {
    /// The first trigger runs the sequence; later ones return immediately
    /// and rely on `done` for completion.
    async fn run_shutdown(&self) {
        if self.shutdown_started.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("Shutting down");
        self.dispatcher.dispatch(Event::new(names::APP_SHUTDOWN));
        self.dispatcher.shutdown().await;
        self.cancel.cancel();
        self.conn.lock().await.take();
        self.done.cancel();
        debug!("Shutdown complete");
    }
}

/// Builds a [`Tether`], provisioning the runtime bundle in the process.
pub struct TetherBuilder {
    config: TetherConfig,
    retrievers: Vec<Box<dyn Retrieve>>,
    finalizer: Option<Box<dyn Finalize>>,
}

impl TetherBuilder {
    /// Add an archive source tried ahead of the ones derived from the
    /// configuration.
    pub fn retriever(mut self, retriever: impl Retrieve + 'static) -> Self {
        self.retrievers.push(Box::new(retriever));
        self
    }

    /// Replace the default rename finalizer.
    pub fn finalizer(mut self, finalizer: impl Finalize + 'static) -> Self {
        self.finalizer = Some(Box::new(finalizer));
        self
    }

    pub async fn build(self) -> Result<Tether, TetherError> {
        let config = self.config;
        if config.app_name.is_empty() {
            return Err(TetherError::Config("app_name must not be empty".into()));
        }
        let base = match &config.provision_dir {
            Some(dir) => dir.clone(),
            None => default_provision_dir(&config.app_name)?,
        };
        let bundle = RuntimeBundle::new(&config.app_name, &config.version);

        let mut chain = FallbackRetriever::new();
        for retriever in self.retrievers {
            chain.push_boxed(retriever);
        }
        if let Some(path) = &config.archive_path {
            chain.push(FileRetriever::new(path));
        }
        if let Some(base_url) = &config.download_base {
            chain.push(UrlRetriever::new(bundle.download_url(base_url)));
        }
        if chain.is_empty() {
            return Err(TetherError::Config("no archive source configured".into()));
        }

        let finalizer: Box<dyn Finalize> = match self.finalizer {
            Some(finalizer) => finalizer,
            None => Box::new(bundle.rename_finalizer()),
        };

        let root = bundle.root_dir(&base);
        provision(
            &config.app_name,
            &config.version,
            &root,
            &chain,
            Some(finalizer.as_ref()),
        )
        .await?;

        let program = config
            .program
            .clone()
            .unwrap_or_else(|| bundle.executable_path(&base));

        Ok(Tether {
            inner: Arc::new(Inner {
                config,
                program,
                dispatcher: Dispatcher::new(),
                conn: Mutex::new(None),
                cancel: CancellationToken::new(),
                done: CancellationToken::new(),
                shutdown_started: AtomicBool::new(false),
            }),
        })
    }
}

fn default_provision_dir(app_name: &str) -> Result<PathBuf, TetherError> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            return Ok(dir.join("support"));
        }
    }
    dirs::data_local_dir()
        .map(|dir| dir.join(app_name))
        .ok_or_else(|| TetherError::Config("cannot determine a provisioning directory".into()))
}
