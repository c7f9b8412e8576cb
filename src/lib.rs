//! # tether
//!
//! Supervises a companion GUI shell process and exchanges events with it
//! over a private local channel.
//!
//! On startup a [`Tether`]:
//! 1. provisions a versioned runtime bundle onto disk, checksum-verified
//!    and idempotent, so repeated starts with an unchanged deployment cost
//!    one directory scan and no network traffic;
//! 2. binds an ephemeral loopback listener, launches the shell with the
//!    listener's address, and waits (bounded) for the shell to connect
//!    back;
//! 3. pumps newline-delimited JSON events from the connection into a
//!    strictly ordered, panic-isolated [`Dispatcher`], and serializes
//!    outbound events back over the same connection.
//!
//! Shutdown is single-fire no matter how many triggers race for it: an
//! explicit call, the rendezvous timeout, the shell exiting, or the peer
//! disconnecting. [`Tether::wait`] blocks until the sequence has fully run.
//!
//! ```no_run
//! use tether::{Event, FnListener, Tether, TetherConfig};
//!
//! # async fn run() -> Result<(), tether::TetherError> {
//! let config = TetherConfig::new("demo", "3.0.2")
//!     .download_base("https://example.com/shell/releases");
//! let app = Tether::new(config).await?;
//!
//! let listener = FnListener::arc(|e: &Event| println!("{e}"));
//! app.dispatcher()
//!     .add_listener(&listener, false, &[tether::event::names::APP_READY]);
//!
//! app.start().await?;
//! app.wait().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod provision;
pub mod shell;

pub use config::TetherConfig;
pub use error::{ProvisionError, Result, TetherError};
pub use event::{Dispatcher, Event, FnListener, Listener};
pub use shell::{Tether, TetherBuilder};
