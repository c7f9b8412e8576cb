use std::path::PathBuf;
use std::time::Duration;

/// Default ceiling on how long the controller waits for the shell to
/// connect back after launch.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for a [`Tether`](crate::Tether) instance.
///
/// `app_name` is the identity the deployed shell takes on after
/// provisioning and the seed of the tree fingerprint; `version` selects
/// the runtime bundle to deploy.
#[derive(Debug, Clone)]
pub struct TetherConfig {
    /// Name the deployed shell is renamed to and logged under.
    pub app_name: String,
    /// Runtime bundle version to provision.
    pub version: String,
    /// Directory the runtime bundle is deployed under. Defaults to a
    /// `support` directory next to the current executable.
    pub provision_dir: Option<PathBuf>,
    /// Shell executable to launch. Defaults to the deployed bundle's
    /// launcher for the current platform.
    pub program: Option<PathBuf>,
    /// Arguments passed to the shell before the rendezvous address.
    pub args: Vec<String>,
    /// Base URL the runtime bundle archive is downloaded from.
    pub download_base: Option<String>,
    /// Local archive tried before any download.
    pub archive_path: Option<PathBuf>,
    /// How long to wait for the shell to connect back after launch.
    pub connect_timeout: Duration,
}

impl TetherConfig {
    pub fn new(app_name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            version: version.into(),
            provision_dir: None,
            program: None,
            args: Vec::new(),
            download_base: None,
            archive_path: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn provision_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.provision_dir = Some(dir.into());
        self
    }

    pub fn program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = Some(program.into());
        self
    }

    /// Set the arguments passed to the shell ahead of the rendezvous address.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(|s| s.into()).collect();
        self
    }

    pub fn download_base(mut self, base: impl Into<String>) -> Self {
        self.download_base = Some(base.into());
        self
    }

    pub fn archive_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.archive_path = Some(path.into());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}
