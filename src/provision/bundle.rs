use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::Finalize;
use crate::error::ProvisionError;

/// Name the shell launcher ships under inside the archive, before the
/// rename finalizer gives it the application's identity.
pub const LAUNCHER_NAME: &str = "shell";

/// Platform layout of a deployed runtime bundle: where its archive comes
/// from, where it unpacks, and which file inside it is the launcher.
#[derive(Debug, Clone)]
pub struct RuntimeBundle {
    app_name: String,
    version: String,
}

impl RuntimeBundle {
    pub fn new(app_name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            version: version.into(),
        }
    }

    /// Archive file name for the current platform,
    /// e.g. `shell-v3.0.2-linux-x64.zip`.
    pub fn archive_name(&self) -> String {
        format!(
            "{}-v{}-{}-{}.zip",
            LAUNCHER_NAME,
            self.version,
            bundle_os(),
            bundle_arch()
        )
    }

    pub fn download_url(&self, base: &str) -> String {
        format!(
            "{}/v{}/{}",
            base.trim_end_matches('/'),
            self.version,
            self.archive_name()
        )
    }

    /// Directory the bundle unpacks into, under the provisioning base.
    pub fn root_dir(&self, base: &Path) -> PathBuf {
        base.join(LAUNCHER_NAME)
    }

    /// Path of the launcher executable after finalization.
    pub fn executable_path(&self, base: &Path) -> PathBuf {
        let root = self.root_dir(base);
        if cfg!(target_os = "macos") {
            root.join(format!("{}.app", self.app_name))
                .join("Contents")
                .join("MacOS")
                .join(&self.app_name)
        } else if cfg!(target_os = "windows") {
            root.join(format!("{}.exe", self.app_name))
        } else {
            root.join(&self.app_name)
        }
    }

    /// Finalizer that renames the freshly extracted launcher to the
    /// application's name. Content patching (icons, bundle metadata) is a
    /// separate finalizer supplied by the embedding application.
    pub fn rename_finalizer(&self) -> impl Finalize {
        let app_name = self.app_name.clone();
        move |root: &Path| -> Result<(), ProvisionError> {
            for (src, dst) in rename_plan(root, &app_name) {
                if src == dst {
                    continue;
                }
                debug!(from = %src.display(), to = %dst.display(), "Renaming launcher file");
                fs::rename(&src, &dst)?;
            }
            Ok(())
        }
    }
}

fn rename_plan(root: &Path, app_name: &str) -> Vec<(PathBuf, PathBuf)> {
    if cfg!(target_os = "macos") {
        let app_dir = root.join(format!("{app_name}.app"));
        let macos_dir = app_dir.join("Contents").join("MacOS");
        vec![
            (root.join(format!("{LAUNCHER_NAME}.app")), app_dir.clone()),
            (macos_dir.join(LAUNCHER_NAME), macos_dir.join(app_name)),
        ]
    } else if cfg!(target_os = "windows") {
        vec![(
            root.join(format!("{LAUNCHER_NAME}.exe")),
            root.join(format!("{app_name}.exe")),
        )]
    } else {
        vec![(root.join(LAUNCHER_NAME), root.join(app_name))]
    }
}

fn bundle_os() -> &'static str {
    if cfg!(target_os = "windows") {
        "win32"
    } else if cfg!(target_os = "macos") {
        "darwin"
    } else {
        "linux"
    }
}

fn bundle_arch() -> &'static str {
    if cfg!(target_arch = "x86_64") {
        "x64"
    } else if cfg!(target_arch = "aarch64") {
        "arm64"
    } else {
        "ia32"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn archive_name_carries_version_and_platform() {
        let bundle = RuntimeBundle::new("demo", "3.0.2");
        let name = bundle.archive_name();
        assert!(name.starts_with("shell-v3.0.2-"));
        assert!(name.ends_with(".zip"));
    }

    #[test]
    fn download_url_joins_base_and_version() {
        let bundle = RuntimeBundle::new("demo", "3.0.2");
        let url = bundle.download_url("https://example.com/releases/");
        assert_eq!(
            url,
            format!("https://example.com/releases/v3.0.2/{}", bundle.archive_name())
        );
    }

    #[test]
    fn executable_path_is_named_after_the_app() {
        let bundle = RuntimeBundle::new("demo", "3.0.2");
        let path = bundle.executable_path(Path::new("/base"));
        assert!(path.starts_with("/base/shell"));
        assert!(path.to_string_lossy().contains("demo"));
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    #[test]
    fn rename_finalizer_renames_the_launcher() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(LAUNCHER_NAME), "#!/bin/sh").unwrap();

        let bundle = RuntimeBundle::new("demo", "3.0.2");
        bundle.rename_finalizer().finalize(dir.path()).unwrap();

        assert!(dir.path().join("demo").exists());
        assert!(!dir.path().join(LAUNCHER_NAME).exists());
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    #[test]
    fn rename_finalizer_fails_without_a_launcher() {
        let dir = tempdir().unwrap();
        let bundle = RuntimeBundle::new("demo", "3.0.2");
        assert!(bundle.rename_finalizer().finalize(dir.path()).is_err());
    }
}
