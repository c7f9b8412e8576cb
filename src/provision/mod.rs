//! Idempotent deployment of a versioned runtime bundle onto disk.
//!
//! [`provision`] is safe to call on every startup: a deployed tree whose
//! recorded version and fingerprint still match is left untouched, without
//! any network access. Anything else is wiped and redeployed from the first
//! archive source that yields bytes.

mod bundle;
mod fingerprint;
mod retriever;
mod status;

pub use bundle::{RuntimeBundle, LAUNCHER_NAME};
pub use fingerprint::fingerprint_tree;
pub use retriever::{FallbackRetriever, FileRetriever, Retrieve, UrlRetriever};
pub use status::{DeployStatus, STATUS_FILE};

use std::fs;
use std::io::{self, Cursor};
use std::path::Path;

use tracing::{debug, info};
use zip::ZipArchive;

use crate::error::ProvisionError;

/// Post-extraction step run against the deployed tree before its
/// fingerprint is recorded: renames, content patching, whatever the target
/// platform needs. Failing the finalizer fails provisioning.
pub trait Finalize: Send + Sync {
    fn finalize(&self, root: &Path) -> Result<(), ProvisionError>;
}

impl<F> Finalize for F
where
    F: Fn(&Path) -> Result<(), ProvisionError> + Send + Sync,
{
    fn finalize(&self, root: &Path) -> Result<(), ProvisionError> {
        self(root)
    }
}

/// Deploy `version` of a runtime bundle into `target`.
///
/// When the recorded status matches `version` and the tree's fingerprint
/// still checks out, this returns without touching anything. Otherwise the
/// target is wiped, the archive is fetched through `retriever`, extracted,
/// finalized, and the new status is persisted.
///
/// The fingerprint is computed after finalization, so the cache key covers
/// the exact deployed bytes: a changed finalizer invalidates an old
/// deployment even when the archive itself did not change.
pub async fn provision(
    app_name: &str,
    version: &str,
    target: &Path,
    retriever: &dyn Retrieve,
    finalizer: Option<&dyn Finalize>,
) -> Result<(), ProvisionError> {
    let status = DeployStatus::load(target);
    if status.version == version {
        if let Ok(current) = fingerprint_tree(target, app_name) {
            if current == status.fingerprint {
                debug!(version, path = %target.display(), "Runtime bundle is current");
                return Ok(());
            }
        }
    }

    info!(version, path = %target.display(), "Provisioning runtime bundle");
    match fs::remove_dir_all(target) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    fs::create_dir_all(target)?;

    let data = retriever.retrieve().await?;
    extract_zip(&data, target)?;

    if let Some(finalizer) = finalizer {
        finalizer.finalize(target)?;
    }

    let fingerprint = fingerprint_tree(target, app_name)?;
    DeployStatus {
        version: version.to_string(),
        fingerprint,
    }
    .save(target)
}

/// Unpack a zip archive under `target`, preserving relative paths and, on
/// unix, permission bits. Entries that would escape the target are
/// rejected.
fn extract_zip(data: &[u8], target: &Path) -> Result<(), ProvisionError> {
    let mut archive = ZipArchive::new(Cursor::new(data))?;
    debug!(entries = archive.len(), path = %target.display(), "Extracting runtime archive");

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let Some(rel) = file.enclosed_name().map(Path::to_path_buf) else {
            return Err(ProvisionError::UnsafeArchivePath {
                name: file.name().to_string(),
            });
        };
        let dst = target.join(rel);

        if file.is_dir() {
            fs::create_dir_all(&dst)?;
            continue;
        }
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = fs::File::create(&dst)?;
        io::copy(&mut file, &mut out)?;

        #[cfg(unix)]
        if let Some(mode) = file.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&dst, fs::Permissions::from_mode(mode))?;
        }
    }
    Ok(())
}
