//! Local SSH key generation.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::{Error, Result};

/// Creates the machine's SSH identity on disk.
#[async_trait]
pub trait KeyGenerator: Send + Sync {
    /// Write a new private key to `path` (public half at `<path>.pub`) and
    /// return the public key in OpenSSH format.
    async fn generate(&self, path: &Path) -> Result<String>;
}

/// Generates a 2048-bit RSA key with the system `ssh-keygen`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SshKeygen;

#[async_trait]
impl KeyGenerator for SshKeygen {
    /// An existing key at `path` is reused as is.
    async fn generate(&self, path: &Path) -> Result<String> {
        if tokio::fs::try_exists(path).await? {
            debug!(path = %path.display(), "reusing existing ssh key");
        } else {
            run_ssh_keygen(path).await?;
        }

        let mut public_path = path.as_os_str().to_owned();
        public_path.push(".pub");
        let public_key = tokio::fs::read_to_string(&public_path).await?;
        Ok(public_key.trim().to_string())
    }
}

async fn run_ssh_keygen(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }

    debug!(path = %path.display(), "generating ssh key");

    let output = Command::new("ssh-keygen")
        .args(["-t", "rsa", "-b", "2048", "-N", "", "-q", "-f"])
        .arg(path)
        .output()
        .await
        .map_err(|e| Error::KeyGeneration(format!("failed to run ssh-keygen: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::KeyGeneration(format!(
            "ssh-keygen exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }
    Ok(())
}
