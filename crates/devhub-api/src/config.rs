use std::{env, net::SocketAddr, path::PathBuf};

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use devhub_store::DEFAULT_BUCKET;
use rand::RngCore;
use tracing::warn;

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_DB_URL: &str = "sqlite://./.devhub/devhub.db";
const DEFAULT_BLOB_ROOT: &str = "./.devhub/blobs";
const DEFAULT_MAX_UPLOAD_MIB: usize = 10;
const SIGNING_KEY_BYTES: usize = 32;

/// Runtime configuration, read from `DEVHUB_*` environment variables.
#[derive(Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub db_url: String,
    pub bucket: String,
    pub blob_root: PathBuf,
    pub public_url: String,
    pub signing_key: Vec<u8>,
    pub max_upload_bytes: usize,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("listen_addr", &self.listen_addr)
            .field("db_url", &self.db_url)
            .field("bucket", &self.bucket)
            .field("blob_root", &self.blob_root)
            .field("public_url", &self.public_url)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let listen_addr: SocketAddr = var("DEVHUB_API_ADDR")
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string())
            .parse()
            .context("invalid DEVHUB_API_ADDR")?;

        let db_url = var("DEVHUB_DB_URL")
            .or_else(|| var("DATABASE_URL"))
            .unwrap_or_else(|| DEFAULT_DB_URL.to_string());

        let bucket = var("DEVHUB_STORAGE_BUCKET").unwrap_or_else(|| DEFAULT_BUCKET.to_string());

        let blob_root = var("DEVHUB_BLOB_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BLOB_ROOT));

        let public_url = var("DEVHUB_PUBLIC_URL")
            .unwrap_or_else(|| format!("http://{listen_addr}"))
            .trim_end_matches('/')
            .to_string();

        let signing_key = match var("DEVHUB_SIGNING_KEY") {
            Some(encoded) => {
                let key = STANDARD
                    .decode(&encoded)
                    .context("invalid base64 in DEVHUB_SIGNING_KEY")?;
                if key.is_empty() {
                    bail!("DEVHUB_SIGNING_KEY decodes to an empty key");
                }
                key
            }
            None => {
                warn!("DEVHUB_SIGNING_KEY not set; signed URLs will not survive a restart");
                random_key()
            }
        };

        let max_upload_mib = match var("DEVHUB_MAX_UPLOAD_MIB") {
            Some(raw) => raw
                .parse::<usize>()
                .with_context(|| format!("invalid DEVHUB_MAX_UPLOAD_MIB '{raw}'"))?,
            None => DEFAULT_MAX_UPLOAD_MIB,
        };
        if max_upload_mib == 0 {
            bail!("DEVHUB_MAX_UPLOAD_MIB must be greater than zero");
        }

        Ok(Self {
            listen_addr,
            db_url,
            bucket,
            blob_root,
            public_url,
            signing_key,
            max_upload_bytes: max_upload_mib * 1024 * 1024,
        })
    }
}

fn random_key() -> Vec<u8> {
    let mut key = vec![0u8; SIGNING_KEY_BYTES];
    rand::thread_rng().fill_bytes(&mut key);
    key
}
