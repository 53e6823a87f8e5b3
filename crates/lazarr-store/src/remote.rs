//! Remote chunked arrays over object stores (feature-gated).
//!
//! A remote array is the same container layout as `dir`, addressed by an
//! object-store URL (`s3://bucket/prefix`, `gs://…`, `azure://…`). The
//! engine treats it exactly like a local operand: the only contract is
//! "read chunk i". Reads go through a blocking wrapper around a private
//! tokio runtime; credentials come from the environment, the way the
//! respective `object_store` builders define it.

use std::sync::Arc;

use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use tokio::runtime::Runtime;
use tracing::debug;
use url::Url;

use lazarr_core::buffer::Chunk;
use lazarr_core::error::{Error, Result};
use lazarr_core::meta::ArrayMeta;

use crate::dir::{chunk_file_name, ContainerMeta, META_FILE};
use crate::format::decode_chunk;
use crate::traits::ChunkStore;

#[cfg(feature = "s3")]
use object_store::aws::AmazonS3Builder;
#[cfg(feature = "azure")]
use object_store::azure::MicrosoftAzureBuilder;
#[cfg(feature = "gcs")]
use object_store::gcp::GoogleCloudStorageBuilder;

pub struct RemoteArray {
    token: String,
    meta: ArrayMeta,
    prefix: ObjectPath,
    client: Arc<dyn ObjectStore>,
    rt: Runtime,
}

impl RemoteArray {
    pub fn open(token: &str) -> Result<Arc<RemoteArray>> {
        let url = Url::parse(token)
            .map_err(|e| Error::Config(format!("malformed remote token '{token}': {e}")))?;
        let (client, prefix) = build_client(&url)?;
        let rt = Runtime::new()
            .map_err(|e| Error::Config(format!("failed to start remote i/o runtime: {e}")))?;

        let raw = fetch(&rt, client.as_ref(), &prefix.child(META_FILE))?;
        let container: ContainerMeta = serde_json::from_slice(&raw)?;
        container.verify()?;
        debug!(token, "opened remote array");
        Ok(Arc::new(RemoteArray {
            token: token.to_string(),
            meta: container.meta,
            prefix,
            client,
            rt,
        }))
    }
}

fn build_client(url: &Url) -> Result<(Arc<dyn ObjectStore>, ObjectPath)> {
    let bucket = url
        .host_str()
        .ok_or_else(|| Error::Config(format!("'{url}' has no bucket/container component")))?;
    let prefix = ObjectPath::from(url.path().trim_matches('/'));
    let client: Arc<dyn ObjectStore> = match url.scheme() {
        "s3" => {
            #[cfg(feature = "s3")]
            {
                Arc::new(
                    AmazonS3Builder::from_env()
                        .with_bucket_name(bucket)
                        .build()
                        .map_err(|e| Error::Config(format!("s3 client: {e}")))?,
                )
            }
            #[cfg(not(feature = "s3"))]
            {
                return Err(Error::Config(
                    "built without the `s3` feature; rebuild with `--features lazarr-store/s3`"
                        .into(),
                ));
            }
        }
        "gs" | "gcs" => {
            #[cfg(feature = "gcs")]
            {
                Arc::new(
                    GoogleCloudStorageBuilder::from_env()
                        .with_bucket_name(bucket)
                        .build()
                        .map_err(|e| Error::Config(format!("gcs client: {e}")))?,
                )
            }
            #[cfg(not(feature = "gcs"))]
            {
                return Err(Error::Config(
                    "built without the `gcs` feature; rebuild with `--features lazarr-store/gcs`"
                        .into(),
                ));
            }
        }
        "azure" | "azblob" => {
            #[cfg(feature = "azure")]
            {
                Arc::new(
                    MicrosoftAzureBuilder::from_env()
                        .with_container_name(bucket)
                        .build()
                        .map_err(|e| Error::Config(format!("azure client: {e}")))?,
                )
            }
            #[cfg(not(feature = "azure"))]
            {
                return Err(Error::Config(
                    "built without the `azure` feature; rebuild with `--features lazarr-store/azure`"
                        .into(),
                ));
            }
        }
        other => return Err(Error::Config(format!("unsupported remote scheme '{other}'"))),
    };
    Ok((client, prefix))
}

fn fetch(rt: &Runtime, client: &dyn ObjectStore, path: &ObjectPath) -> Result<Vec<u8>> {
    let bytes = rt
        .block_on(async {
            let result = client.get(path).await?;
            result.bytes().await
        })
        .map_err(|e| Error::Io(format!("remote get {path}: {e}")))?;
    Ok(bytes.to_vec())
}

impl ChunkStore for RemoteArray {
    fn token(&self) -> &str {
        &self.token
    }

    fn meta(&self) -> &ArrayMeta {
        &self.meta
    }

    fn read_chunk(&self, index: &[usize]) -> Result<Chunk> {
        let path = self.prefix.child(chunk_file_name(index).as_str());
        let bytes = fetch(&self.rt, self.client.as_ref(), &path)?;
        let chunk = decode_chunk(&bytes)?;
        let expected = self.meta.grid()?.chunk_region(index).shape;
        if chunk.shape != expected {
            return Err(Error::Io(format!(
                "remote chunk {index:?} has shape {:?}, expected {:?}",
                chunk.shape, expected
            )));
        }
        Ok(chunk)
    }
}
