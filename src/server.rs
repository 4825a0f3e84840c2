//! Line-oriented JSON transport for the hook calls.
//!
//! Every request is one JSON object on its own line, tagged by `method`:
//!
//! ```text
//! {"method":"info"}
//! {"method":"preCloudInitIso","vmi":"{...}","cloudInitData":"{...}"}
//! {"method":"onDefineDomain","vmi":"{...}","domainXml":"<domain>...</domain>"}
//! ```
//!
//! The VMI and the cloud-init source travel as JSON text so they are handed
//! back byte for byte when the hook leaves them alone. Every request gets
//! exactly one response line.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

use crate::hooks::{Hooks, InfoResult};

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "method", rename_all = "camelCase")]
pub enum Request {
    Info,
    #[serde(rename_all = "camelCase")]
    PreCloudInitIso { vmi: String, cloud_init_data: String },
    #[serde(rename_all = "camelCase")]
    OnDefineDomain {
        #[serde(default)]
        vmi: String,
        domain_xml: String,
    },
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PreCloudInitIsoResult {
    pub cloud_init_data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OnDefineDomainResult {
    pub domain_xml: String,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ErrorResult {
    pub error: String,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Response {
    Info(InfoResult),
    PreCloudInitIso(PreCloudInitIsoResult),
    OnDefineDomain(OnDefineDomainResult),
    Error(ErrorResult),
}

/// Decodes one request line and runs the matching hook call. Failures of
/// `preCloudInitIso` hand the original cloud-init data back with the error.
pub fn handle_request(hooks: &Hooks, line: &str) -> Response {
    let request: Request = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            error!("Rejecting undecodable request: {}", e);
            return Response::Error(ErrorResult {
                error: format!("failed to unmarshal request: {}", e),
            });
        }
    };

    match request {
        Request::Info => Response::Info(hooks.info()),
        Request::PreCloudInitIso {
            vmi,
            cloud_init_data,
        } => match hooks.pre_cloud_init_iso(vmi.as_bytes(), cloud_init_data.as_bytes()) {
            Ok(output) => Response::PreCloudInitIso(PreCloudInitIsoResult {
                cloud_init_data: String::from_utf8_lossy(&output).into_owned(),
                error: None,
            }),
            Err(e) => {
                if e.is_no_sriov_interfaces() {
                    info!("{}: keeping cloud-init data", e);
                } else if e.is_malformed_input() {
                    error!("Rejecting request: {}", e);
                }
                Response::PreCloudInitIso(PreCloudInitIsoResult {
                    cloud_init_data,
                    error: Some(e.to_string()),
                })
            }
        },
        Request::OnDefineDomain { domain_xml, .. } => {
            let output = hooks.on_define_domain(domain_xml.as_bytes());
            Response::OnDefineDomain(OnDefineDomainResult {
                domain_xml: String::from_utf8_lossy(&output).into_owned(),
            })
        }
    }
}

/// Owns the hook socket; the socket file is removed again when dropped.
pub struct Server {
    path: PathBuf,
    listener: UnixListener,
    hooks: Arc<Hooks>,
}

impl Server {
    pub fn bind<P: AsRef<Path>>(path: P, hooks: Hooks) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            warn!("Removing stale socket {:?}", path);
            std::fs::remove_file(&path)
                .with_context(|| format!("unable to remove stale socket {:?}", path))?;
        }
        let listener = UnixListener::bind(&path).with_context(|| {
            format!(
                "failed to initialize socket on path {:?}, check whether the directory exists",
                path
            )
        })?;
        info!("Listening on {:?}", path);
        Ok(Self {
            path,
            listener,
            hooks: Arc::new(hooks),
        })
    }

    /// Accepts connections until `shutdown` completes.
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutting down hook server");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    let (stream, _) = accepted.context("unable to accept connection")?;
                    let hooks = self.hooks.clone();
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(stream, hooks).await {
                            warn!("Connection closed with error: {:#}", e);
                        }
                    });
                }
            }
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!("Unable to remove socket {:?}: {}", self.path, e);
        }
    }
}

async fn serve_connection(stream: UnixStream, hooks: Arc<Hooks>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let hooks = hooks.clone();
        // Host queries block, keep them off the reactor.
        let response = tokio::task::spawn_blocking(move || handle_request(&hooks, &line))
            .await
            .context("hook call panicked")?;
        let mut out = serde_json::to_vec(&response)?;
        out.push(b'\n');
        writer.write_all(&out).await?;
    }

    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Unable to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate => {}
    }
}
