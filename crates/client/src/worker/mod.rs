//! Offline cache worker: request routing and versioned cache partitions.
//!
//! ### Lifecycle
//! - `install`: fetch the bootstrap set and write it into the shell
//!   partition in one transaction (`Parsed → Installing → Installed`).
//!   Any failure makes this worker redundant and leaves every partition of
//!   the previous version untouched. A redundant worker whose shell partition
//!   already holds the whole bootstrap set (a restart while offline) can be
//!   resumed with `resume_from_shell`.
//! - `activate`: delete every partition not named for the current version,
//!   then start intercepting (`Installed → Activating → Active`).
//!
//! ### Fetch handling
//! - Classification is synchronous (see [`route::Router`]); unmatched
//!   requests pass through.
//! - Navigation: network first, then runtime cache, then the offline document.
//! - Content API: network first, then runtime cache.
//! - Images and static assets: stale-while-revalidate.
//! - Cache writes are best effort; cache read failures count as misses.

pub mod request;
pub mod route;
mod strategy;

#[cfg(test)]
pub(crate) mod fake;

use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use kiosk_core::{AppConfig, CacheDb, CachePartitions, Error};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;
use url::Url;

pub use request::{Destination, Request, RequestMode, Response, ResponseSource};
pub use route::{Route, Router, Rule, Strategy};

use crate::fetch::url::resolve;

/// Transport used by the worker to reach the network.
#[async_trait::async_trait]
pub trait Network: Send + Sync + 'static {
    /// Perform the request. Any HTTP status is a successful fetch; only
    /// transport failures are errors.
    async fn fetch(&self, request: &Request) -> Result<Response, Error>;

    /// Send a request the worker does not handle, with its body if any.
    async fn forward(&self, request: &Request, _body: Option<Bytes>) -> Result<Response, Error> {
        self.fetch(request).await
    }
}

/// Worker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Active,
    /// Installation failed; the worker never serves.
    Redundant,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parsed => "parsed",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Activating => "activating",
            Self::Active => "active",
            Self::Redundant => "redundant",
        }
    }
}

/// Result of offering a request to the worker.
#[derive(Debug)]
pub enum FetchOutcome {
    /// No rule matched (or the worker is not active): default handling applies.
    Passthrough,
    /// The worker answered the request.
    Handled(Result<Response, Error>),
}

/// Entry counts of the current partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionSizes {
    pub shell: u64,
    pub runtime: u64,
}

/// The request router / cache manager.
pub struct CacheWorker<N: Network> {
    db: CacheDb,
    network: Arc<N>,
    partitions: CachePartitions,
    bootstrap: Vec<Url>,
    offline_fallback: Url,
    router: Router,
    state: RwLock<WorkerState>,
    revalidations: Mutex<JoinSet<()>>,
}

impl<N: Network> CacheWorker<N> {
    /// Create a worker for the configured version, bootstrap set and origin.
    pub fn new(config: &AppConfig, db: CacheDb, network: Arc<N>) -> Result<Self, Error> {
        let origin = Url::parse(&config.origin).map_err(|e| Error::InvalidUrl(format!("{}: {e}", config.origin)))?;
        let bootstrap = config
            .bootstrap_urls
            .iter()
            .map(|path| resolve(&origin, path).map_err(|e| Error::InvalidUrl(format!("{path}: {e}"))))
            .collect::<Result<Vec<_>, _>>()?;
        let offline_fallback = resolve(&origin, &config.offline_fallback)
            .map_err(|e| Error::InvalidUrl(format!("{}: {e}", config.offline_fallback)))?;

        Ok(Self {
            db,
            network,
            partitions: CachePartitions::for_version(&config.cache_version),
            bootstrap,
            offline_fallback,
            router: Router::from_host_pattern(&config.content_host_pattern)?,
            state: RwLock::new(WorkerState::Parsed),
            revalidations: Mutex::new(JoinSet::new()),
        })
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    pub fn partitions(&self) -> &CachePartitions {
        &self.partitions
    }

    pub fn network(&self) -> &Arc<N> {
        &self.network
    }

    /// Populate the shell partition with the bootstrap set.
    ///
    /// Re-running install with an unchanged bootstrap set and version leaves
    /// the shell partition with the same membership.
    pub async fn install(&self) -> Result<(), Error> {
        {
            let mut state = self.state.write().await;
            if matches!(*state, WorkerState::Installing | WorkerState::Activating | WorkerState::Active) {
                return Err(Error::InvalidState(format!("cannot install while {}", state.as_str())));
            }
            *state = WorkerState::Installing;
        }

        tracing::info!(partition = %self.partitions.shell, entries = self.bootstrap.len(), "installing shell");

        match self.populate_shell().await {
            Ok(count) => {
                *self.state.write().await = WorkerState::Installed;
                tracing::info!(partition = %self.partitions.shell, count, "shell installed");
                Ok(())
            }
            Err(err) => {
                *self.state.write().await = WorkerState::Redundant;
                tracing::error!(partition = %self.partitions.shell, error = %err, "install failed");
                Err(match err {
                    Error::InstallFailed(_) => err,
                    other => Error::InstallFailed(other.to_string()),
                })
            }
        }
    }

    async fn populate_shell(&self) -> Result<usize, Error> {
        let mut entries = Vec::with_capacity(self.bootstrap.len());
        for url in &self.bootstrap {
            let request = Request::get(url.clone());
            let response = self
                .network
                .fetch(&request)
                .await
                .map_err(|e| Error::InstallFailed(format!("{url}: {e}")))?;
            if !response.is_success() {
                return Err(Error::InstallFailed(format!("{url}: status {}", response.status.as_u16())));
            }
            entries.push(response.to_stored(&request));
        }

        let count = entries.len();
        self.db.put_entries(&self.partitions.shell, entries).await?;
        Ok(count)
    }

    /// Adopt a shell partition written by an earlier install of this version.
    ///
    /// Succeeds only when every bootstrap URL is already in the shell
    /// partition; the worker is then `Installed` and can be activated.
    pub async fn resume_from_shell(&self) -> Result<(), Error> {
        let mut state = self.state.write().await;
        if !matches!(*state, WorkerState::Parsed | WorkerState::Redundant) {
            return Err(Error::InvalidState(format!("cannot resume while {}", state.as_str())));
        }

        let present: HashSet<String> = self.db.entry_urls(&self.partitions.shell).await?.into_iter().collect();
        let missing: Vec<&str> = self
            .bootstrap
            .iter()
            .map(Url::as_str)
            .filter(|url| !present.contains(*url))
            .collect();
        if !missing.is_empty() {
            return Err(Error::InstallFailed(format!(
                "{} is missing {}",
                self.partitions.shell,
                missing.join(", ")
            )));
        }

        *state = WorkerState::Installed;
        tracing::warn!(partition = %self.partitions.shell, "resumed from existing shell partition");
        Ok(())
    }

    /// Purge partitions of other versions and start intercepting requests.
    ///
    /// Returns the names of the deleted partitions.
    pub async fn activate(&self) -> Result<Vec<String>, Error> {
        {
            let mut state = self.state.write().await;
            if *state != WorkerState::Installed {
                return Err(Error::InvalidState(format!("cannot activate while {}", state.as_str())));
            }
            *state = WorkerState::Activating;
        }

        match self.purge_stale_partitions().await {
            Ok(deleted) => {
                *self.state.write().await = WorkerState::Active;
                tracing::info!(version = %self.partitions.version, deleted = ?deleted, "worker active, clients claimed");
                Ok(deleted)
            }
            Err(err) => {
                *self.state.write().await = WorkerState::Installed;
                Err(err)
            }
        }
    }

    async fn purge_stale_partitions(&self) -> Result<Vec<String>, Error> {
        let mut deleted = Vec::new();
        for name in self.db.partition_names().await? {
            if !self.partitions.is_current(&name) && self.db.delete_partition(&name).await? {
                tracing::debug!(partition = %name, "deleted stale partition");
                deleted.push(name);
            }
        }
        self.db.open_partition(&self.partitions.runtime).await?;
        Ok(deleted)
    }

    /// Classify a request without touching cache or network.
    pub fn route(&self, request: &Request) -> Option<Route> {
        self.router.classify(request)
    }

    /// Offer an intercepted request to the worker.
    pub async fn handle_fetch(&self, request: &Request) -> FetchOutcome {
        if self.state().await != WorkerState::Active {
            return FetchOutcome::Passthrough;
        }
        match self.route(request) {
            None => FetchOutcome::Passthrough,
            Some(route) => {
                tracing::debug!(url = %request.url, rule = route.rule, "intercepted");
                FetchOutcome::Handled(self.respond(request, route).await)
            }
        }
    }

    /// Answer a request with the strategy of its route.
    pub async fn respond(&self, request: &Request, route: Route) -> Result<Response, Error> {
        match route.strategy {
            Strategy::NetworkFirstWithFallback => self.network_first(request, true).await,
            Strategy::NetworkFirst => self.network_first(request, false).await,
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(request).await,
        }
    }

    /// Wait for every background revalidation started so far.
    pub async fn settle(&self) {
        let mut pending = self.revalidations.lock().await;
        while let Some(result) = pending.join_next().await {
            if let Err(e) = result {
                tracing::warn!(error = %e, "revalidation task failed");
            }
        }
    }

    /// Entry counts of the shell and runtime partitions.
    pub async fn partition_sizes(&self) -> Result<PartitionSizes, Error> {
        Ok(PartitionSizes {
            shell: self.db.entry_count(&self.partitions.shell).await?,
            runtime: self.db.entry_count(&self.partitions.runtime).await?,
        })
    }

    /// URLs currently held by the shell partition.
    pub async fn shell_urls(&self) -> Result<Vec<String>, Error> {
        self.db.entry_urls(&self.partitions.shell).await
    }
}
