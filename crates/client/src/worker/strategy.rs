//! Answering strategies: network-first (with or without the offline
//! document) and stale-while-revalidate.

use kiosk_core::{CacheDb, Error};

use super::{CacheWorker, Network, Request, Response, ResponseSource};

/// Write a copy of a network response into a partition.
///
/// Every completed GET response is stored, whatever its status, so a page
/// the server has withdrawn replaces the copy it used to serve. Failures are
/// logged and swallowed: a broken cache write never fails the request.
async fn store_best_effort(db: &CacheDb, partition: &str, request: &Request, response: &Response) {
    if !request.is_get() {
        return;
    }
    if let Err(e) = db.put_entry(partition, &response.to_stored(request)).await {
        tracing::warn!(url = %request.url, partition, error = %e, "cache write failed");
    }
}

impl<N: Network> CacheWorker<N> {
    /// Runtime partition entry for the request, if any.
    ///
    /// Read failures are reported as a miss.
    pub async fn lookup(&self, request: &Request) -> Option<Response> {
        if !request.is_get() {
            return None;
        }
        match self.db.get_entry(&self.partitions.runtime, &request.cache_key()).await {
            Ok(entry) => entry.map(|stored| Response::from_stored(stored, ResponseSource::RuntimeCache)),
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "cache read failed");
                None
            }
        }
    }

    async fn offline_document(&self) -> Option<Response> {
        match self
            .db
            .match_entry(&self.partitions.shell, "GET", self.offline_fallback.as_str())
            .await
        {
            Ok(entry) => entry.map(|stored| Response::from_stored(stored, ResponseSource::ShellCache)),
            Err(e) => {
                tracing::warn!(error = %e, "offline document lookup failed");
                None
            }
        }
    }

    pub(super) async fn network_first(&self, request: &Request, with_fallback: bool) -> Result<Response, Error> {
        let err = match self.network.fetch(request).await {
            Ok(response) => {
                store_best_effort(&self.db, &self.partitions.runtime, request, &response).await;
                return Ok(response);
            }
            Err(err) => err,
        };

        tracing::debug!(url = %request.url, error = %err, "network failed, falling back to cache");

        if let Some(cached) = self.lookup(request).await {
            return Ok(cached);
        }
        if with_fallback && let Some(document) = self.offline_document().await {
            return Ok(document);
        }

        Err(Error::Offline(format!("{}: {err}", request.url)))
    }

    pub(super) async fn stale_while_revalidate(&self, request: &Request) -> Result<Response, Error> {
        if let Some(cached) = self.lookup(request).await {
            tracing::debug!(url = %request.url, "cache hit, revalidating");
            self.spawn_revalidation(request.clone()).await;
            return Ok(cached);
        }

        let first = match self.network.fetch(request).await {
            Ok(response) => {
                store_best_effort(&self.db, &self.partitions.runtime, request, &response).await;
                return Ok(response);
            }
            Err(err) => err,
        };

        tracing::debug!(url = %request.url, error = %first, "cache miss and network failed, retrying once");

        match self.network.fetch(request).await {
            Ok(response) => {
                store_best_effort(&self.db, &self.partitions.runtime, request, &response).await;
                Ok(response)
            }
            Err(second) => Err(Error::Offline(format!("{}: {first}; retry: {second}", request.url))),
        }
    }

    async fn spawn_revalidation(&self, request: Request) {
        let network = std::sync::Arc::clone(&self.network);
        let db = self.db.clone();
        let partition = self.partitions.runtime.clone();

        let mut pending = self.revalidations.lock().await;
        while pending.try_join_next().is_some() {}
        pending.spawn(async move {
            match network.fetch(&request).await {
                Ok(response) => store_best_effort(&db, &partition, &request, &response).await,
                Err(e) => tracing::debug!(url = %request.url, error = %e, "revalidation failed"),
            }
        });
    }
}
