use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Cloneable access to the runtime and its stop signal.
#[derive(Clone)]
pub struct HarvestHandle {
    inner: Handle,
    cancel: CancellationToken,
}

/// Tokio runtime for a harvest run, paired with the cancellation token the
/// walker and enricher consult between pages and detail fetches.
pub struct HarvestRuntime {
    runtime: Runtime,
    cancel: CancellationToken,
}

impl HarvestRuntime {
    /// Build a multi-threaded runtime. `worker_threads` of `None` keeps
    /// Tokio's default of one per core.
    ///
    /// ```
    /// use harvest_runtime::HarvestRuntime;
    /// use std::time::Duration;
    ///
    /// let runtime = HarvestRuntime::build("doctest-runtime", Some(1))
    ///     .expect("runtime builds");
    /// let value = runtime.block_on(async { 2 + 2 });
    /// assert_eq!(value, 4);
    /// runtime.shutdown(Duration::from_millis(10));
    /// ```
    pub fn build(thread_name: &str, worker_threads: Option<usize>) -> Result<Self> {
        let mut builder = Builder::new_multi_thread();
        builder.enable_all().thread_name(thread_name);
        if let Some(workers) = worker_threads {
            builder.worker_threads(workers.max(1));
        }
        Ok(Self {
            runtime: builder.build()?,
            cancel: CancellationToken::new(),
        })
    }

    pub fn handle(&self) -> HarvestHandle {
        HarvestHandle {
            inner: self.runtime.handle().clone(),
            cancel: self.cancel.clone(),
        }
    }

    pub fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.runtime.block_on(fut)
    }

    /// Cancel outstanding work and give tasks `graceful` to finish.
    ///
    /// ```
    /// use harvest_runtime::HarvestRuntime;
    /// use std::time::Duration;
    ///
    /// let runtime = HarvestRuntime::build("shutdown-example", Some(1)).unwrap();
    /// let token = runtime.handle().cancellation();
    /// runtime.shutdown(Duration::from_millis(5));
    /// assert!(token.is_cancelled());
    /// ```
    pub fn shutdown(self, graceful: Duration) {
        self.cancel.cancel();
        self.runtime.shutdown_timeout(graceful);
    }
}

impl HarvestHandle {
    pub fn spawn<F, T>(&self, fut: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.inner.spawn(fut)
    }

    /// The run-wide stop signal. Cancelling any clone cancels them all.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel the run on the first Ctrl-C. Pages and details already
    /// harvested are kept; the walk ends at the next page boundary.
    pub fn cancel_on_ctrl_c(&self) -> JoinHandle<()> {
        let cancel = self.cancel.clone();
        self.inner.spawn(async move {
            tokio::select! {
                res = tokio::signal::ctrl_c() => {
                    match res {
                        Ok(()) => tracing::warn!(target: "harvest.runtime", "interrupt received; stopping after the current page"),
                        Err(e) => tracing::error!(target: "harvest.runtime", error = %e, "ctrl-c listener failed"),
                    }
                    cancel.cancel();
                }
                _ = cancel.cancelled() => {}
            }
        })
    }
}
