use std::env;
use std::sync::OnceLock;

/// A wrapper around the Rayon thread pool used to decode batches.
///
/// If the pool could not be created, operations run directly on the calling
/// thread.
pub struct ThreadPool {
    /// The wrapped thread pool, or None if we failed to construct one.
    pool: Option<rayon::ThreadPool>,
}

impl ThreadPool {
    /// Run a function in the thread pool.
    ///
    /// This corresponds to [`rayon::ThreadPool::install`], except when no
    /// pool is available, where it just runs `op` directly.
    pub fn run<R: Send, Op: FnOnce() -> R + Send>(&self, op: Op) -> R {
        if let Some(pool) = self.pool.as_ref() {
            pool.install(op)
        } else {
            op()
        }
    }

    /// Create a thread pool with a given number of threads.
    pub fn with_num_threads(num_threads: usize) -> ThreadPool {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|index| format!("hwr-decode-{}", index))
            .build();

        if let Err(err) = &pool {
            log::warn!("Failed to create decoder thread pool: {}", err);
        }

        ThreadPool { pool: pool.ok() }
    }

    /// Return the number of threads in the pool.
    pub fn num_threads(&self) -> usize {
        self.pool
            .as_ref()
            .map(|pool| pool.current_num_threads())
            .unwrap_or(1)
    }
}

/// Parse a thread count from the value of `HWR_NUM_THREADS`, clamping it to
/// the range `1..=max_threads`.
fn parse_thread_count(value: &str, max_threads: usize) -> Option<usize> {
    value
        .trim()
        .parse::<usize>()
        .ok()
        .map(|n| n.clamp(1, max_threads.max(1)))
}

/// Return the [Rayon][rayon] thread pool which is used to decode batches.
///
/// Decoding is CPU-bound, so the pool is sized to the number of physical
/// rather than logical cores.
///
/// The thread count can be overridden at the process level by setting the
/// `HWR_NUM_THREADS` environment variable, whose value must be a number
/// between 1 and the logical core count.
///
/// [rayon]: https://github.com/rayon-rs/rayon
pub fn thread_pool() -> &'static ThreadPool {
    static THREAD_POOL: OnceLock<ThreadPool> = OnceLock::new();
    THREAD_POOL.get_or_init(|| {
        let physical_cpus = num_cpus::get_physical().max(1);

        let num_threads = match env::var_os("HWR_NUM_THREADS") {
            Some(threads_var) => {
                let threads_var = threads_var.to_string_lossy();
                parse_thread_count(&threads_var, num_cpus::get()).unwrap_or_else(|| {
                    log::warn!("Invalid HWR_NUM_THREADS value {:?}", threads_var);
                    physical_cpus
                })
            }
            None => physical_cpus,
        };

        ThreadPool::with_num_threads(num_threads)
    })
}
