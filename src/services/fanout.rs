use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use tracing::debug;

/// Runs `fetch` once per key on at most `workers` scoped threads.
///
/// Workers pull keys from a shared cursor and send results to the calling
/// thread, which is the only place results are collected. The first failure
/// raises a cancel flag: workers stop taking keys, calls already in flight
/// finish, and everything they return is dropped. The returned map is keyed by
/// input key, so completion order never shows through.
///
/// The flag is raised by the failing worker itself, so with a single worker no
/// key after the failing one is ever fetched.
pub fn fetch_all<T, E, F>(
    keys: &[String],
    workers: usize,
    fetch: F,
) -> Result<HashMap<String, T>, (String, E)>
where
    T: Send,
    E: Send,
    F: Fn(&str) -> Result<T, E> + Sync,
{
    if keys.is_empty() {
        return Ok(HashMap::new());
    }
    let workers = workers.clamp(1, keys.len());
    debug!(keys = keys.len(), workers, "fan-out start");

    let cursor = AtomicUsize::new(0);
    let cancelled = AtomicBool::new(false);
    let (tx, rx) = mpsc::channel::<(usize, Result<T, E>)>();

    thread::scope(|scope| {
        for _ in 0..workers {
            let tx = tx.clone();
            let (cursor, cancelled, fetch) = (&cursor, &cancelled, &fetch);
            scope.spawn(move || {
                while !cancelled.load(Ordering::Acquire) {
                    let i = cursor.fetch_add(1, Ordering::Relaxed);
                    let Some(key) = keys.get(i) else { break };
                    let result = fetch(key);
                    if result.is_err() {
                        cancelled.store(true, Ordering::Release);
                    }
                    if tx.send((i, result)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);

        let mut out = HashMap::with_capacity(keys.len());
        let mut failure: Option<(String, E)> = None;
        for (i, result) in rx {
            match result {
                Ok(value) => {
                    if failure.is_none() {
                        out.insert(keys[i].clone(), value);
                    }
                }
                Err(err) => {
                    if failure.is_none() {
                        debug!(key = %keys[i], "fan-out cancelled");
                        failure = Some((keys[i].clone(), err));
                    }
                }
            }
        }
        match failure {
            Some(f) => Err(f),
            None => Ok(out),
        }
    })
}
