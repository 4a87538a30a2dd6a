use std::sync::{Arc, Barrier};
use std::thread::{self, JoinHandle};

/// Run `op` on `num_threads` threads that share one barrier and collect the
/// results in thread order.
pub fn run_concurrent_with_barrier<F, R>(num_threads: usize, op: F) -> Vec<R>
where
    F: Fn(usize, Arc<Barrier>) -> R + Send + Clone + 'static,
    R: Send + 'static,
{
    let barrier = Arc::new(Barrier::new(num_threads));
    let handles: Vec<_> = (0..num_threads)
        .map(|thread_id| {
            let barrier = Arc::clone(&barrier);
            let op = op.clone();
            thread::spawn(move || op(thread_id, barrier))
        })
        .collect();

    wait_for_threads(handles)
}

fn wait_for_threads<R>(handles: Vec<JoinHandle<R>>) -> Vec<R> {
    handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect()
}
