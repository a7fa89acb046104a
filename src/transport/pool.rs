//! Worker threads for blocking fetches.

//---------------------------------------------------------------------------------------------------- Use
use std::{
	sync::{Arc,Mutex},
	thread::JoinHandle,
};
use crossbeam::channel::{Receiver,Sender};
use crate::macros::{debug2,trace2,send};

//---------------------------------------------------------------------------------------------------- Types
type Job = Box<dyn FnOnce() + Send + 'static>;

enum Msg {
	Job(Job),
	Shutdown,
}

//---------------------------------------------------------------------------------------------------- FetchPool
/// A fixed set of named worker threads running fetch jobs.
///
/// Storage channel consumers and CDN requests run here.
/// The pool is owned by whoever creates it (normally the
/// [`crate::Player`]) and handed to transports at construction.
///
/// Cloning is cheap, all clones share the same workers.
#[derive(Clone)]
pub struct FetchPool {
	sender: Sender<Msg>,
	handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
	workers: usize,
}

impl std::fmt::Debug for FetchPool {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("FetchPool")
			.field("workers", &self.workers)
			.field("queued", &self.sender.len())
			.finish()
	}
}

impl FetchPool {
	#[cold]
	#[inline(never)]
	/// Spawn `workers` threads (at least 1).
	///
	/// # Errors
	/// An OS thread could not be spawned.
	pub fn new(workers: usize) -> Result<Self, std::io::Error> {
		let workers = std::cmp::max(workers, 1);
		let (sender, receiver) = crossbeam::channel::unbounded::<Msg>();

		let mut handles = Vec::with_capacity(workers);
		for i in 0..workers {
			let receiver = receiver.clone();
			let handle = std::thread::Builder::new()
				.name(format!("FetchWorker-{i}"))
				.spawn(move || Self::main(i, &receiver))?;
			handles.push(handle);
		}

		debug2!("FetchPool - spawned {workers} workers");
		Ok(Self {
			sender,
			handles: Arc::new(Mutex::new(handles)),
			workers,
		})
	}

	#[cold]
	#[inline(never)]
	fn main(i: usize, receiver: &Receiver<Msg>) {
		trace2!("FetchWorker-{i} - main()");
		// Exits on `Shutdown`, or when every pool handle is gone.
		while let Ok(Msg::Job(job)) = receiver.recv() {
			job();
		}
		trace2!("FetchWorker-{i} - exiting");
	}

	/// Run `job` on the next free worker.
	///
	/// Jobs queued after [`Self::shutdown`] never run.
	pub fn execute<F>(&self, job: F)
	where
		F: FnOnce() + Send + 'static,
	{
		send!(self.sender, Msg::Job(Box::new(job)));
	}

	/// Amount of worker threads.
	pub const fn workers(&self) -> usize {
		self.workers
	}

	/// Stop every worker once the jobs queued before this call finished.
	///
	/// If `blocking`, wait for the workers to exit.
	pub fn shutdown(&self, blocking: bool) {
		debug2!("FetchPool - shutdown, blocking: {blocking}");
		for _ in 0..self.workers {
			send!(self.sender, Msg::Shutdown);
		}

		if !blocking {
			return;
		}
		let handles = std::mem::take(
			&mut *self.handles.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
		);
		for handle in handles {
			// A panicking job already printed its message.
			drop(handle.join());
		}
	}
}

//---------------------------------------------------------------------------------------------------- TESTS
#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize,Ordering};

	#[test]
	fn runs_jobs() {
		let pool = FetchPool::new(4).unwrap();
		let count = Arc::new(AtomicUsize::new(0));
		let (tx, rx) = crossbeam::channel::unbounded();

		for _ in 0..100 {
			let count = Arc::clone(&count);
			let tx = tx.clone();
			pool.execute(move || {
				count.fetch_add(1, Ordering::SeqCst);
				tx.send(std::thread::current().name().map(String::from)).unwrap();
			});
		}
		for _ in 0..100 {
			let name = rx.recv().unwrap().unwrap();
			assert!(name.starts_with("FetchWorker-"));
		}

		pool.shutdown(true);
		assert_eq!(count.load(Ordering::SeqCst), 100);
	}

	#[test]
	fn zero_workers_is_one() {
		let pool = FetchPool::new(0).unwrap();
		assert_eq!(pool.workers(), 1);
		pool.shutdown(true);
	}
}
