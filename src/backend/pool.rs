//! Process-wide codec-library instance pool
//!
//! Library instances are reusable and held in a free list to amortize
//! construction. `acquire` hands out a lease; dropping the lease returns
//! the instance to the pool. The embedding installs a factory once at
//! startup.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use super::library::CodecLibrary;

type LibraryFactory = dyn Fn() -> Arc<dyn CodecLibrary> + Send + Sync;

struct LibraryPool {
  factory: Mutex<Option<Box<LibraryFactory>>>,
  free: Mutex<Vec<Arc<dyn CodecLibrary>>>,
  // Bumped on install; leases from an older factory are discarded on
  // return instead of polluting the new free list
  generation: AtomicU64,
}

static POOL: OnceLock<LibraryPool> = OnceLock::new();

fn pool() -> &'static LibraryPool {
  POOL.get_or_init(|| LibraryPool {
    factory: Mutex::new(None),
    free: Mutex::new(Vec::new()),
    generation: AtomicU64::new(0),
  })
}

// A poisoned pool lock only means a panic elsewhere mid-push; the data is
// still a valid free list, so recover the guard.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  match mutex.lock() {
    Ok(guard) => guard,
    Err(poisoned) => poisoned.into_inner(),
  }
}

/// Install the codec-library factory used by every codec instance.
///
/// Replacing the factory clears the free list; leases already handed out
/// keep their instance alive until dropped, then fall out of the pool.
pub fn install<F>(factory: F)
where
  F: Fn() -> Arc<dyn CodecLibrary> + Send + Sync + 'static,
{
  let pool = pool();
  *lock(&pool.factory) = Some(Box::new(factory));
  lock(&pool.free).clear();
  pool.generation.fetch_add(1, Ordering::AcqRel);
}

/// Lease a library instance from the pool, constructing one when the free
/// list is empty. Returns `None` when no factory has been installed.
pub fn acquire() -> Option<LibraryLease> {
  let pool = pool();
  let generation = pool.generation.load(Ordering::Acquire);
  if let Some(instance) = lock(&pool.free).pop() {
    return Some(LibraryLease {
      instance: Some(instance),
      generation,
    });
  }
  let instance = lock(&pool.factory).as_ref()?();
  Some(LibraryLease {
    instance: Some(instance),
    generation,
  })
}

/// A pooled library instance; returns to the free list on drop
pub struct LibraryLease {
  instance: Option<Arc<dyn CodecLibrary>>,
  generation: u64,
}

impl Drop for LibraryLease {
  fn drop(&mut self) {
    if let Some(instance) = self.instance.take() {
      let pool = pool();
      if pool.generation.load(Ordering::Acquire) == self.generation {
        lock(&pool.free).push(instance);
      }
    }
  }
}

impl std::ops::Deref for LibraryLease {
  type Target = dyn CodecLibrary;

  fn deref(&self) -> &Self::Target {
    // The option is only taken in Drop
    match self.instance.as_deref() {
      Some(library) => library,
      None => unreachable!(),
    }
  }
}
