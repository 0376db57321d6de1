//! Bounded pool of long-lived engines.
//!
//! Engines are spawned lazily up to the pool size. A checkout is a guard that
//! hands the engine back when dropped, on success and failure paths alike. A
//! guard marked [`PooledEngine::discard`] drops its engine instead, freeing the
//! slot so the next checkout spawns a fresh process.

use crate::engine::{EngineError, EngineFactory, UciEngine};
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use tracing::{debug, info};

struct PoolState {
    idle: Vec<Box<dyn UciEngine>>,
    /// Engines alive, idle or checked out.
    live: usize,
    spawned_total: u64,
}

pub struct EnginePool {
    factory: Arc<dyn EngineFactory>,
    size: usize,
    state: Mutex<PoolState>,
    returned: Condvar,
}

impl EnginePool {
    pub fn new(factory: Arc<dyn EngineFactory>, size: usize) -> Self {
        Self {
            factory,
            size: size.max(1),
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                live: 0,
                spawned_total: 0,
            }),
            returned: Condvar::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Engines spawned over the pool's lifetime, respawns included.
    pub fn spawned_total(&self) -> u64 {
        self.lock().spawned_total
    }

    /// Borrows an engine, blocking while all of them are checked out.
    pub fn checkout(&self) -> Result<PooledEngine<'_>, EngineError> {
        let mut state = self.lock();
        loop {
            if let Some(engine) = state.idle.pop() {
                return Ok(PooledEngine::new(self, engine));
            }
            if state.live < self.size {
                state.live += 1;
                state.spawned_total += 1;
                drop(state);
                return match self.factory.spawn() {
                    Ok(engine) => {
                        info!(engine = engine.name(), "spawned engine");
                        Ok(PooledEngine::new(self, engine))
                    }
                    Err(e) => {
                        self.release_slot();
                        Err(e)
                    }
                };
            }
            state = self
                .returned
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        // Engines hold no invariants the pool relies on; a panic elsewhere
        // while holding the lock leaves the bookkeeping usable.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn checkin(&self, engine: Box<dyn UciEngine>) {
        self.lock().idle.push(engine);
        self.returned.notify_one();
    }

    fn release_slot(&self) {
        let mut state = self.lock();
        state.live = state.live.saturating_sub(1);
        drop(state);
        self.returned.notify_one();
    }
}

/// A checked-out engine. Returned to the pool on drop.
pub struct PooledEngine<'a> {
    pool: &'a EnginePool,
    engine: Option<Box<dyn UciEngine>>,
    discard: bool,
}

impl<'a> PooledEngine<'a> {
    fn new(pool: &'a EnginePool, engine: Box<dyn UciEngine>) -> Self {
        Self {
            pool,
            engine: Some(engine),
            discard: false,
        }
    }

    /// Kills the engine on drop instead of returning it.
    pub fn discard(&mut self) {
        self.discard = true;
    }
}

impl Deref for PooledEngine<'_> {
    type Target = dyn UciEngine;

    fn deref(&self) -> &Self::Target {
        match &self.engine {
            Some(engine) => engine.as_ref(),
            None => unreachable!("engine is only taken in drop"),
        }
    }
}

impl DerefMut for PooledEngine<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.engine {
            Some(engine) => engine.as_mut(),
            None => unreachable!("engine is only taken in drop"),
        }
    }
}

impl Drop for PooledEngine<'_> {
    fn drop(&mut self) {
        let Some(engine) = self.engine.take() else {
            return;
        };
        if self.discard {
            debug!(engine = engine.name(), "discarding engine");
            drop(engine);
            self.pool.release_slot();
        } else {
            self.pool.checkin(engine);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::{ScriptedEngine, ScriptedFactory};
    use crate::{SearchLimit, SearchRequest};
    use std::thread;
    use std::time::Duration;

    fn pool(size: usize) -> EnginePool {
        EnginePool::new(Arc::new(ScriptedFactory::new(ScriptedEngine::new())), size)
    }

    #[test]
    fn test_checkout_reuses_returned_engine() {
        let pool = pool(2);
        {
            let _a = pool.checkout().unwrap();
        }
        {
            let _b = pool.checkout().unwrap();
        }
        assert_eq!(pool.spawned_total(), 1);
    }

    #[test]
    fn test_discard_frees_slot_for_respawn() {
        let pool = pool(1);
        {
            let mut engine = pool.checkout().unwrap();
            engine.discard();
        }
        let _fresh = pool.checkout().unwrap();
        assert_eq!(pool.spawned_total(), 2);
    }

    #[test]
    fn test_checkout_blocks_until_checkin() {
        let pool = Arc::new(pool(1));
        let held = pool.checkout().unwrap();

        let waiter = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                let mut engine = pool.checkout().unwrap();
                let request = SearchRequest::new(chess_core::FenParser::STARTPOS, SearchLimit::Depth(1));
                engine.search(&request).is_ok()
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!waiter.is_finished());
        drop(held);
        assert!(waiter.join().unwrap());
        assert_eq!(pool.spawned_total(), 1);
    }

    #[test]
    fn test_failed_spawn_releases_slot() {
        let factory = ScriptedFactory::new(ScriptedEngine::new());
        factory.fail_next_spawns(1);
        let pool = EnginePool::new(Arc::new(factory), 1);
        assert!(pool.checkout().is_err());
        assert!(pool.checkout().is_ok());
    }
}
