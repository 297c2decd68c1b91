//! Engine lifecycle management
//!
//! The engine is created lazily on first use and shared for the lifetime of
//! the manager. Only one load attempt is ever in flight: concurrent callers
//! wait on the same lock and observe its outcome. A failed load is not cached,
//! so the next caller retries.
//!
//! All work against the engine goes through an [`EngineSession`], which holds
//! the manager's session lock. The scratch namespace is keyed only by file
//! name, so two conversions must never stage at the same time.

use super::{EngineLoader, TranscodeEngine};
use crate::{ConvertError, Result};
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Owns the shared engine instance
pub struct EngineManager {
    loader: Box<dyn EngineLoader>,
    engine: Mutex<Option<Arc<dyn TranscodeEngine>>>,
    session_lock: Mutex<()>,
    load_attempts: AtomicUsize,
}

impl EngineManager {
    pub fn new(loader: impl EngineLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            engine: Mutex::new(None),
            session_lock: Mutex::new(()),
            load_attempts: AtomicUsize::new(0),
        }
    }

    /// Return the engine, loading it if needed
    ///
    /// Idempotent. Fails with [`ConvertError::EngineInit`] when the backend
    /// cannot start.
    pub async fn ensure_loaded(&self) -> Result<Arc<dyn TranscodeEngine>> {
        let mut slot = self.engine.lock().await;
        if let Some(engine) = slot.as_ref() {
            return Ok(Arc::clone(engine));
        }

        let attempt = self.load_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Loading transcode engine (attempt {})", attempt);

        match self.loader.load().await {
            Ok(engine) => {
                info!("Transcode engine '{}' loaded", engine.name());
                *slot = Some(Arc::clone(&engine));
                Ok(engine)
            }
            Err(e) => {
                warn!("Transcode engine failed to load: {}", e);
                Err(ConvertError::EngineInit(e.to_string()))
            }
        }
    }

    /// Exclusive access to the loaded engine
    pub async fn session(&self) -> Result<EngineSession<'_>> {
        let guard = self.session_lock.lock().await;
        let engine = self.ensure_loaded().await?;
        Ok(EngineSession {
            engine,
            _guard: guard,
        })
    }

    pub async fn is_loaded(&self) -> bool {
        self.engine.lock().await.is_some()
    }

    /// Drop the engine; the next use loads a fresh one
    ///
    /// Waits for any running session to finish first.
    pub async fn dispose(&self) {
        let _session = self.session_lock.lock().await;
        if let Some(engine) = self.engine.lock().await.take() {
            info!("Transcode engine '{}' disposed", engine.name());
        }
    }

    /// Number of load attempts made so far
    pub fn load_attempts(&self) -> usize {
        self.load_attempts.load(Ordering::SeqCst)
    }
}

/// Exclusive handle on the engine for one conversion
pub struct EngineSession<'a> {
    engine: Arc<dyn TranscodeEngine>,
    _guard: MutexGuard<'a, ()>,
}

impl Deref for EngineSession<'_> {
    type Target = dyn TranscodeEngine;

    fn deref(&self) -> &Self::Target {
        self.engine.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineError, MockEngineLoader, NativeEngine};

    #[tokio::test]
    async fn test_failed_load_is_retried() {
        let mut loader = MockEngineLoader::new();
        let mut calls = 0;
        loader.expect_load().times(2).returning(move || {
            calls += 1;
            if calls == 1 {
                Err(EngineError::Unavailable("wasm runtime missing".to_string()))
            } else {
                Ok(Arc::new(NativeEngine::new()) as Arc<dyn TranscodeEngine>)
            }
        });

        let manager = EngineManager::new(loader);

        let first = manager.ensure_loaded().await;
        assert!(matches!(first, Err(ConvertError::EngineInit(_))));
        assert!(!manager.is_loaded().await);

        assert!(manager.ensure_loaded().await.is_ok());
        assert!(manager.is_loaded().await);
        assert_eq!(manager.load_attempts(), 2);
    }

    #[tokio::test]
    async fn test_loaded_engine_is_reused() {
        let mut loader = MockEngineLoader::new();
        loader
            .expect_load()
            .times(1)
            .returning(|| Ok(Arc::new(NativeEngine::new()) as Arc<dyn TranscodeEngine>));

        let manager = EngineManager::new(loader);
        let a = manager.ensure_loaded().await.unwrap();
        let b = manager.ensure_loaded().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_dispose_forces_reload() {
        let mut loader = MockEngineLoader::new();
        loader
            .expect_load()
            .times(2)
            .returning(|| Ok(Arc::new(NativeEngine::new()) as Arc<dyn TranscodeEngine>));

        let manager = EngineManager::new(loader);
        manager.ensure_loaded().await.unwrap();
        manager.dispose().await;
        assert!(!manager.is_loaded().await);

        let session = manager.session().await.unwrap();
        assert_eq!(session.name(), "native");
        assert_eq!(manager.load_attempts(), 2);
    }
}
