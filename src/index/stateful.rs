//! The live index slot and its hot swap.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, Sender, unbounded};
use log::{debug, error, info, warn};
use parking_lot::RwLock;

use crate::error::Result;
use crate::index::{CombinedIndexReader, IndexFactory};

/// Holds the one live [`CombinedIndexReader`].
///
/// Queries take a [`snapshot`](Self::snapshot) and run against it without
/// holding the lock. A swap replaces the slot only once the new reader is
/// open; the previous reader stays usable by whoever holds a snapshot and is
/// handed to a [`ReaderRetirer`] for deferred release.
///
/// `available` and `loaded` mirror the slot and are only stored while the
/// write lock is held, so the status accessors never take the lock.
pub struct StatefulIndex {
    factory: Arc<dyn IndexFactory>,
    current: RwLock<Option<Arc<CombinedIndexReader>>>,
    available: AtomicBool,
    loaded: AtomicBool,
    retirer: ReaderRetirer,
}

impl StatefulIndex {
    pub fn new(factory: Arc<dyn IndexFactory>, close_delay: Duration) -> Result<Self> {
        Ok(StatefulIndex {
            factory,
            current: RwLock::new(None),
            available: AtomicBool::new(false),
            loaded: AtomicBool::new(false),
            retirer: ReaderRetirer::new(close_delay)?,
        })
    }

    /// Load the live generation unless a reader is already in place.
    pub fn init(&self) -> Result<()> {
        let mut slot = self.current.write();
        if slot.is_some() {
            return Ok(());
        }

        info!("INDEX-INIT");
        match self.factory.combined_index_reader() {
            Ok(reader) => {
                let loaded = reader.is_loaded();
                if !loaded {
                    warn!("INDEX-INIT: index files incomplete");
                }
                *slot = Some(Arc::new(reader));
                self.loaded.store(loaded, Ordering::Release);
                self.available.store(true, Ordering::Release);
                Ok(())
            }
            Err(e) => {
                error!("INDEX-INIT failed: {e}");
                Err(e)
            }
        }
    }

    /// Publish the staged generation and start serving it.
    ///
    /// Returns false when the switch failed, in which case the previous
    /// reader keeps serving.
    pub fn switch_index(&self) -> bool {
        info!("INDEX-SWITCH-BEGIN");
        let mut slot = self.current.write();

        let opened = self
            .factory
            .switch_files()
            .and_then(|_| self.factory.combined_index_reader());

        match opened {
            Ok(reader) => {
                let loaded = reader.is_loaded();
                let previous = slot.replace(Arc::new(reader));
                self.loaded.store(loaded, Ordering::Release);
                self.available.store(true, Ordering::Release);
                drop(slot);

                if let Some(previous) = previous {
                    self.retirer.retire(previous);
                }
                info!("INDEX-SWITCH-OK");
                true
            }
            Err(e) => {
                error!("INDEX-SWITCH-ERR: {e}");
                false
            }
        }
    }

    /// The live reader, if any.
    pub fn snapshot(&self) -> Option<Arc<CombinedIndexReader>> {
        self.current.read().clone()
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    /// Whether a reader is live and all of its files were loaded.
    pub fn is_loaded(&self) -> bool {
        self.is_available() && self.loaded.load(Ordering::Acquire)
    }

    /// Readers still waiting for their deferred release.
    pub fn retiring(&self) -> usize {
        self.retirer.pending()
    }
}

/// Holds retired readers on a background thread and drops them
/// `close_delay` after retirement. Snapshot holders keep their reader alive
/// past that point through their own `Arc`.
pub struct ReaderRetirer {
    sender: Option<Sender<Arc<CombinedIndexReader>>>,
    handle: Option<thread::JoinHandle<()>>,
    pending: Arc<AtomicUsize>,
}

impl ReaderRetirer {
    pub fn new(close_delay: Duration) -> Result<Self> {
        let (sender, receiver) = unbounded::<Arc<CombinedIndexReader>>();
        let pending = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&pending);

        let handle = thread::Builder::new()
            .name("index-retirer".to_string())
            .spawn(move || {
                let mut parked: VecDeque<(Instant, Arc<CombinedIndexReader>)> = VecDeque::new();
                loop {
                    let wait = parked
                        .front()
                        .map(|(due, _)| due.saturating_duration_since(Instant::now()))
                        .unwrap_or(Duration::from_secs(3600));

                    match receiver.recv_timeout(wait) {
                        Ok(reader) => parked.push_back((Instant::now() + close_delay, reader)),
                        Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => break,
                    }

                    let now = Instant::now();
                    while parked.front().is_some_and(|(due, _)| *due <= now) {
                        parked.pop_front();
                        counter.fetch_sub(1, Ordering::AcqRel);
                        debug!("Released retired index reader");
                    }
                }
                counter.fetch_sub(parked.len(), Ordering::AcqRel);
            })?;

        Ok(ReaderRetirer {
            sender: Some(sender),
            handle: Some(handle),
            pending,
        })
    }

    pub fn retire(&self, reader: Arc<CombinedIndexReader>) {
        self.pending.fetch_add(1, Ordering::AcqRel);
        if let Some(sender) = &self.sender {
            if let Err(e) = sender.send(reader) {
                warn!("Retirer thread gone, releasing reader immediately");
                drop(e.into_inner());
                self.pending.fetch_sub(1, Ordering::AcqRel);
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

impl Drop for ReaderRetirer {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PilumError;
    use crate::forward::ForwardIndexReader;
    use crate::reverse::ReverseIndexReader;
    use parking_lot::Mutex;

    struct ScriptedFactory {
        fail_switch: Mutex<bool>,
        opened: AtomicUsize,
    }

    impl IndexFactory for ScriptedFactory {
        fn switch_files(&self) -> Result<()> {
            if *self.fail_switch.lock() {
                Err(PilumError::index("disk full"))
            } else {
                Ok(())
            }
        }

        fn combined_index_reader(&self) -> Result<CombinedIndexReader> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(CombinedIndexReader::new(
                ForwardIndexReader::empty(),
                ReverseIndexReader::empty("full"),
                ReverseIndexReader::empty("prio"),
            ))
        }
    }

    fn index(delay: Duration) -> (Arc<ScriptedFactory>, StatefulIndex) {
        let factory = Arc::new(ScriptedFactory {
            fail_switch: Mutex::new(false),
            opened: AtomicUsize::new(0),
        });
        let index = StatefulIndex::new(factory.clone(), delay).unwrap();
        (factory, index)
    }

    #[test]
    fn test_init_is_idempotent() {
        let (factory, index) = index(Duration::from_secs(60));
        assert!(!index.is_available());
        index.init().unwrap();
        index.init().unwrap();
        assert_eq!(factory.opened.load(Ordering::SeqCst), 1);
        assert!(index.is_available());
        assert!(!index.is_loaded());
    }

    #[test]
    fn test_failed_switch_keeps_reader() {
        let (factory, index) = index(Duration::from_secs(60));
        index.init().unwrap();
        let before = index.snapshot().unwrap();

        *factory.fail_switch.lock() = true;
        assert!(!index.switch_index());
        assert!(Arc::ptr_eq(&before, &index.snapshot().unwrap()));
        assert_eq!(index.retiring(), 0);
    }

    #[test]
    fn test_switch_retires_previous_reader() {
        let (_factory, index) = index(Duration::from_millis(20));
        index.init().unwrap();
        let before = index.snapshot().unwrap();

        assert!(index.switch_index());
        let after = index.snapshot().unwrap();
        assert!(!Arc::ptr_eq(&before, &after));

        for _ in 0..100 {
            if index.retiring() == 0 {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(index.retiring(), 0);
        assert_eq!(Arc::strong_count(&before), 1);
    }

    #[test]
    fn test_status_does_not_wait_for_swap() {
        let (_factory, index) = index(Duration::from_secs(60));
        index.init().unwrap();

        // Stand in for a swap in progress.
        let guard = index.current.write();
        let (tx, rx) = crossbeam_channel::bounded(1);
        thread::scope(|scope| {
            scope.spawn(|| tx.send((index.is_available(), index.is_loaded())).unwrap());
            let status = rx.recv_timeout(Duration::from_secs(5));
            drop(guard);
            assert_eq!(status, Ok((true, false)));
        });
    }
}
