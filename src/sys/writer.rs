use crate::{LmdbError, LmdbResult, WriterPolicy};
use parking_lot::{Condvar, Mutex};
use std::thread::{self, ThreadId};
use tracing::warn;

/// Single-writer gate owned by an [`Environment`].
///
/// A read-write transaction holds a [`WriterToken`] from before the engine
/// transaction begins until after it has committed or aborted.
///
/// [`Environment`]: crate::Environment
#[derive(Debug, Default)]
pub(crate) struct WriterGate {
    /// Thread holding the gate, if any.
    owner: Mutex<Option<ThreadId>>,
    released: Condvar,
}

impl WriterGate {
    /// Acquires the gate according to `policy`.
    ///
    /// A thread that already holds the gate gets [`LmdbError::WriterBusy`]
    /// under both policies, since waiting would deadlock it.
    pub(crate) fn acquire(&self, policy: WriterPolicy) -> LmdbResult<WriterToken<'_>> {
        let me = thread::current().id();
        let mut owner = self.owner.lock();
        let mut warned = false;

        loop {
            match *owner {
                None => {
                    *owner = Some(me);
                    return Ok(WriterToken { gate: self });
                }
                Some(holder) if holder == me => return Err(LmdbError::WriterBusy),
                Some(_) => match policy {
                    WriterPolicy::FailFast => return Err(LmdbError::WriterBusy),
                    WriterPolicy::Block => {
                        if !warned {
                            warned = true;
                            warn!(
                                target: "signet_lmdb",
                                "Process stalled, awaiting read-write transaction lock."
                            );
                        }
                        self.released.wait(&mut owner);
                    }
                },
            }
        }
    }

    /// Whether a read-write transaction currently holds the gate.
    pub(crate) fn is_held(&self) -> bool {
        self.owner.lock().is_some()
    }

    fn release(&self) {
        *self.owner.lock() = None;
        self.released.notify_one();
    }
}

/// Proof of holding the [`WriterGate`]. Releases it on drop.
#[derive(Debug)]
pub(crate) struct WriterToken<'a> {
    gate: &'a WriterGate,
}

impl Drop for WriterToken<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}
