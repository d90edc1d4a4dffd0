//! Background push worker for watch mode.
//!
//! File-change notifications arrive on a channel. A single worker thread
//! drains it and calls [`SyncEngine::push`], so at most one push runs at a
//! time. Events that queue up while a push is running collapse into the
//! next push.

use crate::engine::SyncEngine;
use crossbeam_channel::{unbounded, Receiver, Sender};
use spacesync_remote::RemoteService;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Message for a [`PushWorker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A document file changed.
    Changed(PathBuf),
    /// Stop after draining queued changes.
    Shutdown,
}

/// Serializes pushes triggered by change events.
pub struct PushWorker {
    sender: Sender<ChangeEvent>,
    handle: Option<JoinHandle<u64>>,
}

impl PushWorker {
    /// Starts the worker thread.
    pub fn spawn<R>(engine: Arc<SyncEngine<R>>) -> std::io::Result<Self>
    where
        R: RemoteService + 'static,
    {
        let (sender, receiver) = unbounded();
        let handle = thread::Builder::new()
            .name("spacesync-push".into())
            .spawn(move || run(&engine, &receiver))?;
        Ok(Self {
            sender,
            handle: Some(handle),
        })
    }

    /// Returns a sender for change events.
    pub fn sender(&self) -> Sender<ChangeEvent> {
        self.sender.clone()
    }

    /// Stops the worker after it drains pending events. Returns the number of
    /// pushes it ran.
    pub fn shutdown(mut self) -> u64 {
        let _ = self.sender.send(ChangeEvent::Shutdown);
        self.join()
    }

    /// Blocks until a [`ChangeEvent::Shutdown`] sent through a
    /// [`sender`](Self::sender) stops the worker. Returns the number of
    /// pushes it ran.
    pub fn wait(mut self) -> u64 {
        self.join()
    }

    fn join(&mut self) -> u64 {
        match self.handle.take().map(JoinHandle::join) {
            Some(Ok(pushes)) => pushes,
            Some(Err(_)) => {
                warn!("push worker panicked");
                0
            }
            None => 0,
        }
    }
}

impl Drop for PushWorker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.sender.send(ChangeEvent::Shutdown);
            self.join();
        }
    }
}

fn run<R: RemoteService>(engine: &SyncEngine<R>, receiver: &Receiver<ChangeEvent>) -> u64 {
    let mut pushes = 0;
    while let Ok(event) = receiver.recv() {
        let mut stop = false;
        let mut changed = Vec::new();
        match event {
            ChangeEvent::Changed(path) => changed.push(path),
            ChangeEvent::Shutdown => stop = true,
        }
        for queued in receiver.try_iter() {
            match queued {
                ChangeEvent::Changed(path) => changed.push(path),
                ChangeEvent::Shutdown => stop = true,
            }
        }

        if !changed.is_empty() {
            debug!(events = changed.len(), "pushing local changes");
            match engine.push() {
                Ok(report) => info!(
                    created = report.created,
                    updated = report.updated,
                    deleted = report.deleted,
                    failures = report.failures.len(),
                    "watch push complete"
                ),
                Err(e) => warn!(error = %e, "watch push failed"),
            }
            pushes += 1;
        }

        if stop {
            break;
        }
    }
    pushes
}
