//! A world which owns an entity store on its own task.
//!
//! Every access is sent to a single writer task as a closure, so closures
//! run one at a time in the order they were submitted. Query results cannot
//! leave the closure which produced them.

use futures::channel::{mpsc, oneshot};
use futures::StreamExt;

use crate::error::WorldError;
use crate::store::EntityStore;

type Command = Box<dyn FnOnce(&mut EntityStore) + Send + 'static>;

/// A handle to an `EntityStore` running on a tokio task.
pub struct World {
    command_tx: mpsc::UnboundedSender<Command>,
    exit_rx: oneshot::Receiver<EntityStore>,
}

impl World {
    /// Move `store` onto a new writer task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(store: EntityStore) -> World {
        let (command_tx, command_rx) = mpsc::unbounded();
        let (exit_tx, exit_rx) = oneshot::channel();

        tokio::spawn(async move {
            let store = handle_commands(store, command_rx).await;
            let _ = exit_tx.send(store);
        });

        World {
            command_tx,
            exit_rx,
        }
    }

    fn send(&self, command: Command) -> Result<(), WorldError> {
        self.command_tx.unbounded_send(command).map_err(|_| WorldError::Closed)
    }

    /// Run `f` with exclusive access to the store.
    pub async fn transaction<F, R>(&self, f: F) -> Result<R, WorldError>
        where F: FnOnce(&mut EntityStore) -> R + Send + 'static,
              R: Send + 'static
    {
        let (result_tx, result_rx) = oneshot::channel();
        self.send(Box::new(move |store| {
            let _ = result_tx.send(f(store));
        }))?;
        result_rx.await.map_err(|_| WorldError::Closed)
    }

    /// Run `f` with shared access to the store.
    pub async fn read<F, R>(&self, f: F) -> Result<R, WorldError>
        where F: FnOnce(&EntityStore) -> R + Send + 'static,
              R: Send + 'static
    {
        self.transaction(move |store| f(store)).await
    }

    /// Stop the writer task once queued closures have run and return the store.
    pub async fn into_store(self) -> Result<EntityStore, WorldError> {
        let World { command_tx, exit_rx } = self;
        drop(command_tx);
        exit_rx.await.map_err(|_| WorldError::Closed)
    }
}

async fn handle_commands(mut store: EntityStore, mut command_rx: mpsc::UnboundedReceiver<Command>) -> EntityStore {
    while let Some(command) = command_rx.next().await {
        command(&mut store);
    }

    log::debug!("world writer task exiting: {:?}", store);
    store
}
