//! Serialized access to the SQLite connection.
//!
//! A single worker thread owns the connection; every read and write is
//! a job submitted to that thread. This keeps SQLite in its happy
//! single-writer mode and gives callers a synchronous or asynchronous
//! surface over the same queue.
//!
//! A suspended queue rejects new submissions but keeps already queued
//! jobs, which run once the queue is resumed.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use rusqlite::Connection;
use rusqlite_migration::{Migrations, M};
use tracing::{debug, error};

use crate::app::error::{Result, TributaryError};

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum Message {
    Run(Job),
    Shutdown,
}

pub struct DatabaseQueue {
    sender: Sender<Message>,
    suspended: Arc<(Mutex<bool>, Condvar)>,
    worker: Option<JoinHandle<()>>,
}

impl DatabaseQueue {
    /// Open (creating if needed) a database at `path` and start the
    /// worker. The connection is opened on the worker thread and never
    /// leaves it.
    pub fn open(path: &Path) -> Result<Self> {
        Self::start(Some(path.to_path_buf()))
    }

    /// In-memory database, mainly for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::start(None)
    }

    fn start(path: Option<PathBuf>) -> Result<Self> {
        let (sender, receiver) = mpsc::channel::<Message>();
        let suspended = Arc::new((Mutex::new(false), Condvar::new()));
        let worker_suspended = Arc::clone(&suspended);

        // The worker reports the outcome of opening the connection
        // before entering its loop.
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();

        let worker = thread::Builder::new()
            .name("database-queue".into())
            .spawn(move || {
                let mut connection = match open_connection(path.as_deref()) {
                    Ok(connection) => {
                        let _ = ready_tx.send(Ok(()));
                        connection
                    }
                    Err(error) => {
                        let _ = ready_tx.send(Err(error));
                        return;
                    }
                };

                for message in receiver {
                    match message {
                        Message::Run(job) => {
                            wait_while_suspended(&worker_suspended);
                            job(&mut connection);
                        }
                        Message::Shutdown => break,
                    }
                }
                debug!("database queue worker exiting");
            })?;

        ready_rx
            .recv()
            .map_err(|_| TributaryError::Other("database worker died during open".into()))??;

        Ok(Self {
            sender,
            suspended,
            worker: Some(worker),
        })
    }

    /// Run a job on the worker thread and wait for its result.
    pub fn run_sync<T, F>(&self, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        self.check_not_suspended()?;
        let (tx, rx) = mpsc::channel();
        self.submit(Box::new(move |connection| {
            let _ = tx.send(job(connection));
        }))?;
        rx.recv()
            .map_err(|_| TributaryError::Other("database worker exited".into()))?
    }

    /// Queue a job without waiting. Errors inside the job are logged,
    /// not returned.
    pub fn run_async<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce(&mut Connection) -> Result<()> + Send + 'static,
    {
        self.check_not_suspended()?;
        self.submit(Box::new(move |connection| {
            if let Err(err) = job(connection) {
                error!(%err, "async database job failed");
            }
        }))
    }

    /// Stop accepting jobs. Jobs already queued stay queued and run
    /// after [`resume`](Self::resume).
    pub fn suspend(&self) {
        let (lock, _) = &*self.suspended;
        *lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = true;
        debug!("database queue suspended");
    }

    pub fn resume(&self) {
        let (lock, condvar) = &*self.suspended;
        *lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = false;
        condvar.notify_all();
        debug!("database queue resumed");
    }

    pub fn is_suspended(&self) -> bool {
        let (lock, _) = &*self.suspended;
        *lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_not_suspended(&self) -> Result<()> {
        if self.is_suspended() {
            Err(TributaryError::Suspended)
        } else {
            Ok(())
        }
    }

    fn submit(&self, job: Job) -> Result<()> {
        self.sender
            .send(Message::Run(job))
            .map_err(|_| TributaryError::Other("database worker exited".into()))
    }
}

impl Drop for DatabaseQueue {
    fn drop(&mut self) {
        // A suspended queue would park the worker forever.
        self.resume();
        let _ = self.sender.send(Message::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn wait_while_suspended(suspended: &(Mutex<bool>, Condvar)) {
    let (lock, condvar) = suspended;
    let mut flag = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    while *flag {
        flag = condvar
            .wait(flag)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
    }
}

pub(crate) fn open_connection(path: Option<&Path>) -> Result<Connection> {
    let mut connection = match path {
        Some(path) => {
            let connection = Connection::open(path)?;
            connection.pragma_update(None, "journal_mode", "WAL")?;
            connection
        }
        None => Connection::open_in_memory()?,
    };
    connection.pragma_update(None, "foreign_keys", "ON")?;

    let migrations = Migrations::new(vec![M::up(include_str!(
        "../../migrations/001-initial/up.sql"
    ))]);
    migrations.to_latest(&mut connection)?;
    Ok(connection)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_sync_returns_value() {
        let queue = DatabaseQueue::open_in_memory().unwrap();
        let count: i64 = queue
            .run_sync(|connection| {
                Ok(connection.query_row("SELECT count(*) FROM articles", [], |row| row.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_jobs_run_in_submission_order() {
        let queue = DatabaseQueue::open_in_memory().unwrap();
        queue
            .run_async(|connection| {
                connection.execute(
                    "INSERT INTO tag_lookup (tag, article_id) VALUES ('a', '1')",
                    [],
                )?;
                Ok(())
            })
            .unwrap();
        // The sync job queues behind the async one.
        let count: i64 = queue
            .run_sync(|connection| {
                Ok(connection.query_row("SELECT count(*) FROM tag_lookup", [], |row| row.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_suspended_queue_rejects_submissions() {
        let queue = DatabaseQueue::open_in_memory().unwrap();
        queue.suspend();
        let result = queue.run_sync(|_| Ok(()));
        assert!(matches!(result, Err(TributaryError::Suspended)));
        assert!(queue.is_suspended());

        queue.resume();
        assert!(queue.run_sync(|_| Ok(())).is_ok());
    }

    #[test]
    fn test_queued_jobs_survive_suspension() {
        let queue = DatabaseQueue::open_in_memory().unwrap();
        queue
            .run_async(|connection| {
                connection.execute(
                    "INSERT INTO tag_lookup (tag, article_id) VALUES ('kept', '1')",
                    [],
                )?;
                Ok(())
            })
            .unwrap();
        queue.suspend();
        queue.resume();
        let count: i64 = queue
            .run_sync(|connection| {
                Ok(connection.query_row(
                    "SELECT count(*) FROM tag_lookup WHERE tag = 'kept'",
                    [],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_file_backed_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.sqlite3");
        {
            let queue = DatabaseQueue::open(&path).unwrap();
            queue
                .run_sync(|connection| {
                    connection.execute(
                        "INSERT INTO tag_lookup (tag, article_id) VALUES ('persisted', '1')",
                        [],
                    )?;
                    Ok(())
                })
                .unwrap();
        }
        let queue = DatabaseQueue::open(&path).unwrap();
        let count: i64 = queue
            .run_sync(|connection| {
                Ok(connection.query_row(
                    "SELECT count(*) FROM tag_lookup WHERE tag = 'persisted'",
                    [],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(count, 1);
    }
}
