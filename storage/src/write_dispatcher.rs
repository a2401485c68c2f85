//! Write request dispatcher: a single master thread draining a lock-free
//! MPSC queue of object mutations.
//!
//! Funnelling every writer through one thread turns N concurrent writers
//! into one sequential engine writer and lets consecutive tasks ride the
//! same engine write batch (group commit). Tasks commit in enqueue order per
//! partition; across partitions ordering is best-effort batch FIFO.
//!
//! The queue is unbounded: callers are HTTP handlers whose request sizes
//! have already been admission-controlled.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use cellar_common::shutdown::StopToken;
use cellar_common::Status;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};
use parking_lot::Mutex;

use crate::cache::FrontlineCache;
use crate::engine::{Engine, WriteBatch};
use crate::task::{ObjectIoTask, ObjectOptype, ObjectResponse};
use crate::LOG_TARGET;

const QUEUE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound of tasks aggregated into one engine write batch.
const MAX_BATCH_TASKS: usize = 256;

pub struct WriteIoDispatcher {
    sender: Sender<ObjectIoTask>,
    master: Mutex<Option<JoinHandle<()>>>,
}

impl WriteIoDispatcher {
    /// Starts the write dispatcher master thread.
    pub fn start(engine: Arc<dyn Engine>, cache: Arc<FrontlineCache>, stop: StopToken) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded::<ObjectIoTask>();

        info!(target: LOG_TARGET, "Starting write IO dispatcher master thread.");

        let master = std::thread::Builder::new()
            .name("write-io-master".to_string())
            .spawn(move || master_loop(engine, cache, receiver, stop))
            .expect("failed to spawn the write IO master thread");

        Self {
            sender,
            master: Mutex::new(Some(master)),
        }
    }

    /// Enqueues a write IO task. Lock-free on the caller side.
    pub fn enqueue(&self, task: ObjectIoTask) {
        if let Err(rejected) = self.sender.send(task) {
            rejected
                .0
                .reply
                .reply(ObjectResponse::status(Status::Fail));
        }
    }

    /// Joins the master thread in a blocking manner.
    pub fn wait_for_stop(&self) {
        if let Some(master) = self.master.lock().take() {
            let _ = master.join();
        }
    }
}

fn master_loop(
    engine: Arc<dyn Engine>,
    cache: Arc<FrontlineCache>,
    receiver: Receiver<ObjectIoTask>,
    stop: StopToken,
) {
    loop {
        match receiver.recv_timeout(QUEUE_POLL_INTERVAL) {
            Ok(first) => {
                let mut tasks = vec![first];
                while tasks.len() < MAX_BATCH_TASKS {
                    match receiver.try_recv() {
                        Ok(task) => tasks.push(task),
                        Err(_) => break,
                    }
                }
                commit_batch(&engine, &cache, tasks);
            }
            Err(RecvTimeoutError::Timeout) => {
                // The loop only exits once the queue has fully drained.
                if stop.is_stop_requested() && receiver.is_empty() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    info!(target: LOG_TARGET, "Stopping write IO dispatcher master thread.");
}

/// Aggregates the drained tasks into one engine write batch, commits it, and
/// completes every task with the batch outcome. On insert success the cache
/// is written through; on remove success the cache entry is invalidated.
fn commit_batch(engine: &Arc<dyn Engine>, cache: &Arc<FrontlineCache>, tasks: Vec<ObjectIoTask>) {
    let mut batch = WriteBatch::new();
    let mut valid_tasks = Vec::with_capacity(tasks.len());

    for task in tasks {
        match task.request.optype {
            ObjectOptype::Insert => {
                batch.put(
                    &task.container.handle(),
                    &task.request.object_id,
                    task.request.object_data.clone(),
                );
                valid_tasks.push(task);
            }
            ObjectOptype::Remove => {
                batch.delete(&task.container.handle(), &task.request.object_id);
                valid_tasks.push(task);
            }
            ObjectOptype::Get => {
                error!(
                    target: LOG_TARGET,
                    "Invalid optype scheduled on the write IO master. ObjectId={}, \
                     ContainerName={}.",
                    task.request.object_id,
                    task.request.container_name
                );
                task.reply
                    .reply(ObjectResponse::status(Status::InvalidOperation));
            }
        }
    }

    if batch.is_empty() {
        return;
    }

    debug!(
        target: LOG_TARGET,
        "Committing objects write batch. NumberTasks={}.",
        valid_tasks.len()
    );

    match engine.execute_write_batch(batch) {
        Ok(()) => {
            for task in valid_tasks {
                complete_committed_task(cache, task);
            }
        }
        Err(status) => {
            error!(
                target: LOG_TARGET,
                "Objects write batch failed; failing every task in the batch. Status={}.", status
            );
            for task in valid_tasks {
                task.reply.reply(ObjectResponse::status(status));
            }
        }
    }
}

fn complete_committed_task(cache: &Arc<FrontlineCache>, task: ObjectIoTask) {
    let ObjectIoTask {
        request,
        container: _container,
        reply,
    } = task;

    info!(
        target: LOG_TARGET,
        "Object write committed. Optype={:?}, ObjectId={}, ContainerName={}.",
        request.optype,
        request.object_id,
        request.container_name
    );

    reply.reply(ObjectResponse::status(Status::Success));

    // Cache synchronization happens after the engine commit and after the
    // reply; failures are logged only.
    match request.optype {
        ObjectOptype::Insert => {
            if let Err(status) = cache.put(
                &request.container_name,
                &request.object_id,
                request.object_data,
            ) {
                warn!(
                    target: LOG_TARGET,
                    "Frontline cache write-through failed on insert. ObjectId={}, \
                     ContainerName={}, Status={}.",
                    request.object_id,
                    request.container_name,
                    status
                );
            }
        }
        ObjectOptype::Remove => {
            cache.remove(&request.container_name, &request.object_id);
        }
        ObjectOptype::Get => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellar_common::shutdown::StopSource;
    use crate::container::{Container, ContainerRecord};
    use crate::engine::MemoryEngine;
    use crate::index::ContainerIndex;
    use crate::task::{ObjectRequest, ReplyHandle};

    struct Fixture {
        engine: Arc<MemoryEngine>,
        cache: Arc<FrontlineCache>,
        container: Arc<Container>,
        dispatcher: WriteIoDispatcher,
        stop: StopSource,
    }

    fn fixture() -> Fixture {
        let engine = Arc::new(MemoryEngine::new());
        let index = Arc::new(ContainerIndex::new(4));

        let handle = engine.create_partition("c").unwrap();
        let container = Arc::new(Container::new(
            Arc::clone(&engine) as Arc<dyn Engine>,
            handle,
            ContainerRecord::new("c"),
        ));
        index.insert(Arc::clone(&container)).unwrap();

        let cache = Arc::new(FrontlineCache::new(2, 1024 * 1024, 64 * 1024, index));
        let stop = StopSource::new();
        let dispatcher = WriteIoDispatcher::start(
            Arc::clone(&engine) as Arc<dyn Engine>,
            Arc::clone(&cache),
            stop.token(),
        );

        Fixture {
            engine,
            cache,
            container,
            dispatcher,
            stop,
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            self.stop.request_stop();
            self.dispatcher.wait_for_stop();
        }
    }

    fn insert_task(
        fixture: &Fixture,
        object_id: &str,
        data: &[u8],
    ) -> (ObjectIoTask, tokio::sync::oneshot::Receiver<ObjectResponse>) {
        let (reply, receiver) = ReplyHandle::channel();
        let task = ObjectIoTask::new(
            ObjectRequest::insert("c".to_string(), object_id.to_string(), data.to_vec()),
            Arc::clone(&fixture.container),
            reply,
        );
        (task, receiver)
    }

    #[tokio::test]
    async fn insert_commits_to_the_engine_and_writes_through_the_cache() {
        let fixture = fixture();
        let (task, receiver) = insert_task(&fixture, "k", b"v");
        fixture.dispatcher.enqueue(task);

        let response = receiver.await.unwrap();
        assert_eq!(response.status, Status::Success);
        assert_eq!(
            fixture.engine.get(&fixture.container.handle(), "k").unwrap(),
            Some(b"v".to_vec())
        );

        for _ in 0..50 {
            if fixture.cache.get("c", "k").is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(fixture.cache.get("c", "k"), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn writes_to_the_same_key_commit_in_enqueue_order() {
        let fixture = fixture();
        let (first, first_rx) = insert_task(&fixture, "k", b"v1");
        let (second, second_rx) = insert_task(&fixture, "k", b"v2");

        fixture.dispatcher.enqueue(first);
        fixture.dispatcher.enqueue(second);

        assert_eq!(first_rx.await.unwrap().status, Status::Success);
        assert_eq!(second_rx.await.unwrap().status, Status::Success);

        assert_eq!(
            fixture.engine.get(&fixture.container.handle(), "k").unwrap(),
            Some(b"v2".to_vec())
        );
    }

    #[tokio::test]
    async fn remove_commits_and_invalidates_the_cache() {
        let fixture = fixture();
        let (insert, insert_rx) = insert_task(&fixture, "k", b"v");
        fixture.dispatcher.enqueue(insert);
        insert_rx.await.unwrap();

        let (reply, remove_rx) = ReplyHandle::channel();
        fixture.dispatcher.enqueue(ObjectIoTask::new(
            ObjectRequest::remove("c".to_string(), "k".to_string()),
            Arc::clone(&fixture.container),
            reply,
        ));

        assert_eq!(remove_rx.await.unwrap().status, Status::Success);
        assert_eq!(
            fixture.engine.get(&fixture.container.handle(), "k").unwrap(),
            None
        );

        for _ in 0..50 {
            if fixture.cache.get("c", "k").is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(fixture.cache.get("c", "k"), None);
    }

    #[tokio::test]
    async fn batch_failure_fails_every_task_in_the_batch() {
        let fixture = fixture();
        fixture.engine.set_fail_batches(true);

        let (first, first_rx) = insert_task(&fixture, "a", b"1");
        let (second, second_rx) = insert_task(&fixture, "b", b"2");
        fixture.dispatcher.enqueue(first);
        fixture.dispatcher.enqueue(second);

        assert_eq!(
            first_rx.await.unwrap().status,
            Status::ObjectWriteBatchFailed
        );
        assert_eq!(
            second_rx.await.unwrap().status,
            Status::ObjectWriteBatchFailed
        );
        assert_eq!(fixture.cache.get("c", "a"), None);
    }

    #[tokio::test]
    async fn misrouted_get_task_is_rejected() {
        let fixture = fixture();
        let (reply, receiver) = ReplyHandle::channel();
        fixture.dispatcher.enqueue(ObjectIoTask::new(
            ObjectRequest::get("c".to_string(), "k".to_string()),
            Arc::clone(&fixture.container),
            reply,
        ));

        assert_eq!(receiver.await.unwrap().status, Status::InvalidOperation);
    }

    #[tokio::test]
    async fn queue_drains_before_the_master_exits() {
        let fixture = fixture();
        let mut receivers = Vec::new();
        for i in 0..64 {
            let (task, rx) = insert_task(&fixture, &format!("k{i}"), b"v");
            fixture.dispatcher.enqueue(task);
            receivers.push(rx);
        }

        fixture.stop.request_stop();
        fixture.dispatcher.wait_for_stop();

        for rx in receivers {
            assert_eq!(rx.await.unwrap().status, Status::Success);
        }
    }
}
