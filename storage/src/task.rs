//! Object request and IO task types moved between the management services
//! and the IO dispatchers.

use std::sync::Arc;

use cellar_common::Status;
use log::debug;
use tokio::sync::oneshot;

use crate::container::Container;
use crate::LOG_TARGET;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectOptype {
    Insert,
    Get,
    Remove,
}

/// A parsed, validated object operation.
#[derive(Debug)]
pub struct ObjectRequest {
    pub optype: ObjectOptype,
    pub container_name: String,
    pub object_id: String,
    pub object_data: Vec<u8>,
}

impl ObjectRequest {
    pub fn insert(container_name: String, object_id: String, object_data: Vec<u8>) -> Self {
        Self {
            optype: ObjectOptype::Insert,
            container_name,
            object_id,
            object_data,
        }
    }

    pub fn get(container_name: String, object_id: String) -> Self {
        Self {
            optype: ObjectOptype::Get,
            container_name,
            object_id,
            object_data: Vec::new(),
        }
    }

    pub fn remove(container_name: String, object_id: String) -> Self {
        Self {
            optype: ObjectOptype::Remove,
            container_name,
            object_id,
            object_data: Vec::new(),
        }
    }
}

/// Terminal outcome of an object operation.
#[derive(Debug)]
pub struct ObjectResponse {
    pub status: Status,
    pub object_data: Option<Vec<u8>>,
}

impl ObjectResponse {
    pub fn status(status: Status) -> Self {
        Self {
            status,
            object_data: None,
        }
    }

    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            status: Status::Success,
            object_data: Some(data),
        }
    }
}

/// Invoke-once reply handle completing the client's request.
#[derive(Debug)]
pub struct ReplyHandle {
    sender: oneshot::Sender<ObjectResponse>,
}

impl ReplyHandle {
    pub fn channel() -> (Self, oneshot::Receiver<ObjectResponse>) {
        let (sender, receiver) = oneshot::channel();
        (Self { sender }, receiver)
    }

    /// Completes the request. Consumes the handle; a reply can only ever be
    /// sent once.
    pub fn reply(self, response: ObjectResponse) {
        if self.sender.send(response).is_err() {
            debug!(
                target: LOG_TARGET,
                "Dropped an object operation response; the requester is gone."
            );
        }
    }
}

/// A unit of work handed to an IO dispatcher.
///
/// Carries a shared container reference keeping the engine handle alive for
/// the full duration of the task. Tasks are moved, never copied.
pub struct ObjectIoTask {
    pub request: ObjectRequest,
    pub container: Arc<Container>,
    pub reply: ReplyHandle,
}

impl ObjectIoTask {
    pub fn new(request: ObjectRequest, container: Arc<Container>, reply: ReplyHandle) -> Self {
        Self {
            request,
            container,
            reply,
        }
    }
}
