//! Model-byte distribution across a group of cooperating workers.
//!
//! Exactly one member (rank 0) reads the model file and every other member
//! receives a private copy of the bytes. The call is collective: all members
//! must call [`Distributor::acquire`] in the same order relative to other
//! collective calls, otherwise the group deadlocks.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use crossbeam::channel::{self, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::{Error, ModelBuffer, Result};

pub trait Distributor: Send + Sync {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    /// Returns the model bytes for `path`. Only rank 0 reads the file.
    fn acquire(&self, path: &Path) -> Result<ModelBuffer>;
}

/// Degenerate group of one: a direct local read.
#[derive(Clone, Copy, Debug, Default)]
pub struct SingleProcess;

impl Distributor for SingleProcess {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn acquire(&self, path: &Path) -> Result<ModelBuffer> {
        ModelBuffer::from_path(path)
    }
}

enum Payload {
    Model(Bytes),
    Failed(String),
}

struct Broadcast {
    path: PathBuf,
    len: usize,
    payload: Payload,
}

enum Role {
    Root { peers: Vec<Sender<Broadcast>> },
    Peer { inbox: Receiver<Broadcast> },
}

/// One participant of an in-process [`ThreadGroup`].
pub struct GroupMember {
    rank: usize,
    size: usize,
    role: Role,
}

/// In-process collective over channels, for worker threads that each own a
/// model instance.
pub struct ThreadGroup;

impl ThreadGroup {
    /// Creates `size` members; member `i` has rank `i`.
    pub fn new(size: usize) -> Vec<GroupMember> {
        let size = size.max(1);
        let (peers, inboxes): (Vec<_>, Vec<_>) = (1..size).map(|_| channel::bounded(1)).unzip();

        let mut members = Vec::with_capacity(size);
        members.push(GroupMember {
            rank: 0,
            size,
            role: Role::Root { peers },
        });
        for (i, inbox) in inboxes.into_iter().enumerate() {
            members.push(GroupMember {
                rank: i + 1,
                size,
                role: Role::Peer { inbox },
            });
        }
        members
    }
}

impl GroupMember {
    fn broadcast(&self, peers: &[Sender<Broadcast>], path: &Path, payload: &Payload, len: usize) {
        for (i, peer) in peers.iter().enumerate() {
            let payload = match payload {
                Payload::Model(bytes) => Payload::Model(bytes.clone()),
                Payload::Failed(reason) => Payload::Failed(reason.clone()),
            };
            let msg = Broadcast {
                path: path.to_path_buf(),
                len,
                payload,
            };
            if peer.send(msg).is_err() {
                warn!(peer = i + 1, "group member left before model broadcast");
            }
        }
    }

    fn receive(&self, inbox: &Receiver<Broadcast>, path: &Path) -> Result<ModelBuffer> {
        let fail = |reason: String| Error::Distribution {
            rank: self.rank,
            reason,
        };

        let msg = inbox
            .recv()
            .map_err(|_| fail("rank 0 left the group without broadcasting".to_string()))?;
        if msg.path != path {
            warn!(
                rank = self.rank,
                local = %path.display(),
                root = %msg.path.display(),
                "model path differs from rank 0; using rank 0's bytes"
            );
        }

        match msg.payload {
            Payload::Failed(reason) => Err(fail(format!(
                "rank 0 could not read {}: {reason}",
                msg.path.display()
            ))),
            Payload::Model(bytes) => {
                if bytes.is_empty() || bytes.len() != msg.len {
                    return Err(fail(format!(
                        "expected {} model bytes, received {}",
                        msg.len,
                        bytes.len()
                    )));
                }
                debug!(rank = self.rank, bytes = msg.len, "received model broadcast");
                Ok(ModelBuffer::copy_from_slice(&bytes))
            }
        }
    }
}

impl Distributor for GroupMember {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn acquire(&self, path: &Path) -> Result<ModelBuffer> {
        match &self.role {
            Role::Root { peers } => match ModelBuffer::from_path(path) {
                Ok(buffer) => {
                    let payload = Payload::Model(buffer.bytes().clone());
                    self.broadcast(peers, path, &payload, buffer.size());
                    info!(
                        path = %path.display(),
                        bytes = buffer.size(),
                        peers = peers.len(),
                        "broadcast model"
                    );
                    Ok(buffer)
                }
                Err(err) => {
                    self.broadcast(peers, path, &Payload::Failed(err.to_string()), 0);
                    Err(err)
                }
            },
            Role::Peer { inbox } => self.receive(inbox, path),
        }
    }
}
