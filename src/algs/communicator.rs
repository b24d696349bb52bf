//! Thin façade over intra-process (threads) or inter-process (MPI) message passing.
//!
//! Messages are contiguous byte slices. Sends and receives return waitable
//! handles; a receive handle yields the payload from `.wait()`.

use std::sync::Arc;
use std::thread::JoinHandle;

use bytes::Bytes;
use dashmap::DashMap;
use log::error;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

/// Non-blocking point-to-point communication between ranks.
pub trait Communicator {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    /// This process's rank in `0..size()`.
    fn rank(&self) -> usize;
    /// Number of ranks.
    fn size(&self) -> usize;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    /// Post a receive of at most `buf.len()` bytes.
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

/// Single-rank communicator for serial runs.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}

    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) {}
}

// --- RayonComm: ranks as threads of one process ---
type Key = (usize, usize, u16); // (src, dst, tag)

static MAILBOX: Lazy<DashMap<Key, Bytes>> = Lazy::new(DashMap::new);

pub struct LocalHandle {
    buf: Arc<Mutex<Option<Vec<u8>>>>,
    handle: Option<JoinHandle<()>>,
}

impl Wait for LocalHandle {
    fn wait(mut self) -> Option<Vec<u8>> {
        if let Some(handle) = self.handle.take() {
            if let Err(payload) = handle.join() {
                error!("receiver thread panicked");
                std::panic::resume_unwind(payload);
            }
        }
        self.buf.lock().take()
    }
}

/// In-process communicator; one instance per rank thread.
///
/// All instances share a process-wide mailbox, so concurrent groups must
/// use distinct tags.
#[derive(Clone, Debug)]
pub struct RayonComm {
    rank: usize,
    size: usize,
}

impl RayonComm {
    pub fn new(rank: usize, size: usize) -> Self {
        Self { rank, size }
    }
}

impl Communicator for RayonComm {
    type SendHandle = ();
    type RecvHandle = LocalHandle;

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
        let key = (self.rank, peer, tag);
        MAILBOX.insert(key, Bytes::copy_from_slice(buf));
    }

    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle {
        let key = (peer, self.rank, tag);
        let slot = Arc::new(Mutex::new(None));
        let slot_clone = slot.clone();
        let max_len = buf.len();
        let handle = std::thread::spawn(move || {
            loop {
                if let Some((_, bytes)) = MAILBOX.remove(&key) {
                    let n = max_len.min(bytes.len());
                    *slot_clone.lock() = Some(bytes[..n].to_vec());
                    break;
                }
                std::thread::yield_now();
            }
        });
        LocalHandle {
            buf: slot,
            handle: Some(handle),
        }
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::{Communicator, Wait};
    use crate::mesh_error::MeshStreamError;
    use mpi::Tag;
    use mpi::environment::Universe;
    use mpi::request::{Request, StaticScope};
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::{Communicator as _, Destination, Source};

    pub struct MpiComm {
        _universe: Universe,
        world: SimpleCommunicator,
        rank: usize,
        size: usize,
    }

    impl MpiComm {
        pub fn new() -> Result<Self, MeshStreamError> {
            let universe = mpi::initialize()
                .ok_or_else(|| MeshStreamError::Communication("MPI already initialized".into()))?;
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Ok(Self {
                _universe: universe,
                world,
                rank,
                size,
            })
        }
    }

    /// Pending send together with the bytes it reads from.
    pub struct MpiSendHandle {
        req: Option<Request<'static, [u8], StaticScope>>,
        // released only after `req` completes
        _buf: Box<[u8]>,
    }

    impl MpiSendHandle {
        fn complete(&mut self) {
            if let Some(req) = self.req.take() {
                req.wait();
            }
        }
    }

    impl Wait for MpiSendHandle {
        fn wait(mut self) -> Option<Vec<u8>> {
            self.complete();
            None
        }
    }

    impl Drop for MpiSendHandle {
        fn drop(&mut self) {
            self.complete();
        }
    }

    pub struct MpiRecvHandle {
        world: SimpleCommunicator,
        peer: i32,
        tag: Tag,
        max_len: usize,
    }

    impl Wait for MpiRecvHandle {
        fn wait(self) -> Option<Vec<u8>> {
            let (mut data, _status) = self
                .world
                .process_at_rank(self.peer)
                .receive_vec_with_tag::<u8>(self.tag);
            data.truncate(self.max_len);
            Some(data)
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiSendHandle;
        type RecvHandle = MpiRecvHandle;

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> MpiSendHandle {
            let owned: Box<[u8]> = buf.into();
            // SAFETY: the heap bytes do not move with the box, and the handle
            // completes `req` before dropping the box.
            let bytes: &'static [u8] = unsafe { &*(owned.as_ref() as *const [u8]) };
            let req = self
                .world
                .process_at_rank(peer as i32)
                .immediate_send_with_tag(StaticScope, bytes, Tag::from(tag));
            MpiSendHandle {
                req: Some(req),
                _buf: owned,
            }
        }

        fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> MpiRecvHandle {
            MpiRecvHandle {
                world: self.world.duplicate(),
                peer: peer as i32,
                tag: Tag::from(tag),
                max_len: buf.len(),
            }
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn rayon_roundtrip_two_ranks() {
        let comm0 = RayonComm::new(0, 2);
        let comm1 = RayonComm::new(1, 2);

        let mut recv_buf = [0u8; 4];
        let recv_handle = comm1.irecv(0, 7, &mut recv_buf);
        let send_handle = comm0.isend(1, 7, &[1, 2, 3, 4]);
        send_handle.wait();

        let data = recv_handle
            .wait()
            .expect("Expected to receive data from rank 0");
        recv_buf.copy_from_slice(&data);
        assert_eq!(&recv_buf, &[1, 2, 3, 4]);
    }

    #[test]
    #[serial]
    fn receive_truncates_to_buffer() {
        let comm0 = RayonComm::new(0, 2);
        let comm1 = RayonComm::new(1, 2);
        comm1.isend(0, 8, &[9, 8, 7]);
        let mut buf = [0u8; 2];
        assert_eq!(comm0.irecv(1, 8, &mut buf).wait(), Some(vec![9, 8]));
    }

    #[test]
    #[should_panic(expected = "mailbox poisoned")]
    fn receiver_panic_reaches_the_waiter() {
        let handle = LocalHandle {
            buf: Arc::new(Mutex::new(None)),
            handle: Some(std::thread::spawn(|| panic!("mailbox poisoned"))),
        };
        handle.wait();
    }

    #[cfg(feature = "mpi-support")]
    #[test]
    fn mpi_self_send_outlives_the_caller_buffer() {
        let comm = MpiComm::new().expect("MPI init");
        let me = comm.rank();
        let mut recv = [0u8; 3];
        let handle = {
            let scratch = vec![4u8, 5, 6];
            comm.isend(me, 11, &scratch)
        };
        assert_eq!(comm.irecv(me, 11, &mut recv).wait(), Some(vec![4, 5, 6]));
        assert_eq!(handle.wait(), None);
        // dropping an unwaited send completes it
        drop(comm.isend(me, 12, &[1]));
        assert_eq!(comm.irecv(me, 12, &mut recv).wait(), Some(vec![1]));
    }

    #[test]
    fn no_comm_is_a_single_rank() {
        let comm = NoComm;
        assert_eq!((comm.rank(), comm.size()), (0, 1));
        assert_eq!(comm.irecv(0, 1, &mut []).wait(), None);
    }
}
