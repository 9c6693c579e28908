//! Packet-buffer pool
//!
//! A fixed-capacity pool of worst-case-frame-sized backing buffers.
//! `acquire()` hands out a `PooledBuffer` guard; dropping the guard
//! returns the slot to the pool. Backing storage is allocated lazily, one
//! slot at a time, up to the configured capacity.
//!
//! The pool is single-threaded by design; share it across sinks on one
//! thread, or add external synchronization.

use std::cell::RefCell;
use std::rc::Rc;

use crate::buffer::{BufferView, BufferWritableView, DEFAULT_PACKET_BUFFER_SIZE};
use crate::error::{NetError, NetResult};

/// Default number of slots in a pool
pub const DEFAULT_POOL_CAPACITY: usize = 1024;

#[derive(Debug)]
struct PoolInner {
    slot_size: usize,
    capacity: usize,
    /// Slots currently handed out
    outstanding: usize,
    /// Returned (or never-yet-used) slots ready for reuse
    free: Vec<Box<[u8]>>,
}

/// A pool of packet buffers with a fixed slot count.
#[derive(Clone)]
pub struct PacketBufferPool {
    inner: Rc<RefCell<PoolInner>>,
}

impl PacketBufferPool {
    /// Pool with `capacity` slots of `slot_size` bytes each.
    pub fn new(capacity: usize, slot_size: usize) -> Self {
        PacketBufferPool {
            inner: Rc::new(RefCell::new(PoolInner {
                slot_size,
                capacity,
                outstanding: 0,
                free: Vec::new(),
            })),
        }
    }

    /// Acquire a buffer, or fail with `CapacityExceeded` when every slot
    /// is busy.
    pub fn acquire(&self) -> NetResult<PooledBuffer> {
        let mut inner = self.inner.borrow_mut();

        if inner.outstanding == inner.capacity {
            return Err(NetError::CapacityExceeded {
                needed: 1,
                available: 0,
                context: "PacketBufferPool::acquire",
            });
        }

        let storage = match inner.free.pop() {
            Some(slot) => slot,
            None => vec![0u8; inner.slot_size].into_boxed_slice(),
        };

        inner.outstanding += 1;
        drop(inner);

        Ok(PooledBuffer {
            storage: Some(storage),
            pool: Rc::clone(&self.inner),
        })
    }

    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.inner.borrow().capacity
    }

    /// Number of slots not currently handed out.
    pub fn available(&self) -> usize {
        let inner = self.inner.borrow();
        inner.capacity - inner.outstanding
    }

    /// Size of each slot, in bytes.
    pub fn slot_size(&self) -> usize {
        self.inner.borrow().slot_size
    }
}

impl Default for PacketBufferPool {
    /// 1024 slots of `DEFAULT_PACKET_BUFFER_SIZE` (65600) bytes
    fn default() -> Self {
        PacketBufferPool::new(DEFAULT_POOL_CAPACITY, DEFAULT_PACKET_BUFFER_SIZE)
    }
}

/// A pool slot on loan. Returns to the pool on drop.
#[derive(Debug)]
pub struct PooledBuffer {
    storage: Option<Box<[u8]>>,
    pool: Rc<RefCell<PoolInner>>,
}

impl PooledBuffer {
    #[inline]
    pub fn len(&self) -> usize {
        self.storage().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        self.storage()
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.storage.as_deref_mut().unwrap_or(&mut [])
    }

    /// Read-only view over the whole slot.
    pub fn view(&self) -> BufferView<'_> {
        BufferView::new(self.as_slice())
    }

    /// Writable view over the whole slot.
    pub fn writable_view(&mut self) -> BufferWritableView<'_> {
        BufferWritableView::new(self.as_mut_slice())
    }

    /// Writable view over the first `length` bytes of the slot.
    pub fn writable_view_len(&mut self, length: usize) -> NetResult<BufferWritableView<'_>> {
        let mut view = self.writable_view();
        view.shrink_to(length)?;
        Ok(view)
    }

    #[inline]
    fn storage(&self) -> &[u8] {
        self.storage.as_deref().unwrap_or(&[])
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(storage) = self.storage.take() {
            let mut inner = self.pool.borrow_mut();
            inner.outstanding -= 1;
            inner.free.push(storage);
        }
    }
}
