//! MPI transport backend (requires the `mpi` feature and an MPI installation).
//!
//! Each rank is a separate OS process launched by `mpiexec`/`srun`. Messages
//! are opaque byte buffers sized with `MPI_Probe` before being received.
//!
//! # Example
//!
//! ```no_run
//! use treeduce::mpi::Mpi;
//! use treeduce::Transport;
//!
//! let mpi = Mpi::init().expect("Failed to initialize MPI");
//! let world = mpi.world();
//! println!("rank {} of {}", world.rank(), world.size());
//! // MPI is finalized when `mpi` goes out of scope
//! ```

use crate::error::{Error, Result};
use crate::ffi;
use crate::transport::Transport;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Global flag tracking whether MPI has been initialized
static MPI_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Shortest and longest pause between probes while waiting on a deadline
const POLL_MIN: Duration = Duration::from_micros(50);
const POLL_MAX: Duration = Duration::from_millis(10);

/// MPI thread support levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(i32)]
pub enum ThreadLevel {
    /// Only single-threaded execution
    Single = 0,
    /// Multi-threaded, but MPI calls only from main thread
    Funneled = 1,
    /// Multi-threaded, but MPI calls serialized by user
    Serialized = 2,
    /// Full multi-threaded support
    Multiple = 3,
}

/// MPI environment handle.
///
/// There can only be one instance at a time. When dropped, it finalizes MPI.
pub struct Mpi {
    thread_level: ThreadLevel,
    /// Marker to make Mpi !Send and !Sync
    _marker: PhantomData<*const ()>,
}

impl Mpi {
    /// Initialize MPI with single-threaded support.
    ///
    /// # Errors
    ///
    /// Returns an error if MPI is already initialized or if initialization fails.
    pub fn init() -> Result<Self> {
        Self::init_thread(ThreadLevel::Single)
    }

    /// Initialize MPI with the specified thread support level.
    pub fn init_thread(required: ThreadLevel) -> Result<Self> {
        if MPI_INITIALIZED.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyInitialized);
        }

        let mut provided: i32 = 0;
        let ret = unsafe { ffi::treeduce_mpi_init_thread(required as i32, &mut provided) };
        if ret != 0 {
            MPI_INITIALIZED.store(false, Ordering::SeqCst);
            return Err(Error::from_code(ret));
        }

        let thread_level = match provided {
            0 => ThreadLevel::Single,
            1 => ThreadLevel::Funneled,
            2 => ThreadLevel::Serialized,
            _ => ThreadLevel::Multiple,
        };

        Ok(Mpi {
            thread_level,
            _marker: PhantomData,
        })
    }

    /// Thread support level actually provided.
    pub fn thread_level(&self) -> ThreadLevel {
        self.thread_level
    }

    /// Handle to `MPI_COMM_WORLD`.
    pub fn world(&self) -> Communicator<'_> {
        Communicator {
            _mpi: PhantomData,
        }
    }

    /// Whether the MPI library reports itself initialized.
    pub fn is_initialized() -> bool {
        let mut flag: i32 = 0;
        unsafe { ffi::treeduce_mpi_initialized(&mut flag) };
        flag != 0
    }

    /// Whether MPI has already been finalized.
    pub fn is_finalized() -> bool {
        let mut flag: i32 = 0;
        unsafe { ffi::treeduce_mpi_finalized(&mut flag) };
        flag != 0
    }

    /// High-resolution wall-clock time in seconds.
    pub fn wtime() -> f64 {
        unsafe { ffi::treeduce_mpi_wtime() }
    }

    /// MPI library version string.
    pub fn version() -> Result<String> {
        let mut buf = [0u8; 8192];
        let mut len: i32 = 0;
        let ret =
            unsafe { ffi::treeduce_mpi_get_version(buf.as_mut_ptr().cast(), &mut len) };
        Error::check(ret)?;
        let len = (len.max(0) as usize).min(buf.len());
        let s = std::str::from_utf8(&buf[..len])
            .map_err(|_| Error::Internal("Invalid UTF-8 in version string".into()))?;
        Ok(s.trim_end_matches(['\0', '\n']).to_string())
    }
}

impl Drop for Mpi {
    fn drop(&mut self) {
        if MPI_INITIALIZED.load(Ordering::SeqCst) {
            if !Self::is_finalized() {
                unsafe {
                    ffi::treeduce_mpi_finalize();
                }
            }
            MPI_INITIALIZED.store(false, Ordering::SeqCst);
        }
    }
}

/// `MPI_COMM_WORLD`, borrowed from the live [`Mpi`] environment.
pub struct Communicator<'a> {
    _mpi: PhantomData<&'a Mpi>,
}

impl Communicator<'_> {
    /// Name of the node this process runs on.
    pub fn processor_name(&self) -> Result<String> {
        let mut buf = [0u8; 256];
        let mut len: i32 = 0;
        let ret = unsafe { ffi::treeduce_mpi_get_processor_name(buf.as_mut_ptr().cast(), &mut len) };
        Error::check(ret)?;
        let len = (len.max(0) as usize).min(buf.len());
        let s = std::str::from_utf8(&buf[..len])
            .map_err(|_| Error::Internal("Invalid UTF-8 in processor name".into()))?;
        Ok(s.to_string())
    }

    /// Barrier synchronization.
    pub fn barrier(&self) -> Result<()> {
        Error::check(unsafe { ffi::treeduce_mpi_barrier() })
    }

    fn rank_arg(&self, rank: usize) -> Result<i32> {
        let size = self.size();
        if rank >= size {
            return Err(Error::InvalidRank { rank, size });
        }
        Ok(rank as i32)
    }

    fn recv_exact(&self, source: i32, tag: i32, count: i64) -> Result<Vec<u8>> {
        let len = usize::try_from(count)
            .map_err(|_| Error::Internal(format!("negative message size {count}")))?;
        let mut buf = vec![0u8; len];
        let ret = unsafe {
            ffi::treeduce_mpi_recv_bytes(buf.as_mut_ptr().cast(), count, source, tag)
        };
        Error::check(ret)?;
        Ok(buf)
    }
}

impl Transport for Communicator<'_> {
    fn rank(&self) -> usize {
        let mut rank: i32 = 0;
        unsafe { ffi::treeduce_mpi_comm_rank(&mut rank) };
        rank as usize
    }

    fn size(&self) -> usize {
        let mut size: i32 = 0;
        unsafe { ffi::treeduce_mpi_comm_size(&mut size) };
        size as usize
    }

    fn send(&self, dest: usize, tag: i32, payload: &[u8]) -> Result<()> {
        let dest = self.rank_arg(dest)?;
        let ret = unsafe {
            ffi::treeduce_mpi_send_bytes(payload.as_ptr().cast(), payload.len() as i64, dest, tag)
        };
        Error::check(ret)
    }

    /// Posts a nonblocking send and polls it until `timeout`, then cancels it.
    ///
    /// A blocking `MPI_Send` above the eager limit waits for a matching receive,
    /// which never comes once the receiver has given up on this round.
    fn send_within(
        &self,
        dest: usize,
        tag: i32,
        payload: &[u8],
        timeout: Option<Duration>,
    ) -> Result<bool> {
        let Some(deadline) = timeout.and_then(|t| Instant::now().checked_add(t)) else {
            return self.send(dest, tag, payload).map(|()| true);
        };
        let dest = self.rank_arg(dest)?;

        let mut request: i64 = 0;
        Error::check(unsafe {
            ffi::treeduce_mpi_isend_bytes(
                payload.as_ptr().cast(),
                payload.len() as i64,
                dest,
                tag,
                &mut request,
            )
        })?;

        // `payload` outlives the request: every path below completes or cancels it.
        let mut pause = POLL_MIN;
        loop {
            let mut flag: i32 = 0;
            Error::check(unsafe { ffi::treeduce_mpi_test(request, &mut flag) })?;
            if flag != 0 {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                let mut cancelled: i32 = 0;
                Error::check(unsafe { ffi::treeduce_mpi_cancel(request, &mut cancelled) })?;
                return Ok(cancelled == 0);
            }
            thread::sleep(pause.min(deadline - now));
            pause = (pause * 2).min(POLL_MAX);
        }
    }

    fn recv(&self, source: usize, tag: i32, timeout: Option<Duration>) -> Result<Option<Vec<u8>>> {
        let source = self.rank_arg(source)?;

        let Some(deadline) = timeout.and_then(|t| Instant::now().checked_add(t)) else {
            let mut count: i64 = 0;
            Error::check(unsafe { ffi::treeduce_mpi_probe_bytes(source, tag, &mut count) })?;
            return self.recv_exact(source, tag, count).map(Some);
        };

        let mut pause = POLL_MIN;
        loop {
            let mut flag: i32 = 0;
            let mut count: i64 = 0;
            Error::check(unsafe {
                ffi::treeduce_mpi_iprobe_bytes(source, tag, &mut flag, &mut count)
            })?;
            if flag != 0 {
                return self.recv_exact(source, tag, count).map(Some);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            thread::sleep(pause.min(deadline - now));
            pause = (pause * 2).min(POLL_MAX);
        }
    }

    fn abort(&self, code: i32) -> Result<()> {
        // MPI_Abort does not return on success.
        Error::check(unsafe { ffi::treeduce_mpi_abort(code) })
    }
}
