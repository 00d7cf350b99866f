//! Raw FFI bindings to the C shim in `csrc/treeduce_mpi.c`.
//!
//! These are low-level unsafe functions. Use the safe wrappers in [`crate::mpi`].

#![allow(non_camel_case_types)]

use std::os::raw::{c_char, c_double, c_int, c_void};

// Type aliases matching the C header
pub type int32_t = i32;
pub type int64_t = i64;

extern "C" {
    // ============================================================
    // Initialization and Finalization
    // ============================================================

    pub fn treeduce_mpi_init_thread(required: c_int, provided: *mut c_int) -> c_int;
    pub fn treeduce_mpi_finalize() -> c_int;
    pub fn treeduce_mpi_initialized(flag: *mut c_int) -> c_int;
    pub fn treeduce_mpi_finalized(flag: *mut c_int) -> c_int;

    // ============================================================
    // Communicator Queries
    // ============================================================

    pub fn treeduce_mpi_comm_rank(rank: *mut int32_t) -> c_int;
    pub fn treeduce_mpi_comm_size(size: *mut int32_t) -> c_int;
    pub fn treeduce_mpi_barrier() -> c_int;

    // ============================================================
    // Point-to-Point Byte Messages
    // ============================================================

    pub fn treeduce_mpi_send_bytes(
        buf: *const c_void,
        count: int64_t,
        dest: int32_t,
        tag: int32_t,
    ) -> c_int;

    /// Blocking probe; writes the byte count of the matched message.
    pub fn treeduce_mpi_probe_bytes(source: int32_t, tag: int32_t, count: *mut int64_t) -> c_int;

    /// Nonblocking probe; `flag` is nonzero when a message is pending.
    pub fn treeduce_mpi_iprobe_bytes(
        source: int32_t,
        tag: int32_t,
        flag: *mut int32_t,
        count: *mut int64_t,
    ) -> c_int;

    pub fn treeduce_mpi_recv_bytes(
        buf: *mut c_void,
        count: int64_t,
        source: int32_t,
        tag: int32_t,
    ) -> c_int;

    /// Nonblocking send; `request` receives a handle released by
    /// [`treeduce_mpi_test`] on completion or by [`treeduce_mpi_cancel`].
    pub fn treeduce_mpi_isend_bytes(
        buf: *const c_void,
        count: int64_t,
        dest: int32_t,
        tag: int32_t,
        request: *mut int64_t,
    ) -> c_int;

    pub fn treeduce_mpi_test(request: int64_t, flag: *mut int32_t) -> c_int;

    /// Cancel and complete a pending send; `cancelled` is zero if it was delivered anyway.
    pub fn treeduce_mpi_cancel(request: int64_t, cancelled: *mut int32_t) -> c_int;

    // ============================================================
    // Utility Functions
    // ============================================================

    pub fn treeduce_mpi_get_version(version: *mut c_char, len: *mut int32_t) -> c_int;
    pub fn treeduce_mpi_get_processor_name(name: *mut c_char, len: *mut int32_t) -> c_int;
    pub fn treeduce_mpi_wtime() -> c_double;
    pub fn treeduce_mpi_abort(errorcode: int32_t) -> c_int;
}
