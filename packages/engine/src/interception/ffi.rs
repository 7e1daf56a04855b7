// packages/engine/src/interception/ffi.rs
//! C entry points loaded by the runtime's profiling interface
//!
//! The shared library exports the `kokkosp_*` symbols the runtime looks up
//! with `dlsym`. Each one decodes its C arguments and forwards to the global
//! [`ProfilingHooks`](super::callbacks::ProfilingHooks). Initialization and
//! finalization failures are fatal: a one-line diagnostic on stderr, exit 1.
//!
//! Every entry point runs inside `catch_unwind` so a panic in the recorder
//! never unwinds into the runtime's C++ frames; it is logged and the callback
//! becomes a no-op.

use crate::interception::callbacks::global;
use crate::observability::init_tracing;
use crate::recording::schema::NULL_NAME;
use crate::utils::config::RecorderConfig;
use std::borrow::Cow;
use std::ffi::{c_char, c_int, c_void, CStr};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::error;

/// Memory space descriptor passed by value by the runtime
#[repr(C)]
#[derive(Clone, Copy)]
pub struct SpaceHandle {
    pub name: [c_char; 64],
}

impl SpaceHandle {
    /// Space name up to the first NUL (or all 64 bytes if unterminated)
    pub fn name(&self) -> String {
        let bytes: Vec<u8> = self.name.iter().map(|&c| c as u8).collect();
        match CStr::from_bytes_until_nul(&bytes) {
            Ok(name) => name.to_string_lossy().into_owned(),
            Err(_) => String::from_utf8_lossy(&bytes).into_owned(),
        }
    }
}

/// Borrow a C string, substituting the placeholder for null
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string that outlives `'a`.
unsafe fn c_str<'a>(ptr: *const c_char) -> Cow<'a, str> {
    if ptr.is_null() {
        Cow::Borrowed(NULL_NAME)
    } else {
        CStr::from_ptr(ptr).to_string_lossy()
    }
}

fn fatal(context: &str, err: impl std::fmt::Display) -> ! {
    eprintln!("kts: fatal: {}: {}", context, err);
    std::process::exit(1);
}

/// Run one callback body, stopping a panic at the C boundary
fn guarded<F: FnOnce()>(entry: &str, body: F) {
    if catch_unwind(AssertUnwindSafe(body)).is_err() {
        error!("{} panicked; callback ignored", entry);
    }
}

/// Store an id through the runtime's out-pointer
///
/// # Safety
/// `k_id` must be null or writable.
unsafe fn write_id(k_id: *mut u64, id: u64) {
    if k_id.is_null() {
        return;
    }
    *k_id = id;
}

#[no_mangle]
pub extern "C" fn kokkosp_init_library(
    _load_seq: c_int,
    _interface_ver: u64,
    _dev_info_count: u32,
    _device_info: *mut c_void,
) {
    guarded("kokkosp_init_library", || {
        init_tracing();
        
        let config = match RecorderConfig::load() {
            Ok(config) => config,
            Err(e) => fatal("init", e),
        };
        if let Err(e) = global().init_library(&config) {
            fatal("init", e);
        }
    });
}

#[no_mangle]
pub extern "C" fn kokkosp_finalize_library() {
    guarded("kokkosp_finalize_library", || {
        if let Err(e) = global().finalize_library() {
            fatal("finalize", e);
        }
    });
}

/// # Safety
/// `name` must be null or NUL-terminated; `k_id` must be null or writable.
#[no_mangle]
pub unsafe extern "C" fn kokkosp_begin_parallel_for(name: *const c_char, dev_id: u32, k_id: *mut u64) {
    guarded("kokkosp_begin_parallel_for", || {
        let id = global().begin_parallel_for(&c_str(name), dev_id);
        write_id(k_id, id);
    });
}

#[no_mangle]
pub extern "C" fn kokkosp_end_parallel_for(k_id: u64) {
    guarded("kokkosp_end_parallel_for", || global().end_parallel_for(k_id));
}

/// # Safety
/// `name` must be null or NUL-terminated.
#[no_mangle]
pub unsafe extern "C" fn kokkosp_push_profile_region(name: *const c_char) {
    guarded("kokkosp_push_profile_region", || {
        global().push_profile_region(&c_str(name));
    });
}

#[no_mangle]
pub extern "C" fn kokkosp_pop_profile_region() {
    guarded("kokkosp_pop_profile_region", || global().pop_profile_region());
}

/// # Safety
/// `dst_name` and `src_name` must be null or NUL-terminated.
#[no_mangle]
pub unsafe extern "C" fn kokkosp_begin_deep_copy(
    dst_handle: SpaceHandle,
    dst_name: *const c_char,
    _dst_ptr: *const c_void,
    src_handle: SpaceHandle,
    src_name: *const c_char,
    _src_ptr: *const c_void,
    size: u64,
) {
    guarded("kokkosp_begin_deep_copy", || {
        global().begin_deep_copy(
            &dst_handle.name(),
            &c_str(dst_name),
            &src_handle.name(),
            &c_str(src_name),
            size,
        );
    });
}

/// # Safety
/// `name` must be null or NUL-terminated; `k_id` must be null or writable.
#[no_mangle]
pub unsafe extern "C" fn kokkosp_begin_fence(name: *const c_char, dev_id: u32, k_id: *mut u64) {
    guarded("kokkosp_begin_fence", || {
        let id = global().begin_fence(&c_str(name), dev_id);
        write_id(k_id, id);
    });
}

/// Untracked fence ids are dropped by the hooks
#[no_mangle]
pub extern "C" fn kokkosp_end_fence(k_id: u64) {
    guarded("kokkosp_end_fence", || global().end_fence(k_id));
}

/// # Safety
/// `name` must be null or NUL-terminated.
#[no_mangle]
pub unsafe extern "C" fn kokkosp_allocate_data(
    handle: SpaceHandle,
    name: *const c_char,
    _ptr: *const c_void,
    size: u64,
) {
    guarded("kokkosp_allocate_data", || {
        global().allocate_data(&handle.name(), &c_str(name), size);
    });
}

/// # Safety
/// `name` must be null or NUL-terminated.
#[no_mangle]
pub unsafe extern "C" fn kokkosp_deallocate_data(
    handle: SpaceHandle,
    name: *const c_char,
    _ptr: *const c_void,
    size: u64,
) {
    guarded("kokkosp_deallocate_data", || {
        global().deallocate_data(&handle.name(), &c_str(name), size);
    });
}

/// # Safety
/// `name` must be null or NUL-terminated.
#[no_mangle]
pub unsafe extern "C" fn kokkosp_profile_event(name: *const c_char) {
    guarded("kokkosp_profile_event", || global().profile_event(&c_str(name)));
}
