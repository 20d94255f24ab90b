//! FFI bindings for lookflux
//!
//! C-compatible entry points for calling the pipeline from other languages.
//! All inputs are null-terminated UTF-8 strings. Returned strings are owned by
//! the caller and must be released with `lookflux_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::config::AnalysisConfig;
use crate::error::ComputeError;
use crate::pipeline::LookingTimeProcessor;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// NULL means the default configuration
unsafe fn config_from_ptr(config_json: *const c_char) -> Result<AnalysisConfig, ComputeError> {
    if config_json.is_null() {
        return Ok(AnalysisConfig::default());
    }
    match cstr_to_string(config_json) {
        Some(json) => AnalysisConfig::from_json(&json),
        None => Err(ComputeError::InvalidConfig(
            "config is not valid UTF-8".to_string(),
        )),
    }
}

fn finish(result: Result<String, ComputeError>) -> *mut c_char {
    match result {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Summarize a table bundle and return the payload JSON.
///
/// # Safety
/// - `tables_json` must be a valid null-terminated C string.
/// - `config_json` must be a valid null-terminated C string or NULL.
/// - Returns a newly allocated string that must be freed with `lookflux_free_string`.
/// - Returns NULL on error; call `lookflux_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn lookflux_summarize(
    tables_json: *const c_char,
    config_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let tables = match cstr_to_string(tables_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid tables string pointer");
            return ptr::null_mut();
        }
    };

    let result = config_from_ptr(config_json)
        .and_then(LookingTimeProcessor::new)
        .and_then(|processor| processor.summarize_json(&tables));
    finish(result)
}

// ============================================================================
// Stateful Processor API
// ============================================================================

/// Opaque handle to a LookingTimeProcessor
pub struct LookfluxProcessorHandle {
    processor: LookingTimeProcessor,
}

/// Create a processor bound to a configuration.
///
/// # Safety
/// - `config_json` must be a valid null-terminated C string or NULL.
/// - Must be freed with `lookflux_processor_free`.
/// - Returns NULL on an invalid configuration.
#[no_mangle]
pub unsafe extern "C" fn lookflux_processor_new(
    config_json: *const c_char,
) -> *mut LookfluxProcessorHandle {
    clear_last_error();

    match config_from_ptr(config_json).and_then(LookingTimeProcessor::new) {
        Ok(processor) => Box::into_raw(Box::new(LookfluxProcessorHandle { processor })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a processor.
///
/// # Safety
/// - `processor` must be a pointer returned by `lookflux_processor_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn lookflux_processor_free(processor: *mut LookfluxProcessorHandle) {
    if !processor.is_null() {
        drop(Box::from_raw(processor));
    }
}

/// Summarize a table bundle with a processor's configuration.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `lookflux_processor_new`.
/// - `tables_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `lookflux_free_string`.
/// - Returns NULL on error; call `lookflux_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn lookflux_processor_summarize(
    processor: *const LookfluxProcessorHandle,
    tables_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }

    let handle = &*processor;

    let tables = match cstr_to_string(tables_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid tables string pointer");
            return ptr::null_mut();
        }
    };

    finish(handle.processor.summarize_json(&tables))
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by lookflux functions.
///
/// # Safety
/// - `ptr` must be a pointer returned by a lookflux function, or NULL.
#[no_mangle]
pub unsafe extern "C" fn lookflux_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - The returned pointer is valid until the next lookflux call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn lookflux_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn lookflux_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
