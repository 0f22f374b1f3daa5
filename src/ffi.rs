//! C-compatible FFI API for non-Rust hosts.
//!
//! # ABI Contract
//!
//! All exported functions use `extern "C"` calling convention and `#[no_mangle]`
//! to ensure stable symbol names.
//!
//! ## Memory management
//! - Buffers returned by `snapforge_*` functions are allocated on the Rust heap.
//! - Callers **must** free them with `snapforge_free_buffer` / `snapforge_free_string`.
//! - Passing a null pointer to a free function is a no-op.
//!
//! ## Error handling
//! - Functions that can fail return a `c_int` (0 = success, non-zero = error).
//! - Error details can be retrieved via `snapforge_last_error`.
//!
//! ## Thread safety
//! - `snapforge_last_error` uses a thread-local, so it is safe to call from
//!   multiple threads.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::ptr;
use std::slice;

use crate::content::{ContentRef, LiveContent, Theme};
use crate::error::ExportError;
use crate::pipeline::{ExportOptions, Exporter};

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg.replace('\0', " ")).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| *e.borrow_mut() = None);
}

/// Return codes of the `snapforge_export_*` functions.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapforgeStatus {
    Ok = 0,
    NullArgument = 1,
    InvalidUtf8 = 2,
    TooLarge = 3,
    ContentUnavailable = 10,
    RasterizationFailed = 11,
    AssemblyFailed = 12,
    InvalidOptions = 13,
    Io = 14,
}

impl From<&ExportError> for SnapforgeStatus {
    fn from(err: &ExportError) -> Self {
        match err {
            ExportError::ContentUnavailable { .. } => SnapforgeStatus::ContentUnavailable,
            ExportError::RasterizationFailed { .. } => SnapforgeStatus::RasterizationFailed,
            ExportError::AssemblyFailed { .. } => SnapforgeStatus::AssemblyFailed,
            ExportError::InvalidOptions(_) => SnapforgeStatus::InvalidOptions,
            ExportError::Io(_) => SnapforgeStatus::Io,
        }
    }
}

/// # Safety
/// `ptr` must be null or point to `len` readable bytes.
unsafe fn utf8_arg<'a>(ptr: *const u8, len: u32, what: &str) -> Result<&'a str, c_int> {
    if ptr.is_null() {
        set_last_error(&format!("Null pointer argument: {what}"));
        return Err(SnapforgeStatus::NullArgument as c_int);
    }
    std::str::from_utf8(slice::from_raw_parts(ptr, len as usize)).map_err(|e| {
        set_last_error(&format!("Invalid UTF-8 in {what}: {e}"));
        SnapforgeStatus::InvalidUtf8 as c_int
    })
}

/// # Safety
/// `out_buf` and `out_len` must be valid for writes.
unsafe fn hand_over(bytes: Vec<u8>, out_buf: *mut *mut u8, out_len: *mut u32) -> c_int {
    let Ok(len) = u32::try_from(bytes.len()) else {
        set_last_error("Exported document exceeds 4 GiB");
        return SnapforgeStatus::TooLarge as c_int;
    };
    let buf = bytes.into_boxed_slice();
    *out_buf = Box::into_raw(buf) as *mut u8;
    *out_len = len;
    SnapforgeStatus::Ok as c_int
}

fn export_markup(html: &str, title: &str, options: Option<&str>) -> Result<(Vec<u8>, String), ExportError> {
    let doc = LiveContent::from_html(html, Theme::default());
    let exporter = Exporter::new();
    let outcome = match options {
        Some(json) => {
            let options = ExportOptions::from_json(json)?;
            exporter.export_generic(&ContentRef::new(&doc), title, &options)?
        }
        None => exporter.export_report(&ContentRef::new(&doc), title)?,
    };
    for w in &outcome.warnings {
        log::warn!("{w}");
    }
    Ok((outcome.file.bytes, outcome.plan.to_json()))
}

// ---------------------------------------------------------------------------
// Core API
// ---------------------------------------------------------------------------

/// Export an HTML screen to PDF bytes with the default options.
///
/// # Parameters
/// - `html_ptr`, `html_len`: UTF-8 HTML bytes (not necessarily null-terminated)
/// - `title_ptr`, `title_len`: UTF-8 document title
/// - `out_buf`, `out_len`: on success, receive the heap-allocated PDF bytes
///
/// # Returns
/// A [`SnapforgeStatus`]: `0` on success, non-zero on error. On error, call `snapforge_last_error`.
///
/// # Safety
/// - `html_ptr` must point to `html_len` valid bytes, `title_ptr` to `title_len`.
/// - `out_buf` and `out_len` must be valid pointers.
/// - The caller must free `*out_buf` by calling `snapforge_free_buffer`.
#[no_mangle]
pub unsafe extern "C" fn snapforge_export_report(
    html_ptr: *const u8,
    html_len: u32,
    title_ptr: *const u8,
    title_len: u32,
    out_buf: *mut *mut u8,
    out_len: *mut u32,
) -> c_int {
    snapforge_export_generic(html_ptr, html_len, title_ptr, title_len, ptr::null(), out_buf, out_len)
}

/// Export an HTML screen to PDF bytes with options given as JSON.
///
/// `options_json` is a null-terminated UTF-8 `ExportOptions` document; pass
/// `NULL` for the defaults. Missing fields take their defaults.
///
/// # Safety
/// Same as `snapforge_export_report`. `options_json`, if non-null, must be a
/// valid null-terminated string.
#[no_mangle]
pub unsafe extern "C" fn snapforge_export_generic(
    html_ptr: *const u8,
    html_len: u32,
    name_ptr: *const u8,
    name_len: u32,
    options_json: *const c_char,
    out_buf: *mut *mut u8,
    out_len: *mut u32,
) -> c_int {
    clear_last_error();
    if out_buf.is_null() || out_len.is_null() {
        set_last_error("Null pointer argument: output");
        return SnapforgeStatus::NullArgument as c_int;
    }
    let html = match utf8_arg(html_ptr, html_len, "html") {
        Ok(s) => s,
        Err(rc) => return rc,
    };
    let name = match utf8_arg(name_ptr, name_len, "title") {
        Ok(s) => s,
        Err(rc) => return rc,
    };
    let options = if options_json.is_null() {
        None
    } else {
        match CStr::from_ptr(options_json).to_str() {
            Ok(s) => Some(s),
            Err(e) => {
                set_last_error(&format!("Invalid UTF-8 in options: {e}"));
                return SnapforgeStatus::InvalidUtf8 as c_int;
            }
        }
    };

    match export_markup(html, name, options) {
        Ok((bytes, _plan)) => hand_over(bytes, out_buf, out_len),
        Err(e) => {
            log::error!("Export failed: {e}");
            set_last_error(&e.to_string());
            SnapforgeStatus::from(&e) as c_int
        }
    }
}

/// Export an HTML screen and also return its page plan as JSON.
///
/// # Safety
/// Same as `snapforge_export_report`. Additionally, `*out_json_ptr` must be
/// freed with `snapforge_free_string`.
#[no_mangle]
pub unsafe extern "C" fn snapforge_export_report_with_plan(
    html_ptr: *const u8,
    html_len: u32,
    title_ptr: *const u8,
    title_len: u32,
    out_buf: *mut *mut u8,
    out_len: *mut u32,
    out_json_ptr: *mut *mut c_char,
) -> c_int {
    clear_last_error();
    if out_buf.is_null() || out_len.is_null() || out_json_ptr.is_null() {
        set_last_error("Null pointer argument: output");
        return SnapforgeStatus::NullArgument as c_int;
    }
    let html = match utf8_arg(html_ptr, html_len, "html") {
        Ok(s) => s,
        Err(rc) => return rc,
    };
    let title = match utf8_arg(title_ptr, title_len, "title") {
        Ok(s) => s,
        Err(rc) => return rc,
    };

    match export_markup(html, title, None) {
        Ok((bytes, plan)) => {
            let rc = hand_over(bytes, out_buf, out_len);
            if rc == SnapforgeStatus::Ok as c_int {
                *out_json_ptr = match CString::new(plan) {
                    Ok(cs) => cs.into_raw(),
                    Err(_) => ptr::null_mut(),
                };
            }
            rc
        }
        Err(e) => {
            log::error!("Export failed: {e}");
            set_last_error(&e.to_string());
            SnapforgeStatus::from(&e) as c_int
        }
    }
}

// ---------------------------------------------------------------------------
// Memory management
// ---------------------------------------------------------------------------

/// Free a PDF buffer returned by `snapforge_export_*`.
///
/// # Safety
/// `buf` must have been returned by a previous `snapforge_export_*` call,
/// and `len` must be the corresponding length.
#[no_mangle]
pub unsafe extern "C" fn snapforge_free_buffer(buf: *mut u8, len: u32) {
    if !buf.is_null() {
        let _ = Box::from_raw(ptr::slice_from_raw_parts_mut(buf, len as usize));
    }
}

/// Free a string previously handed out by this library.
///
/// # Safety
/// `s` must have been returned by Rust's `CString::into_raw`.
#[no_mangle]
pub unsafe extern "C" fn snapforge_free_string(s: *mut c_char) {
    if !s.is_null() {
        let _ = CString::from_raw(s);
    }
}

/// Retrieve the last error message as a null-terminated string.
///
/// The returned pointer is valid until the next `snapforge_*` call on the
/// same thread. The caller should **not** free this pointer.
///
/// Returns null if the last call succeeded.
#[no_mangle]
pub extern "C" fn snapforge_last_error() -> *const c_char {
    LAST_ERROR.with(|e| {
        let borrow = e.borrow();
        match borrow.as_ref() {
            Some(cs) => cs.as_ptr(),
            None => ptr::null(),
        }
    })
}

/// Return the library version as a null-terminated string.
/// The caller must **not** free this pointer.
#[no_mangle]
pub extern "C" fn snapforge_version() -> *const c_char {
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr() as *const c_char
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ffi_export_report() {
        let html = b"<h1>Hello FFI</h1>";
        let title = b"FFI";
        let mut out_buf: *mut u8 = ptr::null_mut();
        let mut out_len: u32 = 0;

        let rc = unsafe {
            snapforge_export_report(
                html.as_ptr(),
                html.len() as u32,
                title.as_ptr(),
                title.len() as u32,
                &mut out_buf,
                &mut out_len,
            )
        };

        assert_eq!(rc, 0, "Expected success");
        assert!(!out_buf.is_null());
        assert!(out_len > 100);
        assert!(snapforge_last_error().is_null());

        let bytes = unsafe { slice::from_raw_parts(out_buf, out_len as usize) };
        assert_eq!(&bytes[0..5], b"%PDF-");

        unsafe { snapforge_free_buffer(out_buf, out_len) };
    }

    #[test]
    fn ffi_null_input() {
        let mut out_buf: *mut u8 = ptr::null_mut();
        let mut out_len: u32 = 0;

        let rc = unsafe {
            snapforge_export_report(ptr::null(), 0, ptr::null(), 0, &mut out_buf, &mut out_len)
        };

        assert_eq!(rc, SnapforgeStatus::NullArgument as c_int);
        let msg = unsafe { CStr::from_ptr(snapforge_last_error()) }.to_str().unwrap();
        assert!(msg.contains("Null pointer"));
    }

    #[test]
    fn ffi_empty_document_reports_content_unavailable() {
        let html = b"   ";
        let title = b"empty";
        let mut out_buf: *mut u8 = ptr::null_mut();
        let mut out_len: u32 = 0;
        let rc = unsafe {
            snapforge_export_report(
                html.as_ptr(),
                html.len() as u32,
                title.as_ptr(),
                title.len() as u32,
                &mut out_buf,
                &mut out_len,
            )
        };
        assert_eq!(rc, SnapforgeStatus::ContentUnavailable as c_int);
        assert!(out_buf.is_null());
    }

    #[test]
    fn ffi_rejects_bad_options() {
        let html = b"<p>x</p>";
        let title = b"x";
        let options = CString::new(r#"{"surface_width": 4000}"#).unwrap();
        let mut out_buf: *mut u8 = ptr::null_mut();
        let mut out_len: u32 = 0;
        let rc = unsafe {
            snapforge_export_generic(
                html.as_ptr(),
                html.len() as u32,
                title.as_ptr(),
                title.len() as u32,
                options.as_ptr(),
                &mut out_buf,
                &mut out_len,
            )
        };
        assert_eq!(rc, SnapforgeStatus::InvalidOptions as c_int);
    }

    #[test]
    fn ffi_export_with_plan() {
        let html = b"<p>Plan test</p>";
        let title = b"Plan";
        let mut out_buf: *mut u8 = ptr::null_mut();
        let mut out_len: u32 = 0;
        let mut json_ptr: *mut c_char = ptr::null_mut();

        let rc = unsafe {
            snapforge_export_report_with_plan(
                html.as_ptr(),
                html.len() as u32,
                title.as_ptr(),
                title.len() as u32,
                &mut out_buf,
                &mut out_len,
                &mut json_ptr,
            )
        };

        assert_eq!(rc, 0);
        assert!(!json_ptr.is_null());
        let json = unsafe { CStr::from_ptr(json_ptr) }.to_str().unwrap();
        assert!(json.contains("\"pages\""));
        assert!(json.contains("\"width_ratio\""));

        unsafe {
            snapforge_free_string(json_ptr);
            snapforge_free_buffer(out_buf, out_len);
        }
    }

    #[test]
    fn ffi_version() {
        let v = snapforge_version();
        let version = unsafe { CStr::from_ptr(v) }.to_str().unwrap();
        assert_eq!(version, env!("CARGO_PKG_VERSION"));
    }
}
