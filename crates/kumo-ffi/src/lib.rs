//! C FFI bindings for the Kumo template expansion engine.
//!
//! Hosts create an engine with `km_engine_new`, expand documents with
//! `km_expand_json`, and release every returned string with `km_string_free`.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::path::Path;
use std::ptr;
use std::time::Duration;

use kumo::{Engine, ExpanderConfig, TemplateError};

/// Opaque engine handle owned by the host.
pub struct KmEngine {
    engine: Engine,
}

/// Create an engine. A negative `cache_ttl_ms` keeps cache entries until they
/// are invalidated.
///
/// Returns null if the engine cannot be created. Free the handle with
/// `km_engine_free`.
#[no_mangle]
pub extern "C" fn km_engine_new(cache_ttl_ms: i64) -> *mut KmEngine {
    let ttl = u64::try_from(cache_ttl_ms).ok().map(Duration::from_millis);
    match Engine::new(ExpanderConfig::default().with_cache_ttl(ttl)) {
        Ok(engine) => Box::into_raw(Box::new(KmEngine { engine })),
        Err(err) => {
            tracing::warn!(error = %err, "failed to create engine");
            ptr::null_mut()
        }
    }
}

/// Free an engine created by `km_engine_new`.
///
/// # Safety
///
/// `engine` must be null or a pointer returned by `km_engine_new` that has not
/// been freed yet.
#[no_mangle]
pub unsafe extern "C" fn km_engine_free(engine: *mut KmEngine) {
    if !engine.is_null() {
        drop(Box::from_raw(engine));
    }
}

/// Expand a document and return the component tree as JSON.
///
/// # Safety
///
/// - `engine` must be a live handle from `km_engine_new`.
/// - `text_utf8` and `base_path_utf8` must be valid null-terminated UTF-8 strings.
/// - `params_json_utf8_or_null` may be null, or a valid null-terminated UTF-8 JSON string.
/// - `out_error_json_utf8` must be a valid pointer to a `*mut c_char` (initially null).
///
/// On success, returns a pointer to a null-terminated UTF-8 JSON array.
/// The caller must free it with `km_string_free`.
///
/// On error, returns null and writes an error JSON string to `*out_error_json_utf8`.
/// The caller must free the error string with `km_string_free`.
#[no_mangle]
pub unsafe extern "C" fn km_expand_json(
    engine: *const KmEngine,
    text_utf8: *const c_char,
    base_path_utf8: *const c_char,
    params_json_utf8_or_null: *const c_char,
    out_error_json_utf8: *mut *mut c_char,
) -> *mut c_char {
    let Some(engine) = engine.as_ref() else {
        write_error(out_error_json_utf8, "InvalidArgument", "engine is null", None, None);
        return ptr::null_mut();
    };

    let text = match read_str(text_utf8) {
        Ok(s) => s,
        Err(message) => {
            write_error(out_error_json_utf8, "InvalidArgument", &message, None, None);
            return ptr::null_mut();
        }
    };

    let base_path = match read_str(base_path_utf8) {
        Ok(s) => s,
        Err(message) => {
            write_error(out_error_json_utf8, "InvalidArgument", &message, None, None);
            return ptr::null_mut();
        }
    };

    let params = if params_json_utf8_or_null.is_null() {
        serde_json::Value::Null
    } else {
        let params_json = match read_str(params_json_utf8_or_null) {
            Ok(s) => s,
            Err(message) => {
                write_error(out_error_json_utf8, "InvalidArgument", &message, None, None);
                return ptr::null_mut();
            }
        };
        match serde_json::from_str(params_json) {
            Ok(v) => v,
            Err(e) => {
                write_error(
                    out_error_json_utf8,
                    "InvalidParameters",
                    &e.to_string(),
                    Some(e.line()),
                    Some(e.column()),
                );
                return ptr::null_mut();
            }
        }
    };

    let nodes = match engine.engine.expand_json(text, base_path, params) {
        Ok(nodes) => nodes,
        Err(err) => {
            write_template_error(out_error_json_utf8, &err);
            return ptr::null_mut();
        }
    };

    match serde_json::to_string(&nodes) {
        Ok(json) => into_c_string(json, out_error_json_utf8),
        Err(e) => {
            write_error(out_error_json_utf8, "SerializationError", &e.to_string(), None, None);
            ptr::null_mut()
        }
    }
}

/// Drop the cached tree of one template file. Returns whether an entry was
/// removed.
///
/// # Safety
///
/// `engine` must be a live handle and `path_utf8` a valid null-terminated
/// UTF-8 string.
#[no_mangle]
pub unsafe extern "C" fn km_invalidate(engine: *const KmEngine, path_utf8: *const c_char) -> bool {
    let Some(engine) = engine.as_ref() else {
        return false;
    };
    match read_str(path_utf8) {
        Ok(path) => engine.engine.invalidate_template_cache(Path::new(path)),
        Err(_) => false,
    }
}

/// Report the first include cycle reachable from a document as a JSON array
/// of paths (empty when acyclic).
///
/// # Safety
///
/// `engine` must be a live handle; `text_utf8` and `base_path_utf8` must be
/// valid null-terminated UTF-8 strings. Returns null on invalid arguments.
/// The caller must free the result with `km_string_free`.
#[no_mangle]
pub unsafe extern "C" fn km_detect_cycles(
    engine: *const KmEngine,
    text_utf8: *const c_char,
    base_path_utf8: *const c_char,
) -> *mut c_char {
    let Some(engine) = engine.as_ref() else {
        return ptr::null_mut();
    };
    let (Ok(text), Ok(base_path)) = (read_str(text_utf8), read_str(base_path_utf8)) else {
        return ptr::null_mut();
    };

    let chain: Vec<String> = engine
        .engine
        .detect_circular_references(text, base_path)
        .iter()
        .map(|p| p.display().to_string())
        .collect();
    to_json_string(&chain)
}

/// Cache statistics as JSON: `{"entries": n, "hits": n, "misses": n}`.
///
/// # Safety
///
/// `engine` must be a live handle. The caller must free the result with
/// `km_string_free`.
#[no_mangle]
pub unsafe extern "C" fn km_cache_stats(engine: *const KmEngine) -> *mut c_char {
    match engine.as_ref() {
        Some(engine) => to_json_string(&engine.engine.cache_stats()),
        None => ptr::null_mut(),
    }
}

/// Install a stderr log subscriber filtered by the `KUMO_LOG` environment
/// variable (default `warn`). Returns false if a subscriber is already set.
#[no_mangle]
pub extern "C" fn km_init_logging() -> bool {
    let filter = tracing_subscriber::EnvFilter::try_from_env("KUMO_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}

/// Free a string previously returned by this library or written to an
/// `out_error_json_utf8` pointer.
///
/// # Safety
///
/// `p` must be a pointer previously returned by this crate via `CString::into_raw`,
/// or null (in which case this is a no-op).
#[no_mangle]
pub unsafe extern "C" fn km_string_free(p: *mut c_char) {
    if !p.is_null() {
        drop(CString::from_raw(p));
    }
}

unsafe fn read_str<'a>(p: *const c_char) -> Result<&'a str, String> {
    if p.is_null() {
        return Err("unexpected null string".to_string());
    }
    CStr::from_ptr(p).to_str().map_err(|e| e.to_string())
}

fn to_json_string<T: serde::Serialize + ?Sized>(value: &T) -> *mut c_char {
    serde_json::to_string(value)
        .ok()
        .and_then(|json| CString::new(json).ok())
        .map_or(ptr::null_mut(), CString::into_raw)
}

unsafe fn into_c_string(s: String, out_error: *mut *mut c_char) -> *mut c_char {
    match CString::new(s) {
        Ok(cs) => cs.into_raw(),
        Err(e) => {
            write_error(out_error, "SerializationError", &e.to_string(), None, None);
            ptr::null_mut()
        }
    }
}

/// Convert a `TemplateError` to error JSON and write it to the output pointer.
unsafe fn write_template_error(out: *mut *mut c_char, err: &TemplateError) {
    let (line, column) = match err {
        TemplateError::Parse { source, .. } => match source.location() {
            Some((line, column)) => (Some(line), Some(column)),
            None => (None, None),
        },
        _ => (None, None),
    };
    write_error(out, err.kind().as_str(), &err.to_string(), line, column);
}

/// Write an error JSON string to the output pointer.
unsafe fn write_error(
    out: *mut *mut c_char,
    error_type: &str,
    message: &str,
    line: Option<usize>,
    column: Option<usize>,
) {
    if out.is_null() {
        return;
    }

    let json = serde_json::json!({
        "type": error_type,
        "message": message,
        "line": line,
        "column": column,
    });

    if let Ok(cs) = CString::new(json.to_string()) {
        *out = cs.into_raw();
    }
}
