//! Flat C interface for bindings in other languages.
//!
//! A client lives behind an opaque handle created by [collect_agent_new] and released with
//! [collect_agent_free]. Functions returning text hand out an owned, NUL terminated copy,
//! which has to be released with [collect_agent_free_string].
//!
//! None of these functions panic across the boundary. Failures are reported as a
//! `KO ...` reply, or `false` for [collect_agent_register_collect].
use std::ffi::{c_char, c_int, c_longlong, CStr, CString};
use std::ptr;

use crate::{
    client::{CollectAgent, Operation},
    identity::JobIdentity,
    internal_prelude::*,
    logging::Priority,
    reply::Reply,
};

/// Opaque client handle.
pub struct CollectAgentHandle {
    agent: CollectAgent,
}

/// Borrow a C string. NULL is treated like an empty string.
///
/// # Safety
/// `value` must be NULL or point to a valid NUL terminated string.
unsafe fn borrow_str(value: *const c_char) -> String {
    if value.is_null() {
        return String::new();
    }
    CStr::from_ptr(value).to_string_lossy().into_owned()
}

/// Empty optional strings are passed as NULL or `""` from C.
fn non_empty(value: &str) -> Option<&str> {
    Some(value).filter(|value| !value.is_empty())
}

/// Hand out an owned copy of `text`. Interior NUL bytes would truncate it and are replaced.
fn into_c_string(text: String) -> *mut c_char {
    let text = CString::new(text.replace('\0', " ")).unwrap_or_default();
    text.into_raw()
}

fn invalid_handle(operation: Operation) -> *mut c_char {
    into_c_string(format!(
        "KO {}: invalid client handle",
        operation.failure_prefix()
    ))
}

/// Create a client for the relay on `host`, with the job identity taken from the environment.
/// A NULL or empty `host` targets the loopback interface.
///
/// Returns NULL if the relay address can't be resolved.
///
/// # Safety
/// `host` must be NULL or point to a valid NUL terminated string.
#[no_mangle]
pub unsafe extern "C" fn collect_agent_new(host: *const c_char) -> *mut CollectAgentHandle {
    let host = borrow_str(host);
    match CollectAgent::new(&host, JobIdentity::from_env()) {
        Ok(agent) => Box::into_raw(Box::new(CollectAgentHandle { agent })),
        Err(err) => {
            error!("Failed to create collect agent for {host:?}: {err}");
            ptr::null_mut()
        }
    }
}

/// Free a client.
///
/// # Safety
/// `handle` must be NULL or a pointer returned by [collect_agent_new] that hasn't been freed.
#[no_mangle]
pub unsafe extern "C" fn collect_agent_free(handle: *mut CollectAgentHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

/// Free a string returned by any of the `collect_agent_*` functions.
///
/// # Safety
/// `value` must be NULL or a string returned by this library that hasn't been freed.
#[no_mangle]
pub unsafe extern "C" fn collect_agent_free_string(value: *mut c_char) {
    if !value.is_null() {
        drop(CString::from_raw(value));
    }
}

/// Register the job. Returns whether the relay handed out a connection id.
///
/// # Safety
/// `handle` must be NULL or valid, the strings must be NULL or valid NUL terminated strings.
#[no_mangle]
pub unsafe extern "C" fn collect_agent_register_collect(
    handle: *mut CollectAgentHandle,
    config_file: *const c_char,
    suffix: *const c_char,
    new: bool,
) -> bool {
    let Some(handle) = handle.as_mut() else {
        error!("collect_agent_register_collect called with a NULL handle");
        return false;
    };
    let config_file = borrow_str(config_file);
    let suffix = borrow_str(suffix);

    matches!(
        handle
            .agent
            .register(&config_file, new, non_empty(&suffix)),
        Reply::Registered(_)
    )
}

/// Send statistics whose pairs are already rendered as `"<name>" "<value>"`.
///
/// # Safety
/// `handle` must be NULL or valid, the strings must be NULL or valid NUL terminated strings.
#[no_mangle]
pub unsafe extern "C" fn collect_agent_send_stat(
    handle: *const CollectAgentHandle,
    timestamp: c_longlong,
    suffix: *const c_char,
    stats: *const c_char,
) -> *mut c_char {
    let Some(handle) = handle.as_ref() else {
        return invalid_handle(Operation::SendStat);
    };
    let suffix = borrow_str(suffix);
    let stats = borrow_str(stats);

    let reply = handle
        .agent
        .send_prepared_stat(timestamp, &stats, non_empty(&suffix));
    into_c_string(reply.to_string())
}

/// # Safety
/// `handle` must be NULL or a valid pointer returned by [collect_agent_new].
#[no_mangle]
pub unsafe extern "C" fn collect_agent_reload_stat(handle: *const CollectAgentHandle) -> *mut c_char {
    match handle.as_ref() {
        Some(handle) => into_c_string(handle.agent.reload().to_string()),
        None => invalid_handle(Operation::Reload),
    }
}

/// # Safety
/// `handle` must be NULL or a valid pointer returned by [collect_agent_new].
#[no_mangle]
pub unsafe extern "C" fn collect_agent_remove_stat(handle: *mut CollectAgentHandle) -> *mut c_char {
    match handle.as_mut() {
        Some(handle) => into_c_string(handle.agent.remove().to_string()),
        None => invalid_handle(Operation::Remove),
    }
}

/// # Safety
/// `handle` must be NULL or a valid pointer returned by [collect_agent_new].
#[no_mangle]
pub unsafe extern "C" fn collect_agent_reload_all_stats(
    handle: *const CollectAgentHandle,
) -> *mut c_char {
    match handle.as_ref() {
        Some(handle) => into_c_string(handle.agent.reload_all().to_string()),
        None => invalid_handle(Operation::ReloadAll),
    }
}

/// # Safety
/// `handle` must be NULL or a valid pointer returned by [collect_agent_new].
#[no_mangle]
pub unsafe extern "C" fn collect_agent_change_config(
    handle: *const CollectAgentHandle,
    storage: bool,
    broadcast: bool,
) -> *mut c_char {
    match handle.as_ref() {
        Some(handle) => into_c_string(handle.agent.change_config(storage, broadcast).to_string()),
        None => invalid_handle(Operation::ChangeConfig),
    }
}

/// Log a message with a syslog priority (`0` emergency to `7` debug).
///
/// # Safety
/// `handle` must be NULL or valid, `message` must be NULL or a valid NUL terminated string.
#[no_mangle]
pub unsafe extern "C" fn collect_agent_send_log(
    handle: *const CollectAgentHandle,
    priority: c_int,
    message: *const c_char,
) {
    let message = borrow_str(message);
    let priority = Priority::from_syslog(priority);
    match handle.as_ref() {
        Some(handle) => handle.agent.send_log(priority, &message),
        None => warn!("collect_agent_send_log called with a NULL handle: [{priority}] {message}"),
    }
}
