//! User and group lookups through the C library

use anyhow::{Context, Result};
use std::ffi::{CStr, CString};

/// Name of the user with `uid`
pub fn user_name(uid: u32) -> Option<String> {
    // SAFETY: getpwuid returns null or a pointer to a static record, which is
    // copied out before any other passwd call
    unsafe {
        let entry = libc::getpwuid(uid);
        if entry.is_null() {
            return None;
        }
        Some(CStr::from_ptr((*entry).pw_name).to_string_lossy().into_owned())
    }
}

/// Uid and primary gid of `name`
pub fn user_ids(name: &str) -> Result<Option<(u32, u32)>> {
    let c_name = CString::new(name).context("Invalid user name")?;
    // SAFETY: see user_name
    unsafe {
        let entry = libc::getpwnam(c_name.as_ptr());
        if entry.is_null() {
            return Ok(None);
        }
        Ok(Some(((*entry).pw_uid, (*entry).pw_gid)))
    }
}

/// Gid of the group `name`
pub fn group_id(name: &str) -> Result<Option<u32>> {
    let c_name = CString::new(name).context("Invalid group name")?;
    // SAFETY: getgrnam returns null or a pointer to a static record
    unsafe {
        let entry = libc::getgrnam(c_name.as_ptr());
        if entry.is_null() {
            return Ok(None);
        }
        Ok(Some((*entry).gr_gid))
    }
}

/// Name of the effective user, if it has a passwd entry
pub fn current_user() -> Option<String> {
    // SAFETY: geteuid cannot fail
    user_name(unsafe { libc::geteuid() })
}

/// Whether commands for `user` can run without switching users
pub fn is_current_user(user: &str) -> bool {
    current_user().as_deref() == Some(user)
}
