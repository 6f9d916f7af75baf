//! Creator tag stored as an extended attribute on the finished output file.

use std::path::Path;

use vidscale_common::{VidscaleError, VidscaleResult};

#[cfg(target_os = "linux")]
pub const CREATOR_ATTRIBUTE: &str = "user.vidscale.creator";

#[cfg(not(target_os = "linux"))]
pub const CREATOR_ATTRIBUTE: &str = "com.vidscale.creator";

/// Tag `path` with the name of the tool that produced it.
#[cfg(any(target_os = "linux", target_os = "macos"))]
pub fn write_creator_tag(path: &Path, creator: &str) -> VidscaleResult<()> {
    let c_path = c_path(path)?;
    let c_name = c_name()?;
    let value = creator.as_bytes();

    // SAFETY: both strings are NUL-terminated and outlive the call; `value`
    // is a valid slice of `value.len()` bytes.
    #[cfg(target_os = "linux")]
    let rc = unsafe {
        libc::setxattr(
            c_path.as_ptr(),
            c_name.as_ptr(),
            value.as_ptr().cast(),
            value.len(),
            0,
        )
    };
    #[cfg(target_os = "macos")]
    let rc = unsafe {
        libc::setxattr(
            c_path.as_ptr(),
            c_name.as_ptr(),
            value.as_ptr().cast(),
            value.len(),
            0,
            0,
        )
    };

    if rc != 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(())
}

/// Read the creator tag back, or `None` if the file has none.
#[cfg(any(target_os = "linux", target_os = "macos"))]
pub fn read_creator_tag(path: &Path) -> VidscaleResult<Option<String>> {
    let c_path = c_path(path)?;
    let c_name = c_name()?;
    let mut buf = vec![0u8; 1024];

    // SAFETY: `buf` is writable for `buf.len()` bytes.
    #[cfg(target_os = "linux")]
    let len = unsafe {
        libc::getxattr(
            c_path.as_ptr(),
            c_name.as_ptr(),
            buf.as_mut_ptr().cast(),
            buf.len(),
        )
    };
    #[cfg(target_os = "macos")]
    let len = unsafe {
        libc::getxattr(
            c_path.as_ptr(),
            c_name.as_ptr(),
            buf.as_mut_ptr().cast(),
            buf.len(),
            0,
            0,
        )
    };

    if len < 0 {
        let err = std::io::Error::last_os_error();
        #[cfg(target_os = "linux")]
        let missing = err.raw_os_error() == Some(libc::ENODATA);
        #[cfg(target_os = "macos")]
        let missing = err.raw_os_error() == Some(libc::ENOATTR);
        if missing {
            return Ok(None);
        }
        return Err(err.into());
    }
    buf.truncate(len as usize);
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub fn write_creator_tag(_path: &Path, _creator: &str) -> VidscaleResult<()> {
    Err(VidscaleError::unsupported(
        "creator tags need extended attribute support",
    ))
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub fn read_creator_tag(_path: &Path) -> VidscaleResult<Option<String>> {
    Err(VidscaleError::unsupported(
        "creator tags need extended attribute support",
    ))
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
fn c_path(path: &Path) -> VidscaleResult<std::ffi::CString> {
    use std::os::unix::ffi::OsStrExt;

    std::ffi::CString::new(path.as_os_str().as_bytes())
        .map_err(|_| VidscaleError::validation(format!("path {path:?} contains a NUL byte")))
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
fn c_name() -> VidscaleResult<std::ffi::CString> {
    std::ffi::CString::new(CREATOR_ATTRIBUTE)
        .map_err(|_| VidscaleError::validation("attribute name contains a NUL byte"))
}
