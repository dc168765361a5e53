//! C entry points for embedding the fetcher from other languages.

use std::ffi::{c_char, c_int, CStr, CString};

use log::error;

/// Fetch a schedule (or, with `list_classes` non-zero, the class list)
/// and return it as a heap-allocated JSON C string.
///
/// Returns null when the URL is null or not valid UTF-8, the portal cannot
/// be reached, or the page cannot be parsed. A non-null result must be
/// released with [`shahaf_string_free`].
///
/// # Safety
///
/// `url` must be null or point to a NUL-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn shahaf_schedule_json(
    url: *const c_char,
    list_classes: c_int,
    class_num: c_int,
) -> *mut c_char {
    if url.is_null() {
        return std::ptr::null_mut();
    }
    let Ok(url) = unsafe { CStr::from_ptr(url) }.to_str() else {
        return std::ptr::null_mut();
    };

    let result = tokio::runtime::Runtime::new()
        .map_err(anyhow::Error::new)
        .and_then(|runtime| {
            runtime.block_on(async {
                if list_classes == 0 {
                    crate::timetable_json(url, class_num).await
                } else {
                    crate::classes_json(url).await
                }
            })
        });

    match result.and_then(|json| CString::new(json).map_err(anyhow::Error::new)) {
        Ok(json) => json.into_raw(),
        Err(e) => {
            error!("{e:#}");
            std::ptr::null_mut()
        }
    }
}

/// Release a string returned by [`shahaf_schedule_json`].
///
/// # Safety
///
/// `ptr` must be null or a pointer previously returned by this crate, and
/// must not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn shahaf_string_free(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(unsafe { CString::from_raw(ptr) });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_url_yields_null() {
        let url = CString::new("not a url").unwrap();
        let out = unsafe { shahaf_schedule_json(url.as_ptr(), 0, 9) };
        assert!(out.is_null());
    }

    #[test]
    fn null_url_yields_null() {
        let out = unsafe { shahaf_schedule_json(std::ptr::null(), 1, 0) };
        assert!(out.is_null());
    }

    #[test]
    fn free_accepts_null() {
        unsafe { shahaf_string_free(std::ptr::null_mut()) };
    }
}
