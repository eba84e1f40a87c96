//! FFI (Foreign Function Interface) for C/Go interoperability

use crate::error::{ErrorCode, VideoCreatorError};
use crate::queue::TaskQueue;
use crate::task::VideoCreateTask;
use crate::{EncoderSettings, StdFileSystem, StillImage, VideoCreateOptions};
use libc::{c_char, c_void};
use std::ffi::{CStr, CString};
use std::ptr;
use std::sync::{Arc, OnceLock};

/// FFI result structure
#[repr(C)]
pub struct FfiResult {
    pub code: ErrorCode,
    pub message: *mut c_char,
}

impl FfiResult {
    fn ok() -> Self {
        Self {
            code: ErrorCode::Ok,
            message: ptr::null_mut(),
        }
    }

    fn error(code: ErrorCode, message: &str) -> Self {
        let c_message = CString::new(message.replace('\0', " ")).unwrap_or_default();
        Self {
            code,
            message: c_message.into_raw(),
        }
    }
}

/// Progress callback: `progress` in (0, 1], `user_data` as passed in
pub type FfiProgressCallback = Option<extern "C" fn(progress: f64, user_data: *mut c_void)>;

/// Caller-owned pointer handed back to the progress callback
struct UserData(*mut c_void);

// the caller guarantees `user_data` may be used from the worker thread
unsafe impl Send for UserData {}

impl UserData {
    fn get(&self) -> *mut c_void {
        self.0
    }
}

/// Queue shared by every FFI call, so C callers get the same one-at-a-time
/// execution as `VideoCreator`
fn shared_queue() -> &'static TaskQueue {
    static QUEUE: OnceLock<TaskQueue> = OnceLock::new();
    QUEUE.get_or_init(TaskQueue::new)
}

unsafe fn path_arg<'a>(ptr: *const c_char, what: &str) -> Result<&'a str, FfiResult> {
    if ptr.is_null() {
        return Err(FfiResult::error(
            ErrorCode::InvalidInput,
            &format!("{} is null", what),
        ));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|_| FfiResult::error(ErrorCode::InvalidInput, &format!("Invalid {}", what)))
}

/// Create a video of the image at `image_path`, blocking until it is written
///
/// # Safety
/// - `image_path` and `output_path` must be valid null-terminated strings
/// - `progress` may be null; if set it is called from a worker thread with
///   `user_data`, which must stay valid until this function returns
/// - must not be called from the `progress` callback: calls are queued behind
///   the running one, so a nested call never returns
#[no_mangle]
pub unsafe extern "C" fn stillvid_create_video(
    image_path: *const c_char,
    width: u32,
    height: u32,
    fps: u32,
    duration: f64,
    output_path: *const c_char,
    quality: u8,
    progress: FfiProgressCallback,
    user_data: *mut c_void,
) -> FfiResult {
    let image_path = match path_arg(image_path, "image path") {
        Ok(s) => s,
        Err(e) => return e,
    };
    let output_path = match path_arg(output_path, "output path") {
        Ok(s) => s,
        Err(e) => return e,
    };

    let options = match VideoCreateOptions::new((width, height), fps, duration, output_path) {
        Ok(options) => options,
        Err(e) => return FfiResult::error(ErrorCode::from(&e), &e.to_string()),
    };

    let image = match StillImage::from_path(image_path) {
        Ok(image) => image,
        Err(e) => {
            return FfiResult::error(
                ErrorCode::InvalidInput,
                &format!("Failed to load image: {}", e),
            )
        }
    };

    let settings = EncoderSettings::default().with_quality(quality);
    let mut task = VideoCreateTask::new(image, options, settings, Arc::new(StdFileSystem));
    if let Some(callback) = progress {
        let user_data = UserData(user_data);
        task = task.with_progress(Box::new(move |p| callback(p, user_data.get())));
    }

    let (tx, rx) = crossbeam_channel::bounded(1);
    shared_queue().submit(
        task,
        Box::new(move |result| {
            let _ = tx.send(result);
        }),
    );

    match rx.recv().unwrap_or(Err(VideoCreatorError::Cancelled)) {
        Ok(_) => FfiResult::ok(),
        Err(e) => FfiResult::error(ErrorCode::from(&e), &e.to_string()),
    }
}

/// Cancel every running and queued `stillvid_create_video` call. Each one
/// returns `ErrorCode::Cancelled`.
#[no_mangle]
pub extern "C" fn stillvid_cancel_all() {
    shared_queue().cancel_all();
}

/// Free a result's message string
///
/// # Safety
/// - `result` must point to a valid `FfiResult` that was returned by a stillvid function
#[no_mangle]
pub unsafe extern "C" fn stillvid_free_result(result: *mut FfiResult) {
    if result.is_null() {
        return;
    }

    let result = &mut *result;
    if !result.message.is_null() {
        // Reclaim the CString and let it drop
        let _ = CString::from_raw(result.message);
        result.message = ptr::null_mut();
    }
}

/// Get version string
#[no_mangle]
pub extern "C" fn stillvid_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
