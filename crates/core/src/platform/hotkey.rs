use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Listen for Cmd+Shift+K on a background thread and raise `stop` on each
/// press. The event tap needs the Accessibility permission.
#[cfg(target_os = "macos")]
pub fn spawn_stop_hotkey(stop: Arc<AtomicBool>) {
    use std::ffi::c_void;

    use tracing::{error, info, warn};

    type CGEventTapProxy = *mut c_void;
    type CGEventRef = *mut c_void;
    type CFMachPortRef = *mut c_void;
    type CFRunLoopSourceRef = *mut c_void;
    type CFRunLoopRef = *mut c_void;
    type CFStringRef = *const c_void;
    type CGEventMask = u64;
    type CGEventType = u32;
    type CGEventFlags = u64;

    type CGEventTapCallBack =
        unsafe extern "C" fn(CGEventTapProxy, CGEventType, CGEventRef, *mut c_void) -> CGEventRef;

    const HID_EVENT_TAP: u32 = 0;
    const HEAD_INSERT: u32 = 0;
    const LISTEN_ONLY: u32 = 1;
    const KEY_DOWN: u32 = 10;
    const TAP_DISABLED_BY_TIMEOUT: u32 = 0xFFFF_FFFE;
    const TAP_DISABLED_BY_USER_INPUT: u32 = 0xFFFF_FFFF;
    const KEYCODE_FIELD: u32 = 9;

    const FLAG_SHIFT: u64 = 0x0002_0000;
    const FLAG_CONTROL: u64 = 0x0004_0000;
    const FLAG_ALTERNATE: u64 = 0x0008_0000;
    const FLAG_COMMAND: u64 = 0x0010_0000;

    const KEYCODE_K: i64 = 40;

    extern "C" {
        fn CGEventTapCreate(
            tap: u32,
            place: u32,
            options: u32,
            events_of_interest: CGEventMask,
            callback: CGEventTapCallBack,
            user_info: *mut c_void,
        ) -> CFMachPortRef;
        fn CFMachPortCreateRunLoopSource(
            allocator: *const c_void,
            port: CFMachPortRef,
            order: i64,
        ) -> CFRunLoopSourceRef;
        fn CFRunLoopGetCurrent() -> CFRunLoopRef;
        fn CFRunLoopAddSource(rl: CFRunLoopRef, source: CFRunLoopSourceRef, mode: CFStringRef);
        fn CFRunLoopRun();
        fn CGEventGetFlags(event: CGEventRef) -> CGEventFlags;
        fn CGEventGetIntegerValueField(event: CGEventRef, field: u32) -> i64;
        fn CGEventTapEnable(tap: CFMachPortRef, enable: bool);

        static kCFRunLoopCommonModes: CFStringRef;
    }

    /// Handed to the callback through `user_info`; lives for the whole run loop.
    struct TapState {
        stop: Arc<AtomicBool>,
        tap: CFMachPortRef,
    }

    unsafe extern "C" fn on_event(
        _proxy: CGEventTapProxy,
        event_type: CGEventType,
        event: CGEventRef,
        user_info: *mut c_void,
    ) -> CGEventRef {
        unsafe {
            let state = &*(user_info as *const TapState);

            // The system disables slow taps; turn ours back on
            if event_type == TAP_DISABLED_BY_TIMEOUT || event_type == TAP_DISABLED_BY_USER_INPUT {
                if !state.tap.is_null() {
                    CGEventTapEnable(state.tap, true);
                }
                return event;
            }
            if event_type != KEY_DOWN {
                return event;
            }

            let flags = CGEventGetFlags(event);
            let keycode = CGEventGetIntegerValueField(event, KEYCODE_FIELD);
            let chord = flags & FLAG_COMMAND != 0
                && flags & FLAG_SHIFT != 0
                && flags & (FLAG_ALTERNATE | FLAG_CONTROL) == 0;

            if keycode == KEYCODE_K && chord {
                state.stop.store(true, Ordering::Release);
            }
            event
        }
    }

    std::thread::Builder::new()
        .name("hotkey".into())
        .spawn(move || unsafe {
            let state = Box::into_raw(Box::new(TapState { stop, tap: std::ptr::null_mut() }));

            let tap = CGEventTapCreate(
                HID_EVENT_TAP,
                HEAD_INSERT,
                LISTEN_ONLY,
                1 << KEY_DOWN,
                on_event,
                state as *mut c_void,
            );
            if tap.is_null() {
                error!("failed to create event tap for Cmd+Shift+K, grant Accessibility permission to your terminal");
                drop(Box::from_raw(state));
                return;
            }
            (*state).tap = tap;

            let source = CFMachPortCreateRunLoopSource(std::ptr::null(), tap, 0);
            CFRunLoopAddSource(CFRunLoopGetCurrent(), source, kCFRunLoopCommonModes);
            CGEventTapEnable(tap, true);
            info!("stop hotkey Cmd+Shift+K armed");

            CFRunLoopRun();
            warn!("hotkey run loop exited");
        })
        .ok();
}

/// Bring the terminal that launched us back to the front.
#[cfg(target_os = "macos")]
pub fn activate_terminal() {
    let ppid = unsafe { libc::getppid() };
    let script = format!(
        "tell application \"System Events\" to set frontmost of first process whose unix id is {} to true",
        ppid
    );
    std::process::Command::new("osascript")
        .arg("-e")
        .arg(&script)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .ok();
}

#[cfg(not(target_os = "macos"))]
pub fn spawn_stop_hotkey(_stop: Arc<AtomicBool>) {
    tracing::debug!("global hotkey unavailable on this platform");
}

#[cfg(not(target_os = "macos"))]
pub fn activate_terminal() {}

/// Consume a pending hotkey press.
pub fn take_press(flag: &AtomicBool) -> bool {
    flag.swap(false, Ordering::AcqRel)
}
