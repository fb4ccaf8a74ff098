//! Panic capture for the per-invocation recovery boundary.
//!
//! A chained process-wide panic hook records a backtrace for the panicking
//! thread. `catch_unwind` returns on that same thread, so the boundary can pick
//! the stack up right after catching the payload.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::sync::Once;

/// Maximum number of stack frames included in a panic report.
pub const MAX_STACK_FRAMES: usize = 32;

static INSTALL_HOOK: Once = Once::new();

thread_local! {
    static LAST_PANIC_STACK: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// A panic caught at the invocation boundary.
#[derive(Debug, Clone)]
pub struct PanicError {
    pub payload: String,
    pub stack: String,
}

impl std::fmt::Display for PanicError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PANIC: {}", self.payload)
    }
}

impl std::error::Error for PanicError {}

/// Install the backtrace-recording hook once, chaining to whatever hook was
/// present before.
pub fn install_panic_hook() {
    INSTALL_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let stack = bounded_stack(&Backtrace::force_capture().to_string(), MAX_STACK_FRAMES);
            LAST_PANIC_STACK.with(|slot| *slot.borrow_mut() = Some(stack));
            previous(info);
        }));
    });
}

/// Convert a caught panic payload into a [`PanicError`], attaching the stack
/// recorded by the hook for this thread.
pub fn panic_error(payload: Box<dyn Any + Send>) -> PanicError {
    let stack = LAST_PANIC_STACK
        .with(|slot| slot.borrow_mut().take())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| bounded_stack(&Backtrace::force_capture().to_string(), MAX_STACK_FRAMES));
    PanicError {
        payload: payload_message(payload.as_ref()),
        stack,
    }
}

/// Extract a printable message from a panic payload.
pub fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}

/// Keep at most `max_frames` frames of a rendered backtrace.
///
/// Frames start with `<index>:`; the `at file:line` lines that follow a frame
/// belong to it.
pub fn bounded_stack(rendered: &str, max_frames: usize) -> String {
    let mut frames = 0usize;
    let mut out = String::new();
    for line in rendered.lines() {
        if is_frame_header(line) {
            frames += 1;
            if frames > max_frames {
                out.push_str("  ...\n");
                break;
            }
        }
        out.push_str(line);
        out.push('\n');
    }
    if out.trim().is_empty() {
        out = "<stack unavailable>\n".to_string();
    }
    out
}

fn is_frame_header(line: &str) -> bool {
    let trimmed = line.trim_start();
    match trimmed.split_once(':') {
        Some((index, _)) => !index.is_empty() && index.chars().all(|c| c.is_ascii_digit()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_message_handles_str_and_string() {
        let s: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(payload_message(s.as_ref()), "static message");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(payload_message(owned.as_ref()), "owned message");
        let other: Box<dyn Any + Send> = Box::new(42u32);
        assert_eq!(payload_message(other.as_ref()), "Box<dyn Any>");
    }

    #[test]
    fn test_bounded_stack_truncates_frames() {
        let rendered = (0..10)
            .map(|i| format!("  {i}: frame_{i}\n             at src/lib.rs:{i}"))
            .collect::<Vec<_>>()
            .join("\n");
        let bounded = bounded_stack(&rendered, 3);
        assert!(bounded.contains("frame_2"));
        assert!(!bounded.contains("frame_3"));
        assert!(bounded.contains("src/lib.rs:2"));
        assert!(bounded.ends_with("  ...\n"));
    }

    #[test]
    fn test_bounded_stack_never_empty() {
        assert_eq!(bounded_stack("", 5), "<stack unavailable>\n");
    }

    #[test]
    fn test_caught_panic_carries_payload_and_stack() {
        install_panic_hook();
        let caught = std::panic::catch_unwind(|| -> () { panic!("kaboom {}", 7) }).unwrap_err();
        let err = panic_error(caught);
        assert_eq!(err.payload, "kaboom 7");
        assert!(!err.stack.trim().is_empty());
        assert_eq!(err.to_string(), "PANIC: kaboom 7");
    }
}
