use std::time::Duration;

use crate::error::LauncherError;

pub trait ClipboardSink {
    fn set_text(&mut self, text: &str) -> Result<(), LauncherError>;
}

/// System clipboard. The handle lives as long as this value, which keeps the
/// selection owned on X11 while an interactive session runs.
#[derive(Default)]
pub struct SystemClipboard {
    inner: Option<arboard::Clipboard>,
    #[cfg_attr(not(target_os = "linux"), allow(dead_code))]
    hold: Option<Duration>,
}

impl SystemClipboard {
    /// For one-shot use: on Linux the write blocks until another program takes
    /// the selection or `hold` elapses, since the selection dies with the process.
    pub fn holding(hold: Duration) -> Self {
        Self {
            inner: None,
            hold: Some(hold),
        }
    }

    fn handle(&mut self) -> Result<&mut arboard::Clipboard, LauncherError> {
        if self.inner.is_none() {
            let clipboard = arboard::Clipboard::new()
                .map_err(|err| LauncherError::Clipboard(err.to_string()))?;
            self.inner = Some(clipboard);
        }
        self.inner
            .as_mut()
            .ok_or_else(|| LauncherError::Clipboard("clipboard unavailable".to_string()))
    }
}

impl ClipboardSink for SystemClipboard {
    #[cfg(target_os = "linux")]
    fn set_text(&mut self, text: &str) -> Result<(), LauncherError> {
        use arboard::SetExtLinux;

        let hold = self.hold;
        let clipboard = self.handle()?;
        let result = match hold {
            Some(hold) => clipboard
                .set()
                .wait_until(std::time::Instant::now() + hold)
                .text(text.to_string()),
            None => clipboard.set_text(text.to_string()),
        };
        result.map_err(|err| LauncherError::Clipboard(err.to_string()))
    }

    #[cfg(not(target_os = "linux"))]
    fn set_text(&mut self, text: &str) -> Result<(), LauncherError> {
        self.handle()?
            .set_text(text.to_string())
            .map_err(|err| LauncherError::Clipboard(err.to_string()))
    }
}

/// Copies `command`. Failures are logged and returned for the caller to
/// report as a non-fatal status.
pub fn copy_command<C: ClipboardSink>(sink: &mut C, command: &str) -> Result<(), LauncherError> {
    if command.is_empty() {
        return Err(LauncherError::Clipboard("nothing to copy".to_string()));
    }
    sink.set_text(command).inspect_err(|err| {
        tracing::warn!(%err, "clipboard write failed");
    })
}
