use super::engine::Engine;
use super::errors::{EngineError, EngineResult};
use super::property::to_cstring;
use std::ffi::{CString, c_char};
use std::ptr;
use tracing::{debug, trace};

/// Engine value for a track selector; 0 or below disables the track type.
fn track_selector(id: i64) -> String {
    if id <= 0 {
        "no".to_string()
    } else {
        id.to_string()
    }
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

impl Engine {
    /// Send `name args...` to the engine as one synchronous command.
    pub fn command(&self, name: &str, args: &[&str]) -> EngineResult<()> {
        let owned = std::iter::once(name)
            .chain(args.iter().copied())
            .map(to_cstring)
            .collect::<EngineResult<Vec<CString>>>()?;

        let mut argv: Vec<*const c_char> = owned.iter().map(|arg| arg.as_ptr()).collect();
        argv.push(ptr::null());

        trace!("command {} {:?}", name, args);
        self.core.with_handle(|api, handle| {
            // SAFETY: `argv` is null-terminated and `owned` outlives the call.
            let code = unsafe { api.command(handle, argv.as_mut_ptr()) };
            if code < 0 {
                debug!("Command {} {:?} failed: {}", name, args, code);
                return Err(EngineError::Command {
                    name: name.to_string(),
                    code,
                    message: self.core.message(code),
                });
            }
            Ok(())
        })
    }

    pub fn set_audio_track(&self, id: i64) -> EngineResult<()> {
        self.command("set", &["aid", &track_selector(id)])
    }

    /// Select a subtitle track; `0` disables subtitles.
    pub fn set_subtitle_track(&self, id: i64) -> EngineResult<()> {
        self.command("set", &["sid", &track_selector(id)])
    }

    /// `false` disables subtitles. `true` does nothing: there is no track id
    /// to restore here, callers re-enable with `set_subtitle_track(id)`.
    pub fn set_subtitle_visibility(&self, visible: bool) -> EngineResult<()> {
        if visible {
            trace!("Subtitle visibility on requested; keeping current selection");
            return Ok(());
        }
        self.set_subtitle_track(0)
    }

    /// Seek to an absolute position in seconds
    pub fn seek(&self, seconds: f64) -> EngineResult<()> {
        self.command("seek", &[&seconds.to_string(), "absolute"])
    }

    pub fn set_pause(&self, paused: bool) -> EngineResult<()> {
        self.command("set", &["pause", yes_no(paused)])
    }

    pub fn stop(&self) -> EngineResult<()> {
        self.command("stop", &[])
    }

    /// Replace the current file with `uri` (path or URL)
    pub fn load_file(&self, uri: &str) -> EngineResult<()> {
        debug!("Loading {}", uri);
        self.command("loadfile", &[uri, "replace"])
    }

    pub fn set_loop(&self, enabled: bool) -> EngineResult<()> {
        self.command("set", &["loop-file", if enabled { "inf" } else { "no" }])
    }
}
