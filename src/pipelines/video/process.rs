// SPDX-License-Identifier: MPL-2.0

//! Recording through a supervised external encoder process
//!
//! The encoder (ffmpeg by default) reads the V4L2 device itself, so this
//! backend never sees frames. A supervisor thread polls the child while the
//! recording runs. `stop` sends SIGTERM, waits for the child to be reaped,
//! and only then returns, so the output file is finalized and no zombie is
//! left behind.

use super::{
    EncoderSettings, Recorder, RecorderKind, RecordingJob, output_path, prepare_output_dir,
};
use crate::backends::camera::types::Resolution;
use crate::constants::recording::{ENCODER_PROGRAM, PROCESS_POLL_INTERVAL};
use crate::errors::{RecordingError, RecordingResult};
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// How an encoder process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    Exited(i32),
    Signaled(i32),
}

impl ProcessExit {
    pub fn from_status(status: ExitStatus) -> Self {
        match status.code() {
            Some(code) => ProcessExit::Exited(code),
            None => ProcessExit::Signaled(status.signal().unwrap_or_default()),
        }
    }

    /// Exit code 0, or termination by the SIGTERM we send on stop
    ///
    /// ffmpeg traps SIGTERM and exits with 255, which is clean only when
    /// `terminated` says the signal came from us.
    pub fn is_clean(&self, terminated: bool) -> bool {
        match self {
            ProcessExit::Exited(0) | ProcessExit::Signaled(libc::SIGTERM) => true,
            ProcessExit::Exited(255) => terminated,
            _ => false,
        }
    }
}

impl std::fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessExit::Exited(code) => write!(f, "exit code {}", code),
            ProcessExit::Signaled(signal) => write!(f, "signal {}", signal),
        }
    }
}

/// Program and arguments for an encoder process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl std::fmt::Display for EncoderCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.program, self.args.join(" "))
    }
}

/// A spawned process under supervision
pub trait SupervisedChild: Send {
    fn id(&self) -> u32;

    /// Non-blocking liveness check; `Some` once the process has been reaped
    fn try_wait(&mut self) -> io::Result<Option<ProcessExit>>;

    /// Ask the process to exit
    fn terminate(&mut self) -> io::Result<()>;

    /// Block until the process has been reaped
    fn wait(&mut self) -> io::Result<ProcessExit>;
}

/// Starts encoder processes
pub trait ProcessSpawner: Send + Sync {
    fn spawn(&self, command: &EncoderCommand) -> io::Result<Box<dyn SupervisedChild>>;
}

/// Spawns real processes with `std::process`
///
/// The returned handle sends SIGTERM and reaps the child when dropped
/// without having been waited on.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemSpawner;

impl ProcessSpawner for SystemSpawner {
    fn spawn(&self, command: &EncoderCommand) -> io::Result<Box<dyn SupervisedChild>> {
        let child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        Ok(Box::new(SystemChild {
            child,
            reaped: false,
        }))
    }
}

struct SystemChild {
    child: Child,
    reaped: bool,
}

impl SupervisedChild for SystemChild {
    fn id(&self) -> u32 {
        self.child.id()
    }

    fn try_wait(&mut self) -> io::Result<Option<ProcessExit>> {
        let status = self.child.try_wait()?;
        if status.is_some() {
            self.reaped = true;
        }
        Ok(status.map(ProcessExit::from_status))
    }

    fn terminate(&mut self) -> io::Result<()> {
        if self.reaped {
            return Ok(());
        }
        let pid = self.child.id() as libc::pid_t;
        // SAFETY: kill(2) on a pid we own and have not reaped yet
        let result = unsafe { libc::kill(pid, libc::SIGTERM) };
        if result != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn wait(&mut self) -> io::Result<ProcessExit> {
        let status = self.child.wait()?;
        self.reaped = true;
        Ok(ProcessExit::from_status(status))
    }
}

impl Drop for SystemChild {
    fn drop(&mut self) {
        if self.reaped {
            return;
        }
        let pid = self.child.id();
        if let Err(e) = self.terminate() {
            debug!(pid, error = %e, "SIGTERM on drop failed");
        }
        if let Err(e) = self.child.wait() {
            warn!(pid, error = %e, "Failed to reap encoder process on drop");
        }
    }
}

struct Supervisor {
    stop_tx: Sender<()>,
    thread: JoinHandle<Option<ProcessExit>>,
}

#[derive(Default)]
struct Supervision {
    output_dir: Option<PathBuf>,
    job: Option<RecordingJob>,
    last_path: Option<PathBuf>,
    supervisor: Option<Supervisor>,
}

/// Records by supervising an encoder process that reads the device directly
pub struct ExternalProcessRecorder {
    device_path: PathBuf,
    program: String,
    input_format: Option<String>,
    settings: EncoderSettings,
    spawner: Arc<dyn ProcessSpawner>,
    recording: Arc<AtomicBool>,
    state: Mutex<Supervision>,
}

impl ExternalProcessRecorder {
    pub fn new(device_path: impl Into<PathBuf>) -> Self {
        Self {
            device_path: device_path.into(),
            program: ENCODER_PROGRAM.to_string(),
            input_format: Some("mjpeg".to_string()),
            settings: EncoderSettings::default(),
            spawner: Arc::new(SystemSpawner),
            recording: Arc::new(AtomicBool::new(false)),
            state: Mutex::new(Supervision::default()),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Input format passed to the v4l2 demuxer, `None` lets the encoder pick
    pub fn with_input_format(mut self, input_format: Option<&str>) -> Self {
        self.input_format = input_format.map(str::to_string);
        self
    }

    pub fn with_settings(mut self, settings: EncoderSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_spawner(mut self, spawner: Arc<dyn ProcessSpawner>) -> Self {
        self.spawner = spawner;
        self
    }

    pub fn device_path(&self) -> &Path {
        &self.device_path
    }

    /// Id of the running encoder process
    pub fn process_id(&self) -> Option<u32> {
        self.lock_state().job.as_ref().and_then(|job| job.process_id)
    }

    /// Build the encoder command line for a recording
    pub fn command(&self, resolution: Resolution, framerate: u32, output: &Path) -> EncoderCommand {
        let fps = framerate.to_string();
        let mut args: Vec<String> = ["-y", "-nostdin", "-loglevel", "error", "-f", "v4l2"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        if let Some(input_format) = &self.input_format {
            args.extend(["-input_format".to_string(), input_format.clone()]);
        }

        args.extend([
            "-video_size".to_string(),
            resolution.to_string(),
            "-framerate".to_string(),
            fps.clone(),
            "-i".to_string(),
            self.device_path.to_string_lossy().into_owned(),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            self.settings.preset.clone(),
            "-tune".to_string(),
            self.settings.tune.clone(),
            "-pix_fmt".to_string(),
            self.settings.pixel_format.clone(),
            "-r".to_string(),
            fps,
            "-b:v".to_string(),
            format!("{}k", self.settings.bitrate_kbps),
            output.to_string_lossy().into_owned(),
        ]);

        EncoderCommand {
            program: self.program.clone(),
            args,
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, Supervision> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Join a supervisor and return how the process ended
    fn finish_supervisor(supervisor: Supervisor) -> Option<ProcessExit> {
        // A send error means the supervisor already exited on its own
        let _ = supervisor.stop_tx.send(());
        match supervisor.thread.join() {
            Ok(exit) => exit,
            Err(e) => {
                error!("Encoder supervisor thread panicked: {:?}", e);
                None
            }
        }
    }

    fn spawn_supervisor(
        mut child: Box<dyn SupervisedChild>,
        recording: Arc<AtomicBool>,
    ) -> Supervisor {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread = thread::spawn(move || {
            let pid = child.id();
            debug!(pid, "Encoder supervisor started");

            loop {
                match child.try_wait() {
                    Ok(Some(exit)) => {
                        recording.store(false, Ordering::SeqCst);
                        if exit.is_clean(false) {
                            info!(pid, %exit, "Encoder process exited");
                        } else {
                            warn!(pid, %exit, "Encoder process exited unexpectedly");
                        }
                        return Some(exit);
                    }
                    Ok(None) => {}
                    Err(e) => warn!(pid, error = %e, "Failed to poll encoder process"),
                }

                match stop_rx.recv_timeout(PROCESS_POLL_INTERVAL) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {}
                }
            }

            debug!(pid, "Terminating encoder process");
            let terminated = match child.terminate() {
                Ok(()) => true,
                Err(e) => {
                    warn!(pid, error = %e, "Failed to signal encoder process");
                    false
                }
            };

            let exit = match child.wait() {
                Ok(exit) => {
                    if exit.is_clean(terminated) {
                        info!(pid, %exit, "Encoder process reaped");
                    } else {
                        warn!(pid, %exit, "Encoder process ended with error");
                    }
                    Some(exit)
                }
                Err(e) => {
                    error!(pid, error = %e, "Failed to reap encoder process");
                    None
                }
            };
            recording.store(false, Ordering::SeqCst);
            exit
        });

        Supervisor { stop_tx, thread }
    }
}

impl Recorder for ExternalProcessRecorder {
    fn kind(&self) -> RecorderKind {
        RecorderKind::External
    }

    fn init(&self, output_dir: &Path) -> RecordingResult<()> {
        let dir = prepare_output_dir(output_dir)?;
        debug!(dir = %dir.display(), "External recorder output directory ready");
        self.lock_state().output_dir = Some(dir);
        Ok(())
    }

    fn start(&self, resolution: Resolution, framerate: u32) -> RecordingResult<()> {
        let mut state = self.lock_state();

        if self.recording.load(Ordering::SeqCst) {
            debug!("Recording already running");
            return Ok(());
        }

        // The previous encoder died on its own; collect its supervisor first
        if let Some(supervisor) = state.supervisor.take() {
            Self::finish_supervisor(supervisor);
        }
        if let Some(job) = state.job.take() {
            state.last_path = Some(job.path);
        }

        let dir = state
            .output_dir
            .clone()
            .ok_or(RecordingError::NotInitialized)?;
        let path = output_path(&dir, resolution, framerate, &self.settings);
        let command = self.command(resolution, framerate, &path);

        debug!(command = %command, "Spawning encoder process");
        let child = self.spawner.spawn(&command).map_err(|e| {
            error!(program = %command.program, error = %e, "Failed to spawn encoder process");
            RecordingError::ProcessLaunch(format!("{}: {}", command.program, e))
        })?;
        let pid = child.id();

        self.recording.store(true, Ordering::SeqCst);
        state.supervisor = Some(Self::spawn_supervisor(child, Arc::clone(&self.recording)));
        state.job = Some(RecordingJob {
            kind: RecorderKind::External,
            path: path.clone(),
            started_at: std::time::Instant::now(),
            resolution,
            framerate,
            process_id: Some(pid),
        });

        info!(
            pid,
            path = %path.display(),
            %resolution,
            framerate,
            bitrate_kbps = self.settings.bitrate_kbps,
            "External recording started"
        );
        Ok(())
    }

    fn stop(&self) {
        let mut state = self.lock_state();
        self.recording.store(false, Ordering::SeqCst);

        let exit = state.supervisor.take().and_then(Self::finish_supervisor);

        if let Some(job) = state.job.take() {
            info!(
                path = %job.path.display(),
                seconds = job.elapsed().as_secs(),
                exit = ?exit,
                "External recording stopped"
            );
            state.last_path = Some(job.path);
        }
    }

    fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    fn current_path(&self) -> Option<PathBuf> {
        let state = self.lock_state();
        state
            .job
            .as_ref()
            .map(|job| job.path.clone())
            .or_else(|| state.last_path.clone())
    }

    fn duration(&self) -> Duration {
        if !self.is_recording() {
            return Duration::ZERO;
        }
        self.lock_state()
            .job
            .as_ref()
            .map(RecordingJob::elapsed)
            .unwrap_or_default()
    }
}

impl Drop for ExternalProcessRecorder {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line() {
        let recorder = ExternalProcessRecorder::new("/dev/video0");
        let command = recorder.command(Resolution::new(640, 480), 30, Path::new("/tmp/out.mp4"));
        assert_eq!(command.program, "ffmpeg");
        assert_eq!(
            command.args.join(" "),
            "-y -nostdin -loglevel error -f v4l2 -input_format mjpeg -video_size 640x480 \
             -framerate 30 -i /dev/video0 -c:v libx264 -preset ultrafast -tune zerolatency \
             -pix_fmt yuv420p -r 30 -b:v 2000k /tmp/out.mp4"
        );
    }

    #[test]
    fn test_command_without_input_format() {
        let recorder = ExternalProcessRecorder::new("/dev/video2").with_input_format(None);
        let command = recorder.command(Resolution::new(1280, 720), 15, Path::new("out.mp4"));
        assert!(!command.args.iter().any(|a| a == "-input_format"));
    }

    #[test]
    fn test_exit_classification() {
        assert!(ProcessExit::Exited(0).is_clean(false));
        assert!(ProcessExit::Signaled(libc::SIGTERM).is_clean(true));
        assert!(!ProcessExit::Exited(1).is_clean(true));
        assert!(!ProcessExit::Signaled(libc::SIGKILL).is_clean(true));
    }

    #[test]
    fn test_exit_255_clean_only_after_our_sigterm() {
        assert!(ProcessExit::Exited(255).is_clean(true));
        assert!(!ProcessExit::Exited(255).is_clean(false));
    }

    #[test]
    fn test_start_requires_init() {
        let recorder = ExternalProcessRecorder::new("/dev/video0");
        assert_eq!(
            recorder.start(Resolution::new(640, 480), 30),
            Err(RecordingError::NotInitialized)
        );
        assert!(!recorder.is_recording());
    }
}
