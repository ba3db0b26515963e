// SPDX-License-Identifier: MPL-2.0

//! Integration tests for both recording backends

mod common;

use camcorder::backends::camera::{FrameSink, Resolution};
use camcorder::errors::RecordingError;
use camcorder::pipelines::video::{
    EncoderCommand, ExternalProcessRecorder, InProcessRecorder, ProcessSpawner, Recorder,
    RecorderKind, SupervisedChild, SystemSpawner,
};
use camcorder::storage::RecordingName;
use common::{EncoderEvent, FakeEncoderFactory, FakeSpawner, FakeState, frame, wait_until};
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap()
}

/// Runs `sleep` instead of the encoder so a real child process is supervised
struct SleepSpawner;

impl ProcessSpawner for SleepSpawner {
    fn spawn(&self, _command: &EncoderCommand) -> io::Result<Box<dyn SupervisedChild>> {
        SystemSpawner.spawn(&EncoderCommand {
            program: "sleep".to_string(),
            args: vec!["30".to_string()],
        })
    }
}

fn process_exists(pid: u32) -> bool {
    Path::new(&format!("/proc/{}", pid)).exists()
}

// ===== External process recorder =====

#[test]
fn test_external_requires_init() {
    let recorder = ExternalProcessRecorder::new("/dev/video0");
    assert_eq!(
        recorder.start(Resolution::new(640, 480), 30),
        Err(RecordingError::NotInitialized)
    );
    assert_eq!(recorder.kind(), RecorderKind::External);
    assert!(recorder.current_path().is_none());
}

#[test]
fn test_external_init_rejects_file_path() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("not-a-dir");
    std::fs::write(&file, b"").unwrap();

    let recorder = ExternalProcessRecorder::new("/dev/video0");
    assert!(matches!(
        recorder.init(&file),
        Err(RecordingError::OutputDirectory(_))
    ));
}

#[test]
fn test_external_launch_failure() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = ExternalProcessRecorder::new("/dev/video0")
        .with_program("camcorder-test-no-such-encoder");
    recorder.init(dir.path()).unwrap();

    assert!(matches!(
        recorder.start(Resolution::new(640, 480), 30),
        Err(RecordingError::ProcessLaunch(_))
    ));
    assert!(!recorder.is_recording());
}

#[test]
fn test_external_stop_reaps_process() {
    let dir = tempfile::tempdir().unwrap();
    let spawner = Arc::new(FakeSpawner::new());
    let recorder = ExternalProcessRecorder::new("/dev/video4").with_spawner(spawner.clone());
    recorder.init(&dir.path().join("videos")).unwrap();
    assert!(dir.path().join("videos").is_dir());

    recorder.start(Resolution::new(1280, 720), 15).unwrap();
    assert!(recorder.is_recording());
    let pid = recorder.process_id().unwrap();
    assert_eq!(spawner.state(pid), Some(FakeState::Running));

    let command = spawner.last_command().unwrap();
    assert_eq!(command.program, "ffmpeg");
    assert!(command.args.windows(2).any(|w| w == ["-i", "/dev/video4"]));

    let path = recorder.current_path().unwrap();
    assert_eq!(path.parent(), Some(dir.path().join("videos").as_path()));
    let name = RecordingName::parse(file_name(&path)).unwrap();
    assert_eq!(name.resolution, Resolution::new(1280, 720));
    assert_eq!(name.framerate, 15);
    assert_eq!(command.args.last().map(String::as_str), path.to_str());

    recorder.stop();
    assert!(!recorder.is_recording());
    assert_eq!(spawner.state(pid), Some(FakeState::Reaped));
    assert_eq!(recorder.duration(), Duration::ZERO);
    assert_eq!(recorder.current_path(), Some(path));
}

#[test]
fn test_external_start_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let spawner = Arc::new(FakeSpawner::new());
    let recorder = ExternalProcessRecorder::new("/dev/video0").with_spawner(spawner.clone());
    recorder.init(dir.path()).unwrap();

    recorder.start(Resolution::new(640, 480), 30).unwrap();
    recorder.start(Resolution::new(640, 480), 30).unwrap();
    assert_eq!(spawner.table.lock().unwrap().len(), 1);

    recorder.stop();
    recorder.stop();
}

#[test]
fn test_external_duration_grows_while_recording() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = ExternalProcessRecorder::new("/dev/video0")
        .with_spawner(Arc::new(FakeSpawner::new()));
    recorder.init(dir.path()).unwrap();
    recorder.start(Resolution::new(640, 480), 30).unwrap();

    std::thread::sleep(Duration::from_millis(20));
    let first = recorder.duration();
    std::thread::sleep(Duration::from_millis(20));
    let second = recorder.duration();
    assert!(first > Duration::ZERO);
    assert!(second >= first);

    recorder.stop();
    assert_eq!(recorder.duration(), Duration::ZERO);
}

#[test]
fn test_external_notices_crashed_encoder() {
    let dir = tempfile::tempdir().unwrap();
    let spawner = Arc::new(FakeSpawner::new());
    let recorder = ExternalProcessRecorder::new("/dev/video0").with_spawner(spawner.clone());
    recorder.init(dir.path()).unwrap();
    recorder.start(Resolution::new(640, 480), 30).unwrap();
    let pid = recorder.process_id().unwrap();

    spawner.crash(pid, 1);
    assert!(wait_until(TIMEOUT, || !recorder.is_recording()));
    assert_eq!(spawner.state(pid), Some(FakeState::Reaped));

    // A new recording can be started after the crash
    recorder.start(Resolution::new(640, 480), 30).unwrap();
    assert!(recorder.is_recording());
    assert_ne!(recorder.process_id(), Some(pid));
    recorder.stop();
}

#[test]
fn test_external_drop_reaps_process() {
    let dir = tempfile::tempdir().unwrap();
    let spawner = Arc::new(FakeSpawner::new());
    let recorder = ExternalProcessRecorder::new("/dev/video0").with_spawner(spawner.clone());
    recorder.init(dir.path()).unwrap();
    recorder.start(Resolution::new(640, 480), 30).unwrap();
    let pid = recorder.process_id().unwrap();

    drop(recorder);
    assert_eq!(spawner.state(pid), Some(FakeState::Reaped));
}

#[test]
fn test_external_real_process_is_reaped() {
    let dir = tempfile::tempdir().unwrap();
    let recorder =
        ExternalProcessRecorder::new("/dev/video0").with_spawner(Arc::new(SleepSpawner));
    recorder.init(dir.path()).unwrap();
    recorder.start(Resolution::new(640, 480), 30).unwrap();

    let pid = recorder.process_id().unwrap();
    assert!(process_exists(pid));

    std::thread::sleep(Duration::from_millis(200));
    assert!(recorder.is_recording());
    assert!(recorder.duration() >= Duration::from_millis(200));

    recorder.stop();
    assert!(!process_exists(pid));
    assert_eq!(recorder.duration(), Duration::ZERO);
}

// ===== In-process recorder =====

fn in_process(factory: FakeEncoderFactory) -> InProcessRecorder {
    InProcessRecorder::new(Box::new(factory))
}

#[test]
fn test_in_process_requires_init() {
    let recorder = in_process(FakeEncoderFactory::default());
    assert_eq!(
        recorder.start(Resolution::new(640, 480), 30),
        Err(RecordingError::NotInitialized)
    );
    assert_eq!(recorder.kind(), RecorderKind::InProcess);
}

#[test]
fn test_in_process_writer_failure() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = in_process(FakeEncoderFactory {
        fail_open: true,
        ..FakeEncoderFactory::default()
    });
    recorder.init(dir.path()).unwrap();

    assert!(matches!(
        recorder.start(Resolution::new(640, 480), 30),
        Err(RecordingError::WriterInit(_))
    ));
    assert!(!recorder.is_recording());
}

#[test]
fn test_in_process_start_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let factory = FakeEncoderFactory::default();
    let events = factory.events();
    let recorder = in_process(factory);
    recorder.init(dir.path()).unwrap();

    recorder.start(Resolution::new(320, 240), 30).unwrap();
    let path = recorder.current_path();
    recorder.start(Resolution::new(320, 240), 30).unwrap();
    assert!(recorder.is_recording());
    assert_eq!(recorder.current_path(), path);

    recorder.stop();
    recorder.stop();
    let events = events.lock().unwrap();
    let opened = events
        .iter()
        .filter(|e| matches!(e, EncoderEvent::Opened(..)))
        .count();
    assert_eq!(opened, 1);
    assert_eq!(
        events
            .iter()
            .filter(|e| **e == EncoderEvent::Finished)
            .count(),
        1
    );
}

#[test]
fn test_in_process_duration_grows_while_recording() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = in_process(FakeEncoderFactory::default());
    recorder.init(dir.path()).unwrap();
    recorder.start(Resolution::new(320, 240), 30).unwrap();

    std::thread::sleep(Duration::from_millis(20));
    let first = recorder.duration();
    std::thread::sleep(Duration::from_millis(20));
    let second = recorder.duration();
    assert!(first > Duration::ZERO);
    assert!(second >= first);

    recorder.stop();
    assert_eq!(recorder.duration(), Duration::ZERO);
}

#[test]
fn test_in_process_writes_matching_frames() {
    let dir = tempfile::tempdir().unwrap();
    let factory = FakeEncoderFactory::default();
    let events = factory.events();
    let recorder = Arc::new(in_process(factory));
    recorder.init(dir.path()).unwrap();

    // Frames before start are ignored
    recorder.on_frame(&frame(320, 240, 0));

    recorder.start(Resolution::new(320, 240), 30).unwrap();
    let path = recorder.current_path().unwrap();

    let sink: Arc<dyn FrameSink> = recorder.clone();
    sink.on_frame(&frame(320, 240, 1));
    sink.on_frame(&frame(640, 480, 2));
    sink.on_frame(&frame(320, 240, 3));
    assert_eq!(recorder.frames_written(), 2);

    recorder.stop();
    recorder.on_frame(&frame(320, 240, 4));

    assert_eq!(
        *events.lock().unwrap(),
        vec![
            EncoderEvent::Opened(path.clone(), Resolution::new(320, 240), 30),
            EncoderEvent::Frame(1),
            EncoderEvent::Frame(3),
            EncoderEvent::Finished,
        ]
    );
    assert!(!recorder.is_recording());
    assert_eq!(recorder.current_path(), Some(path));
}

#[test]
fn test_in_process_write_failure_ends_recording() {
    let dir = tempfile::tempdir().unwrap();
    let factory = FakeEncoderFactory {
        fail_on_frame: Some(1),
        ..FakeEncoderFactory::default()
    };
    let events = factory.events();
    let recorder = in_process(factory);
    recorder.init(dir.path()).unwrap();
    recorder.start(Resolution::new(320, 240), 30).unwrap();

    recorder.process_frame(&frame(320, 240, 0));
    recorder.process_frame(&frame(320, 240, 1));
    assert!(!recorder.is_recording());
    assert_eq!(recorder.duration(), Duration::ZERO);

    recorder.process_frame(&frame(320, 240, 2));
    let events = events.lock().unwrap();
    assert_eq!(events.last(), Some(&EncoderEvent::Finished));
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, EncoderEvent::Frame(_)))
            .count(),
        1
    );
}

#[test]
fn test_in_process_drop_finishes_encoder() {
    let dir = tempfile::tempdir().unwrap();
    let factory = FakeEncoderFactory::default();
    let events = factory.events();
    let recorder = in_process(factory);
    recorder.init(dir.path()).unwrap();
    recorder.start(Resolution::new(320, 240), 30).unwrap();

    drop(recorder);
    assert_eq!(events.lock().unwrap().last(), Some(&EncoderEvent::Finished));
}
