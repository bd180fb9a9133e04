// Integration tests for the recorder entry point
//
// Permission gate, one-session rule, option parsing, supported modes and
// recording deletion.

use anyhow::Result;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use video_recorder::{
    CameraFacing, Capability, Config, ErrorCode, Orientation, PermissionState, Quality,
    RecordingOptions, SessionPhase, SimulatedBackend, StaticPermissions, SurfaceHandle,
    VideoRecorder,
};

fn config_in(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.storage.root = dir.path().to_path_buf();
    config
}

fn recorder(dir: &TempDir, backend: &SimulatedBackend) -> VideoRecorder {
    VideoRecorder::new(
        config_in(dir),
        backend.device_backend(),
        Arc::new(StaticPermissions::granted()),
    )
}

#[tokio::test]
async fn test_denied_microphone_blocks_audio_sessions() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let backend = SimulatedBackend::new();
    let probe = backend.probe();
    let permissions = StaticPermissions::default()
        .with(Capability::Camera, PermissionState::Granted)
        .with(Capability::Microphone, PermissionState::Denied);
    let recorder = VideoRecorder::new(
        config_in(&temp_dir),
        backend.device_backend(),
        Arc::new(permissions),
    );

    let err = recorder
        .open_session(RecordingOptions::default(), Some(SurfaceHandle::new()))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::PermissionDenied);
    assert_eq!(probe.open_cameras(), 0, "No camera opened without permission");

    // Video-only recording needs just the camera
    let options = RecordingOptions {
        enable_audio: false,
        ..RecordingOptions::default()
    };
    let (session, _completion) = recorder
        .open_session(options, Some(SurfaceHandle::new()))
        .await?;
    assert_eq!(session.phase(), SessionPhase::Previewing);

    Ok(())
}

#[tokio::test]
async fn test_unanswered_camera_permission_is_denied() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let backend = SimulatedBackend::new();
    let recorder = VideoRecorder::new(
        config_in(&temp_dir),
        backend.device_backend(),
        Arc::new(StaticPermissions::default()),
    );

    let err = recorder
        .open_session(RecordingOptions::default(), None)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::PermissionDenied);

    Ok(())
}

#[tokio::test]
async fn test_one_live_session_at_a_time() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let backend = SimulatedBackend::new();
    let probe = backend.probe();
    let recorder = recorder(&temp_dir, &backend);

    let (session, _completion) = recorder
        .open_session(RecordingOptions::default(), Some(SurfaceHandle::new()))
        .await?;
    session.start().await?;

    let err = recorder
        .open_session(RecordingOptions::default(), Some(SurfaceHandle::new()))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::AlreadyRecording);
    assert_eq!(probe.open_cameras(), 1, "Second session must not touch the camera");

    session.stop().await?;

    let (next, _completion) = recorder
        .open_session(RecordingOptions::default(), Some(SurfaceHandle::new()))
        .await?;
    assert_eq!(next.phase(), SessionPhase::Previewing);

    Ok(())
}

#[tokio::test]
async fn test_status_follows_current_session() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let backend = SimulatedBackend::new();
    let recorder = recorder(&temp_dir, &backend);

    assert!(recorder.status().await?.is_none());

    let (session, _completion) = recorder
        .open_session(RecordingOptions::default(), Some(SurfaceHandle::new()))
        .await?;
    let status = recorder.status().await?.unwrap();
    assert_eq!(status.phase, SessionPhase::Previewing);
    assert!(!status.is_recording);
    assert!(status.recording_id.is_none());

    let started = session.start().await?;
    let status = recorder.status().await?.unwrap();
    assert!(status.is_recording);
    assert_eq!(status.recording_id.as_deref(), Some(started.recording_id.as_str()));
    assert_eq!(status.video_path, Some(started.video_path.clone()));

    let result = session.stop().await?.into_result()?;
    let status = recorder.status().await?.unwrap();
    assert_eq!(status.phase, SessionPhase::Stopped);
    assert!(!status.is_recording);
    assert_eq!(status.current_duration, result.duration);

    Ok(())
}

#[test]
fn test_options_merge_with_configured_defaults() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let backend = SimulatedBackend::new();
    let mut config = config_in(&temp_dir);
    config.defaults.file_name_prefix = "clinic_visit".to_string();
    config.defaults.camera = CameraFacing::Front;

    let recorder = VideoRecorder::new(
        config,
        backend.device_backend(),
        Arc::new(StaticPermissions::granted()),
    );

    let options =
        recorder.options_from_json(r#"{"quality": "low", "maxDuration": 10, "orientation": "landscape"}"#)?;
    assert_eq!(options.quality, Quality::Low);
    assert_eq!(options.max_duration, 10.0);
    assert_eq!(options.orientation, Orientation::Landscape);
    assert_eq!(options.file_name_prefix, "clinic_visit");
    assert_eq!(options.camera, CameraFacing::Front);
    assert!(options.enable_audio);

    Ok(())
}

#[test]
fn test_invalid_option_payloads() {
    let temp_dir = TempDir::new().unwrap();
    let backend = SimulatedBackend::new();
    let recorder = recorder(&temp_dir, &backend);

    for payload in [
        r#"{"quality": "ultra"}"#,
        r#"{"maxDuration": -1}"#,
        r#"{"fileNamePrefix": "../escape"}"#,
        r#"{"fileNamePrefix": ""}"#,
        r#"{"camera": 3}"#,
        r#"["high"]"#,
        "not json",
    ] {
        let err = recorder.options_from_json(payload).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidOptions, "payload {}", payload);
    }
}

#[test]
fn test_supported_video_modes() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let backend = SimulatedBackend::new();
    let recorder = recorder(&temp_dir, &backend);

    let modes = recorder.supported_video_modes(CameraFacing::Back);
    let sizes: Vec<(u32, u32)> = modes.iter().map(|m| (m.width, m.height)).collect();
    assert_eq!(
        sizes,
        vec![(720, 480), (1280, 720), (1920, 1080), (3840, 2160)]
    );
    assert!(modes.iter().all(|m| m.mime_type == "video/mp4"));

    let json = serde_json::to_value(&modes[0])?;
    assert_eq!(json["type"], "video/mp4");
    assert_eq!(json["width"], 720);

    Ok(())
}

#[test]
fn test_supported_audio_modes() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let backend = SimulatedBackend::new();
    let recorder = recorder(&temp_dir, &backend);

    let modes = recorder.supported_audio_modes();
    let types: Vec<&str> = modes.iter().map(|m| m.mime_type.as_str()).collect();
    assert_eq!(types, vec!["audio/mp4", "audio/wav", "audio/aac"]);
    assert!(modes.iter().all(|m| m.width == 0 && m.height == 0));

    Ok(())
}

#[test]
fn test_delete_recording_with_thumbnail() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let backend = SimulatedBackend::new();
    let recorder = recorder(&temp_dir, &backend);

    let video = temp_dir.path().join("video_recording_1.mp4");
    let thumbnail = temp_dir.path().join("video_recording_1_thumbnail.jpg");
    fs::write(&video, b"video")?;
    fs::write(&thumbnail, b"jpeg")?;

    recorder.delete_recording(&video, true)?;
    assert!(!video.exists());
    assert!(!thumbnail.exists());

    // Already gone is fine
    recorder.delete_recording(&video, true)?;

    let err = recorder
        .delete_recording(std::path::Path::new(""), false)
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidOptions);

    Ok(())
}

#[test]
fn test_config_file_overrides_defaults() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("recorder.toml");
    fs::write(
        &path,
        r#"
[storage]
root = "/var/lib/recorder"
videos_dir = "clips"

[indicator]
blink_interval_ms = 250

[defaults]
quality = "medium"
max_duration = 60.0
file_name_prefix = "session"
"#,
    )?;

    let config = Config::load(path.to_str().unwrap())?;
    assert_eq!(config.storage.root, std::path::PathBuf::from("/var/lib/recorder"));
    assert_eq!(config.storage.videos_dir, "clips");
    assert_eq!(config.indicator.blink_interval_ms, 250);
    assert_eq!(config.indicator.elapsed_interval_ms, 1000);
    assert_eq!(config.defaults.quality, Quality::Medium);
    assert_eq!(config.defaults.max_duration, 60.0);
    assert_eq!(config.defaults.file_name_prefix, "session");
    assert_eq!(config.defaults.camera, CameraFacing::Back);

    Ok(())
}

#[test]
fn test_config_rejects_invalid_defaults() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("bad.toml");
    fs::write(&path, "[defaults]\nmax_duration = -5.0\n")?;

    assert!(Config::load(path.to_str().unwrap()).is_err());
    Ok(())
}
