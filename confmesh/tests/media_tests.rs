use std::sync::Arc;
use std::time::Duration;

use confmesh::config::MediaConstraints;
use confmesh::error::MediaAccessError;
use confmesh::media::{MediaCaptureManager, SimulatedDevices};

fn constraints() -> MediaConstraints {
    MediaConstraints::default()
}

#[tokio::test]
async fn test_acquire_returns_held_stream() {
    let devices = Arc::new(SimulatedDevices::new());
    let manager = MediaCaptureManager::new(devices.clone());

    let first = manager.acquire(constraints()).await.unwrap();
    let second = manager.acquire(constraints()).await.unwrap();
    assert!(first.ptr_eq(&second));
    assert_eq!(first.audio_tracks().len(), 1);
    assert_eq!(first.video_tracks().len(), 1);
    assert_eq!(devices.requests(), 1);
}

#[tokio::test]
async fn test_concurrent_acquire_keeps_one_stream() {
    let devices =
        Arc::new(SimulatedDevices::new().with_prompt_delay(Duration::from_millis(20)));
    let manager = MediaCaptureManager::new(devices.clone());

    let (a, b) = tokio::join!(manager.acquire(constraints()), manager.acquire(constraints()));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert!(a.ptr_eq(&b));
    assert!(a.tracks().iter().all(|t| t.is_live()));
}

#[tokio::test]
async fn test_toggle_keeps_device_open() {
    let devices = Arc::new(SimulatedDevices::new());
    let manager = MediaCaptureManager::new(devices.clone());
    let stream = manager.acquire(constraints()).await.unwrap();

    assert_eq!(manager.set_audio_enabled(false), Some(false));
    assert_eq!(manager.audio_enabled(), Some(false));
    assert_eq!(manager.set_video_enabled(false), Some(false));
    let audio = stream.audio_tracks().remove(0);
    assert!(!audio.is_enabled());
    assert!(!audio.is_ended());

    assert_eq!(manager.set_audio_enabled(true), Some(true));
    assert!(audio.is_enabled());
    assert!(manager.stream().unwrap().ptr_eq(&stream));
    assert_eq!(devices.requests(), 1);
}

#[tokio::test]
async fn test_toggle_missing_track() {
    let devices = Arc::new(SimulatedDevices::new().without_camera());
    let manager = MediaCaptureManager::new(devices);
    assert_eq!(manager.set_video_enabled(false), None);

    let stream = manager
        .acquire(MediaConstraints {
            audio: true,
            video: false,
        })
        .await
        .unwrap();
    assert_eq!(stream.len(), 1);
    assert_eq!(manager.set_video_enabled(false), None);
    assert_eq!(manager.video_enabled(), None);
    assert_eq!(manager.set_audio_enabled(false), Some(false));
}

#[tokio::test]
async fn test_denied_access() {
    let devices = Arc::new(SimulatedDevices::new());
    devices.deny(MediaAccessError::not_allowed("Permission denied"));
    let manager = MediaCaptureManager::new(devices.clone());

    let err = manager.acquire(constraints()).await.unwrap_err();
    assert_eq!(err.name, "NotAllowedError");
    assert_eq!(err.message, "Permission denied");
    assert!(manager.stream().is_none());
    assert!(!manager.release());
}

#[tokio::test]
async fn test_missing_device() {
    let manager = MediaCaptureManager::new(Arc::new(SimulatedDevices::new().without_camera()));
    let err = manager.acquire(constraints()).await.unwrap_err();
    assert_eq!(err.name, "NotFoundError");
}

#[tokio::test]
async fn test_release_is_idempotent() {
    let manager = MediaCaptureManager::new(Arc::new(SimulatedDevices::new()));
    let stream = manager.acquire(constraints()).await.unwrap();

    assert!(manager.release());
    assert!(stream.tracks().iter().all(|t| t.is_ended()));
    assert!(manager.stream().is_none());
    assert!(!manager.release());
}
