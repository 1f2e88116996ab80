mod common;

use common::*;

use wasm_volume::module_loader::ModuleLoadError;
use wasm_volume::volume::{Volume, VoxelData};
use wasm_volume::wasm_processor::{ProcessorConfig, ProcessorError};
use wasm_volume::worker::{ImageWorker, WorkerError};

fn float_volume(id: &str) -> Volume {
    let values: Vec<f32> = (0..64).map(|i| i as f32).collect();
    Volume::new(float_metadata(id, 4), VoxelData::Float32(values))
}

#[tokio::test]
async fn round_trip_replaces_the_volume_data() {
    let dir = tempfile::tempdir().unwrap();
    let mut worker = ImageWorker::spawn(config(write_module(&dir, IDENTITY_MODULE)));

    let mut volume = float_volume("volume-0");
    let result = worker
        .process(volume.to_request("-noop", false))
        .await
        .unwrap();
    volume.replace_data(result).unwrap();

    assert_eq!(
        volume.data,
        VoxelData::Float32((0..64).map(|i| i as f32).collect())
    );
}

#[tokio::test]
async fn overlay_results_become_a_new_layer() {
    let dir = tempfile::tempdir().unwrap();
    let mut worker = ImageWorker::spawn(config(write_module(&dir, INCREMENT_MODULE)));

    let volume = Volume::new(
        uint8_metadata("volume-0", 2, 2, 2),
        VoxelData::Uint8(vec![0; 8]),
    );
    let result = worker
        .process(volume.to_request("-add 1", true))
        .await
        .unwrap();
    assert!(result.is_new_layer);

    let layer = volume.new_layer(result, "layer-1").unwrap();
    assert_eq!(layer.metadata.id, "layer-1");
    assert_eq!(layer.data, VoxelData::Uint8(vec![1; 8]));
    // The source volume is untouched.
    assert_eq!(volume.data, VoxelData::Uint8(vec![0; 8]));
}

#[tokio::test]
async fn failures_reply_with_the_request_id_and_leave_the_volume_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let mut worker = ImageWorker::spawn(config(write_module(&dir, FAILING_MODULE)));

    let volume = float_volume("volume-0");
    worker.send(volume.to_request("-broken", false)).unwrap();
    let reply = worker.next_reply().await.unwrap();

    assert_eq!(reply.id, "volume-0");
    assert!(matches!(
        reply.outcome,
        Err(WorkerError::Processor(ProcessorError::CommandFailed {
            status: 7,
            ..
        }))
    ));
    assert_eq!(
        volume.data,
        VoxelData::Float32((0..64).map(|i| i as f32).collect())
    );
}

#[tokio::test]
async fn every_request_gets_exactly_one_reply_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut worker = ImageWorker::spawn(config(write_module(&dir, IDENTITY_MODULE)));

    let good = float_volume("volume-0");
    let mut bad = float_volume("volume-1");
    bad.metadata.datatype_code = 999;
    let last = float_volume("volume-2");

    worker.send(good.to_request("", false)).unwrap();
    worker.send(bad.to_request("", false)).unwrap();
    worker.send(last.to_request("", false)).unwrap();

    let first = worker.next_reply().await.unwrap();
    assert_eq!(first.id, "volume-0");
    assert!(first.outcome.is_ok());

    let second = worker.next_reply().await.unwrap();
    assert_eq!(second.id, "volume-1");
    assert!(matches!(
        second.outcome,
        Err(WorkerError::Processor(ProcessorError::UnsupportedDataType(
            999
        )))
    ));

    let third = worker.next_reply().await.unwrap();
    assert_eq!(third.id, "volume-2");
    assert!(third.outcome.is_ok());
}

#[tokio::test]
async fn module_load_failures_are_reported_not_swallowed() {
    let dir = tempfile::tempdir().unwrap();
    let mut worker = ImageWorker::spawn(ProcessorConfig {
        wasm_path: dir.path().join("missing.wasm"),
        ..ProcessorConfig::default()
    });

    let err = worker
        .process(float_volume("volume-0").to_request("", false))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WorkerError::Processor(ProcessorError::ModuleLoad(ModuleLoadError::Io { .. }))
    ));
}
