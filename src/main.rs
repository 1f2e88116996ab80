use std::env;

use wasm_volume::enums::DataType;
use wasm_volume::volume::{ImageMetadata, Volume, VoxelData};
use wasm_volume::wasm_processor::ProcessorConfig;
use wasm_volume::worker::ImageWorker;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt::init();

    let command = env::args()
        .nth(1)
        .unwrap_or_else(|| "-dehaze 5 -dog 2 3.2".to_owned());
    let metadata = ImageMetadata {
        id: "demo".to_owned(),
        datatype_code: DataType::Float32.code(),
        nx: 64,
        ny: 64,
        nz: 64,
        nt: 1,
        dx: 1.0,
        dy: 1.0,
        dz: 1.0,
        dt: 0.0,
        bpv: 4,
    };
    let mut volume = Volume::new(metadata, VoxelData::Float32(vec![0.0; 64 * 64 * 64]));

    let mut worker = ImageWorker::spawn(ProcessorConfig::default());
    let result = worker
        .process(volume.to_request(&command, false))
        .await
        .expect("should have processed the demo volume");
    volume
        .replace_data(result)
        .expect("result should belong to the demo volume");
    println!("intensity range: {:?}", volume.intensity_range());
}
