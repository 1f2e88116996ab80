#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;
use wasm_volume::enums::DataType;
use wasm_volume::memory::MemoryConfig;
use wasm_volume::volume::ImageMetadata;
use wasm_volume::wasm_processor::ProcessorConfig;

/// Module whose `process` leaves the image untouched and reports success.
pub const IDENTITY_MODULE: &str = r#"
(module
  (import "env" "memory" (memory 1))
  (import "env" "walloc" (func $walloc (param i32) (result i32)))
  (import "env" "wfree" (func $wfree (param i32)))
  (export "walloc" (func $walloc))
  (export "wfree" (func $wfree))
  (func (export "process")
        (param $img i32) (param $datatype i32)
        (param $nx i32) (param $ny i32) (param $nz i32) (param $nt i32)
        (param $dx f64) (param $dy f64) (param $dz f64) (param $dt f64)
        (param $cmd i32) (result i32)
    i32.const 0))
"#;

/// Module whose `process` adds one to every voxel byte (8-bit grids).
pub const INCREMENT_MODULE: &str = r#"
(module
  (import "env" "memory" (memory 1))
  (import "env" "walloc" (func $walloc (param i32) (result i32)))
  (import "env" "wfree" (func $wfree (param i32)))
  (export "walloc" (func $walloc))
  (export "wfree" (func $wfree))
  (func (export "process")
        (param $img i32) (param $datatype i32)
        (param $nx i32) (param $ny i32) (param $nz i32) (param $nt i32)
        (param $dx f64) (param $dy f64) (param $dz f64) (param $dt f64)
        (param $cmd i32) (result i32)
    (local $n i32) (local $i i32)
    local.get $nx
    local.get $ny
    i32.mul
    local.get $nz
    i32.mul
    local.get $nt
    i32.mul
    local.set $n
    (block $done
      (loop $next
        local.get $i
        local.get $n
        i32.ge_s
        br_if $done
        local.get $img
        local.get $i
        i32.add
        local.get $img
        local.get $i
        i32.add
        i32.load8_u
        i32.const 1
        i32.add
        i32.store8
        local.get $i
        i32.const 1
        i32.add
        local.set $i
        br $next))
    i32.const 0))
"#;

/// Module whose `process` returns the command string's length as its
/// status, so any non-empty command fails with a length-revealing code.
pub const STRLEN_STATUS_MODULE: &str = r#"
(module
  (import "env" "memory" (memory 1))
  (import "env" "walloc" (func $walloc (param i32) (result i32)))
  (import "env" "wfree" (func $wfree (param i32)))
  (export "walloc" (func $walloc))
  (export "wfree" (func $wfree))
  (func (export "process")
        (param $img i32) (param $datatype i32)
        (param $nx i32) (param $ny i32) (param $nz i32) (param $nt i32)
        (param $dx f64) (param $dy f64) (param $dz f64) (param $dt f64)
        (param $cmd i32) (result i32)
    (local $len i32)
    (block $done
      (loop $next
        local.get $cmd
        local.get $len
        i32.add
        i32.load8_u
        i32.eqz
        br_if $done
        local.get $len
        i32.const 1
        i32.add
        local.set $len
        br $next))
    local.get $len))
"#;

/// Module whose `process` always fails with status 7.
pub const FAILING_MODULE: &str = r#"
(module
  (import "env" "memory" (memory 1))
  (import "env" "walloc" (func $walloc (param i32) (result i32)))
  (import "env" "wfree" (func $wfree (param i32)))
  (export "walloc" (func $walloc))
  (export "wfree" (func $wfree))
  (func (export "process")
        (param $img i32) (param $datatype i32)
        (param $nx i32) (param $ny i32) (param $nz i32) (param $nt i32)
        (param $dx f64) (param $dy f64) (param $dz f64) (param $dt f64)
        (param $cmd i32) (result i32)
    i32.const 7))
"#;

/// Module missing the `walloc` export.
pub const NO_ALLOC_MODULE: &str = r#"
(module
  (import "env" "memory" (memory 1))
  (import "env" "wfree" (func $wfree (param i32)))
  (export "wfree" (func $wfree))
  (func (export "process")
        (param $img i32) (param $datatype i32)
        (param $nx i32) (param $ny i32) (param $nz i32) (param $nt i32)
        (param $dx f64) (param $dy f64) (param $dz f64) (param $dt f64)
        (param $cmd i32) (result i32)
    i32.const 0))
"#;

pub fn write_module(dir: &TempDir, wat: &str) -> PathBuf {
    let path = dir.path().join("process-image.wat");
    fs::write(&path, wat).expect("fixture module should be writable");
    path
}

pub fn config(wasm_path: PathBuf) -> ProcessorConfig {
    ProcessorConfig {
        wasm_path,
        memory: MemoryConfig {
            initial_pages: 4,
            maximum_pages: 64,
        },
    }
}

pub fn float_metadata(id: &str, n: u32) -> ImageMetadata {
    ImageMetadata {
        id: id.to_owned(),
        datatype_code: DataType::Float32.code(),
        nx: n,
        ny: n,
        nz: n,
        nt: 1,
        dx: 1.0,
        dy: 1.0,
        dz: 1.0,
        dt: 0.0,
        bpv: 4,
    }
}

pub fn uint8_metadata(id: &str, nx: u32, ny: u32, nz: u32) -> ImageMetadata {
    ImageMetadata {
        id: id.to_owned(),
        datatype_code: DataType::Uint8.code(),
        nx,
        ny,
        nz,
        nt: 1,
        dx: 1.0,
        dy: 1.0,
        dz: 1.0,
        dt: 0.0,
        bpv: 1,
    }
}
