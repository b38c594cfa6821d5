//! End-to-end packing tests: manifest + schema in, containers out, and the
//! unpack/re-pack round trip.

use std::fs;
use std::path::{Path, PathBuf};

use arrow::array::{Array, Float64Array, Int16Array, ListArray, StringArray};
use tempfile::tempdir;

use rowpack::builder::{self, ProducerStamp};
use rowpack::manifest::Manifest;
use rowpack::parsers::audio;
use rowpack::plan::{plan, PlanMode};
use rowpack::pool;
use rowpack::reader::Container;
use rowpack::schema::{resolve, RawSchema};
use rowpack::unpack::unpack;

const SCHEMA: &str = r#"
[datasets.demo]
attrs = { license = "CC0" }

[datasets.demo.data]
file = "dataset.csv"

[datasets.demo.data.fields.audio]
column = "filepath"
parser = "audio_int16"

[datasets.demo.data.fields.split]
column = "split"
parser = "utf8"

[datasets.demo.data.fields.snr]
column = "snr"
parser = "float64"
"#;

/// Three rows with audio, a string field, and a float field.
fn write_fixture(root: &Path) -> PathBuf {
    fs::create_dir_all(root.join("clips")).unwrap();
    audio::write_i16(&root.join("clips/a.wav"), &[1, 2, 3, 4], 16_000).unwrap();
    audio::write_i16(&root.join("clips/b.wav"), &[-5, 6], 16_000).unwrap();
    audio::write_i16(&root.join("clips/c.wav"), &[7, 8, 9], 16_000).unwrap();

    fs::write(
        root.join("dataset.csv"),
        "filepath,split,snr\n\
         clips/a.wav,train,1.5\n\
         clips/b.wav,train,-3.25\n\
         clips/c.wav,val,0.125\n",
    )
    .unwrap();

    let schema_path = root.join("rowpack.toml");
    fs::write(&schema_path, SCHEMA).unwrap();
    schema_path
}

fn pack_single(root: &Path, output: &Path) -> PathBuf {
    let raw = RawSchema::load(&write_fixture(root)).unwrap();
    let manifest = Manifest::from_path(&raw.manifest_path(None).unwrap()).unwrap();
    let spec = resolve(&raw, None, manifest.header()).unwrap();

    let plan = plan(manifest.row_count(), PlanMode::Single).unwrap();
    let container = builder::partition_path(output, 0, 1);
    builder::build(
        &spec,
        &manifest,
        &plan.ranges()[0],
        &container,
        &ProducerStamp::current(),
    )
    .unwrap();
    container
}

#[test]
fn single_partition_container_holds_typed_fields() {
    let dir = tempdir().unwrap();
    let container_path = pack_single(dir.path(), &dir.path().join("out/demo"));

    let container = Container::open(&container_path).unwrap();
    assert!(!container.is_virtual());
    assert_eq!(container.row_count(), 3);

    let attrs = container.attrs();
    assert_eq!(attrs.get("license").map(String::as_str), Some("CC0"));
    assert!(attrs.get("producer").unwrap().starts_with("rowpack"));
    assert!(attrs.contains_key("creation_date"));

    let names: Vec<String> = container.fields().iter().map(|f| f.name.clone()).collect();
    assert_eq!(names, ["audio", "split", "snr"]);

    // String field preserves row order
    let split = container.read_field("split").unwrap();
    let split = split
        .values
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap();
    assert_eq!(split.value(0), "train");
    assert_eq!(split.value(1), "train");
    assert_eq!(split.value(2), "val");

    // Audio field carries samples, sample rate, and provenance paths
    let audio_field = container.read_field("audio").unwrap();
    assert_eq!(
        audio_field.info.metadata.get("sample_rate").map(String::as_str),
        Some("16000")
    );
    let lists = audio_field
        .values
        .as_any()
        .downcast_ref::<ListArray>()
        .unwrap();
    assert_eq!(lists.value(0).len(), 4);
    assert_eq!(lists.value(1).len(), 2);
    assert_eq!(lists.value(2).len(), 3);
    let first = lists.value(0);
    let first = first.as_any().downcast_ref::<Int16Array>().unwrap();
    assert_eq!(first.values().to_vec(), vec![1i16, 2, 3, 4]);

    let paths = audio_field.paths.unwrap();
    let paths = paths.as_any().downcast_ref::<StringArray>().unwrap();
    assert_eq!(paths.value(0), "clips/a.wav");

    let snr = container.read_field("snr").unwrap();
    let snr = snr.values.as_any().downcast_ref::<Float64Array>().unwrap();
    assert_eq!(snr.values().to_vec(), vec![1.5, -3.25, 0.125]);
}

#[test]
fn unpack_then_repack_preserves_field_arrays() {
    let dir = tempdir().unwrap();
    let container_path = pack_single(dir.path(), &dir.path().join("out/demo"));

    // Unpack into a fresh folder
    let restored = dir.path().join("restored");
    let report = unpack(&container_path, &restored).unwrap();
    assert_eq!(report.rows, 3);
    assert_eq!(report.fields, 3);
    assert!(report.manifest_path.is_file());
    assert!(report.schema_path.is_file());
    assert!(restored.join("data/audio/clips/a.wav").is_file());

    // Re-pack from the reconstructed schema and manifest
    let raw = RawSchema::load(&report.schema_path).unwrap();
    let manifest = Manifest::from_path(&raw.manifest_path(None).unwrap()).unwrap();
    let spec = resolve(&raw, None, manifest.header()).unwrap();
    let plan = plan(manifest.row_count(), PlanMode::Single).unwrap();
    let repacked_path = dir.path().join("repacked.rpk");
    builder::build(
        &spec,
        &manifest,
        &plan.ranges()[0],
        &repacked_path,
        &ProducerStamp::current(),
    )
    .unwrap();

    // Field arrays must match byte for byte
    let original = Container::open(&container_path).unwrap();
    let repacked = Container::open(&repacked_path).unwrap();
    for field in ["audio", "split", "snr"] {
        let a = original.read_field(field).unwrap().values;
        let b = repacked.read_field(field).unwrap().values;
        assert_eq!(
            a.to_data(),
            b.to_data(),
            "field '{field}' changed across the round trip"
        );
    }
}

#[test]
fn ten_rows_across_four_partitions_front_load_sizes() {
    let dir = tempdir().unwrap();
    let rows: Vec<Vec<String>> = (0..10).map(|i| vec![i.to_string()]).collect();
    let manifest = Manifest::from_parts(
        dir.path().join("dataset.csv"),
        vec!["value".to_string()],
        rows,
    );
    let spec = rowpack::schema::DatasetSpec {
        name: "demo".to_string(),
        attrs: vec![],
        manifest_path: manifest.path().to_path_buf(),
        fields: vec![rowpack::schema::FieldSpec {
            name: "value".to_string(),
            column: "value".to_string(),
            column_index: 0,
            parser: rowpack::parsers::ParserKind::Int16,
        }],
    };

    let plan = plan(10, PlanMode::FixedCount(4)).unwrap();
    let outputs: Vec<PathBuf> = plan
        .iter()
        .map(|r| builder::partition_path(&dir.path().join("set"), r.index, plan.len()))
        .collect();
    assert!(outputs[0].ends_with("set.pt0.rpk"));
    assert!(outputs[3].ends_with("set.pt3.rpk"));

    let results = pool::run_all(
        &plan,
        &spec,
        &manifest,
        &outputs,
        2,
        &ProducerStamp::current(),
    );

    let sizes: Vec<usize> = results
        .iter()
        .map(|(_, result)| result.as_ref().unwrap().rows)
        .collect();
    assert_eq!(sizes, [3, 3, 2, 2]);

    // Each partition is a standalone, readable container
    let mut total = 0;
    for output in &outputs {
        total += Container::open(output).unwrap().row_count();
    }
    assert_eq!(total, 10);
}

#[test]
fn missing_audio_file_fails_its_partition_and_names_the_row() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("clips")).unwrap();
    audio::write_i16(&dir.path().join("clips/a.wav"), &[1], 8_000).unwrap();
    audio::write_i16(&dir.path().join("clips/c.wav"), &[3], 8_000).unwrap();

    fs::write(
        dir.path().join("dataset.csv"),
        "filepath\nclips/a.wav\nclips/missing.wav\nclips/c.wav\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("rowpack.toml"),
        r#"
[datasets.demo.data]
file = "dataset.csv"

[datasets.demo.data.fields.audio]
column = "filepath"
parser = "audio_float32"
"#,
    )
    .unwrap();

    let raw = RawSchema::load(&dir.path().join("rowpack.toml")).unwrap();
    let manifest = Manifest::from_path(&raw.manifest_path(None).unwrap()).unwrap();
    let spec = resolve(&raw, None, manifest.header()).unwrap();
    let plan = plan(3, PlanMode::FixedCount(3)).unwrap();
    let outputs: Vec<PathBuf> = plan
        .iter()
        .map(|r| builder::partition_path(&dir.path().join("set"), r.index, plan.len()))
        .collect();

    let results = pool::run_all(
        &plan,
        &spec,
        &manifest,
        &outputs,
        2,
        &ProducerStamp::current(),
    );

    assert!(results[0].1.is_ok());
    assert!(results[2].1.is_ok());
    let error = results[1].1.as_ref().unwrap_err().to_string();
    assert!(error.contains("audio"), "error should name the field: {error}");
    assert!(error.contains("row 1"), "error should name the row: {error}");

    assert!(outputs[0].is_file());
    assert!(!outputs[1].exists());
    assert!(outputs[2].is_file());
}
