//! Integration tests for glbview-ingest: file-backed chunked loading
//! end to end through container validation, parsing and bookkeeping.

use std::io::Write;

use glbview_ingest::{
    glb, scene, ByteSource, CancelToken, ChunkedByteLoader, LoadError, Progress, ProgressPhase,
    ProgressTracker, REFERENCE_SIZE,
};

/// Build a minimal single-triangle GLB: one buffer holding three
/// positions and three u32 indices, one mesh, one node, one scene.
fn tiny_glb() -> Vec<u8> {
    let positions: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [2.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
    let indices: [u32; 3] = [0, 1, 2];

    let mut bin = Vec::new();
    for v in &positions {
        for c in v {
            bin.extend_from_slice(&c.to_le_bytes());
        }
    }
    for i in &indices {
        bin.extend_from_slice(&i.to_le_bytes());
    }

    let json: &[u8] = br#"{
            "asset": {"version": "2.0"},
            "scene": 0,
            "scenes": [{"nodes": [0]}],
            "nodes": [{"mesh": 0}],
            "meshes": [{"primitives": [{"attributes": {"POSITION": 0}, "indices": 1, "mode": 4}]}],
            "accessors": [
                {"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                  "min": [0.0, 0.0, 0.0], "max": [2.0, 1.0, 0.0]},
                {"bufferView": 1, "componentType": 5125, "count": 3, "type": "SCALAR"}
            ],
            "bufferViews": [
                {"buffer": 0, "byteOffset": 0, "byteLength": 36},
                {"buffer": 0, "byteOffset": 36, "byteLength": 12}
            ],
            "buffers": [{"byteLength": 48}]
        }"#;

    let json_padding = (4 - json.len() % 4) % 4;
    let bin_padding = (4 - bin.len() % 4) % 4;
    let total = 12 + 8 + json.len() + json_padding + 8 + bin.len() + bin_padding;

    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(b"glTF");
    out.extend_from_slice(&2u32.to_le_bytes());
    out.extend_from_slice(&(total as u32).to_le_bytes());
    out.extend_from_slice(&((json.len() + json_padding) as u32).to_le_bytes());
    out.extend_from_slice(&glb::CHUNK_JSON.to_le_bytes());
    out.extend_from_slice(json);
    out.extend(std::iter::repeat(b' ').take(json_padding));
    out.extend_from_slice(&((bin.len() + bin_padding) as u32).to_le_bytes());
    out.extend_from_slice(&glb::CHUNK_BIN.to_le_bytes());
    out.extend_from_slice(&bin);
    out.extend(std::iter::repeat(0u8).take(bin_padding));
    out
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("create temp file");
    file.write_all(bytes).expect("write temp file");
    file.flush().expect("flush temp file");
    file
}

fn load_file(path: &std::path::Path, chunk_size: usize) -> (Vec<u8>, Vec<Progress>) {
    let mut reports = Vec::new();
    let buffer = {
        let source = ByteSource::open(path).expect("open source");
        let loader = ChunkedByteLoader::new(chunk_size).expect("loader");
        let mut tracker = ProgressTracker::new(ProgressPhase::Read, |p| reports.push(p));
        loader
            .load(source, &mut tracker, &CancelToken::new())
            .expect("load")
    };
    (buffer, reports)
}

#[test]
fn file_round_trip_reproduces_bytes_for_all_chunk_sizes() {
    let payload: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
    let file = write_temp(&payload);

    // Divisible, remainder, oversized and single-byte chunk sizes.
    for chunk_size in [100, 333, 4096, 1] {
        let (buffer, reports) = load_file(file.path(), chunk_size);
        assert_eq!(buffer, payload, "chunk size {chunk_size}");
        let expected_chunks = payload.len().div_ceil(chunk_size);
        assert!(
            reports.len() <= expected_chunks,
            "at most one report per chunk"
        );
        assert_eq!(reports.last().unwrap().fraction, 1.0);
        for pair in reports.windows(2) {
            assert!(pair[1].fraction >= pair[0].fraction);
        }
    }
}

#[test]
fn empty_file_completes_immediately() {
    let file = write_temp(&[]);
    let (buffer, reports) = load_file(file.path(), 64);
    assert!(buffer.is_empty());
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].fraction, 1.0);
}

#[test]
fn truncated_file_read_carries_offset() {
    // Declare a longer stream than the backing data provides.
    let source = ByteSource::from_reader(std::io::Cursor::new(vec![0u8; 30]), Some(100));
    let loader = ChunkedByteLoader::new(10).unwrap();
    let mut tracker = ProgressTracker::sink();
    let err = loader
        .load(source, &mut tracker, &CancelToken::new())
        .unwrap_err();
    assert!(matches!(
        err,
        LoadError::Truncated {
            declared: 100,
            received: 30
        }
    ));
}

#[test]
fn glb_pipeline_end_to_end() {
    init_tracing();
    let bytes = tiny_glb();
    let file = write_temp(&bytes);

    // Read phase: small chunks force many iterations.
    let (buffer, reports) = load_file(file.path(), 16);
    assert_eq!(buffer, bytes);
    assert_eq!(reports.last().unwrap().fraction, 1.0);

    // Container validation sees one JSON and one BIN chunk.
    assert!(glb::is_glb(&buffer));
    let chunks = glb::validate(&buffer).expect("valid container");
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].kind, glb::CHUNK_JSON);
    assert_eq!(chunks[1].kind, glb::CHUNK_BIN);

    // Parse and summarize.
    let (document, buffers, _images) = scene::parse(&buffer).expect("parse");
    assert_eq!(buffers.len(), 1);
    let summary = scene::summarize(&document);
    assert_eq!(summary.triangle_count, 1);
    assert_eq!(summary.vertex_count, 3);
    assert_eq!(summary.bounding.min, [0.0, 0.0, 0.0]);
    assert_eq!(summary.bounding.max, [2.0, 1.0, 0.0]);

    // Normalization fits the largest dimension to the reference size
    // and recenters at the origin.
    let norm = summary.normalization;
    assert_eq!(norm.scale, REFERENCE_SIZE / 2.0);
    let lo = norm.apply(summary.bounding.min);
    let hi = norm.apply(summary.bounding.max);
    assert_eq!(hi[0] - lo[0], REFERENCE_SIZE);
    assert_eq!(lo[0] + hi[0], 0.0);
    assert_eq!(lo[1] + hi[1], 0.0);
}

#[test]
fn corrupt_container_is_rejected_before_parse() {
    let mut bytes = tiny_glb();
    bytes[0] = b'x';
    let file = write_temp(&bytes);
    let (buffer, _) = load_file(file.path(), 64);
    assert!(!glb::is_glb(&buffer));
    assert!(matches!(
        glb::validate(&buffer),
        Err(glb::GlbError::BadMagic(_))
    ));
}
