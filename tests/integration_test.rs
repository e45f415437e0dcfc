//! Integration tests for synchronized multi-stream replay

use std::fs::{self, File};
use std::path::Path;

use tempfile::TempDir;

use synclog::config::Config;
use synclog::reader::{FrameMode, FramedRawReader, TimestampIndexReader, TimestampedRecordReader};
use synclog::source::{ByteSource, DecodedStream, Decoder};
use synclog::{SyncLogError, TimeValue};

const FRAME_SIZE: usize = 4;

/// Passes the compressed sibling through unchanged
struct CopyDecoder;

impl Decoder for CopyDecoder {
    fn open(&self, archive: &Path) -> synclog::Result<DecodedStream> {
        Ok(DecodedStream::new(File::open(archive)?))
    }
}

fn t(s: &str) -> TimeValue {
    s.parse().unwrap()
}

fn piped_source(config: &Config) -> ByteSource {
    ByteSource::with_decoder(&config.source, Box::new(CopyDecoder))
}

/// Frame `i` is `FRAME_SIZE` bytes of value `i`
fn raw_frames(count: u8) -> Vec<u8> {
    (0..count).flat_map(|i| [i; FRAME_SIZE]).collect()
}

fn color_timestamps(count: u32) -> String {
    (0..count)
        .map(|i| {
            let time = t("10.000") + i64::from(i * 33);
            format!("{time} {i}, {}\n", 2_032_376_140 + i)
        })
        .collect()
}

#[test]
fn test_replay_two_streams_at_fixed_rate() {
    let dir = TempDir::new().unwrap();
    let config = Config::default();

    let color_ts = dir.path().join("color.timestamp");
    let color_raw = dir.path().join("color.raw");
    fs::write(&color_ts, "10.000 0, 1\n10.033 1, 2\n10.066 2, 3\n10.100 3, 4\n").unwrap();
    fs::write(&color_raw, raw_frames(4)).unwrap();

    let poses_ts = dir.path().join("localization.timestamp");
    fs::write(&poses_ts, "10.000 x=0\n10.200 x=1\n").unwrap();

    let mut color = FramedRawReader::new(&color_ts, &color_raw, FRAME_SIZE, &config).unwrap();
    color.reinit().unwrap();
    let mut poses = TimestampedRecordReader::new(&poses_ts, &config).unwrap();

    let mut frames = Vec::new();
    let mut poses_found = Vec::new();
    let mut requested = t("10.000");

    for _ in 0..4 {
        assert!(color.load_frame(requested).unwrap());
        frames.push(color.frame()[0]);

        poses_found.push(poses.search(requested, 33).unwrap());
        requested += 33;
    }

    // 10.099 snaps back to the 10.066 frame
    assert_eq!(frames, vec![0, 1, 2, 2]);
    assert_eq!(color.seek_count(), 1);

    // The single pose is valid for 33 ms only
    assert_eq!(poses_found, vec![true, true, false, false]);
}

#[test]
fn test_subframe_stream() {
    let dir = TempDir::new().unwrap();
    let ts = dir.path().join("bodies.timestamp");
    let raw = dir.path().join("bodies.raw");

    // Frame numbering starts at 7; second record has no bodies
    fs::write(&ts, "1.000 7, 2\n1.033 9, 0\n1.066 9, 1\n").unwrap();
    fs::write(&raw, raw_frames(3)).unwrap();

    let mut reader = FramedRawReader::new(&ts, &raw, FRAME_SIZE, &Config::default())
        .unwrap()
        .with_mode(FrameMode::Subframes);
    reader.reinit().unwrap();
    assert_eq!(reader.starting_frame(), 7);

    assert!(reader.load_frame(t("1.000")).unwrap());
    assert_eq!(reader.subframe_count(), 2);
    let bodies: Vec<&[u8]> = reader.subframes().collect();
    assert_eq!(bodies, vec![&[0u8; 4][..], &[1u8; 4][..]]);

    assert!(reader.load_frame(t("1.033")).unwrap());
    assert_eq!(reader.subframe_count(), 0);
    assert!(reader.frame().is_empty());

    assert!(reader.load_frame(t("1.066")).unwrap());
    assert_eq!(reader.frame(), &[2u8; 4]);
    assert_eq!(reader.seek_count(), 0);
}

#[test]
fn test_compressed_timestamps_replay_and_restart() {
    let dir = TempDir::new().unwrap();
    let config = Config::default();
    let path = dir.path().join("stream.timestamp");
    fs::write(dir.path().join("stream.timestamp.7z"), "1.000 a\n1.200 b\n").unwrap();

    let mut reader = TimestampIndexReader::with_source(&path, piped_source(&config), &config.search);
    reader.reinit().unwrap();
    assert!(reader.source().is_pipe());

    // Snapping back to the first record restarts the decoder
    assert!(reader.search(t("1.020"), 33).unwrap());
    assert_eq!(reader.payload(), Some(&b"a"[..]));

    assert!(reader.search(t("1.200"), 33).unwrap());
    assert_eq!(reader.payload(), Some(&b"b"[..]));

    reader.reinit().unwrap();
    assert!(reader.next_timestamp().unwrap());
    assert_eq!(reader.current(), Some(t("1.000")));
}

#[test]
fn test_compressed_timestamps_cannot_step_back_mid_stream() {
    let dir = TempDir::new().unwrap();
    let config = Config::default();
    let path = dir.path().join("stream.timestamp");
    fs::write(
        dir.path().join("stream.timestamp.7z"),
        "0.500 z\n1.000 a\n1.200 b\n",
    )
    .unwrap();

    let mut reader = TimestampIndexReader::with_source(&path, piped_source(&config), &config.search);
    assert!(reader.search(t("1.000"), 33).unwrap());

    let result = reader.search(t("1.020"), 33);
    assert!(matches!(result, Err(SyncLogError::PipeSeek { .. })));
}

#[test]
fn test_compressed_raw_frames_skip_forward() {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.source.discard_buffer_size = 3;

    let ts = dir.path().join("depth.timestamp");
    let raw = dir.path().join("depth.raw");
    fs::write(&ts, color_timestamps(10)).unwrap();
    fs::write(dir.path().join("depth.raw.7z"), raw_frames(10)).unwrap();

    let records = TimestampedRecordReader::new(&ts, &config).unwrap();
    let mut reader =
        FramedRawReader::with_sources(records, piped_source(&config), &raw, FRAME_SIZE).unwrap();
    reader.reinit().unwrap();

    // Every other frame: each load skips one record forward
    let mut requested = t("10.000");
    for expected in [0u8, 2, 4, 6, 8] {
        assert!(reader.load_frame(requested).unwrap());
        assert_eq!(reader.frame(), &[expected; FRAME_SIZE]);
        requested += 66;
    }
    assert_eq!(reader.seek_count(), 4);
}

#[test]
fn test_config_file_drives_readers() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("synclog.toml");
    fs::write(
        &config_path,
        r#"
[search]
default_tolerance_ms = 100
end_of_stream_grace_ms = 0

[frames]
frame_size = 4
mode = "single"
"#,
    )
    .unwrap();

    let config = Config::from_file(&config_path).unwrap();
    assert_eq!(config.frames.frame_size, FRAME_SIZE);

    let ts = dir.path().join("pose.timestamp");
    fs::write(&ts, "1.000 a\n1.200 b\n").unwrap();
    let mut reader = TimestampedRecordReader::new(&ts, &config).unwrap();

    // Default window now covers 80 ms of staleness
    let mut seen = Vec::new();
    let mut hook = |_: TimeValue, payload: &[u8]| {
        seen.push(payload.to_vec());
        true
    };
    assert!(reader.process(t("1.080"), &mut hook).unwrap());

    // No grace once the file is exhausted
    assert!(!reader.process(t("1.210"), &mut hook).unwrap());
    assert_eq!(seen, vec![b"a".to_vec()]);
}

#[cfg(unix)]
#[test]
fn test_external_decompressor() {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.source.decompressor = vec!["cat".to_string()];

    let path = dir.path().join("imu.timestamp");
    fs::write(dir.path().join("imu.timestamp.7z"), "2.000 ax=0.1\n2.010 ax=0.2\n").unwrap();

    let mut reader = TimestampedRecordReader::new(&path, &config).unwrap();
    let data = reader.data_for_timestamp(t("2.010"), 33).unwrap();
    assert_eq!(data, Some(&b"ax=0.2"[..]));
    assert!(reader.index().source().is_pipe());
}
