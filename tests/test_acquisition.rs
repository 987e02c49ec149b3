use bzip2::write::BzEncoder;
use bzip2::Compression;
use himawari_geoss::config::{AcquisitionConfig, TimeGrid};
use himawari_geoss::{AcquisitionLoop, BandId, FailureKind, GeoError, GeoResult, GranuleId, ItemOutcome, RemoteSource};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;

/// In-memory archive keyed by path relative to the root
#[derive(Default)]
struct MockArchive {
    objects: HashMap<String, Vec<u8>>,
    calls: usize,
}

impl MockArchive {
    fn put(&mut self, id: &GranuleId, payload: Vec<u8>) {
        self.objects.insert(id.remote_path(), payload);
    }
}

impl RemoteSource for MockArchive {
    fn fetch(&mut self, remote_path: &str, sink: &mut dyn Write) -> GeoResult<u64> {
        self.calls += 1;
        let payload = self
            .objects
            .get(remote_path)
            .ok_or_else(|| GeoError::RemoteFetch(format!("550 {}: No such file", remote_path)))?;
        sink.write_all(payload)?;
        Ok(payload.len() as u64)
    }

    fn describe(&self, remote_path: &str) -> String {
        format!("mock://{}", remote_path)
    }
}

fn bz2(data: &[u8]) -> Vec<u8> {
    let mut encoder = BzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn raw_payload(seed: u16) -> Vec<u8> {
    (0..64u16).flat_map(|i| (i ^ seed).to_be_bytes()).collect()
}

fn config(dir: &Path) -> AcquisitionConfig {
    AcquisitionConfig {
        output_dir: dir.to_path_buf(),
        bands: vec![BandId::parse("tir.01").unwrap()],
        time: TimeGrid {
            years: [2023, 2023],
            months: [2, 2],
            days: [28, 31],
            hours: [0, 0],
            minute_step: 30,
        },
        ..AcquisitionConfig::default()
    }
}

fn granule(day: u8, minute: u8) -> GranuleId {
    GranuleId {
        year: 2023,
        month: 2,
        day,
        hour: 0,
        minute,
        band: BandId::parse("tir.01").unwrap(),
    }
}

fn listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn test_skip_and_continue() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = TempDir::new().unwrap();

    let mut archive = MockArchive::default();
    archive.put(&granule(28, 0), bz2(&raw_payload(1)));
    archive.put(&granule(28, 30), b"BZh9 truncated garbage".to_vec());

    let mut acquisition = AcquisitionLoop::new(config(dir.path()), archive);
    let summary = acquisition.run().unwrap();

    // Feb 28..31 x {00, 30}: two exist remotely, the invalid dates fail like any missing file
    assert_eq!(summary.total(), 8);
    assert_eq!(summary.completed.len(), 1);
    assert_eq!(summary.failures_of(FailureKind::Decompression), 1);
    assert_eq!(summary.failures_of(FailureKind::RemoteFetch), 6);
    assert_eq!(acquisition.source().calls, 8);

    // Neither the corrupt payload nor any compressed intermediate is left behind
    assert_eq!(listing(dir.path()), vec!["202302280000.tir.01.fld.geoss".to_string()]);
    assert_eq!(
        std::fs::read(dir.path().join("202302280000.tir.01.fld.geoss")).unwrap(),
        raw_payload(1)
    );
}

#[test]
fn test_second_run_makes_no_network_calls() {
    let dir = TempDir::new().unwrap();

    let mut archive = MockArchive::default();
    let mut cfg = config(dir.path());
    cfg.time.days = [1, 2];
    for day in 1..=2 {
        for minute in [0, 30] {
            archive.put(&granule(day, minute), bz2(&raw_payload(day as u16 * 100 + minute as u16)));
        }
    }

    let mut first = AcquisitionLoop::new(cfg.clone(), archive);
    let summary = first.run().unwrap();
    assert_eq!(summary.completed.len(), 4);
    assert_eq!(first.source().calls, 4);
    let files_after_first = listing(dir.path());

    let mut second = AcquisitionLoop::new(cfg, MockArchive::default());
    let summary = second.run().unwrap();
    assert_eq!(summary.skipped.len(), 4);
    assert_eq!(second.source().calls, 0);
    assert_eq!(listing(dir.path()), files_after_first);
}

#[test]
fn test_existing_file_is_never_refetched() {
    let dir = TempDir::new().unwrap();
    let id = granule(28, 0);
    std::fs::write(dir.path().join(id.file_name()), b"local copy").unwrap();

    let mut archive = MockArchive::default();
    archive.put(&id, bz2(&raw_payload(9)));

    let mut acquisition = AcquisitionLoop::new(config(dir.path()), archive);
    let outcome = acquisition.acquire(&id).unwrap();

    assert_eq!(outcome, ItemOutcome::Skipped(dir.path().join(id.file_name())));
    assert_eq!(acquisition.source().calls, 0);
    assert_eq!(std::fs::read(dir.path().join(id.file_name())).unwrap(), b"local copy");
}

#[test]
fn test_multistream_payload() {
    let dir = TempDir::new().unwrap();
    let id = granule(28, 30);

    let mut payload = bz2(&raw_payload(3)[..64]);
    payload.extend(bz2(&raw_payload(3)[64..]));

    let mut archive = MockArchive::default();
    archive.put(&id, payload);

    let mut acquisition = AcquisitionLoop::new(config(dir.path()), archive);
    assert!(matches!(acquisition.acquire(&id), Ok(ItemOutcome::Completed(_))));
    assert_eq!(std::fs::read(dir.path().join(id.file_name())).unwrap(), raw_payload(3));
}

#[test]
fn test_unwritable_output_dir_is_fatal() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("not_a_dir");
    std::fs::write(&blocker, b"").unwrap();

    let mut acquisition = AcquisitionLoop::new(config(&blocker.join("raw")), MockArchive::default());
    let err = acquisition.run().unwrap_err();
    assert_eq!(err.kind(), FailureKind::Config);
    assert_eq!(acquisition.source().calls, 0);
}
