//! Full repair cycles through the real tool plumbing, with shell scripts
//! standing in for ffmpeg and untrunc.
#![cfg(unix)]

use std::fs::{File, FileTimes};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use ck_av::{ToolConfig, ToolRegistry, FFMPEG, UNTRUNC};
use ck_core::config::RepairConfig;
use ck_core::SegmentNaming;
use ck_repair::{CheckMarker, SegmentRepairer};

/// Probe: reports a missing moov atom for files containing BROKEN.
/// Remux: copies the `-i` input to the last argument.
const FAKE_FFMPEG: &str = r#"#!/bin/sh
for last; do :; done
case "$*" in
  *"-v trace"*)
    if grep -q BROKEN "$last"; then
      echo "[mov,mp4,m4a,3gp,3g2,mj2 @ 0x1] moov atom not found" >&2
    fi
    echo "At least one output file must be specified" >&2
    exit 1
    ;;
  *faststart*)
    prev=""
    for a; do
      if [ "$prev" = "-i" ]; then input="$a"; fi
      prev="$a"
    done
    cp "$input" "$last"
    ;;
esac
"#;

/// Writes `<damaged>_fixed.mp4` with BROKEN replaced by FIXED.
const FAKE_UNTRUNC: &str = r#"#!/bin/sh
sed 's/BROKEN/FIXED/' "$2" > "$2_fixed.mp4"
"#;

fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn repairer(bin: &Path) -> SegmentRepairer {
    let tools = ToolRegistry::with_tools([
        ToolConfig {
            name: FFMPEG.into(),
            path: script(bin, "ffmpeg", FAKE_FFMPEG),
            timeout: Duration::from_secs(10),
        },
        ToolConfig {
            name: UNTRUNC.into(),
            path: script(bin, "untrunc", FAKE_UNTRUNC),
            timeout: Duration::from_secs(10),
        },
    ]);
    SegmentRepairer::from_registry(&tools, &RepairConfig::default()).unwrap()
}

fn segment(dir: &Path, naming: &SegmentNaming, number: u32, contents: &str) -> PathBuf {
    let path = dir.join(naming.file_name(number));
    std::fs::write(&path, contents).unwrap();
    let t = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000 + 900 * u64::from(number));
    File::options()
        .write(true)
        .open(&path)
        .unwrap()
        .set_times(FileTimes::new().set_modified(t))
        .unwrap();
    path
}

#[tokio::test]
async fn broken_segment_is_fixed_once() {
    let bin = tempfile::tempdir().unwrap();
    let cam = tempfile::tempdir().unwrap();
    let naming = SegmentNaming::new("yard", 1000);
    let repairer = repairer(bin.path());

    segment(cam.path(), &naming, 10, "good video\n");
    let broken = segment(cam.path(), &naming, 11, "BROKEN video\n");
    segment(cam.path(), &naming, 12, "good video\n");
    segment(cam.path(), &naming, 13, "still recording BROKEN\n");
    CheckMarker::new(cam.path()).write("yard_010.mp4").unwrap();

    let inode = std::fs::metadata(&broken).unwrap().ino();
    let mtime = std::fs::metadata(&broken).unwrap().modified().unwrap();

    let report = repairer.scan(cam.path(), &naming).await.unwrap();
    assert_eq!(report.checked, vec!["yard_011.mp4", "yard_012.mp4"]);
    assert_eq!(report.repaired, vec!["yard_011.mp4"]);
    assert!(report.failed.is_empty());

    assert_eq!(std::fs::read_to_string(&broken).unwrap(), "FIXED video\n");
    let meta = std::fs::metadata(&broken).unwrap();
    assert_eq!(meta.ino(), inode);
    assert_eq!(meta.modified().unwrap(), mtime);
    assert_eq!(
        CheckMarker::new(cam.path()).read().unwrap().as_deref(),
        Some("yard_012.mp4")
    );

    // No intermediates are left next to the recordings.
    let names: Vec<String> = std::fs::read_dir(cam.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert!(names.iter().all(|n| !n.contains("_fixed") && !n.contains("_faststart")), "{names:?}");

    // The active segment was never touched, and nothing new needs work.
    let report = repairer.scan(cam.path(), &naming).await.unwrap();
    assert!(report.checked.is_empty());
    assert!(report.repaired.is_empty());
    assert_eq!(
        std::fs::read_to_string(cam.path().join("yard_013.mp4")).unwrap(),
        "still recording BROKEN\n"
    );
}

#[tokio::test]
async fn wrap_boundary_keeps_newest_segment_out_of_scan() {
    let bin = tempfile::tempdir().unwrap();
    let cam = tempfile::tempdir().unwrap();
    let naming = SegmentNaming::new("yard", 1000);
    let repairer = repairer(bin.path());

    // yard_000 was opened a moment before yard_999 was closed, so their
    // mtimes are the wrong way round.
    segment(cam.path(), &naming, 997, "good\n");
    segment(cam.path(), &naming, 998, "good\n");
    let base = 1_700_000_000 + 900 * 999;
    let newest = cam.path().join("yard_000.mp4");
    std::fs::write(&newest, "BROKEN while recording\n").unwrap();
    File::options()
        .write(true)
        .open(&newest)
        .unwrap()
        .set_times(FileTimes::new().set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(base)))
        .unwrap();
    let closed = cam.path().join("yard_999.mp4");
    std::fs::write(&closed, "good\n").unwrap();
    File::options()
        .write(true)
        .open(&closed)
        .unwrap()
        .set_times(FileTimes::new().set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(base + 1)))
        .unwrap();

    let report = repairer.scan(cam.path(), &naming).await.unwrap();
    assert_eq!(report.checked, vec!["yard_997.mp4", "yard_998.mp4", "yard_999.mp4"]);
    assert!(report.repaired.is_empty());
    assert_eq!(
        std::fs::read_to_string(&newest).unwrap(),
        "BROKEN while recording\n"
    );
}
