use chrono::{Local, TimeZone};
use object_voice::frame::{capture_file_name, file_stem, median_stack, DataDirs, Frame};
use proptest::prelude::*;
use tempfile::tempdir;

proptest! {
    #[test]
    fn single_outlier_is_rejected(base in any::<[u8; 3]>(), outlier in any::<[u8; 3]>(), at in 0usize..5) {
        let mut frames = vec![Frame::filled(4, 3, base); 5];
        frames[at] = Frame::filled(4, 3, outlier);
        let stacked = median_stack(&frames).unwrap();
        prop_assert_eq!(stacked, Frame::filled(4, 3, base));
    }

    #[test]
    fn median_of_identical_frames_is_identity(rgb in any::<[u8; 3]>(), n in 1usize..7) {
        let frames = vec![Frame::filled(3, 2, rgb); n];
        prop_assert_eq!(median_stack(&frames).unwrap(), Frame::filled(3, 2, rgb));
    }
}

#[test]
fn median_of_nothing_is_none() {
    assert!(median_stack(&[]).is_none());
}

#[test]
fn even_count_takes_floor_of_middle_mean() {
    let frames = [
        Frame::filled(1, 1, [10, 0, 255]),
        Frame::filled(1, 1, [11, 1, 254]),
    ];
    let stacked = median_stack(&frames).unwrap();
    assert_eq!(stacked.image().get_pixel(0, 0).0, [10, 0, 254]);
}

#[test]
fn mismatched_sizes_are_ignored() {
    let frames = [
        Frame::filled(2, 2, [50, 50, 50]),
        Frame::filled(3, 3, [200, 200, 200]),
        Frame::filled(2, 2, [52, 52, 52]),
        Frame::filled(2, 2, [54, 54, 54]),
    ];
    let stacked = median_stack(&frames).unwrap();
    assert_eq!(stacked, Frame::filled(2, 2, [52, 52, 52]));
}

#[test]
fn capture_names_sort_by_time() {
    let a = Local.with_ymd_and_hms(2024, 3, 5, 9, 7, 1).unwrap();
    let b = a + chrono::Duration::milliseconds(15);
    let name = capture_file_name(a);
    assert_eq!(name, "capture_20240305_090701_000.jpg");
    assert_eq!(capture_file_name(b), "capture_20240305_090701_015.jpg");
    assert_eq!(file_stem(&name), "capture_20240305_090701_000");
}

#[test]
fn data_dirs_layout() {
    let dir = tempdir().unwrap();
    let dirs = DataDirs::new(dir.path());
    dirs.ensure();
    for sub in ["capture", "processed", "debug", "voice"] {
        assert!(dir.path().join(sub).is_dir(), "{sub} missing");
    }
    assert_eq!(dirs.history(), dir.path().join("messages.json"));
}

#[test]
fn frame_save_creates_parents() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested/out.png");
    let frame = Frame::filled(8, 8, [1, 2, 3]);
    frame.save(&path).unwrap();
    assert_eq!(Frame::open(&path).unwrap(), frame);
}
