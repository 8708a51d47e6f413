use object_voice::device::{
    is_excluded, select_physical_camera_index, DeviceInfo, DeviceProbe, ProbeReport, SelectorPolicy, SCAN_LIMIT,
};
use std::collections::HashMap;

struct FakeProbe {
    names: Option<Vec<DeviceInfo>>,
    reports: HashMap<u32, ProbeReport>,
    probed: Vec<u32>,
}

impl FakeProbe {
    fn new(names: Option<Vec<(u32, &str)>>) -> Self {
        Self {
            names: names.map(|v| {
                v.into_iter()
                    .map(|(index, name)| DeviceInfo {
                        index,
                        name: name.into(),
                    })
                    .collect()
            }),
            reports: HashMap::new(),
            probed: Vec::new(),
        }
    }

    fn with(mut self, index: u32, frame_ok: bool, fps: f32, width: u32, height: u32) -> Self {
        self.reports.insert(
            index,
            ProbeReport {
                frame_ok,
                fps,
                width,
                height,
            },
        );
        self
    }
}

impl DeviceProbe for FakeProbe {
    fn enumerate(&mut self) -> Option<Vec<DeviceInfo>> {
        self.names.clone()
    }

    fn probe(&mut self, index: u32) -> Option<ProbeReport> {
        self.probed.push(index);
        self.reports.get(&index).copied()
    }
}

fn policy() -> SelectorPolicy {
    SelectorPolicy {
        exclude_patterns: vec!["obs".into(), "virtual".into()],
        min_fps: 5.0,
        fallback_index: 0,
    }
}

#[test]
fn virtual_devices_are_excluded_by_name() {
    let mut probe = FakeProbe::new(Some(vec![(0, "OBS Virtual Camera"), (1, "USB Camera")]))
        .with(0, true, 30.0, 1920, 1080)
        .with(1, true, 30.0, 1280, 720);
    assert_eq!(select_physical_camera_index(&mut probe, &policy()), 1);
    assert_eq!(probe.probed, vec![1]);
}

#[test]
fn largest_resolution_wins() {
    let mut probe = FakeProbe::new(Some(vec![(0, "Integrated"), (1, "Logitech"), (2, "Other")]))
        .with(0, true, 30.0, 640, 480)
        .with(1, true, 30.0, 1920, 1080)
        .with(2, true, 30.0, 1280, 720);
    assert_eq!(select_physical_camera_index(&mut probe, &policy()), 1);
}

#[test]
fn unreadable_and_slow_devices_are_skipped() {
    let mut probe = FakeProbe::new(Some(vec![(0, "A"), (1, "B"), (2, "C")]))
        .with(0, false, 30.0, 3840, 2160)
        .with(1, true, 2.0, 1920, 1080)
        .with(2, true, 15.0, 640, 480);
    assert_eq!(select_physical_camera_index(&mut probe, &policy()), 2);
}

#[test]
fn falls_back_when_nothing_qualifies() {
    let mut probe = FakeProbe::new(Some(vec![(3, "Virtual Cam")]));
    let mut p = policy();
    p.fallback_index = 7;
    assert_eq!(select_physical_camera_index(&mut probe, &p), 7);
}

#[test]
fn scans_indices_without_names() {
    let mut probe = FakeProbe::new(None).with(4, true, 30.0, 800, 600);
    assert_eq!(select_physical_camera_index(&mut probe, &policy()), 4);
    assert_eq!(probe.probed, (0..SCAN_LIMIT).collect::<Vec<_>>());
}

#[test]
fn exclusion_is_case_insensitive() {
    let patterns = vec!["obs".to_string(), " ".to_string()];
    assert!(is_excluded("OBS-Camera", &patterns));
    assert!(!is_excluded("FaceTime HD", &patterns));
}
