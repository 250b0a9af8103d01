//! Mount point and pipeline launch description

use crate::error::ServerError;
use rtspcam_device::{EncodePath, StreamOptions};
use std::net::Ipv4Addr;

/// Name of the pipeline source element the device session feeds
pub const SOURCE_NAME: &str = "srvsrc";

/// Elements every launch description needs
const COMMON_ELEMENTS: &[&str] = &["appsrc", "bayer2rgb", "videoconvert", "queue", "rtph264pay"];
const CPU_ELEMENTS: &[&str] = &["x264enc"];
const GPU_ELEMENTS: &[&str] = &["nvvidconv", "nvv4l2h264enc"];

/// Launch description for the selected encode path
pub fn pipeline_description(options: &StreamOptions) -> String {
    let (width, height, bitrate) = (options.width, options.height, options.bitrate);

    match options.encode_path {
        EncodePath::Cpu => format!(
            "appsrc name={SOURCE_NAME} ! \
             bayer2rgb ! video/x-raw, format=(string)RGBx ! \
             videoconvert ! video/x-raw, format=(string)I420, width=(int){width}, height=(int){height} ! \
             queue ! \
             x264enc tune=zerolatency bitrate={bitrate} ! \
             video/x-h264, width=(int){width}, height=(int){height}, stream-format=byte-stream, profile=main ! \
             rtph264pay name=pay0 pt=96"
        ),
        EncodePath::Gpu => format!(
            "appsrc name={SOURCE_NAME} ! \
             bayer2rgb ! \
             nvvidconv ! video/x-raw(memory:NVMM), width=(int){width}, height=(int){height}, format=(string)I420 ! \
             queue max-size-buffers=300 ! \
             nvv4l2h264enc bitrate={bitrate} preset-level=2 profile=2 insert-sps-pps=1 ! \
             rtph264pay name=pay0 pt=96"
        ),
    }
}

/// A media factory registration: where it is mounted and what it launches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPoint {
    pub path: String,
    pub launch: String,
    /// One pipeline serves every client
    pub shared: bool,
}

impl MountPoint {
    pub fn from_options(options: &StreamOptions) -> Self {
        MountPoint {
            path: options.mount_path(),
            launch: pipeline_description(options),
            shared: true,
        }
    }
}

/// Element factories the launch description for `path` depends on
pub fn required_elements(path: EncodePath) -> Vec<&'static str> {
    let specific = match path {
        EncodePath::Cpu => CPU_ELEMENTS,
        EncodePath::Gpu => GPU_ELEMENTS,
    };
    COMMON_ELEMENTS.iter().chain(specific).copied().collect()
}

/// Required elements for which `has_element` reports false
pub fn missing_elements(path: EncodePath, has_element: impl Fn(&str) -> bool) -> Vec<String> {
    let missing: Vec<String> = required_elements(path)
        .into_iter()
        .filter(|name| !has_element(*name))
        .map(str::to_string)
        .collect();

    for name in &missing {
        log::error!("pipeline element {} not found", name);
    }
    missing
}

/// Fail when any required element is unavailable
pub fn check_elements(path: EncodePath, has_element: impl Fn(&str) -> bool) -> Result<(), ServerError> {
    let missing = missing_elements(path, has_element);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ServerError::MissingElements(missing))
    }
}

/// Multicast address range handed to one media stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MulticastPool {
    pub min_address: Ipv4Addr,
    pub max_address: Ipv4Addr,
    pub min_port: u16,
    pub max_port: u16,
    pub ttl: u8,
}

/// Streams that fit in 224.3.0.1 ..= 224.3.0.254
pub const MAX_MULTICAST_STREAMS: u32 = 127;

impl MulticastPool {
    /// Two addresses and ten ports per stream, starting at 224.3.0.1:5000
    ///
    /// `None` past the last address pair of the range.
    pub fn for_stream(index: u32) -> Option<Self> {
        if index >= MAX_MULTICAST_STREAMS {
            return None;
        }
        let step = index as u8;
        let port = 5000 + 10 * index as u16;

        Some(MulticastPool {
            min_address: Ipv4Addr::new(224, 3, 0, 2 * step + 1),
            max_address: Ipv4Addr::new(224, 3, 0, 2 * step + 2),
            min_port: port,
            max_port: port + 10,
            ttl: 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_description() {
        let options = StreamOptions {
            width: 1280,
            height: 720,
            bitrate: 4000,
            encode_path: EncodePath::Cpu,
            ..Default::default()
        };
        let launch = pipeline_description(&options);

        assert!(launch.starts_with("appsrc name=srvsrc ! bayer2rgb"));
        assert!(launch.contains("width=(int)1280, height=(int)720"));
        assert!(launch.contains("x264enc tune=zerolatency bitrate=4000"));
        assert!(launch.ends_with("rtph264pay name=pay0 pt=96"));
        assert!(!launch.contains("nvv4l2h264enc"));
    }

    #[test]
    fn test_gpu_description() {
        let launch = pipeline_description(&StreamOptions::default());

        assert!(launch.contains("video/x-raw(memory:NVMM), width=(int)2448, height=(int)2048"));
        assert!(launch.contains("queue max-size-buffers=300"));
        assert!(launch.contains("nvv4l2h264enc bitrate=10000"));
        assert!(!launch.contains("x264enc tune"));
    }

    #[test]
    fn test_mount_point() {
        let options = StreamOptions {
            path: "live".into(),
            ..Default::default()
        };
        let mount = MountPoint::from_options(&options);

        assert_eq!(mount.path, "/live");
        assert!(mount.shared);
        assert_eq!(mount.launch, pipeline_description(&options));
    }

    #[test]
    fn test_element_checks() {
        assert!(required_elements(EncodePath::Cpu).contains(&"x264enc"));
        assert!(!required_elements(EncodePath::Cpu).contains(&"nvvidconv"));

        let installed = ["appsrc", "bayer2rgb", "videoconvert", "queue", "rtph264pay", "x264enc"];
        let has = |name: &str| installed.contains(&name);

        assert!(check_elements(EncodePath::Cpu, has).is_ok());
        assert_eq!(
            missing_elements(EncodePath::Gpu, has),
            vec!["nvvidconv".to_string(), "nvv4l2h264enc".to_string()]
        );
        assert!(matches!(
            check_elements(EncodePath::Gpu, has),
            Err(ServerError::MissingElements(names)) if names.len() == 2
        ));
    }

    #[test]
    fn test_multicast_pools() {
        let first = MulticastPool::for_stream(0).unwrap();
        assert_eq!(first.min_address, Ipv4Addr::new(224, 3, 0, 1));
        assert_eq!(first.max_address, Ipv4Addr::new(224, 3, 0, 2));
        assert_eq!((first.min_port, first.max_port), (5000, 5010));
        assert_eq!(first.ttl, 1);

        let third = MulticastPool::for_stream(2).unwrap();
        assert_eq!(third.min_address, Ipv4Addr::new(224, 3, 0, 5));
        assert_eq!(third.max_address, Ipv4Addr::new(224, 3, 0, 6));
        assert_eq!((third.min_port, third.max_port), (5020, 5030));

        let last = MulticastPool::for_stream(MAX_MULTICAST_STREAMS - 1).unwrap();
        assert_eq!(last.min_address, Ipv4Addr::new(224, 3, 0, 253));
        assert_eq!(last.max_address, Ipv4Addr::new(224, 3, 0, 254));
        assert_eq!((last.min_port, last.max_port), (6260, 6270));

        assert_eq!(MulticastPool::for_stream(MAX_MULTICAST_STREAMS), None);
        assert_eq!(MulticastPool::for_stream(u32::MAX), None);
    }
}
