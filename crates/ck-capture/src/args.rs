//! ffmpeg argument lists for the two capture kinds.
//!
//! Both read the camera over RTSP forced onto TCP (UDP drops packets under
//! load) and copy the streams without transcoding.

use std::path::Path;

use ck_core::config::StreamConfig;
use ck_core::SegmentNaming;

/// Playlist file name inside a stream's live directory.
pub const LIVE_PLAYLIST: &str = "live.m3u8";

/// Arguments for the segmented recording of a camera's primary stream.
///
/// Output goes to `<camera_dir>/<camera>_%0Nd.mp4`; ffmpeg rolls over to the
/// next number every `segment_length_secs` and wraps at the naming's wrap.
pub fn recording_args(
    stream: &StreamConfig,
    input_url: &str,
    naming: &SegmentNaming,
    segment_length_secs: u64,
    start_number: u32,
    camera_dir: &Path,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-rtsp_transport".into(),
        "tcp".into(),
        "-i".into(),
        input_url.into(),
        "-c".into(),
        "copy".into(),
        "-map".into(),
        stream.map_arg().into(),
        "-f".into(),
        "segment".into(),
        "-segment_time".into(),
        segment_length_secs.to_string(),
        "-segment_wrap".into(),
        naming.wrap().to_string(),
        "-segment_start_number".into(),
        start_number.to_string(),
        "-reset_timestamps".into(),
        "1".into(),
    ];

    if let Some(vtag) = &stream.vtag {
        args.push("-tag:v".into());
        args.push(vtag.clone());
    }
    if let Some(aspect) = &stream.aspect {
        args.push("-aspect".into());
        args.push(aspect.clone());
    }

    args.push(camera_dir.join(naming.template()).to_string_lossy().into_owned());
    args
}

/// Arguments for a low-latency HLS preview of one stream.
pub fn live_args(stream: &StreamConfig, input_url: &str, playlist: &Path) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-fflags".into(),
        "nobuffer".into(),
        "-rtsp_transport".into(),
        "tcp".into(),
        "-i".into(),
        input_url.into(),
        "-c:v".into(),
        "copy".into(),
    ];

    if stream.include_audio {
        args.push("-c:a".into());
        args.push("copy".into());
    }

    args.extend(
        [
            "-map",
            stream.map_arg(),
            "-f",
            "hls",
            "-hls_time",
            "1",
            "-hls_list_size",
            "10",
            "-hls_flags",
            "delete_segments",
            "-hls_segment_type",
            "fmp4",
        ]
        .map(String::from),
    );

    if let Some(aspect) = &stream.aspect {
        args.push("-aspect".into());
        args.push(aspect.clone());
    }
    if let Some(xargs) = &stream.xargs {
        args.extend(xargs.split_whitespace().map(String::from));
    }

    args.push(playlist.to_string_lossy().into_owned());
    args
}
