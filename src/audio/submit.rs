//! Push-model frame delivery
//!
//! One submit = acquire a host region of exactly `frame_count` frames, copy
//! the caller's samples into it, commit it. The copy is required: the host
//! reads the region after the call returns, and the caller's slice is only
//! borrowed for the duration of the call.

use crate::audio::check::{check, succeeded};
use crate::audio::error::{AudioBackendError, Result};
use crate::audio::host::HostRenderer;
use crate::audio::types::StreamFormat;

/// Write `frame_count` interleaved frames from `source` into the host buffer
///
/// Returns `false` if the source is too short, or if the host rejects the
/// region request or the commit. Nothing is committed on failure.
pub fn submit<R: HostRenderer>(
    renderer: &mut R,
    format: &StreamFormat,
    source: &[i16],
    frame_count: u32,
) -> bool {
    match write_frames(renderer, format, source, frame_count) {
        Ok(()) => true,
        Err(e) => {
            log::warn!("[WASAPI] {}", e);
            false
        }
    }
}

fn write_frames<R: HostRenderer>(
    renderer: &mut R,
    format: &StreamFormat,
    source: &[i16],
    frame_count: u32,
) -> Result<()> {
    if frame_count == 0 {
        return Ok(());
    }

    let samples = frame_count as usize * format.channels as usize;
    if source.len() < samples {
        return Err(AudioBackendError::Buffer(format!(
            "{} frames need {} samples, got {}",
            frame_count,
            samples,
            source.len()
        )));
    }

    let expected = format.bytes_for(frame_count);
    let region = check("Creating buffer failed", renderer.get_buffer(frame_count))
        .ok_or_else(|| AudioBackendError::Buffer(format!("no region for {} frames", frame_count)))?;
    if region.len() != expected {
        let len = region.len();
        succeeded("Buffer release failed", renderer.release_buffer(0));
        return Err(AudioBackendError::Buffer(format!(
            "host region is {} bytes, expected {}",
            len, expected
        )));
    }

    for (dst, sample) in region.chunks_exact_mut(2).zip(&source[..samples]) {
        dst.copy_from_slice(&sample.to_le_bytes());
    }

    if !succeeded("Buffer release failed", renderer.release_buffer(frame_count)) {
        return Err(AudioBackendError::Buffer(format!(
            "commit of {} frames rejected",
            frame_count
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::error::hresult;
    use crate::audio::format::build_format;
    use crate::audio::host::{AudioHost, HostClient, HostEndpoint};
    use crate::audio::types::ExclusiveMode;
    use crate::audio::virtual_host::{HostCall, VirtualClient, VirtualHost, UNWRITTEN_BYTE};
    use crate::config::OutputConfig;

    fn stereo() -> StreamFormat {
        build_format(&OutputConfig {
            downmix_to_2ch: true,
            ..OutputConfig::default()
        })
    }

    fn session(host: &VirtualHost) -> VirtualClient {
        let mut client = host.default_render_endpoint().unwrap().activate().unwrap();
        let period = client.device_period().unwrap();
        client
            .initialize(ExclusiveMode::Shared, period, &stereo())
            .unwrap();
        client
    }

    #[test]
    fn test_samples_are_copied_into_host_buffer() {
        let host = VirtualHost::with_default_device("a", "Speakers");
        let client = session(&host);
        let mut renderer = client.renderer().unwrap();

        let source: Vec<i16> = vec![1, -1, 256, i16::MIN];
        assert!(submit(&mut renderer, &stereo(), &source, 2));

        let queued = host.queued_bytes();
        assert_eq!(queued, vec![1, 0, 0xFF, 0xFF, 0x00, 0x01, 0x00, 0x80]);
        assert!(!queued.contains(&UNWRITTEN_BYTE));
    }

    #[test]
    fn test_zero_frames_touch_nothing() {
        let host = VirtualHost::with_default_device("a", "Speakers");
        let client = session(&host);
        let mut renderer = client.renderer().unwrap();
        host.clear_calls();

        assert!(submit(&mut renderer, &stereo(), &[], 0));
        assert!(host.calls().is_empty());
        assert_eq!(host.queued_frames(), 0);
    }

    #[test]
    fn test_oversized_submit_keeps_committed_frames() {
        let host = VirtualHost::with_default_device("a", "Speakers");
        let client = session(&host);
        let mut renderer = client.renderer().unwrap();
        let buffer = client.buffer_size().unwrap();

        let first = vec![7i16; 2 * 100];
        assert!(submit(&mut renderer, &stereo(), &first, 100));
        let before = host.queued_bytes();

        let too_many = vec![9i16; 2 * buffer as usize];
        assert!(!submit(&mut renderer, &stereo(), &too_many, buffer));
        assert_eq!(host.queued_bytes(), before);
        assert_eq!(client.padding().unwrap(), 100);

        // The failed call left no region outstanding
        assert!(submit(&mut renderer, &stereo(), &first, 100));
    }

    #[test]
    fn test_short_source_is_rejected_before_host_call() {
        let host = VirtualHost::with_default_device("a", "Speakers");
        let client = session(&host);
        let mut renderer = client.renderer().unwrap();
        host.clear_calls();

        assert!(!submit(&mut renderer, &stereo(), &[1, 2, 3], 2));
        assert_eq!(host.call_count(HostCall::GetBuffer), 0);
    }

    #[test]
    fn test_commit_failure_delivers_nothing() {
        let host = VirtualHost::with_default_device("a", "Speakers");
        let client = session(&host);
        let mut renderer = client.renderer().unwrap();
        host.fail(HostCall::ReleaseBuffer, hresult::AUDCLNT_E_DEVICE_INVALIDATED);

        assert!(!submit(&mut renderer, &stereo(), &[1, 2, 3, 4], 2));
        assert_eq!(host.queued_frames(), 0);

        host.clear_failure(HostCall::ReleaseBuffer);
        assert!(submit(&mut renderer, &stereo(), &[1, 2, 3, 4], 2));
        assert_eq!(host.queued_frames(), 2);
    }
}
