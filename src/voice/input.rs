//! Microphone access behind a small platform seam, with the cpal implementation

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::JoinHandle;
use tokio::sync::oneshot;

use super::capture::CaptureError;
use super::encode::{downmix, ChunkSink};

/// A platform capability the capture pipeline depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Enumerating and opening input devices
    MediaDevices,
    /// Building a live input stream from a device
    StreamCapture,
    /// Converting the device's sample format into the payload encoding
    Encoder,
}

impl Capability {
    pub const ALL: [Capability; 3] = [
        Capability::MediaDevices,
        Capability::StreamCapture,
        Capability::Encoder,
    ];

    /// Short name for reports
    pub fn label(&self) -> &'static str {
        match self {
            Capability::MediaDevices => "input device",
            Capability::StreamCapture => "stream capture",
            Capability::Encoder => "sample encoder",
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Capability::MediaDevices => "no audio input devices are available",
            Capability::StreamCapture => "the input device cannot open a capture stream",
            Capability::Encoder => "the input sample format cannot be encoded for upload",
        }
    }
}

/// Result of probing the platform, one flag per capability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupportReport {
    pub media_devices: bool,
    pub stream_capture: bool,
    pub encoder: bool,
}

impl SupportReport {
    pub fn full() -> Self {
        Self {
            media_devices: true,
            stream_capture: true,
            encoder: true,
        }
    }

    pub fn has(&self, capability: Capability) -> bool {
        match capability {
            Capability::MediaDevices => self.media_devices,
            Capability::StreamCapture => self.stream_capture,
            Capability::Encoder => self.encoder,
        }
    }

    /// Missing capabilities. Without a device the other two cannot be
    /// judged, so only the device is reported.
    pub fn missing(&self) -> Vec<Capability> {
        if !self.media_devices {
            return vec![Capability::MediaDevices];
        }
        let mut missing = Vec::new();
        if !self.stream_capture {
            missing.push(Capability::StreamCapture);
        }
        if !self.encoder {
            missing.push(Capability::Encoder);
        }
        missing
    }

    pub fn is_supported(&self) -> bool {
        self.missing().is_empty()
    }

    /// Diagnostic naming each missing capability, or `None` when supported
    pub fn message(&self) -> Option<String> {
        let missing = self.missing();
        if missing.is_empty() {
            return None;
        }
        let reasons: Vec<&str> = missing.iter().map(Capability::describe).collect();
        Some(format!("Voice input unavailable: {}", reasons.join("; ")))
    }
}

/// Requested stream shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatRequest {
    /// Mono at a fixed rate, so no resampling is needed on finalize
    Preferred { sample_rate: u32 },
    /// Whatever the device reports as its default
    DeviceDefault,
}

/// Source of microphone tracks
#[async_trait]
pub trait AudioInput: Send + Sync {
    /// Synchronous capability check
    fn support(&self) -> SupportReport;

    /// Names of the input devices the platform reports
    fn devices(&self) -> Vec<String>;

    /// Acquire the microphone and start feeding mono samples into `sink`.
    ///
    /// Resolves once the stream is live, which may include waiting on an OS
    /// permission prompt.
    async fn open(
        &self,
        request: FormatRequest,
        sink: ChunkSink,
    ) -> Result<Box<dyn InputTrack>, CaptureError>;

    fn name(&self) -> &str;
}

/// An acquired microphone track
pub trait InputTrack: Send {
    fn sample_rate(&self) -> u32;

    /// Stop the stream and release the hardware. After this returns the sink
    /// receives no further samples.
    fn release(self: Box<Self>);
}

/// Default-host microphone via cpal
pub struct CpalInput {
    device_name: Option<String>,
}

impl CpalInput {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }
}

#[async_trait]
impl AudioInput for CpalInput {
    fn support(&self) -> SupportReport {
        // The requested device, not just any device
        let device = find_device(self.device_name.as_deref()).ok();
        let default_config_ok = device
            .as_ref()
            .map(|device| device.default_input_config().is_ok())
            .unwrap_or(false);
        let formats: Vec<cpal::SampleFormat> = device
            .as_ref()
            .and_then(|device| device.supported_input_configs().ok())
            .map(|configs| configs.map(|config| config.sample_format()).collect())
            .unwrap_or_default();

        support_from(device.is_some(), default_config_ok, &formats)
    }

    fn devices(&self) -> Vec<String> {
        cpal::default_host()
            .input_devices()
            .map(|devices| devices.filter_map(|device| device.name().ok()).collect())
            .unwrap_or_default()
    }

    async fn open(
        &self,
        request: FormatRequest,
        sink: ChunkSink,
    ) -> Result<Box<dyn InputTrack>, CaptureError> {
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = oneshot::channel();
        let device_name = self.device_name.clone();
        let thread_running = running.clone();

        // cpal::Stream isn't Send, so it lives and dies on its own thread
        let thread = std::thread::spawn(move || {
            run_stream(device_name, request, sink, thread_running, ready_tx);
        });

        match ready_rx.await {
            Ok(Ok(sample_rate)) => Ok(Box::new(CpalTrack {
                running,
                thread: Some(thread),
                sample_rate,
            })),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(CaptureError::Stream("capture thread exited before the stream opened".into()))
            }
        }
    }

    fn name(&self) -> &str {
        self.device_name.as_deref().unwrap_or("default input")
    }
}

struct CpalTrack {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    sample_rate: u32,
}

impl CpalTrack {
    fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Capture thread panicked");
            }
        }
    }
}

impl InputTrack for CpalTrack {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn release(mut self: Box<Self>) {
        self.shutdown();
    }
}

impl Drop for CpalTrack {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn find_device(name: Option<&str>) -> Result<cpal::Device, CaptureError> {
    let host = cpal::default_host();
    match name {
        Some(wanted) => host
            .input_devices()
            .map_err(|e| CaptureError::Stream(e.to_string()))?
            .find(|device| device.name().map(|n| n == wanted).unwrap_or(false))
            .ok_or(CaptureError::DeviceUnavailable),
        None => host.default_input_device().ok_or(CaptureError::DeviceUnavailable),
    }
}

fn support_from(
    device_found: bool,
    default_config_ok: bool,
    formats: &[cpal::SampleFormat],
) -> SupportReport {
    SupportReport {
        media_devices: device_found,
        stream_capture: device_found && default_config_ok,
        encoder: formats.iter().copied().any(is_encodable),
    }
}

fn is_encodable(format: cpal::SampleFormat) -> bool {
    matches!(
        format,
        cpal::SampleFormat::F32 | cpal::SampleFormat::I16 | cpal::SampleFormat::U16
    )
}

/// Resolve the stream config for a request
fn resolve_config(
    device: &cpal::Device,
    request: FormatRequest,
) -> Result<(cpal::StreamConfig, cpal::SampleFormat), CaptureError> {
    match request {
        FormatRequest::Preferred { sample_rate } => {
            let rate = cpal::SampleRate(sample_rate);
            let range = device
                .supported_input_configs()
                .map_err(|e| CaptureError::FormatRejected(e.to_string()))?
                .find(|range| {
                    range.channels() == 1
                        && is_encodable(range.sample_format())
                        && range.min_sample_rate() <= rate
                        && rate <= range.max_sample_rate()
                })
                .ok_or_else(|| {
                    CaptureError::FormatRejected(format!("{} Hz mono not offered", sample_rate))
                })?;
            let config = range.with_sample_rate(rate);
            Ok((config.config(), config.sample_format()))
        }
        FormatRequest::DeviceDefault => {
            let config = device
                .default_input_config()
                .map_err(|e| CaptureError::FormatRejected(e.to_string()))?;
            Ok((config.config(), config.sample_format()))
        }
    }
}

fn run_stream(
    device_name: Option<String>,
    request: FormatRequest,
    sink: ChunkSink,
    running: Arc<AtomicBool>,
    ready: oneshot::Sender<Result<u32, CaptureError>>,
) {
    let stream = match open_stream(device_name.as_deref(), request, &sink, &running) {
        Ok((stream, sample_rate)) => {
            let _ = ready.send(Ok(sample_rate));
            stream
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    // Keep stream alive while recording
    while running.load(Ordering::SeqCst) {
        std::thread::sleep(std::time::Duration::from_millis(10));
    }

    if let Err(e) = stream.pause() {
        tracing::debug!("Pausing input stream failed: {}", e);
    }
    drop(stream);
    tracing::debug!("Input stream released");
}

fn open_stream(
    device_name: Option<&str>,
    request: FormatRequest,
    sink: &ChunkSink,
    running: &Arc<AtomicBool>,
) -> Result<(cpal::Stream, u32), CaptureError> {
    let device = find_device(device_name)?;
    let (config, format) = resolve_config(&device, request)?;
    let sample_rate = config.sample_rate.0;
    let channels = config.channels as usize;

    tracing::debug!(
        "Opening input stream at {} Hz, {} channels, {:?}",
        sample_rate,
        channels,
        format
    );
    sink.set_sample_rate(sample_rate);

    let stream = match format {
        cpal::SampleFormat::F32 => {
            build_stream::<f32>(&device, &config, sink.clone(), running.clone(), |s| s)
        }
        cpal::SampleFormat::I16 => build_stream::<i16>(
            &device,
            &config,
            sink.clone(),
            running.clone(),
            |s| s as f32 / 32768.0,
        ),
        cpal::SampleFormat::U16 => build_stream::<u16>(
            &device,
            &config,
            sink.clone(),
            running.clone(),
            |s| (s as f32 - 32768.0) / 32768.0,
        ),
        other => {
            return Err(CaptureError::FormatRejected(format!(
                "unsupported sample format {:?}",
                other
            )))
        }
    }
    .map_err(map_build_error)?;

    stream.play().map_err(map_play_error)?;
    Ok((stream, sample_rate))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sink: ChunkSink,
    running: Arc<AtomicBool>,
    to_f32: fn(T) -> f32,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + Send + 'static,
{
    let channels = config.channels as usize;
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            if running.load(Ordering::SeqCst) {
                sink.push(&downmix(data, channels, to_f32));
            }
        },
        |err| {
            tracing::error!("Audio input error: {}", err);
        },
        None,
    )
}

fn looks_like_permission_error(description: &str) -> bool {
    let lower = description.to_lowercase();
    lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized")
}

fn map_build_error(err: cpal::BuildStreamError) -> CaptureError {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => CaptureError::DeviceUnavailable,
        cpal::BuildStreamError::StreamConfigNotSupported
        | cpal::BuildStreamError::InvalidArgument => {
            CaptureError::FormatRejected(err.to_string())
        }
        cpal::BuildStreamError::BackendSpecific { err }
            if looks_like_permission_error(&err.description) =>
        {
            CaptureError::PermissionDenied
        }
        other => CaptureError::Stream(other.to_string()),
    }
}

fn map_play_error(err: cpal::PlayStreamError) -> CaptureError {
    match err {
        cpal::PlayStreamError::DeviceNotAvailable => CaptureError::DeviceUnavailable,
        cpal::PlayStreamError::BackendSpecific { err }
            if looks_like_permission_error(&err.description) =>
        {
            CaptureError::PermissionDenied
        }
        other => CaptureError::Stream(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_report_is_supported() {
        let report = SupportReport::full();
        assert!(report.is_supported());
        assert!(report.missing().is_empty());
        assert_eq!(report.message(), None);
    }

    #[test]
    fn test_missing_encoder_is_named() {
        let report = SupportReport {
            encoder: false,
            ..SupportReport::full()
        };
        assert!(!report.is_supported());
        assert_eq!(report.missing(), vec![Capability::Encoder]);

        let message = report.message().unwrap();
        assert!(message.contains(Capability::Encoder.describe()));
        assert!(!message.contains(Capability::MediaDevices.describe()));
        assert!(!message.contains(Capability::StreamCapture.describe()));
    }

    #[test]
    fn test_no_device_reports_only_the_device() {
        let report = SupportReport {
            media_devices: false,
            stream_capture: false,
            encoder: false,
        };
        assert_eq!(report.missing(), vec![Capability::MediaDevices]);
        let message = report.message().unwrap();
        assert!(message.contains(Capability::MediaDevices.describe()));
        assert!(!message.contains(Capability::Encoder.describe()));
    }

    #[test]
    fn test_stream_failure_does_not_blame_encoder() {
        let report = support_from(true, false, &[cpal::SampleFormat::F32]);
        assert!(report.media_devices);
        assert!(report.encoder);
        assert_eq!(report.missing(), vec![Capability::StreamCapture]);
    }

    #[test]
    fn test_encoder_judged_from_supported_formats() {
        let report = support_from(true, true, &[cpal::SampleFormat::I8, cpal::SampleFormat::I16]);
        assert!(report.is_supported());

        let report = support_from(true, true, &[cpal::SampleFormat::I8]);
        assert_eq!(report.missing(), vec![Capability::Encoder]);
    }

    #[test]
    fn test_absent_requested_device() {
        let report = support_from(false, false, &[]);
        assert_eq!(report.missing(), vec![Capability::MediaDevices]);
    }

    #[test]
    fn test_permission_text_detection() {
        assert!(looks_like_permission_error("Microphone access Denied by user"));
        assert!(looks_like_permission_error("app is not authorized to record"));
        assert!(!looks_like_permission_error("buffer underrun"));
    }

    #[test]
    fn test_build_error_mapping() {
        assert_eq!(
            map_build_error(cpal::BuildStreamError::DeviceNotAvailable),
            CaptureError::DeviceUnavailable
        );
        assert!(matches!(
            map_build_error(cpal::BuildStreamError::StreamConfigNotSupported),
            CaptureError::FormatRejected(_)
        ));
        let denied = cpal::BuildStreamError::BackendSpecific {
            err: cpal::BackendSpecificError {
                description: "permission denied".to_string(),
            },
        };
        assert_eq!(map_build_error(denied), CaptureError::PermissionDenied);
    }
}
