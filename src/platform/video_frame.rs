use std::{path::Path, ptr, time::Duration};

use image::RgbaImage;
use windows::{
    core::{GUID, PCWSTR, PROPVARIANT},
    Win32::{
        Media::MediaFoundation::{
            IMFAttributes, IMFMediaBuffer, IMFSample, IMFSourceReader, MFCreateAttributes,
            MFCreateMediaType, MFCreateSourceReaderFromURL, MFMediaType_Video, MFShutdown,
            MFStartup, MFVideoFormat_RGB32, MFSTARTUP_FULL, MF_MT_DEFAULT_STRIDE,
            MF_MT_FRAME_SIZE, MF_MT_MAJOR_TYPE, MF_MT_SUBTYPE, MF_SOURCE_READERF_ENDOFSTREAM,
            MF_SOURCE_READER_ALL_STREAMS, MF_SOURCE_READER_ENABLE_VIDEO_PROCESSING,
            MF_SOURCE_READER_FIRST_VIDEO_STREAM, MF_VERSION,
        },
        System::Com::{CoInitializeEx, CoUninitialize, COINIT_MULTITHREADED},
    },
};

use super::pixels::bgrx_to_rgba;
use crate::{
    debug,
    errors::{HostError, Result},
    placeholder::FrameDecoder,
    utility::to_wstring,
    DEBUG_NAME,
};

/// Samples skipped while waiting for the first decoded frame after a seek.
const MAX_EMPTY_READS: usize = 32;

/// Grabs single frames through a Media Foundation source reader with video
/// processing enabled, so any installed codec can produce RGB32 output.
#[derive(Debug, Default)]
pub struct MediaFoundationDecoder;

impl FrameDecoder for MediaFoundationDecoder {
    fn decode_frame(&self, asset: &Path, at: Duration) -> Result<RgbaImage> {
        let _session = MfSession::start().map_err(HostError::Decode)?;
        decode(asset, at).map_err(HostError::Decode)
    }
}

/// COM + Media Foundation lifetime for the calling worker thread.
struct MfSession {
    com: bool,
}

impl MfSession {
    fn start() -> std::result::Result<Self, String> {
        let com = unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) }.is_ok();
        if let Err(e) = unsafe { MFStartup(MF_VERSION, MFSTARTUP_FULL) } {
            if com {
                unsafe { CoUninitialize() };
            }
            return Err(format!("MFStartup failed: {e:?}"));
        }
        Ok(Self { com })
    }
}

impl Drop for MfSession {
    fn drop(&mut self) {
        unsafe {
            let _ = MFShutdown();
            if self.com {
                CoUninitialize();
            }
        }
    }
}

fn decode(asset: &Path, at: Duration) -> std::result::Result<RgbaImage, String> {
    let reader = open_reader(asset)?;
    let stream = MF_SOURCE_READER_FIRST_VIDEO_STREAM.0 as u32;

    let (width, height, stride) = unsafe {
        let current = reader
            .GetCurrentMediaType(stream)
            .map_err(|e| format!("GetCurrentMediaType failed: {e:?}"))?;
        let size = current
            .GetUINT64(&MF_MT_FRAME_SIZE)
            .map_err(|e| format!("MF_MT_FRAME_SIZE unavailable: {e:?}"))?;
        let width = (size >> 32) as u32;
        let height = (size & 0xFFFF_FFFF) as u32;
        let stride = current
            .GetUINT32(&MF_MT_DEFAULT_STRIDE)
            .map(|s| s as i32)
            .unwrap_or((width * 4) as i32);
        (width, height, stride)
    };
    debug!(
        "[{}][DECODE] {} is {}x{} (stride {})",
        DEBUG_NAME,
        asset.display(),
        width,
        height,
        stride
    );

    // Position is in 100 ns units.
    let ticks = i64::try_from(at.as_nanos() / 100).unwrap_or(i64::MAX);
    let position = PROPVARIANT::from(ticks);
    unsafe { reader.SetCurrentPosition(&GUID::zeroed(), &position) }
        .map_err(|e| format!("Seek to {:.3}s failed: {e:?}", at.as_secs_f64()))?;

    let sample = read_first_sample(&reader, stream)?;
    let buffer = unsafe { sample.ConvertToContiguousBuffer() }
        .map_err(|e| format!("ConvertToContiguousBuffer failed: {e:?}"))?;

    copy_frame(&buffer, width, height, stride)
}

fn open_reader(asset: &Path) -> std::result::Result<IMFSourceReader, String> {
    let url = to_wstring(&asset.to_string_lossy());

    unsafe {
        let mut attributes: Option<IMFAttributes> = None;
        MFCreateAttributes(&mut attributes, 1).map_err(|e| format!("MFCreateAttributes failed: {e:?}"))?;
        let attributes = attributes.ok_or_else(|| "MFCreateAttributes returned nothing".to_string())?;
        attributes
            .SetUINT32(&MF_SOURCE_READER_ENABLE_VIDEO_PROCESSING, 1)
            .map_err(|e| format!("Enabling video processing failed: {e:?}"))?;

        let reader = MFCreateSourceReaderFromURL(PCWSTR(url.as_ptr()), &attributes)
            .map_err(|e| format!("MFCreateSourceReaderFromURL failed for '{}': {e:?}", asset.display()))?;

        reader
            .SetStreamSelection(MF_SOURCE_READER_ALL_STREAMS.0 as u32, false)
            .map_err(|e| format!("SetStreamSelection failed: {e:?}"))?;
        reader
            .SetStreamSelection(MF_SOURCE_READER_FIRST_VIDEO_STREAM.0 as u32, true)
            .map_err(|e| format!("No video stream in '{}': {e:?}", asset.display()))?;

        let media_type = MFCreateMediaType().map_err(|e| format!("MFCreateMediaType failed: {e:?}"))?;
        media_type
            .SetGUID(&MF_MT_MAJOR_TYPE, &MFMediaType_Video)
            .map_err(|e| format!("SetGUID(major) failed: {e:?}"))?;
        media_type
            .SetGUID(&MF_MT_SUBTYPE, &MFVideoFormat_RGB32)
            .map_err(|e| format!("SetGUID(subtype) failed: {e:?}"))?;
        reader
            .SetCurrentMediaType(MF_SOURCE_READER_FIRST_VIDEO_STREAM.0 as u32, None, &media_type)
            .map_err(|e| format!("RGB32 output not supported: {e:?}"))?;

        Ok(reader)
    }
}

fn read_first_sample(reader: &IMFSourceReader, stream: u32) -> std::result::Result<IMFSample, String> {
    for _ in 0..MAX_EMPTY_READS {
        let mut flags = 0u32;
        let mut sample: Option<IMFSample> = None;
        unsafe {
            reader
                .ReadSample(stream, 0, None, Some(&mut flags), None, Some(&mut sample))
                .map_err(|e| format!("ReadSample failed: {e:?}"))?;
        }

        if let Some(sample) = sample {
            return Ok(sample);
        }
        if flags & MF_SOURCE_READERF_ENDOFSTREAM.0 as u32 != 0 {
            return Err("End of stream reached before any frame".to_string());
        }
    }
    Err(format!("No frame after {MAX_EMPTY_READS} reads"))
}

fn copy_frame(
    buffer: &IMFMediaBuffer,
    width: u32,
    height: u32,
    stride: i32,
) -> std::result::Result<RgbaImage, String> {
    unsafe {
        let mut data: *mut u8 = ptr::null_mut();
        let mut length = 0u32;
        buffer
            .Lock(&mut data, None, Some(&mut length))
            .map_err(|e| format!("IMFMediaBuffer::Lock failed: {e:?}"))?;

        let image = if data.is_null() {
            None
        } else {
            let bytes = std::slice::from_raw_parts(data, length as usize);
            bgrx_to_rgba(bytes, width, height, stride)
        };
        let _ = buffer.Unlock();

        image.ok_or_else(|| format!("Frame buffer of {length} bytes does not hold {width}x{height}"))
    }
}
