use ac_ffmpeg::codec::Decoder;
use ac_ffmpeg::codec::video::frame::get_pixel_format;
use ac_ffmpeg::codec::video::scaler::VideoFrameScaler;
use ac_ffmpeg::codec::video::{VideoDecoder, VideoFrame};
use ac_ffmpeg::packet::PacketMut;
use ac_ffmpeg::time::{TimeBase, Timestamp};
use log::{debug, info};

use super::backend::{CodecContext, CodecDescriptor, CodecLibrary, Picture, PixelFormat};
use super::error::CodecFailure;
use super::negotiate::FormatNegotiator;

const TIME_BASE_DEN: i32 = 90_000;

#[inline]
fn time_base() -> TimeBase {
    TimeBase::new(1, TIME_BASE_DEN)
}

/// FFmpeg binding of the codec seams, via `ac-ffmpeg`.
///
/// `ac-ffmpeg` keeps FFmpeg's `get_format` hook to itself, so the negotiator is
/// consulted with the software layouts the binding can hand out: once when the context
/// opens and again whenever a decoded frame reports a different layout. Without a
/// hardware surface to offer, it pairs with [`super::SoftwareOnly`].
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegLibrary;

impl CodecLibrary for FfmpegLibrary {
    type Context = FfmpegContext;

    fn find_decoder(&self, name: &str) -> Option<CodecDescriptor> {
        match VideoDecoder::builder(name) {
            Ok(_) => Some(CodecDescriptor {
                name: name.to_string(),
            }),
            Err(e) => {
                debug!("Decoder: '{}' lookup failed: {}", name, e);
                None
            }
        }
    }

    fn open(
        &self,
        codec: &CodecDescriptor,
        mut negotiator: FormatNegotiator,
    ) -> Result<FfmpegContext, CodecFailure> {
        let output_format = negotiator.negotiate(&[PixelFormat::Yuv420p]);

        let decoder = VideoDecoder::builder(&codec.name)
            .and_then(|builder| builder.time_base(time_base()).build())
            .map_err(|e| map_error(&e.to_string()))?;

        Ok(FfmpegContext {
            decoder,
            negotiator,
            output_format,
            frame_count: 0,
            scaler: None,
            packed_buffer: Vec::new(),
        })
    }
}

/// Pixel format name, width and height of a scaler's source.
type ScalerKey = (&'static str, usize, usize);

/// One open `ac-ffmpeg` video decoder.
pub struct FfmpegContext {
    decoder: VideoDecoder,
    negotiator: FormatNegotiator,
    output_format: PixelFormat,
    frame_count: i64,
    /// Converter for layouts other than YUV420P and NV12, with the source it was built for
    scaler: Option<(ScalerKey, VideoFrameScaler)>,
    /// Reusable buffer for packed plane output to avoid per-frame allocation
    packed_buffer: Vec<u8>,
}

impl CodecContext for FfmpegContext {
    fn send_packet(&mut self, packet: &[u8]) -> Result<(), CodecFailure> {
        let pts = self.next_pts();
        let packet = PacketMut::from(packet).with_pts(pts).freeze();

        self.decoder.try_push(packet).map_err(|e| {
            if e.is_again() {
                CodecFailure::Again
            } else {
                map_error(&e.to_string())
            }
        })
    }

    fn receive_picture(&mut self) -> Result<Picture, CodecFailure> {
        match self.decoder.take() {
            Ok(Some(frame)) => self.convert(&frame),
            Ok(None) => Err(CodecFailure::Again),
            Err(e) => Err(map_error(&e.to_string())),
        }
    }
}

impl FfmpegContext {
    #[inline]
    fn next_pts(&mut self) -> Timestamp {
        self.frame_count += 1;
        Timestamp::new(self.frame_count, time_base())
    }

    /// Packs the decoded frame into a contiguous 4:2:0 buffer.
    ///
    /// YUV420P (limited or full range) and NV12 are copied as they are; any other
    /// layout goes through a scaler into YUV420P first.
    fn convert(&mut self, frame: &VideoFrame) -> Result<Picture, CodecFailure> {
        let (w, h) = (frame.width(), frame.height());

        let delivered = match PixelFormat::from_name(frame.pixel_format().name()) {
            PixelFormat::Yuv420p => {
                pack_frame_yuv420(&mut self.packed_buffer, frame)?;
                PixelFormat::Yuv420p
            }
            PixelFormat::Nv12 => {
                pack_frame_nv12(&mut self.packed_buffer, frame)?;
                PixelFormat::Nv12
            }
            _ => {
                let converted = self.scale(frame)?;
                pack_frame_yuv420(&mut self.packed_buffer, &converted)?;
                PixelFormat::Yuv420p
            }
        };
        if delivered != self.output_format {
            self.output_format = self.negotiator.negotiate(&[delivered]);
        }

        Ok(Picture {
            width: w as u32,
            height: h as u32,
            format: self.output_format,
            data: self.packed_buffer.clone(),
        })
    }

    /// Converts `frame` to YUV420P, rebuilding the scaler when the source layout changes.
    fn scale(&mut self, frame: &VideoFrame) -> Result<VideoFrame, CodecFailure> {
        let key = (frame.pixel_format().name(), frame.width(), frame.height());

        let mut scaler = match self.scaler.take() {
            Some((built_for, scaler)) if built_for == key => scaler,
            _ => {
                info!("Decoder: converting {} {}x{} output to yuv420p", key.0, key.1, key.2);
                VideoFrameScaler::builder()
                    .source_pixel_format(frame.pixel_format())
                    .source_width(key.1)
                    .source_height(key.2)
                    .target_pixel_format(get_pixel_format("yuv420p"))
                    .target_width(key.1)
                    .target_height(key.2)
                    .build()
                    .map_err(|e| map_error(&e.to_string()))?
            }
        };

        let converted = scaler.scale(frame).map_err(|e| map_error(&e.to_string()));
        self.scaler = Some((key, scaler));
        converted
    }
}

/// Chroma plane size of a 4:2:0 picture; odd sizes round up like FFmpeg does.
#[inline]
fn chroma_size(width: usize, height: usize) -> (usize, usize) {
    (width.div_ceil(2), height.div_ceil(2))
}

fn pack_frame_yuv420(dst: &mut Vec<u8>, frame: &VideoFrame) -> Result<(), CodecFailure> {
    let (w, h) = (frame.width(), frame.height());
    let (cw, ch) = chroma_size(w, h);
    let planes = frame.planes();
    if planes.len() < 3 {
        return Err(CodecFailure::Other(format!("yuv420p frame with {} planes", planes.len())));
    }

    dst.resize(w * h + cw * ch * 2, 0);
    pack_yuv420(
        dst,
        Plane {
            data: planes[0].data(),
            stride: planes[0].line_size(),
            width: w,
            height: h,
        },
        Plane {
            data: planes[1].data(),
            stride: planes[1].line_size(),
            width: cw,
            height: ch,
        },
        Plane {
            data: planes[2].data(),
            stride: planes[2].line_size(),
            width: cw,
            height: ch,
        },
    );
    Ok(())
}

fn pack_frame_nv12(dst: &mut Vec<u8>, frame: &VideoFrame) -> Result<(), CodecFailure> {
    let (w, h) = (frame.width(), frame.height());
    let (cw, ch) = chroma_size(w, h);
    let planes = frame.planes();
    if planes.len() < 2 {
        return Err(CodecFailure::Other(format!("nv12 frame with {} planes", planes.len())));
    }

    dst.resize(w * h + cw * 2 * ch, 0);
    pack_nv12(
        dst,
        Plane {
            data: planes[0].data(),
            stride: planes[0].line_size(),
            width: w,
            height: h,
        },
        // U and V interleaved
        Plane {
            data: planes[1].data(),
            stride: planes[1].line_size(),
            width: cw * 2,
            height: ch,
        },
    );
    Ok(())
}

/// Maps FFmpeg's error strings onto the failures the pipeline distinguishes.
fn map_error(message: &str) -> CodecFailure {
    if message.contains("Invalid data") {
        CodecFailure::InvalidData(message.to_string())
    } else if message.contains("Cannot allocate memory") {
        CodecFailure::OutOfMemory
    } else if message.contains("Resource temporarily unavailable") {
        CodecFailure::Again
    } else {
        CodecFailure::Other(message.to_string())
    }
}

#[derive(Clone, Copy)]
struct Plane<'a> {
    data: &'a [u8],
    stride: usize,
    width: usize,
    height: usize,
}

fn pack_nv12(dst: &mut [u8], y: Plane<'_>, uv: Plane<'_>) {
    let (y_dst, uv_dst) = dst.split_at_mut(y.width * y.height);
    extract_plane(y_dst, y);
    extract_plane(uv_dst, uv);
}

fn pack_yuv420(dst: &mut [u8], y: Plane<'_>, u: Plane<'_>, v: Plane<'_>) {
    let y_size = y.width * y.height;
    let u_size = u.width * u.height;
    let (y_dst, chroma) = dst.split_at_mut(y_size);
    let (u_dst, v_dst) = chroma.split_at_mut(u_size);
    extract_plane(y_dst, y);
    extract_plane(u_dst, u);
    extract_plane(v_dst, v);
}

/// Copies a padded plane into a contiguous destination.
///
/// No padding means a single memcpy, otherwise rows are copied one by one.
#[inline]
fn extract_plane(dst: &mut [u8], plane: Plane<'_>) {
    let Plane {
        data,
        stride,
        width,
        height,
    } = plane;

    if stride == width && data.len() >= width * height {
        dst.copy_from_slice(&data[..width * height]);
        return;
    }

    for r in 0..height {
        let src_start = r * stride;
        let dst_start = r * width;
        if src_start + width > data.len() || dst_start + width > dst.len() {
            break;
        }
        dst[dst_start..dst_start + width].copy_from_slice(&data[src_start..src_start + width]);
    }
}
