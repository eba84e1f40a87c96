//! AV1 encoder using rav1e

use super::{Encoder, EncoderConfig, Packet};
use crate::error::MediaError;
use crate::pixel::FrameBuffer;
use rav1e::prelude::*;

/// AV1 encoder using rav1e
pub struct Av1Encoder {
    context: Context<u8>,
    config: EncoderConfig,
    frame_count: u64,
    // scratch planes, reused between frames
    y_plane: Vec<u8>,
    u_plane: Vec<u8>,
    v_plane: Vec<u8>,
}

impl Av1Encoder {
    /// Create a new AV1 encoder
    pub fn new(config: EncoderConfig) -> Result<Self, MediaError> {
        if config.width == 0 || config.height == 0 || config.fps == 0 {
            return Err(MediaError::Encode(format!(
                "invalid AV1 geometry {}x{} @ {} fps",
                config.width, config.height, config.fps
            )));
        }

        // Map quality (0-100) to quantizer (255-0)
        // Higher quality = lower quantizer
        let quantizer = ((100 - config.quality.min(100)) as usize * 255) / 100;
        let min_quantizer = (quantizer.saturating_sub(10)) as u8;

        let enc_config = rav1e::config::EncoderConfig {
            width: config.width as usize,
            height: config.height as usize,
            speed_settings: SpeedSettings::from_preset(config.speed.min(10)),
            time_base: Rational::new(1, config.fps as u64),
            sample_aspect_ratio: Rational::new(1, 1),
            bit_depth: 8,
            chroma_sampling: ChromaSampling::Cs420,
            chroma_sample_position: ChromaSamplePosition::Unknown,
            pixel_range: PixelRange::Limited,
            still_picture: false,
            error_resilient: false,
            min_key_frame_interval: 0,
            max_key_frame_interval: 240,
            // no frame reordering, packets leave in input order
            low_latency: true,
            quantizer,
            min_quantizer,
            bitrate: 0,
            tune: Tune::Psychovisual,
            ..Default::default()
        };

        let rav1e_config = Config::new()
            .with_encoder_config(enc_config)
            .with_threads(config.threads);

        let context = rav1e_config
            .new_context()
            .map_err(|e| MediaError::Encode(format!("Failed to create AV1 context: {}", e)))?;

        let luma = config.width as usize * config.height as usize;
        let chroma = config.width.div_ceil(2) as usize * config.height.div_ceil(2) as usize;

        Ok(Self {
            context,
            config,
            frame_count: 0,
            y_plane: vec![0; luma],
            u_plane: vec![0; chroma],
            v_plane: vec![0; chroma],
        })
    }

    /// Convert a frame buffer to YUV420 planes
    fn convert_to_yuv420(&mut self, frame: &FrameBuffer) -> Result<rav1e::Frame<u8>, MediaError> {
        let width = self.config.width as usize;
        let height = self.config.height as usize;

        if frame.width() as usize != width || frame.height() as usize != height {
            return Err(MediaError::Encode(format!(
                "frame is {}x{}, encoder expects {}x{}",
                frame.width(),
                frame.height(),
                width,
                height
            )));
        }

        // Y plane
        for y in 0..height {
            let row = frame.row(y as u32);
            for x in 0..width {
                let [r, g, b, _] = frame.format().load(&row[x * 4..x * 4 + 4]);

                // BT.601 conversion
                let y_val =
                    (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32).clamp(0.0, 255.0);
                self.y_plane[y * width + x] = y_val as u8;
            }
        }

        // U and V planes (subsampled 2x2)
        let uv_width = width.div_ceil(2);
        let uv_height = height.div_ceil(2);

        for y in 0..uv_height {
            for x in 0..uv_width {
                // Average 2x2 block
                let mut sum = [0u32; 3];
                for dy in 0..2 {
                    let sy = (y * 2 + dy).min(height - 1);
                    let row = frame.row(sy as u32);
                    for dx in 0..2 {
                        let sx = (x * 2 + dx).min(width - 1);
                        let [r, g, b, _] = frame.format().load(&row[sx * 4..sx * 4 + 4]);
                        sum[0] += r as u32;
                        sum[1] += g as u32;
                        sum[2] += b as u32;
                    }
                }

                let r = (sum[0] / 4) as f32;
                let g = (sum[1] / 4) as f32;
                let b = (sum[2] / 4) as f32;

                // BT.601 conversion
                let u = ((-0.169 * r - 0.331 * g + 0.500 * b) + 128.0).clamp(0.0, 255.0) as u8;
                let v = ((0.500 * r - 0.419 * g - 0.081 * b) + 128.0).clamp(0.0, 255.0) as u8;

                self.u_plane[y * uv_width + x] = u;
                self.v_plane[y * uv_width + x] = v;
            }
        }

        let mut yuv_frame = self.context.new_frame();
        yuv_frame.planes[0].copy_from_raw_u8(&self.y_plane, width, 1);
        yuv_frame.planes[1].copy_from_raw_u8(&self.u_plane, uv_width, 1);
        yuv_frame.planes[2].copy_from_raw_u8(&self.v_plane, uv_width, 1);

        Ok(yuv_frame)
    }

    fn drain_packets(&mut self) -> Result<Vec<Packet>, MediaError> {
        let mut packets = Vec::new();

        loop {
            match self.context.receive_packet() {
                Ok(pkt) => {
                    packets.push(Packet {
                        data: pkt.data,
                        frame_index: pkt.input_frameno,
                        is_keyframe: pkt.frame_type == FrameType::KEY,
                    });
                }
                Err(EncoderStatus::Encoded) => continue,
                Err(EncoderStatus::NeedMoreData) => break,
                Err(EncoderStatus::LimitReached) => break,
                Err(e) => {
                    return Err(MediaError::Encode(format!("AV1 encoding error: {}", e)));
                }
            }
        }

        Ok(packets)
    }
}

impl Encoder for Av1Encoder {
    fn encode(&mut self, frame: &FrameBuffer) -> Result<Vec<Packet>, MediaError> {
        let yuv_frame = self.convert_to_yuv420(frame)?;

        self.context
            .send_frame(yuv_frame)
            .map_err(|e| MediaError::Encode(format!("Failed to send frame: {}", e)))?;

        self.frame_count += 1;
        self.drain_packets()
    }

    fn flush(&mut self) -> Result<Vec<Packet>, MediaError> {
        self.context.flush();
        let packets = self.drain_packets()?;
        log::debug!("av1 encoder flushed after {} frames", self.frame_count);
        Ok(packets)
    }

    fn codec_config(&self) -> Option<Vec<u8>> {
        Some(self.context.container_sequence_header())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel::PixelFormat;

    fn config(width: u32, height: u32) -> EncoderConfig {
        EncoderConfig {
            width,
            height,
            fps: 25,
            quality: 50,
            speed: 10,
            threads: 1,
        }
    }

    #[test]
    fn test_encodes_every_frame_in_order() {
        let mut encoder = Av1Encoder::new(config(64, 48)).unwrap();
        let mut frame = FrameBuffer::new(64, 48, 0, PixelFormat::Argb).unwrap();
        frame.data_mut().fill(200);

        let mut packets = Vec::new();
        for _ in 0..5 {
            packets.extend(encoder.encode(&frame).unwrap());
        }
        packets.extend(encoder.flush().unwrap());

        let indices: Vec<u64> = packets.iter().map(|p| p.frame_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        assert!(packets[0].is_keyframe);
    }

    #[test]
    fn test_rejects_mismatched_frame() {
        let mut encoder = Av1Encoder::new(config(64, 48)).unwrap();
        let frame = FrameBuffer::new(32, 32, 0, PixelFormat::Argb).unwrap();
        assert!(matches!(encoder.encode(&frame), Err(MediaError::Encode(_))));
    }

    #[test]
    fn test_codec_config_is_av1c() {
        let encoder = Av1Encoder::new(config(64, 48)).unwrap();
        let av1c = encoder.codec_config().unwrap();
        // marker bit + version 1
        assert_eq!(av1c[0], 0x81);
    }
}
