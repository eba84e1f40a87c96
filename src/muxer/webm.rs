//! WebM container muxer

use super::{Muxer, MuxerConfig};
use crate::encoder::Packet;
use crate::error::MediaError;
use crate::time::PresentationTime;
use std::io::{Seek, SeekFrom, Write};

const EBML_HEADER: u32 = 0x1A45DFA3;
const SEGMENT: u32 = 0x18538067;
const INFO: u32 = 0x1549A966;
const TRACKS: u32 = 0x1654AE6B;
const CLUSTER: u32 = 0x1F43B675;
const TIMESTAMP_SCALE: u32 = 0x2AD7B1;
const DURATION: u32 = 0x4489;
const SIMPLE_BLOCK: u32 = 0xA3;

/// Placeholder size: 8-byte EBML "unknown", patched once the size is known
const UNKNOWN_SIZE: [u8; 8] = [0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];

/// Timestamps are stored in milliseconds
const TIMESTAMP_SCALE_NS: u64 = 1_000_000;

/// WebM muxer writing a single AV1 video track with plain EBML
///
/// Segment and cluster sizes start as "unknown" and are patched in place, as
/// is the segment duration, so the output must be seekable.
pub struct WebmMuxer<W: Write + Seek> {
    writer: W,
    config: MuxerConfig,
    segment_data_start: u64,
    duration_offset: u64,
    cluster: Option<OpenCluster>,
    last_timestamp_ms: Option<i64>,
    blocks_written: u64,
}

struct OpenCluster {
    size_offset: u64,
    timestamp_ms: i64,
}

impl<W: Write + Seek> WebmMuxer<W> {
    /// Write the file header and track description
    pub fn new(writer: W, config: MuxerConfig) -> Result<Self, MediaError> {
        let mut muxer = Self {
            writer,
            config,
            segment_data_start: 0,
            duration_offset: 0,
            cluster: None,
            last_timestamp_ms: None,
            blocks_written: 0,
        };

        muxer.write_header()?;

        Ok(muxer)
    }

    pub fn blocks_written(&self) -> u64 {
        self.blocks_written
    }

    fn write_header(&mut self) -> Result<(), MediaError> {
        self.write_ebml_element(EBML_HEADER, &self.create_ebml_header())?;

        self.writer.write_all(&encode_ebml_id(SEGMENT))?;
        self.writer.write_all(&UNKNOWN_SIZE)?;
        self.segment_data_start = self.writer.stream_position()?;

        let (info, duration_at) = self.create_segment_info();
        let info_start = self.writer.stream_position()?;
        let header_len =
            (encode_ebml_id(INFO).len() + encode_ebml_size(info.len() as u64).len()) as u64;
        self.duration_offset = info_start + header_len + duration_at as u64;
        self.write_ebml_element(INFO, &info)?;

        self.write_ebml_element(TRACKS, &self.create_tracks())?;

        Ok(())
    }

    fn create_ebml_header(&self) -> Vec<u8> {
        let mut data = Vec::new();

        // EBMLVersion, EBMLReadVersion
        data.extend(encode_ebml_element(0x4286, &[1]));
        data.extend(encode_ebml_element(0x42F7, &[1]));
        // EBMLMaxIDLength, EBMLMaxSizeLength
        data.extend(encode_ebml_element(0x42F2, &[4]));
        data.extend(encode_ebml_element(0x42F3, &[8]));
        data.extend(encode_ebml_element(0x4282, b"webm"));
        // DocTypeVersion, DocTypeReadVersion
        data.extend(encode_ebml_element(0x4287, &[4]));
        data.extend(encode_ebml_element(0x4285, &[2]));

        data
    }

    /// Segment info bytes plus the offset of the duration payload within them
    fn create_segment_info(&self) -> (Vec<u8>, usize) {
        let mut data = Vec::new();

        data.extend(encode_ebml_element(
            TIMESTAMP_SCALE,
            &encode_uint(TIMESTAMP_SCALE_NS),
        ));

        let duration = encode_ebml_element(DURATION, &0f64.to_be_bytes());
        let duration_at = data.len() + duration.len() - 8;
        data.extend(duration);

        // MuxingApp, WritingApp
        data.extend(encode_ebml_element(0x4D80, b"stillvid"));
        data.extend(encode_ebml_element(0x5741, b"stillvid"));

        (data, duration_at)
    }

    fn create_tracks(&self) -> Vec<u8> {
        let mut entry = Vec::new();

        // TrackNumber, TrackUID
        entry.extend(encode_ebml_element(0xD7, &[1]));
        entry.extend(encode_ebml_element(0x73C5, &encode_uint(1)));
        // TrackType = video
        entry.extend(encode_ebml_element(0x83, &[1]));
        // FlagLacing off
        entry.extend(encode_ebml_element(0x9C, &[0]));
        entry.extend(encode_ebml_element(0x86, b"V_AV1"));
        if let Some(codec_private) = &self.config.codec_config {
            entry.extend(encode_ebml_element(0x63A2, codec_private));
        }
        // DefaultDuration in ns
        let frame_ns = (1_000_000_000u64 + self.config.fps as u64 / 2) / self.config.fps as u64;
        entry.extend(encode_ebml_element(0x23E383, &encode_uint(frame_ns)));

        let mut video = Vec::new();
        video.extend(encode_ebml_element(0xB0, &encode_uint(self.config.width as u64)));
        video.extend(encode_ebml_element(0xBA, &encode_uint(self.config.height as u64)));
        entry.extend(encode_ebml_element(0xE0, &video));

        encode_ebml_element(0xAE, &entry)
    }

    fn start_cluster(&mut self, timestamp_ms: i64) -> Result<(), MediaError> {
        self.close_cluster()?;

        self.writer.write_all(&encode_ebml_id(CLUSTER))?;
        let size_offset = self.writer.stream_position()?;
        self.writer.write_all(&UNKNOWN_SIZE)?;

        // Cluster timestamp
        self.write_ebml_element(0xE7, &encode_uint(timestamp_ms as u64))?;

        self.cluster = Some(OpenCluster {
            size_offset,
            timestamp_ms,
        });

        Ok(())
    }

    fn close_cluster(&mut self) -> Result<(), MediaError> {
        if let Some(cluster) = self.cluster.take() {
            self.patch_size(cluster.size_offset)?;
        }
        Ok(())
    }

    /// Replace the unknown-size placeholder at `offset` with the byte count
    /// from there to the current end of the stream
    fn patch_size(&mut self, offset: u64) -> Result<(), MediaError> {
        let end = self.writer.seek(SeekFrom::End(0))?;
        let size = end - offset - UNKNOWN_SIZE.len() as u64;
        self.writer.seek(SeekFrom::Start(offset))?;
        self.writer.write_all(&encode_size_8(size))?;
        self.writer.seek(SeekFrom::Start(end))?;
        Ok(())
    }

    fn write_simple_block(&mut self, packet: &Packet, relative: i16) -> Result<(), MediaError> {
        let mut block_data = Vec::with_capacity(packet.data.len() + 4);

        // Track number (EBML coded, track 1)
        block_data.push(0x81);
        block_data.extend(relative.to_be_bytes());
        // Flags: keyframe if applicable
        block_data.push(if packet.is_keyframe { 0x80 } else { 0x00 });
        block_data.extend(&packet.data);

        self.write_ebml_element(SIMPLE_BLOCK, &block_data)?;
        self.blocks_written += 1;

        Ok(())
    }

    fn write_ebml_element(&mut self, id: u32, data: &[u8]) -> Result<(), MediaError> {
        self.writer.write_all(&encode_ebml_element(id, data))?;
        Ok(())
    }
}

impl<W: Write + Seek + Send> Muxer for WebmMuxer<W> {
    fn write_packet(
        &mut self,
        packet: &Packet,
        timestamp: PresentationTime,
    ) -> Result<(), MediaError> {
        let timestamp_ms = timestamp.as_millis();
        if let Some(last) = self.last_timestamp_ms {
            if timestamp_ms < last {
                return Err(MediaError::Mux(format!(
                    "timestamp {}ms precedes previous block at {}ms",
                    timestamp_ms, last
                )));
            }
        }

        // New cluster on keyframes and whenever the relative timestamp
        // would overflow a SimpleBlock's i16
        let needs_cluster = match &self.cluster {
            None => true,
            Some(c) => {
                (packet.is_keyframe && timestamp_ms > c.timestamp_ms)
                    || timestamp_ms - c.timestamp_ms > i16::MAX as i64
            }
        };
        if needs_cluster {
            self.start_cluster(timestamp_ms)?;
        }

        let cluster_start = self.cluster.as_ref().map_or(timestamp_ms, |c| c.timestamp_ms);
        self.write_simple_block(packet, (timestamp_ms - cluster_start) as i16)?;
        self.last_timestamp_ms = Some(timestamp_ms);

        Ok(())
    }

    fn finalize(mut self: Box<Self>, duration: PresentationTime) -> Result<(), MediaError> {
        self.close_cluster()?;

        let segment_size_offset = self.segment_data_start - UNKNOWN_SIZE.len() as u64;
        self.patch_size(segment_size_offset)?;

        let end = self.writer.stream_position()?;
        self.writer.seek(SeekFrom::Start(self.duration_offset))?;
        let duration_ms = duration.value as f64 * 1000.0 / duration.timescale as f64;
        self.writer.write_all(&duration_ms.to_be_bytes())?;
        self.writer.seek(SeekFrom::Start(end))?;
        self.writer.flush()?;

        Ok(())
    }
}

// EBML encoding helpers

/// Encode an EBML element ID.
///
/// IDs carry their own length marker in the leading bits, so the ID is
/// written with as many bytes as its value needs.
fn encode_ebml_id(id: u32) -> Vec<u8> {
    let bytes = id.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count().min(3);
    bytes[skip..].to_vec()
}

fn encode_ebml_size(size: u64) -> Vec<u8> {
    // shortest VINT whose all-ones value stays reserved for "unknown"
    for len in 1..8u32 {
        let max = (1u64 << (7 * len)) - 1;
        if size < max {
            let marked = size | (1u64 << (7 * len));
            return marked.to_be_bytes()[(8 - len as usize)..].to_vec();
        }
    }
    encode_size_8(size).to_vec()
}

fn encode_size_8(size: u64) -> [u8; 8] {
    let mut bytes = size.to_be_bytes();
    bytes[0] = 0x01;
    bytes
}

fn encode_ebml_element(id: u32, data: &[u8]) -> Vec<u8> {
    let mut result = encode_ebml_id(id);
    result.extend(encode_ebml_size(data.len() as u64));
    result.extend(data);
    result
}

fn encode_uint(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count().min(7);
    bytes[skip..].to_vec()
}
